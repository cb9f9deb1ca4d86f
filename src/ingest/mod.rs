//! Click ingestion: the guarded path from an inbound click to a stored event.

pub mod pipeline;

pub use pipeline::{ClickRequest, IngestOutcome, IngestionPipeline, RejectReason, UNKNOWN_REF};
