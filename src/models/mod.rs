pub mod event;

pub use event::{now_nanos, Event, EventQuery, EventRow, GeoLocation, GeoRow, NewEvent, RepairReport};
