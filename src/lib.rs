pub mod access;
pub mod config;
pub mod geo;
pub mod guard;
pub mod ingest;
pub mod models;
pub mod redirect;
pub mod server;
pub mod storage;
pub mod view;
