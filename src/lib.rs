//! quotad library
//!
//! Configuration, service wiring, CLI and the forced-sync HTTP surface
//! around the quota reservation engine.

pub mod cli;
pub mod config;
pub mod server;
pub mod service;

pub use config::ServiceConfig;
pub use service::{QuotaService, RecordView};
