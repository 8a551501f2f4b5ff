#![forbid(unsafe_code)]

//! Prometheus exporter for the Folding@home client.

pub mod collector;
pub mod config;
pub mod donor;
pub mod http;
pub mod registry;

pub use collector::{CollectError, Collector};
pub use config::ExporterConfig;
pub use donor::{DonorSource, EnrichmentGate, StatsApi};
