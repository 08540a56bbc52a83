//! Statistics for broadcast providers

pub mod metrics;

pub use metrics::ProviderStats;
