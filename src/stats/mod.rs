//! Bridge statistics

pub mod metrics;

pub use metrics::{BridgeStats, StatsSnapshot};
