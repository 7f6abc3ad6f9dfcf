pub mod tracker;

pub use tracker::{LatencyReport, LatencySnapshot, LatencyTracker, P99Summary};
