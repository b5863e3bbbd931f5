//! Per-simulation telemetry buffering.

pub mod ring;

pub use ring::MetricsRing;
