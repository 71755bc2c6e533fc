//! Internal telemetry for the behavior tracking pipeline.
//!
//! In-process counters and health flags, exposed over the HTTP health
//! surface rather than an external metrics system.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
