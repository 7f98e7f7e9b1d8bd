pub mod telemetry;

pub use telemetry::{Cadence, Clock, LoopStats, MillisClock, TelemetryNode};
