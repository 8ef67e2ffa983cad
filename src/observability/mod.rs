//! Observability — in-process metrics and the structured audit log

pub mod access_log;
pub mod metrics;

pub use access_log::{AccessLog, AccessLogEntry};
pub use metrics::GatewayMetrics;
