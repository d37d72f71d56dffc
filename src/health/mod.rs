//! # Health Monitoring
//!
//! Agent heartbeats, rule-based alerts and the periodic system health sweep.

pub mod alerts;
pub mod heartbeat_monitor;

pub use alerts::AlertBook;
pub use heartbeat_monitor::{HeartbeatMonitor, MonitorHandle};
