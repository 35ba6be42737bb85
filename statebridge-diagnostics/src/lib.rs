//! Diagnostics and self-healing for the bridge.
//!
//! - [`logging`]: subscriber setup and namespaced [`Logger`] handles that also
//!   keep a bounded buffer of recent entries.
//! - [`ComponentRegistry`]: per-component health with change notification on
//!   the bus (`bridge:statusChanged`).
//! - [`HealthMonitor`]: periodic aggregate health and memory-trend sampling.
//! - [`PerfTracker`]: rolling latency per operation, flagging slow calls.
//! - [`with_retry`]: bounded retries for recoverable failures.
//! - [`Diagnostics`]: wires the above to one bus and produces a
//!   [`DiagnosticsReport`].

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod memory;
pub mod perf;
pub mod registry;
pub mod report;
pub mod retry;

pub use config::DiagnosticsConfig;
pub use error::{DiagnosticsError, DiagnosticsResult};
pub use events::{HealthReport, MemoryWarning, SlowOperation, StatusChanged};
pub use health::HealthMonitor;
pub use logging::{init_logging, LogBuffer, LogConfig, LogEntry, LogLevel, Logger};
pub use memory::{MemoryProbe, MemorySample, MemoryTrend, StatmProbe};
pub use perf::{OperationStats, PerfTracker};
pub use registry::{ComponentRegistry, ComponentStatus, HealthStatus, StatusUpdate};
pub use report::{Diagnostics, DiagnosticsReport};
pub use retry::{with_retry, RetryPolicy};
