//! Periodic Task Host Library
//!
//! Hosts periodic background tasks inside a long-running process: decides
//! when each task runs, keeps runs of the same task from overlapping and
//! stops them gracefully on shutdown.

pub mod config;
pub mod host;
pub mod periodic;
pub mod server;
pub mod tasks;

// Re-export commonly used types for convenience
pub use host::{run_host, HostSettings};
pub use periodic::{
    Orchestrator, PeriodicTask, StaticTaskProvider, StopSummary, TaskContext, TaskError,
    TaskLogger, TaskProvider, TracingLogger,
};
