//! Periodic task orchestration.
//!
//! Tasks implement [`PeriodicTask`]; the [`Orchestrator`] discovers them once
//! through a [`TaskProvider`], decides when each one runs, launches every run
//! on its own thread and stops them cooperatively on shutdown.

mod clock;
mod context;
mod gate;
mod logger;
mod orchestrator;
mod runner;
mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::TaskContext;
pub use gate::{is_enabled, needs_execution, TaskWindow};
pub use logger::{LogEntry, MemoryLogger, TaskLogger, TracingLogger};
pub use orchestrator::{DiscoveryError, Orchestrator, StaticTaskProvider, StopSummary, TaskProvider};
pub use runner::{ManagedTask, RunOutcome, RunState, StopOutcome, StopTimedOut, TaskPanicked};
pub use task::{resolve_task_name, PeriodicTask, TaskError, DEFAULT_TASK_ORDER};
