//! # Task Scheduling
//!
//! Worker pool, work barrier, the per-frame update dispatcher and a
//! fan-out helper for use inside tasks.

mod barrier;
mod dispatcher;
mod parallel;
mod pool;

pub use barrier::WorkBarrier;
pub use dispatcher::{AsUpdateTask, TaskId, TaskRef, UpdateBuilder, UpdateDispatcher, UpdateTask};
pub use parallel::parallel_for;
pub use pool::{Job, ThreadPool, WorkerContext};
