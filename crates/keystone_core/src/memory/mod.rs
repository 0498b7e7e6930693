//! # Memory Management
//!
//! Per-worker scratch budgets for update tasks.

mod scratch;

pub use scratch::ScratchArena;
