//! # KEYSTONE Core Runtime
//!
//! Entity-component runtime and per-frame task scheduling:
//! - Generation-counted handles over dense, swap-remove storage
//! - A component registry and game objects holding type-erased views
//! - Apply/Query dispatch over tuples of views, with per-view predicates
//! - A work-stealing pool, a work barrier and the update dispatcher that
//!   runs the frame's task graph
//!
//! ## Architecture Rules
//!
//! 1. **Components own their data** - views hold handles into dense rows
//! 2. **Views die with their game object** - dropping a view frees its row
//! 3. **Joins never idle** - waiting threads execute pool work
//!
//! ## Example
//!
//! ```rust,ignore
//! use keystone_core::{ThreadPool, UpdateDispatcher};
//!
//! let pool = Arc::new(ThreadPool::new(4)?);
//! let mut dispatcher = UpdateDispatcher::new(pool);
//! let a = dispatcher.add::<(), _, _>(|_, _| {}, |_, _| {});
//! dispatcher.add::<(), _, _>(|b, _| { b.add_input(&a); }, |_, _| {});
//! dispatcher.execute()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod components;
pub mod config;
pub mod ecs;
pub mod error;
pub mod math;
pub mod memory;
pub mod tasks;

pub use components::{StringIdComponent, StringIdView, TriggerComponent, TriggerView};
pub use config::CoreConfig;
pub use ecs::{
    apply, apply_each, apply_ref, component_id, query, query_ref, BasicComponent, BasicView,
    Component, ComponentBlob, ComponentData, ComponentId, ComponentStore, GameObject, Handle,
    HandleTable, Read, Registry, Request, View, Write,
};
pub use error::{CoreError, CoreResult};
pub use math::{Quaternion, Transform, Vec3};
pub use memory::ScratchArena;
pub use tasks::{parallel_for, TaskId, TaskRef, ThreadPool, UpdateDispatcher, UpdateTask, WorkBarrier, WorkerContext};
