//! # KEYSTONE
//!
//! The integration crate: boots the runtime and drives frames.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            KEYSTONE                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐          ┌──────────────────────────┐     │
//! │  │  keystone_core   │─────────>│  keystone_scene          │     │
//! │  │                  │          │                          │     │
//! │  │  • Handles       │          │  • Transforms            │     │
//! │  │  • Registry      │          │  • Scene BVH             │     │
//! │  │  • Game objects  │          │  • Lights and cameras    │     │
//! │  │  • Thread pool   │          │  • Brushes and PVS       │     │
//! │  │  • Dispatcher    │          │  • Scene loading         │     │
//! │  └────────┬─────────┘          └────────────┬─────────────┘     │
//! │           │        ┌──────────────────┐     │                   │
//! │           └───────>│  Engine          │<────┘                   │
//! │                    │  FrameLoop       │                         │
//! │                    └──────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML settings for every layer
//! - `engine`: pool, registry and store bootstrap
//! - `frame`: per-frame task graph and statistics

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;

pub use keystone_core as core;
pub use keystone_scene as scene;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use frame::{FrameLoop, FrameOutput, FrameStats, FrameStatsAccumulator, TARGET_FRAME_TIME};
