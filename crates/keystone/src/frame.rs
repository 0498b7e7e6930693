//! # Frame Loop
//!
//! One frame of one scene, as a task graph:
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ 1. Transform │───>│ 2. Scene BVH │─┬─>│ 3. Visible     │───>│ 4. Update    │
//! │    update    │    │    rebuild   │ │  │    lights      │    │    lights    │
//! └──────────────┘    └──────────────┘ │  └────────────────┘    └──────────────┘
//!                                      │  ┌────────────────┐
//!                                      └─>│ 5. PVS gather  │
//!                                         └────────────────┘
//! ```
//!
//! The graph is rebuilt every frame and executed on the engine's pool. The
//! renderer receives the PVS and the lights whose shadows need redrawing;
//! those lights are marked clean once handed over.

use std::sync::Arc;
use std::time::{Duration, Instant};

use keystone_core::{ThreadPool, UpdateDispatcher};
use keystone_scene::lights::LightHandle;
use keystone_scene::transforms::queue_transform_update_task;
use keystone_scene::{CameraHandle, Pvs, Scene, SceneStores};

use crate::error::EngineResult;

/// Target frame time for 60 FPS.
pub const TARGET_FRAME_TIME: Duration = Duration::from_micros(16_666);

/// Timings and counters of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Whole frame in microseconds.
    pub total_us: u64,
    /// Graph construction in microseconds.
    pub build_us: u64,
    /// Graph execution in microseconds.
    pub execute_us: u64,
    /// Nodes whose world transform changed.
    pub updated_nodes: usize,
    /// Entities in the rebuilt BVH.
    pub bvh_elements: usize,
    /// Lights the camera may see.
    pub visible_lights: usize,
    /// Lights whose shadow must be redrawn.
    pub dirty_lights: usize,
    /// Solid PVS entries.
    pub pvs_solid: usize,
    /// Transparent PVS entries.
    pub pvs_transparent: usize,
}

/// What one frame hands to the renderer.
#[derive(Clone, Debug, Default)]
pub struct FrameOutput {
    /// Draw list of the camera.
    pub pvs: Pvs,
    /// Lights whose shadow state changed, sorted.
    pub dirty_lights: Vec<LightHandle>,
    /// Timings and counters.
    pub stats: FrameStats,
}

/// Running totals over many frames.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Frames recorded.
    pub frames_recorded: u64,
    /// Sum of whole-frame times.
    pub total_us_sum: u64,
    /// Sum of graph execution times.
    pub execute_us_sum: u64,
    /// Fastest frame.
    pub min_frame_us: u64,
    /// Slowest frame.
    pub max_frame_us: u64,
    /// Frames slower than [`TARGET_FRAME_TIME`].
    pub frames_over_budget: u64,
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStatsAccumulator {
    /// Empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            execute_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
        }
    }

    /// Adds one frame.
    pub fn record(&mut self, stats: &FrameStats) {
        self.frames_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.execute_us_sum += stats.execute_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        if stats.total_us > micros(TARGET_FRAME_TIME) {
            self.frames_over_budget += 1;
        }
    }

    /// Average frame time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Builds and runs the per-frame task graph.
pub struct FrameLoop {
    dispatcher: UpdateDispatcher,
    stores: SceneStores,
    frame: u64,
    stats: FrameStatsAccumulator,
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("frame", &self.frame)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl FrameLoop {
    /// Frame loop over `stores`, running on `pool`.
    #[must_use]
    pub fn new(pool: Arc<ThreadPool>, stores: SceneStores) -> Self {
        Self {
            dispatcher: UpdateDispatcher::new(pool),
            stores,
            frame: 0,
            stats: FrameStatsAccumulator::new(),
        }
    }

    /// Frames completed so far.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Totals over every completed frame.
    #[must_use]
    pub const fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Runs one frame of `scene` seen from `camera`.
    ///
    /// Dirty lights are reported once, then marked clean.
    ///
    /// # Errors
    ///
    /// Returns [`keystone_core::CoreError::TaskFailed`] when a task panicked.
    /// The frame counter does not advance and no light is marked clean.
    pub fn run_frame(&mut self, scene: &Arc<Scene>, camera: CameraHandle) -> EngineResult<FrameOutput> {
        let frame_start = Instant::now();

        let dispatcher = &mut self.dispatcher;
        let transforms = queue_transform_update_task(dispatcher, &self.stores.transforms);
        let bvh = scene.update_scene_bvh(dispatcher, &transforms);
        let visible = scene.get_visible_lights(dispatcher, camera, &bvh);
        let lights = scene.update_lights(dispatcher, &bvh, &visible);
        let gather = scene.gather_scene(dispatcher, camera, &bvh);
        let build_us = micros(frame_start.elapsed());

        let execute_start = Instant::now();
        if let Err(err) = self.dispatcher.execute() {
            tracing::error!(frame = self.frame, scene = scene.id(), error = %err, "frame failed");
            return Err(err.into());
        }
        let execute_us = micros(execute_start.elapsed());

        let pvs = std::mem::take(&mut gather.data().pvs);
        let dirty_lights = std::mem::take(&mut lights.data().dirty);
        scene.mark_lights_clean(&dirty_lights);

        let stats = FrameStats {
            frame: self.frame,
            total_us: micros(frame_start.elapsed()),
            build_us,
            execute_us,
            updated_nodes: transforms.data().updated,
            bvh_elements: bvh.data().bvh.len(),
            visible_lights: visible.data().lights.len(),
            dirty_lights: dirty_lights.len(),
            pvs_solid: pvs.solid.len(),
            pvs_transparent: pvs.transparent.len(),
        };
        self.stats.record(&stats);
        self.frame += 1;

        if stats.total_us > micros(TARGET_FRAME_TIME) {
            tracing::warn!(
                frame = stats.frame,
                total_us = stats.total_us,
                budget_us = micros(TARGET_FRAME_TIME),
                "frame exceeded budget"
            );
        } else {
            tracing::trace!(frame = stats.frame, total_us = stats.total_us, "frame complete");
        }

        Ok(FrameOutput {
            pvs,
            dirty_lights,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_tracks_extremes() {
        let mut acc = FrameStatsAccumulator::default();
        assert!(acc.avg_frame_ms().abs() < f64::EPSILON);

        for total_us in [1_000, 3_000, 20_000] {
            acc.record(&FrameStats {
                total_us,
                ..FrameStats::default()
            });
        }
        assert_eq!(acc.frames_recorded, 3);
        assert_eq!(acc.min_frame_us, 1_000);
        assert_eq!(acc.max_frame_us, 20_000);
        assert_eq!(acc.frames_over_budget, 1);
        assert!((acc.avg_frame_ms() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_micros_saturates() {
        assert_eq!(micros(Duration::from_millis(2)), 2_000);
        assert_eq!(micros(Duration::MAX), u64::MAX);
    }
}
