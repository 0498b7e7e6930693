//! # Golden Path
//!
//! Scene blobs → engine load → frame loop → PVS and shadow updates.
//!
//! Loads a grid of crates lit by a few lamps, then runs frames while one
//! lamp orbits the grid. Every frame must produce a draw list, the moving
//! lamp must be reported dirty each frame, and no frame may exceed the
//! latency budget.
//!
//! Run with: `cargo run --release --package keystone --bin golden_path [config.toml]`

#![allow(clippy::cast_precision_loss)]

use std::f32::consts::{FRAC_PI_3, TAU};
use std::process::ExitCode;
use std::time::Instant;

use keystone::core::components::STRING_ID_LENGTH;
use keystone::core::ecs::ComponentData;
use keystone::core::{Component, ComponentId, StringIdComponent, Vec3};
use keystone::scene::camera::CameraBlob;
use keystone::scene::lights::LightBlob;
use keystone::scene::loading::SceneNodeBlob;
use keystone::scene::render::brush::ANIMATED_FLAG;
use keystone::scene::render::{Brush, BrushBlob, MeshLodBlob};
use keystone::scene::visibility::{VisibilityBlob, RAY_VISIBLE_FLAG, TRANSPARENT_FLAG, VISIBLE_FLAG};
use keystone::scene::{
    Camera, EntityDesc, Light, NodeBlob, SceneError, SceneNodeView, TransformComponent,
    VisibilityFields,
};
use keystone::{Engine, EngineConfig, EngineResult};

/// Crates per grid side.
const GRID: u32 = 24;
/// Distance between crate centres.
const SPACING: f32 = 4.0;
/// Static lamps, plus the orbiting one.
const LAMPS: u32 = 3;
const WARMUP_FRAMES: u32 = 20;
const FRAMES: u32 = 600;
/// Worst frame allowed, in microseconds.
const LATENCY_BUDGET_US: u64 = 50_000;

/// Component blobs of one entity.
type EntityBlobs = Vec<(ComponentId, Vec<u8>)>;

/// Owned blobs of a scene, borrowed by the loader.
#[derive(Default)]
struct SceneBlobs {
    nodes: Vec<NodeBlob>,
    entities: Vec<EntityBlobs>,
}

impl SceneBlobs {
    fn node(&mut self, position: Vec3) -> u32 {
        self.nodes.push(NodeBlob::root(position.to_array()));
        u32::try_from(self.nodes.len() - 1).unwrap_or(u32::MAX)
    }

    fn entity(&mut self, name: &str, node_index: u32) -> &mut EntityBlobs {
        let mut name_bytes = vec![0_u8; STRING_ID_LENGTH];
        let len = name.len().min(STRING_ID_LENGTH - 1);
        name_bytes[..len].copy_from_slice(&name.as_bytes()[..len]);

        self.entities.push(vec![
            (
                TransformComponent::ID,
                bytemuck::bytes_of(&SceneNodeBlob { node_index }).to_vec(),
            ),
            (StringIdComponent::ID, name_bytes),
        ]);
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    fn descs(&self) -> Vec<EntityDesc<'_>> {
        self.entities
            .iter()
            .map(|blobs| {
                blobs
                    .iter()
                    .fold(EntityDesc::default(), |desc, (id, bytes)| desc.with(*id, bytes))
            })
            .collect()
    }
}

fn build_blobs() -> SceneBlobs {
    let mut blobs = SceneBlobs::default();

    let camera_node = blobs.node(Vec3::new(0.0, 12.0, 30.0));
    let camera = CameraBlob {
        node_index: camera_node,
        fov: FRAC_PI_3,
        aspect: 16.0 / 9.0,
        near: 0.1,
        far: 500.0,
    };
    blobs
        .entity("camera", camera_node)
        .push((Camera::ID, bytemuck::bytes_of(&camera).to_vec()));

    let half = (GRID as f32 - 1.0) * SPACING * 0.5;
    for row in 0..GRID {
        for col in 0..GRID {
            let i = row * GRID + col;
            let position = Vec3::new(col as f32 * SPACING - half, 0.5, -(row as f32) * SPACING);
            let node = blobs.node(position);

            let mut flags = VISIBLE_FLAG | RAY_VISIBLE_FLAG;
            if i % 10 == 0 {
                flags |= TRANSPARENT_FLAG;
            }
            let visibility = VisibilityBlob {
                center: [0.0; 3],
                radius: 0.9,
                flags,
            };
            let header = BrushBlob {
                node_index: node,
                mesh_count: 2,
                flags: if i % 7 == 0 { ANIMATED_FLAG } else { 0 },
            };
            let mut brush = bytemuck::bytes_of(&header).to_vec();
            for mesh in [
                MeshLodBlob { lod_count: 4, highest_loaded: 1 },
                MeshLodBlob { lod_count: 2, highest_loaded: 0 },
            ] {
                brush.extend_from_slice(bytemuck::bytes_of(&mesh));
            }

            let entity = blobs.entity(&format!("crate_{i}"), node);
            entity.push((VisibilityFields::ID, bytemuck::bytes_of(&visibility).to_vec()));
            entity.push((Brush::ID, brush));
        }
    }

    for lamp in 0..=LAMPS {
        let x = (lamp as f32 / LAMPS as f32 - 0.5) * 2.0 * half;
        let node = blobs.node(Vec3::new(x, 3.0, -half));
        let light = LightBlob {
            kind: 0,
            color: [1.0, 0.85, 0.6],
            intensity: 4.0,
            radius: 12.0,
            inner_angle: 0.0,
            outer_angle: 0.0,
            node_index: node,
        };
        blobs
            .entity(&format!("lamp_{lamp}"), node)
            .push((Light::ID, bytemuck::bytes_of(&light).to_vec()));
    }

    blobs
}

/// Results of the timed frames.
#[derive(Debug, Default)]
struct GoldenPathReport {
    entities: usize,
    load_us: u64,
    frames: u32,
    max_frame_us: u64,
    avg_frame_ms: f64,
    frames_over_target: u64,
    min_pvs: usize,
    max_pvs: usize,
    frames_lamp_dirty: u32,
    shadow_redraws: usize,
}

impl GoldenPathReport {
    fn passed(&self) -> bool {
        self.max_frame_us < LATENCY_BUDGET_US
            && self.min_pvs > 0
            && self.frames_lamp_dirty == self.frames
    }
}

fn run(config: EngineConfig) -> EngineResult<GoldenPathReport> {
    let engine = Engine::new(config)?;
    let blobs = build_blobs();

    let load_start = Instant::now();
    let (scene, handles) = engine.load_scene(&blobs.nodes, &blobs.descs())?;
    let load_us = u64::try_from(load_start.elapsed().as_micros()).unwrap_or(u64::MAX);

    let camera = scene
        .find_game_object("camera")
        .and_then(|entity| Engine::camera_of(&scene, entity))
        .ok_or(SceneError::UnknownCamera(0))?;
    let orbiting = scene
        .find_game_object("lamp_0")
        .ok_or(SceneError::UnknownNode(0))?;
    let orbiting_light = scene.light_of(orbiting);

    let mut frame_loop = engine.frame_loop();
    for _ in 0..WARMUP_FRAMES {
        frame_loop.run_frame(&scene, camera)?;
    }

    let mut report = GoldenPathReport {
        entities: handles.len(),
        load_us,
        frames: FRAMES,
        min_pvs: usize::MAX,
        ..GoldenPathReport::default()
    };
    let radius = GRID as f32 * SPACING * 0.4;
    let centre = Vec3::new(0.0, 3.0, -(GRID as f32) * SPACING * 0.5);

    let mut timed = keystone::FrameStatsAccumulator::new();
    for frame in 0..FRAMES {
        let angle = frame as f32 / FRAMES as f32 * TAU;
        let position = centre + Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);
        scene.with_game_object(orbiting, |go| {
            go.get_view::<SceneNodeView>().map(|node| node.set_position_w(position))
        });

        let output = frame_loop.run_frame(&scene, camera)?;
        timed.record(&output.stats);
        report.min_pvs = report.min_pvs.min(output.pvs.len());
        report.max_pvs = report.max_pvs.max(output.pvs.len());
        report.shadow_redraws += output.dirty_lights.len();
        if orbiting_light.is_some_and(|light| output.dirty_lights.contains(&light)) {
            report.frames_lamp_dirty += 1;
        }
    }

    report.max_frame_us = timed.max_frame_us;
    report.avg_frame_ms = timed.avg_frame_ms();
    report.frames_over_target = timed.frames_over_budget;
    Ok(report)
}

fn print_report(report: &GoldenPathReport) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    GOLDEN PATH RESULTS                           ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ SCENE ──────────────────────────────────────────────────────────┐");
    println!("│ Entities loaded:    {}", report.entities);
    println!("│ Load time:          {:.3} ms", report.load_us as f64 / 1000.0);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ FRAMES ─────────────────────────────────────────────────────────┐");
    println!("│ Frames:             {}", report.frames);
    println!("│ Average frame:      {:.3} ms", report.avg_frame_ms);
    println!("│ Worst frame:        {:.3} ms", report.max_frame_us as f64 / 1000.0);
    println!("│ Over 60 FPS target: {}", report.frames_over_target);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ VISIBILITY ─────────────────────────────────────────────────────┐");
    println!("│ PVS size:           {} .. {}", report.min_pvs, report.max_pvs);
    println!("│ Shadow redraws:     {}", report.shadow_redraws);
    println!("│ Moving lamp dirty:  {}/{} frames", report.frames_lamp_dirty, report.frames);
    println!("└──────────────────────────────────────────────────────────────────┘");
}

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║           GOLDEN PATH                                            ║");
    println!("║           Blobs → Scene → BVH → Lights → PVS                     ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  TARGET: every frame < 50ms, moving lamp re-shadowed each frame  ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let report = match run(config) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("golden path aborted: {err}");
            return ExitCode::FAILURE;
        }
    };
    print_report(&report);

    println!();
    if report.passed() {
        println!("✅ GOLDEN PATH PASSED");
        ExitCode::SUCCESS
    } else {
        println!("❌ GOLDEN PATH FAILED");
        ExitCode::FAILURE
    }
}
