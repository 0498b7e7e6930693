//! # Render Extraction
//!
//! Brushes and the potentially visible set handed to the renderer.

pub mod brush;
pub mod pvs;

pub use brush::{Brush, BrushBlob, BrushComponent, BrushHandle, BrushView, MeshLod, MeshLodBlob};
pub use pvs::{compute_lod, gather_pvs, sort_key, LodSelection, PvEntry, Pvs};
