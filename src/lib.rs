//! GPU-accelerated force-directed graph layout engine.
//!
//! This crate repeatedly evaluates physical forces on the GPU, integrates
//! them into velocities and positions, and exposes the evolving positions
//! for rendering. Several interchangeable force models ("algorithms") are
//! supported, each expressed as a sequence of GPU compute passes sharing a
//! common buffer protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CPU Side                              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │ Graph Data  │──▶│  Controller  │──▶│  Config packer   │   │
//! │  │ + CSR       │   │ (alpha/state)│   │ (uniform blocks) │   │
//! │  └─────────────┘   └──────────────┘   └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        GPU Side                              │
//! │  clear_forces ─▶ repulsion (pluggable algorithm) ─▶ springs? │
//! │                                                   ─▶ integrate│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Read Back                               │
//! │  Updated positions copied back to CPU for rendering          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Performance
//!
//! - Direct all-pairs repulsion: O(n²) per tick.
//! - Barnes-Hut (parallel Karras radix tree): O(n log n) per tick.
//! - Relativity Atlas / density field: O(n + e) per tick for DAG-shaped or
//!   very large graphs.

mod algorithm;
mod config;
mod controller;
mod csr;
mod error;
mod gpu;
mod pipeline;
mod shaders;

pub use algorithm::{
    AlgorithmDescriptor, AlgorithmId, AlgorithmRegistry, BarnesHut, Community, Complexity,
    DensityField, Direct, ForceAlgorithm, ForceAtlas2, LinLog, RelativityAtlas, SharedBuffers,
    Tfdp,
};
pub use config::{
    cooling_decay_for_iterations, AlgorithmConfig, CommunityConfig, DensityFieldConfig,
    ForceAtlas2Config, LinLogConfig, RelativityAtlasConfig, SimulationConfig, TfdpConfig,
};
pub use controller::{ControllerEvent, ControllerState, EventSink, SimulationController};
pub use csr::{Csr, CsrPair};
pub use error::LayoutError;
pub use gpu::GpuContext;
pub use pipeline::{GraphData, SimulationPipeline};

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// A 2D position, laid out to match the GPU-side `Position` struct exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A 2D velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// A 2D accumulated force.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Force {
    pub x: f32,
    pub y: f32,
}

/// An edge between two nodes, with an optional weight (default 1.0).
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Edge {
    pub source: u32,
    pub target: u32,
    pub weight: f32,
    /// Padding to keep the struct a multiple of 16 bytes in storage arrays.
    pub _pad: u32,
}

impl Default for Edge {
    fn default() -> Self {
        Self {
            source: 0,
            target: 0,
            weight: 1.0,
            _pad: 0,
        }
    }
}

impl Edge {
    pub fn new(source: u32, target: u32) -> Self {
        Self {
            source,
            target,
            weight: 1.0,
            _pad: 0,
        }
    }

    pub fn weighted(source: u32, target: u32, weight: f32) -> Self {
        Self {
            source,
            target,
            weight,
            _pad: 0,
        }
    }
}

/// Optional per-node attributes consumed by specific algorithms.
///
/// All fields default to values that make the attribute inert: depth 0,
/// community 0, well_radius 0, size 1.0. An algorithm that doesn't use an
/// attribute simply never reads this buffer's binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct NodeAttributes {
    pub community_id: u32,
    pub depth: u32,
    pub well_radius: f32,
    pub size: f32,
}

/// Barnes-Hut tree node for GPU upload, as produced by the parallel Karras
/// radix-tree builder (see [`algorithm::barnes_hut`]). 2N-1 entries: N-1
/// internal nodes followed by N leaves.
///
/// A negative child reference encodes a leaf: `child == -(leaf_index + 1)`.
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct TreeNode {
    /// Center of mass X.
    pub center_x: f32,
    /// Center of mass Y.
    pub center_y: f32,
    /// Total mass (particle count for an unweighted tree).
    pub mass: f32,
    /// Bounding-box size (width) of the cell, for the Barnes-Hut criterion.
    pub size: f32,
    pub left_child: i32,
    pub right_child: i32,
    pub parent: i32,
    /// Padding to a 32-byte stride.
    pub _pad: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn edge_default_weight_is_one() {
        let e = Edge::new(0, 1);
        assert_eq!(e.weight, 1.0);
    }
}
