//! Force-algorithm contract & registry (C2).
//!
//! Every algorithm below is polymorphic over the same small surface:
//! allocate its own buffers, build its own pipelines and bind groups against
//! the shared node/edge buffers, pack its uniforms, and record exactly one
//! compute-pass sequence into the orchestrator's encoder each tick.

mod barnes_hut;
mod community;
mod density_field;
mod direct;
mod force_atlas2;
mod linlog;
mod relativity_atlas;
mod tfdp;

pub use barnes_hut::BarnesHut;
pub use community::Community;
pub use density_field::DensityField;
pub use direct::Direct;
pub use force_atlas2::ForceAtlas2;
pub use linlog::LinLog;
pub use relativity_atlas::RelativityAtlas;
pub use tfdp::Tfdp;

use crate::{Edge, GpuContext, GraphData, Result};
use std::collections::HashMap;

/// Total degree (in + out) per node, computed CPU-side from the edge list.
/// Used by the degree-weighted repulsion kernels (ForceAtlas2, LinLog,
/// Community) as a node "mass" proxy; O(E), cheap enough to recompute on
/// every `update_uniforms` call.
pub(crate) fn compute_total_degree(node_count: u32, edges: &[Edge]) -> Vec<u32> {
    let mut degree = vec![0u32; node_count as usize];
    for e in edges {
        degree[e.source as usize] += 1;
        degree[e.target as usize] += 1;
    }
    degree
}

/// Stable identifier for a registered algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    Direct,
    BarnesHut,
    ForceAtlas2,
    LinLog,
    Tfdp,
    DensityField,
    RelativityAtlas,
    Community,
}

/// Asymptotic repulsion-pass cost, used only for descriptive purposes (the
/// registry's auto-selection cascade is driven by fixed node-count bands,
/// not this field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Quadratic,
    NLogN,
    Linear,
}

/// Immutable metadata describing an algorithm, independent of its current
/// buffer/pipeline state.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmDescriptor {
    pub id: AlgorithmId,
    pub name: &'static str,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub complexity: Complexity,
}

/// The node/edge/attribute buffers shared across every algorithm, owned by
/// [`crate::pipeline::SimulationPipeline`]. `positions` is a ping-pong pair;
/// algorithms read whichever index `role` designates as current.
pub struct SharedBuffers<'a> {
    pub positions: &'a [wgpu::Buffer; 2],
    pub forces: &'a wgpu::Buffer,
    pub edges: &'a wgpu::Buffer,
    pub attributes: &'a wgpu::Buffer,
}

/// Uniform contract every force algorithm implements (C2). A repulsion
/// (and, for algorithms with `handles_springs() == true`, attraction)
/// compute-pass sequence that the orchestrator records in between its own
/// `clear_forces` and `integrate` passes.
pub trait ForceAlgorithm: Send {
    fn descriptor(&self) -> AlgorithmDescriptor;

    /// True if this algorithm adds its own gravity term and the shared
    /// point-mass gravity in `integrate` should be disabled (by setting
    /// `SimulationConfig::gravity = 0.0` when this algorithm is active).
    fn handles_gravity(&self) -> bool {
        false
    }

    /// True if this algorithm records its own attraction pass and the
    /// shared Hooke-spring pass should be skipped.
    fn handles_springs(&self) -> bool {
        false
    }

    /// Compile shader modules and build compute pipelines. Called once,
    /// before `create_buffers`.
    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()>;

    /// Allocate auxiliary GPU buffers sized for `max_nodes`/`max_edges`.
    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: u32, max_edges: u32) -> Result<()>;

    /// Build bind groups against the shared buffers. Re-run whenever the
    /// shared buffers are reallocated (graph replace).
    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()>;

    /// Re-pack and upload this algorithm's uniform block(s) for the current
    /// graph size and tick parameters.
    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, dt: f32, damping: f32) -> Result<()>;

    /// Record this tick's repulsion (and, if `handles_springs`, attraction)
    /// passes into `encoder`. `role` selects which ping-pong half holds the
    /// current positions.
    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize);

    /// Release any GPU resources this algorithm owns ahead of being swapped
    /// out or the simulation being disposed.
    fn destroy(&mut self) {}
}

/// Keyed map of algorithm instances plus the node-count auto-selection
/// cascade from the design: `< 5_000` direct, `5_000..=50_000` Barnes-Hut,
/// `> 50_000` density field, falling back through that order if a
/// preferred algorithm was never registered.
#[derive(Default)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<AlgorithmId, Box<dyn ForceAlgorithm>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, algo: Box<dyn ForceAlgorithm>) {
        self.algorithms.insert(algo.descriptor().id, algo);
    }

    pub fn get(&self, id: AlgorithmId) -> Option<&dyn ForceAlgorithm> {
        self.algorithms.get(&id).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, id: AlgorithmId) -> Option<&mut Box<dyn ForceAlgorithm>> {
        self.algorithms.get_mut(&id)
    }

    pub fn contains(&self, id: AlgorithmId) -> bool {
        self.algorithms.contains_key(&id)
    }

    /// Recommend an algorithm id for `node_count`, cascading through the
    /// preference order below if the ideal choice isn't registered.
    pub fn recommend(&self, node_count: u32) -> Option<AlgorithmId> {
        let preference: &[AlgorithmId] = if node_count < 5_000 {
            &[AlgorithmId::Direct, AlgorithmId::BarnesHut, AlgorithmId::DensityField]
        } else if node_count <= 50_000 {
            &[AlgorithmId::BarnesHut, AlgorithmId::DensityField, AlgorithmId::Direct]
        } else {
            &[AlgorithmId::DensityField, AlgorithmId::BarnesHut, AlgorithmId::Direct]
        };
        preference.iter().copied().find(|id| self.contains(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(AlgorithmId);
    impl ForceAlgorithm for Stub {
        fn descriptor(&self) -> AlgorithmDescriptor {
            AlgorithmDescriptor {
                id: self.0,
                name: "stub",
                min_nodes: 0,
                max_nodes: u32::MAX,
                complexity: Complexity::Linear,
            }
        }
        fn create_pipelines(&mut self, _ctx: &GpuContext) -> Result<()> {
            Ok(())
        }
        fn create_buffers(&mut self, _ctx: &GpuContext, _max_nodes: u32, _max_edges: u32) -> Result<()> {
            Ok(())
        }
        fn create_bind_groups(&mut self, _ctx: &GpuContext, _shared: &SharedBuffers) -> Result<()> {
            Ok(())
        }
        fn update_uniforms(&mut self, _ctx: &GpuContext, _graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
            Ok(())
        }
        fn record_repulsion_pass(&self, _encoder: &mut wgpu::CommandEncoder, _node_count: u32, _role: usize) {}
    }

    #[test]
    fn recommends_direct_below_5000() {
        let mut reg = AlgorithmRegistry::new();
        reg.register(Box::new(Stub(AlgorithmId::Direct)));
        reg.register(Box::new(Stub(AlgorithmId::BarnesHut)));
        assert_eq!(reg.recommend(100), Some(AlgorithmId::Direct));
    }

    #[test]
    fn recommends_barnes_hut_mid_range() {
        let mut reg = AlgorithmRegistry::new();
        reg.register(Box::new(Stub(AlgorithmId::Direct)));
        reg.register(Box::new(Stub(AlgorithmId::BarnesHut)));
        assert_eq!(reg.recommend(10_000), Some(AlgorithmId::BarnesHut));
    }

    #[test]
    fn recommends_density_field_above_50000() {
        let mut reg = AlgorithmRegistry::new();
        reg.register(Box::new(Stub(AlgorithmId::DensityField)));
        assert_eq!(reg.recommend(100_000), Some(AlgorithmId::DensityField));
    }

    #[test]
    fn cascades_when_preferred_missing() {
        let mut reg = AlgorithmRegistry::new();
        reg.register(Box::new(Stub(AlgorithmId::Direct)));
        // Nothing registered for the 5k-50k band except Direct as a fallback.
        assert_eq!(reg.recommend(20_000), Some(AlgorithmId::Direct));
    }
}
