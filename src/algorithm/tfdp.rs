//! t-FDP bounded repulsion + t-distributed attraction (C3, §4.6).
//!
//! Inspired by t-SNE's heavy-tailed kernel: repulsion is bounded rather than
//! singular as `|r| -> 0`, and attraction combines a linear spring term with
//! a complementary t-force term so the two don't fight each other at short
//! range. Neither gravity nor the shared Hooke-spring pass is used; both
//! halves of the force law live in this module.

use super::{AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::config::TfdpParams;
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, GraphData, Result};

const REPULSION_SHADER: &str = r#"
struct Params {
    k_repulsion: f32,
    gamma: f32,
    spring_alpha: f32,
    t_force_beta: f32,
    node_count: u32,
    edge_count: u32,
    dt: f32,
    damping: f32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let p = positions[i];
    var f = vec2<f32>(0.0, 0.0);

    for (var j = 0u; j < params.node_count; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let delta = p - positions[j];
        let dist = length(delta);
        let dir = select(delta / max(dist, 1e-4), vec2<f32>(1.0, 0.0), dist < 1e-6);
        // Bounded t-kernel: never exceeds k_repulsion / (0.3*k_repulsion)^0
        // at r=0, unlike the 1/r^2 singularity of pure Coulomb repulsion.
        let kernel = 1.0 / pow(1.0 + dist * dist, params.gamma);
        f += dir * (params.k_repulsion * kernel);
    }

    forces[i] += f;
}
"#;

const ATTRACTION_SHADER: &str = r#"
struct Edge {
    source: u32,
    target: u32,
    weight: f32,
    _pad: u32,
}

struct Params {
    k_repulsion: f32,
    gamma: f32,
    spring_alpha: f32,
    t_force_beta: f32,
    node_count: u32,
    edge_count: u32,
    dt: f32,
    damping: f32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> edges: array<Edge>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.edge_count) {
        return;
    }
    let e = edges[i];
    let delta = positions[e.target] - positions[e.source];
    let dist = max(length(delta), 1e-4);
    let dir = delta / dist;

    // Linear spring term plus a t-distributed term that grows sub-linearly,
    // so long edges don't overwhelm short ones. `alpha*(1+beta) < 1` is
    // enforced on the host so the combined pull never runs away.
    let linear = params.spring_alpha * dist;
    let t_term = params.t_force_beta * (dist * dist) / (1.0 + dist * dist);
    let mag = e.weight * (linear + t_term);

    forces[e.source] += dir * mag;
    forces[e.target] -= dir * mag;
}
"#;

/// Bounded-kernel repulsion paired with a linear+t-distributed attraction;
/// owns both halves of its force law.
pub struct Tfdp {
    config: AlgorithmConfig,
    edge_count: u32,

    repulsion_layout: Option<wgpu::BindGroupLayout>,
    repulsion_pipeline: Option<wgpu::ComputePipeline>,
    attraction_layout: Option<wgpu::BindGroupLayout>,
    attraction_pipeline: Option<wgpu::ComputePipeline>,

    params: Option<wgpu::Buffer>,

    repulsion_bind_groups: Option<[wgpu::BindGroup; 2]>,
    attraction_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl Tfdp {
    pub fn new(config: AlgorithmConfig) -> Result<Self> {
        config.tfdp.validate()?;
        Ok(Self {
            config,
            edge_count: 0,
            repulsion_layout: None,
            repulsion_pipeline: None,
            attraction_layout: None,
            attraction_pipeline: None,
            params: None,
            repulsion_bind_groups: None,
            attraction_bind_groups: None,
        })
    }
}

impl ForceAlgorithm for Tfdp {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::Tfdp,
            name: "tfdp",
            min_nodes: 0,
            max_nodes: 20_000,
            complexity: Complexity::Quadratic,
        }
    }

    fn handles_gravity(&self) -> bool {
        false
    }

    fn handles_springs(&self) -> bool {
        true
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let repulsion_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tfdp Repulsion Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.repulsion_pipeline = Some(ctx.create_compute_pipeline(
            "Tfdp Repulsion",
            REPULSION_SHADER,
            "main",
            &repulsion_layout,
        )?);
        self.repulsion_layout = Some(repulsion_layout);

        let attraction_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tfdp Attraction Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), storage_entry(2, true), uniform_entry(3)],
        });
        self.attraction_pipeline = Some(ctx.create_compute_pipeline(
            "Tfdp Attraction",
            ATTRACTION_SHADER,
            "main",
            &attraction_layout,
        )?);
        self.attraction_layout = Some(attraction_layout);

        self.params = Some(ctx.create_uniform_buffer::<TfdpParams>("Tfdp Params"));
        Ok(())
    }

    fn create_buffers(&mut self, _ctx: &GpuContext, _max_nodes: u32, _max_edges: u32) -> Result<()> {
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let params = self.params.as_ref().unwrap();

        let repulsion_layout = self.repulsion_layout.as_ref().unwrap();
        let make_repulsion = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Tfdp Repulsion Bind Group"),
                layout: repulsion_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: shared.positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: shared.forces.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        self.repulsion_bind_groups = Some([make_repulsion(0), make_repulsion(1)]);

        let attraction_layout = self.attraction_layout.as_ref().unwrap();
        let make_attraction = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Tfdp Attraction Bind Group"),
                layout: attraction_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: shared.positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: shared.forces.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: shared.edges.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        self.attraction_bind_groups = Some([make_attraction(0), make_attraction(1)]);

        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, dt: f32, damping: f32) -> Result<()> {
        self.edge_count = graph.edge_count();
        let params = self.config.tfdp.pack(graph.node_count(), self.edge_count, dt, damping);
        ctx.queue.write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Tfdp Repulsion"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.repulsion_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.repulsion_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        if self.edge_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Tfdp Attraction"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.attraction_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.attraction_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(self.edge_count, 256), 1, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::AlgorithmConfig;

    #[test]
    fn rejects_unstable_spring_beta_combination() {
        let mut config = AlgorithmConfig::with_defaults();
        config.tfdp.spring_alpha = 0.9;
        config.tfdp.t_force_beta = 0.9;
        assert!(super::Tfdp::new(config).is_err());
    }

    #[test]
    fn bounded_kernel_never_exceeds_value_at_zero_distance() {
        let gamma = 1.0f32;
        let kernel_at = |dist: f32| 1.0 / (1.0 + dist * dist).powf(gamma);
        let at_zero = kernel_at(0.0);
        let at_far = kernel_at(1000.0);
        assert!(at_zero >= at_far);
        assert!(at_zero.is_finite());
    }
}
