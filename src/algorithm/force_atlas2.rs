//! ForceAtlas2 repulsion + attraction (C3, §4.5).
//!
//! Degree-weighted Coulomb repulsion (`mass = deg+1`) with a built-in
//! gravity term, plus a per-edge attraction pass that runs either linear or
//! LinLog-style logarithmic. Owns both halves of its force law, so it
//! reports `handles_springs = true` and `handles_gravity = true` and the
//! shared Hooke-spring and point-mass gravity passes are skipped for it.

use super::{compute_total_degree, AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::config::ForceAtlas2Params;
use crate::{AlgorithmConfig, GraphData, Result};

const REPULSION_GRAVITY_SHADER: &str = r#"
struct Params {
    k_repulsion: f32,
    k_gravity: f32,
    strong_gravity: u32,
    lin_log_mode: u32,
    edge_weight_influence: f32,
    node_count: u32,
    edge_count: u32,
    dt: f32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> degrees: array<u32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let p = positions[i];
    let mass_i = f32(degrees[i] + 1u);
    var f = vec2<f32>(0.0, 0.0);

    for (var j = 0u; j < params.node_count; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let delta = p - positions[j];
        let dist = max(length(delta), 1e-3);
        let mass_j = f32(degrees[j] + 1u);
        f += (delta / dist) * (params.k_repulsion * mass_i * mass_j / dist);
    }

    if (params.strong_gravity != 0u) {
        f -= p * (params.k_gravity * mass_i);
    } else {
        let d = max(length(p), 1e-3);
        f -= (p / d) * (params.k_gravity * mass_i);
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
    k_gravity: f32,
    strong_gravity: u32,
    lin_log_mode: u32,
    edge_weight_influence: f32,
    node_count: u32,
    edge_count: u32,
    dt: f32,
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
    let w = pow(e.weight, params.edge_weight_influence);

    var mag: f32;
    if (params.lin_log_mode != 0u) {
        mag = w * log(1.0 + dist);
    } else {
        mag = w * dist;
    }

    forces[e.source] += dir * mag;
    forces[e.target] -= dir * mag;
}
"#;

/// Degree-weighted Coulomb repulsion (`F = k*(deg_i+1)(deg_j+1)/|r|`) with
/// built-in gravity, plus linear or LinLog-mode attraction per edge.
pub struct ForceAtlas2 {
    config: AlgorithmConfig,
    edge_count: u32,

    repulsion_layout: Option<wgpu::BindGroupLayout>,
    repulsion_pipeline: Option<wgpu::ComputePipeline>,
    attraction_layout: Option<wgpu::BindGroupLayout>,
    attraction_pipeline: Option<wgpu::ComputePipeline>,

    degrees: Option<wgpu::Buffer>,
    params: Option<wgpu::Buffer>,

    repulsion_bind_groups: Option<[wgpu::BindGroup; 2]>,
    attraction_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl ForceAtlas2 {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self {
            config,
            edge_count: 0,
            repulsion_layout: None,
            repulsion_pipeline: None,
            attraction_layout: None,
            attraction_pipeline: None,
            degrees: None,
            params: None,
            repulsion_bind_groups: None,
            attraction_bind_groups: None,
        }
    }
}

impl ForceAlgorithm for ForceAtlas2 {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::ForceAtlas2,
            name: "force_atlas2",
            min_nodes: 0,
            max_nodes: 20_000,
            complexity: Complexity::Quadratic,
        }
    }

    fn handles_gravity(&self) -> bool {
        true
    }

    fn handles_springs(&self) -> bool {
        true
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let repulsion_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ForceAtlas2 Repulsion Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), storage_entry(2, true), uniform_entry(3)],
        });
        self.repulsion_pipeline = Some(ctx.create_compute_pipeline(
            "ForceAtlas2 Repulsion",
            REPULSION_GRAVITY_SHADER,
            "main",
            &repulsion_layout,
        )?);
        self.repulsion_layout = Some(repulsion_layout);

        let attraction_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ForceAtlas2 Attraction Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), storage_entry(2, true), uniform_entry(3)],
        });
        self.attraction_pipeline = Some(ctx.create_compute_pipeline(
            "ForceAtlas2 Attraction",
            ATTRACTION_SHADER,
            "main",
            &attraction_layout,
        )?);
        self.attraction_layout = Some(attraction_layout);

        self.params = Some(ctx.create_uniform_buffer::<ForceAtlas2Params>("ForceAtlas2 Params"));
        Ok(())
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: u32, _max_edges: u32) -> Result<()> {
        self.degrees = Some(ctx.create_storage_buffer("ForceAtlas2 Degrees", (max_nodes.max(1) as u64) * 4, true));
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let degrees = self.degrees.as_ref().expect("create_buffers first");
        let params = self.params.as_ref().unwrap();

        let repulsion_layout = self.repulsion_layout.as_ref().unwrap();
        let make_repulsion = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("ForceAtlas2 Repulsion Bind Group"),
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
                        resource: degrees.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        self.repulsion_bind_groups = Some([make_repulsion(0), make_repulsion(1)]);

        let attraction_layout = self.attraction_layout.as_ref().unwrap();
        let make_attraction = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("ForceAtlas2 Attraction Bind Group"),
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

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, dt: f32, _damping: f32) -> Result<()> {
        self.edge_count = graph.edge_count();
        let degree = compute_total_degree(graph.node_count(), &graph.edges);
        ctx.queue
            .write_buffer(self.degrees.as_ref().unwrap(), 0, bytemuck::cast_slice(&degree));

        let params = self.config.force_atlas2.pack(graph.node_count(), self.edge_count, dt);
        ctx.queue.write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ForceAtlas2 Repulsion"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.repulsion_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.repulsion_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        if self.edge_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ForceAtlas2 Attraction"),
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
    use crate::Edge;

    #[test]
    fn total_degree_counts_both_endpoints() {
        let edges = vec![Edge::new(0, 1), Edge::new(1, 2)];
        let degree = super::compute_total_degree(3, &edges);
        assert_eq!(degree, vec![1, 2, 1]);
    }

    /// `F = k*(deg_i+1)(deg_j+1)/|r|` decays linearly with distance rather
    /// than quadratically, matching ForceAtlas2's softer long-range falloff.
    #[test]
    fn repulsion_denominator_is_linear_not_quadratic() {
        let k = 10.0f32;
        let mass = 2.0f32;
        let force_at = |dist: f32| k * mass * mass / dist;
        let near = force_at(1.0);
        let far = force_at(2.0);
        assert!((near / far - 2.0).abs() < 1e-5);
    }
}
