//! LinLog repulsion (C3, §4.5).
//!
//! Shares ForceAtlas2's degree-weighted Coulomb repulsion (`mass = deg+1`)
//! plus a constant, mass-scaled gravity term, but delegates attraction to
//! the shared Hooke-spring pass (`handles_springs = false`). A dedicated
//! logarithmic attraction shader is kept below, matching the source
//! material, but is never wired into a pipeline — see the open question in
//! the design notes about duplicated, unused shader variants.

use super::{compute_total_degree, AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::config::LinLogParams;
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, GraphData, Result};

const REPULSION_SHADER: &str = r#"
struct Params {
    k_repulsion: f32,
    k_gravity: f32,
    node_count: u32,
    edge_count: u32,
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

    let d = max(length(p), 1e-3);
    f -= (p / d) * (params.k_gravity * mass_i);

    forces[i] += f;
}
"#;

/// Retained per the original LinLog source but never built into a
/// pipeline: attraction for this algorithm runs through the shared Hooke
/// springs pass instead (`handles_springs() == false`).
#[allow(dead_code)]
const LOG_ATTRACTION_SHADER: &str = r#"
struct Edge {
    source: u32,
    target: u32,
    weight: f32,
    _pad: u32,
}

struct Params {
    k_repulsion: f32,
    k_gravity: f32,
    node_count: u32,
    edge_count: u32,
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
    let mag = e.weight * log(1.0 + dist);
    forces[e.source] += dir * mag;
    forces[e.target] -= dir * mag;
}
"#;

/// Degree-weighted Coulomb repulsion identical in shape to ForceAtlas2's,
/// with its own constant (non-strong) gravity term. Attraction is left to
/// the shared Hooke-spring pass.
pub struct LinLog {
    config: AlgorithmConfig,

    repulsion_layout: Option<wgpu::BindGroupLayout>,
    repulsion_pipeline: Option<wgpu::ComputePipeline>,

    degrees: Option<wgpu::Buffer>,
    params: Option<wgpu::Buffer>,

    repulsion_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl LinLog {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self {
            config,
            repulsion_layout: None,
            repulsion_pipeline: None,
            degrees: None,
            params: None,
            repulsion_bind_groups: None,
        }
    }
}

impl ForceAlgorithm for LinLog {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::LinLog,
            name: "linlog",
            min_nodes: 0,
            max_nodes: 20_000,
            complexity: Complexity::Quadratic,
        }
    }

    fn handles_gravity(&self) -> bool {
        true
    }

    fn handles_springs(&self) -> bool {
        false
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let repulsion_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LinLog Repulsion Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), storage_entry(2, true), uniform_entry(3)],
        });
        self.repulsion_pipeline = Some(ctx.create_compute_pipeline(
            "LinLog Repulsion",
            REPULSION_SHADER,
            "main",
            &repulsion_layout,
        )?);
        self.repulsion_layout = Some(repulsion_layout);
        self.params = Some(ctx.create_uniform_buffer::<LinLogParams>("LinLog Params"));
        Ok(())
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: u32, _max_edges: u32) -> Result<()> {
        self.degrees = Some(ctx.create_storage_buffer("LinLog Degrees", (max_nodes.max(1) as u64) * 4, true));
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let degrees = self.degrees.as_ref().expect("create_buffers first");
        let params = self.params.as_ref().unwrap();
        let layout = self.repulsion_layout.as_ref().unwrap();
        let make = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("LinLog Repulsion Bind Group"),
                layout,
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
        self.repulsion_bind_groups = Some([make(0), make(1)]);
        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
        let degree = compute_total_degree(graph.node_count(), &graph.edges);
        ctx.queue
            .write_buffer(self.degrees.as_ref().unwrap(), 0, bytemuck::cast_slice(&degree));
        let params = self.config.linlog.pack(graph.node_count(), graph.edge_count());
        ctx.queue.write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("LinLog Repulsion"),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.repulsion_pipeline.as_ref().unwrap());
        pass.set_bind_group(0, &self.repulsion_bind_groups.as_ref().unwrap()[role], &[]);
        pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn handles_springs_is_false_so_shared_hooke_pass_runs() {
        let algo = super::LinLog::new(crate::AlgorithmConfig::with_defaults());
        assert!(!algo.handles_springs());
        assert!(algo.handles_gravity());
    }
}
