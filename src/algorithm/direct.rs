//! Direct all-pairs (N²) repulsion (C3, §4.3).

use super::{AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, GraphData, Result};

const SHADER: &str = r#"
struct Params {
    k_repulsion: f32,
    min_distance: f32,
    node_count: u32,
    _pad: u32,
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
    let d_min_sq = params.min_distance * params.min_distance;

    for (var j = 0u; j < params.node_count; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let delta = p - positions[j];
        let dist_sq = max(dot(delta, delta), d_min_sq);
        let dir = delta / sqrt(dist_sq);
        f += dir * (params.k_repulsion / dist_sq);
    }

    forces[i] += f;
}
"#;

#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct DirectParams {
    k_repulsion: f32,
    min_distance: f32,
    node_count: u32,
    _pad: u32,
}

/// One thread per node, looping over every other node: `F = k * r_hat /
/// max(|r|^2, d_min^2)`. No attraction of its own — springs come from the
/// shared pipeline pass.
pub struct Direct {
    config: AlgorithmConfig,
    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_groups: Option<[wgpu::BindGroup; 2]>,
    params: Option<wgpu::Buffer>,
}

impl Direct {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self {
            config,
            pipeline: None,
            bind_group_layout: None,
            bind_groups: None,
            params: None,
        }
    }
}

impl ForceAlgorithm for Direct {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::Direct,
            name: "direct",
            min_nodes: 0,
            max_nodes: 10_000,
            complexity: Complexity::Quadratic,
        }
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Direct Bind Group Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.pipeline = Some(ctx.create_compute_pipeline("Direct Repulsion", SHADER, "main", &layout)?);
        self.bind_group_layout = Some(layout);
        self.params = Some(ctx.create_uniform_buffer::<DirectParams>("Direct Params"));
        Ok(())
    }

    fn create_buffers(&mut self, _ctx: &GpuContext, _max_nodes: u32, _max_edges: u32) -> Result<()> {
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let layout = self.bind_group_layout.as_ref().expect("create_pipelines first");
        let params = self.params.as_ref().unwrap();
        let make = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Direct Bind Group"),
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
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        self.bind_groups = Some([make(0), make(1)]);
        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
        let params = DirectParams {
            k_repulsion: self.config.repulsion_strength,
            min_distance: self.config.min_distance,
            node_count: graph.node_count(),
            _pad: 0,
        };
        ctx.queue
            .write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Direct Repulsion"),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.pipeline.as_ref().unwrap());
        pass.set_bind_group(0, &self.bind_groups.as_ref().unwrap()[role], &[]);
        pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
    }
}

#[cfg(test)]
mod tests {
    /// CPU emulation of the pairwise law: `F_ij = k * r_hat / max(|r|^2,
    /// d_min^2)` is antisymmetric, `F_ij = -F_ji`.
    #[test]
    fn repulsion_law_is_antisymmetric() {
        let k = 100.0f32;
        let d_min = 1.0f32;
        let a = (0.0f32, 0.0f32);
        let b = (3.0f32, 4.0f32);

        let pair_force = |from: (f32, f32), to: (f32, f32)| -> (f32, f32) {
            let dx = from.0 - to.0;
            let dy = from.1 - to.1;
            let dist_sq = (dx * dx + dy * dy).max(d_min * d_min);
            let dist = dist_sq.sqrt();
            let mag = k / dist_sq;
            (dx / dist * mag, dy / dist * mag)
        };

        let f_ab = pair_force(a, b);
        let f_ba = pair_force(b, a);
        assert!((f_ab.0 + f_ba.0).abs() < 1e-6);
        assert!((f_ab.1 + f_ba.1).abs() < 1e-6);
    }

    #[test]
    fn repulsion_is_clamped_near_coincident_points() {
        let k = 100.0f32;
        let d_min = 1.0f32;
        let dist_sq = (1e-6f32).max(d_min * d_min);
        let mag = k / dist_sq;
        assert!(mag.is_finite());
        assert!(mag <= k / (d_min * d_min) + 1e-3);
    }
}
