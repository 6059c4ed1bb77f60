//! Community / codebase cluster layout (C3, §4.8).
//!
//! Four passes: clear per-community centroid accumulators, a modulated
//! degree-weighted Coulomb repulsion (scaled by `intra_factor` within a
//! community and `inter_factor` across communities) plus distance-
//! independent gravity, atomic fixed-point centroid accumulation, and a
//! final mass-weighted pull of each node toward its community's centroid.

use super::{compute_total_degree, AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::config::CommunityParams;
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, GraphData, Result};

/// Fixed-point scale for the atomic centroid accumulators: positions are
/// accumulated as `round(p * SCALE)` since WGSL has no `atomic<f32>`.
const CENTROID_SCALE: f32 = 10.0;

const CLEAR_CENTROIDS_SHADER: &str = r#"
struct Params {
    intra_factor: f32,
    inter_factor: f32,
    cluster_strength: f32,
    gravity_k: f32,
    node_count: u32,
    edge_count: u32,
    community_count: u32,
    _pad0: u32,
}

@group(0) @binding(0) var<storage, read_write> centroid_x: array<atomic<i32>>;
@group(0) @binding(1) var<storage, read_write> centroid_y: array<atomic<i32>>;
@group(0) @binding(2) var<storage, read_write> centroid_count: array<atomic<u32>>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.community_count) {
        return;
    }
    atomicStore(&centroid_x[gid.x], 0);
    atomicStore(&centroid_y[gid.x], 0);
    atomicStore(&centroid_count[gid.x], 0u);
}
"#;

const MODULATED_REPULSION_SHADER: &str = r#"
struct Attributes { community_id: u32, depth: u32, well_radius: f32, size: f32 }

struct Params {
    intra_factor: f32,
    inter_factor: f32,
    cluster_strength: f32,
    gravity_k: f32,
    node_count: u32,
    edge_count: u32,
    community_count: u32,
    _pad0: u32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> degrees: array<u32>;
@group(0) @binding(3) var<storage, read> attributes: array<Attributes>;
@group(0) @binding(4) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let p = positions[i];
    let mass_i = f32(degrees[i] + 1u);
    let community_i = attributes[i].community_id;
    var f = vec2<f32>(0.0, 0.0);

    for (var j = 0u; j < params.node_count; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let delta = p - positions[j];
        let dist_sq = max(dot(delta, delta), 1e-4);
        let dist = sqrt(dist_sq);
        let mass_j = f32(degrees[j] + 1u);
        let factor = select(params.inter_factor, params.intra_factor, attributes[j].community_id == community_i);
        f += (delta / dist) * (factor * mass_i * mass_j / dist_sq);
    }

    // Distance-independent gravity, FA2-style: constant pull toward origin
    // scaled only by mass, not by |p|.
    let d = max(length(p), 1e-3);
    f -= (p / d) * (params.gravity_k * mass_i);

    forces[i] += f;
}
"#;

const ACCUMULATE_CENTROIDS_SHADER: &str = r#"
struct Attributes { community_id: u32, depth: u32, well_radius: f32, size: f32 }

struct Params {
    intra_factor: f32,
    inter_factor: f32,
    cluster_strength: f32,
    gravity_k: f32,
    node_count: u32,
    edge_count: u32,
    community_count: u32,
    _pad0: u32,
}

const CENTROID_SCALE: f32 = 10.0;

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read> attributes: array<Attributes>;
@group(0) @binding(2) var<storage, read_write> centroid_x: array<atomic<i32>>;
@group(0) @binding(3) var<storage, read_write> centroid_y: array<atomic<i32>>;
@group(0) @binding(4) var<storage, read_write> centroid_count: array<atomic<u32>>;
@group(0) @binding(5) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let community = attributes[i].community_id;
    let p = positions[i];
    atomicAdd(&centroid_x[community], i32(p.x * CENTROID_SCALE));
    atomicAdd(&centroid_y[community], i32(p.y * CENTROID_SCALE));
    atomicAdd(&centroid_count[community], 1u);
}
"#;

const CLUSTER_ATTRACT_SHADER: &str = r#"
struct Attributes { community_id: u32, depth: u32, well_radius: f32, size: f32 }

struct Params {
    intra_factor: f32,
    inter_factor: f32,
    cluster_strength: f32,
    gravity_k: f32,
    node_count: u32,
    edge_count: u32,
    community_count: u32,
    _pad0: u32,
}

const CENTROID_SCALE: f32 = 10.0;

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> degrees: array<u32>;
@group(0) @binding(3) var<storage, read> attributes: array<Attributes>;
@group(0) @binding(4) var<storage, read> centroid_x: array<i32>;
@group(0) @binding(5) var<storage, read> centroid_y: array<i32>;
@group(0) @binding(6) var<storage, read> centroid_count: array<u32>;
@group(0) @binding(7) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let community = attributes[i].community_id;
    let count = centroid_count[community];
    if (count == 0u) {
        return;
    }
    let centroid = vec2<f32>(
        f32(centroid_x[community]) / CENTROID_SCALE,
        f32(centroid_y[community]) / CENTROID_SCALE,
    ) / f32(count);

    let delta = centroid - positions[i];
    let dist = length(delta);
    // Mass-weighted by sqrt(deg+1) to match the repulsion pass's mass
    // scaling, so equilibrium position is independent of node mass.
    let mass_weight = sqrt(f32(degrees[i] + 1u));
    let strength = params.cluster_strength / sqrt(f32(count));
    if (dist > 1e-4) {
        forces[i] += (delta / dist) * (strength * mass_weight * dist);
    }
}
"#;

/// Degree-and-community-weighted Coulomb repulsion plus centroid-attraction
/// clustering. Owns both gravity and attraction.
pub struct Community {
    config: AlgorithmConfig,
    community_count: u32,

    clear_layout: Option<wgpu::BindGroupLayout>,
    clear_pipeline: Option<wgpu::ComputePipeline>,
    repulsion_layout: Option<wgpu::BindGroupLayout>,
    repulsion_pipeline: Option<wgpu::ComputePipeline>,
    accumulate_layout: Option<wgpu::BindGroupLayout>,
    accumulate_pipeline: Option<wgpu::ComputePipeline>,
    attract_layout: Option<wgpu::BindGroupLayout>,
    attract_pipeline: Option<wgpu::ComputePipeline>,

    degrees: Option<wgpu::Buffer>,
    centroid_x: Option<wgpu::Buffer>,
    centroid_y: Option<wgpu::Buffer>,
    centroid_count: Option<wgpu::Buffer>,
    params: Option<wgpu::Buffer>,

    clear_bind_group: Option<wgpu::BindGroup>,
    repulsion_bind_groups: Option<[wgpu::BindGroup; 2]>,
    accumulate_bind_groups: Option<[wgpu::BindGroup; 2]>,
    attract_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl Community {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self {
            config,
            community_count: 0,
            clear_layout: None,
            clear_pipeline: None,
            repulsion_layout: None,
            repulsion_pipeline: None,
            accumulate_layout: None,
            accumulate_pipeline: None,
            attract_layout: None,
            attract_pipeline: None,
            degrees: None,
            centroid_x: None,
            centroid_y: None,
            centroid_count: None,
            params: None,
            clear_bind_group: None,
            repulsion_bind_groups: None,
            accumulate_bind_groups: None,
            attract_bind_groups: None,
        }
    }
}

impl ForceAlgorithm for Community {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::Community,
            name: "community",
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
        let clear_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Community Clear Layout"),
            entries: &[storage_entry(0, false), storage_entry(1, false), storage_entry(2, false), uniform_entry(3)],
        });
        self.clear_pipeline = Some(ctx.create_compute_pipeline(
            "Community ClearCentroids",
            CLEAR_CENTROIDS_SHADER,
            "main",
            &clear_layout,
        )?);
        self.clear_layout = Some(clear_layout);

        let repulsion_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Community Repulsion Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, true),
                uniform_entry(4),
            ],
        });
        self.repulsion_pipeline = Some(ctx.create_compute_pipeline(
            "Community ModulatedRepulsion",
            MODULATED_REPULSION_SHADER,
            "main",
            &repulsion_layout,
        )?);
        self.repulsion_layout = Some(repulsion_layout);

        let accumulate_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Community Accumulate Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                uniform_entry(5),
            ],
        });
        self.accumulate_pipeline = Some(ctx.create_compute_pipeline(
            "Community AccumulateCentroids",
            ACCUMULATE_CENTROIDS_SHADER,
            "main",
            &accumulate_layout,
        )?);
        self.accumulate_layout = Some(accumulate_layout);

        let attract_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Community Attract Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, true),
                uniform_entry(7),
            ],
        });
        self.attract_pipeline = Some(ctx.create_compute_pipeline(
            "Community ClusterAttract",
            CLUSTER_ATTRACT_SHADER,
            "main",
            &attract_layout,
        )?);
        self.attract_layout = Some(attract_layout);

        self.params = Some(ctx.create_uniform_buffer::<CommunityParams>("Community Params"));
        Ok(())
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: u32, _max_edges: u32) -> Result<()> {
        self.degrees = Some(ctx.create_storage_buffer("Community Degrees", (max_nodes.max(1) as u64) * 4, true));
        let community_capacity = max_nodes.max(1);
        self.centroid_x = Some(ctx.create_storage_buffer("Community CentroidX", community_capacity as u64 * 4, false));
        self.centroid_y = Some(ctx.create_storage_buffer("Community CentroidY", community_capacity as u64 * 4, false));
        self.centroid_count = Some(ctx.create_storage_buffer("Community CentroidCount", community_capacity as u64 * 4, false));
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let degrees = self.degrees.as_ref().expect("create_buffers first");
        let centroid_x = self.centroid_x.as_ref().unwrap();
        let centroid_y = self.centroid_y.as_ref().unwrap();
        let centroid_count = self.centroid_count.as_ref().unwrap();
        let params = self.params.as_ref().unwrap();

        self.clear_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Community Clear Bind Group"),
            layout: self.clear_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: centroid_x.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: centroid_y.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: centroid_count.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: params.as_entire_binding() },
            ],
        }));

        let repulsion_layout = self.repulsion_layout.as_ref().unwrap();
        let make_repulsion = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Community Repulsion Bind Group"),
                layout: repulsion_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: shared.positions[role].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: shared.forces.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: degrees.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: shared.attributes.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
                ],
            })
        };
        self.repulsion_bind_groups = Some([make_repulsion(0), make_repulsion(1)]);

        let accumulate_layout = self.accumulate_layout.as_ref().unwrap();
        let make_accumulate = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Community Accumulate Bind Group"),
                layout: accumulate_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: shared.positions[role].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: shared.attributes.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: centroid_x.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: centroid_y.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: centroid_count.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: params.as_entire_binding() },
                ],
            })
        };
        self.accumulate_bind_groups = Some([make_accumulate(0), make_accumulate(1)]);

        let attract_layout = self.attract_layout.as_ref().unwrap();
        let make_attract = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Community Attract Bind Group"),
                layout: attract_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: shared.positions[role].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: shared.forces.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: degrees.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: shared.attributes.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: centroid_x.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: centroid_y.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 6, resource: centroid_count.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 7, resource: params.as_entire_binding() },
                ],
            })
        };
        self.attract_bind_groups = Some([make_attract(0), make_attract(1)]);

        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
        let degree = compute_total_degree(graph.node_count(), &graph.edges);
        ctx.queue
            .write_buffer(self.degrees.as_ref().unwrap(), 0, bytemuck::cast_slice(&degree));
        self.community_count = self.config.community.community_count.max(1);
        let params = self.config.community.pack(graph.node_count(), graph.edge_count());
        ctx.queue.write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Community ClearCentroids"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.clear_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.clear_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(self.community_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Community ModulatedRepulsion"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.repulsion_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.repulsion_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Community AccumulateCentroids"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.accumulate_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.accumulate_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Community ClusterAttract"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.attract_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.attract_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn mass_weighting_matches_between_repulsion_and_attraction() {
        // Repulsion scales by mass_i*mass_j = (deg+1)^2 pairwise; attraction
        // scales a single node by sqrt(deg+1). For the two to balance at
        // equilibrium the attraction weight must be the square root of the
        // repulsion weight for one node.
        let deg = 3u32;
        let repulsion_mass = (deg + 1) as f32;
        let attraction_mass = ((deg + 1) as f32).sqrt();
        assert!((attraction_mass * attraction_mass - repulsion_mass).abs() < 1e-5);
    }
}
