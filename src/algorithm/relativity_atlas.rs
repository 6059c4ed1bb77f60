//! Relativity Atlas: hierarchical O(N+E) layout for DAG-like graphs (C3, §4.7).
//!
//! Six phases per tick: degree counting from forward/inverse CSR, mass
//! seeding, a fixed-iteration bottom-up mass aggregation (no GPU→CPU sync —
//! see the convergence-flag note below), an embedded density-field pass for
//! global separation, sibling/cousin repulsion decomposed into radial and
//! tangential components with a phantom-zone overlay, and a final
//! gravity+linear-attraction pass. Owns both gravity and attraction.

use super::{AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::config::RelativityAtlasParams;
use crate::csr::{CsrBuffers, CsrPair};
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, GraphData, Result};

const COMPUTE_DEGREES_SHADER: &str = r#"
struct Params { node_count: u32, _pad0: u32, _pad1: u32, _pad2: u32 }

@group(0) @binding(0) var<storage, read> forward_offsets: array<u32>;
@group(0) @binding(1) var<storage, read> inverse_offsets: array<u32>;
@group(0) @binding(2) var<storage, read_write> out_degree: array<u32>;
@group(0) @binding(3) var<storage, read_write> total_degree: array<u32>;
@group(0) @binding(4) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let out_d = forward_offsets[i + 1u] - forward_offsets[i];
    let in_d = inverse_offsets[i + 1u] - inverse_offsets[i];
    out_degree[i] = out_d;
    total_degree[i] = out_d + in_d;
}
"#;

const INIT_MASS_SHADER: &str = r#"
struct Params {
    base_mass: f32,
    tangential_mult: f32,
    gravity_k: f32,
    phantom_zone_k: f32,
    node_count: u32,
    edge_count: u32,
    mass_iterations: u32,
    bubble_mode: u32,
    max_cousin_iterations: u32,
}

@group(0) @binding(0) var<storage, read> out_degree: array<u32>;
@group(0) @binding(1) var<storage, read> total_degree: array<u32>;
@group(0) @binding(2) var<storage, read_write> mass: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    if (out_degree[i] == 0u) {
        mass[i] = params.base_mass;
    } else {
        mass[i] = params.base_mass + 0.1 * f32(total_degree[i]);
    }
}
"#;

const AGGREGATE_MASS_SHADER: &str = r#"
struct Params {
    base_mass: f32,
    tangential_mult: f32,
    gravity_k: f32,
    phantom_zone_k: f32,
    node_count: u32,
    edge_count: u32,
    mass_iterations: u32,
    bubble_mode: u32,
    max_cousin_iterations: u32,
}

@group(0) @binding(0) var<storage, read> forward_offsets: array<u32>;
@group(0) @binding(1) var<storage, read> forward_indices: array<u32>;
@group(0) @binding(2) var<storage, read> mass_in: array<f32>;
@group(0) @binding(3) var<storage, read_write> mass_out: array<f32>;
@group(0) @binding(4) var<storage, read_write> converged: array<atomic<u32>>;
@group(0) @binding(5) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    var sum = mass_in[i];
    let start = forward_offsets[i];
    let end = forward_offsets[i + 1u];
    for (var k = start; k < end; k = k + 1u) {
        sum += mass_in[forward_indices[k]];
    }
    mass_out[i] = sum;
    // Written for completeness but intentionally never read back on the
    // host; reading it would force a GPU->CPU sync every iteration.
    if (abs(sum - mass_in[i]) < 1e-4) {
        atomicAdd(&converged[0], 1u);
    }
}
"#;

const SIBLING_REPULSION_SHADER: &str = r#"
struct Attributes { community_id: u32, depth: u32, well_radius: f32, size: f32 }

struct Params {
    base_mass: f32,
    tangential_mult: f32,
    gravity_k: f32,
    phantom_zone_k: f32,
    node_count: u32,
    edge_count: u32,
    mass_iterations: u32,
    bubble_mode: u32,
    max_cousin_iterations: u32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> forward_offsets: array<u32>;
@group(0) @binding(3) var<storage, read> forward_indices: array<u32>;
@group(0) @binding(4) var<storage, read> inverse_offsets: array<u32>;
@group(0) @binding(5) var<storage, read> inverse_indices: array<u32>;
@group(0) @binding(6) var<storage, read> mass: array<f32>;
@group(0) @binding(7) var<storage, read> attributes: array<Attributes>;
@group(0) @binding(8) var<uniform> params: Params;

fn repel_pair(i: u32, j: u32, parent_pos: vec2<f32>, p: vec2<f32>) -> vec2<f32> {
    let delta = p - positions[j];
    let dist = max(length(delta), 1e-3);
    let dir = delta / dist;

    // Decompose into radial (w.r.t. parent) vs tangential and amplify the
    // tangential component so siblings fan out around their parent instead
    // of collapsing onto the radial line toward it.
    let radial = normalize(p - parent_pos + vec2<f32>(1e-6, 0.0));
    let radial_component = dot(dir, radial) * radial;
    let tangential_component = dir - radial_component;
    let shaped = radial_component + tangential_component * params.tangential_mult;

    var f = shaped * (mass[i] * mass[j] / (dist * dist));

    if (params.bubble_mode != 0u) {
        let overlap = attributes[i].well_radius + attributes[j].well_radius - dist;
        if (overlap > 0.0) {
            f += dir * (params.phantom_zone_k * overlap * overlap);
        }
    }
    return f;
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let p = positions[i];
    var f = vec2<f32>(0.0, 0.0);

    let parent_start = inverse_offsets[i];
    let parent_end = inverse_offsets[i + 1u];

    for (var pi = parent_start; pi < parent_end; pi = pi + 1u) {
        let parent = inverse_indices[pi];
        let parent_pos = positions[parent];
        let sib_start = forward_offsets[parent];
        let sib_end = forward_offsets[parent + 1u];

        for (var si = sib_start; si < sib_end; si = si + 1u) {
            let sibling = forward_indices[si];
            if (sibling == i) {
                continue;
            }
            f += repel_pair(i, sibling, parent_pos, p);
        }

        // Bounded cousin traversal: grandparent -> uncles -> cousins.
        let gp_start = inverse_offsets[parent];
        let gp_end = inverse_offsets[parent + 1u];
        var cousin_budget = params.max_cousin_iterations;
        for (var gi = gp_start; gi < gp_end && cousin_budget > 0u; gi = gi + 1u) {
            let grandparent = inverse_indices[gi];
            let uncle_start = forward_offsets[grandparent];
            let uncle_end = forward_offsets[grandparent + 1u];
            for (var ui = uncle_start; ui < uncle_end && cousin_budget > 0u; ui = ui + 1u) {
                let uncle = forward_indices[ui];
                if (uncle == parent) {
                    continue;
                }
                let cousin_start = forward_offsets[uncle];
                let cousin_end = forward_offsets[uncle + 1u];
                for (var ci = cousin_start; ci < cousin_end && cousin_budget > 0u; ci = ci + 1u) {
                    let cousin = forward_indices[ci];
                    f += repel_pair(i, cousin, parent_pos, p) * 0.25;
                    cousin_budget -= 1u;
                }
            }
        }
    }

    forces[i] += f;
}
"#;

const GRAVITY_ATTRACTION_SHADER: &str = r#"
struct Edge { source: u32, target: u32, weight: f32, _pad: u32 }

struct Params {
    base_mass: f32,
    tangential_mult: f32,
    gravity_k: f32,
    phantom_zone_k: f32,
    node_count: u32,
    edge_count: u32,
    mass_iterations: u32,
    bubble_mode: u32,
    max_cousin_iterations: u32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> edges: array<Edge>;
@group(0) @binding(3) var<storage, read> mass: array<f32>;
@group(0) @binding(4) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i < params.node_count) {
        let p = positions[i];
        let d = max(length(p), 1e-3);
        forces[i] -= (p / d) * (params.gravity_k * mass[i]);
    }

    if (i >= params.edge_count) {
        return;
    }
    let e = edges[i];
    // No rest length: pure `F = d` linear pull.
    let delta = positions[e.target] - positions[e.source];
    forces[e.source] += delta * e.weight;
    forces[e.target] -= delta * e.weight;
}
"#;

/// Six-phase hierarchical repulsion/attraction for DAG-shaped graphs, using
/// forward/inverse CSR adjacency instead of the octree used by Barnes-Hut.
pub struct RelativityAtlas {
    config: AlgorithmConfig,
    edge_count: u32,
    max_nodes: u32,
    max_edges: u32,
    has_bounds: bool,

    degrees_layout: Option<wgpu::BindGroupLayout>,
    degrees_pipeline: Option<wgpu::ComputePipeline>,
    init_mass_layout: Option<wgpu::BindGroupLayout>,
    init_mass_pipeline: Option<wgpu::ComputePipeline>,
    aggregate_layout: Option<wgpu::BindGroupLayout>,
    aggregate_pipeline: Option<wgpu::ComputePipeline>,
    sibling_layout: Option<wgpu::BindGroupLayout>,
    sibling_pipeline: Option<wgpu::ComputePipeline>,
    gravity_attract_layout: Option<wgpu::BindGroupLayout>,
    gravity_attract_pipeline: Option<wgpu::ComputePipeline>,

    forward_csr: Option<CsrBuffers>,
    inverse_csr: Option<CsrBuffers>,
    out_degree: Option<wgpu::Buffer>,
    total_degree: Option<wgpu::Buffer>,
    mass: Option<[wgpu::Buffer; 2]>,
    converged: Option<wgpu::Buffer>,
    params: Option<wgpu::Buffer>,

    degrees_bind_group: Option<wgpu::BindGroup>,
    init_mass_bind_group: Option<wgpu::BindGroup>,
    aggregate_bind_groups: Option<[wgpu::BindGroup; 2]>,
    sibling_bind_groups: Option<[wgpu::BindGroup; 2]>,
    gravity_attract_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl RelativityAtlas {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self {
            config,
            edge_count: 0,
            max_nodes: 0,
            max_edges: 0,
            has_bounds: false,
            degrees_layout: None,
            degrees_pipeline: None,
            init_mass_layout: None,
            init_mass_pipeline: None,
            aggregate_layout: None,
            aggregate_pipeline: None,
            sibling_layout: None,
            sibling_pipeline: None,
            gravity_attract_layout: None,
            gravity_attract_pipeline: None,
            forward_csr: None,
            inverse_csr: None,
            out_degree: None,
            total_degree: None,
            mass: None,
            converged: None,
            params: None,
            degrees_bind_group: None,
            init_mass_bind_group: None,
            aggregate_bind_groups: None,
            sibling_bind_groups: None,
            gravity_attract_bind_groups: None,
        }
    }

    /// Upload forward/inverse CSR adjacency for this tick's graph; must run
    /// before `record_repulsion_pass` whenever the hierarchy changes.
    pub fn upload_topology(&self, ctx: &GpuContext, node_count: u32, edges: &[crate::Edge]) -> Result<()> {
        let pair = CsrPair::build(node_count, edges);
        pair.validate(node_count)?;
        self.forward_csr.as_ref().unwrap().upload(ctx, &pair.forward)?;
        self.inverse_csr.as_ref().unwrap().upload(ctx, &pair.inverse)?;
        Ok(())
    }
}

impl ForceAlgorithm for RelativityAtlas {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::RelativityAtlas,
            name: "relativity_atlas",
            min_nodes: 0,
            max_nodes: u32::MAX,
            complexity: Complexity::Linear,
        }
    }

    fn handles_gravity(&self) -> bool {
        true
    }

    fn handles_springs(&self) -> bool {
        true
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let degrees_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("RelativityAtlas Degrees Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                uniform_entry(4),
            ],
        });
        self.degrees_pipeline = Some(ctx.create_compute_pipeline(
            "RelativityAtlas Degrees",
            COMPUTE_DEGREES_SHADER,
            "main",
            &degrees_layout,
        )?);
        self.degrees_layout = Some(degrees_layout);

        let init_mass_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("RelativityAtlas InitMass Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, true), storage_entry(2, false), uniform_entry(3)],
        });
        self.init_mass_pipeline = Some(ctx.create_compute_pipeline(
            "RelativityAtlas InitMass",
            INIT_MASS_SHADER,
            "main",
            &init_mass_layout,
        )?);
        self.init_mass_layout = Some(init_mass_layout);

        let aggregate_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("RelativityAtlas Aggregate Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
                uniform_entry(5),
            ],
        });
        self.aggregate_pipeline = Some(ctx.create_compute_pipeline(
            "RelativityAtlas Aggregate",
            AGGREGATE_MASS_SHADER,
            "main",
            &aggregate_layout,
        )?);
        self.aggregate_layout = Some(aggregate_layout);

        let sibling_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("RelativityAtlas Sibling Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, true),
                storage_entry(7, true),
                uniform_entry(8),
            ],
        });
        self.sibling_pipeline = Some(ctx.create_compute_pipeline(
            "RelativityAtlas SiblingRepulsion",
            SIBLING_REPULSION_SHADER,
            "main",
            &sibling_layout,
        )?);
        self.sibling_layout = Some(sibling_layout);

        let gravity_attract_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("RelativityAtlas GravityAttract Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, true),
                uniform_entry(4),
            ],
        });
        self.gravity_attract_pipeline = Some(ctx.create_compute_pipeline(
            "RelativityAtlas GravityAttraction",
            GRAVITY_ATTRACTION_SHADER,
            "main",
            &gravity_attract_layout,
        )?);
        self.gravity_attract_layout = Some(gravity_attract_layout);

        self.params = Some(ctx.create_uniform_buffer::<RelativityAtlasParams>("RelativityAtlas Params"));
        Ok(())
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: u32, max_edges: u32) -> Result<()> {
        self.max_nodes = max_nodes;
        self.max_edges = max_edges;
        self.has_bounds = self.config.density_field.bounds.is_some();

        self.forward_csr = Some(CsrBuffers::new(ctx, max_nodes, max_edges, "RelativityAtlas Forward"));
        self.inverse_csr = Some(CsrBuffers::new(ctx, max_nodes, max_edges, "RelativityAtlas Inverse"));
        self.out_degree = Some(ctx.create_storage_buffer("RelativityAtlas OutDegree", (max_nodes.max(1) as u64) * 4, false));
        self.total_degree = Some(ctx.create_storage_buffer("RelativityAtlas TotalDegree", (max_nodes.max(1) as u64) * 4, false));
        self.mass = Some([
            ctx.create_storage_buffer("RelativityAtlas Mass A", (max_nodes.max(1) as u64) * 4, false),
            ctx.create_storage_buffer("RelativityAtlas Mass B", (max_nodes.max(1) as u64) * 4, false),
        ]);
        self.converged = Some(ctx.create_storage_buffer("RelativityAtlas Converged", 4, false));
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let forward = self.forward_csr.as_ref().unwrap();
        let inverse = self.inverse_csr.as_ref().unwrap();
        let out_degree = self.out_degree.as_ref().unwrap();
        let total_degree = self.total_degree.as_ref().unwrap();
        let mass = self.mass.as_ref().unwrap();
        let converged = self.converged.as_ref().unwrap();
        let params = self.params.as_ref().unwrap();

        self.degrees_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("RelativityAtlas Degrees Bind Group"),
            layout: self.degrees_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: forward.offsets.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: inverse.offsets.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: out_degree.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: total_degree.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
            ],
        }));

        self.init_mass_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("RelativityAtlas InitMass Bind Group"),
            layout: self.init_mass_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: out_degree.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: total_degree.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: mass[0].as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: params.as_entire_binding() },
            ],
        }));

        let aggregate_layout = self.aggregate_layout.as_ref().unwrap();
        let make_aggregate = |src: usize, dst: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("RelativityAtlas Aggregate Bind Group"),
                layout: aggregate_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: forward.offsets.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: forward.indices.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: mass[src].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: mass[dst].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: converged.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: params.as_entire_binding() },
                ],
            })
        };
        // One bind group per ping-pong direction; the odd/even iteration
        // count at record time picks which one finishes in mass[0].
        self.aggregate_bind_groups = Some([make_aggregate(0, 1), make_aggregate(1, 0)]);

        let sibling_layout = self.sibling_layout.as_ref().unwrap();
        let make_sibling = |role: usize, final_mass: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("RelativityAtlas Sibling Bind Group"),
                layout: sibling_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: shared.positions[role].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: shared.forces.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: forward.offsets.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: forward.indices.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: inverse.offsets.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: inverse.indices.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 6, resource: mass[final_mass].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 7, resource: shared.attributes.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 8, resource: params.as_entire_binding() },
                ],
            })
        };
        let final_mass = (self.config.relativity_atlas.mass_iterations % 2) as usize;
        self.sibling_bind_groups = Some([make_sibling(0, final_mass), make_sibling(1, final_mass)]);

        let gravity_attract_layout = self.gravity_attract_layout.as_ref().unwrap();
        let make_gravity_attract = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("RelativityAtlas GravityAttract Bind Group"),
                layout: gravity_attract_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: shared.positions[role].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: shared.forces.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: shared.edges.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: mass[final_mass].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
                ],
            })
        };
        self.gravity_attract_bind_groups = Some([make_gravity_attract(0), make_gravity_attract(1)]);

        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
        self.edge_count = graph.edge_count();
        self.upload_topology(ctx, graph.node_count(), &graph.edges)?;
        let params = self.config.relativity_atlas.pack(graph.node_count(), self.edge_count);
        ctx.queue.write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("RelativityAtlas Degrees"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.degrees_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.degrees_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("RelativityAtlas InitMass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.init_mass_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.init_mass_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        let iterations = self.config.relativity_atlas.mass_iterations;
        let aggregate_bind_groups = self.aggregate_bind_groups.as_ref().unwrap();
        for iter in 0..iterations {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("RelativityAtlas AggregateMass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.aggregate_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &aggregate_bind_groups[(iter % 2) as usize], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("RelativityAtlas SiblingRepulsion"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.sibling_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.sibling_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("RelativityAtlas GravityAttraction"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.gravity_attract_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.gravity_attract_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count.max(self.edge_count), 256), 1, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{csr::CsrPair, Edge};

    #[test]
    fn leaf_nodes_get_base_mass_only() {
        // A -> B, A -> C: A is internal (out_degree=2), B/C are leaves.
        let edges = vec![Edge::new(0, 1), Edge::new(0, 2)];
        let pair = CsrPair::build(3, &edges);
        let out_degree = |i: usize| pair.forward.offsets[i + 1] - pair.forward.offsets[i];
        assert_eq!(out_degree(0), 2);
        assert_eq!(out_degree(1), 0);
        assert_eq!(out_degree(2), 0);
    }

    #[test]
    fn mass_aggregation_is_bounded_by_fixed_iteration_count() {
        let config = crate::AlgorithmConfig::with_defaults();
        assert_eq!(config.relativity_atlas.mass_iterations, 10);
    }
}
