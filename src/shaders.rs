//! Core C1 kernels shared by every algorithm: clear, springs, integrate.
//!
//! Per-algorithm repulsion/attraction kernels live under
//! [`crate::algorithm`]; this module only holds the three passes the
//! orchestrator always records regardless of which algorithm is selected.

/// Zeroes the shared force accumulator before each tick's repulsion pass.
pub const CLEAR_FORCES_SHADER: &str = r#"
struct ClearParams {
    node_count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(1) var<uniform> params: ClearParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    forces[i] = vec2<f32>(0.0, 0.0);
}
"#;

/// Shared Hooke's-law spring attraction, used by every algorithm that
/// reports `handles_springs = false`. One thread per edge; writes are
/// intentionally non-atomic (occasional lost updates are accepted layout
/// noise, smoothed out by the next tick).
pub const SPRINGS_SHADER: &str = r#"
struct Edge {
    source: u32,
    target: u32,
    weight: f32,
    _pad: u32,
}

struct SpringParams {
    spring_strength: f32,
    ideal_length: f32,
    edge_count: u32,
    node_count: u32,
}

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> edges: array<Edge>;
@group(0) @binding(3) var<uniform> params: SpringParams;

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
    let f = params.spring_strength * (dist - params.ideal_length) * e.weight;
    forces[e.source] += dir * f;
    forces[e.target] -= dir * f;
}
"#;

/// Symplectic-Euler integration: `v' = v*damping + F*alpha*dt`,
/// `p' = p + v'*dt`, with depth-scaled alpha, velocity clamping, a pinned
/// node, and an optional point-mass gravity term added to `F` beforehand.
pub const INTEGRATE_SHADER: &str = r#"
struct NodeAttributes {
    community_id: u32,
    depth: u32,
    well_radius: f32,
    size: f32,
}

struct IntegrateParams {
    dt: f32,
    damping: f32,
    velocity_cap: f32,
    depth_alpha_spread: f32,
    alpha: f32,
    node_count: u32,
    pinned_node: i32,
    gravity: f32,
}

@group(0) @binding(0) var<storage, read> positions_in: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> positions_out: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> velocities_in: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read_write> velocities_out: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read> forces: array<vec2<f32>>;
@group(0) @binding(5) var<storage, read> attributes: array<NodeAttributes>;
@group(0) @binding(6) var<uniform> params: IntegrateParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }

    if (params.pinned_node >= 0 && u32(params.pinned_node) == i) {
        positions_out[i] = positions_in[i];
        velocities_out[i] = vec2<f32>(0.0, 0.0);
        return;
    }

    let depth = f32(attributes[i].depth);
    let alpha_eff = min(params.alpha * (1.0 + depth * params.depth_alpha_spread), 1.0);

    var f = forces[i];
    f -= positions_in[i] * params.gravity;

    var v = velocities_in[i] * params.damping + f * alpha_eff * params.dt;
    let speed = length(v);
    if (speed > params.velocity_cap) {
        v = v * (params.velocity_cap / speed);
    }

    velocities_out[i] = v;
    positions_out[i] = positions_in[i] + v * params.dt;
}
"#;
