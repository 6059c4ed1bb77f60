//! Config/uniform packer (C7).
//!
//! Maps semantic, human-tunable parameters into the exact byte layouts the
//! WGSL shaders expect. Every `#[repr(C)]` struct below is part of the
//! public wire contract with its shader: field order and padding must match
//! the corresponding WGSL `struct` exactly, because uniform buffers are
//! packed to 16-byte alignment and the GPU reads them positionally. A
//! comment above each struct states the byte offset of every field.

use crate::{LayoutError, Position, Result};

/// Simulation-wide parameters shared by the orchestrator (C4) and the
/// controller's cooling law (C5): time step, damping, the default
/// point-mass gravity term, and the shared Hooke-spring attraction used by
/// any algorithm that reports `handles_springs = false`.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub dt: f32,
    pub damping: f32,
    /// Strength of the default "pull toward origin" gravity term applied
    /// during integration, for algorithms with `handles_gravity = false`.
    pub gravity: f32,
    /// Caps `|v|` after integration so a single bad tick cannot make a node
    /// diverge to infinity (testable property #1 in the design doc).
    pub velocity_cap: f32,
    /// Scales alpha per-node by `1 + depth * depth_alpha_spread`, clamped
    /// to 1.0, so deeper hierarchy nodes settle faster.
    pub depth_alpha_spread: f32,
    /// If `Some(i)`, node `i` is pinned to the graph center with zero
    /// velocity every tick, overriding integration for that one node.
    pub pinned_node: Option<u32>,
    /// Hooke's-law attraction strength for the shared springs pass.
    pub spring_strength: f32,
    /// Rest length for the shared springs pass.
    pub ideal_length: f32,
    pub alpha_initial: f32,
    pub alpha_target: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub workgroup_size: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.016,
            damping: 0.9,
            gravity: 0.05,
            velocity_cap: 1000.0,
            depth_alpha_spread: 0.0,
            pinned_node: None,
            spring_strength: 0.05,
            ideal_length: 50.0,
            alpha_initial: 1.0,
            alpha_target: 0.1,
            alpha_min: 0.001,
            alpha_decay: 0.0228,
            workgroup_size: 256,
        }
    }
}

/// Compute the alpha decay that reaches `alpha_min` after `iterations`
/// ticks: `decay = 1 - alpha_min^(1/iterations)`.
pub fn cooling_decay_for_iterations(iterations: u32, alpha_min: f32) -> f32 {
    let iterations = iterations.max(1) as f32;
    1.0 - alpha_min.powf(1.0 / iterations)
}

/// Byte offsets 0/4/8/12, 16/20/24/28 — matches the WGSL `ClearParams`
/// struct used by the `clear_forces` kernel.
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ClearParams {
    pub node_count: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

/// Byte offsets 0/4/8/12 — matches the WGSL `SpringParams` struct used by
/// the shared Hooke-spring attraction kernel.
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SpringParams {
    pub spring_strength: f32,
    pub ideal_length: f32,
    pub edge_count: u32,
    pub node_count: u32,
}

/// Byte offsets 0/4/8/12, 16/20/24/28 — matches the WGSL `IntegrateParams`
/// struct used by the symplectic integration kernel.
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct IntegrateParams {
    pub dt: f32,
    pub damping: f32,
    pub velocity_cap: f32,
    pub depth_alpha_spread: f32,
    pub alpha: f32,
    pub node_count: u32,
    /// `-1` means "no pinned node".
    pub pinned_node: i32,
    pub gravity: f32,
}

impl IntegrateParams {
    pub fn pack(sim: &SimulationConfig, node_count: u32, alpha: f32) -> Self {
        Self {
            dt: sim.dt,
            damping: sim.damping,
            velocity_cap: sim.velocity_cap,
            depth_alpha_spread: sim.depth_alpha_spread,
            alpha,
            node_count,
            pinned_node: sim.pinned_node.map(|i| i as i32).unwrap_or(-1),
            gravity: sim.gravity,
        }
    }
}

/// Per-algorithm configuration, keyed the same way as [`AlgorithmId`](crate::AlgorithmId).
/// `None` for an algorithm means "use its documented defaults".
#[derive(Debug, Clone, Default)]
pub struct AlgorithmConfig {
    pub force_atlas2: ForceAtlas2Config,
    pub linlog: LinLogConfig,
    pub tfdp: TfdpConfig,
    pub density_field: DensityFieldConfig,
    pub relativity_atlas: RelativityAtlasConfig,
    pub community: CommunityConfig,
    /// Barnes-Hut accuracy/speed tradeoff, 0.5 (accurate) .. 1.2 (fast).
    pub barnes_hut_theta: f32,
    /// Minimum pairwise distance, used by direct/Barnes-Hut repulsion to
    /// avoid singularities at `r -> 0`.
    pub min_distance: f32,
    /// Direct (N²) and Barnes-Hut repulsion strength `k`.
    pub repulsion_strength: f32,
}

impl AlgorithmConfig {
    pub fn with_defaults() -> Self {
        Self {
            barnes_hut_theta: 0.8,
            min_distance: 1.0,
            repulsion_strength: 1000.0,
            ..Default::default()
        }
    }
}

/// Byte offsets 0/4/8/12, 16/20/24/28 — matches WGSL `ForceAtlas2Params`.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ForceAtlas2Params {
    pub k_repulsion: f32,
    pub k_gravity: f32,
    /// 0/1 boolean: use `|p|`-scaled strong gravity instead of a constant pull.
    pub strong_gravity: u32,
    /// 0/1 boolean: use `log(1+d)` attraction instead of linear `d`.
    pub lin_log_mode: u32,
    pub edge_weight_influence: f32,
    pub node_count: u32,
    pub edge_count: u32,
    pub dt: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ForceAtlas2Config {
    pub k_repulsion: f32,
    pub k_gravity: f32,
    pub strong_gravity: bool,
    pub lin_log_mode: bool,
    /// Exponent `delta` applied to edge weight in the attraction term.
    pub edge_weight_influence: f32,
}

impl Default for ForceAtlas2Config {
    fn default() -> Self {
        Self {
            k_repulsion: 200.0,
            k_gravity: 1.0,
            strong_gravity: false,
            lin_log_mode: false,
            edge_weight_influence: 1.0,
        }
    }
}

impl ForceAtlas2Config {
    pub fn pack(&self, node_count: u32, edge_count: u32, dt: f32) -> ForceAtlas2Params {
        ForceAtlas2Params {
            k_repulsion: self.k_repulsion,
            k_gravity: self.k_gravity,
            strong_gravity: self.strong_gravity as u32,
            lin_log_mode: self.lin_log_mode as u32,
            edge_weight_influence: self.edge_weight_influence,
            node_count,
            edge_count,
            dt,
        }
    }
}

/// Byte offsets 0/4/8/12 — matches WGSL `LinLogParams`. LinLog shares
/// ForceAtlas2's degree-weighted repulsion kernel but delegates attraction
/// to the shared Hooke springs pass (`handles_springs = false`), so this
/// struct only carries the repulsion-side parameters.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct LinLogParams {
    pub k_repulsion: f32,
    pub k_gravity: f32,
    pub node_count: u32,
    pub edge_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct LinLogConfig {
    pub k_repulsion: f32,
    pub k_gravity: f32,
}

impl Default for LinLogConfig {
    fn default() -> Self {
        Self {
            k_repulsion: 150.0,
            k_gravity: 1.0,
        }
    }
}

impl LinLogConfig {
    pub fn pack(&self, node_count: u32, edge_count: u32) -> LinLogParams {
        LinLogParams {
            k_repulsion: self.k_repulsion,
            k_gravity: self.k_gravity,
            node_count,
            edge_count,
        }
    }
}

/// Byte offsets 0/4/8/12, 16/20/24/28 — matches WGSL `TfdpParams`.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct TfdpParams {
    pub k_repulsion: f32,
    pub gamma: f32,
    pub spring_alpha: f32,
    pub t_force_beta: f32,
    pub node_count: u32,
    pub edge_count: u32,
    pub dt: f32,
    pub damping: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct TfdpConfig {
    pub k_repulsion: f32,
    /// Exponent on the bounded t-kernel denominator.
    pub gamma: f32,
    /// Linear spring coefficient `alpha`.
    pub spring_alpha: f32,
    /// Attractive t-force coefficient `beta`.
    pub t_force_beta: f32,
}

impl Default for TfdpConfig {
    fn default() -> Self {
        Self {
            k_repulsion: 400.0,
            gamma: 1.0,
            spring_alpha: 0.3,
            t_force_beta: 0.8,
        }
    }
}

impl TfdpConfig {
    /// `alpha * (1 + beta) < 1` must hold; enforced before any encoder is
    /// recorded (§7 ConfigError).
    pub fn validate(&self) -> Result<()> {
        let lhs = self.spring_alpha * (1.0 + self.t_force_beta);
        if lhs >= 1.0 {
            return Err(LayoutError::InvalidConfig {
                field: "tfdp.spring_alpha*(1+t_force_beta)",
                reason: format!("must be < 1.0, got {lhs}"),
            });
        }
        Ok(())
    }

    pub fn pack(&self, node_count: u32, edge_count: u32, dt: f32, damping: f32) -> TfdpParams {
        TfdpParams {
            k_repulsion: self.k_repulsion,
            gamma: self.gamma,
            spring_alpha: self.spring_alpha,
            t_force_beta: self.t_force_beta,
            node_count,
            edge_count,
            dt,
            damping,
        }
    }
}

/// Byte offsets 0/4/8/12, 16/20/24/28 — matches WGSL `DensityFieldParams`.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct DensityFieldParams {
    pub grid_width: u32,
    pub grid_height: u32,
    pub node_count: u32,
    pub splat_radius: f32,
    pub k_repulsion: f32,
    pub bounds_min_x: f32,
    pub bounds_min_y: f32,
    pub bounds_max_x: f32,
    pub bounds_max_y: f32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DensityFieldConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    pub splat_radius: f32,
    pub k_repulsion: f32,
    /// Explicit bounding box; `None` is a fatal error for this algorithm
    /// because cell indexing is otherwise ill-defined.
    pub bounds: Option<(Position, Position)>,
}

impl Default for DensityFieldConfig {
    fn default() -> Self {
        Self {
            grid_width: 128,
            grid_height: 128,
            splat_radius: 2.0,
            k_repulsion: 800.0,
            bounds: None,
        }
    }
}

/// Grid resolution is capped at 512x512 to bound the atomic-cell buffer size.
pub const DENSITY_GRID_MAX: u32 = 512;

impl DensityFieldConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid_width == 0 || self.grid_width > DENSITY_GRID_MAX {
            return Err(LayoutError::InvalidConfig {
                field: "density_field.grid_width",
                reason: format!("must be in 1..={DENSITY_GRID_MAX}, got {}", self.grid_width),
            });
        }
        if self.grid_height == 0 || self.grid_height > DENSITY_GRID_MAX {
            return Err(LayoutError::InvalidConfig {
                field: "density_field.grid_height",
                reason: format!("must be in 1..={DENSITY_GRID_MAX}, got {}", self.grid_height),
            });
        }
        Ok(())
    }

    pub fn pack(&self, node_count: u32) -> Result<DensityFieldParams> {
        let (min, max) = self.bounds.ok_or_else(|| {
            LayoutError::MissingContext(
                "density_field",
                "bounding box is required; cell indexing is undefined without it".into(),
            )
        })?;
        Ok(DensityFieldParams {
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            node_count,
            splat_radius: self.splat_radius,
            k_repulsion: self.k_repulsion,
            bounds_min_x: min.x,
            bounds_min_y: min.y,
            bounds_max_x: max.x,
            bounds_max_y: max.y,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        })
    }
}

/// Byte offsets 0/4/8/12, 16/20/24/28, 32/36/40/44 — matches WGSL
/// `RelativityAtlasParams`.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct RelativityAtlasParams {
    pub base_mass: f32,
    pub tangential_mult: f32,
    pub gravity_k: f32,
    pub phantom_zone_k: f32,
    pub node_count: u32,
    pub edge_count: u32,
    pub mass_iterations: u32,
    /// 0/1 boolean: enable well-radius phantom-zone overlay.
    pub bubble_mode: u32,
    pub max_cousin_iterations: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RelativityAtlasConfig {
    pub base_mass: f32,
    pub tangential_mult: f32,
    pub gravity_k: f32,
    pub phantom_zone_k: f32,
    /// Fixed iteration count for the mass-aggregation fixed-point loop.
    /// Should be >= the maximum hierarchy depth (default 10).
    pub mass_iterations: u32,
    pub bubble_mode: bool,
}

/// `sibling_repulsion`'s cousin traversal (grandparent -> uncles ->
/// cousins) is bounded so a pathological hierarchy cannot spin forever.
pub const MAX_COUSIN_ITERATIONS: u32 = 64;

impl Default for RelativityAtlasConfig {
    fn default() -> Self {
        Self {
            base_mass: 1.0,
            tangential_mult: 1.5,
            gravity_k: 0.02,
            phantom_zone_k: 50.0,
            mass_iterations: 10,
            bubble_mode: false,
        }
    }
}

impl RelativityAtlasConfig {
    pub fn pack(&self, node_count: u32, edge_count: u32) -> RelativityAtlasParams {
        RelativityAtlasParams {
            base_mass: self.base_mass,
            tangential_mult: self.tangential_mult,
            gravity_k: self.gravity_k,
            phantom_zone_k: self.phantom_zone_k,
            node_count,
            edge_count,
            mass_iterations: self.mass_iterations,
            bubble_mode: self.bubble_mode as u32,
            max_cousin_iterations: MAX_COUSIN_ITERATIONS,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        }
    }
}

/// Byte offsets 0/4/8/12, 16/20/24/28 — matches WGSL `CommunityParams`.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CommunityParams {
    pub intra_factor: f32,
    pub inter_factor: f32,
    pub cluster_strength: f32,
    pub gravity_k: f32,
    pub node_count: u32,
    pub edge_count: u32,
    pub community_count: u32,
    pub _pad0: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CommunityConfig {
    pub intra_factor: f32,
    pub inter_factor: f32,
    pub cluster_strength: f32,
    pub gravity_k: f32,
    pub community_count: u32,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            intra_factor: 0.5,
            inter_factor: 1.5,
            cluster_strength: 50.0,
            gravity_k: 0.05,
            community_count: 1,
        }
    }
}

impl CommunityConfig {
    pub fn pack(&self, node_count: u32, edge_count: u32) -> CommunityParams {
        CommunityParams {
            intra_factor: self.intra_factor,
            inter_factor: self.inter_factor,
            cluster_strength: self.cluster_strength,
            gravity_k: self.gravity_k,
            node_count,
            edge_count,
            community_count: self.community_count,
            _pad0: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooling_decay_reaches_alpha_min_after_n_iterations() {
        let alpha_min = 0.001;
        let decay = cooling_decay_for_iterations(300, alpha_min);
        let mut alpha = 1.0f32;
        for _ in 0..300 {
            alpha += (0.0 - alpha) * decay;
        }
        assert!((alpha - alpha_min).abs() < 1e-3);
    }

    #[test]
    fn tfdp_rejects_unstable_constants() {
        let cfg = TfdpConfig {
            spring_alpha: 0.8,
            t_force_beta: 0.8,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tfdp_accepts_default_constants() {
        assert!(TfdpConfig::default().validate().is_ok());
    }

    #[test]
    fn density_field_requires_bounds() {
        let cfg = DensityFieldConfig::default();
        assert!(cfg.pack(10).is_err());
    }

    #[test]
    fn density_field_rejects_oversized_grid() {
        let cfg = DensityFieldConfig {
            grid_width: DENSITY_GRID_MAX + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn uniform_struct_sizes_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<ClearParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<SpringParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<IntegrateParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<ForceAtlas2Params>() % 16, 0);
        assert_eq!(std::mem::size_of::<LinLogParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<TfdpParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<DensityFieldParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<RelativityAtlasParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<CommunityParams>() % 16, 0);
    }
}
