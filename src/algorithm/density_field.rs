//! Grid-based density field repulsion (C3, §4.7).
//!
//! Three passes: splat node mass into a uniform grid of atomic fixed-point
//! cells, then have every node sample the gradient of its local neighborhood
//! and push away from dense cells. O(N) per tick instead of O(N^2) or
//! O(N log N), at the cost of a fixed bounding box the caller must supply.
//! Neither gravity nor attraction is handled here.

use super::{AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::config::DensityFieldParams;
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, GraphData, Result};

const CLEAR_GRID_SHADER: &str = r#"
struct Params {
    grid_width: u32,
    grid_height: u32,
    node_count: u32,
    splat_radius: f32,
    k_repulsion: f32,
    bounds_min_x: f32,
    bounds_min_y: f32,
    bounds_max_x: f32,
    bounds_max_y: f32,
}

@group(0) @binding(0) var<storage, read_write> grid: array<atomic<i32>>;
@group(0) @binding(1) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let cell_count = params.grid_width * params.grid_height;
    if (gid.x >= cell_count) {
        return;
    }
    atomicStore(&grid[gid.x], 0);
}
"#;

const ACCUMULATE_DENSITY_SHADER: &str = r#"
struct Params {
    grid_width: u32,
    grid_height: u32,
    node_count: u32,
    splat_radius: f32,
    k_repulsion: f32,
    bounds_min_x: f32,
    bounds_min_y: f32,
    bounds_max_x: f32,
    bounds_max_y: f32,
}

const DENSITY_SCALE: f32 = 1000.0;

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> grid: array<atomic<i32>>;
@group(0) @binding(2) var<uniform> params: Params;

fn cell_of(p: vec2<f32>) -> vec2<i32> {
    let span_x = max(params.bounds_max_x - params.bounds_min_x, 1e-4);
    let span_y = max(params.bounds_max_y - params.bounds_min_y, 1e-4);
    let nx = (p.x - params.bounds_min_x) / span_x;
    let ny = (p.y - params.bounds_min_y) / span_y;
    let cx = clamp(i32(nx * f32(params.grid_width)), 0, i32(params.grid_width) - 1);
    let cy = clamp(i32(ny * f32(params.grid_height)), 0, i32(params.grid_height) - 1);
    return vec2<i32>(cx, cy);
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let c = cell_of(positions[i]);
    let index = u32(c.y) * params.grid_width + u32(c.x);
    atomicAdd(&grid[index], i32(DENSITY_SCALE));
}
"#;

const APPLY_FORCES_SHADER: &str = r#"
struct Params {
    grid_width: u32,
    grid_height: u32,
    node_count: u32,
    splat_radius: f32,
    k_repulsion: f32,
    bounds_min_x: f32,
    bounds_min_y: f32,
    bounds_max_x: f32,
    bounds_max_y: f32,
}

const DENSITY_SCALE: f32 = 1000.0;

@group(0) @binding(0) var<storage, read> positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> forces: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> grid: array<i32>;
@group(0) @binding(3) var<uniform> params: Params;

fn cell_of(p: vec2<f32>) -> vec2<i32> {
    let span_x = max(params.bounds_max_x - params.bounds_min_x, 1e-4);
    let span_y = max(params.bounds_max_y - params.bounds_min_y, 1e-4);
    let nx = (p.x - params.bounds_min_x) / span_x;
    let ny = (p.y - params.bounds_min_y) / span_y;
    let cx = clamp(i32(nx * f32(params.grid_width)), 0, i32(params.grid_width) - 1);
    let cy = clamp(i32(ny * f32(params.grid_height)), 0, i32(params.grid_height) - 1);
    return vec2<i32>(cx, cy);
}

fn density_at(cx: i32, cy: i32) -> f32 {
    if (cx < 0 || cy < 0 || cx >= i32(params.grid_width) || cy >= i32(params.grid_height)) {
        return 0.0;
    }
    let index = u32(cy) * params.grid_width + u32(cx);
    return f32(grid[index]) / DENSITY_SCALE;
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.node_count) {
        return;
    }
    let p = positions[i];
    let c = cell_of(p);

    // Central-difference gradient of the local density field over a
    // splat_radius-cell neighborhood; nodes are pushed down the gradient,
    // i.e. away from dense regions.
    let radius = max(i32(params.splat_radius), 1);
    var grad = vec2<f32>(0.0, 0.0);
    grad.x = density_at(c.x + radius, c.y) - density_at(c.x - radius, c.y);
    grad.y = density_at(c.x, c.y + radius) - density_at(c.x, c.y - radius);

    forces[i] += -grad * params.k_repulsion;
}
"#;

/// Three-pass uniform-grid repulsion: clear, splat, gradient-descend.
pub struct DensityField {
    config: AlgorithmConfig,
    grid_cells: u32,

    clear_layout: Option<wgpu::BindGroupLayout>,
    clear_pipeline: Option<wgpu::ComputePipeline>,
    accumulate_layout: Option<wgpu::BindGroupLayout>,
    accumulate_pipeline: Option<wgpu::ComputePipeline>,
    apply_layout: Option<wgpu::BindGroupLayout>,
    apply_pipeline: Option<wgpu::ComputePipeline>,

    grid: Option<wgpu::Buffer>,
    params: Option<wgpu::Buffer>,

    clear_bind_group: Option<wgpu::BindGroup>,
    accumulate_bind_groups: Option<[wgpu::BindGroup; 2]>,
    apply_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl DensityField {
    pub fn new(config: AlgorithmConfig) -> Result<Self> {
        config.density_field.validate()?;
        Ok(Self {
            config,
            grid_cells: 0,
            clear_layout: None,
            clear_pipeline: None,
            accumulate_layout: None,
            accumulate_pipeline: None,
            apply_layout: None,
            apply_pipeline: None,
            grid: None,
            params: None,
            clear_bind_group: None,
            accumulate_bind_groups: None,
            apply_bind_groups: None,
        })
    }
}

impl ForceAlgorithm for DensityField {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::DensityField,
            name: "density_field",
            min_nodes: 0,
            max_nodes: u32::MAX,
            complexity: Complexity::Linear,
        }
    }

    fn handles_gravity(&self) -> bool {
        false
    }

    fn handles_springs(&self) -> bool {
        false
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let clear_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("DensityField Clear Layout"),
            entries: &[storage_entry(0, false), uniform_entry(1)],
        });
        self.clear_pipeline = Some(ctx.create_compute_pipeline("DensityField Clear", CLEAR_GRID_SHADER, "main", &clear_layout)?);
        self.clear_layout = Some(clear_layout);

        let accumulate_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("DensityField Accumulate Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.accumulate_pipeline = Some(ctx.create_compute_pipeline(
            "DensityField Accumulate",
            ACCUMULATE_DENSITY_SHADER,
            "main",
            &accumulate_layout,
        )?);
        self.accumulate_layout = Some(accumulate_layout);

        let apply_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("DensityField Apply Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), storage_entry(2, true), uniform_entry(3)],
        });
        self.apply_pipeline = Some(ctx.create_compute_pipeline("DensityField Apply", APPLY_FORCES_SHADER, "main", &apply_layout)?);
        self.apply_layout = Some(apply_layout);

        self.params = Some(ctx.create_uniform_buffer::<DensityFieldParams>("DensityField Params"));
        Ok(())
    }

    fn create_buffers(&mut self, ctx: &GpuContext, _max_nodes: u32, _max_edges: u32) -> Result<()> {
        self.grid_cells = self.config.density_field.grid_width * self.config.density_field.grid_height;
        self.grid = Some(ctx.create_storage_buffer("DensityField Grid", (self.grid_cells.max(1) as u64) * 4, false));
        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let grid = self.grid.as_ref().expect("create_buffers first");
        let params = self.params.as_ref().unwrap();

        self.clear_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("DensityField Clear Bind Group"),
            layout: self.clear_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
            ],
        }));

        let accumulate_layout = self.accumulate_layout.as_ref().unwrap();
        let make_accumulate = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("DensityField Accumulate Bind Group"),
                layout: accumulate_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: shared.positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: grid.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        self.accumulate_bind_groups = Some([make_accumulate(0), make_accumulate(1)]);

        let apply_layout = self.apply_layout.as_ref().unwrap();
        let make_apply = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("DensityField Apply Bind Group"),
                layout: apply_layout,
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
                        resource: grid.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        self.apply_bind_groups = Some([make_apply(0), make_apply(1)]);

        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
        let params = self.config.density_field.pack(graph.node_count())?;
        ctx.queue.write_buffer(self.params.as_ref().unwrap(), 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("DensityField Clear"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.clear_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.clear_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(self.grid_cells, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("DensityField Accumulate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.accumulate_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.accumulate_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("DensityField Apply"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.apply_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.apply_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{AlgorithmConfig, Position};

    #[test]
    fn missing_bounds_is_a_fatal_config_error() {
        let config = AlgorithmConfig::with_defaults();
        let err = config.density_field.pack(10).unwrap_err();
        assert!(matches!(err, crate::LayoutError::MissingContext(name, _) if name == "density_field"));
    }

    #[test]
    fn pack_succeeds_once_bounds_are_supplied() {
        let mut config = AlgorithmConfig::with_defaults();
        config.density_field.bounds = Some((Position { x: -100.0, y: -100.0 }, Position { x: 100.0, y: 100.0 }));
        assert!(config.density_field.pack(10).is_ok());
    }

    #[test]
    fn cell_indexing_matches_normalized_grid_fraction() {
        let min = -100.0f32;
        let max = 100.0f32;
        let grid_width = 128.0f32;
        let p = 0.0f32;
        let nx = (p - min) / (max - min);
        let cx = (nx * grid_width) as i32;
        assert_eq!(cx, 64);
    }
}
