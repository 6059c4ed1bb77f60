//! Barnes-Hut approximation via a parallel binary radix tree (C3, §4.4).
//!
//! Rebuilt from scratch every tick: bound the positions, Morton-sort them
//! into Z-order, build a Karras (2012) binary radix tree over the sorted
//! codes, aggregate mass bottom-up, then walk the tree per particle with
//! the theta-criterion. Every stage below is its own compute pass; nothing
//! here reads results back to the host mid-tick.

mod shaders;

use super::{AlgorithmDescriptor, AlgorithmId, Complexity, ForceAlgorithm, SharedBuffers};
use crate::gpu::{storage_entry, uniform_entry, GpuContext};
use crate::{AlgorithmConfig, ClearParams, GraphData, Result, TreeNode};

/// Below this many nodes, sorting runs the O(N^2) counting-sort shader in a
/// single dispatch rather than the 8-pass radix sort: the quadratic
/// comparison cost is still smaller than the fixed overhead of 24 GPU
/// dispatches (8 passes * 3 sub-kernels) at this scale.
const SMALL_N_THRESHOLD: u32 = 1024;

const RADIX_PASSES: u32 = 8;
const RADIX_BITS_PER_PASS: u32 = 4;

#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct RadixParams {
    num_keys: u32,
    shift: u32,
    num_workgroups: u32,
    _pad: u32,
}

#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct TreeClearParams {
    total_nodes: u32,
    internal_count: u32,
    _pad0: u32,
    _pad1: u32,
}

#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct TraverseParams {
    node_count: u32,
    root_index: u32,
    theta: f32,
    k_repulsion: f32,
    min_distance: f32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

/// Matches the WGSL `float_to_int` sortable-int encoding, used to seed the
/// atomic bounds buffer with +-infinity each tick.
fn float_to_int(f: f32) -> i32 {
    let bits = f.to_bits() as i32;
    if bits >= 0 {
        bits
    } else {
        bits ^ 0x7FFF_FFFFu32 as i32
    }
}

struct BoundsBuffers {
    atomic: wgpu::Buffer,
    f32_bounds: wgpu::Buffer,
}

/// Two ping-pong slots for Morton codes and the particle indices they
/// carry through the sort. Radix sort's 8 passes alternate src/dst between
/// them; which slot holds the final order depends on whether the small-N
/// counting sort (1 effective pass, ends in slot 1) or the full 8-pass
/// radix sort (even pass count, ends in slot 0) ran that tick.
struct SortBuffers {
    morton_codes: [wgpu::Buffer; 2],
    node_indices: [wgpu::Buffer; 2],
}

pub struct BarnesHut {
    config: AlgorithmConfig,
    max_nodes: u32,
    max_workgroups: u32,

    bounds_layout: Option<wgpu::BindGroupLayout>,
    bounds_pipeline: Option<wgpu::ComputePipeline>,
    bounds_finalize_layout: Option<wgpu::BindGroupLayout>,
    bounds_finalize_pipeline: Option<wgpu::ComputePipeline>,
    morton_layout: Option<wgpu::BindGroupLayout>,
    morton_pipeline: Option<wgpu::ComputePipeline>,
    counting_sort_layout: Option<wgpu::BindGroupLayout>,
    counting_sort_pipeline: Option<wgpu::ComputePipeline>,
    radix_histogram_layout: Option<wgpu::BindGroupLayout>,
    radix_histogram_pipeline: Option<wgpu::ComputePipeline>,
    radix_scan_layout: Option<wgpu::BindGroupLayout>,
    radix_scan_pipeline: Option<wgpu::ComputePipeline>,
    radix_scatter_layout: Option<wgpu::BindGroupLayout>,
    radix_scatter_pipeline: Option<wgpu::ComputePipeline>,
    clear_tree_layout: Option<wgpu::BindGroupLayout>,
    clear_tree_pipeline: Option<wgpu::ComputePipeline>,
    build_topology_layout: Option<wgpu::BindGroupLayout>,
    build_topology_pipeline: Option<wgpu::ComputePipeline>,
    init_leaves_layout: Option<wgpu::BindGroupLayout>,
    init_leaves_pipeline: Option<wgpu::ComputePipeline>,
    aggregate_layout: Option<wgpu::BindGroupLayout>,
    aggregate_pipeline: Option<wgpu::ComputePipeline>,
    traverse_layout: Option<wgpu::BindGroupLayout>,
    traverse_pipeline: Option<wgpu::ComputePipeline>,

    bounds: Option<BoundsBuffers>,
    sort: Option<SortBuffers>,
    radix_histogram: Option<wgpu::Buffer>,
    radix_offsets: Option<wgpu::Buffer>,
    radix_params_staging: Option<wgpu::Buffer>,
    radix_params_live: Option<wgpu::Buffer>,
    tree_nodes: Option<wgpu::Buffer>,
    visit_counters: Option<wgpu::Buffer>,
    count_params: Option<wgpu::Buffer>,
    leaf_count_params: Option<wgpu::Buffer>,
    tree_clear_params: Option<wgpu::Buffer>,
    traverse_params: Option<wgpu::Buffer>,

    bounds_bind_groups: Option<[wgpu::BindGroup; 2]>,
    bounds_finalize_bind_group: Option<wgpu::BindGroup>,
    morton_bind_groups: Option<[wgpu::BindGroup; 2]>,
    counting_sort_bind_group: Option<wgpu::BindGroup>,
    radix_histogram_bind_groups: Option<[wgpu::BindGroup; 2]>,
    radix_scan_bind_group: Option<wgpu::BindGroup>,
    radix_scatter_bind_groups: Option<[wgpu::BindGroup; 2]>,
    clear_tree_bind_group: Option<wgpu::BindGroup>,
    build_topology_bind_groups: Option<[wgpu::BindGroup; 2]>,
    init_leaves_bind_groups: Option<[[wgpu::BindGroup; 2]; 2]>,
    aggregate_bind_group: Option<wgpu::BindGroup>,
    traverse_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl BarnesHut {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self {
            config,
            max_nodes: 0,
            max_workgroups: 1,
            bounds_layout: None,
            bounds_pipeline: None,
            bounds_finalize_layout: None,
            bounds_finalize_pipeline: None,
            morton_layout: None,
            morton_pipeline: None,
            counting_sort_layout: None,
            counting_sort_pipeline: None,
            radix_histogram_layout: None,
            radix_histogram_pipeline: None,
            radix_scan_layout: None,
            radix_scan_pipeline: None,
            radix_scatter_layout: None,
            radix_scatter_pipeline: None,
            clear_tree_layout: None,
            clear_tree_pipeline: None,
            build_topology_layout: None,
            build_topology_pipeline: None,
            init_leaves_layout: None,
            init_leaves_pipeline: None,
            aggregate_layout: None,
            aggregate_pipeline: None,
            traverse_layout: None,
            traverse_pipeline: None,
            bounds: None,
            sort: None,
            radix_histogram: None,
            radix_offsets: None,
            radix_params_staging: None,
            radix_params_live: None,
            tree_nodes: None,
            visit_counters: None,
            count_params: None,
            leaf_count_params: None,
            tree_clear_params: None,
            traverse_params: None,
            bounds_bind_groups: None,
            bounds_finalize_bind_group: None,
            morton_bind_groups: None,
            counting_sort_bind_group: None,
            radix_histogram_bind_groups: None,
            radix_scan_bind_group: None,
            radix_scatter_bind_groups: None,
            clear_tree_bind_group: None,
            build_topology_bind_groups: None,
            init_leaves_bind_groups: None,
            aggregate_bind_group: None,
            traverse_bind_groups: None,
        }
    }
}

impl ForceAlgorithm for BarnesHut {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            id: AlgorithmId::BarnesHut,
            name: "barnes_hut",
            min_nodes: 0,
            max_nodes: 5_000_000,
            complexity: Complexity::NLogN,
        }
    }

    fn create_pipelines(&mut self, ctx: &GpuContext) -> Result<()> {
        let bounds_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Bounds Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.bounds_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Bounds",
            shaders::BOUNDS_SHADER,
            "main",
            &bounds_layout,
        )?);
        self.bounds_layout = Some(bounds_layout);

        let bounds_finalize_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Bounds Finalize Layout"),
            entries: &[storage_entry(0, false), storage_entry(1, false)],
        });
        self.bounds_finalize_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Bounds Finalize",
            shaders::BOUNDS_FINALIZE_SHADER,
            "main",
            &bounds_finalize_layout,
        )?);
        self.bounds_finalize_layout = Some(bounds_finalize_layout);

        let morton_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Morton Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                uniform_entry(4),
            ],
        });
        self.morton_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Morton",
            shaders::MORTON_SHADER,
            "main",
            &morton_layout,
        )?);
        self.morton_layout = Some(morton_layout);

        let counting_sort_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Counting Sort Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                uniform_entry(4),
            ],
        });
        self.counting_sort_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Counting Sort",
            shaders::COUNTING_SORT_SHADER,
            "main",
            &counting_sort_layout,
        )?);
        self.counting_sort_layout = Some(counting_sort_layout);

        let radix_histogram_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Radix Histogram Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.radix_histogram_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Radix Histogram",
            shaders::RADIX_HISTOGRAM_SHADER,
            "main",
            &radix_histogram_layout,
        )?);
        self.radix_histogram_layout = Some(radix_histogram_layout);

        let radix_scan_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Radix Scan Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.radix_scan_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Radix Scan",
            shaders::RADIX_SCAN_SHADER,
            "main",
            &radix_scan_layout,
        )?);
        self.radix_scan_layout = Some(radix_scan_layout);

        let radix_scatter_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Radix Scatter Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, true),
                uniform_entry(5),
            ],
        });
        self.radix_scatter_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Radix Scatter",
            shaders::RADIX_SCATTER_SHADER,
            "main",
            &radix_scatter_layout,
        )?);
        self.radix_scatter_layout = Some(radix_scatter_layout);

        let clear_tree_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Clear Tree Layout"),
            entries: &[storage_entry(0, false), storage_entry(1, false), uniform_entry(2)],
        });
        self.clear_tree_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Clear Tree",
            shaders::CLEAR_TREE_SHADER,
            "main",
            &clear_tree_layout,
        )?);
        self.clear_tree_layout = Some(clear_tree_layout);

        let build_topology_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Build Topology Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        self.build_topology_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Build Topology",
            shaders::BUILD_TOPOLOGY_SHADER,
            "main",
            &build_topology_layout,
        )?);
        self.build_topology_layout = Some(build_topology_layout);

        let init_leaves_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Init Leaves Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                uniform_entry(4),
            ],
        });
        self.init_leaves_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Init Leaves",
            shaders::INIT_LEAVES_SHADER,
            "main",
            &init_leaves_layout,
        )?);
        self.init_leaves_layout = Some(init_leaves_layout);

        let aggregate_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Aggregate Layout"),
            entries: &[storage_entry(0, false), storage_entry(1, false), uniform_entry(2)],
        });
        self.aggregate_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Aggregate",
            shaders::AGGREGATE_SHADER,
            "main",
            &aggregate_layout,
        )?);
        self.aggregate_layout = Some(aggregate_layout);

        let traverse_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BarnesHut Traverse Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                uniform_entry(3),
            ],
        });
        self.traverse_pipeline = Some(ctx.create_compute_pipeline(
            "BarnesHut Traverse",
            shaders::TRAVERSE_SHADER,
            "main",
            &traverse_layout,
        )?);
        self.traverse_layout = Some(traverse_layout);

        Ok(())
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: u32, _max_edges: u32) -> Result<()> {
        self.max_nodes = max_nodes;
        self.max_workgroups = GpuContext::dispatch_count(max_nodes.max(1), 256);

        self.bounds = Some(BoundsBuffers {
            atomic: ctx.create_storage_buffer("BarnesHut Bounds Atomic", 16, false),
            f32_bounds: ctx.create_storage_buffer("BarnesHut Bounds F32", 16, false),
        });

        let key_buffer_size = (max_nodes.max(1) as u64) * 4;
        self.sort = Some(SortBuffers {
            morton_codes: [
                ctx.create_storage_buffer("BarnesHut Morton 0", key_buffer_size, false),
                ctx.create_storage_buffer("BarnesHut Morton 1", key_buffer_size, false),
            ],
            node_indices: [
                ctx.create_storage_buffer("BarnesHut Indices 0", key_buffer_size, false),
                ctx.create_storage_buffer("BarnesHut Indices 1", key_buffer_size, false),
            ],
        });

        let histogram_size = (self.max_workgroups as u64) * 16 * 4;
        self.radix_histogram = Some(ctx.create_storage_buffer("BarnesHut Radix Histogram", histogram_size, false));
        self.radix_offsets = Some(ctx.create_storage_buffer("BarnesHut Radix Offsets", histogram_size, false));

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("BarnesHut Radix Params Staging"),
            size: (RADIX_PASSES as u64) * 16,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.radix_params_staging = Some(staging);
        self.radix_params_live = Some(ctx.create_uniform_buffer::<RadixParams>("BarnesHut Radix Params Live"));

        let internal_count = max_nodes.saturating_sub(1).max(1);
        let total_nodes = (2 * max_nodes).saturating_sub(1).max(1);
        self.tree_nodes = Some(ctx.create_storage_buffer(
            "BarnesHut Tree Nodes",
            (total_nodes as u64) * std::mem::size_of::<TreeNode>() as u64,
            false,
        ));
        self.visit_counters = Some(ctx.create_storage_buffer(
            "BarnesHut Visit Counters",
            (internal_count as u64) * 4,
            false,
        ));

        self.count_params = Some(ctx.create_uniform_buffer::<TreeClearParams>("BarnesHut Count Params"));
        self.leaf_count_params = Some(ctx.create_uniform_buffer::<TreeClearParams>("BarnesHut Leaf Count Params"));
        self.tree_clear_params = Some(ctx.create_uniform_buffer::<TreeClearParams>("BarnesHut Tree Clear Params"));
        self.traverse_params = Some(ctx.create_uniform_buffer::<TraverseParams>("BarnesHut Traverse Params"));

        Ok(())
    }

    fn create_bind_groups(&mut self, ctx: &GpuContext, shared: &SharedBuffers) -> Result<()> {
        let bounds = self.bounds.as_ref().expect("create_buffers first");
        let sort = self.sort.as_ref().expect("create_buffers first");

        let bounds_layout = self.bounds_layout.as_ref().unwrap();
        let make_bounds = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Bounds Bind Group"),
                layout: bounds_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: shared.positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: bounds.atomic.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.count_params.as_ref().unwrap().as_entire_binding(),
                    },
                ],
            })
        };
        self.bounds_bind_groups = Some([make_bounds(0), make_bounds(1)]);

        self.bounds_finalize_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BarnesHut Bounds Finalize Bind Group"),
            layout: self.bounds_finalize_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bounds.atomic.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: bounds.f32_bounds.as_entire_binding(),
                },
            ],
        }));

        let morton_layout = self.morton_layout.as_ref().unwrap();
        let make_morton = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Morton Bind Group"),
                layout: morton_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: shared.positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: bounds.f32_bounds.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: sort.morton_codes[0].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: sort.node_indices[0].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: self.count_params.as_ref().unwrap().as_entire_binding(),
                    },
                ],
            })
        };
        self.morton_bind_groups = Some([make_morton(0), make_morton(1)]);

        self.counting_sort_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BarnesHut Counting Sort Bind Group"),
            layout: self.counting_sort_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sort.morton_codes[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sort.node_indices[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: sort.morton_codes[1].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: sort.node_indices[1].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.count_params.as_ref().unwrap().as_entire_binding(),
                },
            ],
        }));

        let histogram = self.radix_histogram.as_ref().unwrap();
        let offsets = self.radix_offsets.as_ref().unwrap();
        let radix_params_live = self.radix_params_live.as_ref().unwrap();

        let histogram_layout = self.radix_histogram_layout.as_ref().unwrap();
        let make_histogram = |src: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Radix Histogram Bind Group"),
                layout: histogram_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sort.morton_codes[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: histogram.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: radix_params_live.as_entire_binding(),
                    },
                ],
            })
        };
        self.radix_histogram_bind_groups = Some([make_histogram(0), make_histogram(1)]);

        self.radix_scan_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BarnesHut Radix Scan Bind Group"),
            layout: self.radix_scan_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: histogram.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: offsets.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: radix_params_live.as_entire_binding(),
                },
            ],
        }));

        let scatter_layout = self.radix_scatter_layout.as_ref().unwrap();
        let make_scatter = |src: usize| {
            let dst = 1 - src;
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Radix Scatter Bind Group"),
                layout: scatter_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sort.morton_codes[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: sort.node_indices[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: sort.morton_codes[dst].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: sort.node_indices[dst].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: offsets.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: radix_params_live.as_entire_binding(),
                    },
                ],
            })
        };
        self.radix_scatter_bind_groups = Some([make_scatter(0), make_scatter(1)]);

        let tree_nodes = self.tree_nodes.as_ref().unwrap();
        let visit_counters = self.visit_counters.as_ref().unwrap();

        self.clear_tree_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BarnesHut Clear Tree Bind Group"),
            layout: self.clear_tree_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: tree_nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: visit_counters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.tree_clear_params.as_ref().unwrap().as_entire_binding(),
                },
            ],
        }));

        let topology_layout = self.build_topology_layout.as_ref().unwrap();
        let make_topology = |slot: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Build Topology Bind Group"),
                layout: topology_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sort.morton_codes[slot].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: tree_nodes.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.leaf_count_params.as_ref().unwrap().as_entire_binding(),
                    },
                ],
            })
        };
        self.build_topology_bind_groups = Some([make_topology(0), make_topology(1)]);

        let init_leaves_layout = self.init_leaves_layout.as_ref().unwrap();
        let make_init_leaves = |role: usize, slot: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Init Leaves Bind Group"),
                layout: init_leaves_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: shared.positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: sort.node_indices[slot].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: bounds.f32_bounds.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: tree_nodes.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: self.leaf_count_params.as_ref().unwrap().as_entire_binding(),
                    },
                ],
            })
        };
        self.init_leaves_bind_groups = Some([
            [make_init_leaves(0, 0), make_init_leaves(0, 1)],
            [make_init_leaves(1, 0), make_init_leaves(1, 1)],
        ]);

        self.aggregate_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BarnesHut Aggregate Bind Group"),
            layout: self.aggregate_layout.as_ref().unwrap(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: tree_nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: visit_counters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.leaf_count_params.as_ref().unwrap().as_entire_binding(),
                },
            ],
        }));

        let traverse_layout = self.traverse_layout.as_ref().unwrap();
        let make_traverse = |role: usize| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("BarnesHut Traverse Bind Group"),
                layout: traverse_layout,
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
                        resource: tree_nodes.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.traverse_params.as_ref().unwrap().as_entire_binding(),
                    },
                ],
            })
        };
        self.traverse_bind_groups = Some([make_traverse(0), make_traverse(1)]);

        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, graph: &GraphData, _dt: f32, _damping: f32) -> Result<()> {
        let node_count = graph.node_count();

        let init_min = float_to_int(1e30);
        let init_max = float_to_int(-1e30);
        let reset: [i32; 4] = [init_min, init_min, init_max, init_max];
        ctx.queue.write_buffer(
            &self.bounds.as_ref().unwrap().atomic,
            0,
            bytemuck::cast_slice(&reset),
        );

        let count_params = TreeClearParams {
            total_nodes: node_count,
            internal_count: 0,
            _pad0: 0,
            _pad1: 0,
        };
        ctx.queue
            .write_buffer(self.count_params.as_ref().unwrap(), 0, bytemuck::bytes_of(&count_params));

        let leaf_count_params = TreeClearParams {
            total_nodes: node_count,
            internal_count: 0,
            _pad0: 0,
            _pad1: 0,
        };
        ctx.queue.write_buffer(
            self.leaf_count_params.as_ref().unwrap(),
            0,
            bytemuck::bytes_of(&leaf_count_params),
        );

        let total_nodes = (2 * node_count).saturating_sub(1);
        let internal_count = node_count.saturating_sub(1);
        let tree_clear_params = TreeClearParams {
            total_nodes,
            internal_count,
            _pad0: 0,
            _pad1: 0,
        };
        ctx.queue.write_buffer(
            self.tree_clear_params.as_ref().unwrap(),
            0,
            bytemuck::bytes_of(&tree_clear_params),
        );

        let num_workgroups = GpuContext::dispatch_count(node_count.max(1), 256);
        let mut passes = [RadixParams::default(); RADIX_PASSES as usize];
        for (pass, entry) in passes.iter_mut().enumerate() {
            *entry = RadixParams {
                num_keys: node_count,
                shift: pass as u32 * RADIX_BITS_PER_PASS,
                num_workgroups,
                _pad: 0,
            };
        }
        ctx.queue.write_buffer(
            self.radix_params_staging.as_ref().unwrap(),
            0,
            bytemuck::cast_slice(&passes),
        );

        let traverse_params = TraverseParams {
            node_count,
            root_index: 0,
            theta: self.config.barnes_hut_theta,
            k_repulsion: self.config.repulsion_strength,
            min_distance: self.config.min_distance,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        ctx.queue
            .write_buffer(self.traverse_params.as_ref().unwrap(), 0, bytemuck::bytes_of(&traverse_params));

        Ok(())
    }

    fn record_repulsion_pass(&self, encoder: &mut wgpu::CommandEncoder, node_count: u32, role: usize) {
        if node_count == 0 {
            return;
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Bounds"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.bounds_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.bounds_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Bounds Finalize"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.bounds_finalize_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.bounds_finalize_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }

        // A lone particle has no partner to repel against; the tree has no
        // well-defined internal node (N-1 == 0), so skip straight past it.
        if node_count < 2 {
            return;
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Morton"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.morton_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.morton_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }

        let final_slot = if node_count < SMALL_N_THRESHOLD {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Counting Sort"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.counting_sort_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.counting_sort_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
            drop(pass);
            1usize
        } else {
            let num_workgroups = GpuContext::dispatch_count(node_count, 256);
            for pass_idx in 0..RADIX_PASSES {
                let src = (pass_idx % 2) as usize;
                encoder.copy_buffer_to_buffer(
                    self.radix_params_staging.as_ref().unwrap(),
                    (pass_idx as u64) * 16,
                    self.radix_params_live.as_ref().unwrap(),
                    0,
                    16,
                );
                encoder.clear_buffer(self.radix_histogram.as_ref().unwrap(), 0, None);
                {
                    let mut hist_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("BarnesHut Radix Histogram"),
                        timestamp_writes: None,
                    });
                    hist_pass.set_pipeline(self.radix_histogram_pipeline.as_ref().unwrap());
                    hist_pass.set_bind_group(0, &self.radix_histogram_bind_groups.as_ref().unwrap()[src], &[]);
                    hist_pass.dispatch_workgroups(num_workgroups, 1, 1);
                }
                {
                    let mut scan_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("BarnesHut Radix Scan"),
                        timestamp_writes: None,
                    });
                    scan_pass.set_pipeline(self.radix_scan_pipeline.as_ref().unwrap());
                    scan_pass.set_bind_group(0, self.radix_scan_bind_group.as_ref().unwrap(), &[]);
                    scan_pass.dispatch_workgroups(1, 1, 1);
                }
                {
                    let mut scatter_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("BarnesHut Radix Scatter"),
                        timestamp_writes: None,
                    });
                    scatter_pass.set_pipeline(self.radix_scatter_pipeline.as_ref().unwrap());
                    scatter_pass.set_bind_group(0, &self.radix_scatter_bind_groups.as_ref().unwrap()[src], &[]);
                    scatter_pass.dispatch_workgroups(num_workgroups, 1, 1);
                }
            }
            (RADIX_PASSES % 2) as usize
        };

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Clear Tree"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.clear_tree_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.clear_tree_bind_group.as_ref().unwrap(), &[]);
            let total_nodes = 2 * node_count - 1;
            pass.dispatch_workgroups(GpuContext::dispatch_count(total_nodes, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Build Topology"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.build_topology_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.build_topology_bind_groups.as_ref().unwrap()[final_slot], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count - 1, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Init Leaves"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.init_leaves_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.init_leaves_bind_groups.as_ref().unwrap()[role][final_slot], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Aggregate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.aggregate_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, self.aggregate_bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BarnesHut Traverse"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.traverse_pipeline.as_ref().unwrap());
            pass.set_bind_group(0, &self.traverse_bind_groups.as_ref().unwrap()[role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(node_count, 256), 1, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::float_to_int;

    /// The sortable-int encoding must preserve float ordering: if `a < b`
    /// then `float_to_int(a) < float_to_int(b)`, across sign boundaries.
    #[test]
    fn float_to_int_preserves_order() {
        let samples = [-1e30f32, -100.0, -0.5, 0.0, 0.5, 100.0, 1e30];
        for window in samples.windows(2) {
            assert!(float_to_int(window[0]) < float_to_int(window[1]));
        }
    }

    /// Root index 0 is a structural property of this exact construction:
    /// node 0 always has `d = 1` (since `delta(0, -1)` is out of range and
    /// therefore minimal), so its search always walks to the last leaf.
    /// This test is a CPU re-derivation of that claim for small synthetic
    /// Morton arrays, standing in for a GPU readback we can't perform here.
    #[test]
    fn node_zero_always_covers_full_range() {
        fn clz(x: u32) -> i32 {
            x.leading_zeros() as i32
        }
        fn delta(morton: &[u32], i: i32, j: i32) -> i32 {
            let n = morton.len() as i32;
            if j < 0 || j >= n {
                return -1;
            }
            let a = morton[i as usize];
            let b = morton[j as usize];
            if a == b {
                32 + clz((i ^ j) as u32)
            } else {
                clz(a ^ b)
            }
        }

        let morton = [0b000u32, 0b001, 0b010, 0b100, 0b101, 0b111];
        let n = morton.len() as i32;
        let i = 0;
        let d = (delta(&morton, i, i + 1) - delta(&morton, i, i - 1)).signum();
        assert_eq!(d, 1);

        let delta_min = delta(&morton, i, i - d);
        let mut len_max = 2;
        while delta(&morton, i, i + len_max * d) > delta_min {
            len_max *= 2;
        }
        let mut len = 0;
        let mut t = len_max / 2;
        while t >= 1 {
            if delta(&morton, i, i + (len + t) * d) > delta_min {
                len += t;
            }
            t /= 2;
        }
        let j = i + len * d;
        assert_eq!(j, n - 1);
    }
}
