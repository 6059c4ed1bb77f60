//! Simulation orchestrator (C4): shared buffers, ping-pong management, and
//! the per-tick pass sequence `clear -> repulsion -> springs? -> integrate`.

use crate::algorithm::{ForceAlgorithm, SharedBuffers};
use crate::config::{ClearParams, IntegrateParams, SpringParams};
use crate::gpu::{map_buffer_blocking, storage_entry, uniform_entry, GpuContext};
use crate::{Edge, LayoutError, NodeAttributes, Position, Result, SimulationConfig, Velocity};

/// A loaded graph: node positions plus directed edges and optional
/// per-node attributes. `attributes` defaults to one inert entry per node
/// (depth 0, community 0, well_radius 0, size 1.0) when not supplied.
#[derive(Debug, Clone)]
pub struct GraphData {
    pub positions: Vec<Position>,
    pub edges: Vec<Edge>,
    pub attributes: Vec<NodeAttributes>,
}

impl GraphData {
    pub fn new(positions: Vec<Position>, edges: Vec<Edge>) -> Result<Self> {
        if positions.is_empty() {
            return Err(LayoutError::InvalidGraph("graph has no nodes".into()));
        }
        let attributes = vec![NodeAttributes::default(); positions.len()];
        Ok(Self {
            positions,
            edges,
            attributes,
        })
    }

    pub fn with_attributes(
        positions: Vec<Position>,
        edges: Vec<Edge>,
        attributes: Vec<NodeAttributes>,
    ) -> Result<Self> {
        if positions.is_empty() {
            return Err(LayoutError::InvalidGraph("graph has no nodes".into()));
        }
        if attributes.len() != positions.len() {
            return Err(LayoutError::InvalidGraph(format!(
                "attributes.len()={} must equal positions.len()={}",
                attributes.len(),
                positions.len()
            )));
        }
        Ok(Self {
            positions,
            edges,
            attributes,
        })
    }

    pub fn node_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn edge_count(&self) -> u32 {
        self.edges.len() as u32
    }
}

/// Owns the shared position/velocity/force/edge/attribute buffers and
/// records each tick's fixed pass sequence. An algorithm is supplied per
/// call to `record_tick` rather than owned here, so the active algorithm
/// can be swapped without reallocating shared state.
pub struct SimulationPipeline {
    ctx: GpuContext,
    max_nodes: u32,
    max_edges: u32,
    workgroup_size: u32,

    positions: [wgpu::Buffer; 2],
    velocities: [wgpu::Buffer; 2],
    forces: wgpu::Buffer,
    edges: wgpu::Buffer,
    attributes: wgpu::Buffer,
    staging: wgpu::Buffer,

    clear_params: wgpu::Buffer,
    clear_pipeline: wgpu::ComputePipeline,
    clear_bind_group: wgpu::BindGroup,

    springs_params: wgpu::Buffer,
    springs_pipeline: wgpu::ComputePipeline,
    springs_bind_groups: [wgpu::BindGroup; 2],

    integrate_params: wgpu::Buffer,
    integrate_pipeline: wgpu::ComputePipeline,
    integrate_bind_groups: [wgpu::BindGroup; 2],

    /// Index of the ping-pong half holding the current (most recently
    /// written) positions/velocities.
    role: usize,
    node_count: u32,
    edge_count: u32,
}

impl SimulationPipeline {
    pub fn new(ctx: GpuContext, max_nodes: u32, max_edges: u32, workgroup_size: u32) -> Result<Self> {
        let pos_size = (max_nodes as u64 * 8).max(8);
        let positions = [
            ctx.create_storage_buffer("Positions A", pos_size, false),
            ctx.create_storage_buffer("Positions B", pos_size, false),
        ];
        let velocities = [
            ctx.create_storage_buffer("Velocities A", pos_size, false),
            ctx.create_storage_buffer("Velocities B", pos_size, false),
        ];
        let forces = ctx.create_storage_buffer("Forces", pos_size, false);
        let edges = ctx.create_storage_buffer("Edges", (max_edges as u64 * 16).max(16), true);
        let attributes = ctx.create_storage_buffer(
            "Node Attributes",
            (max_nodes as u64 * std::mem::size_of::<NodeAttributes>() as u64).max(16),
            true,
        );
        let staging = ctx.create_staging_buffer("Position Readback Staging", pos_size);

        let clear_params = ctx.create_uniform_buffer::<ClearParams>("Clear Params");
        let springs_params = ctx.create_uniform_buffer::<SpringParams>("Springs Params");
        let integrate_params = ctx.create_uniform_buffer::<IntegrateParams>("Integrate Params");

        let clear_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Clear Bind Group Layout"),
            entries: &[storage_entry(0, false), uniform_entry(1)],
        });
        let clear_pipeline =
            ctx.create_compute_pipeline("Clear Forces", crate::shaders::CLEAR_FORCES_SHADER, "main", &clear_layout)?;
        let clear_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clear Bind Group"),
            layout: &clear_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: forces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: clear_params.as_entire_binding(),
                },
            ],
        });

        let springs_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Springs Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                uniform_entry(3),
            ],
        });
        let springs_pipeline =
            ctx.create_compute_pipeline("Springs", crate::shaders::SPRINGS_SHADER, "main", &springs_layout)?;
        let springs_bind_groups = [
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Springs Bind Group (role 0)"),
                layout: &springs_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: positions[0].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: forces.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: edges.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: springs_params.as_entire_binding(),
                    },
                ],
            }),
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Springs Bind Group (role 1)"),
                layout: &springs_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: positions[1].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: forces.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: edges.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: springs_params.as_entire_binding(),
                    },
                ],
            }),
        ];

        let integrate_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Integrate Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, true),
                storage_entry(5, true),
                uniform_entry(6),
            ],
        });
        let integrate_pipeline = ctx.create_compute_pipeline(
            "Integrate",
            crate::shaders::INTEGRATE_SHADER,
            "main",
            &integrate_layout,
        )?;
        let make_integrate_bind_group = |role: usize| {
            let other = 1 - role;
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Integrate Bind Group"),
                layout: &integrate_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: positions[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions[other].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: velocities[role].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: velocities[other].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: forces.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: attributes.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: integrate_params.as_entire_binding(),
                    },
                ],
            })
        };
        let integrate_bind_groups = [make_integrate_bind_group(0), make_integrate_bind_group(1)];

        Ok(Self {
            ctx,
            max_nodes,
            max_edges,
            workgroup_size,
            positions,
            velocities,
            forces,
            edges,
            attributes,
            staging,
            clear_params,
            clear_pipeline,
            clear_bind_group,
            springs_params,
            springs_pipeline,
            springs_bind_groups,
            integrate_params,
            integrate_pipeline,
            integrate_bind_groups,
            role: 0,
            node_count: 0,
            edge_count: 0,
        })
    }

    pub fn ctx(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn role(&self) -> usize {
        self.role
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn edge_count(&self) -> u32 {
        self.edge_count
    }

    fn check_capacity(&self, graph: &GraphData) -> Result<()> {
        let node_count = graph.node_count();
        let edge_count = graph.edge_count();
        if node_count > self.max_nodes {
            return Err(LayoutError::CapacityExceeded {
                field: "graph.node_count",
                expected: self.max_nodes,
                actual: node_count,
                node_count,
                edge_count,
            });
        }
        if edge_count > self.max_edges {
            return Err(LayoutError::CapacityExceeded {
                field: "graph.edge_count",
                expected: self.max_edges,
                actual: edge_count,
                node_count,
                edge_count,
            });
        }
        Ok(())
    }

    /// Upload a (new or replacement) graph. Velocities and forces reset to
    /// zero; both ping-pong position halves start equal so either role may
    /// be read before the first tick.
    pub fn load_graph(&mut self, graph: &GraphData) -> Result<()> {
        self.check_capacity(graph)?;

        let zero_velocities = vec![Velocity::default(); graph.positions.len()];
        for i in 0..2 {
            self.ctx
                .queue
                .write_buffer(&self.positions[i], 0, bytemuck::cast_slice(&graph.positions));
            self.ctx
                .queue
                .write_buffer(&self.velocities[i], 0, bytemuck::cast_slice(&zero_velocities));
        }
        self.ctx.queue.write_buffer(&self.edges, 0, bytemuck::cast_slice(&graph.edges));
        self.ctx
            .queue
            .write_buffer(&self.attributes, 0, bytemuck::cast_slice(&graph.attributes));

        self.role = 0;
        self.node_count = graph.node_count();
        self.edge_count = graph.edge_count();
        Ok(())
    }

    /// Shared buffer view handed to an algorithm's `create_bind_groups`.
    pub fn shared_buffers(&self) -> SharedBuffers<'_> {
        SharedBuffers {
            positions: &self.positions,
            forces: &self.forces,
            edges: &self.edges,
            attributes: &self.attributes,
        }
    }

    /// Record and submit one tick: `clear -> repulsion -> springs? ->
    /// integrate`, then rotate the ping-pong role.
    pub fn record_tick(&mut self, algorithm: &dyn ForceAlgorithm, sim: &SimulationConfig, alpha: f32) -> Result<()> {
        if self.node_count == 0 {
            return Err(LayoutError::NotInitialized);
        }

        let clear_params = ClearParams {
            node_count: self.node_count,
            ..Default::default()
        };
        self.ctx.queue.write_buffer(&self.clear_params, 0, bytemuck::bytes_of(&clear_params));

        let springs_params = SpringParams {
            spring_strength: sim.spring_strength,
            ideal_length: sim.ideal_length,
            edge_count: self.edge_count,
            node_count: self.node_count,
        };
        self.ctx
            .queue
            .write_buffer(&self.springs_params, 0, bytemuck::bytes_of(&springs_params));

        let gravity = if algorithm.handles_gravity() { 0.0 } else { sim.gravity };
        let integrate_params = IntegrateParams {
            gravity,
            ..IntegrateParams::pack(sim, self.node_count, alpha)
        };
        self.ctx
            .queue
            .write_buffer(&self.integrate_params, 0, bytemuck::bytes_of(&integrate_params));

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Tick Encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Clear Forces"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.clear_pipeline);
            pass.set_bind_group(0, &self.clear_bind_group, &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(self.node_count, self.workgroup_size), 1, 1);
        }

        algorithm.record_repulsion_pass(&mut encoder, self.node_count, self.role);

        if self.edge_count > 0 && !algorithm.handles_springs() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Springs"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.springs_pipeline);
            pass.set_bind_group(0, &self.springs_bind_groups[self.role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(self.edge_count, self.workgroup_size), 1, 1);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Integrate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.integrate_pipeline);
            pass.set_bind_group(0, &self.integrate_bind_groups[self.role], &[]);
            pass.dispatch_workgroups(GpuContext::dispatch_count(self.node_count, self.workgroup_size), 1, 1);
        }

        self.ctx.queue.submit(Some(encoder.finish()));
        self.role = 1 - self.role;
        Ok(())
    }

    /// Copy the current positions into the staging buffer. Must be paired
    /// with [`Self::await_readback`]; never call mid-tick-sequence.
    pub fn schedule_readback(&self) {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        let size = (self.node_count as u64) * std::mem::size_of::<Position>() as u64;
        encoder.copy_buffer_to_buffer(&self.positions[self.role], 0, &self.staging, 0, size);
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    /// Block until the staging buffer is mapped, then copy positions into
    /// `out`. `out.len()` must equal the current node count.
    pub fn await_readback(&self, out: &mut [Position]) -> Result<()> {
        if out.len() != self.node_count as usize {
            return Err(LayoutError::Readback(format!(
                "output buffer has {} entries, expected {}",
                out.len(),
                self.node_count
            )));
        }
        map_buffer_blocking(&self.ctx.device, &self.staging, wgpu::MapMode::Read)?;
        {
            let data = self.staging.slice(..).get_mapped_range();
            let positions: &[Position] = bytemuck::cast_slice(&data);
            out.copy_from_slice(&positions[..out.len()]);
        }
        self.staging.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_data_rejects_empty_positions() {
        assert!(GraphData::new(vec![], vec![]).is_err());
    }

    #[test]
    fn graph_data_defaults_inert_attributes() {
        let g = GraphData::new(vec![Position::new(0.0, 0.0); 3], vec![]).unwrap();
        assert_eq!(g.attributes.len(), 3);
        assert_eq!(g.attributes[0], NodeAttributes::default());
    }

    #[test]
    fn graph_data_rejects_mismatched_attribute_length() {
        let err = GraphData::with_attributes(
            vec![Position::new(0.0, 0.0); 2],
            vec![],
            vec![NodeAttributes::default(); 1],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidGraph(_)));
    }
}
