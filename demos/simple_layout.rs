//! Simple example demonstrating GPU-accelerated force-directed layout.
//!
//! Run with: cargo run --example simple_layout

use std::time::Instant;

use force_layout_gpu::{
    AlgorithmConfig, AlgorithmId, AlgorithmRegistry, BarnesHut, Edge, ForceAlgorithm, GpuContext,
    GraphData, Position, SimulationConfig, SimulationController, SimulationPipeline,
};

fn main() {
    tracing_subscriber::fmt::init();

    let node_count = 1000;
    let edge_count = 2000;

    println!("Creating random graph with {node_count} nodes and {edge_count} edges...");

    let mut positions: Vec<Position> = Vec::with_capacity(node_count);
    for i in 0..node_count {
        let angle = (i as f32) * 0.1;
        let radius = 100.0 + (i as f32) * 0.5;
        positions.push(Position::new(
            radius * angle.cos() + (i as f32 * 13.37).sin() * 50.0,
            radius * angle.sin() + (i as f32 * 7.13).cos() * 50.0,
        ));
    }

    let mut edges: Vec<Edge> = Vec::with_capacity(edge_count);
    for i in 1..node_count {
        edges.push(Edge::new((i - 1) as u32, i as u32));
    }
    for i in 0..(edge_count - node_count + 1) {
        let source = (i * 17) % node_count;
        let target = (i * 31 + 7) % node_count;
        if source != target {
            edges.push(Edge::new(source as u32, target as u32));
        }
    }

    println!("Initializing GPU context...");
    let ctx = pollster::block_on(GpuContext::new()).expect("failed to create GPU context");

    let mut pipeline =
        SimulationPipeline::new(ctx, node_count as u32, edges.len() as u32, 256).expect("failed to create pipeline");

    let graph = GraphData::new(positions, edges).expect("invalid graph");
    pipeline.load_graph(&graph).expect("failed to load graph");

    let mut registry = AlgorithmRegistry::new();
    let mut barnes_hut = Box::new(BarnesHut::new(AlgorithmConfig::with_defaults()));
    barnes_hut.create_pipelines(pipeline.ctx()).expect("pipelines");
    barnes_hut
        .create_buffers(pipeline.ctx(), node_count as u32, graph.edge_count())
        .expect("buffers");
    barnes_hut
        .create_bind_groups(pipeline.ctx(), &pipeline.shared_buffers())
        .expect("bind groups");
    registry.register(barnes_hut);

    let sim_config = SimulationConfig::default();
    let mut controller = SimulationController::from_config(&sim_config);
    controller.start();

    println!("Running layout simulation...");
    let iterations = 100;
    let start = Instant::now();
    let mut out = vec![Position::default(); node_count];

    for i in 0..iterations {
        let algo = registry
            .get_mut(AlgorithmId::BarnesHut)
            .expect("barnes-hut registered")
            .as_mut();
        algo.update_uniforms(pipeline.ctx(), &graph, sim_config.dt, sim_config.damping)
            .expect("update_uniforms");

        let alpha = controller.tick().unwrap_or(0.0);
        pipeline.record_tick(algo, &sim_config, alpha).expect("record_tick");

        if i % 10 == 0 {
            pipeline.schedule_readback();
            pipeline.await_readback(&mut out).expect("readback");
            let (min_x, max_x, min_y, max_y) = out.iter().fold(
                (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
                |(min_x, max_x, min_y, max_y), p| {
                    (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
                },
            );
            println!("Iteration {i}: bounds = ({min_x:.1}, {min_y:.1}) to ({max_x:.1}, {max_y:.1})");
        }
    }

    let elapsed = start.elapsed();
    let fps = iterations as f64 / elapsed.as_secs_f64();

    println!("\nCompleted {iterations} iterations in {elapsed:.2?}");
    println!("Average: {fps:.1} iterations/sec ({:.1} ms/iteration)", 1000.0 / fps);

    pipeline.schedule_readback();
    pipeline.await_readback(&mut out).expect("final readback");
    println!("\nFinal positions (first 5 nodes):");
    for (i, pos) in out.iter().take(5).enumerate() {
        println!("  Node {i}: ({:.2}, {:.2})", pos.x, pos.y);
    }
}

