//! Large graph benchmark (9000 nodes) exercising the Barnes-Hut algorithm.
//!
//! Run with: cargo run --example large_graph --release

use std::time::Instant;

use force_layout_gpu::{
    AlgorithmConfig, AlgorithmId, AlgorithmRegistry, BarnesHut, Edge, ForceAlgorithm, GpuContext,
    GraphData, Position, SimulationConfig, SimulationController, SimulationPipeline,
};

fn main() {
    tracing_subscriber::fmt::init();

    let node_count = 9000;
    let edge_count = 9000;

    println!("=== GPU Barnes-Hut Layout Benchmark ===");
    println!("Graph: {node_count} nodes, {edge_count} edges");
    println!();

    let mut positions: Vec<Position> = Vec::with_capacity(node_count);
    for i in 0..node_count {
        let angle = (i as f32) * 0.1;
        let radius = 200.0 + (i as f32) * 0.3;
        positions.push(Position::new(
            radius * angle.cos() + (i as f32 * 13.37).sin() * 100.0,
            radius * angle.sin() + (i as f32 * 7.13).cos() * 100.0,
        ));
    }

    let mut edges: Vec<Edge> = Vec::with_capacity(edge_count);
    for i in 1..node_count {
        edges.push(Edge::new((i - 1) as u32, i as u32));
    }
    let remaining = edge_count - (node_count - 1);
    for i in 0..remaining {
        let source = (i * 17) % node_count;
        let target = (i * 31 + 7) % node_count;
        if source != target {
            edges.push(Edge::new(source as u32, target as u32));
        }
    }

    println!("Initializing GPU layout (Barnes-Hut theta=0.8)...");
    let ctx = pollster::block_on(GpuContext::new()).expect("failed to create GPU context");

    let mut pipeline =
        SimulationPipeline::new(ctx, node_count as u32, edges.len() as u32, 256).expect("failed to create pipeline");

    let graph = GraphData::new(positions, edges).expect("invalid graph");
    pipeline.load_graph(&graph).expect("failed to load graph");

    let mut algo_config = AlgorithmConfig::with_defaults();
    algo_config.barnes_hut_theta = 0.8;
    algo_config.repulsion_strength = 2000.0;

    let mut registry = AlgorithmRegistry::new();
    let mut barnes_hut = Box::new(BarnesHut::new(algo_config));
    barnes_hut.create_pipelines(pipeline.ctx()).expect("pipelines");
    barnes_hut
        .create_buffers(pipeline.ctx(), node_count as u32, graph.edge_count())
        .expect("buffers");
    barnes_hut
        .create_bind_groups(pipeline.ctx(), &pipeline.shared_buffers())
        .expect("bind groups");
    registry.register(barnes_hut);

    let sim_config = SimulationConfig {
        dt: 0.016,
        damping: 0.85,
        gravity: 0.05,
        spring_strength: 0.005,
        ideal_length: 80.0,
        ..Default::default()
    };
    let mut controller = SimulationController::from_config(&sim_config);
    controller.start();

    println!("Running 100 iterations...");
    println!();

    let mut out = vec![Position::default(); node_count];
    let tick = |pipeline: &mut SimulationPipeline, registry: &mut AlgorithmRegistry, controller: &mut SimulationController| {
        let algo = registry.get_mut(AlgorithmId::BarnesHut).expect("barnes-hut registered");
        algo.update_uniforms(pipeline.ctx(), &graph, sim_config.dt, sim_config.damping)
            .expect("update_uniforms");
        let alpha = controller.tick().unwrap_or(0.0);
        pipeline.record_tick(algo.as_ref(), &sim_config, alpha).expect("record_tick");
    };

    // Warm up.
    for _ in 0..5 {
        tick(&mut pipeline, &mut registry, &mut controller);
    }

    let iterations = 100;
    let start = Instant::now();

    for i in 0..iterations {
        tick(&mut pipeline, &mut registry, &mut controller);

        if i == 0 || i == 49 || i == 99 {
            pipeline.schedule_readback();
            pipeline.await_readback(&mut out).expect("readback");
            let (min_x, max_x, min_y, max_y) = out.iter().fold(
                (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
                |(min_x, max_x, min_y, max_y), p| {
                    (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
                },
            );
            println!("  Iteration {i:3}: layout size {:.0} x {:.0}", max_x - min_x, max_y - min_y);
        }
    }

    let elapsed = start.elapsed();
    let fps = iterations as f64 / elapsed.as_secs_f64();
    let ms_per_iter = 1000.0 / fps;

    println!();
    println!("=== Results ===");
    println!("  Total time:    {elapsed:.2?}");
    println!("  Iterations/s:  {fps:.1}");
    println!("  ms/iteration:  {ms_per_iter:.2}ms");
    println!();

    let n = node_count as f64;
    println!("=== Complexity Analysis ===");
    println!("  O(n^2) operations:      {:.2e}", n * n);
    println!("  O(n log n) operations:  {:.2e}", n * n.log2());
    println!("  Speedup factor:         {:.0}x", (n * n) / (n * n.log2()));
}
