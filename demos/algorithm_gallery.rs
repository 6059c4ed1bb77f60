//! Runs several force algorithms over the same small graph and reports
//! each one's resulting layout spread, as a quick sanity tour of the
//! algorithm contract (C2) rather than a benchmark.
//!
//! Run with: cargo run --example algorithm_gallery

use force_layout_gpu::{
    AlgorithmConfig, AlgorithmId, Community, Direct, Edge, ForceAlgorithm, ForceAtlas2,
    GpuContext, GraphData, NodeAttributes, Position, SimulationConfig, SimulationController,
    SimulationPipeline,
};

/// Two 5-node cliques joined by a single bridge edge, split into two
/// community ids, to give the Community algorithm something to cluster.
fn clique_graph() -> (Vec<Position>, Vec<Edge>, Vec<NodeAttributes>) {
    let mut positions = Vec::new();
    let mut edges = Vec::new();
    let mut attributes = Vec::new();

    for cluster in 0..2u32 {
        let base = cluster as usize * 5;
        for i in 0..5 {
            let angle = (i as f32) / 5.0 * std::f32::consts::TAU;
            let cx = cluster as f32 * 200.0;
            positions.push(Position::new(cx + angle.cos() * 20.0, angle.sin() * 20.0));
            attributes.push(NodeAttributes {
                community_id: cluster,
                ..Default::default()
            });
        }
        for i in 0..5 {
            for j in (i + 1)..5 {
                edges.push(Edge::new((base + i) as u32, (base + j) as u32));
            }
        }
    }
    edges.push(Edge::new(0, 5));

    (positions, edges, attributes)
}

fn bounding_box(positions: &[Position]) -> (f32, f32, f32, f32) {
    positions.iter().fold(
        (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
        |(min_x, max_x, min_y, max_y), p| (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y)),
    )
}

fn run_algorithm(
    ctx_factory: impl Fn() -> GpuContext,
    name: &str,
    algo_id: AlgorithmId,
    mut algo: Box<dyn ForceAlgorithm>,
    graph: &GraphData,
    sim_config: &SimulationConfig,
    ticks: u32,
) {
    let ctx = ctx_factory();
    let mut pipeline =
        SimulationPipeline::new(ctx, graph.node_count(), graph.edge_count(), 256).expect("pipeline");
    pipeline.load_graph(graph).expect("load_graph");

    algo.create_pipelines(pipeline.ctx()).expect("create_pipelines");
    algo.create_buffers(pipeline.ctx(), graph.node_count(), graph.edge_count())
        .expect("create_buffers");
    algo.create_bind_groups(pipeline.ctx(), &pipeline.shared_buffers())
        .expect("create_bind_groups");

    let mut controller = SimulationController::from_config(sim_config);
    controller.start();

    let mut out = vec![Position::default(); graph.node_count() as usize];
    for _ in 0..ticks {
        algo.update_uniforms(pipeline.ctx(), graph, sim_config.dt, sim_config.damping)
            .expect("update_uniforms");
        let alpha = controller.tick().unwrap_or(0.0);
        pipeline.record_tick(algo.as_ref(), sim_config, alpha).expect("record_tick");
    }
    pipeline.schedule_readback();
    pipeline.await_readback(&mut out).expect("readback");

    let (min_x, max_x, min_y, max_y) = bounding_box(&out);
    println!(
        "{name:<14} [{algo_id:?}]: bounds ({:.1}, {:.1}) to ({:.1}, {:.1}), size {:.1} x {:.1}",
        min_x,
        min_y,
        max_x,
        max_y,
        max_x - min_x,
        max_y - min_y
    );
}

fn main() {
    tracing_subscriber::fmt::init();

    let (positions, edges, attributes) = clique_graph();
    let graph = GraphData::with_attributes(positions, edges, attributes).expect("valid graph");
    let sim_config = SimulationConfig::default();

    let ctx_factory = || pollster::block_on(GpuContext::new()).expect("failed to create GPU context");

    println!("Two 5-node cliques joined by one bridge edge, 300 ticks each:\n");

    run_algorithm(
        ctx_factory,
        "Direct",
        AlgorithmId::Direct,
        Box::new(Direct::new(AlgorithmConfig::with_defaults())),
        &graph,
        &sim_config,
        300,
    );

    run_algorithm(
        ctx_factory,
        "ForceAtlas2",
        AlgorithmId::ForceAtlas2,
        Box::new(ForceAtlas2::new(AlgorithmConfig::with_defaults())),
        &graph,
        &sim_config,
        300,
    );

    let mut community_config = AlgorithmConfig::with_defaults();
    community_config.community.community_count = 2;
    run_algorithm(
        ctx_factory,
        "Community",
        AlgorithmId::Community,
        Box::new(Community::new(community_config)),
        &graph,
        &sim_config,
        300,
    );
}
