// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use raster_engine::engine::Engine;
use raster_models::command_processor::{CommandProcessor, CommandStep};
use raster_models::config::{RasterizationStrategy, RasterizerConfig};
use raster_models::fragment_sink::FragmentSink;
use raster_models::rasterizer::Rasterizer;
use raster_models::shader_pool::{ShaderPool, ShaderPoolConfig};
use raster_models::triangle_source::{TriangleSource, random_triangles};
use raster_models::types::{CommandKind, RasterizerCommand, RasterizerState};
use raster_track::tracker::dev_null_tracker;

const NUM_TRIANGLES: usize = 200;
const CYCLE_LIMIT: u64 = 1_000_000;

type Draw = (Engine, Rc<RefCell<CommandProcessor>>, Rc<RefCell<FragmentSink>>);

fn setup_draw(config: &RasterizerConfig) -> Draw {
    // Create an engine without the tracker system writing any output
    let mut engine = Engine::new(&dev_null_tracker());
    let top = engine.top().clone();
    let (rasterizer, io) = Rasterizer::new(&top, "rasterizer", config).unwrap();

    let triangles = random_triangles(NUM_TRIANGLES, 0, 0.2);
    let source = TriangleSource::new(&top, io.triangle_request_rx, io.triangle_tx, triangles);
    let sink = Rc::new(RefCell::new(FragmentSink::new(&top, io.fragment_rx)));
    let steps = vec![
        CommandStep::Send(RasterizerCommand::new(CommandKind::Reset)),
        CommandStep::Send(RasterizerCommand::new(CommandKind::Draw)),
        CommandStep::WaitFor(RasterizerState::End),
        CommandStep::Send(RasterizerCommand::new(CommandKind::End)),
        CommandStep::WaitFor(RasterizerState::Ready),
    ];
    let processor = Rc::new(RefCell::new(CommandProcessor::new(
        &top,
        io.command_tx,
        io.state_rx,
        steps,
    )));

    engine.register(Rc::new(RefCell::new(rasterizer)));
    engine.register(Rc::new(RefCell::new(source)));
    if let Some(ports) = io.shader {
        let pool = ShaderPool::new(&top, ShaderPoolConfig::default(), ports).unwrap();
        engine.register(Rc::new(RefCell::new(pool)));
    }
    engine.register(sink.clone());
    engine.register(processor.clone());
    (engine, processor, sink)
}

fn run_draw(draw: Draw) {
    let (mut engine, processor, sink) = draw;
    engine
        .run_until(|| processor.borrow().done(), Some(CYCLE_LIMIT))
        .unwrap();
    assert_eq!(sink.borrow().statistics().last_stamps, 1);
}

fn bench_draw(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw");

    let configs = [
        ("recursive", RasterizerConfig::default()),
        (
            "scanline",
            RasterizerConfig {
                strategy: RasterizationStrategy::Scanline,
                ..RasterizerConfig::default()
            },
        ),
        (
            "shader_setup",
            RasterizerConfig {
                shader_setup: true,
                ..RasterizerConfig::default()
            },
        ),
    ];

    for (name, config) in configs {
        group.bench_function(name, |b| {
            b.iter_batched(|| setup_draw(&config), run_draw, BatchSize::SmallInput);
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_draw
}
criterion_main!(benches);
