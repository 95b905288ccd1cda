// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

mod common;

use common::{Harness, HarnessBuilder, draw, draw_steps, scene, send, write};
use raster_engine::test_helpers::start_test;
use raster_models::config::{RasterizationStrategy, RasterizerConfig};
use raster_models::rasterizer::Rasterizer;
use raster_models::registers::{CullMode, GpuRegister, RegisterValue};
use raster_models::shader_pool::{CompletionOrder, ShaderPoolConfig};
use raster_models::stage::Stage;
use raster_models::types::{CommandKind, RasterizerState};

/// Check every stamp made it through every stage and the last stamp mark
/// arrived exactly once, at the end.
fn check_stamps_conserved(harness: &Harness) {
    let rasterizer = harness.rasterizer.borrow();
    let sink = harness.sink.borrow();
    let generated = rasterizer.traversal().statistics();

    assert_eq!(sink.statistics().last_stamps, 1);
    assert!(sink.received().last().unwrap().last);
    assert_eq!(sink.statistics().stamps, generated.stamps);
    assert_eq!(sink.statistics().covered, generated.covered);

    for stats in [
        rasterizer.hierarchical_z().statistics(),
        rasterizer.fragment_fifo().statistics(),
        rasterizer.interpolator().statistics(),
    ] {
        assert_eq!(stats.stamps_in, generated.stamps);
        assert_eq!(stats.stamps_out, generated.stamps);
    }
}

fn covered(config: RasterizerConfig, seed: u64) -> u64 {
    let mut harness = HarnessBuilder::new(config)
        .triangles(scene(24, seed))
        .build(file!());
    harness.run(100_000).unwrap();
    check_stamps_conserved(&harness);
    harness.sink.borrow().statistics().covered
}

#[test]
fn recursive_draw() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(30, 1))
        .build(file!());
    harness.run(100_000).unwrap();

    assert_eq!(
        harness.states(),
        vec![
            RasterizerState::Reset,
            RasterizerState::Ready,
            RasterizerState::Drawing,
            RasterizerState::End,
            RasterizerState::Ready
        ]
    );
    check_stamps_conserved(&harness);

    let rasterizer = harness.rasterizer.borrow();
    let sink = harness.sink.borrow();
    assert!(sink.statistics().covered > 0);
    assert!(sink.received().iter().all(|stamp| stamp.unit < 4));

    // Every triangle has been freed once traversed
    assert_eq!(rasterizer.emulator().borrow().stored_triangles(), 0);

    let setup = rasterizer.setup().statistics();
    assert_eq!(setup.inputs, 31);
    assert_eq!(setup.outputs + setup.culled, 31);
    assert_eq!(setup.sizes.iter().sum::<u64>() + setup.culled, 30);
    assert_eq!(harness.source.borrow().sent(), 30);

    let traversal = rasterizer.traversal().statistics();
    assert_eq!(traversal.inputs, setup.outputs);
    assert!(traversal.batches >= 30 / 4);
}

#[test]
fn scanline_matches_recursive() {
    let scanline = RasterizerConfig {
        strategy: RasterizationStrategy::Scanline,
        ..RasterizerConfig::default()
    };
    let recursive = covered(RasterizerConfig::default(), 3);
    assert!(recursive > 0);
    assert_eq!(covered(scanline, 3), recursive);
}

#[test]
fn shader_setup_matches_dedicated() {
    let shader = RasterizerConfig {
        shader_setup: true,
        triangle_shader_queue_size: 6,
        ..RasterizerConfig::default()
    };
    let mut harness = HarnessBuilder::new(shader)
        .triangles(scene(24, 4))
        .pool(ShaderPoolConfig {
            capacity: 4,
            latency: 7,
            outputs_cycle: 2,
            order: CompletionOrder::Random { seed: 11 },
        })
        .build(file!());
    harness.run(100_000).unwrap();
    check_stamps_conserved(&harness);

    let rasterizer = harness.rasterizer.borrow();
    let setup = rasterizer.setup().statistics();
    assert_eq!(setup.shader_dispatches, 25);
    assert_eq!(harness.pool.as_ref().unwrap().borrow().completed(), 25);
    // Reservations left over from the last request are dropped by the next DRAW
    assert_eq!(
        rasterizer.setup().ring_occupancy().map(|(occupied, _)| occupied),
        Some(0)
    );

    let dedicated = covered(RasterizerConfig::default(), 4);
    assert_eq!(harness.sink.borrow().statistics().covered, dedicated);
}

#[test]
fn shader_setup_in_reverse_order() {
    let shader = RasterizerConfig {
        shader_setup: true,
        ..RasterizerConfig::default()
    };
    let mut harness = HarnessBuilder::new(shader)
        .triangles(scene(16, 5))
        .pool(ShaderPoolConfig {
            order: CompletionOrder::Reverse,
            ..ShaderPoolConfig::default()
        })
        .build(file!());
    harness.run(100_000).unwrap();
    check_stamps_conserved(&harness);
}

#[test]
fn shader_setup_requires_unified_shaders() {
    let config = RasterizerConfig {
        shader_setup: true,
        unified_shaders: false,
        ..RasterizerConfig::default()
    };
    let engine = start_test(file!());
    let result = Rasterizer::new(engine.top(), "rasterizer", &config);
    assert_eq!(
        format!("{}", result.err().unwrap()),
        "Error: top::rasterizer: validate: shader setup requires unified shaders"
    );
}

#[test]
fn pre_bound_triangles() {
    let bound = RasterizerConfig {
        pre_triangle_bound: true,
        ..RasterizerConfig::default()
    };
    assert_eq!(covered(bound, 6), covered(RasterizerConfig::default(), 6));
}

#[test]
fn wide_pipeline() {
    let wide = RasterizerConfig {
        triangles_cycle: 2,
        setup_units: 2,
        stamps_cycle: 8,
        num_stamp_units: 4,
        hz_queue_size: 64,
        fragment_fifo_queue_size: 32,
        ..RasterizerConfig::default()
    };
    assert_eq!(covered(wide, 7), covered(RasterizerConfig::default(), 7));
}

#[test]
fn all_triangles_culled() {
    let mut steps = vec![
        send(CommandKind::Reset),
        write(
            GpuRegister::Culling,
            0,
            RegisterValue::Cull(CullMode::FrontAndBack),
        ),
    ];
    steps.extend(draw());
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(8, 8))
        .steps(steps)
        .build(file!());
    harness.run(100_000).unwrap();

    let rasterizer = harness.rasterizer.borrow();
    assert_eq!(rasterizer.setup().statistics().culled, 8);
    assert_eq!(rasterizer.traversal().statistics().batches, 0);

    // Only the last stamp mark makes it through
    let sink = harness.sink.borrow();
    assert_eq!(sink.statistics().stamps, 1);
    assert_eq!(sink.statistics().last_stamps, 1);
    assert_eq!(rasterizer.emulator().borrow().stored_triangles(), 0);
}

#[test]
fn empty_draw() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default()).build(file!());
    harness.run(10_000).unwrap();
    assert_eq!(harness.sink.borrow().statistics().stamps, 1);
    assert_eq!(harness.sink.borrow().statistics().last_stamps, 1);
}

#[test]
fn consecutive_draws() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(10, 9))
        .build(file!());
    harness.run(100_000).unwrap();
    let first = harness.sink.borrow().statistics().covered;

    // The same triangles again without a reset in between
    harness.source.borrow_mut().load(scene(10, 9));
    harness.processor.borrow_mut().extend(draw());
    harness.run(100_000).unwrap();

    let sink = harness.sink.borrow();
    assert_eq!(sink.statistics().last_stamps, 2);
    assert_eq!(sink.statistics().covered, 2 * first);

    let rasterizer = harness.rasterizer.borrow();
    assert_eq!(rasterizer.setup().command_statistics().draw, 2);
    assert_eq!(rasterizer.setup().command_statistics().reset, 1);
    assert_eq!(rasterizer.state(), RasterizerState::Ready);
    assert_eq!(rasterizer.emulator().borrow().stored_triangles(), 0);
}

#[test]
fn multisampling_slows_generation() {
    let config = RasterizerConfig {
        samples_cycle: 2,
        ..RasterizerConfig::default()
    };
    let mut steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::Multisampling, 0, RegisterValue::Bool(true)),
        write(GpuRegister::MsaaSamples, 0, RegisterValue::UInt(4)),
    ];
    steps.extend(draw());
    let mut harness = HarnessBuilder::new(config)
        .triangles(scene(6, 10))
        .steps(steps)
        .build(file!());
    harness.run(100_000).unwrap();
    check_stamps_conserved(&harness);

    let rasterizer = harness.rasterizer.borrow();
    let traversal = rasterizer.traversal();
    assert_eq!(traversal.msaa_cycles(), 2);
    assert!(traversal.statistics().msaa_stall_cycles > 0);
    assert!(harness.sink.borrow().statistics().covered > 0);
}

#[test]
fn interpolation_latency_follows_attributes() {
    let mut steps = vec![send(CommandKind::Reset)];
    for attribute in 0..9 {
        steps.push(write(
            GpuRegister::FragmentInputAttributes,
            attribute,
            RegisterValue::Bool(true),
        ));
    }
    steps.extend(draw());
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(4, 11))
        .steps(steps)
        .build(file!());
    harness.run(100_000).unwrap();
    check_stamps_conserved(&harness);

    // Base latency of 2 plus 9 attributes on 4 interpolators
    assert_eq!(harness.rasterizer.borrow().interpolator().stamp_cycles(), 5);
}

#[test]
fn draw_progress_is_reported() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(6, 12))
        .steps(draw_steps())
        .build(file!());
    let before = harness.rasterizer.borrow().progress();
    harness.run(100_000).unwrap();
    let rasterizer = harness.rasterizer.borrow();
    assert!(rasterizer.progress() > before);

    // Every stage has seen the END command, even if its state signal still
    // carries the END of the previous cycle
    let report = rasterizer.state_report();
    let (top, stages) = report.split_once(" | ").unwrap();
    assert_eq!(top, "READY");
    for (stage, name) in stages
        .split(", ")
        .zip(["setup", "traversal", "hz", "interpolator", "ffifo"])
    {
        assert!(
            stage.starts_with(&format!("{name} READY")),
            "{stage} in {report}"
        );
    }
}
