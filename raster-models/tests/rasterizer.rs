// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

mod common;

use common::{HarnessBuilder, draw, scene, send, write};
use raster_engine::test_helpers::start_test;
use raster_models::command_processor::CommandStep;
use raster_models::config::RasterizerConfig;
use raster_models::rasterizer::Rasterizer;
use raster_models::registers::{Child, GpuRegister, RegisterValue};
use raster_models::stage::Stage;
use raster_models::types::{CommandKind, RasterizerState};

#[test]
fn draw_and_end() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(4, 1))
        .build(file!());
    harness.run(10_000).unwrap();

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

    let rasterizer = harness.rasterizer.borrow();
    assert_eq!(rasterizer.state(), RasterizerState::Ready);
    assert_eq!(rasterizer.command_statistics().reset, 1);
    for child in Child::ALL {
        let stage = rasterizer.child(child);
        assert_eq!(stage.state(), RasterizerState::Ready, "{child}");
        let commands = stage.command_statistics();
        assert_eq!(commands.reset, 1, "{child}");
        assert_eq!(commands.draw, 1, "{child}");
        assert_eq!(commands.end, 1, "{child}");
        assert_eq!(commands.reg_write, 0, "{child}");
    }
}

#[test]
fn repeated_reset() {
    let mut steps = vec![send(CommandKind::Reset), send(CommandKind::Reset)];
    steps.extend(draw());
    steps.push(send(CommandKind::Reset));
    steps.push(CommandStep::WaitFor(RasterizerState::Ready));
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(2, 2))
        .steps(steps)
        .build(file!());
    harness.run(10_000).unwrap();
    harness.engine.run_for(5).unwrap();

    let rasterizer = harness.rasterizer.borrow();
    assert_eq!(rasterizer.command_statistics().reset, 3);
    for child in Child::ALL {
        assert_eq!(rasterizer.child(child).command_statistics().reset, 3, "{child}");
        assert_eq!(rasterizer.child(child).state(), RasterizerState::Ready, "{child}");
    }
}

#[test]
fn register_write_while_drawing_is_fatal() {
    let steps = vec![
        send(CommandKind::Reset),
        send(CommandKind::Draw),
        CommandStep::WaitFor(RasterizerState::Drawing),
        write(GpuRegister::EarlyZ, 0, RegisterValue::Bool(false)),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(50, 3))
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(10_000)).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::rasterizer: process_command: register write received in Drawing state"
    );
}

#[test]
fn end_while_drawing_is_fatal() {
    let steps = vec![
        send(CommandKind::Reset),
        send(CommandKind::Draw),
        CommandStep::WaitFor(RasterizerState::Drawing),
        send(CommandKind::End),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(50, 3))
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(10_000)).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::rasterizer: process_command: end received in Drawing state"
    );
}

#[test]
fn draw_without_reset_is_fatal() {
    // The rasterizer leaves RESET on its own but the stages wait for a RESET
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(2, 4))
        .steps(draw())
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(1000)).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::rasterizer::setup: process_command: draw received in Reset state"
    );
}

#[test]
fn register_fan_out() {
    let steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::EarlyZ, 0, RegisterValue::Bool(false)),
        write(GpuRegister::Multisampling, 0, RegisterValue::Bool(true)),
        write(GpuRegister::FragmentInputAttributes, 3, RegisterValue::Bool(true)),
        write(GpuRegister::UserClip, 1, RegisterValue::Bool(true)),
        write(GpuRegister::DisplayXRes, 0, RegisterValue::UInt(640)),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());
    harness.run(1000).unwrap();
    harness.engine.run_for(5).unwrap();

    let rasterizer = harness.rasterizer.borrow();
    let writes = |child| rasterizer.child(child).command_statistics().reg_write;
    assert_eq!(writes(Child::Setup), 1);
    assert_eq!(writes(Child::Traversal), 2);
    assert_eq!(writes(Child::HierarchicalZ), 2);
    assert_eq!(writes(Child::Interpolator), 1);
    assert_eq!(writes(Child::FragmentFifo), 2);
    assert_eq!(rasterizer.command_statistics().reg_write, 5);

    let registers = rasterizer.registers();
    assert_eq!(
        registers.read(GpuRegister::EarlyZ, 0),
        Some(RegisterValue::Bool(false))
    );
    assert_eq!(
        registers.read(GpuRegister::FragmentInputAttributes, 3),
        Some(RegisterValue::Bool(true))
    );
    assert_eq!(
        registers.read(GpuRegister::FragmentInputAttributes, 2),
        Some(RegisterValue::Bool(false))
    );
    assert_eq!(
        registers.read(GpuRegister::UserClip, 1),
        Some(RegisterValue::Bool(true))
    );
    assert_eq!(
        registers.read(GpuRegister::DisplayXRes, 0),
        Some(RegisterValue::UInt(640))
    );
}

#[test]
fn register_file_reset() {
    let steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::EarlyZ, 0, RegisterValue::Bool(false)),
        send(CommandKind::Reset),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());
    harness.run(1000).unwrap();
    harness.engine.run_for(5).unwrap();

    assert_eq!(
        harness
            .rasterizer
            .borrow()
            .registers()
            .read(GpuRegister::EarlyZ, 0),
        Some(RegisterValue::Bool(true))
    );
}

#[test]
fn unsupported_register() {
    let steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::Blending, 0, RegisterValue::Bool(true)),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(1000)).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::rasterizer: process_register_write: Unsupported Rasterizer register Blending"
    );
}

#[test]
fn register_sub_register_out_of_range() {
    let steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::ColorMaskG, 8, RegisterValue::Bool(false)),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(1000)).unwrap_err();
    assert!(format!("{err}").contains("ColorMaskG sub-register 8 out of range"));
}

#[test]
fn register_wrong_value_type() {
    let steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::ViewportWidth, 0, RegisterValue::Float(1.0)),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(1000)).unwrap_err();
    assert!(format!("{err}").contains("ViewportWidth expects a UInt value"));
}

#[test]
fn register_read_unsupported() {
    let steps = vec![
        send(CommandKind::Reset),
        send(CommandKind::RegRead {
            register: GpuRegister::EarlyZ,
            subreg: 0,
        }),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(1000)).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::rasterizer: process_command: unsupported command REG_READ EarlyZ[0]"
    );
}

#[test]
fn clear_z_buffer() {
    let steps = vec![
        send(CommandKind::Reset),
        send(CommandKind::ClearZStencilBuffer),
        CommandStep::WaitFor(RasterizerState::ClearEnd),
        send(CommandKind::End),
        CommandStep::WaitFor(RasterizerState::Ready),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());
    harness.run(1000).unwrap();

    assert_eq!(
        harness.states(),
        vec![
            RasterizerState::Reset,
            RasterizerState::Ready,
            RasterizerState::Clear,
            RasterizerState::ClearEnd,
            RasterizerState::Ready
        ]
    );

    let rasterizer = harness.rasterizer.borrow();
    let hz = rasterizer.hierarchical_z();
    assert_eq!(hz.command_statistics().clear, 1);
    assert_eq!(hz.command_statistics().end, 1);
    assert_eq!(hz.state(), RasterizerState::Ready);

    // 400x400 pixels in blocks of 16 stamps, 256 blocks per cycle
    assert_eq!(hz.clear_cycles(), 10);
    assert_eq!(hz.statistics().clear_cycles, 10);

    for child in [Child::Setup, Child::Traversal, Child::Interpolator, Child::FragmentFifo] {
        let commands = rasterizer.child(child).command_statistics();
        assert_eq!(commands.clear, 0, "{child}");
        assert_eq!(commands.end, 0, "{child}");
    }
}

#[test]
fn clear_follows_resolution() {
    let steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::DisplayXRes, 0, RegisterValue::UInt(1024)),
        write(GpuRegister::DisplayYRes, 0, RegisterValue::UInt(768)),
        send(CommandKind::ClearZStencilBuffer),
        CommandStep::WaitFor(RasterizerState::ClearEnd),
        send(CommandKind::End),
        CommandStep::WaitFor(RasterizerState::Ready),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .steps(steps)
        .build(file!());
    harness.run(1000).unwrap();

    // 1024x768 / 64 = 12288 blocks, 48 cycles at 256 per cycle
    let rasterizer = harness.rasterizer.borrow();
    assert_eq!(rasterizer.hierarchical_z().clear_cycles(), 48);
    assert_eq!(rasterizer.hierarchical_z().statistics().clear_cycles, 48);
}

#[test]
fn clear_while_drawing_is_fatal() {
    let steps = vec![
        send(CommandKind::Reset),
        send(CommandKind::Draw),
        CommandStep::WaitFor(RasterizerState::Drawing),
        send(CommandKind::ClearZStencilBuffer),
    ];
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(50, 5))
        .steps(steps)
        .build(file!());

    let err = harness.engine.run_until(|| false, Some(10_000)).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::rasterizer: process_command: clear received in Drawing state"
    );
}

#[test]
fn stall_detected_without_triangles() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(4, 6))
        .without_source()
        .build(file!());
    harness.engine.run_for(300).unwrap();

    let rasterizer = harness.rasterizer.borrow();
    assert_eq!(rasterizer.state(), RasterizerState::Drawing);
    let cycle = harness.engine.cycle();
    assert!(rasterizer.detect_stall(cycle, 100));
    assert!(!rasterizer.detect_stall(cycle, 1000));

    let report = rasterizer.stall_report();
    assert!(report.starts_with("top::rasterizer: DRAWING"));
    for child in Child::ALL {
        assert!(report.contains(&format!("\n  {child}: DRAWING")), "{report}");
    }
}

#[test]
fn no_stall_while_drawing() {
    let mut harness = HarnessBuilder::new(RasterizerConfig::default())
        .triangles(scene(40, 7))
        .build(file!());

    let stall_cycles = 200;
    let done = harness.processor.clone();
    while !done.borrow().done() {
        harness.engine.step().unwrap();
        let cycle = harness.engine.cycle();
        assert!(!harness.rasterizer.borrow().detect_stall(cycle, stall_cycles));
        assert!(cycle < 100_000);
    }
}

#[test]
fn invalid_config_rejected() {
    let config = RasterizerConfig {
        stamps_cycle: 2,
        num_stamp_units: 4,
        ..RasterizerConfig::default()
    };
    let engine = start_test(file!());
    let result = Rasterizer::new(engine.top(), "rasterizer", &config);
    assert_eq!(
        format!("{}", result.err().unwrap()),
        "Error: top::rasterizer: validate: stamps per cycle (2) less than stamp units (4)"
    );
}
