// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Library functions to build the parts of the SimRaster application.

use std::cell::RefCell;
use std::rc::Rc;

use raster_engine::engine::Engine;
use raster_engine::types::SimError;
use raster_models::command_processor::{CommandProcessor, CommandStep};
use raster_models::fragment_sink::FragmentSink;
use raster_models::rasterizer::Rasterizer;
use raster_models::registers::{CullMode, GpuRegister, RegisterValue};
use raster_models::shader_pool::ShaderPool;
use raster_models::triangle_source::{TriangleSource, random_triangles};
use raster_models::types::{CommandKind, RasterizerCommand, RasterizerState};

use crate::config::{SceneConfig, SimConfig};

/// Every component of a simulation, registered with the engine in the order
/// they are clocked.
pub struct Platform {
    pub rasterizer: Rc<RefCell<Rasterizer>>,
    pub source: Rc<RefCell<TriangleSource>>,
    pub pool: Option<Rc<RefCell<ShaderPool>>>,
    pub sink: Rc<RefCell<FragmentSink>>,
    pub processor: Rc<RefCell<CommandProcessor>>,
}

fn send(kind: CommandKind) -> CommandStep {
    CommandStep::Send(RasterizerCommand::new(kind))
}

fn write(register: GpuRegister, value: RegisterValue) -> CommandStep {
    CommandStep::Send(RasterizerCommand::reg_write(register, 0, value))
}

/// The commands played by the command processor: a reset, the register
/// state of the scene, one draw and then a clear of the Z buffer.
#[must_use]
pub fn command_script(scene: &SceneConfig) -> Vec<CommandStep> {
    let culling = if scene.cull_back_faces {
        CullMode::Back
    } else {
        CullMode::None
    };
    let multisampling = scene.msaa_samples >= 2;

    let mut steps = vec![
        send(CommandKind::Reset),
        write(GpuRegister::DisplayXRes, RegisterValue::UInt(scene.width)),
        write(GpuRegister::DisplayYRes, RegisterValue::UInt(scene.height)),
        write(GpuRegister::ViewportIniX, RegisterValue::Int(0)),
        write(GpuRegister::ViewportIniY, RegisterValue::Int(0)),
        write(GpuRegister::ViewportWidth, RegisterValue::UInt(scene.width)),
        write(GpuRegister::ViewportHeight, RegisterValue::UInt(scene.height)),
        write(GpuRegister::Culling, RegisterValue::Cull(culling)),
        write(GpuRegister::Multisampling, RegisterValue::Bool(multisampling)),
    ];
    if multisampling {
        steps.push(write(
            GpuRegister::MsaaSamples,
            RegisterValue::UInt(scene.msaa_samples),
        ));
    }
    steps.extend([
        send(CommandKind::Draw),
        CommandStep::WaitFor(RasterizerState::End),
        send(CommandKind::End),
        CommandStep::WaitFor(RasterizerState::Ready),
        send(CommandKind::ClearZStencilBuffer),
        CommandStep::WaitFor(RasterizerState::ClearEnd),
        send(CommandKind::End),
        CommandStep::WaitFor(RasterizerState::Ready),
    ]);
    steps
}

/// Build the rasterizer and everything around it and register the
/// components with the engine.
pub fn build_platform(engine: &mut Engine, config: &SimConfig) -> Result<Platform, SimError> {
    let top = engine.top().clone();
    let (rasterizer, io) = Rasterizer::new(&top, "rasterizer", &config.rasterizer)?;

    let scene = &config.scene;
    let triangles = random_triangles(scene.triangles, scene.seed, scene.max_extent);
    let mut source = TriangleSource::new(&top, io.triangle_request_rx, io.triangle_tx, triangles);
    if config.rasterizer.pre_triangle_bound {
        source = source.with_binding(rasterizer.emulator());
    }

    let pool = match io.shader {
        Some(ports) => Some(Rc::new(RefCell::new(ShaderPool::new(
            &top,
            config.shader_pool.clone(),
            ports,
        )?))),
        None => None,
    };

    let platform = Platform {
        rasterizer: Rc::new(RefCell::new(rasterizer)),
        source: Rc::new(RefCell::new(source)),
        pool,
        sink: Rc::new(RefCell::new(FragmentSink::new(&top, io.fragment_rx))),
        processor: Rc::new(RefCell::new(CommandProcessor::new(
            &top,
            io.command_tx,
            io.state_rx,
            command_script(scene),
        ))),
    };

    engine.register(platform.rasterizer.clone());
    engine.register(platform.source.clone());
    if let Some(pool) = &platform.pool {
        engine.register(pool.clone());
    }
    engine.register(platform.sink.clone());
    engine.register(platform.processor.clone());
    Ok(platform)
}
