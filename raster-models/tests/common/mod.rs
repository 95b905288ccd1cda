// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use raster_emulator::types::Vertex;
use raster_engine::engine::Engine;
use raster_engine::test_helpers::start_test;
use raster_engine::types::{Cycle, SimResult};
use raster_models::command_processor::{CommandProcessor, CommandStep};
use raster_models::config::RasterizerConfig;
use raster_models::fragment_sink::FragmentSink;
use raster_models::rasterizer::Rasterizer;
use raster_models::registers::{GpuRegister, RegisterValue};
use raster_models::shader_pool::{ShaderPool, ShaderPoolConfig};
use raster_models::triangle_source::{TriangleSource, random_triangles};
use raster_models::types::{CommandKind, RasterizerCommand, RasterizerState};

pub struct Harness {
    pub engine: Engine,
    pub rasterizer: Rc<RefCell<Rasterizer>>,
    pub source: Rc<RefCell<TriangleSource>>,
    pub sink: Rc<RefCell<FragmentSink>>,
    pub processor: Rc<RefCell<CommandProcessor>>,
    pub pool: Option<Rc<RefCell<ShaderPool>>>,
}

impl Harness {
    /// Run until every command step has been played.
    pub fn run(&mut self, limit: Cycle) -> SimResult {
        let done = self.processor.clone();
        self.engine.run_until(|| done.borrow().done(), Some(limit))
    }

    pub fn states(&self) -> Vec<RasterizerState> {
        self.processor.borrow().states()
    }
}

pub struct HarnessBuilder {
    config: RasterizerConfig,
    pool: ShaderPoolConfig,
    triangles: Vec<[Vertex; 3]>,
    steps: Vec<CommandStep>,
    with_source: bool,
}

impl HarnessBuilder {
    pub fn new(config: RasterizerConfig) -> Self {
        Self {
            config,
            pool: ShaderPoolConfig::default(),
            triangles: Vec::new(),
            steps: draw_steps(),
            with_source: true,
        }
    }

    pub fn triangles(mut self, triangles: Vec<[Vertex; 3]>) -> Self {
        self.triangles = triangles;
        self
    }

    pub fn steps(mut self, steps: Vec<CommandStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn pool(mut self, pool: ShaderPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Leave the triangle requests of the rasterizer unanswered.
    pub fn without_source(mut self) -> Self {
        self.with_source = false;
        self
    }

    pub fn build(self, file: &str) -> Harness {
        let mut engine = start_test(file);
        let top = engine.top().clone();
        let (rasterizer, io) = Rasterizer::new(&top, "rasterizer", &self.config).unwrap();

        let mut source =
            TriangleSource::new(&top, io.triangle_request_rx, io.triangle_tx, self.triangles);
        if self.config.pre_triangle_bound {
            source = source.with_binding(rasterizer.emulator());
        }
        let source = Rc::new(RefCell::new(source));
        let sink = Rc::new(RefCell::new(FragmentSink::new(&top, io.fragment_rx).keep_stamps()));
        let processor = Rc::new(RefCell::new(CommandProcessor::new(
            &top,
            io.command_tx,
            io.state_rx,
            self.steps,
        )));
        let pool = io.shader.map(|ports| {
            Rc::new(RefCell::new(ShaderPool::new(&top, self.pool, ports).unwrap()))
        });

        let rasterizer = Rc::new(RefCell::new(rasterizer));
        engine.register(rasterizer.clone());
        if self.with_source {
            engine.register(source.clone());
        }
        if let Some(pool) = &pool {
            engine.register(pool.clone());
        }
        engine.register(sink.clone());
        engine.register(processor.clone());

        Harness {
            engine,
            rasterizer,
            source,
            sink,
            processor,
            pool,
        }
    }
}

pub fn send(kind: CommandKind) -> CommandStep {
    CommandStep::Send(RasterizerCommand::new(kind))
}

pub fn write(register: GpuRegister, subreg: u32, value: RegisterValue) -> CommandStep {
    CommandStep::Send(RasterizerCommand::reg_write(register, subreg, value))
}

/// The steps of a draw once the rasterizer is ready.
pub fn draw() -> Vec<CommandStep> {
    vec![
        send(CommandKind::Draw),
        CommandStep::WaitFor(RasterizerState::End),
        send(CommandKind::End),
        CommandStep::WaitFor(RasterizerState::Ready),
    ]
}

/// Reset followed by a draw.
pub fn draw_steps() -> Vec<CommandStep> {
    let mut steps = vec![send(CommandKind::Reset)];
    steps.extend(draw());
    steps
}

pub fn scene(count: usize, seed: u64) -> Vec<[Vertex; 3]> {
    random_triangles(count, seed, 0.3)
}
