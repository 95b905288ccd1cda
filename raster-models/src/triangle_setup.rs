// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Triangle Setup.
//!
//! Setup requests triangles from the upstream producer, computes their setup
//! (edge equations and area) and face culling, and sends the surviving
//! triangles to Traversal in order when Traversal asks for them.
//!
//! Space for requested triangles is reserved in the setup FIFO when the
//! request is made, because the triangles arrive some cycles later. The
//! reservation is used when the triangle enters the FIFO or released when it
//! is culled.
//!
//! The setup computation is either done by dedicated units with a fixed
//! latency, or on the shader pool. The shader pool can complete triangles in
//! any order so they are held in a [ReorderRing] and committed in the order
//! they arrived.
//!
//! # Ports
//!
//!  - `command_rx` / `state_tx`: protocol with the rasterizer.
//!  - `input_request_tx` / `input_rx`: requests to and triangles from the
//!    producer.
//!  - `output_request_rx` / `output_tx`: requests from and setup triangles to
//!    Traversal.
//!  - [ShaderPorts] when setup is done on the shader pool.

use std::cell::RefCell;
use std::rc::Rc;

use raster_components::admission::AdmissionFifo;
use raster_components::reorder_ring::ReorderRing;
use raster_emulator::emulator::RasterizerEmulator;
use raster_emulator::types::{EdgeEquations, FaceMode, SetupId};
use raster_engine::signal::{InSignal, OutSignal, signal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::config::SetupConfig;
use crate::registers::{CullMode, GpuRegister, RegisterValue};
use crate::stage::{Stage, StagePorts, check_command, unsupported_command};
use crate::statistics::{CommandStatistics, SetupStatistics, size_bucket};
use crate::types::{
    CommandKind, Cookies, FlowState, FlowStateInfo, PrimitiveAssemblyRequest, RasterizerCommand,
    RasterizerState, RasterizerStateInfo, ShaderInput, ShaderOutput, TriangleSetupInput,
    TriangleSetupOutput, TriangleSetupRequest,
};

/// Signals to and from the shader pool.
pub struct ShaderPorts {
    pub input_tx: OutSignal<ShaderInput>,
    pub output_rx: InSignal<ShaderOutput>,
    pub state_rx: InSignal<FlowStateInfo>,
}

pub struct SetupPorts {
    pub stage: StagePorts,
    pub input_request_tx: OutSignal<PrimitiveAssemblyRequest>,
    pub input_rx: InSignal<TriangleSetupInput>,
    pub output_request_rx: InSignal<TriangleSetupRequest>,
    pub output_tx: OutSignal<TriangleSetupOutput>,
    pub shader: Option<ShaderPorts>,
}

/// Register values used by Setup.
#[derive(Clone, Debug, PartialEq)]
struct SetupRegisters {
    h_res: u32,
    v_res: u32,
    d3d9_pixel_coordinates: bool,
    viewport: (i32, i32, u32, u32),
    scissor_test: bool,
    scissor: (i32, i32, u32, u32),
    near: f32,
    far: f32,
    d3d9_depth_range: bool,
    slope_factor: f32,
    unit_offset: f32,
    z_bits: u32,
    face_mode: FaceMode,
    cull_mode: CullMode,
    d3d9_rasterization_rules: bool,
    two_sided_lighting: bool,
}

impl Default for SetupRegisters {
    fn default() -> Self {
        Self {
            h_res: 400,
            v_res: 400,
            d3d9_pixel_coordinates: false,
            viewport: (0, 0, 400, 400),
            scissor_test: false,
            scissor: (0, 0, 400, 400),
            near: 0.0,
            far: 1.0,
            d3d9_depth_range: false,
            slope_factor: 0.0,
            unit_offset: 0.0,
            z_bits: 24,
            face_mode: FaceMode::Ccw,
            cull_mode: CullMode::None,
            d3d9_rasterization_rules: false,
            two_sided_lighting: false,
        }
    }
}

impl SetupRegisters {
    fn write(&mut self, register: GpuRegister, value: &RegisterValue) -> Result<(), String> {
        use GpuRegister as R;
        match register {
            R::DisplayXRes => self.h_res = value.to_u32(register)?,
            R::DisplayYRes => self.v_res = value.to_u32(register)?,
            R::D3d9PixelCoordinates => self.d3d9_pixel_coordinates = value.to_bool(register)?,
            R::ViewportIniX => self.viewport.0 = value.to_i32(register)?,
            R::ViewportIniY => self.viewport.1 = value.to_i32(register)?,
            R::ViewportWidth => self.viewport.2 = value.to_u32(register)?,
            R::ViewportHeight => self.viewport.3 = value.to_u32(register)?,
            R::ScissorTest => self.scissor_test = value.to_bool(register)?,
            R::ScissorIniX => self.scissor.0 = value.to_i32(register)?,
            R::ScissorIniY => self.scissor.1 = value.to_i32(register)?,
            R::ScissorWidth => self.scissor.2 = value.to_u32(register)?,
            R::ScissorHeight => self.scissor.3 = value.to_u32(register)?,
            R::DepthRangeNear => self.near = value.to_f32(register)?,
            R::DepthRangeFar => self.far = value.to_f32(register)?,
            R::D3d9DepthRange => self.d3d9_depth_range = value.to_bool(register)?,
            R::DepthSlopeFactor => self.slope_factor = value.to_f32(register)?,
            R::DepthUnitOffset => self.unit_offset = value.to_f32(register)?,
            R::ZBufferBitPrecision => self.z_bits = value.to_u32(register)?,
            R::FaceMode => self.face_mode = value.to_face(register)?,
            R::Culling => self.cull_mode = value.to_cull(register)?,
            R::D3d9RasterizationRules => {
                self.d3d9_rasterization_rules = value.to_bool(register)?;
            }
            R::TwoSidedLighting => self.two_sided_lighting = value.to_bool(register)?,
            _ => return Err(format!("unsupported register {register}")),
        }
        Ok(())
    }

    /// Configure the emulator for a draw.
    fn apply(&self, emulator: &mut RasterizerEmulator) {
        let (x, y, w, h) = self.viewport;
        emulator.set_viewport(self.d3d9_pixel_coordinates, x, y, w, h);
        let (sx, sy, sw, sh) = self.scissor;
        emulator.set_scissor(self.h_res, self.v_res, self.scissor_test, sx, sy, sw, sh);
        emulator.set_depth_range(self.d3d9_depth_range, self.near, self.far);
        emulator.set_polygon_offset(self.slope_factor, self.unit_offset);
        emulator.set_face_mode(self.face_mode);
        emulator.set_d3d9_rasterization_rules(self.d3d9_rasterization_rules);
        emulator.set_depth_precision(self.z_bits);
    }
}

/// A triangle waiting for, or returned from, the shader pool.
#[derive(Debug)]
struct ShaderSlot {
    input: TriangleSetupInput,
    edges: EdgeEquations,
    area: f64,
}

enum SetupUnits {
    Dedicated {
        start_tx: OutSignal<TriangleSetupInput>,
        end_rx: InSignal<TriangleSetupInput>,
    },
    Shader {
        ports: ShaderPorts,
        ring: ReorderRing<ShaderSlot>,
        shader_state: FlowState,
    },
}

pub struct TriangleSetup {
    pub entity: Rc<Entity>,
    config: SetupConfig,
    stage: StagePorts,
    input_request_tx: OutSignal<PrimitiveAssemblyRequest>,
    input_rx: InSignal<TriangleSetupInput>,
    output_request_rx: InSignal<TriangleSetupRequest>,
    output_tx: OutSignal<TriangleSetupOutput>,
    units: SetupUnits,
    emulator: Rc<RefCell<RasterizerEmulator>>,

    state: RasterizerState,
    registers: SetupRegisters,
    fifo: AdmissionFifo<TriangleSetupOutput>,
    triangles_requested: usize,
    last_triangle: bool,
    setup_wait: Cycle,
    cookies: Cookies,

    stats: SetupStatistics,
    commands: CommandStatistics,
}

impl TriangleSetup {
    pub fn new(
        parent: &Rc<Entity>,
        config: SetupConfig,
        ports: SetupPorts,
        emulator: Rc<RefCell<RasterizerEmulator>>,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "setup"));
        config.validate(&entity)?;

        let units = match (config.shader_setup, ports.shader) {
            (true, Some(shader)) => SetupUnits::Shader {
                ports: shader,
                ring: ReorderRing::new(&entity, "shader_queue", config.shader_queue_size)?,
                shader_state: FlowState::Ready,
            },
            (false, None) => {
                let (start_tx, end_rx) =
                    signal(&entity, "setup_unit", config.setup_units, config.setup_latency);
                SetupUnits::Dedicated { start_tx, end_rx }
            }
            (true, None) => {
                return sim_fatal!(entity, "new" ; "shader setup requires shader ports");
            }
            (false, Some(_)) => {
                return sim_fatal!(entity, "new" ; "shader ports given without shader setup");
            }
        };

        let fifo = AdmissionFifo::new(&entity, "fifo", config.fifo_size)?;
        Ok(Self {
            entity,
            config,
            stage: ports.stage,
            input_request_tx: ports.input_request_tx,
            input_rx: ports.input_rx,
            output_request_rx: ports.output_request_rx,
            output_tx: ports.output_tx,
            units,
            emulator,
            state: RasterizerState::Reset,
            registers: SetupRegisters::default(),
            fifo,
            triangles_requested: 0,
            last_triangle: false,
            setup_wait: 0,
            cookies: Cookies::new(),
            stats: SetupStatistics::default(),
            commands: CommandStatistics::default(),
        })
    }

    #[must_use]
    pub fn statistics(&self) -> &SetupStatistics {
        &self.stats
    }

    /// Triangles in the setup FIFO and entries reserved for triangles that
    /// have been requested.
    #[must_use]
    pub fn fifo_occupancy(&self) -> (usize, usize) {
        (self.fifo.len(), self.fifo.reserved())
    }

    /// Triangles held in the shader reorder ring and entries reserved in it.
    #[must_use]
    pub fn ring_occupancy(&self) -> Option<(usize, usize)> {
        match &self.units {
            SetupUnits::Shader { ring, .. } => Some((ring.occupied(), ring.reserved())),
            SetupUnits::Dedicated { .. } => None,
        }
    }

    fn process_command(&mut self, command: RasterizerCommand) -> SimResult {
        self.commands.record(&command.kind);
        check_command(&self.entity, &command.kind, self.state)?;
        debug!(self.entity ; "{command} in {} state", self.state);

        match &command.kind {
            CommandKind::Reset => {
                self.registers = SetupRegisters::default();
                self.reset_draw();
                self.state = RasterizerState::Ready;
            }
            CommandKind::Draw => {
                self.registers.apply(&mut self.emulator.borrow_mut());
                self.reset_draw();
                self.state = RasterizerState::Drawing;
            }
            CommandKind::End => {
                self.state = RasterizerState::Ready;
            }
            CommandKind::RegWrite {
                register, value, ..
            } => {
                if let Err(msg) = self.registers.write(*register, value) {
                    return sim_fatal!(self.entity, "process_register_write" ; "{msg}");
                }
            }
            CommandKind::RegRead { .. } | CommandKind::ClearZStencilBuffer => {
                return unsupported_command(&self.entity, &command.kind);
            }
        }
        self.cookies = command.cookies;
        Ok(())
    }

    fn reset_draw(&mut self) {
        self.fifo.reset();
        if let SetupUnits::Shader {
            ring, shader_state, ..
        } = &mut self.units
        {
            ring.reset();
            *shader_state = FlowState::Ready;
        }
        self.triangles_requested = 0;
        self.last_triangle = false;
        self.setup_wait = 0;
    }

    /// Ask the producer for as many triangles as there is space for.
    fn request_triangles(&mut self, cycle: Cycle) -> SimResult {
        if self.last_triangle {
            return Ok(());
        }
        let mut count = self.fifo.free().min(self.config.triangles_cycle);
        if let SetupUnits::Shader { ring, .. } = &self.units {
            count = count.min(ring.free());
        }
        if count == 0 {
            return Ok(());
        }

        self.input_request_tx.write(
            cycle,
            PrimitiveAssemblyRequest {
                count,
                cookies: self.cookies.derive(&self.entity, "request"),
            },
        )?;
        self.fifo.reserve(count)?;
        if let SetupUnits::Shader { ring, .. } = &mut self.units {
            ring.reserve(count)?;
        }
        self.stats.requests += count as u64;
        Ok(())
    }

    /// Accept new triangles unless the start of the previous one is still
    /// blocking.
    fn start_triangles(&mut self, cycle: Cycle) -> SimResult {
        if self.setup_wait > 0 {
            self.setup_wait -= 1;
            return Ok(());
        }

        for _ in 0..self.config.triangles_cycle {
            let Some(input) = self.input_rx.read(cycle) else {
                break;
            };
            trace!(self.entity ; "start setup of {input}");
            self.last_triangle = input.last;
            match &mut self.units {
                SetupUnits::Dedicated { start_tx, .. } => start_tx.write(cycle, input)?,
                SetupUnits::Shader { ring, .. } => {
                    ring.push_reserved(ShaderSlot {
                        input,
                        edges: EdgeEquations::default(),
                        area: 0.0,
                    })?;
                }
            }
            self.setup_wait = self.config.start_latency - 1;
            self.stats.inputs += 1;
        }
        Ok(())
    }

    /// Create the triangle in the emulator.
    fn setup_triangle(
        &self,
        input: &TriangleSetupInput,
        shaded: Option<(EdgeEquations, f64)>,
    ) -> Result<SetupId, SimError> {
        let mut emulator = self.emulator.borrow_mut();
        if self.config.pre_triangle_bound {
            let Some(id) = input.setup_id else {
                return sim_fatal!(self.entity, "setup_triangle" ; "{input} has not been bound");
            };
            match shaded {
                Some((edges, area)) => emulator.setup_edge_equations_with(id, edges, area)?,
                None => emulator.setup_edge_equations(id)?,
            }
            Ok(id)
        } else {
            match shaded {
                Some((edges, area)) => emulator.setup_with_edges(input.vertices, edges, area),
                None => emulator.setup(input.vertices),
            }
        }
    }

    fn process_dedicated(&mut self, cycle: Cycle) -> SimResult {
        loop {
            let input = match &self.units {
                SetupUnits::Dedicated { end_rx, .. } => end_rx.read(cycle),
                SetupUnits::Shader { .. } => None,
            };
            let Some(input) = input else {
                return Ok(());
            };
            if input.last {
                self.process_setup_triangle(input, SetupId::default())?;
            } else {
                let id = self.setup_triangle(&input, None)?;
                self.process_setup_triangle(input, id)?;
            }
        }
    }

    fn process_shader(&mut self, cycle: Cycle) -> SimResult {
        let SetupUnits::Shader {
            ports,
            ring,
            shader_state,
        } = &mut self.units
        else {
            return Ok(());
        };

        while let Some(info) = ports.state_rx.read(cycle) {
            *shader_state = info.state;
        }

        for _ in 0..self.config.setup_units {
            if *shader_state == FlowState::Busy {
                break;
            }
            let Some((entry, slot)) = ring.dispatch() else {
                break;
            };
            let work = ShaderInput {
                entry,
                triangle_id: slot.input.triangle_id,
                positions: slot.input.vertices.map(|v| v.position),
                last: slot.input.last,
            };
            ports.input_tx.write(cycle, work)?;
            self.stats.shader_dispatches += 1;
        }

        let mut committed = Vec::new();
        while committed.len() < self.config.triangles_cycle && ring.head_completed() {
            match ring.pop_completed() {
                Some(slot) => committed.push(slot),
                None => break,
            }
        }

        while let Some(output) = ports.output_rx.read(cycle) {
            let slot = ring.get_mut(output.entry)?;
            slot.edges = output.edges;
            slot.area = output.area;
            ring.complete(output.entry)?;
        }

        for slot in committed {
            if slot.input.last {
                self.process_setup_triangle(slot.input, SetupId::default())?;
            } else {
                let id = self.setup_triangle(&slot.input, Some((slot.edges, slot.area)))?;
                self.process_setup_triangle(slot.input, id)?;
            }
        }
        Ok(())
    }

    /// Apply face culling. Returns whether the triangle is kept.
    fn cull_face_test(&mut self, id: SetupId) -> Result<bool, SimError> {
        let mut emulator = self.emulator.borrow_mut();
        let area = emulator.triangle_area(id)?;
        if area < 0.0 {
            self.stats.back += 1;
        } else {
            self.stats.front += 1;
        }

        let keep = match self.registers.cull_mode {
            CullMode::None => {
                if area < 0.0 {
                    emulator.invert_triangle_facing(id)?;
                }
                true
            }
            CullMode::Front => {
                if area > 0.0 {
                    false
                } else {
                    emulator.invert_triangle_facing(id)?;
                    true
                }
            }
            CullMode::Back => area >= 0.0,
            CullMode::FrontAndBack => false,
        } && area != 0.0;

        if keep {
            let (_, _, width, height) = self.registers.viewport;
            let pixels = emulator.tri_screen_percent(id)? * f64::from(width) * f64::from(height);
            self.stats.sizes[size_bucket(pixels)] += 1;
            if self.registers.two_sided_lighting {
                emulator.select_two_sided_color(id)?;
            }
        }
        Ok(keep)
    }

    /// Cull a setup triangle or queue it for Traversal.
    fn process_setup_triangle(&mut self, input: TriangleSetupInput, id: SetupId) -> SimResult {
        if !input.last && !self.cull_face_test(id)? {
            trace!(self.entity ; "culled {input}");
            self.emulator.borrow_mut().destroy_triangle(id)?;
            self.fifo.release()?;
            self.stats.culled += 1;
            return Ok(());
        }

        self.fifo.push(TriangleSetupOutput {
            triangle_id: input.triangle_id,
            setup_id: id,
            last: input.last,
            cookies: input.cookies.derive(&self.entity, "setup_triangle"),
        })
    }

    /// Send requested triangles to Traversal.
    fn send_triangles(&mut self, cycle: Cycle) -> SimResult {
        let mut sent = 0;
        while sent < self.config.triangles_cycle && self.triangles_requested > 0 {
            let Some(triangle) = self.fifo.pop() else {
                break;
            };
            let last = triangle.last;
            if last && !self.fifo.is_empty() {
                return sim_fatal!(self.entity, "send_triangles" ;
                    "Setup triangles received after last triangle mark");
            }
            self.output_tx.write(cycle, triangle)?;
            self.triangles_requested -= 1;
            self.stats.outputs += 1;
            sent += 1;
            if last {
                debug!(self.entity ; "last triangle sent");
                self.state = RasterizerState::End;
                break;
            }
        }
        Ok(())
    }
}

impl Clocked for TriangleSetup {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        if let Some(command) = self.stage.command_rx.read(cycle) {
            self.process_command(command)?;
        }

        while let Some(request) = self.output_request_rx.read(cycle) {
            if self.state == RasterizerState::Drawing {
                self.triangles_requested += request.count;
            }
        }

        if self.state == RasterizerState::Drawing {
            self.request_triangles(cycle)?;
            self.start_triangles(cycle)?;
            match self.units {
                SetupUnits::Dedicated { .. } => self.process_dedicated(cycle)?,
                SetupUnits::Shader { .. } => self.process_shader(cycle)?,
            }
            self.send_triangles(cycle)?;
        }

        self.stage
            .state_tx
            .write(cycle, RasterizerStateInfo::new(self.state))
    }
}

impl Stage for TriangleSetup {
    fn state(&self) -> RasterizerState {
        self.state
    }

    fn state_report(&self) -> String {
        let ring = match self.ring_occupancy() {
            Some((occupied, reserved)) => format!(" | shader queue {occupied} ({reserved} reserved)"),
            None => String::new(),
        };
        format!(
            "{} | triangles {} | setup FIFO {} ({} reserved) | requested {}{ring}",
            self.state,
            self.stats.inputs,
            self.fifo.len(),
            self.fifo.reserved(),
            self.triangles_requested
        )
    }

    fn progress(&self) -> u64 {
        self.stats.inputs + self.stats.outputs + self.stats.culled + self.stats.shader_dispatches
    }

    fn command_statistics(&self) -> &CommandStatistics {
        &self.commands
    }
}
