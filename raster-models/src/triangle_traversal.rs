// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Triangle Traversal.
//!
//! Traversal requests setup triangles from Setup, groups them into batches and
//! generates the stamps covering them. Stamps are sent to Hierarchical Z
//! while it reports itself as ready.
//!
//! In recursive mode up to `batch_size` triangles are traversed together in
//! tiled order. In scanline mode every batch holds a single triangle.
//!
//! When multisampling is enabled the samples of a stamp take
//! `ceil(msaa_samples / samples_cycle)` cycles to generate and no new stamps
//! are started until they are done.
//!
//! # Ports
//!
//!  - `command_rx` / `state_tx`: protocol with the rasterizer.
//!  - `setup_request_tx` / `setup_rx`: requests to and triangles from Setup.
//!  - `stamp_tx`: stamps to Hierarchical Z.
//!  - `hz_state_rx`: the early test state of Hierarchical Z, read every cycle.

use std::cell::RefCell;
use std::rc::Rc;

use raster_components::admission::AdmissionFifo;
use raster_emulator::emulator::RasterizerEmulator;
use raster_emulator::pixel_mapper::PixelMapper;
use raster_emulator::types::{BatchId, GeneratedStamp, SetupId};
use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::config::{RasterizationStrategy, TraversalConfig};
use crate::registers::{GpuRegister, RegisterValue};
use crate::stage::{Stage, StagePorts, check_command, unsupported_command};
use crate::statistics::{CommandStatistics, TraversalStatistics};
use crate::types::{
    CommandKind, Cookies, FlowState, FlowStateInfo, RasterizerCommand, RasterizerState,
    RasterizerStateInfo, Stamp, TriangleSetupOutput, TriangleSetupRequest,
};

pub struct TraversalPorts {
    pub stage: StagePorts,
    pub setup_request_tx: OutSignal<TriangleSetupRequest>,
    pub setup_rx: InSignal<TriangleSetupOutput>,
    pub stamp_tx: OutSignal<Stamp>,
    pub hz_state_rx: InSignal<FlowStateInfo>,
}

#[derive(Clone, Debug, PartialEq)]
struct TraversalRegisters {
    h_res: u32,
    v_res: u32,
    viewport: (i32, i32, u32, u32),
    multisampling: bool,
    msaa_samples: u32,
}

impl Default for TraversalRegisters {
    fn default() -> Self {
        Self {
            h_res: 400,
            v_res: 400,
            viewport: (0, 0, 400, 400),
            multisampling: false,
            msaa_samples: 2,
        }
    }
}

impl TraversalRegisters {
    fn write(&mut self, register: GpuRegister, value: &RegisterValue) -> Result<(), String> {
        use GpuRegister as R;
        match register {
            R::DisplayXRes => self.h_res = value.to_u32(register)?,
            R::DisplayYRes => self.v_res = value.to_u32(register)?,
            R::ViewportIniX => self.viewport.0 = value.to_i32(register)?,
            R::ViewportIniY => self.viewport.1 = value.to_i32(register)?,
            R::ViewportWidth => self.viewport.2 = value.to_u32(register)?,
            R::ViewportHeight => self.viewport.3 = value.to_u32(register)?,
            R::Multisampling => self.multisampling = value.to_bool(register)?,
            R::MsaaSamples => self.msaa_samples = value.to_u32(register)?,
            _ => return Err(format!("unsupported register {register}")),
        }
        Ok(())
    }

    /// Samples generated per fragment.
    fn samples(&self) -> u32 {
        if self.multisampling {
            self.msaa_samples
        } else {
            1
        }
    }
}

/// The triangles at the front of the queue that are being traversed.
#[derive(Clone, Copy, Debug)]
enum Batch {
    Recursive { id: BatchId, triangles: usize },
    Scanline { id: SetupId },
}

impl Batch {
    fn triangles(&self) -> usize {
        match self {
            Batch::Recursive { triangles, .. } => *triangles,
            Batch::Scanline { .. } => 1,
        }
    }
}

pub struct TriangleTraversal {
    pub entity: Rc<Entity>,
    config: TraversalConfig,
    stage: StagePorts,
    setup_request_tx: OutSignal<TriangleSetupRequest>,
    setup_rx: InSignal<TriangleSetupOutput>,
    stamp_tx: OutSignal<Stamp>,
    hz_state_rx: InSignal<FlowStateInfo>,
    emulator: Rc<RefCell<RasterizerEmulator>>,
    mapper: PixelMapper,

    state: RasterizerState,
    registers: TraversalRegisters,
    queue: AdmissionFifo<TriangleSetupOutput>,
    batch: Option<Batch>,
    last_received: bool,
    traversal_finished: bool,
    hz_state: FlowState,
    msaa_cycles: Cycle,
    msaa_wait: Cycle,
    cookies: Cookies,

    stats: TraversalStatistics,
    commands: CommandStatistics,
}

impl TriangleTraversal {
    pub fn new(
        parent: &Rc<Entity>,
        config: TraversalConfig,
        ports: TraversalPorts,
        emulator: Rc<RefCell<RasterizerEmulator>>,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "traversal"));
        config.validate(&entity)?;
        let Ok(units) = u32::try_from(config.num_stamp_units) else {
            return sim_fatal!(entity, "new" ; "too many stamp units ({})", config.num_stamp_units);
        };
        let mapper = PixelMapper::new(&entity, units)?;
        let queue = AdmissionFifo::new(&entity, "triangle_queue", config.queue_size)?;

        Ok(Self {
            entity,
            config,
            stage: ports.stage,
            setup_request_tx: ports.setup_request_tx,
            setup_rx: ports.setup_rx,
            stamp_tx: ports.stamp_tx,
            hz_state_rx: ports.hz_state_rx,
            emulator,
            mapper,
            state: RasterizerState::Reset,
            registers: TraversalRegisters::default(),
            queue,
            batch: None,
            last_received: false,
            traversal_finished: false,
            hz_state: FlowState::Ready,
            msaa_cycles: 1,
            msaa_wait: 0,
            cookies: Cookies::new(),
            stats: TraversalStatistics::default(),
            commands: CommandStatistics::default(),
        })
    }

    #[must_use]
    pub fn statistics(&self) -> &TraversalStatistics {
        &self.stats
    }

    /// Triangles in the queue and entries reserved for requested triangles.
    #[must_use]
    pub fn queue_occupancy(&self) -> (usize, usize) {
        (self.queue.len(), self.queue.reserved())
    }

    /// Cycles needed to generate all the samples of a stamp.
    #[must_use]
    pub fn msaa_cycles(&self) -> Cycle {
        self.msaa_cycles
    }

    fn process_command(&mut self, command: RasterizerCommand) -> SimResult {
        self.commands.record(&command.kind);
        check_command(&self.entity, &command.kind, self.state)?;
        debug!(self.entity ; "{command} in {} state", self.state);

        match &command.kind {
            CommandKind::Reset => {
                self.registers = TraversalRegisters::default();
                self.reset_draw();
                self.state = RasterizerState::Ready;
            }
            CommandKind::Draw => {
                self.start_draw()?;
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
        self.queue.reset();
        self.batch = None;
        self.last_received = false;
        self.traversal_finished = false;
        self.msaa_wait = 0;
    }

    fn start_draw(&mut self) -> SimResult {
        self.reset_draw();
        let samples = self.registers.samples();
        self.mapper.setup_display(
            self.registers.h_res,
            self.registers.v_res,
            &self.config.layout,
            samples,
        )?;
        self.msaa_cycles = Cycle::from(samples.div_ceil(self.config.samples_cycle));
        debug!(self.entity ; "draw to viewport {:?} with {samples} samples", self.registers.viewport);
        Ok(())
    }

    /// Ask Setup for more triangles while the queue has space for them.
    fn request_triangles(&mut self, cycle: Cycle) -> SimResult {
        if self.last_received || self.queue.free() < self.config.triangles_cycle {
            return Ok(());
        }
        let count = self.config.triangles_cycle;
        self.setup_request_tx.write(
            cycle,
            TriangleSetupRequest {
                count,
                cookies: self.cookies.derive(&self.entity, "request"),
            },
        )?;
        self.queue.reserve(count)?;
        self.stats.requests += count as u64;
        Ok(())
    }

    fn receive_triangles(&mut self, cycle: Cycle) -> SimResult {
        while let Some(triangle) = self.setup_rx.read(cycle) {
            trace!(self.entity ; "received {triangle}");
            if self.last_received {
                return sim_fatal!(self.entity, "receive_triangles" ;
                    "{triangle} received after last triangle mark");
            }
            self.last_received = triangle.last;
            self.queue.push(triangle)?;
            self.stats.inputs += 1;
        }
        Ok(())
    }

    /// Start traversing the next batch once enough triangles have been
    /// queued, or the queue holds the last triangle.
    fn batch_triangles(&mut self) -> SimResult {
        if self.batch.is_some() || self.traversal_finished {
            return Ok(());
        }

        let limit = self.config.batch_size.min(self.queue.len());
        let data = self
            .queue
            .iter()
            .take(limit)
            .take_while(|triangle| !triangle.last)
            .count();
        let reached_last = self.queue.get(data).is_some_and(|triangle| triangle.last);
        if data == 0 || (data < self.config.batch_size && !reached_last) {
            return Ok(());
        }

        let samples = self.registers.samples();
        let mut emulator = self.emulator.borrow_mut();
        let batch = match self.config.strategy {
            RasterizationStrategy::Recursive => {
                let ids: Vec<SetupId> = self.queue.iter().take(data).map(|t| t.setup_id).collect();
                Batch::Recursive {
                    id: emulator.start_recursive_multi(&ids, samples)?,
                    triangles: data,
                }
            }
            RasterizationStrategy::Scanline => {
                let Some(triangle) = self.queue.front() else {
                    return Ok(());
                };
                emulator.start_position(triangle.setup_id, samples)?;
                Batch::Scanline {
                    id: triangle.setup_id,
                }
            }
        };
        debug!(self.entity ; "start batch of {} triangles", batch.triangles());
        self.batch = Some(batch);
        self.stats.batches += 1;
        Ok(())
    }

    fn next_stamp(&mut self, batch: Batch) -> Result<GeneratedStamp, SimError> {
        let mut emulator = self.emulator.borrow_mut();
        match batch {
            Batch::Recursive { id, .. } => emulator.next_stamp_recursive_multi(id),
            Batch::Scanline { id } => emulator.next_scanline_stamp_tiled(id),
        }
    }

    /// Free the triangles of a batch that has generated all its stamps.
    fn finish_batch(&mut self, batch: Batch) -> SimResult {
        for _ in 0..batch.triangles() {
            if let Some(triangle) = self.queue.pop() {
                self.emulator.borrow_mut().destroy_triangle(triangle.setup_id)?;
            }
        }
        self.batch = None;
        Ok(())
    }

    fn send_last_stamp(&mut self, cycle: Cycle) -> SimResult {
        let Some(triangle) = self.queue.pop() else {
            return sim_fatal!(self.entity, "send_last_stamp" ; "no last triangle queued");
        };
        let stamp = Stamp::sentinel(triangle.cookies.derive(&self.entity, "stamp"));
        self.stamp_tx.write(cycle, stamp)?;
        self.stats.stamps += 1;
        self.traversal_finished = true;
        self.state = RasterizerState::End;
        debug!(self.entity ; "last stamp sent");
        Ok(())
    }

    fn generate_stamps(&mut self, cycle: Cycle) -> SimResult {
        if self.msaa_wait > 0 {
            self.msaa_wait -= 1;
        }
        if self.hz_state != FlowState::Ready || self.traversal_finished {
            return Ok(());
        }
        if self.msaa_wait > 0 {
            self.stats.msaa_stall_cycles += 1;
            return Ok(());
        }

        let mut generated = false;
        for _ in 0..self.config.stamps_cycle {
            if self.batch.is_none() && self.queue.front().is_some_and(|t| t.last) {
                self.send_last_stamp(cycle)?;
                break;
            }
            let Some(batch) = self.batch else {
                break;
            };

            let generated_stamp = self.next_stamp(batch)?;
            let Some(triangle) = self.queue.get(generated_stamp.batch_index) else {
                return sim_fatal!(self.entity, "generate_stamps" ;
                    "stamp for batch entry {} outside the queue", generated_stamp.batch_index);
            };
            let origin = generated_stamp.fragments[0];
            let stamp = Stamp {
                triangle_id: triangle.triangle_id,
                setup_id: triangle.setup_id,
                fragments: generated_stamp.fragments,
                tile: self.emulator.borrow().calculate_tile_id(origin.x, origin.y),
                unit: self.mapper.map_to_unit(origin.x, origin.y),
                last: false,
                cookies: triangle.cookies.derive(&self.entity, "stamp"),
            };
            self.stats.stamps += 1;
            self.stats.fragments += stamp.fragments.len() as u64;
            self.stats.covered += stamp.covered() as u64;
            trace!(self.entity ; "generated {stamp}");
            self.stamp_tx.write(cycle, stamp)?;
            generated = true;

            // The next batch starts on the following cycle
            if generated_stamp.last_fragment {
                self.finish_batch(batch)?;
                break;
            }
        }

        if generated && self.registers.multisampling {
            self.msaa_wait = self.msaa_cycles;
        }
        Ok(())
    }
}

impl Clocked for TriangleTraversal {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        let Some(hz_state) = self.hz_state_rx.read(cycle) else {
            return sim_fatal!(self.entity, "clock" ;
                "Missing state signal from the Hierarchical Z box");
        };
        self.hz_state = hz_state.state;

        if let Some(command) = self.stage.command_rx.read(cycle) {
            self.process_command(command)?;
        }

        if self.state == RasterizerState::Drawing {
            self.receive_triangles(cycle)?;
            self.request_triangles(cycle)?;
            self.batch_triangles()?;
            self.generate_stamps(cycle)?;
        }

        self.stage
            .state_tx
            .write(cycle, RasterizerStateInfo::new(self.state))
    }
}

impl Stage for TriangleTraversal {
    fn state(&self) -> RasterizerState {
        self.state
    }

    fn state_report(&self) -> String {
        let batch = match self.batch {
            Some(batch) => format!("{} triangles", batch.triangles()),
            None => "none".to_string(),
        };
        format!(
            "{} | triangle queue {} ({} reserved) | batch {batch} | stamps {} | HZ {:?}",
            self.state,
            self.queue.len(),
            self.queue.reserved(),
            self.stats.stamps,
            self.hz_state
        )
    }

    fn progress(&self) -> u64 {
        self.stats.inputs + self.stats.stamps
    }

    fn command_statistics(&self) -> &CommandStatistics {
        &self.commands
    }
}
