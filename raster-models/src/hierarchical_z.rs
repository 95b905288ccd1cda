// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Hierarchical Z.
//!
//! A contract model of the early depth test. Stamps from Traversal are
//! queued and forwarded to the Fragment FIFO while it is ready. The
//! Hierarchical Z buffer itself is not modelled, only the time it takes to
//! clear it.
//!
//! Traversal is told every cycle whether there is room for the stamps that
//! may already be on their way.

use std::rc::Rc;

use raster_components::admission::AdmissionFifo;
use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::config::HierarchicalZConfig;
use crate::registers::{CompareMode, GpuRegister, RegisterValue};
use crate::stage::{
    Stage, StagePorts, check_command, prime_state, unexpected_command, unsupported_command,
};
use crate::statistics::{CommandStatistics, StampStatistics};
use crate::types::{
    CommandKind, FlowState, FlowStateInfo, RasterizerCommand, RasterizerState,
    RasterizerStateInfo, Stamp,
};

pub struct HierarchicalZPorts {
    pub stage: StagePorts,
    pub stamp_rx: InSignal<Stamp>,
    pub state_tx: OutSignal<FlowStateInfo>,
    pub stamp_tx: OutSignal<Stamp>,
    pub ffifo_state_rx: InSignal<FlowStateInfo>,
}

#[derive(Clone, Debug, PartialEq)]
struct HierarchicalZRegisters {
    h_res: u32,
    v_res: u32,
    viewport: (i32, i32, u32, u32),
    scissor_test: bool,
    scissor: (i32, i32, u32, u32),
    z_bits: u32,
    z_clear: u32,
    enabled: bool,
    modify_depth: bool,
    depth_function: CompareMode,
    multisampling: bool,
    msaa_samples: u32,
}

impl Default for HierarchicalZRegisters {
    fn default() -> Self {
        Self {
            h_res: 400,
            v_res: 400,
            viewport: (0, 0, 400, 400),
            scissor_test: false,
            scissor: (0, 0, 400, 400),
            z_bits: 24,
            z_clear: 0x00ff_ffff,
            enabled: true,
            modify_depth: false,
            depth_function: CompareMode::Less,
            multisampling: false,
            msaa_samples: 2,
        }
    }
}

impl HierarchicalZRegisters {
    fn write(&mut self, register: GpuRegister, value: &RegisterValue) -> Result<(), String> {
        use GpuRegister as R;
        match register {
            R::DisplayXRes => self.h_res = value.to_u32(register)?,
            R::DisplayYRes => self.v_res = value.to_u32(register)?,
            R::ViewportIniX => self.viewport.0 = value.to_i32(register)?,
            R::ViewportIniY => self.viewport.1 = value.to_i32(register)?,
            R::ViewportWidth => self.viewport.2 = value.to_u32(register)?,
            R::ViewportHeight => self.viewport.3 = value.to_u32(register)?,
            R::ScissorTest => self.scissor_test = value.to_bool(register)?,
            R::ScissorIniX => self.scissor.0 = value.to_i32(register)?,
            R::ScissorIniY => self.scissor.1 = value.to_i32(register)?,
            R::ScissorWidth => self.scissor.2 = value.to_u32(register)?,
            R::ScissorHeight => self.scissor.3 = value.to_u32(register)?,
            R::ZBufferBitPrecision => self.z_bits = value.to_u32(register)?,
            R::ZBufferClear => self.z_clear = value.to_u32(register)?,
            R::HierarchicalZ => self.enabled = value.to_bool(register)?,
            R::ModifyFragmentDepth => self.modify_depth = value.to_bool(register)?,
            R::DepthFunction => self.depth_function = value.to_compare(register)?,
            R::Multisampling => self.multisampling = value.to_bool(register)?,
            R::MsaaSamples => self.msaa_samples = value.to_u32(register)?,
            _ => return Err(format!("unsupported register {register}")),
        }
        Ok(())
    }
}

pub struct HierarchicalZ {
    pub entity: Rc<Entity>,
    config: HierarchicalZConfig,
    stage: StagePorts,
    stamp_rx: InSignal<Stamp>,
    state_tx: OutSignal<FlowStateInfo>,
    stamp_tx: OutSignal<Stamp>,
    ffifo_state_rx: InSignal<FlowStateInfo>,

    state: RasterizerState,
    registers: HierarchicalZRegisters,
    queue: AdmissionFifo<Stamp>,
    ffifo_state: FlowState,
    clear_wait: Cycle,

    stats: StampStatistics,
    commands: CommandStatistics,
}

impl HierarchicalZ {
    pub fn new(
        parent: &Rc<Entity>,
        config: HierarchicalZConfig,
        ports: HierarchicalZPorts,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "hz"));
        config.validate(&entity)?;
        let queue = AdmissionFifo::new(&entity, "stamp_queue", config.queue_size)?;
        prime_state(&ports.state_tx, FlowStateInfo::new(FlowState::Ready));

        Ok(Self {
            entity,
            config,
            stage: ports.stage,
            stamp_rx: ports.stamp_rx,
            state_tx: ports.state_tx,
            stamp_tx: ports.stamp_tx,
            ffifo_state_rx: ports.ffifo_state_rx,
            state: RasterizerState::Reset,
            registers: HierarchicalZRegisters::default(),
            queue,
            ffifo_state: FlowState::Ready,
            clear_wait: 0,
            stats: StampStatistics::default(),
            commands: CommandStatistics::default(),
        })
    }

    #[must_use]
    pub fn statistics(&self) -> &StampStatistics {
        &self.stats
    }

    /// Cycles needed to clear the Hierarchical Z buffer at the current
    /// resolution.
    #[must_use]
    pub fn clear_cycles(&self) -> Cycle {
        let pixels = u64::from(self.registers.h_res) * u64::from(self.registers.v_res);
        let blocks = pixels.div_ceil(4 * u64::from(self.config.block_stamps));
        blocks.div_ceil(u64::from(self.config.clear_blocks_cycle))
    }

    fn process_command(&mut self, command: RasterizerCommand) -> SimResult {
        self.commands.record(&command.kind);
        match (&command.kind, self.state) {
            (CommandKind::ClearZStencilBuffer, RasterizerState::Ready) => {}
            (CommandKind::ClearZStencilBuffer, state) => {
                return unexpected_command(&self.entity, &command.kind, state);
            }
            (CommandKind::End, RasterizerState::ClearEnd) => {}
            (kind, state) => check_command(&self.entity, kind, state)?,
        }
        debug!(self.entity ; "{command} in {} state", self.state);

        match &command.kind {
            CommandKind::Reset => {
                self.registers = HierarchicalZRegisters::default();
                self.queue.reset();
                self.clear_wait = 0;
                self.state = RasterizerState::Ready;
            }
            CommandKind::Draw => {
                self.queue.reset();
                debug!(self.entity ; "draw with HZ {}, early test {:?}, {} bit depth, msaa {} ({} samples)",
                    if self.registers.enabled { "enabled" } else { "disabled" },
                    self.registers.depth_function,
                    self.registers.z_bits,
                    self.registers.multisampling,
                    self.registers.msaa_samples);
                self.state = RasterizerState::Drawing;
            }
            CommandKind::End => {
                self.state = RasterizerState::Ready;
            }
            CommandKind::ClearZStencilBuffer => {
                self.clear_wait = self.clear_cycles();
                debug!(self.entity ; "clear to {:#x} in {} cycles", self.registers.z_clear, self.clear_wait);
                self.state = RasterizerState::Clear;
            }
            CommandKind::RegWrite {
                register, value, ..
            } => {
                if let Err(msg) = self.registers.write(*register, value) {
                    return sim_fatal!(self.entity, "process_register_write" ; "{msg}");
                }
                trace!(self.entity ; "viewport {:?}, scissor {} {:?}, modify depth {}",
                    self.registers.viewport, self.registers.scissor_test,
                    self.registers.scissor, self.registers.modify_depth);
            }
            CommandKind::RegRead { .. } => {
                return unsupported_command(&self.entity, &command.kind);
            }
        }
        Ok(())
    }

    fn receive_stamps(&mut self, cycle: Cycle) -> SimResult {
        while let Some(stamp) = self.stamp_rx.read(cycle) {
            if self.state != RasterizerState::Drawing {
                return sim_fatal!(self.entity, "receive_stamps" ; "{stamp} received in {:?} state", self.state);
            }
            self.queue.push_unreserved(stamp)?;
            self.stats.stamps_in += 1;
        }
        Ok(())
    }

    fn send_stamps(&mut self, cycle: Cycle) -> SimResult {
        if self.ffifo_state != FlowState::Ready {
            return Ok(());
        }
        for _ in 0..self.config.stamps_cycle {
            let Some(stamp) = self.queue.pop() else {
                break;
            };
            let last = stamp.last;
            self.stamp_tx.write(cycle, stamp)?;
            self.stats.stamps_out += 1;
            if last {
                if !self.queue.is_empty() {
                    return sim_fatal!(self.entity, "send_stamps" ; "stamps queued after the last stamp");
                }
                debug!(self.entity ; "last stamp sent");
                self.state = RasterizerState::End;
                break;
            }
        }
        Ok(())
    }

    fn flow_state(&self) -> FlowState {
        if self.queue.free() >= self.config.margin {
            FlowState::Ready
        } else {
            FlowState::Busy
        }
    }
}

impl Clocked for HierarchicalZ {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        let Some(ffifo_state) = self.ffifo_state_rx.read(cycle) else {
            return sim_fatal!(self.entity, "clock" ; "Missing state signal from the Fragment FIFO");
        };
        self.ffifo_state = ffifo_state.state;

        if let Some(command) = self.stage.command_rx.read(cycle) {
            self.process_command(command)?;
        }

        self.receive_stamps(cycle)?;
        match self.state {
            RasterizerState::Drawing => self.send_stamps(cycle)?,
            RasterizerState::Clear => {
                self.stats.clear_cycles += 1;
                self.clear_wait = self.clear_wait.saturating_sub(1);
                if self.clear_wait == 0 {
                    debug!(self.entity ; "clear done");
                    self.state = RasterizerState::ClearEnd;
                }
            }
            _ => {}
        }

        let flow = self.flow_state();
        if flow == FlowState::Busy {
            self.stats.busy_cycles += 1;
        }
        self.state_tx.write(cycle, FlowStateInfo::new(flow))?;
        self.stage
            .state_tx
            .write(cycle, RasterizerStateInfo::new(self.state))
    }
}

impl Stage for HierarchicalZ {
    fn state(&self) -> RasterizerState {
        self.state
    }

    fn state_report(&self) -> String {
        format!(
            "{} | stamp queue {}/{} | FFIFO {:?} | stamps in {} out {}",
            self.state,
            self.queue.len(),
            self.queue.capacity(),
            self.ffifo_state,
            self.stats.stamps_in,
            self.stats.stamps_out
        )
    }

    fn progress(&self) -> u64 {
        self.stats.stamps_in + self.stats.stamps_out + self.stats.clear_cycles
    }

    fn command_statistics(&self) -> &CommandStatistics {
        &self.commands
    }
}
