// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Fragment FIFO.
//!
//! Stamps are queued per stamp unit and sent to the Interpolator round-robin
//! across the units. The last stamp is held back until every unit queue has
//! drained.

use std::collections::VecDeque;
use std::rc::Rc;

use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::config::FragmentFifoConfig;
use crate::registers::{
    GpuRegister, MAX_FRAGMENT_ATTRIBUTES, MAX_RENDER_TARGETS, RegisterValue,
};
use crate::stage::{Stage, StagePorts, check_command, prime_state, unsupported_command};
use crate::statistics::{CommandStatistics, StampStatistics};
use crate::types::{
    CommandKind, FlowState, FlowStateInfo, RasterizerCommand, RasterizerState,
    RasterizerStateInfo, Stamp,
};

pub struct FragmentFifoPorts {
    pub stage: StagePorts,
    pub stamp_rx: InSignal<Stamp>,
    pub state_tx: OutSignal<FlowStateInfo>,
    pub stamp_tx: OutSignal<Stamp>,
}

#[derive(Clone, Debug, PartialEq)]
struct FragmentFifoRegisters {
    early_z: bool,
    stencil_test: bool,
    depth_test: bool,
    fragment_inputs: [bool; MAX_FRAGMENT_ATTRIBUTES as usize],
    render_targets: [bool; MAX_RENDER_TARGETS as usize],
    color_masks: [[bool; 4]; MAX_RENDER_TARGETS as usize],
}

impl Default for FragmentFifoRegisters {
    fn default() -> Self {
        let mut render_targets = [false; MAX_RENDER_TARGETS as usize];
        render_targets[0] = true;
        Self {
            early_z: true,
            stencil_test: false,
            depth_test: false,
            fragment_inputs: [false; MAX_FRAGMENT_ATTRIBUTES as usize],
            render_targets,
            color_masks: [[true; 4]; MAX_RENDER_TARGETS as usize],
        }
    }
}

impl FragmentFifoRegisters {
    fn write(
        &mut self,
        register: GpuRegister,
        subreg: u32,
        value: &RegisterValue,
    ) -> Result<(), String> {
        use GpuRegister as R;
        let index = subreg as usize;
        let out_of_range = || format!("{register} sub-register {subreg} out of range");
        match register {
            R::EarlyZ => self.early_z = value.to_bool(register)?,
            R::StencilTest => self.stencil_test = value.to_bool(register)?,
            R::DepthTest => self.depth_test = value.to_bool(register)?,
            R::FragmentInputAttributes => {
                let input = self.fragment_inputs.get_mut(index).ok_or_else(out_of_range)?;
                *input = value.to_bool(register)?;
            }
            R::RenderTargetEnable => {
                let target = self.render_targets.get_mut(index).ok_or_else(out_of_range)?;
                *target = value.to_bool(register)?;
            }
            R::ColorMaskR | R::ColorMaskG | R::ColorMaskB | R::ColorMaskA => {
                let channel = match register {
                    R::ColorMaskR => 0,
                    R::ColorMaskG => 1,
                    R::ColorMaskB => 2,
                    _ => 3,
                };
                let mask = self.color_masks.get_mut(index).ok_or_else(out_of_range)?;
                mask[channel] = value.to_bool(register)?;
            }
            _ => return Err(format!("unsupported register {register}")),
        }
        Ok(())
    }

    /// Render targets that will be written by the stamps.
    fn active_targets(&self) -> usize {
        self.render_targets
            .iter()
            .zip(self.color_masks.iter())
            .filter(|(enabled, mask)| **enabled && mask.iter().any(|m| *m))
            .count()
    }
}

pub struct FragmentFifo {
    pub entity: Rc<Entity>,
    config: FragmentFifoConfig,
    stage: StagePorts,
    stamp_rx: InSignal<Stamp>,
    state_tx: OutSignal<FlowStateInfo>,
    stamp_tx: OutSignal<Stamp>,

    state: RasterizerState,
    registers: FragmentFifoRegisters,
    queues: Vec<VecDeque<Stamp>>,
    last_stamp: Option<Stamp>,
    next_unit: usize,

    stats: StampStatistics,
    commands: CommandStatistics,
}

impl FragmentFifo {
    pub fn new(
        parent: &Rc<Entity>,
        config: FragmentFifoConfig,
        ports: FragmentFifoPorts,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "ffifo"));
        config.validate(&entity)?;
        if config.units == 0 {
            return sim_fatal!(entity, "new" ; "at least one stamp unit is required");
        }
        prime_state(&ports.state_tx, FlowStateInfo::new(FlowState::Ready));
        let queues = (0..config.units)
            .map(|_| VecDeque::with_capacity(config.queue_size))
            .collect();

        Ok(Self {
            entity,
            config,
            stage: ports.stage,
            stamp_rx: ports.stamp_rx,
            state_tx: ports.state_tx,
            stamp_tx: ports.stamp_tx,
            state: RasterizerState::Reset,
            registers: FragmentFifoRegisters::default(),
            queues,
            last_stamp: None,
            next_unit: 0,
            stats: StampStatistics::default(),
            commands: CommandStatistics::default(),
        })
    }

    #[must_use]
    pub fn statistics(&self) -> &StampStatistics {
        &self.stats
    }

    /// Stamps queued for each unit.
    #[must_use]
    pub fn occupancy(&self) -> Vec<usize> {
        self.queues.iter().map(VecDeque::len).collect()
    }

    fn process_command(&mut self, command: RasterizerCommand) -> SimResult {
        self.commands.record(&command.kind);
        check_command(&self.entity, &command.kind, self.state)?;
        debug!(self.entity ; "{command} in {} state", self.state);

        match &command.kind {
            CommandKind::Reset => {
                self.registers = FragmentFifoRegisters::default();
                self.reset_draw();
                self.state = RasterizerState::Ready;
            }
            CommandKind::Draw => {
                self.reset_draw();
                debug!(self.entity ; "draw with early z {}, depth test {}, stencil test {}, {} inputs, {} render targets",
                    self.registers.early_z,
                    self.registers.depth_test,
                    self.registers.stencil_test,
                    self.registers.fragment_inputs.iter().filter(|input| **input).count(),
                    self.registers.active_targets());
                self.state = RasterizerState::Drawing;
            }
            CommandKind::End => {
                self.state = RasterizerState::Ready;
            }
            CommandKind::RegWrite {
                register,
                subreg,
                value,
            } => {
                if let Err(msg) = self.registers.write(*register, *subreg, value) {
                    return sim_fatal!(self.entity, "process_register_write" ; "{msg}");
                }
            }
            CommandKind::RegRead { .. } | CommandKind::ClearZStencilBuffer => {
                return unsupported_command(&self.entity, &command.kind);
            }
        }
        Ok(())
    }

    fn reset_draw(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.last_stamp = None;
        self.next_unit = 0;
    }

    fn receive_stamps(&mut self, cycle: Cycle) -> SimResult {
        while let Some(stamp) = self.stamp_rx.read(cycle) {
            self.stats.stamps_in += 1;
            if self.last_stamp.is_some() {
                return sim_fatal!(self.entity, "receive_stamps" ; "{stamp} received after the last stamp");
            }
            if stamp.last {
                self.last_stamp = Some(stamp);
                continue;
            }
            let unit = stamp.unit as usize;
            let Some(queue) = self.queues.get_mut(unit) else {
                return sim_fatal!(self.entity, "receive_stamps" ;
                    "{stamp} for unit {unit} of {}", self.config.units);
            };
            if queue.len() == self.config.queue_size {
                return sim_fatal!(self.entity, "receive_stamps" ; "unit {unit} queue overflow");
            }
            queue.push_back(stamp);
        }
        Ok(())
    }

    fn send_stamps(&mut self, cycle: Cycle) -> SimResult {
        let units = self.queues.len();
        let mut sent = 0;
        let mut visited = 0;
        while sent < self.config.stamps_cycle && visited < units {
            let unit = self.next_unit;
            self.next_unit = (self.next_unit + 1) % units;
            visited += 1;
            if let Some(stamp) = self.queues[unit].pop_front() {
                trace!(self.entity ; "unit {unit} sends {stamp}");
                self.stamp_tx.write(cycle, stamp)?;
                self.stats.stamps_out += 1;
                sent += 1;
                visited = 0;
            }
        }

        if sent < self.config.stamps_cycle && self.queues.iter().all(VecDeque::is_empty) {
            if let Some(stamp) = self.last_stamp.take() {
                self.stamp_tx.write(cycle, stamp)?;
                self.stats.stamps_out += 1;
                debug!(self.entity ; "last stamp sent");
                self.state = RasterizerState::End;
            }
        }
        Ok(())
    }

    fn flow_state(&self) -> FlowState {
        let fullest = self.queues.iter().map(VecDeque::len).max().unwrap_or(0);
        if self.config.queue_size - fullest >= self.config.margin {
            FlowState::Ready
        } else {
            FlowState::Busy
        }
    }
}

impl Clocked for FragmentFifo {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        if let Some(command) = self.stage.command_rx.read(cycle) {
            self.process_command(command)?;
        }

        self.receive_stamps(cycle)?;
        if self.state == RasterizerState::Drawing {
            self.send_stamps(cycle)?;
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

impl Stage for FragmentFifo {
    fn state(&self) -> RasterizerState {
        self.state
    }

    fn state_report(&self) -> String {
        format!(
            "{} | unit queues {:?} | last stamp {} | stamps in {} out {}",
            self.state,
            self.occupancy(),
            if self.last_stamp.is_some() { "held" } else { "none" },
            self.stats.stamps_in,
            self.stats.stamps_out
        )
    }

    fn progress(&self) -> u64 {
        self.stats.stamps_in + self.stats.stamps_out
    }

    fn command_statistics(&self) -> &CommandStatistics {
        &self.commands
    }
}
