// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Interpolator.
//!
//! An in-order pipeline. A stamp leaves after the interpolation latency plus
//! one cycle for each group of `interpolators` attributes it needs.

use std::collections::VecDeque;
use std::rc::Rc;

use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::config::InterpolatorConfig;
use crate::registers::{GpuRegister, MAX_FRAGMENT_ATTRIBUTES, RegisterValue};
use crate::stage::{Stage, StagePorts, check_command, unsupported_command};
use crate::statistics::{CommandStatistics, StampStatistics};
use crate::types::{CommandKind, RasterizerCommand, RasterizerState, RasterizerStateInfo, Stamp};

pub struct InterpolatorPorts {
    pub stage: StagePorts,
    pub stamp_rx: InSignal<Stamp>,
    pub fragment_tx: OutSignal<Stamp>,
}

#[derive(Clone, Debug, PartialEq)]
struct InterpolatorRegisters {
    interpolation: [bool; MAX_FRAGMENT_ATTRIBUTES as usize],
    fragment_inputs: [bool; MAX_FRAGMENT_ATTRIBUTES as usize],
}

impl Default for InterpolatorRegisters {
    fn default() -> Self {
        Self {
            interpolation: [true; MAX_FRAGMENT_ATTRIBUTES as usize],
            fragment_inputs: [false; MAX_FRAGMENT_ATTRIBUTES as usize],
        }
    }
}

impl InterpolatorRegisters {
    fn write(&mut self, register: GpuRegister, subreg: u32, value: &RegisterValue) -> Result<(), String> {
        let attributes = match register {
            GpuRegister::Interpolation => &mut self.interpolation,
            GpuRegister::FragmentInputAttributes => &mut self.fragment_inputs,
            _ => return Err(format!("unsupported register {register}")),
        };
        let Some(attribute) = attributes.get_mut(subreg as usize) else {
            return Err(format!("{register} sub-register {subreg} out of range"));
        };
        *attribute = value.to_bool(register)?;
        Ok(())
    }

    /// Attributes that are both read by the fragments and interpolated.
    fn active_attributes(&self) -> u32 {
        let active = self
            .interpolation
            .iter()
            .zip(self.fragment_inputs.iter())
            .filter(|(interpolated, input)| **interpolated && **input)
            .count();
        (active as u32).max(1)
    }
}

pub struct Interpolator {
    pub entity: Rc<Entity>,
    config: InterpolatorConfig,
    stage: StagePorts,
    stamp_rx: InSignal<Stamp>,
    fragment_tx: OutSignal<Stamp>,

    state: RasterizerState,
    registers: InterpolatorRegisters,
    stamp_cycles: Cycle,
    pipeline: VecDeque<(Cycle, Stamp)>,

    stats: StampStatistics,
    commands: CommandStatistics,
}

impl Interpolator {
    pub fn new(
        parent: &Rc<Entity>,
        config: InterpolatorConfig,
        ports: InterpolatorPorts,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "interpolator"));
        config.validate(&entity)?;
        Ok(Self {
            entity,
            config,
            stage: ports.stage,
            stamp_rx: ports.stamp_rx,
            fragment_tx: ports.fragment_tx,
            state: RasterizerState::Reset,
            registers: InterpolatorRegisters::default(),
            stamp_cycles: 0,
            pipeline: VecDeque::new(),
            stats: StampStatistics::default(),
            commands: CommandStatistics::default(),
        })
    }

    #[must_use]
    pub fn statistics(&self) -> &StampStatistics {
        &self.stats
    }

    /// Cycles a stamp spends in the Interpolator during the current draw.
    #[must_use]
    pub fn stamp_cycles(&self) -> Cycle {
        self.stamp_cycles
    }

    fn process_command(&mut self, command: RasterizerCommand) -> SimResult {
        self.commands.record(&command.kind);
        check_command(&self.entity, &command.kind, self.state)?;
        debug!(self.entity ; "{command} in {} state", self.state);

        match &command.kind {
            CommandKind::Reset => {
                self.registers = InterpolatorRegisters::default();
                self.pipeline.clear();
                self.state = RasterizerState::Ready;
            }
            CommandKind::Draw => {
                let attributes = self.registers.active_attributes();
                self.stamp_cycles = self.config.latency
                    + Cycle::from(attributes.div_ceil(self.config.interpolators));
                debug!(self.entity ; "{attributes} attributes take {} cycles", self.stamp_cycles);
                self.pipeline.clear();
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

    fn receive_stamps(&mut self, cycle: Cycle) -> SimResult {
        while let Some(stamp) = self.stamp_rx.read(cycle) {
            if self.state != RasterizerState::Drawing {
                return sim_fatal!(self.entity, "receive_stamps" ; "{stamp} received in {:?} state", self.state);
            }
            self.stats.stamps_in += 1;
            self.pipeline.push_back((cycle + self.stamp_cycles, stamp));
        }
        Ok(())
    }

    fn send_stamps(&mut self, cycle: Cycle) -> SimResult {
        for _ in 0..self.config.stamps_cycle {
            match self.pipeline.front() {
                Some((ready, _)) if *ready <= cycle => {}
                _ => break,
            }
            let Some((_, stamp)) = self.pipeline.pop_front() else {
                break;
            };
            trace!(self.entity ; "interpolated {stamp}");
            let last = stamp.last;
            self.fragment_tx.write(cycle, stamp)?;
            self.stats.stamps_out += 1;
            if last {
                debug!(self.entity ; "last stamp sent");
                self.state = RasterizerState::End;
                break;
            }
        }
        Ok(())
    }
}

impl Clocked for Interpolator {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        if let Some(command) = self.stage.command_rx.read(cycle) {
            self.process_command(command)?;
        }

        self.receive_stamps(cycle)?;
        if self.state == RasterizerState::Drawing {
            if !self.pipeline.is_empty() {
                self.stats.busy_cycles += 1;
            }
            self.send_stamps(cycle)?;
        }

        self.stage
            .state_tx
            .write(cycle, RasterizerStateInfo::new(self.state))
    }
}

impl Stage for Interpolator {
    fn state(&self) -> RasterizerState {
        self.state
    }

    fn state_report(&self) -> String {
        format!(
            "{} | in flight {} | stamps in {} out {}",
            self.state,
            self.pipeline.len(),
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
