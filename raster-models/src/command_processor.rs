// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! A scripted Command Processor.
//!
//! The command processor plays a list of [CommandStep]s against the
//! rasterizer, one step per cycle, and records every change in the state the
//! rasterizer reports.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimResult};
use raster_track::debug;
use raster_track::entity::Entity;

use crate::types::{Cookies, RasterizerCommand, RasterizerState, RasterizerStateInfo};

#[derive(Clone, Debug, PartialEq)]
pub enum CommandStep {
    Send(RasterizerCommand),

    /// Wait until the rasterizer reports the state.
    WaitFor(RasterizerState),
}

impl fmt::Display for CommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStep::Send(command) => write!(f, "send {command}"),
            CommandStep::WaitFor(state) => write!(f, "wait for {state}"),
        }
    }
}

pub struct CommandProcessor {
    pub entity: Rc<Entity>,
    command_tx: OutSignal<RasterizerCommand>,
    state_rx: InSignal<RasterizerStateInfo>,
    steps: VecDeque<CommandStep>,
    state: Option<RasterizerState>,
    history: Vec<(Cycle, RasterizerState)>,
}

impl CommandProcessor {
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        command_tx: OutSignal<RasterizerCommand>,
        state_rx: InSignal<RasterizerStateInfo>,
        steps: Vec<CommandStep>,
    ) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "command_processor")),
            command_tx,
            state_rx,
            steps: steps.into(),
            state: None,
            history: Vec::new(),
        }
    }

    /// Add steps to the end of the script.
    pub fn extend(&mut self, steps: impl IntoIterator<Item = CommandStep>) {
        self.steps.extend(steps);
    }

    /// Whether every step has been played.
    #[must_use]
    pub fn done(&self) -> bool {
        self.steps.is_empty()
    }

    /// The last state reported by the rasterizer.
    #[must_use]
    pub fn state(&self) -> Option<RasterizerState> {
        self.state
    }

    /// Every state reported by the rasterizer along with the cycle it was
    /// first seen.
    #[must_use]
    pub fn history(&self) -> &[(Cycle, RasterizerState)] {
        &self.history
    }

    /// The reported states without repeats.
    #[must_use]
    pub fn states(&self) -> Vec<RasterizerState> {
        self.history.iter().map(|(_, state)| *state).collect()
    }
}

impl Clocked for CommandProcessor {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        let Some(info) = self.state_rx.read(cycle) else {
            return sim_fatal!(self.entity, "clock" ; "Missing state signal from the Rasterizer");
        };
        if self.state != Some(info.state) {
            debug!(self.entity ; "rasterizer is {} on cycle {cycle}", info.state);
            self.state = Some(info.state);
            self.history.push((cycle, info.state));
        }

        match self.steps.front() {
            Some(CommandStep::Send(_)) => {
                if let Some(CommandStep::Send(mut command)) = self.steps.pop_front() {
                    command.cookies = Cookies::new().derive(&self.entity, "command");
                    debug!(self.entity ; "send {command}");
                    self.command_tx.write(cycle, command)?;
                }
            }
            Some(CommandStep::WaitFor(state)) => {
                if self.state == Some(*state) {
                    self.steps.pop_front();
                }
            }
            None => {}
        }
        Ok(())
    }
}
