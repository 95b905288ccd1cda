// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! The command and state protocol shared by all rasterizer stages.
//!
//! Every stage:
//!  - reads at most one [RasterizerCommand] per cycle from its parent,
//!  - writes its [RasterizerState] to its parent every cycle.
//!
//! The common state machine is `RESET -> READY -> DRAWING -> END -> READY`.
//! `DRAW` and register writes are only accepted in `READY` and `END` only in
//! `END`.

use std::rc::Rc;

use raster_engine::signal::{InSignal, OutSignal, signal};
use raster_engine::sim_fatal;
use raster_engine::traits::SimObject;
use raster_engine::types::{Cycle, SimResult};
use raster_track::entity::Entity;

use crate::statistics::CommandStatistics;
use crate::types::{CommandKind, RasterizerCommand, RasterizerState, RasterizerStateInfo};

/// Queries the orchestrator and tests make of every stage.
pub trait Stage {
    fn state(&self) -> RasterizerState;

    /// A one line summary of the stage and its queues.
    fn state_report(&self) -> String;

    /// A counter that increases whenever the stage does useful work.
    fn progress(&self) -> u64;

    fn command_statistics(&self) -> &CommandStatistics;
}

/// The ports a stage uses to talk to its parent.
pub struct StagePorts {
    pub command_rx: InSignal<RasterizerCommand>,
    pub state_tx: OutSignal<RasterizerStateInfo>,
}

/// The parent's side of [StagePorts].
pub struct StageLink {
    pub command_tx: OutSignal<RasterizerCommand>,
    pub state_rx: InSignal<RasterizerStateInfo>,
}

/// Create the command and state signals between a parent and a child stage
/// called `name`. The child reports `RESET` until its first write arrives.
#[must_use]
pub fn stage_signals(
    parent: &Rc<Entity>,
    name: &str,
    command_latency: Cycle,
    state_latency: Cycle,
) -> (StageLink, StagePorts) {
    let (command_tx, command_rx) = signal(parent, &format!("{name}_command"), 1, command_latency);
    let (state_tx, state_rx) = signal(parent, &format!("{name}_state"), 1, state_latency);
    prime_state(&state_tx, RasterizerStateInfo::new(RasterizerState::Reset));
    (
        StageLink {
            command_tx,
            state_rx,
        },
        StagePorts {
            command_rx,
            state_tx,
        },
    )
}

/// Make `value` readable on each of the cycles before the first write can
/// arrive. Signals carrying a state are written and read every cycle.
pub fn prime_state<T>(tx: &OutSignal<T>, value: T)
where
    T: SimObject + Clone,
{
    for _ in 0..tx.latency() {
        tx.set_initial(value.clone());
    }
}

impl CommandKind {
    /// Name of the command used in diagnostics.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            CommandKind::Reset => "reset",
            CommandKind::Draw => "draw",
            CommandKind::End => "end",
            CommandKind::RegWrite { .. } => "register write",
            CommandKind::RegRead { .. } => "register read",
            CommandKind::ClearZStencilBuffer => "clear",
        }
    }
}

/// The error for a command that is not allowed in `state`.
pub fn unexpected_command(entity: &Entity, kind: &CommandKind, state: RasterizerState) -> SimResult {
    sim_fatal!(entity, "process_command" ; "{} received in {state:?} state", kind.describe())
}

/// The error for a command a stage does not support at all.
pub fn unsupported_command(entity: &Entity, kind: &CommandKind) -> SimResult {
    sim_fatal!(entity, "process_command" ; "unsupported command {kind}")
}

/// Check `kind` is allowed in `state` following the common state machine.
///
/// Returns `Ok(())` for commands that are allowed. `RESET` is allowed in any
/// state other than `DRAWING`.
pub fn check_command(entity: &Entity, kind: &CommandKind, state: RasterizerState) -> SimResult {
    let allowed = match kind {
        CommandKind::Reset => state != RasterizerState::Drawing,
        CommandKind::Draw | CommandKind::RegWrite { .. } => state == RasterizerState::Ready,
        CommandKind::End => state == RasterizerState::End,
        CommandKind::RegRead { .. } | CommandKind::ClearZStencilBuffer => {
            return unsupported_command(entity, kind);
        }
    };
    if allowed {
        Ok(())
    } else {
        unexpected_command(entity, kind, state)
    }
}
