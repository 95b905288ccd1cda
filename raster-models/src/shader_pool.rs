// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! A unified shader pool that computes triangle setup.
//!
//! The pool accepts setup work from Triangle Setup, holds every item for a
//! fixed latency and then returns it. Several items can be ready on the same
//! cycle, and which of them is returned first is chosen by the
//! [CompletionOrder], so Setup sees results out of submission order.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raster_emulator::geometry::compute_edge_equations;
use raster_emulator::types::EdgeEquations;
use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::trace;
use serde::{Deserialize, Serialize};

use crate::stage::prime_state;
use crate::types::{FlowState, FlowStateInfo, ShaderInput, ShaderOutput};

/// Which of the ready items the pool returns first.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionOrder {
    #[default]
    InOrder,

    /// The youngest ready item first.
    Reverse,

    /// A random ready item, from a generator seeded with `seed`.
    Random { seed: u64 },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ShaderPoolConfig {
    /// Items that can be in flight before the pool reports itself busy.
    pub capacity: usize,
    pub latency: Cycle,
    pub outputs_cycle: usize,
    pub order: CompletionOrder,
}

impl Default for ShaderPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            latency: 10,
            outputs_cycle: 1,
            order: CompletionOrder::InOrder,
        }
    }
}

pub struct ShaderPoolPorts {
    pub input_rx: InSignal<ShaderInput>,
    pub output_tx: OutSignal<ShaderOutput>,
    pub state_tx: OutSignal<FlowStateInfo>,
}

struct InFlight {
    ready: Cycle,
    output: ShaderOutput,
}

pub struct ShaderPool {
    pub entity: Rc<Entity>,
    config: ShaderPoolConfig,
    input_rx: InSignal<ShaderInput>,
    output_tx: OutSignal<ShaderOutput>,
    state_tx: OutSignal<FlowStateInfo>,
    in_flight: Vec<InFlight>,
    rng: Option<StdRng>,
    completed: u64,
}

impl ShaderPool {
    pub fn new(
        parent: &Rc<Entity>,
        config: ShaderPoolConfig,
        ports: ShaderPoolPorts,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "shader_pool"));
        if config.capacity == 0 || config.outputs_cycle == 0 {
            return sim_fatal!(entity, "new" ; "capacity and outputs per cycle must be non-zero");
        }
        let rng = match config.order {
            CompletionOrder::Random { seed } => Some(StdRng::seed_from_u64(seed)),
            CompletionOrder::InOrder | CompletionOrder::Reverse => None,
        };
        prime_state(&ports.state_tx, FlowStateInfo::new(FlowState::Ready));

        Ok(Self {
            entity,
            config,
            input_rx: ports.input_rx,
            output_tx: ports.output_tx,
            state_tx: ports.state_tx,
            in_flight: Vec::new(),
            rng,
            completed: 0,
        })
    }

    /// Number of items returned so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Pick the next ready item to return, if any.
    fn select(&mut self, cycle: Cycle) -> Option<usize> {
        let ready: Vec<usize> = self
            .in_flight
            .iter()
            .enumerate()
            .filter(|(_, item)| item.ready <= cycle)
            .map(|(i, _)| i)
            .collect();
        match (&self.config.order, ready.is_empty()) {
            (_, true) => None,
            (CompletionOrder::InOrder, false) => ready.first().copied(),
            (CompletionOrder::Reverse, false) => ready.last().copied(),
            (CompletionOrder::Random { .. }, false) => {
                let rng = self.rng.as_mut()?;
                Some(ready[rng.gen_range(0..ready.len())])
            }
        }
    }
}

impl Clocked for ShaderPool {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        while let Some(input) = self.input_rx.read(cycle) {
            let (edges, area) = if input.last {
                (EdgeEquations::default(), 0.0)
            } else {
                compute_edge_equations(&input.positions)
            };
            trace!(self.entity ; "accepted {input}");
            self.in_flight.push(InFlight {
                ready: cycle + self.config.latency,
                output: ShaderOutput {
                    entry: input.entry,
                    edges,
                    area,
                },
            });
        }

        for _ in 0..self.config.outputs_cycle {
            let Some(index) = self.select(cycle) else {
                break;
            };
            let item = self.in_flight.remove(index);
            self.output_tx.write(cycle, item.output)?;
            self.completed += 1;
        }

        let state = if self.in_flight.len() >= self.config.capacity {
            FlowState::Busy
        } else {
            FlowState::Ready
        };
        self.state_tx.write(cycle, FlowStateInfo::new(state))
    }
}
