// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The simulation engine.
//!
//! The engine owns the set of registered [components](crate::types::Component)
//! and advances simulation time one cycle at a time. On every cycle each
//! component is clocked exactly once, in registration order.
//!
//! Components communicate only through [signals](crate::signal), so the
//! registration order does not change which values a component observes on a
//! given cycle as long as every signal has a latency of at least one cycle.

use std::rc::Rc;

use raster_track::entity::{Entity, toplevel};
use raster_track::tracker::stdout_tracker;
use raster_track::{Tracker, debug, set_time};

use crate::sim_error;
use crate::types::{Component, Cycle, SimResult};

pub struct Engine {
    tracker: Tracker,
    top: Rc<Entity>,
    components: Vec<Component>,
    cycle: Cycle,
}

impl Engine {
    #[must_use]
    pub fn new(tracker: &Tracker) -> Self {
        let top = toplevel(tracker, "top");
        Self {
            tracker: tracker.clone(),
            top,
            components: Vec::new(),
            cycle: 0,
        }
    }

    /// The top-level entity that all model entities should be created under.
    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.top
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }

    /// The next cycle that will be simulated.
    #[must_use]
    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Add a component to be clocked every cycle.
    pub fn register(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Simulate a single cycle.
    pub fn step(&mut self) -> SimResult {
        set_time!(self.top ; self.cycle);
        for component in &self.components {
            component.borrow_mut().clock(self.cycle)?;
        }
        self.cycle += 1;
        Ok(())
    }

    /// Simulate `cycles` cycles. Stops at the first error.
    pub fn run_for(&mut self, cycles: Cycle) -> SimResult {
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }

    /// Simulate until `done` returns true.
    ///
    /// `done` is checked before every cycle. If `limit` is given then reaching
    /// that cycle without `done` becoming true is an error.
    pub fn run_until<F>(&mut self, mut done: F, limit: Option<Cycle>) -> SimResult
    where
        F: FnMut() -> bool,
    {
        while !done() {
            if let Some(limit) = limit {
                if self.cycle >= limit {
                    return sim_error!(format!(
                        "{}: simulation did not complete within {limit} cycles",
                        self.top
                    ));
                }
            }
            self.step()?;
        }
        debug!(self.top ; "completed at cycle {}", self.cycle);
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&stdout_tracker(raster_track::log::Level::Warn))
    }
}
