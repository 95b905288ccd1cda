// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! A consumer of the stamps leaving the rasterizer.

use std::fmt;
use std::rc::Rc;

use raster_engine::signal::InSignal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::types::Stamp;

/// What the sink has seen.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SinkStatistics {
    pub stamps: u64,
    pub fragments: u64,
    pub covered: u64,
    pub last_stamps: u64,
}

impl fmt::Display for SinkStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stamps {}, fragments {}, covered {}, last stamps {}",
            self.stamps, self.fragments, self.covered, self.last_stamps
        )
    }
}

pub struct FragmentSink {
    pub entity: Rc<Entity>,
    fragment_rx: InSignal<Stamp>,
    stats: SinkStatistics,
    keep: bool,
    received: Vec<Stamp>,
}

impl FragmentSink {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, fragment_rx: InSignal<Stamp>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "fragment_sink")),
            fragment_rx,
            stats: SinkStatistics::default(),
            keep: false,
            received: Vec::new(),
        }
    }

    /// Keep every stamp received so that it can be inspected.
    #[must_use]
    pub fn keep_stamps(mut self) -> Self {
        self.keep = true;
        self
    }

    #[must_use]
    pub fn statistics(&self) -> &SinkStatistics {
        &self.stats
    }

    #[must_use]
    pub fn received(&self) -> &[Stamp] {
        &self.received
    }
}

impl Clocked for FragmentSink {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        while let Some(stamp) = self.fragment_rx.read(cycle) {
            trace!(self.entity ; "received {stamp}");
            self.stats.stamps += 1;
            if stamp.last {
                self.stats.last_stamps += 1;
                debug!(self.entity ; "last stamp received on cycle {cycle}");
            } else {
                self.stats.fragments += stamp.fragments.len() as u64;
                self.stats.covered += stamp.covered() as u64;
            }
            if self.keep {
                self.received.push(stamp);
            }
        }
        Ok(())
    }
}
