// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Fixed-latency signals.
//!
//! A signal is a typed, single-producer/single-consumer channel between two
//! components. A message written on cycle `c` becomes readable on cycle
//! `c + latency`. At most `bandwidth` messages can be written per cycle.
//!
//! Messages are owned by the signal until they are read, at which point the
//! reader takes ownership. Messages are always delivered in write order.
//!
//! # Ports
//!
//! A signal is created as a pair of ends:
//!  - [`OutSignal`]: the writing end.
//!  - [`InSignal`]: the reading end.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use raster_track::entity::Entity;
use raster_track::trace;

use crate::sim_fatal;
use crate::traits::SimObject;
use crate::types::{Cycle, SimResult};

struct SignalState<T>
where
    T: SimObject,
{
    /// Messages along with the cycle at which they become readable.
    queue: RefCell<VecDeque<(Cycle, T)>>,

    /// Number of writes seen in the cycle currently being written.
    writes: RefCell<(Cycle, usize)>,
}

impl<T> SignalState<T>
where
    T: SimObject,
{
    fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            writes: RefCell::new((0, 0)),
        }
    }
}

/// Create a signal with the given `bandwidth` (messages per cycle) and
/// `latency` (cycles).
///
/// # Panics
///
/// Signals must have a non-zero bandwidth and latency.
pub fn signal<T>(
    parent: &Rc<Entity>,
    name: &str,
    bandwidth: usize,
    latency: Cycle,
) -> (OutSignal<T>, InSignal<T>)
where
    T: SimObject,
{
    let entity = Rc::new(Entity::new(parent, name));
    assert!(bandwidth > 0, "{entity}: signal bandwidth must be non-zero");
    assert!(latency > 0, "{entity}: signal latency must be non-zero");

    let state = Rc::new(SignalState::new());
    (
        OutSignal {
            entity: entity.clone(),
            bandwidth,
            latency,
            state: state.clone(),
        },
        InSignal { entity, state },
    )
}

/// The writing end of a signal.
pub struct OutSignal<T>
where
    T: SimObject,
{
    entity: Rc<Entity>,
    bandwidth: usize,
    latency: Cycle,
    state: Rc<SignalState<T>>,
}

impl<T> fmt::Display for OutSignal<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> OutSignal<T>
where
    T: SimObject,
{
    /// Write `value` on `cycle`. It will be readable at `cycle + latency`.
    pub fn write(&self, cycle: Cycle, value: T) -> SimResult {
        {
            let mut writes = self.state.writes.borrow_mut();
            if writes.0 != cycle {
                *writes = (cycle, 0);
            }
            if writes.1 == self.bandwidth {
                return sim_fatal!(self.entity, "write" ;
                    "bandwidth of {} exceeded on cycle {cycle} writing {value}", self.bandwidth);
            }
            writes.1 += 1;
        }

        let ready = cycle + self.latency;
        trace!(self.entity ; "write {value}, ready at {ready}");
        self.state.queue.borrow_mut().push_back((ready, value));
        Ok(())
    }

    /// Provide a default message that is readable from cycle 0.
    ///
    /// This is used by state signals so that the reader has a value before the
    /// first write has had time to arrive.
    pub fn set_initial(&self, value: T) {
        self.state.queue.borrow_mut().push_front((0, value));
    }

    /// The signal latency in cycles.
    #[must_use]
    pub fn latency(&self) -> Cycle {
        self.latency
    }

    /// The number of messages that can be written per cycle.
    #[must_use]
    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }
}

/// The reading end of a signal.
pub struct InSignal<T>
where
    T: SimObject,
{
    entity: Rc<Entity>,
    state: Rc<SignalState<T>>,
}

impl<T> fmt::Display for InSignal<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> InSignal<T>
where
    T: SimObject,
{
    /// Take the oldest message that has arrived by `cycle`, if any.
    pub fn read(&self, cycle: Cycle) -> Option<T> {
        let mut queue = self.state.queue.borrow_mut();
        match queue.front() {
            Some((ready, _)) if *ready <= cycle => {
                let (_, value) = queue.pop_front()?;
                trace!(self.entity ; "read {value}");
                Some(value)
            }
            _ => None,
        }
    }

    /// Number of messages written but not yet read (including those still in
    /// flight).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.queue.borrow().len()
    }

    /// The entity of this signal.
    #[must_use]
    pub fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}
