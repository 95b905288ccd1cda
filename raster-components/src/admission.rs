// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! A bounded FIFO with admission reservations.
//!
//! Entries move through two phases:
//!  - [`reserve`](AdmissionFifo::reserve) claims space when the data is
//!    requested from an upstream stage.
//!  - [`push`](AdmissionFifo::push) converts one reservation into an occupied
//!    entry when the data arrives, or [`release`](AdmissionFifo::release)
//!    returns the reservation if the data is dropped instead.
//!
//! At all times `occupied + reserved <= capacity`.
//!
//! # Example
//!
//! ```rust
//! use raster_components::admission::AdmissionFifo;
//! use raster_engine::engine::Engine;
//!
//! let engine = Engine::default();
//! let mut fifo = AdmissionFifo::new(engine.top(), "fifo", 4).unwrap();
//!
//! fifo.reserve(3).unwrap();
//! assert_eq!(fifo.free(), 1);
//!
//! fifo.push('a').unwrap();
//! fifo.release().unwrap();
//! assert_eq!(fifo.len(), 1);
//! assert_eq!(fifo.reserved(), 1);
//! assert_eq!(fifo.pop(), Some('a'));
//! ```

use std::collections::VecDeque;
use std::collections::vec_deque::Iter;
use std::rc::Rc;

use raster_engine::sim_fatal;
use raster_engine::types::{SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::trace;

pub struct AdmissionFifo<T> {
    pub entity: Rc<Entity>,
    capacity: usize,
    reserved: usize,
    entries: VecDeque<T>,
}

impl<T> AdmissionFifo<T> {
    pub fn new(parent: &Rc<Entity>, name: &str, capacity: usize) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        if capacity == 0 {
            return sim_fatal!(entity, "new" ; "unsupported FIFO with 0 capacity");
        }
        Ok(Self {
            entity,
            capacity,
            reserved: 0,
            entries: VecDeque::with_capacity(capacity),
        })
    }

    /// Claim `count` entries for data that has been requested but not yet
    /// received.
    pub fn reserve(&mut self, count: usize) -> SimResult {
        if count > self.free() {
            return sim_fatal!(self.entity, "reserve" ;
                "cannot reserve {count} entries, only {} free", self.free());
        }
        self.reserved += count;
        trace!(self.entity ; "reserved {count}, now {} reserved", self.reserved);
        Ok(())
    }

    /// Give back one reservation without storing anything.
    pub fn release(&mut self) -> SimResult {
        if self.reserved == 0 {
            return sim_fatal!(self.entity, "release" ; "no reserved entries to release");
        }
        self.reserved -= 1;
        Ok(())
    }

    /// Store `value` in an entry that was previously reserved.
    pub fn push(&mut self, value: T) -> SimResult {
        if self.reserved == 0 {
            return sim_fatal!(self.entity, "push" ; "no reserved entry for new value");
        }
        self.reserved -= 1;
        self.entries.push_back(value);
        Ok(())
    }

    /// Store `value` directly into a free entry.
    ///
    /// This is used where the producer is throttled by a flow-control state
    /// instead of explicit requests.
    pub fn push_unreserved(&mut self, value: T) -> SimResult {
        if self.free() == 0 {
            return sim_fatal!(self.entity, "push_unreserved" ;
                "overflow, {} entries occupied and {} reserved", self.entries.len(), self.reserved);
        }
        self.entries.push_back(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.entries.front()
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Occupied entry `index`, where `0` is the oldest.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.entries.iter()
    }

    /// Number of occupied entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries that are neither occupied nor reserved.
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity - self.entries.len() - self.reserved
    }

    /// Drop all entries and reservations.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.reserved = 0;
    }
}
