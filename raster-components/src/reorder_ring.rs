// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! A fixed-capacity reorder buffer.
//!
//! Items are inserted in submission order and each is given a [`RingIndex`].
//! Every item then goes through:
//!
//!  1. [`dispatch`](ReorderRing::dispatch): handed out, in submission order, to
//!     whatever computes its result.
//!  2. [`complete`](ReorderRing::complete): marked as done. This may happen in
//!     any order.
//!  3. [`pop_completed`](ReorderRing::pop_completed): removed from the ring.
//!     Only the oldest item can leave, and only once it is complete, so items
//!     always leave in submission order.
//!
//! Like the [`AdmissionFifo`](crate::admission::AdmissionFifo), space has to be
//! reserved before an item can be inserted.
//!
//! # Example
//!
//! ```rust
//! use raster_components::reorder_ring::ReorderRing;
//! use raster_engine::engine::Engine;
//!
//! let engine = Engine::default();
//! let mut ring = ReorderRing::new(engine.top(), "ring", 2).unwrap();
//! ring.reserve(2).unwrap();
//! let a = ring.push_reserved("a").unwrap();
//! let b = ring.push_reserved("b").unwrap();
//! assert_eq!(ring.dispatch().map(|(index, _)| index), Some(a));
//! assert_eq!(ring.dispatch().map(|(index, _)| index), Some(b));
//!
//! ring.complete(b).unwrap();
//! assert!(ring.pop_completed().is_none());
//! ring.complete(a).unwrap();
//! assert_eq!(ring.pop_completed(), Some("a"));
//! assert_eq!(ring.pop_completed(), Some("b"));
//! ```

use std::fmt;
use std::rc::Rc;

use raster_engine::sim_fatal;
use raster_engine::types::{SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::trace;

/// Position of an entry in a [`ReorderRing`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct RingIndex(usize);

impl RingIndex {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Slot<T> {
    item: T,
    dispatched: bool,
    completed: bool,
}

pub struct ReorderRing<T> {
    pub entity: Rc<Entity>,
    slots: Vec<Option<Slot<T>>>,

    /// Oldest entry, the next one to leave.
    head: RingIndex,

    /// Next entry to be handed out by `dispatch`.
    next_dispatch: RingIndex,

    /// Next free entry.
    tail: RingIndex,

    occupied: usize,
    dispatched: usize,
    reserved: usize,
}

impl<T> ReorderRing<T> {
    pub fn new(parent: &Rc<Entity>, name: &str, capacity: usize) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        if capacity == 0 {
            return sim_fatal!(entity, "new" ; "unsupported ring with 0 capacity");
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            entity,
            slots,
            head: RingIndex::default(),
            next_dispatch: RingIndex::default(),
            tail: RingIndex::default(),
            occupied: 0,
            dispatched: 0,
            reserved: 0,
        })
    }

    fn advance(&self, index: RingIndex) -> RingIndex {
        RingIndex((index.0 + 1) % self.slots.len())
    }

    pub fn reserve(&mut self, count: usize) -> SimResult {
        if count > self.free() {
            return sim_fatal!(self.entity, "reserve" ;
                "cannot reserve {count} entries, only {} free", self.free());
        }
        self.reserved += count;
        Ok(())
    }

    /// Give back one reservation without inserting anything.
    pub fn release(&mut self) -> SimResult {
        if self.reserved == 0 {
            return sim_fatal!(self.entity, "release" ; "no reserved entries to release");
        }
        self.reserved -= 1;
        Ok(())
    }

    /// Insert `item` into a previously reserved entry.
    pub fn push_reserved(&mut self, item: T) -> Result<RingIndex, SimError> {
        if self.reserved == 0 {
            return sim_fatal!(self.entity, "push_reserved" ; "no reserved entry for new item");
        }
        let index = self.tail;
        if self.slots[index.0].is_some() {
            return sim_fatal!(self.entity, "push_reserved" ; "entry {index} still in use");
        }
        self.slots[index.0] = Some(Slot {
            item,
            dispatched: false,
            completed: false,
        });
        self.reserved -= 1;
        self.occupied += 1;
        self.tail = self.advance(index);
        trace!(self.entity ; "inserted at {index}");
        Ok(index)
    }

    /// Hand out the oldest item that has not yet been dispatched.
    pub fn dispatch(&mut self) -> Option<(RingIndex, &T)> {
        if self.dispatched == self.occupied {
            return None;
        }
        let index = self.next_dispatch;
        self.next_dispatch = self.advance(index);
        self.dispatched += 1;
        let slot = self.slots[index.0].as_mut()?;
        slot.dispatched = true;
        Some((index, &slot.item))
    }

    /// Mutable access to an occupied entry, used to record its result.
    pub fn get_mut(&mut self, index: RingIndex) -> Result<&mut T, SimError> {
        match self.slots.get_mut(index.0) {
            Some(Some(slot)) => Ok(&mut slot.item),
            _ => sim_fatal!(self.entity, "get_mut" ; "entry {index} is empty"),
        }
    }

    /// Mark entry `index` as complete. Entries may complete in any order but
    /// only once each.
    pub fn complete(&mut self, index: RingIndex) -> SimResult {
        match self.slots.get_mut(index.0) {
            Some(Some(slot)) if !slot.dispatched => {
                sim_fatal!(self.entity, "complete" ; "entry {index} completed before dispatch")
            }
            Some(Some(slot)) if !slot.completed => {
                slot.completed = true;
                trace!(self.entity ; "completed {index}");
                Ok(())
            }
            Some(Some(_)) => sim_fatal!(self.entity, "complete" ; "entry {index} completed twice"),
            _ => sim_fatal!(self.entity, "complete" ; "entry {index} is empty"),
        }
    }

    /// True if the oldest entry is complete and can be removed.
    #[must_use]
    pub fn head_completed(&self) -> bool {
        matches!(&self.slots[self.head.0], Some(slot) if slot.completed)
    }

    /// Remove the oldest entry if it is complete.
    pub fn pop_completed(&mut self) -> Option<T> {
        if !self.head_completed() {
            return None;
        }
        let index = self.head;
        let slot = self.slots[index.0].take()?;
        self.head = self.advance(index);
        self.occupied -= 1;
        self.dispatched -= 1;
        Some(slot.item)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Entries holding an item.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Items inserted but not yet dispatched.
    #[must_use]
    pub fn pending_dispatch(&self) -> usize {
        self.occupied - self.dispatched
    }

    /// Items dispatched but not yet removed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.dispatched
    }

    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Entries that are neither occupied nor reserved.
    #[must_use]
    pub fn free(&self) -> usize {
        self.slots.len() - self.occupied - self.reserved
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = RingIndex::default();
        self.next_dispatch = RingIndex::default();
        self.tail = RingIndex::default();
        self.occupied = 0;
        self.dispatched = 0;
        self.reserved = 0;
    }
}
