// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the engine.

use std::fmt::{Debug, Display};

use crate::types::{Cycle, SimResult};

/// A super-trait that objects that are passed around the simulation have to
/// implement
///
///  - Debug:   In order to print "{:?}" objects have to at least implement
///    Debug.
///  - Display: Used when tracing objects moving through signals.
///  - 'static: Messages are owned by the signal until they are read.
pub trait SimObject: Debug + Display + 'static {}

/// A component that does its work in an explicit per-cycle step.
///
/// The engine calls `clock()` exactly once per cycle on every registered
/// component, in registration order.
pub trait Clocked {
    /// Perform all the work for `cycle`.
    fn clock(&mut self, cycle: Cycle) -> SimResult;
}

// Implementations for basic types that can be sent around the simulation for
// testing
impl SimObject for i32 {}
impl SimObject for u32 {}
impl SimObject for usize {}
