// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The cycle-stepped core of the rasterizer pipeline simulation.
//!
//! This library provides the [Engine](crate::engine::Engine) which advances
//! simulation time one cycle at a time, and the fixed-latency
//! [signals](crate::signal) that components use to talk to each other.
//!
//! # Simple Application
//!
//! A component implements [Clocked](crate::traits::Clocked) and is registered
//! with the engine:
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use raster_engine::engine::Engine;
//! use raster_engine::signal::{InSignal, OutSignal, signal};
//! use raster_engine::traits::Clocked;
//! use raster_engine::types::{Cycle, SimResult};
//!
//! struct Counter {
//!     tx: OutSignal<u32>,
//!     next: u32,
//! }
//!
//! impl Clocked for Counter {
//!     fn clock(&mut self, cycle: Cycle) -> SimResult {
//!         self.tx.write(cycle, self.next)?;
//!         self.next += 1;
//!         Ok(())
//!     }
//! }
//!
//! let mut engine = Engine::default();
//! let (tx, rx): (OutSignal<u32>, InSignal<u32>) = signal(engine.top(), "count", 1, 2);
//! engine.register(Rc::new(RefCell::new(Counter { tx, next: 0 })));
//! engine.run_for(3).unwrap();
//! assert_eq!(rx.read(2), Some(0));
//! assert_eq!(rx.read(2), None);
//! assert_eq!(rx.read(3), Some(1));
//! ```

pub mod engine;
pub mod signal;
pub mod test_helpers;
pub mod traits;
pub mod types;

#[macro_export]
/// Run the engine until `$done` holds, panicking on error or if `$limit`
/// cycles pass first.
///
/// The second form expects the simulation to fail with the given message.
macro_rules! run_simulation {
    ($engine:ident, $done:expr, $limit:expr) => {
        $engine.run_until($done, Some($limit)).unwrap();
    };
    ($engine:ident, $done:expr, $limit:expr, $expect:expr) => {
        match $engine.run_until($done, Some($limit)) {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}
