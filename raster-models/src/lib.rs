// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Cycle-accurate models of the stages of a GPU rasterizer.
//!
//! The [Rasterizer](crate::rasterizer::Rasterizer) is built from a
//! [RasterizerConfig](crate::config::RasterizerConfig) and owns the stages:
//!  - [Triangle Setup](crate::triangle_setup)
//!  - [Triangle Traversal](crate::triangle_traversal)
//!  - [Hierarchical Z](crate::hierarchical_z)
//!  - [Fragment FIFO](crate::fragment_fifo)
//!  - [Interpolator](crate::interpolator)
//!
//! The remaining models stand in for the rest of the GPU when running the
//! rasterizer on its own: a [triangle source](crate::triangle_source), a
//! [shader pool](crate::shader_pool), a [fragment sink](crate::fragment_sink)
//! and a scripted [command processor](crate::command_processor).
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use raster_emulator::types::Vertex;
//! use raster_engine::engine::Engine;
//! use raster_models::command_processor::{CommandProcessor, CommandStep};
//! use raster_models::config::RasterizerConfig;
//! use raster_models::fragment_sink::FragmentSink;
//! use raster_models::rasterizer::Rasterizer;
//! use raster_models::triangle_source::TriangleSource;
//! use raster_models::types::{CommandKind, RasterizerCommand, RasterizerState};
//!
//! let mut engine = Engine::default();
//! let top = engine.top().clone();
//! let (rasterizer, io) = Rasterizer::new(&top, "rasterizer", &RasterizerConfig::default()).unwrap();
//!
//! let triangle = [
//!     Vertex::at(-0.5, -0.5, 0.5),
//!     Vertex::at(0.5, -0.5, 0.5),
//!     Vertex::at(0.0, 0.5, 0.5),
//! ];
//! let source = TriangleSource::new(&top, io.triangle_request_rx, io.triangle_tx, vec![triangle]);
//! let sink = Rc::new(RefCell::new(FragmentSink::new(&top, io.fragment_rx)));
//! let processor = Rc::new(RefCell::new(CommandProcessor::new(
//!     &top,
//!     io.command_tx,
//!     io.state_rx,
//!     vec![
//!         CommandStep::Send(RasterizerCommand::new(CommandKind::Reset)),
//!         CommandStep::Send(RasterizerCommand::new(CommandKind::Draw)),
//!         CommandStep::WaitFor(RasterizerState::End),
//!         CommandStep::Send(RasterizerCommand::new(CommandKind::End)),
//!         CommandStep::WaitFor(RasterizerState::Ready),
//!     ],
//! )));
//!
//! engine.register(Rc::new(RefCell::new(rasterizer)));
//! engine.register(Rc::new(RefCell::new(source)));
//! engine.register(sink.clone());
//! engine.register(processor.clone());
//!
//! let done = processor.clone();
//! engine.run_until(|| done.borrow().done(), Some(100_000)).unwrap();
//! assert_eq!(sink.borrow().statistics().last_stamps, 1);
//! assert!(sink.borrow().statistics().covered > 0);
//! ```

pub mod command_processor;
pub mod config;
pub mod fragment_fifo;
pub mod fragment_sink;
pub mod hierarchical_z;
pub mod interpolator;
pub mod rasterizer;
pub mod registers;
pub mod shader_pool;
pub mod stage;
pub mod statistics;
pub mod triangle_setup;
pub mod triangle_source;
pub mod triangle_traversal;
pub mod types;
