// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Simulate a draw on a GPU rasterizer.
//!
//! A complete rasterizer is built and wrapped by the blocks that drive it in
//! a GPU: a triangle source standing in for primitive assembly, a shader pool
//! when setup runs on the unified shaders, a fragment sink standing in for
//! the fragment shaders and a scripted command processor.
//!
//! The command processor resets the rasterizer, writes the display,
//! viewport, culling and multisampling registers, draws a scene of random
//! triangles and then clears the Z buffer.
//!
//! The simulation fails if the rasterizer stops making progress while
//! drawing for more than `--stall-cycles` cycles. The state of every stage is
//! logged to help find the cause.
//!
//! # Examples
//!
//! Draw the default scene and show the statistics:
//! ```txt
//! cargo run --bin sim-raster --release -- --stdout
//! ```
//!
//! Draw with setup on the shaders and row by row traversal:
//! ```txt
//! cargo run --bin sim-raster --release -- --stdout --shader-setup --scanline
//! ```
//!
//! Configuration can also come from a TOML file and the environment:
//! ```txt
//! SIM_RASTER_SCENE__MSAA_SAMPLES=4 cargo run --bin sim-raster -- --config raster.toml --stdout
//! ```
//!
//! # Diagram
//!
//! ```text
//!  +-----------------+       +------------------------------+
//!  | CommandProcessor|<----->|          Rasterizer          |
//!  +-----------------+       |                              |
//!  +-----------------+       |  +-------+    +-----------+  |
//!  | TriangleSource  |<----->|  | Setup |--->| Traversal |  |
//!  +-----------------+       |  +-------+    +-----------+  |
//!  +-----------------+       |      ^              |        |
//!  |   ShaderPool    |<------+------/               v        |
//!  +-----------------+       |  +-------+    +----+ +-----+ |
//!  +-----------------+       |  | Interp|<---|FIFO|<| HZ  | |
//!  |  FragmentSink   |<------+--+-------+    +----+ +-----+ |
//!  +-----------------+       +------------------------------+
//! ```

pub mod config;
pub mod raster_builder;
