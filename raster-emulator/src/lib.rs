// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Geometry service for the rasterizer pipeline models.
//!
//! The pipeline models deal with timing. The actual geometry (edge equations,
//! face culling, stamp generation and depth) is delegated to the
//! [RasterizerEmulator](crate::emulator::RasterizerEmulator), which they call
//! synchronously and which hands out opaque [SetupId](crate::types::SetupId)
//! handles for the triangles it holds.
//!
//! Fragment processing units are chosen by the
//! [PixelMapper](crate::pixel_mapper::PixelMapper).

pub mod emulator;
pub mod geometry;
pub mod pixel_mapper;
pub mod types;
pub mod walker;
