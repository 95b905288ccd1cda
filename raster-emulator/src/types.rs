// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Value types shared between the emulator and its users.

use std::fmt;

/// Width of a stamp in pixels.
pub const STAMP_WIDTH: u32 = 2;

/// Height of a stamp in pixels.
pub const STAMP_HEIGHT: u32 = 2;

/// Number of fragments in a stamp.
pub const STAMP_FRAGMENTS: usize = (STAMP_WIDTH * STAMP_HEIGHT) as usize;

/// Side of the square tile used to group stamps, in pixels.
pub const TILE_SIZE: u32 = 8;

/// Handle of a triangle held by the emulator.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SetupId(pub u32);

impl fmt::Display for SetupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a batch of triangles being traversed together.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BatchId(pub u32);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which winding is considered front facing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FaceMode {
    Cw,
    #[default]
    Ccw,
}

impl fmt::Display for FaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceMode::Cw => write!(f, "CW"),
            FaceMode::Ccw => write!(f, "CCW"),
        }
    }
}

/// The attributes of a vertex used by the rasterizer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    /// Clip-space position `(x, y, z, w)`.
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub back_color: [f32; 4],
}

impl Vertex {
    #[must_use]
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z, 1.0],
            ..Default::default()
        }
    }
}

/// Edge equations `e(x, y) = a * x + b * y + c` in normalized device
/// coordinates. Edge `i` is the edge opposite vertex `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EdgeEquations {
    pub a: [f64; 3],
    pub b: [f64; 3],
    pub c: [f64; 3],
}

impl EdgeEquations {
    #[must_use]
    pub fn evaluate(&self, edge: usize, x: f64, y: f64) -> f64 {
        self.a[edge] * x + self.b[edge] * y + self.c[edge]
    }

    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            a: self.a.map(|v| -v),
            b: self.b.map(|v| -v),
            c: self.c.map(|v| -v),
        }
    }
}

/// Identifier of the tile a fragment falls in.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A single generated fragment.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,

    /// Depth quantized to the configured precision.
    pub z: u32,

    /// True if the fragment (or any of its samples) is covered.
    pub inside: bool,

    /// One bit per covered MSAA sample. Zero when multisampling is off.
    pub coverage: u8,
}

/// A 2x2 group of fragments generated for one triangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedStamp {
    /// Position of the triangle within the batch that generated it.
    pub batch_index: usize,

    pub triangle: SetupId,

    pub fragments: [Fragment; STAMP_FRAGMENTS],

    /// True for the final stamp of the triangle (or batch).
    pub last_fragment: bool,
}

impl GeneratedStamp {
    #[must_use]
    pub fn covered(&self) -> usize {
        self.fragments.iter().filter(|f| f.inside).count()
    }
}
