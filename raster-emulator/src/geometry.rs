// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Pure geometry helpers.
//!
//! These functions have no state so they can be used both by the emulator and
//! by models that compute triangle setup elsewhere (for example on a shader
//! pool).

use crate::types::EdgeEquations;

/// Compute the edge equations and the signed area of a triangle.
///
/// The positions are in clip space. Edges and area are computed in normalized
/// device coordinates, where the whole viewport is the square `[-1, 1]`. A
/// counter-clockwise triangle has a positive area and positive edge functions
/// inside.
///
/// A triangle with a vertex on the `w = 0` plane is degenerate and is given a
/// zero area.
#[must_use]
pub fn compute_edge_equations(positions: &[[f32; 4]; 3]) -> (EdgeEquations, f64) {
    if positions.iter().any(|p| p[3] == 0.0) {
        return (EdgeEquations::default(), 0.0);
    }

    let ndc = positions.map(|p| (f64::from(p[0] / p[3]), f64::from(p[1] / p[3])));

    let mut edges = EdgeEquations::default();
    for i in 0..3 {
        let (x1, y1) = ndc[(i + 1) % 3];
        let (x2, y2) = ndc[(i + 2) % 3];
        edges.a[i] = y1 - y2;
        edges.b[i] = x2 - x1;
        edges.c[i] = x1 * y2 - x2 * y1;
    }

    let (x0, y0) = ndc[0];
    let (x1, y1) = ndc[1];
    let (x2, y2) = ndc[2];
    let area = 0.5 * ((x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0));
    (edges, area)
}

/// Sample positions within a pixel for each supported multisampling level.
///
/// Positions are relative to the pixel's top-left corner.
#[must_use]
pub fn msaa_sample_offsets(samples: u32) -> &'static [(f64, f64)] {
    const SAMPLES_2: [(f64, f64); 2] = [(0.25, 0.25), (0.75, 0.75)];
    const SAMPLES_4: [(f64, f64); 4] = [
        (0.375, 0.125),
        (0.875, 0.375),
        (0.125, 0.625),
        (0.625, 0.875),
    ];
    const SAMPLES_8: [(f64, f64); 8] = [
        (0.5625, 0.3125),
        (0.4375, 0.6875),
        (0.8125, 0.5625),
        (0.3125, 0.1875),
        (0.1875, 0.8125),
        (0.0625, 0.4375),
        (0.6875, 0.9375),
        (0.9375, 0.0625),
    ];
    const CENTER: [(f64, f64); 1] = [(0.5, 0.5)];

    match samples {
        2 => &SAMPLES_2,
        4 => &SAMPLES_4,
        8 => &SAMPLES_8,
        _ => &CENTER,
    }
}

/// Interleave the bits of `x` and `y` (x in the even bits).
#[must_use]
pub fn morton(x: u32, y: u32) -> u32 {
    fn spread(mut v: u32) -> u32 {
        v &= 0x0000_ffff;
        v = (v | (v << 8)) & 0x00ff_00ff;
        v = (v | (v << 4)) & 0x0f0f_0f0f;
        v = (v | (v << 2)) & 0x3333_3333;
        v = (v | (v << 1)) & 0x5555_5555;
        v
    }
    spread(x) | (spread(y) << 1)
}

/// Inverse of [`morton`].
#[must_use]
pub fn demorton(code: u32) -> (u32, u32) {
    fn compact(mut v: u32) -> u32 {
        v &= 0x5555_5555;
        v = (v | (v >> 1)) & 0x3333_3333;
        v = (v | (v >> 2)) & 0x0f0f_0f0f;
        v = (v | (v >> 4)) & 0x00ff_00ff;
        v = (v | (v >> 8)) & 0x0000_ffff;
        v
    }
    (compact(code), compact(code >> 1))
}
