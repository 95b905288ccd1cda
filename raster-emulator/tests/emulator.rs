// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

use std::collections::HashSet;

use approx::assert_relative_eq;
use raster_emulator::emulator::RasterizerEmulator;
use raster_emulator::types::{FaceMode, GeneratedStamp, SetupId, TileId, Vertex};
use raster_engine::test_helpers::start_test;

/// A vertex given in pixels of the default 400x400 viewport.
fn pixel(x: f32, y: f32) -> Vertex {
    Vertex::at(x / 200.0 - 1.0, y / 200.0 - 1.0, 0.0)
}

/// A right-angled triangle with no pixel centre on its edges.
fn corner_triangle() -> [Vertex; 3] {
    [pixel(0.0, 0.0), pixel(20.0, 0.0), pixel(0.0, 21.0)]
}

fn corner_triangle_pixels() -> HashSet<(u32, u32)> {
    let mut pixels = HashSet::new();
    for y in 0..21 {
        for x in 0..20 {
            if 21 * (2 * x + 1) + 20 * (2 * y + 1) < 840 {
                pixels.insert((x, y));
            }
        }
    }
    pixels
}

fn covered_pixels(stamps: &[GeneratedStamp]) -> Vec<(u32, u32)> {
    stamps
        .iter()
        .flat_map(|s| s.fragments.iter())
        .filter(|f| f.inside)
        .map(|f| (f.x, f.y))
        .collect()
}

fn scan(emulator: &mut RasterizerEmulator, id: SetupId, samples: u32) -> Vec<GeneratedStamp> {
    emulator.start_position(id, samples).unwrap();
    let mut stamps = Vec::new();
    loop {
        let stamp = emulator.next_scanline_stamp_tiled(id).unwrap();
        let last = stamp.last_fragment;
        stamps.push(stamp);
        if last {
            return stamps;
        }
        assert!(stamps.len() < 100_000, "stamp generation did not finish");
    }
}

#[test]
fn scanline_covers_every_pixel_once() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    let id = emulator.setup(corner_triangle()).unwrap();
    assert!(emulator.triangle_area(id).unwrap() > 0.0);
    assert!(!emulator.last_fragment(id).unwrap());

    let stamps = scan(&mut emulator, id, 1);
    assert!(stamps.iter().all(|s| s.covered() > 0));
    assert_eq!(
        stamps.iter().filter(|s| s.last_fragment).count(),
        1,
        "only the final stamp is marked last"
    );

    let pixels = covered_pixels(&stamps);
    let unique: HashSet<_> = pixels.iter().copied().collect();
    assert_eq!(pixels.len(), unique.len());
    assert_eq!(unique, corner_triangle_pixels());

    assert!(emulator.last_fragment(id).unwrap());
    emulator.destroy_triangle(id).unwrap();
    assert_eq!(emulator.stored_triangles(), 0);
}

#[test]
fn batch_walks_triangles_in_order() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    let first = emulator.setup(corner_triangle()).unwrap();
    let second = emulator
        .setup([pixel(100.0, 100.0), pixel(110.0, 100.0), pixel(100.0, 110.0)])
        .unwrap();
    let batch = emulator.start_recursive_multi(&[first, second], 1).unwrap();

    let mut stamps = Vec::new();
    loop {
        let stamp = emulator.next_stamp_recursive_multi(batch).unwrap();
        let last = stamp.last_fragment;
        stamps.push(stamp);
        if last {
            break;
        }
    }

    let indices: Vec<_> = stamps.iter().map(|s| s.batch_index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
    assert_eq!(stamps.first().unwrap().triangle, first);
    assert_eq!(stamps.last().unwrap().triangle, second);

    assert!(emulator.last_fragment(first).unwrap());
    assert!(emulator.last_fragment(second).unwrap());

    // The batch is gone once finished
    assert!(emulator.next_stamp_recursive_multi(batch).is_err());
}

#[test]
fn offscreen_triangle_has_one_empty_stamp() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    let id = emulator
        .setup([pixel(500.0, 500.0), pixel(520.0, 500.0), pixel(500.0, 520.0)])
        .unwrap();
    let stamps = scan(&mut emulator, id, 1);
    assert_eq!(stamps.len(), 1);
    assert_eq!(stamps[0].covered(), 0);
    assert!(stamps[0].last_fragment);
    assert!(emulator.last_fragment(id).unwrap());
}

#[test]
fn facing_follows_face_mode() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());
    let clockwise = [pixel(0.0, 0.0), pixel(0.0, 21.0), pixel(20.0, 0.0)];

    let back = emulator.setup(clockwise).unwrap();
    assert!(emulator.triangle_area(back).unwrap() < 0.0);

    // A back facing triangle only generates fragments once inverted
    let stamps = scan(&mut emulator, back, 1);
    assert_eq!(stamps.len(), 1);
    assert_eq!(stamps[0].covered(), 0);

    let inverted = emulator.setup(clockwise).unwrap();
    emulator.invert_triangle_facing(inverted).unwrap();
    let stamps = scan(&mut emulator, inverted, 1);
    let pixels: HashSet<_> = covered_pixels(&stamps).into_iter().collect();
    assert_eq!(pixels, corner_triangle_pixels());

    emulator.set_face_mode(FaceMode::Cw);
    let front = emulator.setup(clockwise).unwrap();
    assert!(emulator.triangle_area(front).unwrap() > 0.0);
}

#[test]
fn screen_percent() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    // Half of the viewport
    let id = emulator
        .setup([
            Vertex::at(-1.0, -1.0, 0.0),
            Vertex::at(1.0, -1.0, 0.0),
            Vertex::at(-1.0, 1.0, 0.0),
        ])
        .unwrap();
    assert_relative_eq!(emulator.tri_screen_percent(id).unwrap(), 0.5);
}

#[test]
fn scissor_limits_fragments() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());
    emulator.set_scissor(400, 400, true, 0, 0, 4, 4);

    let id = emulator.setup(corner_triangle()).unwrap();
    let stamps = scan(&mut emulator, id, 1);
    let pixels: HashSet<_> = covered_pixels(&stamps).into_iter().collect();
    let expected: HashSet<_> = (0..4).flat_map(|y| (0..4).map(move |x| (x, y))).collect();
    assert_eq!(pixels, expected);
}

#[test]
fn msaa_coverage() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    let id = emulator.setup(corner_triangle()).unwrap();
    let stamps = scan(&mut emulator, id, 4);
    let interior = stamps
        .iter()
        .flat_map(|s| s.fragments.iter())
        .find(|f| f.x == 1 && f.y == 1)
        .unwrap();
    assert!(interior.inside);
    assert_eq!(interior.coverage, 0b1111);
}

#[test]
fn depth_is_quantized() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    let id = emulator.setup(corner_triangle()).unwrap();
    let stamps = scan(&mut emulator, id, 1);

    // z = 0 in normalized device coordinates is half way through [0, 1]
    let fragment = stamps[0].fragments.iter().find(|f| f.inside).unwrap();
    assert_eq!(fragment.z, 1 << 23);

    emulator.set_depth_precision(16);
    let id = emulator.setup(corner_triangle()).unwrap();
    let stamps = scan(&mut emulator, id, 1);
    let fragment = stamps[0].fragments.iter().find(|f| f.inside).unwrap();
    assert_eq!(fragment.z, 1 << 15);
}

#[test]
fn two_sided_color() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());
    let mut vertices = [pixel(0.0, 0.0), pixel(0.0, 21.0), pixel(20.0, 0.0)];
    for v in &mut vertices {
        v.color = [1.0, 0.0, 0.0, 1.0];
        v.back_color = [0.0, 0.0, 1.0, 1.0];
    }

    let id = emulator.setup(vertices).unwrap();
    assert_eq!(emulator.colors(id).unwrap()[0], [1.0, 0.0, 0.0, 1.0]);
    emulator.select_two_sided_color(id).unwrap();
    assert_eq!(emulator.colors(id).unwrap()[0], [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn bound_triangles_need_setup() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    let id = emulator.bind(corner_triangle());
    assert!(emulator.triangle_area(id).is_err());
    assert!(emulator.start_position(id, 1).is_err());

    emulator.setup_edge_equations(id).unwrap();
    assert!(emulator.triangle_area(id).unwrap() > 0.0);
}

#[test]
fn unknown_triangle() {
    let engine = start_test(file!());
    let mut emulator = RasterizerEmulator::new(engine.top());

    assert_eq!(
        emulator.triangle_area(SetupId(7)).unwrap_err().to_string(),
        "Error: top::emulator: triangle_area: unknown triangle 7"
    );
    assert!(emulator.destroy_triangle(SetupId(7)).is_err());
}

#[test]
fn tile_ids() {
    let engine = start_test(file!());
    let emulator = RasterizerEmulator::new(engine.top());
    assert_eq!(emulator.calculate_tile_id(0, 0), TileId { x: 0, y: 0 });
    assert_eq!(emulator.calculate_tile_id(15, 8), TileId { x: 1, y: 1 });
}
