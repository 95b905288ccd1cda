// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use raster_components::reorder_ring::{ReorderRing, RingIndex};
use raster_engine::test_helpers::start_test;

#[test]
fn out_of_order_completion_in_order_removal() {
    let engine = start_test(file!());
    let mut ring = ReorderRing::new(engine.top(), "ring", 3).unwrap();

    ring.reserve(3).unwrap();
    for name in ["A", "B", "C"] {
        ring.push_reserved(name).unwrap();
    }
    let mut dispatched = Vec::new();
    while let Some((index, item)) = ring.dispatch() {
        dispatched.push((index, *item));
    }
    assert_eq!(
        dispatched,
        vec![
            (RingIndex::new(0), "A"),
            (RingIndex::new(1), "B"),
            (RingIndex::new(2), "C")
        ]
    );

    let mut removed = Vec::new();
    for (index, _) in [dispatched[2], dispatched[0], dispatched[1]] {
        ring.complete(index).unwrap();
        while let Some(item) = ring.pop_completed() {
            removed.push(item);
        }
    }
    assert_eq!(removed, vec!["A", "B", "C"]);
    assert_eq!(ring.free(), 3);
}

#[test]
fn wraps_around() {
    let engine = start_test(file!());
    let mut ring = ReorderRing::new(engine.top(), "ring", 2).unwrap();

    for value in 0..5 {
        ring.reserve(1).unwrap();
        let index = ring.push_reserved(value).unwrap();
        assert_eq!(index.value(), value % 2);
        let (dispatched, _) = ring.dispatch().unwrap();
        *ring.get_mut(dispatched).unwrap() += 10;
        ring.complete(dispatched).unwrap();
        assert_eq!(ring.pop_completed(), Some(value + 10));
    }
}

#[test]
fn random_completion_order() {
    let engine = start_test(file!());
    let mut ring = ReorderRing::new(engine.top(), "ring", 16).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    ring.reserve(16).unwrap();
    for value in 0..16 {
        ring.push_reserved(value).unwrap();
    }
    let mut indices = Vec::new();
    while let Some((index, _)) = ring.dispatch() {
        indices.push(index);
    }
    indices.shuffle(&mut rng);

    let mut removed = Vec::new();
    for index in indices {
        ring.complete(index).unwrap();
        while let Some(value) = ring.pop_completed() {
            removed.push(value);
        }
    }
    assert_eq!(removed, (0..16).collect::<Vec<_>>());
}

#[test]
fn capacity_is_enforced() {
    let engine = start_test(file!());
    let mut ring = ReorderRing::new(engine.top(), "ring", 2).unwrap();

    ring.reserve(1).unwrap();
    ring.push_reserved(1).unwrap();
    ring.reserve(1).unwrap();
    assert_eq!(ring.free(), 0);
    assert_eq!(
        ring.reserve(1).unwrap_err().to_string(),
        "Error: top::ring: reserve: cannot reserve 1 entries, only 0 free"
    );
    ring.release().unwrap();
    assert_eq!(ring.free(), 1);
    assert!(ring.push_reserved(2).is_err());
}

#[test]
fn completion_errors() {
    let engine = start_test(file!());
    let mut ring = ReorderRing::new(engine.top(), "ring", 2).unwrap();

    assert!(ring.complete(RingIndex::new(0)).is_err());

    ring.reserve(1).unwrap();
    let index = ring.push_reserved(1).unwrap();
    assert_eq!(
        ring.complete(index).unwrap_err().to_string(),
        "Error: top::ring: complete: entry 0 completed before dispatch"
    );

    ring.dispatch().unwrap();
    ring.complete(index).unwrap();
    assert_eq!(
        ring.complete(index).unwrap_err().to_string(),
        "Error: top::ring: complete: entry 0 completed twice"
    );
}
