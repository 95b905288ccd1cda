// Copyright (c) 2020 Graphcore Ltd. All rights reserved.

//! Ensure that all version of each macro can be used

use std::io::Read;
use std::rc::Rc;

use raster_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use raster_track::entity::{Entity, toplevel};
use raster_track::{
    Id, Track, create_and_track_id, debug, destroy_id, enter, error, exit, info, set_time,
    test_helpers, test_init, trace, warn,
};

macro_rules! build_with_entity {
    ($name:ident, $macro:ident, $slvl:expr) => (
        #[test]
        fn $name() {
            let (test_tracker, tracker) = test_init!(100);

            let top = toplevel(&tracker, "top");
            test_helpers::check_and_clear(&test_tracker, &["0: created 100, top"]);
            assert_eq!(top.id, Id(100));

            $macro!(top ; "Loc with no args");
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with no args")]);

            $macro!(top ; "Loc with {} argument", 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with 1 argument")]);

            $macro!(top ; "Loc with {}, {} arguments", 1, 1 + 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl,": Loc with 1, 2 arguments")]);

            drop(top);
            test_helpers::check_and_clear(&test_tracker, &["100: destroyed 0"]);
        }
    );
}

build_with_entity!(trace_with_entity, trace, "TRACE");
build_with_entity!(info_with_entity, info, "INFO");
build_with_entity!(debug_with_entity, debug, "DEBUG");
build_with_entity!(warn_with_entity, warn, "WARN");
build_with_entity!(error_with_entity, error, "ERROR");

#[test]
fn create_destroy() {
    let (test_tracker, tracker) = test_init!(10);

    let top = toplevel(&tracker, "top");
    test_helpers::check_and_clear(&test_tracker, &["0: created 10, top"]);

    let id1 = create_and_track_id!(top ; "command");
    test_helpers::check_and_clear(&test_tracker, &["10: created 11, command"]);
    assert_eq!(id1, Id(11));

    destroy_id!(top ; id1);
    test_helpers::check_and_clear(&test_tracker, &["10: destroyed 11"]);

    let child = Entity::new(&top, "child");
    test_helpers::check_and_clear(&test_tracker, &["10: created 12, top::child"]);
    drop(child);
    test_helpers::check_and_clear(&test_tracker, &["12: destroyed 10"]);
}

#[test]
fn enter_exit_basics() {
    let (test_tracker, tracker) = test_init!(40);

    let top = toplevel(&tracker, "top");
    let obj = create_and_track_id!(top ; "triangle");
    enter!(top ; obj);
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 40, top",
            "40: created 41, triangle",
            "40: 41 entered",
        ],
    );

    exit!(top ; obj);
    test_helpers::check_and_clear(&test_tracker, &["40: 41 exited"]);
}

#[test]
fn set_cycle() {
    let (test_tracker, tracker) = test_init!(1);
    let top = toplevel(&tracker, "top");
    test_helpers::clear(&test_tracker);

    set_time!(top ; 42);
    test_helpers::check_and_clear(&test_tracker, &["1: set cycle 42"]);
}

#[test]
fn log_file_filtering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raster.log");
    let path_str = path.to_string_lossy().into_owned();

    {
        let config = TrackersConfig {
            stdout: TrackerConfig {
                enable: false,
                ..Default::default()
            },
            log_file: TrackerConfig {
                enable: true,
                level: raster_track::log::Level::Debug,
                filter_regex: ".*setup",
                file: Some(&path_str),
            },
        };
        let tracker = setup_trackers(&config).unwrap();
        let top = toplevel(&tracker, "top");
        let setup = Rc::new(Entity::new(&top, "setup"));
        let traversal = Entity::new(&top, "traversal");

        debug!(setup ; "visible");
        debug!(traversal ; "hidden");
        error!(traversal ; "always");
        tracker.shutdown();
    }

    let mut contents = String::new();
    std::fs::File::open(&path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert!(contents.contains("DEBUG: visible"));
    assert!(!contents.contains("hidden"));
    assert!(contents.contains("ERROR: always"));
}
