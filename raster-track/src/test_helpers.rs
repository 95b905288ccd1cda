// Copyright (c) 2020 Graphcore Ltd. All rights reserved.

//! This module provides helper functions for testing logging output
//!
//! The aim of this module is to provide commonly-used functions that enable the
//! testing of the output that should appear from logging macros.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use regex::Regex;

use crate::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use crate::{Id, Track, Tracker, str_to_level};

/// Environment variable used to set the level of tracking in tests.
pub const TEST_LEVEL_ENV: &str = "RASTER_TEST_LEVEL";

/// Environment variable naming a directory to write per-test logs to.
pub const TEST_LOG_DIR_ENV: &str = "RASTER_TEST_LOG_DIR";

/// A tracker that keeps track events.
pub struct TestTracker {
    events: RefCell<Vec<String>>,

    unique_id: Cell<u64>,
}

impl TestTracker {
    /// Create a new [`Tracker`](crate::Tracker) for the tests.
    ///
    /// This keeps the track events in memory for checking later.
    #[must_use]
    pub fn new(initial_id: u64) -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            unique_id: Cell::new(initial_id),
        }
    }

    fn add_event(&self, event: String) {
        println!("{event}");
        self.events.borrow_mut().push(event);
    }

    /// Return all the events seen since the last clear.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl Track for TestTracker {
    fn unique_id(&self) -> Id {
        let id = self.unique_id.get();
        self.unique_id.set(id + 1);
        Id(id)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        true
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {
        // Do nothing
    }

    fn enter(&self, id: Id, item: Id) {
        self.add_event(format!("{id}: {item} entered"));
    }

    fn exit(&self, id: Id, item: Id) {
        self.add_event(format!("{id}: {item} exited"));
    }

    fn create(&self, created_by: Id, id: Id, name: &str) {
        self.add_event(format!("{created_by}: created {id}, {name}"));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.add_event(format!("{destroyed_by}: destroyed {id}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: std::fmt::Arguments) {
        self.add_event(format!("{id}:{level}: {msg}"));
    }

    fn time(&self, set_by: Id, cycle: u64) {
        self.add_event(format!("{set_by}: set cycle {cycle}"));
    }

    fn shutdown(&self) {
        // Do nothing
    }
}

/// Create the tracker used by integration tests.
///
/// By default this is a stdout tracker at `Warn` level. The level can be
/// changed with the `RASTER_TEST_LEVEL` environment variable and the output
/// sent to `<dir>/<test file stem>.log` by setting `RASTER_TEST_LOG_DIR`.
#[must_use]
pub fn create_tracker(full_filepath: &str) -> Tracker {
    let level = std::env::var(TEST_LEVEL_ENV)
        .map(|lvl| str_to_level(&lvl))
        .unwrap_or(log::Level::Warn);

    let log_file = std::env::var(TEST_LOG_DIR_ENV).ok().map(|dir| {
        let stem = Path::new(full_filepath)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "test".to_string());
        Path::new(&dir)
            .join(format!("{stem}.log"))
            .to_string_lossy()
            .into_owned()
    });

    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: log_file.is_none(),
            level,
            filter_regex: "",
            file: None,
        },
        log_file: TrackerConfig {
            enable: log_file.is_some(),
            level,
            filter_regex: "",
            file: log_file.as_deref(),
        },
    };
    setup_trackers(&config).unwrap()
}

/// Initialise the tracking system for tests
///
/// Creates a [`TestTracker`] that records all _log_ and _trace_ events and
/// returns it along with the same object as a [`Tracker`](crate::Tracker).
///
/// # Arguments
///
/// * `start_id` - The ID value to be set as the starting value
///
/// # Examples
///
/// ```
/// use raster_track::test_helpers;
///
/// let (test_tracker, tracker) = raster_track::test_init!(10);
/// let top = raster_track::entity::toplevel(&tracker, "top");
/// test_helpers::check_and_clear(&test_tracker, &["0: created 10, top"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($start_id:expr) => {{
        let test_tracker = std::rc::Rc::new($crate::test_helpers::TestTracker::new($start_id));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Check and clear the _trace_ and _log_ output
///
/// This function asserts that the output lines seen since the start or the
/// last time this function was called match the expected regular expressions.
/// It then clears the recorded output.
///
/// # Arguments
///
/// * `tracker`  - A reference to the [`TestTracker`] being used in the test.
/// * `expected` - An array of expected regular expressions that the output will
///   be matched against.
pub fn check_and_clear(tracker: &Rc<TestTracker>, expected: &[&str]) {
    let mut log_contents_ref = tracker.events.borrow_mut();

    println!("Checking {:?} matches {:?}", expected, *log_contents_ref);

    let num_strings = expected.len();
    assert_eq!(num_strings, log_contents_ref.len());

    for (i, log_expect) in expected.iter().enumerate() {
        let re = Regex::new(log_expect).unwrap();
        let actual = &log_contents_ref[i];
        println!("Checking {i}: {log_expect:?} matches {actual:?}");
        assert!(re.is_match(actual));
    }

    log_contents_ref.clear();
}

/// Remove any recorded output without checking it.
pub fn clear(tracker: &Rc<TestTracker>) {
    tracker.events.borrow_mut().clear();
}
