// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Define the [`Track`] trait a number of [`Tracker`]s.

/// Include the multi-tracker.
pub mod multi_tracker;
/// Include the text-based tracker.
pub mod text;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

pub use multi_tracker::MultiTracker;
use regex::Regex;
pub use text::TextTracker;

use crate::{Id, ROOT};

/// Error used to return configuration errors
#[derive(Debug)]
pub struct TrackConfigError(pub String);

impl fmt::Display for TrackConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TrackConfigError {}

/// This is the interface that is supported by all [`Tracker`]s.
pub trait Track {
    /// Allocate a new global ID
    fn unique_id(&self) -> Id;

    /// Determine whether tracking is enabled, and at what level for an
    /// entity looked up by its ID.
    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool;

    /// Record an entity being created.
    fn add_entity(&self, id: Id, entity_name: &str);

    /// Track when an object with the given ID arrives.
    fn enter(&self, enter_into: Id, enter_obj: Id);

    /// Track when an object with the given ID leaves.
    fn exit(&self, exit_from: Id, exit_obj: Id);

    /// Track when an object with the given ID is created.
    fn create(&self, created_by: Id, created_obj: Id, name: &str);

    /// Track when an object with the given ID is destroyed.
    fn destroy(&self, destroyed_by: Id, destroyed_obj: Id);

    /// Track a log message of the given level.
    fn log(&self, msg_by: Id, level: log::Level, msg: std::fmt::Arguments);

    /// Advance the time to the specified simulation cycle.
    fn time(&self, set_by: Id, cycle: u64);

    /// Perform any pre-exit shutdown/cleanup
    fn shutdown(&self);
}

/// The type of a [`Tracker`] that is shared across entities.
pub type Tracker = Rc<dyn Track>;

/// Create a [`Tracker`] that prints all track events to `stdout`.
#[must_use]
pub fn stdout_tracker(level: log::Level) -> Tracker {
    let entity_manger = EntityManager::new(level);
    let stdout_writer = Box::new(std::io::BufWriter::new(io::stdout()));
    let tracker: Tracker = Rc::new(TextTracker::new(entity_manger, stdout_writer));
    tracker
}

/// A tracker that drops every event and reports every entity as disabled.
///
/// Used where tracking overhead would distort measurements, e.g. benchmarks.
pub struct DevNullTracker;

impl Track for DevNullTracker {
    fn unique_id(&self) -> Id {
        crate::NO_ID
    }
    fn is_entity_enabled(&self, _: Id, _: log::Level) -> bool {
        false
    }
    fn add_entity(&self, _: Id, _: &str) {}
    fn enter(&self, _: Id, _: Id) {}
    fn exit(&self, _: Id, _: Id) {}
    fn create(&self, _: Id, _: Id, _: &str) {}
    fn destroy(&self, _: Id, _: Id) {}
    fn log(&self, _: Id, _: log::Level, _: fmt::Arguments) {}
    fn time(&self, _: Id, _: u64) {}
    fn shutdown(&self) {}
}

/// Create a [`Tracker`] that suppresses all track events.
#[must_use]
pub fn dev_null_tracker() -> Tracker {
    Rc::new(DevNullTracker)
}

/// The [`EntityManager`] is responsible for determining entity log / trace
/// enable states.
///
/// This manager is also used to allocate unique [`Id`] values.
pub struct EntityManager {
    /// Level of tracking events to output.
    default_entity_level: log::Level,

    /// List of regular expressions mapping entity names to log levels.
    regex_to_entity_level: Vec<(Regex, log::Level)>,

    /// Used to assign unique IDs.
    unique_id: RefCell<u64>,

    /// Keep track of the current cycle.
    current_cycle: RefCell<u64>,

    /// Keep track of entities that have log levels different to the default.
    log_entity_lookup: RefCell<HashMap<Id, log::Level>>,
}

impl EntityManager {
    /// Constructor with default [`log::Level`]
    #[must_use]
    pub fn new(default_entity_level: log::Level) -> Self {
        Self {
            default_entity_level,
            regex_to_entity_level: Vec::new(),
            unique_id: RefCell::new(ROOT.0 + 1),
            current_cycle: RefCell::new(0),
            log_entity_lookup: RefCell::new(HashMap::new()),
        }
    }

    fn unique_id(&self) -> Id {
        let mut guard = self.unique_id.borrow_mut();
        let id = *guard;
        *guard += 1;
        Id(id)
    }

    fn is_log_enabled_at_level(&self, id: Id, level: log::Level) -> bool {
        match self.log_entity_lookup.borrow().get(&id) {
            None => level <= self.default_entity_level,
            Some(entity_level) => level <= *entity_level,
        }
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        let entity_level = self.log_level_for(entity_name);
        if entity_level != self.default_entity_level
            && self
                .log_entity_lookup
                .borrow_mut()
                .insert(id, entity_level)
                .is_some()
        {
            panic!("Entity ID {id} already seen ({entity_name})");
        }
    }

    fn log_level_for(&self, entity_name: &str) -> log::Level {
        for (regex, level) in &self.regex_to_entity_level {
            if regex.is_match(entity_name) {
                return *level;
            }
        }
        self.default_entity_level
    }

    /// Add a filter regular expression to set matching entites to a given
    /// level.
    ///
    /// # Example
    ///
    /// ```rust
    /// use raster_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(log::Level::Warn);
    /// manager.add_entity_level_filter(".*setup.*", log::Level::Trace).unwrap();
    /// ```
    pub fn add_entity_level_filter(
        &mut self,
        regex_str: &str,
        level: crate::log::Level,
    ) -> Result<(), TrackConfigError> {
        match Regex::new(regex_str) {
            Ok(regex) => self.regex_to_entity_level.push((regex, level)),
            Err(e) => {
                return Err(TrackConfigError(format!(
                    "Failed to parse regex {regex_str}:\n{e}\n"
                )));
            }
        }
        Ok(())
    }

    /// The last cycle reported to this manager.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        *self.current_cycle.borrow()
    }

    fn set_cycle(&self, new_cycle: u64) {
        let mut cycle_guard = self.current_cycle.borrow_mut();
        assert!(new_cycle >= *cycle_guard);
        *cycle_guard = new_cycle;
    }
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;

    const PATHS: [&str; 5] = [
        "top",
        "top::rasterizer",
        "top::rasterizer::setup",
        "top::rasterizer::setup::ring",
        "top::rasterizer::traversal",
    ];

    fn levels(filters: &[(&str, Level)]) -> Vec<Level> {
        let mut manager = EntityManager::new(Level::Error);
        for (regex, level) in filters {
            manager.add_entity_level_filter(regex, *level).unwrap();
        }
        PATHS.iter().map(|p| manager.log_level_for(p)).collect()
    }

    #[test]
    fn filtered_levels() {
        use Level::{Error, Info, Trace, Warn};

        assert_eq!(levels(&[]), [Error; 5]);
        assert_eq!(
            levels(&[(r".*rasterizer.*", Trace)]),
            [Error, Trace, Trace, Trace, Trace]
        );
        assert_eq!(
            levels(&[(r".*setup$", Warn)]),
            [Error, Error, Warn, Error, Error]
        );
        // The first matching filter wins
        assert_eq!(
            levels(&[(r".*setup.*", Warn), (r".*rasterizer.*", Info)]),
            [Error, Info, Warn, Warn, Info]
        );
    }

    #[test]
    fn cycle_is_tracked() {
        let manager = EntityManager::new(Level::Error);
        manager.set_cycle(3);
        manager.set_cycle(3);
        manager.set_cycle(10);
        assert_eq!(manager.cycle(), 10);
    }

    #[test]
    fn bad_regex() {
        let mut manager = EntityManager::new(Level::Error);
        assert!(manager.add_entity_level_filter(r"(", Level::Warn).is_err());
    }

    #[test]
    fn enabled_levels() {
        let mut manager = EntityManager::new(Level::Warn);
        manager
            .add_entity_level_filter(r".*traversal", Level::Debug)
            .unwrap();
        manager.add_entity(Id(10), "top::rasterizer::traversal");
        manager.add_entity(Id(11), "top::rasterizer::setup");

        assert!(manager.is_log_enabled_at_level(Id(10), Level::Debug));
        assert!(!manager.is_log_enabled_at_level(Id(10), Level::Trace));
        assert!(manager.is_log_enabled_at_level(Id(11), Level::Warn));
        assert!(!manager.is_log_enabled_at_level(Id(11), Level::Info));
    }

    #[test]
    fn ids() {
        let manager = EntityManager::new(Level::Error);
        for i in 0..10 {
            assert_eq!(manager.unique_id(), Id(i + ROOT.0 + 1));
        }
    }
}
