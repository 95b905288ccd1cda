// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

use std::fmt;

use crate::Id;
use crate::tracker::{EntityManager, Track, Tracker};

/// Forwards every event to a set of [`Tracker`]s, such as the stdout and the
/// log file trackers of a simulation.
///
/// Each tracker applies its own entity filters: an event only reaches the
/// trackers that have the emitting entity enabled at the event's level.
/// Object events (enter/exit/create/destroy) and time updates count as
/// [`log::Level::Trace`].
pub struct MultiTracker {
    ids: EntityManager,
    trackers: Vec<Tracker>,
}

impl MultiTracker {
    /// Add a new tracker
    pub fn add_tracker(&mut self, tracker: Tracker) {
        self.trackers.push(tracker);
    }

    fn forward(&self, by: Id, level: log::Level, f: impl Fn(&Tracker)) {
        self.trackers
            .iter()
            .filter(|tracker| tracker.is_entity_enabled(by, level))
            .for_each(f);
    }
}

impl Default for MultiTracker {
    fn default() -> Self {
        Self {
            ids: EntityManager::new(log::Level::Error),
            trackers: Vec::new(),
        }
    }
}

impl Track for MultiTracker {
    fn unique_id(&self) -> Id {
        self.ids.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.trackers
            .iter()
            .any(|tracker| tracker.is_entity_enabled(id, level))
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.trackers
            .iter()
            .for_each(|tracker| tracker.add_entity(id, entity_name));
    }

    fn enter(&self, id: Id, object: Id) {
        self.forward(id, log::Level::Trace, |t| t.enter(id, object));
    }

    fn exit(&self, id: Id, object: Id) {
        self.forward(id, log::Level::Trace, |t| t.exit(id, object));
    }

    fn create(&self, created_by: Id, id: Id, name: &str) {
        self.forward(created_by, log::Level::Trace, |t| {
            t.create(created_by, id, name);
        });
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.forward(destroyed_by, log::Level::Trace, |t| {
            t.destroy(destroyed_by, id);
        });
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.forward(id, level, |t| t.log(id, level, msg));
    }

    fn time(&self, set_by: Id, cycle: u64) {
        // Every tracker prefixes its lines with the cycle so all need it
        self.trackers
            .iter()
            .for_each(|tracker| tracker.time(set_by, cycle));
    }

    fn shutdown(&self) {
        self.trackers.iter().for_each(|tracker| tracker.shutdown());
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::test_helpers::TestTracker;

    #[test]
    fn events_reach_enabled_trackers_only() {
        let first = Rc::new(TestTracker::new(1));
        let second = Rc::new(TestTracker::new(1));
        let mut multi = MultiTracker::default();
        multi.add_tracker(first.clone());
        multi.add_tracker(second.clone());
        multi.add_tracker(crate::tracker::dev_null_tracker());

        assert!(multi.is_entity_enabled(Id(3), log::Level::Trace));
        multi.log(Id(3), log::Level::Info, format_args!("drawn"));
        multi.time(Id(1), 7);
        multi.enter(Id(3), Id(9));

        for tracker in [&first, &second] {
            assert_eq!(
                tracker.events(),
                vec!["3:INFO: drawn", "1: set cycle 7", "3: 9 entered"]
            );
        }
    }
}
