// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub use log;

use crate::tracker::{EntityManager, Track};
use crate::{Id, SharedWriter, Writer};

/// Writes track events as text lines, one event per line.
///
/// Each line starts with the last simulation cycle the tracker was told
/// about and the full name of the entity that emitted the event, so a log
/// line reads as:
///
/// ```text
/// [1042] top::rasterizer::setup:DEBUG: triangle 17 culled
/// ```
///
/// Tracked objects created while the tracker is listening are shown by name
/// when they enter or leave an entity.
pub struct TextTracker {
    entity_manager: EntityManager,
    writer: SharedWriter,
    entities: RefCell<HashMap<Id, String>>,
    objects: RefCell<HashMap<Id, String>>,
}

impl TextTracker {
    /// Create a new [`TextTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: EntityManager, writer: Writer) -> Self {
        Self {
            entity_manager,
            writer: Rc::new(RefCell::new(writer)),
            entities: RefCell::new(HashMap::new()),
            objects: RefCell::new(HashMap::new()),
        }
    }

    fn name_of(&self, id: Id) -> String {
        if let Some(name) = self.entities.borrow().get(&id) {
            return name.clone();
        }
        match self.objects.borrow().get(&id) {
            Some(name) => format!("{name}#{id}"),
            None => id.to_string(),
        }
    }

    fn emit(&self, by: Id, event: fmt::Arguments) {
        let line = format!(
            "[{}] {}{event}\n",
            self.entity_manager.cycle(),
            self.name_of(by)
        );
        // Losing the log stream is not a simulation error
        let _ = self.writer.borrow_mut().write_all(line.as_bytes());
    }
}

impl Track for TextTracker {
    fn unique_id(&self) -> Id {
        self.entity_manager.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.entity_manager.is_log_enabled_at_level(id, level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.entity_manager.add_entity(id, entity_name);
        self.entities
            .borrow_mut()
            .insert(id, entity_name.to_string());
    }

    fn enter(&self, id: Id, object: Id) {
        let object = self.name_of(object);
        self.emit(id, format_args!(": enter {object}"));
    }

    fn exit(&self, id: Id, object: Id) {
        let object = self.name_of(object);
        self.emit(id, format_args!(": exit {object}"));
    }

    fn create(&self, created_by: Id, id: Id, name: &str) {
        self.emit(created_by, format_args!(": created {name} ({id})"));
        self.objects.borrow_mut().insert(id, name.to_string());
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        let object = self.name_of(id);
        self.emit(destroyed_by, format_args!(": destroyed {object}"));
        self.objects.borrow_mut().remove(&id);
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.emit(id, format_args!(":{level}: {msg}"));
    }

    fn time(&self, _set_by: Id, cycle: u64) {
        self.entity_manager.set_cycle(cycle);
    }

    fn shutdown(&self) {
        let _ = self.writer.borrow_mut().flush();
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.borrow())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn text_tracker() -> (TextTracker, Capture) {
        let capture = Capture::default();
        let tracker = TextTracker::new(
            EntityManager::new(log::Level::Trace),
            Box::new(capture.clone()),
        );
        (tracker, capture)
    }

    #[test]
    fn lines_carry_cycle_and_entity_name() {
        let (tracker, capture) = text_tracker();
        tracker.add_entity(Id(5), "top::rasterizer::setup");
        tracker.log(Id(5), log::Level::Debug, format_args!("culled {}", 3));
        tracker.time(Id(1), 12);
        tracker.log(Id(5), log::Level::Warn, format_args!("stalled"));
        tracker.log(Id(9), log::Level::Info, format_args!("unnamed"));

        assert_eq!(
            capture.lines(),
            vec![
                "[0] top::rasterizer::setup:DEBUG: culled 3",
                "[12] top::rasterizer::setup:WARN: stalled",
                "[12] 9:INFO: unnamed",
            ]
        );
    }

    #[test]
    fn tracked_objects_are_named_until_destroyed() {
        let (tracker, capture) = text_tracker();
        tracker.add_entity(Id(2), "top::source");
        tracker.add_entity(Id(3), "top::rasterizer");
        tracker.create(Id(2), Id(40), "triangle");
        tracker.enter(Id(3), Id(40));
        tracker.exit(Id(3), Id(40));
        tracker.destroy(Id(3), Id(40));
        tracker.enter(Id(3), Id(40));

        assert_eq!(
            capture.lines(),
            vec![
                "[0] top::source: created triangle (40)",
                "[0] top::rasterizer: enter triangle#40",
                "[0] top::rasterizer: exit triangle#40",
                "[0] top::rasterizer: destroyed triangle#40",
                "[0] top::rasterizer: enter 40",
            ]
        );
    }
}
