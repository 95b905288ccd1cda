// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Named simulation entities.
//!
//! Every block of the rasterizer model owns an [`Entity`]. Entities form a
//! tree rooted at the [`toplevel`] entity and are named by their path from
//! the root, e.g. `top::rasterizer::setup`. The path is what the tracker
//! filters match against and what log lines and errors are prefixed with.

use std::fmt;
use std::rc::Rc;

use crate::{Id, Tracker, create, destroy};

/// Separator between the components of an entity path.
pub const PATH_SEPARATOR: &str = "::";

/// A node of the simulation hierarchy.
pub struct Entity {
    /// Local name of this entity within its parent.
    pub name: String,

    /// Enclosing entity; `None` only for the top-level.
    pub parent: Option<Rc<Entity>>,

    /// Unique identifier used for track events.
    pub id: Id,

    /// [`Tracker`] receiving the track events of this entity.
    pub tracker: Tracker,

    path: String,
}

impl Entity {
    /// Create an entity called `name` below `parent`, sharing its tracker.
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let path = format!("{}{PATH_SEPARATOR}{name}", parent.path);
        Self::register(Some(parent.clone()), name, path, parent.tracker.clone())
    }

    fn register(parent: Option<Rc<Entity>>, name: &str, path: String, tracker: Tracker) -> Self {
        let id = tracker.unique_id();
        tracker.add_entity(id, &path);
        let entity = Self {
            name: name.to_string(),
            parent,
            id,
            tracker,
            path,
        };
        create!(entity);
        entity
    }

    /// The path of this entity from the top-level.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.path
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        destroy!(self);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Create the root of an entity tree.
pub fn toplevel(tracker: &Tracker, name: &str) -> Rc<Entity> {
    Rc::new(Entity::register(
        None,
        name,
        name.to_string(),
        tracker.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::dev_null_tracker;

    #[test]
    fn paths_follow_the_hierarchy() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");
        let raster = Rc::new(Entity::new(&top, "rasterizer"));
        let setup = Entity::new(&raster, "setup");

        assert_eq!(setup.full_name(), "top::rasterizer::setup");
        assert_eq!(setup.name, "setup");
        assert_eq!(format!("{setup}"), "top::rasterizer::setup");
        assert_eq!(format!("{raster}"), "top::rasterizer");
        assert_eq!(setup.parent.as_ref().map(|p| p.id), Some(raster.id));
    }
}
