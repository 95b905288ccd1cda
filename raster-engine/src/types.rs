// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::traits::Clocked;

/// A simulation cycle number.
pub type Cycle = u64;

/// The type of a component that can be registered with the `Engine` so that it
/// is clocked once per cycle.
pub type Component = Rc<RefCell<dyn Clocked>>;

// Simulation errors

#[macro_export]
/// Build a [SimError] from a message that supports `to_string`
macro_rules! sim_error {
    ($msg:expr) => {
        Err($crate::types::SimError($msg.to_string()))
    };
}

#[macro_export]
/// Build a [SimError] reporting the entity, operation and message of a fatal
/// condition.
///
/// The message is formatted as `"<entity>: <operation>: <message>"`.
macro_rules! sim_fatal {
    ($entity:expr, $op:expr ; $($arg:tt)+) => {
        Err($crate::types::SimError(format!(
            "{}: {}: {}",
            $entity,
            $op,
            format_args!($($arg)+)
        )))
    };
}

/// The `SimError` is what should be returned in the case of an error
#[derive(Debug, Clone, PartialEq)]
pub struct SimError(pub String);

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}

impl Error for SimError {}

/// The SimResult is the return type for most simulation functions
pub type SimResult = Result<(), SimError>;
