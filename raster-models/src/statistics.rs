// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Counters kept by the rasterizer stages.

use std::fmt;

use crate::types::CommandKind;

/// Number of commands of each kind received by a stage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandStatistics {
    pub reset: u64,
    pub draw: u64,
    pub end: u64,
    pub reg_write: u64,
    pub reg_read: u64,
    pub clear: u64,
}

impl CommandStatistics {
    pub fn record(&mut self, kind: &CommandKind) {
        match kind {
            CommandKind::Reset => self.reset += 1,
            CommandKind::Draw => self.draw += 1,
            CommandKind::End => self.end += 1,
            CommandKind::RegWrite { .. } => self.reg_write += 1,
            CommandKind::RegRead { .. } => self.reg_read += 1,
            CommandKind::ClearZStencilBuffer => self.clear += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.reset + self.draw + self.end + self.reg_write + self.reg_read + self.clear
    }
}

impl fmt::Display for CommandStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reset {}, draw {}, end {}, reg_write {}, reg_read {}, clear {}",
            self.reset, self.draw, self.end, self.reg_write, self.reg_read, self.clear
        )
    }
}

/// Upper bounds (exclusive, in pixels) of the triangle size buckets. The last
/// bucket holds everything larger.
pub const TRIANGLE_SIZE_BOUNDS: [f64; 7] = [1.0, 4.0, 16.0, 64.0, 256.0, 1024.0, 4096.0];

/// Index of the size bucket for a triangle covering `pixels`.
#[must_use]
pub fn size_bucket(pixels: f64) -> usize {
    TRIANGLE_SIZE_BOUNDS
        .iter()
        .position(|bound| pixels < *bound)
        .unwrap_or(TRIANGLE_SIZE_BOUNDS.len())
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SetupStatistics {
    pub inputs: u64,
    pub outputs: u64,
    pub requests: u64,
    pub culled: u64,
    pub front: u64,
    pub back: u64,
    /// Triangles that survive culling, by screen size.
    pub sizes: [u64; TRIANGLE_SIZE_BOUNDS.len() + 1],
    pub shader_dispatches: u64,
}

impl fmt::Display for SetupStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inputs {}, outputs {}, requested {}, culled {}, front {}, back {}, shaded {}, sizes {:?}",
            self.inputs,
            self.outputs,
            self.requests,
            self.culled,
            self.front,
            self.back,
            self.shader_dispatches,
            self.sizes
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TraversalStatistics {
    pub inputs: u64,
    pub requests: u64,
    pub batches: u64,
    pub stamps: u64,
    pub fragments: u64,
    pub covered: u64,
    pub msaa_stall_cycles: u64,
}

impl fmt::Display for TraversalStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inputs {}, requested {}, batches {}, stamps {}, fragments {}, covered {}, msaa stalls {}",
            self.inputs,
            self.requests,
            self.batches,
            self.stamps,
            self.fragments,
            self.covered,
            self.msaa_stall_cycles
        )
    }
}

/// Counters of the stages that pass stamps along.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StampStatistics {
    pub stamps_in: u64,
    pub stamps_out: u64,
    pub busy_cycles: u64,
    pub clear_cycles: u64,
}

impl fmt::Display for StampStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stamps in {}, stamps out {}, busy {}, clearing {}",
            self.stamps_in, self.stamps_out, self.busy_cycles, self.clear_cycles
        )
    }
}
