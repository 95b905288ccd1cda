// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Configuration of the rasterizer.
//!
//! A single [RasterizerConfig] describes the whole rasterizer. Each stage
//! takes the part that concerns it and checks it when constructed.

use raster_emulator::pixel_mapper::TileLayout;
use raster_engine::sim_fatal;
use raster_engine::types::{Cycle, SimResult};
use raster_track::entity::Entity;
use serde::{Deserialize, Serialize};

#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RasterizationStrategy {
    #[default]
    /// Traverse batches of triangles tile by tile
    Recursive,

    /// Traverse one triangle at a time row by row
    Scanline,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RasterizerConfig {
    pub strategy: RasterizationStrategy,

    /// Triangles requested, setup and sent per cycle.
    pub triangles_cycle: usize,

    /// Dedicated setup units. Must match `triangles_cycle`.
    pub setup_units: usize,

    /// Entries in the setup FIFO.
    pub setup_fifo_size: usize,

    /// Cycles between two triangles starting on the dedicated setup units.
    pub setup_start_latency: Cycle,

    /// Cycles a triangle spends in the dedicated setup units.
    pub setup_latency: Cycle,

    /// Latency of the triangle bus into setup.
    pub triangle_input_latency: Cycle,

    /// Latency of the requests from setup to the triangle producer.
    pub triangle_request_latency: Cycle,

    /// Latency of the setup triangle bus into traversal.
    pub setup_output_latency: Cycle,

    /// Latency of the requests from traversal to setup.
    pub setup_request_latency: Cycle,

    /// Perform triangle setup on the shader pool.
    pub shader_setup: bool,

    /// The GPU has unified shaders. Required for `shader_setup`.
    pub unified_shaders: bool,

    /// Entries in the reorder ring of triangles sent to the shader pool.
    pub triangle_shader_queue_size: usize,

    /// Latency of the signals between setup and the shader pool.
    pub shader_signal_latency: Cycle,

    /// Triangles arrive already bound to the emulator.
    pub pre_triangle_bound: bool,

    /// Stamps generated per cycle.
    pub stamps_cycle: usize,

    /// Stamp units fragments are distributed to.
    pub num_stamp_units: usize,

    /// MSAA samples generated per cycle.
    pub samples_cycle: u32,

    /// Triangles traversed together in recursive mode.
    pub batch_size: usize,

    /// Entries in the traversal triangle queue.
    pub batch_queue_size: usize,

    /// Generation tile in stamps.
    pub generation_tile: (u32, u32),

    /// Scan tile in generation tiles.
    pub scan_tile: (u32, u32),

    /// Over-scan tile in scan tiles.
    pub over_tile: (u32, u32),

    /// Latency of the stamp buses between the fragment stages.
    pub stamp_latency: Cycle,

    /// Stamps buffered in Hierarchical Z.
    pub hz_queue_size: usize,

    /// Stamps covered by one Hierarchical Z block.
    pub hz_block_stamps: u32,

    /// Hierarchical Z blocks cleared per cycle.
    pub clear_blocks_cycle: u32,

    /// Stamps buffered per stamp unit in the fragment FIFO.
    pub fragment_fifo_queue_size: usize,

    /// Attributes interpolated per cycle.
    pub interpolators: u32,

    /// Base latency of the interpolator.
    pub interpolation_latency: Cycle,

    /// Latency of the fragment output of the rasterizer.
    pub fragment_latency: Cycle,

    /// Latency of the command signals to the children.
    pub command_latency: Cycle,

    /// Latency of the state signals from the children.
    pub state_latency: Cycle,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            strategy: RasterizationStrategy::Recursive,
            triangles_cycle: 1,
            setup_units: 1,
            setup_fifo_size: 32,
            setup_start_latency: 6,
            setup_latency: 10,
            triangle_input_latency: 2,
            triangle_request_latency: 1,
            setup_output_latency: 2,
            setup_request_latency: 1,
            shader_setup: false,
            unified_shaders: true,
            triangle_shader_queue_size: 8,
            shader_signal_latency: 1,
            pre_triangle_bound: false,
            stamps_cycle: 4,
            num_stamp_units: 4,
            samples_cycle: 8,
            batch_size: 4,
            batch_queue_size: 16,
            generation_tile: (4, 2),
            scan_tile: (4, 8),
            over_tile: (128, 128),
            stamp_latency: 1,
            hz_queue_size: 64,
            hz_block_stamps: 16,
            clear_blocks_cycle: 256,
            fragment_fifo_queue_size: 16,
            interpolators: 4,
            interpolation_latency: 2,
            fragment_latency: 1,
            command_latency: 1,
            state_latency: 1,
        }
    }
}

impl RasterizerConfig {
    /// Batches are always a single triangle in scanline mode.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        match self.strategy {
            RasterizationStrategy::Recursive => self.batch_size,
            RasterizationStrategy::Scanline => 1,
        }
    }

    /// Stamps that can be in flight towards a stage that reports itself as
    /// ready.
    #[must_use]
    pub fn stamp_margin(&self) -> usize {
        (self.stamp_latency as usize + 1) * self.stamps_cycle
    }

    #[must_use]
    pub fn tile_layout(&self) -> TileLayout {
        TileLayout {
            generation: self.generation_tile,
            scan: self.scan_tile,
            over: self.over_tile,
        }
    }

    /// Check the parameters shared between stages.
    pub fn validate(&self, entity: &Entity) -> SimResult {
        if self.stamps_cycle < self.num_stamp_units {
            return sim_fatal!(entity, "validate" ;
                "stamps per cycle ({}) less than stamp units ({})", self.stamps_cycle, self.num_stamp_units);
        }
        if self.num_stamp_units == 0 {
            return sim_fatal!(entity, "validate" ; "at least one stamp unit is required");
        }
        if self.shader_setup && !self.unified_shaders {
            return sim_fatal!(entity, "validate" ; "shader setup requires unified shaders");
        }
        let latencies = [
            ("setup_start_latency", self.setup_start_latency),
            ("setup_latency", self.setup_latency),
            ("triangle_input_latency", self.triangle_input_latency),
            ("triangle_request_latency", self.triangle_request_latency),
            ("setup_output_latency", self.setup_output_latency),
            ("setup_request_latency", self.setup_request_latency),
            ("shader_signal_latency", self.shader_signal_latency),
            ("stamp_latency", self.stamp_latency),
            ("fragment_latency", self.fragment_latency),
            ("command_latency", self.command_latency),
            ("state_latency", self.state_latency),
        ];
        for (name, latency) in latencies {
            if latency == 0 {
                return sim_fatal!(entity, "validate" ; "{name} must be non-zero");
            }
        }
        Ok(())
    }
}

/// Parameters of Triangle Setup.
#[derive(Clone, Debug, PartialEq)]
pub struct SetupConfig {
    pub triangles_cycle: usize,
    pub setup_units: usize,
    pub fifo_size: usize,
    pub start_latency: Cycle,
    pub setup_latency: Cycle,
    pub input_latency: Cycle,
    pub shader_setup: bool,
    pub shader_queue_size: usize,
    pub pre_triangle_bound: bool,
}

impl From<&RasterizerConfig> for SetupConfig {
    fn from(config: &RasterizerConfig) -> Self {
        Self {
            triangles_cycle: config.triangles_cycle,
            setup_units: config.setup_units,
            fifo_size: config.setup_fifo_size,
            start_latency: config.setup_start_latency,
            setup_latency: config.setup_latency,
            input_latency: config.triangle_input_latency,
            shader_setup: config.shader_setup,
            shader_queue_size: config.triangle_shader_queue_size,
            pre_triangle_bound: config.pre_triangle_bound,
        }
    }
}

impl SetupConfig {
    pub fn validate(&self, entity: &Entity) -> SimResult {
        if self.triangles_cycle == 0 {
            return sim_fatal!(entity, "validate" ; "triangles per cycle must be non-zero");
        }
        if self.triangles_cycle != self.setup_units {
            return sim_fatal!(entity, "validate" ;
                "triangles per cycle ({}) must match setup units ({})", self.triangles_cycle, self.setup_units);
        }
        let in_flight = (self.input_latency as usize + 1) * self.triangles_cycle;
        if self.fifo_size <= in_flight {
            return sim_fatal!(entity, "validate" ;
                "setup FIFO of {} entries cannot cover {in_flight} triangles in flight", self.fifo_size);
        }
        if self.shader_setup && self.shader_queue_size == 0 {
            return sim_fatal!(entity, "validate" ; "shader setup requires a triangle shader queue");
        }
        if self.start_latency == 0 {
            return sim_fatal!(entity, "validate" ; "setup start latency must be non-zero");
        }
        Ok(())
    }
}

/// Parameters of Triangle Traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct TraversalConfig {
    pub strategy: RasterizationStrategy,
    pub triangles_cycle: usize,
    pub stamps_cycle: usize,
    pub num_stamp_units: usize,
    pub samples_cycle: u32,
    pub batch_size: usize,
    pub queue_size: usize,
    pub layout: TileLayout,
}

impl From<&RasterizerConfig> for TraversalConfig {
    fn from(config: &RasterizerConfig) -> Self {
        Self {
            strategy: config.strategy,
            triangles_cycle: config.triangles_cycle,
            stamps_cycle: config.stamps_cycle,
            num_stamp_units: config.num_stamp_units,
            samples_cycle: config.samples_cycle,
            batch_size: config.effective_batch_size(),
            queue_size: config.batch_queue_size,
            layout: config.tile_layout(),
        }
    }
}

impl TraversalConfig {
    pub fn validate(&self, entity: &Entity) -> SimResult {
        if ![2, 4, 8].contains(&self.samples_cycle) {
            return sim_fatal!(entity, "validate" ;
                "unsupported {} MSAA samples per cycle", self.samples_cycle);
        }
        if self.batch_size == 0 || self.stamps_cycle == 0 {
            return sim_fatal!(entity, "validate" ; "batch size and stamps per cycle must be non-zero");
        }
        if self.queue_size < self.triangles_cycle {
            return sim_fatal!(entity, "validate" ;
                "triangle queue of {} entries smaller than {} triangles per cycle", self.queue_size, self.triangles_cycle);
        }
        if self.strategy == RasterizationStrategy::Recursive && self.queue_size < 2 * self.batch_size {
            return sim_fatal!(entity, "validate" ;
                "triangle queue of {} entries cannot hold two batches of {}", self.queue_size, self.batch_size);
        }
        Ok(())
    }
}

/// Parameters of Hierarchical Z.
#[derive(Clone, Debug, PartialEq)]
pub struct HierarchicalZConfig {
    pub queue_size: usize,
    pub stamps_cycle: usize,
    pub margin: usize,
    pub block_stamps: u32,
    pub clear_blocks_cycle: u32,
}

impl From<&RasterizerConfig> for HierarchicalZConfig {
    fn from(config: &RasterizerConfig) -> Self {
        Self {
            queue_size: config.hz_queue_size,
            stamps_cycle: config.stamps_cycle,
            margin: config.stamp_margin(),
            block_stamps: config.hz_block_stamps,
            clear_blocks_cycle: config.clear_blocks_cycle,
        }
    }
}

impl HierarchicalZConfig {
    pub fn validate(&self, entity: &Entity) -> SimResult {
        if self.queue_size < self.margin {
            return sim_fatal!(entity, "validate" ;
                "stamp queue of {} entries cannot cover {} stamps in flight", self.queue_size, self.margin);
        }
        if self.block_stamps == 0 || self.clear_blocks_cycle == 0 {
            return sim_fatal!(entity, "validate" ; "clear parameters must be non-zero");
        }
        Ok(())
    }
}

/// Parameters of the Fragment FIFO.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentFifoConfig {
    pub units: usize,
    pub queue_size: usize,
    pub stamps_cycle: usize,
    pub margin: usize,
}

impl From<&RasterizerConfig> for FragmentFifoConfig {
    fn from(config: &RasterizerConfig) -> Self {
        Self {
            units: config.num_stamp_units,
            queue_size: config.fragment_fifo_queue_size,
            stamps_cycle: config.stamps_cycle,
            margin: config.stamp_margin(),
        }
    }
}

impl FragmentFifoConfig {
    pub fn validate(&self, entity: &Entity) -> SimResult {
        if self.queue_size < self.margin {
            return sim_fatal!(entity, "validate" ;
                "unit queues of {} entries cannot cover {} stamps in flight", self.queue_size, self.margin);
        }
        Ok(())
    }
}

/// Parameters of the Interpolator.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolatorConfig {
    pub interpolators: u32,
    pub latency: Cycle,
    pub stamps_cycle: usize,
}

impl From<&RasterizerConfig> for InterpolatorConfig {
    fn from(config: &RasterizerConfig) -> Self {
        Self {
            interpolators: config.interpolators,
            latency: config.interpolation_latency,
            stamps_cycle: config.stamps_cycle,
        }
    }
}

impl InterpolatorConfig {
    pub fn validate(&self, entity: &Entity) -> SimResult {
        if self.interpolators == 0 {
            return sim_fatal!(entity, "validate" ; "at least one interpolator is required");
        }
        Ok(())
    }
}
