// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Map pixel positions to fragment processing units.
//!
//! The display is divided into scan tiles. Each scan tile is assigned to a
//! unit by interleaving the bits of its tile coordinates (within an
//! over-scan tile), which spreads neighbouring tiles across units.

use std::rc::Rc;

use raster_engine::sim_fatal;
use raster_engine::types::{SimError, SimResult};
use raster_track::debug;
use raster_track::entity::Entity;

use crate::geometry::morton;
use crate::types::{STAMP_HEIGHT, STAMP_WIDTH};

/// Tile hierarchy used to walk the display.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TileLayout {
    /// Generation tile size in stamps.
    pub generation: (u32, u32),

    /// Scan tile size in generation tiles.
    pub scan: (u32, u32),

    /// Over-scan tile size in scan tiles.
    pub over: (u32, u32),
}

impl Default for TileLayout {
    fn default() -> Self {
        Self {
            generation: (1, 1),
            scan: (16, 16),
            over: (128, 128),
        }
    }
}

pub struct PixelMapper {
    pub entity: Rc<Entity>,
    units: u32,
    h_res: u32,
    v_res: u32,
    samples: u32,
    scan_tile_width: u32,
    scan_tile_height: u32,
    over_width: u32,
    over_height: u32,
}

impl PixelMapper {
    pub fn new(parent: &Rc<Entity>, units: u32) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "pixel_mapper"));
        if units == 0 {
            return sim_fatal!(entity, "new" ; "at least one unit is required");
        }
        let layout = TileLayout::default();
        Ok(Self {
            entity,
            units,
            h_res: 0,
            v_res: 0,
            samples: 1,
            scan_tile_width: layout.scan.0 * layout.generation.0 * STAMP_WIDTH,
            scan_tile_height: layout.scan.1 * layout.generation.1 * STAMP_HEIGHT,
            over_width: layout.over.0,
            over_height: layout.over.1,
        })
    }

    /// Configure the display for the next draw.
    pub fn setup_display(
        &mut self,
        h_res: u32,
        v_res: u32,
        layout: &TileLayout,
        samples: u32,
    ) -> SimResult {
        let (gen_w, gen_h) = layout.generation;
        let dims = [gen_w, gen_h, layout.scan.0, layout.scan.1, layout.over.0, layout.over.1];
        if dims.contains(&0) {
            return sim_fatal!(self.entity, "setup_display" ; "tile dimensions must be non-zero");
        }
        match samples {
            1 => {}
            2 if gen_w >= 2 => {}
            4 if gen_w >= 2 && gen_h >= 2 => {}
            8 if gen_w >= 4 && gen_h >= 2 => {}
            2 | 4 | 8 => {
                return sim_fatal!(self.entity, "setup_display" ;
                    "generation tile of {gen_w}x{gen_h} stamps too small for {samples} samples");
            }
            _ => {
                return sim_fatal!(self.entity, "setup_display" ; "unsupported {samples} MSAA samples");
            }
        }

        self.h_res = h_res;
        self.v_res = v_res;
        self.samples = samples;
        self.scan_tile_width = layout.scan.0 * gen_w * STAMP_WIDTH;
        self.scan_tile_height = layout.scan.1 * gen_h * STAMP_HEIGHT;
        self.over_width = layout.over.0;
        self.over_height = layout.over.1;
        debug!(self.entity ; "display {h_res}x{v_res}, scan tile {}x{}, {samples} samples",
            self.scan_tile_width, self.scan_tile_height);
        Ok(())
    }

    /// Change the number of units fragments are distributed to.
    pub fn setup_unit(&mut self, units: u32) -> SimResult {
        if units == 0 {
            return sim_fatal!(self.entity, "setup_unit" ; "at least one unit is required");
        }
        self.units = units;
        Ok(())
    }

    #[must_use]
    pub fn units(&self) -> u32 {
        self.units
    }

    #[must_use]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    #[must_use]
    pub fn resolution(&self) -> (u32, u32) {
        (self.h_res, self.v_res)
    }

    /// The unit responsible for the pixel at `(x, y)`.
    #[must_use]
    pub fn map_to_unit(&self, x: u32, y: u32) -> u32 {
        let tile_x = (x / self.scan_tile_width) % self.over_width;
        let tile_y = (y / self.scan_tile_height) % self.over_height;
        morton(tile_x, tile_y) % self.units
    }
}

#[cfg(test)]
mod tests {
    use raster_engine::test_helpers::start_test;

    use super::*;

    #[test]
    fn interleaved_units() {
        let engine = start_test(file!());
        let mut mapper = PixelMapper::new(engine.top(), 4).unwrap();
        let layout = TileLayout {
            generation: (1, 1),
            scan: (1, 1),
            over: (128, 128),
        };
        mapper.setup_display(64, 64, &layout, 1).unwrap();

        // Scan tiles are a single stamp
        assert_eq!(mapper.map_to_unit(0, 0), 0);
        assert_eq!(mapper.map_to_unit(1, 1), 0);
        assert_eq!(mapper.map_to_unit(2, 0), 1);
        assert_eq!(mapper.map_to_unit(0, 2), 2);
        assert_eq!(mapper.map_to_unit(2, 2), 3);
        assert_eq!(mapper.map_to_unit(4, 0), 0);
    }

    #[test]
    fn single_unit() {
        let engine = start_test(file!());
        let mapper = PixelMapper::new(engine.top(), 1).unwrap();
        for (x, y) in [(0, 0), (17, 300), (399, 399)] {
            assert_eq!(mapper.map_to_unit(x, y), 0);
        }
    }

    #[test]
    fn msaa_needs_large_generation_tiles() {
        let engine = start_test(file!());
        let mut mapper = PixelMapper::new(engine.top(), 2).unwrap();
        let mut layout = TileLayout::default();
        assert!(mapper.setup_display(400, 400, &layout, 2).is_err());

        layout.generation = (2, 1);
        mapper.setup_display(400, 400, &layout, 2).unwrap();
        assert!(mapper.setup_display(400, 400, &layout, 4).is_err());

        layout.generation = (4, 2);
        mapper.setup_display(400, 400, &layout, 8).unwrap();
        assert_eq!(mapper.samples(), 8);

        assert_eq!(
            mapper.setup_display(400, 400, &layout, 3).unwrap_err().to_string(),
            "Error: top::pixel_mapper: setup_display: unsupported 3 MSAA samples"
        );
    }
}
