// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Stamp visiting order over a triangle's bounding box.

use crate::geometry::demorton;
use crate::types::{STAMP_HEIGHT, STAMP_WIDTH, TILE_SIZE};

/// Stamps per tile side.
const TILE_STAMPS: u32 = TILE_SIZE / STAMP_WIDTH;

/// Order in which the stamps of a bounding box are visited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WalkOrder {
    /// Row by row.
    Scanline,

    /// Tile by tile, with the stamps of each tile in Morton order.
    Tiled,
}

/// Pixel-space bounding box, `max` exclusive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }
}

/// Walks the stamp positions of a bounding box.
#[derive(Clone, Debug)]
pub struct StampWalker {
    order: WalkOrder,
    origin: (u32, u32),
    stamps_x: u32,
    stamps_y: u32,
    tiles_x: u32,
    index: u32,
    count: u32,
}

impl StampWalker {
    /// The walk starts on the stamp grid, so `bbox` is extended down to the
    /// nearest even coordinates.
    #[must_use]
    pub fn new(bbox: BoundingBox, order: WalkOrder) -> Self {
        if bbox.is_empty() {
            return Self {
                order,
                origin: (bbox.min_x, bbox.min_y),
                stamps_x: 0,
                stamps_y: 0,
                tiles_x: 0,
                index: 0,
                count: 0,
            };
        }

        let origin = (
            bbox.min_x - bbox.min_x % STAMP_WIDTH,
            bbox.min_y - bbox.min_y % STAMP_HEIGHT,
        );
        let stamps_x = (bbox.max_x - origin.0).div_ceil(STAMP_WIDTH);
        let stamps_y = (bbox.max_y - origin.1).div_ceil(STAMP_HEIGHT);
        let tiles_x = stamps_x.div_ceil(TILE_STAMPS);
        let count = match order {
            WalkOrder::Scanline => stamps_x * stamps_y,
            WalkOrder::Tiled => tiles_x * stamps_y.div_ceil(TILE_STAMPS) * TILE_STAMPS * TILE_STAMPS,
        };
        Self {
            order,
            origin,
            stamps_x,
            stamps_y,
            tiles_x,
            index: 0,
            count,
        }
    }

    /// Pixel position of the top-left fragment of the stamp at `index`, or
    /// `None` if that index falls outside the box.
    fn stamp_at(&self, index: u32) -> Option<(u32, u32)> {
        let (sx, sy) = match self.order {
            WalkOrder::Scanline => (index % self.stamps_x, index / self.stamps_x),
            WalkOrder::Tiled => {
                let per_tile = TILE_STAMPS * TILE_STAMPS;
                let tile = index / per_tile;
                let (mx, my) = demorton(index % per_tile);
                (
                    (tile % self.tiles_x) * TILE_STAMPS + mx,
                    (tile / self.tiles_x) * TILE_STAMPS + my,
                )
            }
        };
        if sx >= self.stamps_x || sy >= self.stamps_y {
            return None;
        }
        Some((
            self.origin.0 + sx * STAMP_WIDTH,
            self.origin.1 + sy * STAMP_HEIGHT,
        ))
    }

    /// Origin of the walked area, used for the empty stamp of a triangle with
    /// no coverage.
    #[must_use]
    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }
}

impl Iterator for StampWalker {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.count {
            let index = self.index;
            self.index += 1;
            if let Some(position) = self.stamp_at(index) {
                return Some(position);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[test]
    fn scanline_order() {
        let positions: Vec<_> = StampWalker::new(bbox(1, 0, 5, 4), WalkOrder::Scanline).collect();
        assert_eq!(
            positions,
            vec![(0, 0), (2, 0), (4, 0), (0, 2), (2, 2), (4, 2)]
        );
    }

    #[test]
    fn tiled_order_visits_every_stamp_once() {
        let walker = StampWalker::new(bbox(0, 0, 20, 10), WalkOrder::Tiled);
        let mut positions: Vec<_> = walker.collect();
        assert_eq!(positions.len(), 10 * 5);

        // Morton order within the first tile
        assert_eq!(&positions[..4], &[(0, 0), (2, 0), (0, 2), (2, 2)]);

        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions.len(), 50);
    }

    #[test]
    fn stamps_outside_the_box_are_skipped() {
        // One stamp wide, so most of the first tile is padding
        let walker = StampWalker::new(bbox(6, 2, 8, 6), WalkOrder::Tiled);
        assert_eq!(walker.stamp_at(0), Some((6, 2)));
        assert_eq!(walker.stamp_at(1), None);
        assert_eq!(walker.stamp_at(2), Some((6, 4)));
        assert_eq!(walker.collect::<Vec<_>>(), vec![(6, 2), (6, 4)]);
    }

    #[test]
    fn empty_box() {
        let mut walker = StampWalker::new(bbox(4, 4, 4, 8), WalkOrder::Tiled);
        assert_eq!(walker.next(), None);
        assert_eq!(walker.origin(), (4, 4));
    }
}
