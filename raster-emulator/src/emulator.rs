// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! The rasterizer emulator.
//!
//! The emulator holds the triangles that are in the pipeline, keyed by a
//! [`SetupId`], and generates their fragments a stamp at a time. Pipeline
//! models call into it synchronously; it has no notion of time.
//!
//! Triangles go through:
//!  1. [`bind`](RasterizerEmulator::bind) or [`setup`](RasterizerEmulator::setup)
//!     to create them.
//!  2. Face culling queries ([`triangle_area`](RasterizerEmulator::triangle_area)
//!     and friends).
//!  3. Stamp generation, either a batch at a time
//!     ([`start_recursive_multi`](RasterizerEmulator::start_recursive_multi))
//!     or one triangle at a time
//!     ([`start_position`](RasterizerEmulator::start_position)).
//!  4. [`destroy_triangle`](RasterizerEmulator::destroy_triangle).
//!
//! Generation always produces at least one stamp per triangle (or batch) and
//! flags the final one with `last_fragment`. A triangle that covers no pixels
//! produces a single empty stamp.

use std::collections::BTreeMap;
use std::rc::Rc;

use raster_engine::sim_fatal;
use raster_engine::types::{SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::geometry::{compute_edge_equations, msaa_sample_offsets};
use crate::types::{
    BatchId, EdgeEquations, FaceMode, Fragment, GeneratedStamp, STAMP_FRAGMENTS, STAMP_WIDTH,
    SetupId, TILE_SIZE, TileId, Vertex,
};
use crate::walker::{BoundingBox, StampWalker, WalkOrder};

#[derive(Clone, Copy, Debug)]
struct Viewport {
    d3d9_pixel_coordinates: bool,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, Debug)]
struct Scissor {
    h_res: u32,
    v_res: u32,
    enabled: bool,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, Debug)]
struct RasterState {
    viewport: Viewport,
    scissor: Scissor,
    d3d9_depth_range: bool,
    near: f32,
    far: f32,
    slope_factor: f32,
    unit_offset: f32,
    face_mode: FaceMode,
    d3d9_rasterization_rules: bool,
    z_bits: u32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            viewport: Viewport {
                d3d9_pixel_coordinates: false,
                x: 0,
                y: 0,
                width: 400,
                height: 400,
            },
            scissor: Scissor {
                h_res: 400,
                v_res: 400,
                enabled: false,
                x: 0,
                y: 0,
                width: 400,
                height: 400,
            },
            d3d9_depth_range: false,
            near: 0.0,
            far: 1.0,
            slope_factor: 0.0,
            unit_offset: 0.0,
            face_mode: FaceMode::Ccw,
            d3d9_rasterization_rules: false,
            z_bits: 24,
        }
    }
}

impl RasterState {
    fn to_pixels(&self, ndc_x: f64, ndc_y: f64) -> (f64, f64) {
        let vp = &self.viewport;
        (
            f64::from(vp.x) + (ndc_x + 1.0) * f64::from(vp.width) / 2.0,
            f64::from(vp.y) + (ndc_y + 1.0) * f64::from(vp.height) / 2.0,
        )
    }

    fn to_ndc(&self, x: f64, y: f64) -> (f64, f64) {
        let vp = &self.viewport;
        let shift = if vp.d3d9_pixel_coordinates { 0.5 } else { 0.0 };
        (
            (x - shift - f64::from(vp.x)) * 2.0 / f64::from(vp.width.max(1)) - 1.0,
            (y - shift - f64::from(vp.y)) * 2.0 / f64::from(vp.height.max(1)) - 1.0,
        )
    }

    /// The pixel area fragments can be generated in.
    fn clip_rect(&self) -> BoundingBox {
        let vp = &self.viewport;
        let sc = &self.scissor;
        let mut min_x = i64::from(vp.x).max(0);
        let mut min_y = i64::from(vp.y).max(0);
        let mut max_x = (i64::from(vp.x) + i64::from(vp.width)).min(i64::from(sc.h_res));
        let mut max_y = (i64::from(vp.y) + i64::from(vp.height)).min(i64::from(sc.v_res));
        if sc.enabled {
            min_x = min_x.max(i64::from(sc.x));
            min_y = min_y.max(i64::from(sc.y));
            max_x = max_x.min(i64::from(sc.x) + i64::from(sc.width));
            max_y = max_y.min(i64::from(sc.y) + i64::from(sc.height));
        }
        let clamp = |v: i64| u32::try_from(v.max(0)).unwrap_or(u32::MAX);
        BoundingBox {
            min_x: clamp(min_x),
            min_y: clamp(min_y),
            max_x: clamp(max_x),
            max_y: clamp(max_y),
        }
    }

    fn depth_scale(&self) -> f64 {
        let range = f64::from(self.far) - f64::from(self.near);
        if self.d3d9_depth_range {
            range
        } else {
            range / 2.0
        }
    }

    fn window_depth(&self, z_ndc: f64) -> f64 {
        let offset = if self.d3d9_depth_range { 0.0 } else { 1.0 };
        f64::from(self.near) + (z_ndc + offset) * self.depth_scale()
    }

    fn quantize_depth(&self, depth: f64) -> u32 {
        let bits = self.z_bits.clamp(1, 32);
        let max = ((1_u64 << bits) - 1) as f64;
        (depth.clamp(0.0, 1.0) * max).round() as u32
    }

    fn edge_passes(&self, edges: &EdgeEquations, edge: usize, value: f64) -> bool {
        if value > 0.0 {
            return true;
        }
        if value < 0.0 {
            return false;
        }
        if !self.d3d9_rasterization_rules {
            return true;
        }
        // Top-left fill convention
        let (a, b) = (edges.a[edge], edges.b[edge]);
        a > 0.0 || (a == 0.0 && b > 0.0)
    }
}

struct Triangle {
    vertices: [Vertex; 3],
    edges: EdgeEquations,

    /// Signed area in normalized device coordinates, positive when front
    /// facing.
    area: f64,

    /// Normalized device depth of each vertex.
    z: [f64; 3],

    /// Largest window-space depth slope, used for polygon offset.
    max_slope: f64,
    bbox: BoundingBox,
    clip: BoundingBox,
    colors: [[f32; 4]; 3],
    is_setup: bool,
    last_fragment: bool,
}

impl Triangle {
    fn bound(vertices: [Vertex; 3]) -> Self {
        Self {
            vertices,
            edges: EdgeEquations::default(),
            area: 0.0,
            z: [0.0; 3],
            max_slope: 0.0,
            bbox: BoundingBox::default(),
            clip: BoundingBox::default(),
            colors: vertices.map(|v| v.color),
            is_setup: false,
            last_fragment: false,
        }
    }

    fn positions(&self) -> [[f32; 4]; 3] {
        self.vertices.map(|v| v.position)
    }

    fn setup(&mut self, state: &RasterState, edges: EdgeEquations, area: f64) {
        let (edges, area) = match state.face_mode {
            FaceMode::Ccw => (edges, area),
            FaceMode::Cw => (edges.negated(), -area),
        };
        self.edges = edges;
        self.area = area;

        let positions = self.positions();
        self.z = positions.map(|p| {
            if p[3] == 0.0 {
                0.0
            } else {
                f64::from(p[2] / p[3])
            }
        });

        let sum: f64 = (0..3).map(|i| edges.c[i]).sum();
        if sum != 0.0 {
            let dz_dx: f64 = (0..3).map(|i| self.z[i] * edges.a[i]).sum::<f64>() / sum;
            let dz_dy: f64 = (0..3).map(|i| self.z[i] * edges.b[i]).sum::<f64>() / sum;
            let vp = &state.viewport;
            let scale = state.depth_scale();
            let slope_x = (dz_dx * 2.0 / f64::from(vp.width.max(1)) * scale).abs();
            let slope_y = (dz_dy * 2.0 / f64::from(vp.height.max(1)) * scale).abs();
            self.max_slope = slope_x.max(slope_y);
        }

        self.clip = state.clip_rect();
        self.bbox = if positions.iter().any(|p| p[3] == 0.0) {
            BoundingBox::default()
        } else {
            let mut min = (f64::MAX, f64::MAX);
            let mut max = (f64::MIN, f64::MIN);
            for p in &positions {
                let (x, y) = state.to_pixels(f64::from(p[0] / p[3]), f64::from(p[1] / p[3]));
                min = (min.0.min(x), min.1.min(y));
                max = (max.0.max(x), max.1.max(y));
            }
            let clamp = |v: f64| v.max(0.0).min(f64::from(u32::MAX)) as u32;
            BoundingBox {
                min_x: clamp(min.0.floor()).max(self.clip.min_x),
                min_y: clamp(min.1.floor()).max(self.clip.min_y),
                max_x: clamp(max.0.ceil() + 1.0).min(self.clip.max_x),
                max_y: clamp(max.1.ceil() + 1.0).min(self.clip.max_y),
            }
        };
        self.is_setup = true;
    }

    fn in_clip(&self, x: u32, y: u32) -> bool {
        x >= self.clip.min_x && x < self.clip.max_x && y >= self.clip.min_y && y < self.clip.max_y
    }

    fn covers(&self, state: &RasterState, x: f64, y: f64) -> bool {
        let (nx, ny) = state.to_ndc(x, y);
        (0..3).all(|e| state.edge_passes(&self.edges, e, self.edges.evaluate(e, nx, ny)))
    }

    fn fragment(&self, state: &RasterState, x: u32, y: u32, samples: u32) -> Fragment {
        let (px, py) = (f64::from(x), f64::from(y));
        let mut inside = false;
        let mut coverage = 0;
        if self.in_clip(x, y) {
            if samples > 1 {
                for (i, (ox, oy)) in msaa_sample_offsets(samples).iter().enumerate() {
                    if self.covers(state, px + ox, py + oy) {
                        coverage |= 1 << i;
                    }
                }
                inside = coverage != 0;
            } else {
                inside = self.covers(state, px + 0.5, py + 0.5);
            }
        }

        let (nx, ny) = state.to_ndc(px + 0.5, py + 0.5);
        let e: [f64; 3] = [0, 1, 2].map(|i| self.edges.evaluate(i, nx, ny));
        let sum = e[0] + e[1] + e[2];
        let z_ndc = if sum == 0.0 {
            0.0
        } else {
            (0..3).map(|i| e[i] / sum * self.z[i]).sum::<f64>()
        };
        let offset = f64::from(state.slope_factor) * self.max_slope
            + f64::from(state.unit_offset) / (1_u64 << state.z_bits.clamp(1, 32)) as f64;
        Fragment {
            x,
            y,
            z: state.quantize_depth(state.window_depth(z_ndc) + offset),
            inside,
            coverage,
        }
    }

    fn stamp(
        &self,
        state: &RasterState,
        id: SetupId,
        batch_index: usize,
        origin: (u32, u32),
        samples: u32,
    ) -> GeneratedStamp {
        let mut fragments = [Fragment::default(); STAMP_FRAGMENTS];
        for (i, fragment) in fragments.iter_mut().enumerate() {
            let dx = i as u32 % STAMP_WIDTH;
            let dy = i as u32 / STAMP_WIDTH;
            *fragment = self.fragment(state, origin.0 + dx, origin.1 + dy, samples);
        }
        GeneratedStamp {
            batch_index,
            triangle: id,
            fragments,
            last_fragment: false,
        }
    }
}

/// Progress through the stamps of one triangle or one batch.
struct Generation {
    triangles: Vec<SetupId>,
    order: WalkOrder,
    samples: u32,
    current: usize,
    walker: Option<StampWalker>,
    started: bool,
    pending: Option<GeneratedStamp>,
}

impl Generation {
    fn new(triangles: Vec<SetupId>, order: WalkOrder, samples: u32) -> Self {
        Self {
            triangles,
            order,
            samples,
            current: 0,
            walker: None,
            started: false,
            pending: None,
        }
    }

    /// Find the next stamp with at least one covered fragment.
    fn find_next(
        &mut self,
        state: &RasterState,
        triangles: &BTreeMap<SetupId, Triangle>,
    ) -> Option<GeneratedStamp> {
        while self.current < self.triangles.len() {
            let id = self.triangles[self.current];
            if let Some(triangle) = triangles.get(&id) {
                let walker = self
                    .walker
                    .get_or_insert_with(|| StampWalker::new(triangle.bbox, self.order));
                for origin in walker.by_ref() {
                    let stamp = triangle.stamp(state, id, self.current, origin, self.samples);
                    if stamp.covered() > 0 {
                        return Some(stamp);
                    }
                }
            }
            self.current += 1;
            self.walker = None;
        }
        None
    }

    /// Returns the next stamp and whether it was the final one.
    fn next_stamp(
        &mut self,
        state: &RasterState,
        triangles: &BTreeMap<SetupId, Triangle>,
    ) -> (GeneratedStamp, bool) {
        let current = if self.started {
            self.pending.take()
        } else {
            self.started = true;
            self.find_next(state, triangles)
        };

        match current {
            Some(mut stamp) => {
                self.pending = self.find_next(state, triangles);
                let last = self.pending.is_none();
                stamp.last_fragment = last;
                (stamp, last)
            }
            None => {
                // Nothing covered at all
                let id = self.triangles.first().copied().unwrap_or_default();
                let origin = triangles
                    .get(&id)
                    .map(|t| StampWalker::new(t.bbox, self.order).origin())
                    .unwrap_or_default();
                let stamp = GeneratedStamp {
                    batch_index: 0,
                    triangle: id,
                    fragments: [0, 1, 2, 3].map(|i: u32| Fragment {
                        x: origin.0 + i % STAMP_WIDTH,
                        y: origin.1 + i / STAMP_WIDTH,
                        ..Default::default()
                    }),
                    last_fragment: true,
                };
                (stamp, true)
            }
        }
    }
}

/// Geometry service used by Triangle Setup and Triangle Traversal.
pub struct RasterizerEmulator {
    pub entity: Rc<Entity>,
    state: RasterState,
    triangles: BTreeMap<SetupId, Triangle>,
    batches: BTreeMap<BatchId, Generation>,
    scans: BTreeMap<SetupId, Generation>,
    next_triangle: u32,
    next_batch: u32,
}

impl RasterizerEmulator {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "emulator")),
            state: RasterState::default(),
            triangles: BTreeMap::new(),
            batches: BTreeMap::new(),
            scans: BTreeMap::new(),
            next_triangle: 0,
            next_batch: 0,
        }
    }

    pub fn set_viewport(
        &mut self,
        d3d9_pixel_coordinates: bool,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) {
        self.state.viewport = Viewport {
            d3d9_pixel_coordinates,
            x,
            y,
            width,
            height,
        };
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_scissor(
        &mut self,
        h_res: u32,
        v_res: u32,
        enabled: bool,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) {
        self.state.scissor = Scissor {
            h_res,
            v_res,
            enabled,
            x,
            y,
            width,
            height,
        };
    }

    pub fn set_depth_range(&mut self, d3d9_depth_range: bool, near: f32, far: f32) {
        self.state.d3d9_depth_range = d3d9_depth_range;
        self.state.near = near;
        self.state.far = far;
    }

    pub fn set_polygon_offset(&mut self, slope_factor: f32, unit_offset: f32) {
        self.state.slope_factor = slope_factor;
        self.state.unit_offset = unit_offset;
    }

    pub fn set_face_mode(&mut self, face_mode: FaceMode) {
        self.state.face_mode = face_mode;
    }

    pub fn set_d3d9_rasterization_rules(&mut self, enabled: bool) {
        self.state.d3d9_rasterization_rules = enabled;
    }

    pub fn set_depth_precision(&mut self, bits: u32) {
        self.state.z_bits = bits;
    }

    fn triangle(&self, op: &str, id: SetupId) -> Result<&Triangle, SimError> {
        match self.triangles.get(&id) {
            Some(triangle) => Ok(triangle),
            None => sim_fatal!(self.entity, op ; "unknown triangle {id}"),
        }
    }

    fn triangle_mut(&mut self, op: &str, id: SetupId) -> Result<&mut Triangle, SimError> {
        match self.triangles.get_mut(&id) {
            Some(triangle) => Ok(triangle),
            None => sim_fatal!(self.entity, op ; "unknown triangle {id}"),
        }
    }

    /// Store a triangle without computing its setup.
    pub fn bind(&mut self, vertices: [Vertex; 3]) -> SetupId {
        let id = SetupId(self.next_triangle);
        self.next_triangle = self.next_triangle.wrapping_add(1);
        self.triangles.insert(id, Triangle::bound(vertices));
        trace!(self.entity ; "bound triangle {id}");
        id
    }

    /// Compute the setup of a triangle previously [bound](Self::bind).
    pub fn setup_edge_equations(&mut self, id: SetupId) -> SimResult {
        let state = self.state;
        let triangle = self.triangle_mut("setup_edge_equations", id)?;
        let (edges, area) = compute_edge_equations(&triangle.positions());
        triangle.setup(&state, edges, area);
        Ok(())
    }

    /// Complete the setup of a bound triangle with edge equations and area
    /// computed elsewhere.
    pub fn setup_edge_equations_with(
        &mut self,
        id: SetupId,
        edges: EdgeEquations,
        area: f64,
    ) -> SimResult {
        let state = self.state;
        let triangle = self.triangle_mut("setup_edge_equations_with", id)?;
        triangle.setup(&state, edges, area);
        Ok(())
    }

    pub fn setup(&mut self, vertices: [Vertex; 3]) -> Result<SetupId, SimError> {
        let id = self.bind(vertices);
        self.setup_edge_equations(id)?;
        Ok(id)
    }

    pub fn setup_with_edges(
        &mut self,
        vertices: [Vertex; 3],
        edges: EdgeEquations,
        area: f64,
    ) -> Result<SetupId, SimError> {
        let id = self.bind(vertices);
        self.setup_edge_equations_with(id, edges, area)?;
        Ok(id)
    }

    /// Signed area in normalized device coordinates. Positive for front facing
    /// triangles.
    pub fn triangle_area(&self, id: SetupId) -> Result<f64, SimError> {
        let triangle = self.triangle("triangle_area", id)?;
        if !triangle.is_setup {
            return sim_fatal!(self.entity, "triangle_area" ; "triangle {id} has not been setup");
        }
        Ok(triangle.area)
    }

    /// Fraction of the viewport covered by the triangle.
    pub fn tri_screen_percent(&self, id: SetupId) -> Result<f64, SimError> {
        Ok(self.triangle_area(id)?.abs() / 4.0)
    }

    pub fn triangle_bounding_box(&self, id: SetupId) -> Result<BoundingBox, SimError> {
        Ok(self.triangle("triangle_bounding_box", id)?.bbox)
    }

    /// Flip the edge equations so that a back facing triangle can be
    /// rasterized.
    pub fn invert_triangle_facing(&mut self, id: SetupId) -> SimResult {
        let triangle = self.triangle_mut("invert_triangle_facing", id)?;
        triangle.edges = triangle.edges.negated();
        Ok(())
    }

    /// Use the back color of each vertex if the triangle is back facing.
    pub fn select_two_sided_color(&mut self, id: SetupId) -> SimResult {
        let triangle = self.triangle_mut("select_two_sided_color", id)?;
        triangle.colors = if triangle.area < 0.0 {
            triangle.vertices.map(|v| v.back_color)
        } else {
            triangle.vertices.map(|v| v.color)
        };
        Ok(())
    }

    pub fn colors(&self, id: SetupId) -> Result<[[f32; 4]; 3], SimError> {
        Ok(self.triangle("colors", id)?.colors)
    }

    pub fn destroy_triangle(&mut self, id: SetupId) -> SimResult {
        if self.triangles.remove(&id).is_none() {
            return sim_fatal!(self.entity, "destroy_triangle" ; "unknown triangle {id}");
        }
        self.scans.remove(&id);
        trace!(self.entity ; "destroyed triangle {id}");
        Ok(())
    }

    /// True once the final stamp of the triangle has been generated.
    pub fn last_fragment(&self, id: SetupId) -> Result<bool, SimError> {
        Ok(self.triangle("last_fragment", id)?.last_fragment)
    }

    /// Number of triangles currently held.
    #[must_use]
    pub fn stored_triangles(&self) -> usize {
        self.triangles.len()
    }

    fn check_generation(&self, op: &str, ids: &[SetupId]) -> SimResult {
        for id in ids {
            if !self.triangle(op, *id)?.is_setup {
                return sim_fatal!(self.entity, op ; "triangle {id} has not been setup");
            }
        }
        Ok(())
    }

    fn mark_finished(&mut self, ids: &[SetupId]) {
        for id in ids {
            if let Some(triangle) = self.triangles.get_mut(id) {
                triangle.last_fragment = true;
            }
        }
    }

    /// Start generating the stamps of a batch of triangles in tiled order.
    ///
    /// `samples` is the number of MSAA samples per fragment, 1 when
    /// multisampling is off.
    pub fn start_recursive_multi(
        &mut self,
        ids: &[SetupId],
        samples: u32,
    ) -> Result<BatchId, SimError> {
        if ids.is_empty() {
            return sim_fatal!(self.entity, "start_recursive_multi" ; "empty batch");
        }
        self.check_generation("start_recursive_multi", ids)?;
        let batch = BatchId(self.next_batch);
        self.next_batch = self.next_batch.wrapping_add(1);
        self.batches
            .insert(batch, Generation::new(ids.to_vec(), WalkOrder::Tiled, samples));
        debug!(self.entity ; "batch {batch} started with {} triangles", ids.len());
        Ok(batch)
    }

    pub fn next_stamp_recursive_multi(&mut self, batch: BatchId) -> Result<GeneratedStamp, SimError> {
        let Some(generation) = self.batches.get_mut(&batch) else {
            return sim_fatal!(self.entity, "next_stamp_recursive_multi" ; "unknown batch {batch}");
        };
        let (stamp, last) = generation.next_stamp(&self.state, &self.triangles);
        if last {
            if let Some(generation) = self.batches.remove(&batch) {
                self.mark_finished(&generation.triangles);
            }
        }
        Ok(stamp)
    }

    /// Start generating the stamps of a single triangle in scanline order.
    pub fn start_position(&mut self, id: SetupId, samples: u32) -> SimResult {
        self.check_generation("start_position", &[id])?;
        self.scans
            .insert(id, Generation::new(vec![id], WalkOrder::Scanline, samples));
        Ok(())
    }

    pub fn next_scanline_stamp_tiled(&mut self, id: SetupId) -> Result<GeneratedStamp, SimError> {
        let Some(generation) = self.scans.get_mut(&id) else {
            return sim_fatal!(self.entity, "next_scanline_stamp_tiled" ; "triangle {id} not started");
        };
        let (stamp, last) = generation.next_stamp(&self.state, &self.triangles);
        if last {
            self.scans.remove(&id);
            self.mark_finished(&[id]);
        }
        Ok(stamp)
    }

    #[must_use]
    pub fn calculate_tile_id(&self, x: u32, y: u32) -> TileId {
        TileId {
            x: x / TILE_SIZE,
            y: y / TILE_SIZE,
        }
    }
}
