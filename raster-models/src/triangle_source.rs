// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! A producer of triangles standing in for primitive assembly.
//!
//! The source answers requests from Triangle Setup with the triangles of a
//! draw, followed by the last triangle mark. Requests received after the mark
//! has been sent are ignored.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raster_emulator::emulator::RasterizerEmulator;
use raster_emulator::types::Vertex;
use raster_engine::signal::{InSignal, OutSignal};
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, trace};

use crate::types::{Cookies, PrimitiveAssemblyRequest, TriangleSetupInput};

/// Generate `count` random counter-clockwise or clockwise triangles with
/// vertices inside the viewport.
#[must_use]
pub fn random_triangles(count: usize, seed: u64, max_extent: f32) -> Vec<[Vertex; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x: f32 = rng.gen_range(-1.0..1.0);
            let y: f32 = rng.gen_range(-1.0..1.0);
            let mut vertex = || {
                let dx: f32 = rng.gen_range(-max_extent..max_extent);
                let dy: f32 = rng.gen_range(-max_extent..max_extent);
                let mut v = Vertex::at(x + dx, y + dy, rng.gen_range(0.0..1.0));
                v.color = [rng.gen_range(0.0..1.0), 0.5, 0.5, 1.0];
                v
            };
            [vertex(), vertex(), vertex()]
        })
        .collect()
}

pub struct TriangleSource {
    pub entity: Rc<Entity>,
    request_rx: InSignal<PrimitiveAssemblyRequest>,
    triangle_tx: OutSignal<TriangleSetupInput>,
    bandwidth: usize,
    triangles: VecDeque<[Vertex; 3]>,
    next_id: u32,
    requested: usize,
    last_sent: bool,
    binder: Option<Rc<RefCell<RasterizerEmulator>>>,
    cookies: Cookies,
}

impl TriangleSource {
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        request_rx: InSignal<PrimitiveAssemblyRequest>,
        triangle_tx: OutSignal<TriangleSetupInput>,
        triangles: Vec<[Vertex; 3]>,
    ) -> Self {
        let entity = Rc::new(Entity::new(parent, "triangle_source"));
        let cookies = Cookies::new().derive(&entity, "draw");
        let bandwidth = triangle_tx.bandwidth();
        Self {
            entity,
            request_rx,
            triangle_tx,
            bandwidth,
            triangles: triangles.into(),
            next_id: 0,
            requested: 0,
            last_sent: false,
            binder: None,
            cookies,
        }
    }

    /// Bind every triangle in `emulator` before it is sent, for a Setup that
    /// expects pre-bound triangles.
    #[must_use]
    pub fn with_binding(mut self, emulator: Rc<RefCell<RasterizerEmulator>>) -> Self {
        self.binder = Some(emulator);
        self
    }

    /// Queue the triangles of a new draw.
    pub fn load(&mut self, triangles: Vec<[Vertex; 3]>) {
        self.triangles = triangles.into();
        self.next_id = 0;
        self.requested = 0;
        self.last_sent = false;
        self.cookies = Cookies::new().derive(&self.entity, "draw");
    }

    /// Whether the last triangle mark of the current draw has been sent.
    #[must_use]
    pub fn done(&self) -> bool {
        self.last_sent
    }

    /// Triangles sent so far in the current draw, not counting the mark.
    #[must_use]
    pub fn sent(&self) -> u32 {
        self.next_id
    }

    fn next_input(&mut self) -> TriangleSetupInput {
        let cookies = self.cookies.derive(&self.entity, "triangle");
        match self.triangles.pop_front() {
            Some(vertices) => {
                let mut input = TriangleSetupInput::new(self.next_id, vertices, cookies);
                if let Some(emulator) = &self.binder {
                    input.setup_id = Some(emulator.borrow_mut().bind(vertices));
                }
                self.next_id += 1;
                input
            }
            None => {
                self.last_sent = true;
                TriangleSetupInput::last(self.next_id, cookies)
            }
        }
    }
}

impl Clocked for TriangleSource {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        while let Some(request) = self.request_rx.read(cycle) {
            if self.last_sent {
                trace!(self.entity ; "ignore {request}");
            } else {
                self.requested += request.count;
            }
        }

        let mut sent = 0;
        while sent < self.bandwidth && self.requested > 0 && !self.last_sent {
            let input = self.next_input();
            if input.last {
                debug!(self.entity ; "last triangle sent after {} triangles", self.next_id);
            }
            self.triangle_tx.write(cycle, input)?;
            self.requested -= 1;
            sent += 1;
        }
        Ok(())
    }
}
