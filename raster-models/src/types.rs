// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Messages exchanged between the stages of the rasterizer.
//!
//! Every message is moved through a [signal](raster_engine::signal) and owned
//! by its reader once read.

use std::fmt;
use std::rc::Rc;

use raster_components::reorder_ring::RingIndex;
use raster_emulator::types::{EdgeEquations, Fragment, STAMP_FRAGMENTS, SetupId, TileId, Vertex};
use raster_engine::traits::SimObject;
use raster_track::entity::Entity;
use raster_track::{Id, create_and_track_id};

use crate::registers::{GpuRegister, RegisterValue};

/// Chain of tracing identifiers linking an object to the objects that caused
/// it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cookies(Vec<Id>);

impl Cookies {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Copy the chain and append a new identifier created by `entity`.
    #[must_use]
    pub fn derive(&self, entity: &Rc<Entity>, name: &str) -> Self {
        let mut ids = self.0.clone();
        ids.push(create_and_track_id!(entity ; name));
        Self(ids)
    }

    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.0
    }
}

impl fmt::Display for Cookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

/// State reported by every stage every cycle.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum RasterizerState {
    #[default]
    Reset,
    Ready,
    Drawing,
    End,
    Clear,
    ClearEnd,
}

impl fmt::Display for RasterizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RasterizerState::Reset => "RESET",
            RasterizerState::Ready => "READY",
            RasterizerState::Drawing => "DRAWING",
            RasterizerState::End => "END",
            RasterizerState::Clear => "CLEAR",
            RasterizerState::ClearEnd => "CLEAR_END",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RasterizerStateInfo {
    pub state: RasterizerState,
}

impl RasterizerStateInfo {
    #[must_use]
    pub fn new(state: RasterizerState) -> Self {
        Self { state }
    }
}

impl fmt::Display for RasterizerStateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state {}", self.state)
    }
}

/// What a [RasterizerCommand] asks a stage to do.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandKind {
    Reset,
    Draw,
    End,
    RegWrite {
        register: GpuRegister,
        subreg: u32,
        value: RegisterValue,
    },
    RegRead {
        register: GpuRegister,
        subreg: u32,
    },
    ClearZStencilBuffer,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Reset => write!(f, "RESET"),
            CommandKind::Draw => write!(f, "DRAW"),
            CommandKind::End => write!(f, "END"),
            CommandKind::RegWrite {
                register,
                subreg,
                value,
            } => write!(f, "REG_WRITE {register}[{subreg}] = {value}"),
            CommandKind::RegRead { register, subreg } => write!(f, "REG_READ {register}[{subreg}]"),
            CommandKind::ClearZStencilBuffer => write!(f, "CLEAR_ZSTENCIL_BUFFER"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RasterizerCommand {
    pub kind: CommandKind,
    pub cookies: Cookies,
}

impl RasterizerCommand {
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            cookies: Cookies::new(),
        }
    }

    #[must_use]
    pub fn reg_write(register: GpuRegister, subreg: u32, value: RegisterValue) -> Self {
        Self::new(CommandKind::RegWrite {
            register,
            subreg,
            value,
        })
    }

    /// A copy of this command to be forwarded by `entity`.
    #[must_use]
    pub fn forward(&self, entity: &Rc<Entity>) -> Self {
        Self {
            kind: self.kind.clone(),
            cookies: self.cookies.derive(entity, "command"),
        }
    }
}

impl fmt::Display for RasterizerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Back pressure reported by a downstream unit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FlowState {
    #[default]
    Ready,
    Busy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowStateInfo {
    pub state: FlowState,
}

impl FlowStateInfo {
    #[must_use]
    pub fn new(state: FlowState) -> Self {
        Self { state }
    }
}

impl fmt::Display for FlowStateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.state)
    }
}

/// Setup asks the upstream producer for `count` triangles.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveAssemblyRequest {
    pub count: usize,
    pub cookies: Cookies,
}

impl fmt::Display for PrimitiveAssemblyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {} triangles", self.count)
    }
}

/// Traversal asks Setup for `count` triangles.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleSetupRequest {
    pub count: usize,
    pub cookies: Cookies,
}

impl fmt::Display for TriangleSetupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {} setup triangles", self.count)
    }
}

/// A triangle to be setup.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleSetupInput {
    pub triangle_id: u32,
    pub vertices: [Vertex; 3],

    /// Emulator handle when the triangle was bound upstream.
    pub setup_id: Option<SetupId>,

    /// Marks the end of the batch. Carries no vertices.
    pub last: bool,
    pub cookies: Cookies,
}

impl TriangleSetupInput {
    #[must_use]
    pub fn new(triangle_id: u32, vertices: [Vertex; 3], cookies: Cookies) -> Self {
        Self {
            triangle_id,
            vertices,
            setup_id: None,
            last: false,
            cookies,
        }
    }

    #[must_use]
    pub fn last(triangle_id: u32, cookies: Cookies) -> Self {
        Self {
            triangle_id,
            vertices: [Vertex::default(); 3],
            setup_id: None,
            last: true,
            cookies,
        }
    }
}

impl fmt::Display for TriangleSetupInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.last {
            write!(f, "last triangle {}", self.triangle_id)
        } else {
            write!(f, "triangle {}", self.triangle_id)
        }
    }
}

/// A triangle that has been setup.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleSetupOutput {
    pub triangle_id: u32,
    pub setup_id: SetupId,
    pub last: bool,
    pub cookies: Cookies,
}

impl fmt::Display for TriangleSetupOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.last {
            write!(f, "last setup triangle {}", self.triangle_id)
        } else {
            write!(f, "setup triangle {} ({})", self.triangle_id, self.setup_id)
        }
    }
}

/// Triangle setup work for the shader pool.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderInput {
    pub entry: RingIndex,
    pub triangle_id: u32,
    pub positions: [[f32; 4]; 3],
    pub last: bool,
}

impl fmt::Display for ShaderInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shade triangle {} in entry {}", self.triangle_id, self.entry)
    }
}

/// Result of triangle setup on the shader pool.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderOutput {
    pub entry: RingIndex,
    pub edges: EdgeEquations,
    pub area: f64,
}

impl fmt::Display for ShaderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shaded entry {}", self.entry)
    }
}

/// A group of fragments generated by Traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct Stamp {
    pub triangle_id: u32,
    pub setup_id: SetupId,
    pub fragments: [Fragment; STAMP_FRAGMENTS],
    pub tile: TileId,

    /// Stamp unit that processes this stamp.
    pub unit: u32,

    /// Marks the end of the batch. A last stamp covers no fragments.
    pub last: bool,
    pub cookies: Cookies,
}

impl Stamp {
    #[must_use]
    pub fn sentinel(cookies: Cookies) -> Self {
        Self {
            triangle_id: 0,
            setup_id: SetupId::default(),
            fragments: [Fragment::default(); STAMP_FRAGMENTS],
            tile: TileId::default(),
            unit: 0,
            last: true,
            cookies,
        }
    }

    #[must_use]
    pub fn covered(&self) -> usize {
        self.fragments.iter().filter(|f| f.inside).count()
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.last {
            return write!(f, "last stamp");
        }
        let (x, y) = (self.fragments[0].x, self.fragments[0].y);
        write!(
            f,
            "stamp ({x}, {y}) of triangle {} for unit {}",
            self.triangle_id, self.unit
        )
    }
}

impl SimObject for RasterizerCommand {}
impl SimObject for RasterizerStateInfo {}
impl SimObject for FlowStateInfo {}
impl SimObject for PrimitiveAssemblyRequest {}
impl SimObject for TriangleSetupRequest {}
impl SimObject for TriangleSetupInput {}
impl SimObject for TriangleSetupOutput {}
impl SimObject for ShaderInput {}
impl SimObject for ShaderOutput {}
impl SimObject for Stamp {}
