// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! The GPU registers seen by the rasterizer.
//!
//! Each register is routed by the orchestrator to a fixed set of children
//! (see [fan_out]). The orchestrator keeps a shadow copy of every register in
//! a [RegisterFile].

use std::collections::BTreeMap;
use std::fmt;

use raster_emulator::types::FaceMode;

/// Number of fragment attributes that can be interpolated.
pub const MAX_FRAGMENT_ATTRIBUTES: u32 = 16;

/// Number of render targets.
pub const MAX_RENDER_TARGETS: u32 = 8;

/// Number of user clip planes.
pub const MAX_USER_CLIP_PLANES: u32 = 6;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GpuRegister {
    DisplayXRes,
    DisplayYRes,
    D3d9PixelCoordinates,
    ViewportIniX,
    ViewportIniY,
    ViewportWidth,
    ViewportHeight,
    ScissorTest,
    ScissorIniX,
    ScissorIniY,
    ScissorWidth,
    ScissorHeight,
    DepthRangeNear,
    DepthRangeFar,
    D3d9DepthRange,
    DepthSlopeFactor,
    DepthUnitOffset,
    ZBufferClear,
    ZBufferBitPrecision,
    HierarchicalZ,
    EarlyZ,
    UserClip,
    UserClipPlane,
    FrustumClipping,
    FaceMode,
    Culling,
    D3d9RasterizationRules,
    TwoSidedLighting,
    Multisampling,
    MsaaSamples,
    Interpolation,
    FragmentInputAttributes,
    ModifyFragmentDepth,
    StencilTest,
    DepthTest,
    DepthFunction,
    RenderTargetEnable,
    ColorMaskR,
    ColorMaskG,
    ColorMaskB,
    ColorMaskA,

    // Registers owned by other parts of the GPU
    StreamAddress,
    VertexProgram,
    TextureEnable,
    Blending,
}

impl fmt::Display for GpuRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Faces removed by culling.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompareMode {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// The payload of a register write.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegisterValue {
    Bool(bool),
    UInt(u32),
    Int(i32),
    Float(f32),
    Vec4([f32; 4]),
    Face(FaceMode),
    Cull(CullMode),
    Compare(CompareMode),
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Bool(v) => write!(f, "{v}"),
            RegisterValue::UInt(v) => write!(f, "{v}"),
            RegisterValue::Int(v) => write!(f, "{v}"),
            RegisterValue::Float(v) => write!(f, "{v}"),
            RegisterValue::Vec4(v) => write!(f, "{v:?}"),
            RegisterValue::Face(v) => write!(f, "{v}"),
            RegisterValue::Cull(v) => write!(f, "{v:?}"),
            RegisterValue::Compare(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Bool,
    UInt,
    Int,
    Float,
    Vec4,
    Face,
    Cull,
    Compare,
}

impl RegisterValue {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            RegisterValue::Bool(_) => ValueKind::Bool,
            RegisterValue::UInt(_) => ValueKind::UInt,
            RegisterValue::Int(_) => ValueKind::Int,
            RegisterValue::Float(_) => ValueKind::Float,
            RegisterValue::Vec4(_) => ValueKind::Vec4,
            RegisterValue::Face(_) => ValueKind::Face,
            RegisterValue::Cull(_) => ValueKind::Cull,
            RegisterValue::Compare(_) => ValueKind::Compare,
        }
    }
}

macro_rules! typed_value {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// The payload of a write to `register`, which must be of this type.
        pub fn $name(&self, register: GpuRegister) -> Result<$ty, String> {
            match self {
                RegisterValue::$variant(v) => Ok(*v),
                other => Err(format!(
                    "{register} expects a {:?} value, got {:?}",
                    ValueKind::$variant,
                    other.kind()
                )),
            }
        }
    };
}

impl RegisterValue {
    typed_value!(to_bool, Bool, bool);
    typed_value!(to_u32, UInt, u32);
    typed_value!(to_i32, Int, i32);
    typed_value!(to_f32, Float, f32);
    typed_value!(to_face, Face, FaceMode);
    typed_value!(to_cull, Cull, CullMode);
    typed_value!(to_compare, Compare, CompareMode);
}

/// The children of the rasterizer that registers are forwarded to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Child {
    Setup,
    Traversal,
    HierarchicalZ,
    Interpolator,
    FragmentFifo,
}

impl Child {
    pub const ALL: [Child; 5] = [
        Child::Setup,
        Child::Traversal,
        Child::HierarchicalZ,
        Child::Interpolator,
        Child::FragmentFifo,
    ];

    /// Position of this child in [`Child::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Child::Setup => 0,
            Child::Traversal => 1,
            Child::HierarchicalZ => 2,
            Child::Interpolator => 3,
            Child::FragmentFifo => 4,
        }
    }
}

impl fmt::Display for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Child::Setup => "setup",
            Child::Traversal => "traversal",
            Child::HierarchicalZ => "hz",
            Child::Interpolator => "interpolator",
            Child::FragmentFifo => "ffifo",
        };
        write!(f, "{name}")
    }
}

/// The children a register write is forwarded to, `None` for registers the
/// rasterizer does not own.
#[must_use]
pub fn fan_out(register: GpuRegister) -> Option<&'static [Child]> {
    use Child::*;
    use GpuRegister as R;

    const GEOMETRY: &[Child] = &[Setup, Traversal, HierarchicalZ];
    const SETUP: &[Child] = &[Setup];
    const SETUP_HZ: &[Child] = &[Setup, HierarchicalZ];
    const HZ: &[Child] = &[HierarchicalZ];
    const TRAVERSAL_HZ: &[Child] = &[Traversal, HierarchicalZ];
    const FFIFO: &[Child] = &[FragmentFifo];
    const INTERPOLATOR: &[Child] = &[Interpolator];
    const INTERPOLATOR_FFIFO: &[Child] = &[Interpolator, FragmentFifo];
    const NONE: &[Child] = &[];

    let children = match register {
        R::DisplayXRes
        | R::DisplayYRes
        | R::ViewportIniX
        | R::ViewportIniY
        | R::ViewportWidth
        | R::ViewportHeight => GEOMETRY,
        R::D3d9PixelCoordinates
        | R::DepthRangeNear
        | R::DepthRangeFar
        | R::D3d9DepthRange
        | R::DepthSlopeFactor
        | R::DepthUnitOffset
        | R::FaceMode
        | R::Culling
        | R::D3d9RasterizationRules
        | R::TwoSidedLighting => SETUP,
        R::ScissorTest
        | R::ScissorIniX
        | R::ScissorIniY
        | R::ScissorWidth
        | R::ScissorHeight
        | R::ZBufferBitPrecision => SETUP_HZ,
        R::ZBufferClear | R::HierarchicalZ | R::ModifyFragmentDepth | R::DepthFunction => HZ,
        R::Multisampling | R::MsaaSamples => TRAVERSAL_HZ,
        R::EarlyZ
        | R::StencilTest
        | R::DepthTest
        | R::RenderTargetEnable
        | R::ColorMaskR
        | R::ColorMaskG
        | R::ColorMaskB
        | R::ColorMaskA => FFIFO,
        R::Interpolation => INTERPOLATOR,
        R::FragmentInputAttributes => INTERPOLATOR_FFIFO,
        R::UserClip | R::UserClipPlane | R::FrustumClipping => NONE,
        R::StreamAddress | R::VertexProgram | R::TextureEnable | R::Blending => return None,
    };
    Some(children)
}

/// The payload type a register expects.
#[must_use]
pub fn value_kind(register: GpuRegister) -> ValueKind {
    use GpuRegister as R;
    match register {
        R::DisplayXRes
        | R::DisplayYRes
        | R::ViewportWidth
        | R::ViewportHeight
        | R::ScissorWidth
        | R::ScissorHeight
        | R::ZBufferClear
        | R::ZBufferBitPrecision
        | R::MsaaSamples
        | R::StreamAddress
        | R::VertexProgram => ValueKind::UInt,
        R::ViewportIniX | R::ViewportIniY | R::ScissorIniX | R::ScissorIniY => ValueKind::Int,
        R::DepthRangeNear | R::DepthRangeFar | R::DepthSlopeFactor | R::DepthUnitOffset => {
            ValueKind::Float
        }
        R::UserClipPlane => ValueKind::Vec4,
        R::FaceMode => ValueKind::Face,
        R::Culling => ValueKind::Cull,
        R::DepthFunction => ValueKind::Compare,
        R::D3d9PixelCoordinates
        | R::ScissorTest
        | R::D3d9DepthRange
        | R::HierarchicalZ
        | R::EarlyZ
        | R::UserClip
        | R::FrustumClipping
        | R::D3d9RasterizationRules
        | R::TwoSidedLighting
        | R::Multisampling
        | R::Interpolation
        | R::FragmentInputAttributes
        | R::ModifyFragmentDepth
        | R::StencilTest
        | R::DepthTest
        | R::RenderTargetEnable
        | R::ColorMaskR
        | R::ColorMaskG
        | R::ColorMaskB
        | R::ColorMaskA
        | R::TextureEnable
        | R::Blending => ValueKind::Bool,
    }
}

/// The number of sub-registers of an indexed register. Scalar registers
/// ignore the sub-register.
#[must_use]
pub fn subreg_limit(register: GpuRegister) -> Option<u32> {
    use GpuRegister as R;
    match register {
        R::Interpolation | R::FragmentInputAttributes => Some(MAX_FRAGMENT_ATTRIBUTES),
        R::RenderTargetEnable | R::ColorMaskR | R::ColorMaskG | R::ColorMaskB | R::ColorMaskA => {
            Some(MAX_RENDER_TARGETS)
        }
        R::UserClip | R::UserClipPlane => Some(MAX_USER_CLIP_PLANES),
        _ => None,
    }
}

/// Check a register write is well formed. Returns a description of the
/// problem if not.
pub fn validate(register: GpuRegister, subreg: u32, value: &RegisterValue) -> Result<(), String> {
    if fan_out(register).is_none() {
        return Err(format!("Unsupported Rasterizer register {register}"));
    }
    if let Some(limit) = subreg_limit(register) {
        if subreg >= limit {
            return Err(format!(
                "{register} sub-register {subreg} out of range (limit {limit})"
            ));
        }
    }
    let expected = value_kind(register);
    if value.kind() != expected {
        return Err(format!(
            "{register} expects a {expected:?} value, got {:?}",
            value.kind()
        ));
    }
    Ok(())
}

/// Shadow copy of every register owned by the rasterizer.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    values: BTreeMap<(GpuRegister, u32), RegisterValue>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        let mut file = Self {
            values: BTreeMap::new(),
        };
        file.reset();
        file
    }
}

impl RegisterFile {
    /// Restore the values every register has after a reset.
    pub fn reset(&mut self) {
        use GpuRegister as R;
        use RegisterValue as V;

        self.values.clear();
        let scalars = [
            (R::DisplayXRes, V::UInt(400)),
            (R::DisplayYRes, V::UInt(400)),
            (R::D3d9PixelCoordinates, V::Bool(false)),
            (R::ViewportIniX, V::Int(0)),
            (R::ViewportIniY, V::Int(0)),
            (R::ViewportWidth, V::UInt(400)),
            (R::ViewportHeight, V::UInt(400)),
            (R::ScissorTest, V::Bool(false)),
            (R::ScissorIniX, V::Int(0)),
            (R::ScissorIniY, V::Int(0)),
            (R::ScissorWidth, V::UInt(400)),
            (R::ScissorHeight, V::UInt(400)),
            (R::DepthRangeNear, V::Float(0.0)),
            (R::DepthRangeFar, V::Float(1.0)),
            (R::D3d9DepthRange, V::Bool(false)),
            (R::DepthSlopeFactor, V::Float(0.0)),
            (R::DepthUnitOffset, V::Float(0.0)),
            (R::ZBufferClear, V::UInt(0x00ff_ffff)),
            (R::ZBufferBitPrecision, V::UInt(24)),
            (R::HierarchicalZ, V::Bool(true)),
            (R::EarlyZ, V::Bool(true)),
            (R::FrustumClipping, V::Bool(true)),
            (R::FaceMode, V::Face(FaceMode::Ccw)),
            (R::Culling, V::Cull(CullMode::Back)),
            (R::D3d9RasterizationRules, V::Bool(false)),
            (R::TwoSidedLighting, V::Bool(false)),
            (R::Multisampling, V::Bool(false)),
            (R::MsaaSamples, V::UInt(2)),
            (R::ModifyFragmentDepth, V::Bool(false)),
            (R::StencilTest, V::Bool(false)),
            (R::DepthTest, V::Bool(false)),
            (R::DepthFunction, V::Compare(CompareMode::Less)),
        ];
        for (register, value) in scalars {
            self.values.insert((register, 0), value);
        }
        for attribute in 0..MAX_FRAGMENT_ATTRIBUTES {
            self.values
                .insert((R::Interpolation, attribute), V::Bool(true));
            self.values
                .insert((R::FragmentInputAttributes, attribute), V::Bool(false));
        }
        for target in 0..MAX_RENDER_TARGETS {
            self.values
                .insert((R::RenderTargetEnable, target), V::Bool(target == 0));
            for mask in [R::ColorMaskR, R::ColorMaskG, R::ColorMaskB, R::ColorMaskA] {
                self.values.insert((mask, target), V::Bool(true));
            }
        }
        for plane in 0..MAX_USER_CLIP_PLANES {
            self.values.insert((R::UserClip, plane), V::Bool(false));
            self.values
                .insert((R::UserClipPlane, plane), V::Vec4([0.0; 4]));
        }
    }

    /// Store a value. The write must already have been [validated](validate).
    pub fn write(&mut self, register: GpuRegister, subreg: u32, value: RegisterValue) {
        let subreg = if subreg_limit(register).is_some() {
            subreg
        } else {
            0
        };
        self.values.insert((register, subreg), value);
    }

    #[must_use]
    pub fn read(&self, register: GpuRegister, subreg: u32) -> Option<RegisterValue> {
        let subreg = if subreg_limit(register).is_some() {
            subreg
        } else {
            0
        };
        self.values.get(&(register, subreg)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_index_matches_all() {
        for (i, child) in Child::ALL.iter().enumerate() {
            assert_eq!(child.index(), i);
        }
    }

    #[test]
    fn fan_out_sets() {
        assert_eq!(fan_out(GpuRegister::EarlyZ), Some(&[Child::FragmentFifo][..]));
        assert_eq!(
            fan_out(GpuRegister::ViewportWidth),
            Some(&[Child::Setup, Child::Traversal, Child::HierarchicalZ][..])
        );
        assert_eq!(
            fan_out(GpuRegister::ScissorIniX),
            Some(&[Child::Setup, Child::HierarchicalZ][..])
        );
        assert_eq!(
            fan_out(GpuRegister::FragmentInputAttributes),
            Some(&[Child::Interpolator, Child::FragmentFifo][..])
        );
        assert_eq!(fan_out(GpuRegister::FrustumClipping), Some(&[][..]));
        assert_eq!(fan_out(GpuRegister::Blending), None);
    }

    #[test]
    fn validation() {
        assert!(validate(GpuRegister::EarlyZ, 0, &RegisterValue::Bool(false)).is_ok());
        assert!(validate(GpuRegister::ColorMaskA, 7, &RegisterValue::Bool(false)).is_ok());
        assert_eq!(
            validate(GpuRegister::ColorMaskA, 8, &RegisterValue::Bool(false)),
            Err("ColorMaskA sub-register 8 out of range (limit 8)".to_string())
        );
        assert!(validate(GpuRegister::Interpolation, 16, &RegisterValue::Bool(true)).is_err());
        assert!(validate(GpuRegister::UserClipPlane, 6, &RegisterValue::Vec4([0.0; 4])).is_err());
        assert!(validate(GpuRegister::ViewportWidth, 0, &RegisterValue::Int(3)).is_err());
        assert_eq!(
            validate(GpuRegister::TextureEnable, 0, &RegisterValue::Bool(true)),
            Err("Unsupported Rasterizer register TextureEnable".to_string())
        );
    }

    #[test]
    fn reset_values() {
        let mut file = RegisterFile::default();
        assert_eq!(
            file.read(GpuRegister::Culling, 0),
            Some(RegisterValue::Cull(CullMode::Back))
        );
        assert_eq!(
            file.read(GpuRegister::RenderTargetEnable, 0),
            Some(RegisterValue::Bool(true))
        );
        assert_eq!(
            file.read(GpuRegister::RenderTargetEnable, 1),
            Some(RegisterValue::Bool(false))
        );

        file.write(GpuRegister::ViewportWidth, 3, RegisterValue::UInt(64));
        assert_eq!(
            file.read(GpuRegister::ViewportWidth, 0),
            Some(RegisterValue::UInt(64))
        );
        file.reset();
        assert_eq!(
            file.read(GpuRegister::ViewportWidth, 0),
            Some(RegisterValue::UInt(400))
        );
    }
}
