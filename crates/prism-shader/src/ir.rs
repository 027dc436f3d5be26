//! Shader IR: registers, instructions, and the two accepted shader forms.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::{
    MAX_CONTROL_FLOW_NESTING, MAX_SHADER_CONSTS, MAX_SHADER_INPUTS, MAX_SHADER_OUTPUTS,
    MAX_SHADER_TEMPS,
};

/// Per-draw scalar values a shader can read without a bound resource.
///
/// All system values are unsigned integers; shaders convert with [`Op::Utof`]
/// when they need them as floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemValue {
    VertexId,
    VertexIdNoBase,
    InstanceId,
    BaseVertex,
    BaseInstance,
    FirstVertex,
    DrawId,
    ViewIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SrcReg {
    Temp(u16),
    Input(u16),
    Const(u16),
    System(SystemValue),
    Imm([f32; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SrcModifier {
    None,
    Negate,
    Abs,
    AbsNegate,
}

/// Component selection, 2 bits of meaning per entry (0..=3 → x..w).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Swizzle(pub [u8; 4]);

impl Swizzle {
    pub const XYZW: Swizzle = Swizzle([0, 1, 2, 3]);

    /// Replicate a single component to all four channels.
    pub fn broadcast(chan: u8) -> Swizzle {
        Swizzle([chan; 4])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Src {
    pub reg: SrcReg,
    pub swizzle: Swizzle,
    pub modifier: SrcModifier,
}

impl Src {
    pub fn new(reg: SrcReg) -> Src {
        Src {
            reg,
            swizzle: Swizzle::XYZW,
            modifier: SrcModifier::None,
        }
    }

    pub fn swizzled(reg: SrcReg, swizzle: Swizzle) -> Src {
        Src {
            reg,
            swizzle,
            modifier: SrcModifier::None,
        }
    }

    pub fn negate(mut self) -> Src {
        self.modifier = match self.modifier {
            SrcModifier::None => SrcModifier::Negate,
            SrcModifier::Negate => SrcModifier::None,
            SrcModifier::Abs => SrcModifier::AbsNegate,
            SrcModifier::AbsNegate => SrcModifier::Abs,
        };
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DstReg {
    Temp(u16),
    Output(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteMask(pub u8);

impl WriteMask {
    pub const XYZW: WriteMask = WriteMask(0b1111);
    pub const X: WriteMask = WriteMask(0b0001);

    pub fn writes(self, chan: usize) -> bool {
        self.0 & (1 << chan) != 0
    }

    pub fn component_count(self) -> u32 {
        (self.0 & 0b1111).count_ones()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dst {
    pub reg: DstReg,
    pub mask: WriteMask,
}

impl Dst {
    pub fn new(reg: DstReg) -> Dst {
        Dst {
            reg,
            mask: WriteMask::XYZW,
        }
    }

    pub fn masked(reg: DstReg, mask: WriteMask) -> Dst {
        Dst { reg, mask }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Mov,
    Add,
    Sub,
    Mul,
    /// `a * b + c`, fused.
    Mad,
    Min,
    Max,
    /// 3-component dot product, replicated to all written channels.
    Dp3,
    /// 4-component dot product, replicated to all written channels.
    Dp4,
    /// `1 / src.x`, replicated.
    Rcp,
    /// `1 / sqrt(src.x)`, replicated.
    Rsq,
    /// Fractional part, `x - floor(x)`.
    Frc,
    /// `(a < b) ? 1.0 : 0.0` per channel.
    Slt,
    /// `(a >= b) ? 1.0 : 0.0` per channel.
    Sge,
    /// Reinterpret each channel's bits as u32 and convert to f32.
    Utof,
}

impl Op {
    pub fn num_srcs(self) -> usize {
        match self {
            Op::Mov | Op::Rcp | Op::Rsq | Op::Frc | Op::Utof => 1,
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Min
            | Op::Max
            | Op::Dp3
            | Op::Dp4
            | Op::Slt
            | Op::Sge => 2,
            Op::Mad => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub op: Op,
    pub dst: Dst,
    pub srcs: Vec<Src>,
}

impl Inst {
    pub fn new(op: Op, dst: Dst, srcs: Vec<Src>) -> Inst {
        Inst { op, dst, srcs }
    }
}

/// Meaning of an output slot, as consumed by the fixed-function stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semantic {
    Position,
    /// Primary (0) or secondary (1) vertex color.
    Color(u8),
    ClipVertex,
    /// Clip-distance vector 0 (planes 0..4) or 1 (planes 4..8).
    ClipDist(u8),
    EdgeFlag,
    ViewportIndex,
    PointSize,
    Generic(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputDecl {
    pub slot: u16,
    pub semantic: Semantic,
}

/// Declared resource usage. Counts mirror the highest referenced register
/// plus one; `num_sampler_views: None` means the shader never references
/// views separately from samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDecls {
    pub num_samplers: u16,
    pub num_sampler_views: Option<u16>,
    pub num_images: u16,
}

/// Flat token-stream shader form: a linear instruction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenShader {
    pub outputs: Vec<OutputDecl>,
    pub resources: ResourceDecls,
    pub insts: Vec<Inst>,
}

/// Structured tree shader form: nested blocks with masked control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeShader {
    pub outputs: Vec<OutputDecl>,
    pub resources: ResourceDecls,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Op(Inst),
    /// Per-lane conditional: lanes where `cond.x != 0` run `then_block`,
    /// the rest run `else_block`. Both sides execute; writes are blended.
    If {
        cond: Src,
        then_block: Block,
        else_block: Option<Block>,
    },
    /// Fixed trip-count loop.
    Loop { count: u32, body: Block },
}

/// A vertex shader in either accepted representation.
///
/// The pipeline dispatches on the representation once, at variant-creation
/// time; both forms lower into the same executable body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VertexShader {
    Tokens(TokenShader),
    Tree(TreeShader),
}

impl VertexShader {
    pub fn outputs(&self) -> &[OutputDecl] {
        match self {
            VertexShader::Tokens(s) => &s.outputs,
            VertexShader::Tree(s) => &s.outputs,
        }
    }

    pub fn resources(&self) -> ResourceDecls {
        match self {
            VertexShader::Tokens(s) => s.resources,
            VertexShader::Tree(s) => s.resources,
        }
    }

    /// Serialized IR bytes, used as the persistent-cache hash input.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ShaderError> {
        Ok(postcard::to_allocvec(self)?)
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("{op:?} expects {expected} source operands, got {got}")]
    OperandCount { op: Op, expected: usize, got: usize },
    #[error("{file} register index {index} exceeds maximum {max}")]
    RegisterIndex {
        file: &'static str,
        index: u16,
        max: u16,
    },
    #[error("control flow nesting depth exceeds maximum {MAX_CONTROL_FLOW_NESTING}")]
    ControlFlowNesting,
    #[error("duplicate output declaration for slot {0}")]
    DuplicateOutput(u16),
    #[error("shader serialization failed: {0}")]
    Serialize(#[from] postcard::Error),
}

pub(crate) fn validate_src(src: &Src) -> Result<(), ShaderError> {
    match src.reg {
        SrcReg::Temp(i) if i >= MAX_SHADER_TEMPS => Err(ShaderError::RegisterIndex {
            file: "temp",
            index: i,
            max: MAX_SHADER_TEMPS - 1,
        }),
        SrcReg::Input(i) if i >= MAX_SHADER_INPUTS => Err(ShaderError::RegisterIndex {
            file: "input",
            index: i,
            max: MAX_SHADER_INPUTS - 1,
        }),
        SrcReg::Const(i) if i >= MAX_SHADER_CONSTS => Err(ShaderError::RegisterIndex {
            file: "const",
            index: i,
            max: MAX_SHADER_CONSTS - 1,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn validate_dst(dst: &Dst) -> Result<(), ShaderError> {
    match dst.reg {
        DstReg::Temp(i) if i >= MAX_SHADER_TEMPS => Err(ShaderError::RegisterIndex {
            file: "temp",
            index: i,
            max: MAX_SHADER_TEMPS - 1,
        }),
        DstReg::Output(i) if i >= MAX_SHADER_OUTPUTS => Err(ShaderError::RegisterIndex {
            file: "output",
            index: i,
            max: MAX_SHADER_OUTPUTS - 1,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn validate_inst(inst: &Inst) -> Result<(), ShaderError> {
    let expected = inst.op.num_srcs();
    if inst.srcs.len() != expected {
        return Err(ShaderError::OperandCount {
            op: inst.op,
            expected,
            got: inst.srcs.len(),
        });
    }
    validate_dst(&inst.dst)?;
    for src in &inst.srcs {
        validate_src(src)?;
    }
    Ok(())
}
