//! Vertex shader IR and SoA execution for the prism vertex pipeline.
//!
//! Shaders arrive in one of two representations: a flat token-stream form
//! ([`TokenShader`]) or a structured tree form ([`TreeShader`]). Both lower
//! into the same executable [`ShaderBody`], which runs over SIMD-width lane
//! groups in struct-of-arrays layout. [`ShaderInfo`] summarizes everything
//! the pipeline needs to know about a shader without walking its IR again.

pub mod exec;
pub mod info;
pub mod ir;
pub mod limits;
pub mod soa;

#[cfg(test)]
mod tests;

pub use exec::{BodyParams, ShaderBody, SystemValues};
pub use info::ShaderInfo;
pub use ir::{
    Block, Dst, DstReg, Inst, Op, OutputDecl, ResourceDecls, Semantic, ShaderError, Src, SrcModifier,
    SrcReg, Stmt, Swizzle, SystemValue, TokenShader, TreeShader, VertexShader, WriteMask,
};
pub use soa::{SoaF32, SoaU32, MAX_SOA_LANES};
