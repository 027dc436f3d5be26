//! Register-file and nesting limits accepted by the lowering pass.

pub const MAX_SHADER_INPUTS: u16 = 32;
pub const MAX_SHADER_OUTPUTS: u16 = 32;
pub const MAX_SHADER_TEMPS: u16 = 256;
pub const MAX_SHADER_CONSTS: u16 = 4096;
pub const MAX_CONTROL_FLOW_NESTING: usize = 32;
