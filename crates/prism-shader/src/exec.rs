//! Lowering and SoA execution of shader bodies.
//!
//! Both IR forms lower into a [`ShaderBody`]: a validated statement list
//! with resolved register counts. The body is plain data (it is the part of
//! a compiled variant that round-trips through the persistent cache) and
//! executes over lane groups with masked blending for control flow.

use serde::{Deserialize, Serialize};

use crate::info::ShaderInfo;
use crate::ir::{
    validate_inst, validate_src, Block, DstReg, Inst, Op, ShaderError, Src, SrcModifier, SrcReg,
    Stmt, TokenShader, TreeShader, VertexShader,
};
use crate::limits::MAX_CONTROL_FLOW_NESTING;
use crate::soa::{SoaF32, SoaU32};

/// Per-draw scalar state exposed to shaders as system values.
///
/// `vertex_id` and `vertex_id_nobase` vary per lane; the rest are uniform
/// across a draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemValues {
    pub vertex_id: SoaU32,
    pub vertex_id_nobase: SoaU32,
    pub instance_id: u32,
    pub base_vertex: u32,
    pub base_instance: u32,
    pub first_vertex: u32,
    pub draw_id: u32,
    pub view_index: u32,
}

/// Parameter block for one body invocation.
pub struct BodyParams<'a> {
    /// Constant registers, one `[f32; 4]` per slot.
    pub constants: &'a [[f32; 4]],
    pub system: &'a SystemValues,
    /// Active-lane mask; conditional writes are suppressed on inactive
    /// lanes. Unconditional writes run on every lane (inactive lanes carry
    /// clamped duplicates of the last valid vertex).
    pub exec_mask: SoaU32,
    pub lanes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyStmt {
    Op(Inst),
    If {
        cond: Src,
        then_block: Vec<BodyStmt>,
        else_block: Vec<BodyStmt>,
    },
    Loop {
        count: u32,
        body: Vec<BodyStmt>,
    },
}

/// Executable shader body shared by both IR forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderBody {
    num_outputs: u32,
    num_temps: u32,
    stmts: Vec<BodyStmt>,
}

impl VertexShader {
    /// Lower this shader into its executable body, validating register
    /// indices, operand counts, and control-flow nesting.
    pub fn lower(&self) -> Result<ShaderBody, ShaderError> {
        let mut seen = [false; crate::limits::MAX_SHADER_OUTPUTS as usize];
        for decl in self.outputs() {
            let slot = decl.slot as usize;
            if slot >= seen.len() {
                return Err(ShaderError::RegisterIndex {
                    file: "output",
                    index: decl.slot,
                    max: crate::limits::MAX_SHADER_OUTPUTS - 1,
                });
            }
            if seen[slot] {
                return Err(ShaderError::DuplicateOutput(decl.slot));
            }
            seen[slot] = true;
        }

        let mut max_temp: Option<u16> = None;
        let stmts = match self {
            VertexShader::Tokens(TokenShader { insts, .. }) => {
                let mut out = Vec::with_capacity(insts.len());
                for inst in insts {
                    lower_inst(inst, &mut max_temp)?;
                    out.push(BodyStmt::Op(inst.clone()));
                }
                out
            }
            VertexShader::Tree(TreeShader { body, .. }) => lower_block(body, 0, &mut max_temp)?,
        };

        let info = ShaderInfo::of(self);
        Ok(ShaderBody {
            num_outputs: info.num_outputs,
            num_temps: max_temp.map_or(0, |m| u32::from(m) + 1),
            stmts,
        })
    }
}

fn note_temps(inst: &Inst, max_temp: &mut Option<u16>) {
    let mut note = |i: u16| *max_temp = Some(max_temp.map_or(i, |m| m.max(i)));
    if let DstReg::Temp(i) = inst.dst.reg {
        note(i);
    }
    for src in &inst.srcs {
        if let SrcReg::Temp(i) = src.reg {
            note(i);
        }
    }
}

fn lower_inst(inst: &Inst, max_temp: &mut Option<u16>) -> Result<(), ShaderError> {
    validate_inst(inst)?;
    note_temps(inst, max_temp);
    Ok(())
}

fn lower_block(
    block: &Block,
    depth: usize,
    max_temp: &mut Option<u16>,
) -> Result<Vec<BodyStmt>, ShaderError> {
    if depth > MAX_CONTROL_FLOW_NESTING {
        return Err(ShaderError::ControlFlowNesting);
    }
    let mut out = Vec::with_capacity(block.stmts.len());
    for stmt in &block.stmts {
        match stmt {
            Stmt::Op(inst) => {
                lower_inst(inst, max_temp)?;
                out.push(BodyStmt::Op(inst.clone()));
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                validate_src(cond)?;
                if let SrcReg::Temp(i) = cond.reg {
                    *max_temp = Some(max_temp.map_or(i, |m| m.max(i)));
                }
                out.push(BodyStmt::If {
                    cond: *cond,
                    then_block: lower_block(then_block, depth + 1, max_temp)?,
                    else_block: match else_block {
                        Some(b) => lower_block(b, depth + 1, max_temp)?,
                        None => Vec::new(),
                    },
                });
            }
            Stmt::Loop { count, body } => {
                out.push(BodyStmt::Loop {
                    count: *count,
                    body: lower_block(body, depth + 1, max_temp)?,
                });
            }
        }
    }
    Ok(out)
}

struct ExecState<'a> {
    params: &'a BodyParams<'a>,
    inputs: &'a [[SoaF32; 4]],
    temps: Vec<[SoaF32; 4]>,
    outputs: &'a mut [[Option<SoaF32>; 4]],
}

impl ShaderBody {
    pub fn num_outputs(&self) -> u32 {
        self.num_outputs
    }

    /// Execute the body for one lane group.
    ///
    /// `outputs` must hold `num_outputs` slots; channels the shader never
    /// writes stay `None`. Execution is total: there are no error paths at
    /// this layer.
    pub fn run(
        &self,
        params: &BodyParams<'_>,
        inputs: &[[SoaF32; 4]],
        outputs: &mut [[Option<SoaF32>; 4]],
    ) {
        debug_assert!(outputs.len() >= self.num_outputs as usize);
        debug_assert!(params.lanes <= crate::soa::MAX_SOA_LANES);
        for slot in outputs.iter_mut() {
            *slot = [None; 4];
        }
        let mut state = ExecState {
            params,
            inputs,
            temps: vec![[SoaF32::ZERO; 4]; self.num_temps as usize],
            outputs,
        };
        exec_stmts(&self.stmts, None, &mut state);
    }
}

fn exec_stmts(stmts: &[BodyStmt], mask: Option<SoaU32>, state: &mut ExecState<'_>) {
    for stmt in stmts {
        match stmt {
            BodyStmt::Op(inst) => exec_inst(inst, mask, state),
            BodyStmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond_val = read_src(cond, state);
                let cond_mask = cond_val[0].cmp_eq(SoaF32::ZERO);
                // Lanes with cond.x != 0 take the then side.
                let parent = mask.unwrap_or(state.params.exec_mask);
                let then_mask = parent & !cond_mask;
                let else_mask = parent & cond_mask;
                exec_stmts(then_block, Some(then_mask), state);
                if !else_block.is_empty() {
                    exec_stmts(else_block, Some(else_mask), state);
                }
            }
            BodyStmt::Loop { count, body } => {
                for _ in 0..*count {
                    exec_stmts(body, mask, state);
                }
            }
        }
    }
}

fn read_src(src: &Src, state: &ExecState<'_>) -> [SoaF32; 4] {
    let sys = state.params.system;
    let base: [SoaF32; 4] = match src.reg {
        SrcReg::Temp(i) => state.temps[i as usize],
        SrcReg::Input(i) => state
            .inputs
            .get(i as usize)
            .copied()
            .unwrap_or([SoaF32::ZERO; 4]),
        SrcReg::Const(i) => {
            // Out-of-range constant reads yield zero rather than trapping.
            let v = state
                .params
                .constants
                .get(i as usize)
                .copied()
                .unwrap_or([0.0; 4]);
            [
                SoaF32::splat(v[0]),
                SoaF32::splat(v[1]),
                SoaF32::splat(v[2]),
                SoaF32::splat(v[3]),
            ]
        }
        SrcReg::System(sv) => {
            let bits = match sv {
                crate::ir::SystemValue::VertexId => sys.vertex_id,
                crate::ir::SystemValue::VertexIdNoBase => sys.vertex_id_nobase,
                crate::ir::SystemValue::InstanceId => SoaU32::splat(sys.instance_id),
                crate::ir::SystemValue::BaseVertex => SoaU32::splat(sys.base_vertex),
                crate::ir::SystemValue::BaseInstance => SoaU32::splat(sys.base_instance),
                crate::ir::SystemValue::FirstVertex => SoaU32::splat(sys.first_vertex),
                crate::ir::SystemValue::DrawId => SoaU32::splat(sys.draw_id),
                crate::ir::SystemValue::ViewIndex => SoaU32::splat(sys.view_index),
            };
            [SoaF32::from_bits(bits); 4]
        }
        SrcReg::Imm(v) => [
            SoaF32::splat(v[0]),
            SoaF32::splat(v[1]),
            SoaF32::splat(v[2]),
            SoaF32::splat(v[3]),
        ],
    };

    let mut out = [SoaF32::ZERO; 4];
    for (c, chan) in out.iter_mut().enumerate() {
        let v = base[(src.swizzle.0[c] & 3) as usize];
        *chan = match src.modifier {
            SrcModifier::None => v,
            SrcModifier::Negate => -v,
            SrcModifier::Abs => v.abs(),
            SrcModifier::AbsNegate => -v.abs(),
        };
    }
    out
}

fn exec_inst(inst: &Inst, mask: Option<SoaU32>, state: &mut ExecState<'_>) {
    let mut srcs = [[SoaF32::ZERO; 4]; 3];
    for (i, src) in inst.srcs.iter().enumerate() {
        srcs[i] = read_src(src, state);
    }
    let [a, b, c] = srcs;

    let per_chan = |f: &dyn Fn(usize) -> SoaF32| -> [SoaF32; 4] {
        [f(0), f(1), f(2), f(3)]
    };

    let one = SoaF32::splat(1.0);
    let value: [SoaF32; 4] = match inst.op {
        Op::Mov => a,
        Op::Add => per_chan(&|i| a[i] + b[i]),
        Op::Sub => per_chan(&|i| a[i] - b[i]),
        Op::Mul => per_chan(&|i| a[i] * b[i]),
        Op::Mad => per_chan(&|i| a[i].mul_add(b[i], c[i])),
        Op::Min => per_chan(&|i| a[i].min(b[i])),
        Op::Max => per_chan(&|i| a[i].max(b[i])),
        Op::Dp3 => {
            let d = a[0].mul_add(b[0], a[1].mul_add(b[1], a[2] * b[2]));
            [d; 4]
        }
        Op::Dp4 => {
            let d = a[0].mul_add(b[0], a[1].mul_add(b[1], a[2].mul_add(b[2], a[3] * b[3])));
            [d; 4]
        }
        Op::Rcp => [one.div(a[0]); 4],
        Op::Rsq => [one.div(a[0].sqrt()); 4],
        Op::Frc => per_chan(&|i| a[i] - a[i].floor()),
        Op::Slt => per_chan(&|i| SoaF32::select(a[i].cmp_lt(b[i]), one, SoaF32::ZERO)),
        Op::Sge => per_chan(&|i| SoaF32::select(a[i].cmp_ge(b[i]), one, SoaF32::ZERO)),
        Op::Utof => per_chan(&|i| {
            let bits = a[i].to_bits();
            SoaF32::from_fn(|l| bits.0[l] as f32)
        }),
    };

    for chan in 0..4 {
        if !inst.dst.mask.writes(chan) {
            continue;
        }
        let slot: &mut SoaF32 = match inst.dst.reg {
            DstReg::Temp(i) => &mut state.temps[i as usize][chan],
            DstReg::Output(i) => state.outputs[i as usize][chan].get_or_insert(SoaF32::ZERO),
        };
        *slot = match mask {
            Some(m) => SoaF32::select(m, value[chan], *slot),
            None => value[chan],
        };
    }
}
