//! Shader introspection.
//!
//! Everything the draw pipeline needs to know about a shader — input width,
//! output slot semantics, resource counts — collected in a single pass over
//! either IR form so later stages never walk the IR again.

use crate::ir::{Block, Inst, Semantic, Src, SrcReg, Stmt, VertexShader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInfo {
    /// Number of output slots, `max written or declared slot + 1`.
    pub num_outputs: u32,
    /// Number of input registers, `max referenced input + 1`.
    pub num_inputs: u32,
    pub num_samplers: u32,
    /// `None` when the shader never references sampler views separately
    /// from samplers.
    pub num_sampler_views: Option<u32>,
    pub num_images: u32,
    pub position_output: Option<u32>,
    /// Distinct clip-vertex output, if declared. Clipping falls back to the
    /// position output otherwise.
    pub clipvertex_output: Option<u32>,
    /// Slots holding clip-distance vectors 0 (planes 0..4) and 1 (4..8).
    pub clipdist_outputs: [Option<u32>; 2],
    /// Total clip-distance components actually written.
    pub num_written_clipdistance: u32,
    pub edgeflag_output: Option<u32>,
    pub writes_viewport_index: bool,
    /// Semantic per output slot, indexed by slot.
    pub semantics: Vec<Semantic>,
}

impl ShaderInfo {
    pub fn of(shader: &VertexShader) -> ShaderInfo {
        let mut max_output: Option<u16> = None;
        let mut max_input: Option<u16> = None;
        // Clip-distance write masks, discovered once slots are known.
        let mut written_masks: Vec<(u16, u8)> = Vec::new();

        for decl in shader.outputs() {
            max_output = Some(max_output.map_or(decl.slot, |m| m.max(decl.slot)));
        }

        visit_srcs(shader, &mut |src: &Src| note_input(src, &mut max_input));
        visit_insts(shader, &mut |inst: &Inst| {
            if let crate::ir::DstReg::Output(slot) = inst.dst.reg {
                max_output = Some(max_output.map_or(slot, |m| m.max(slot)));
                written_masks.push((slot, inst.dst.mask.0));
            }
        });

        let num_outputs = max_output.map_or(0, |m| u32::from(m) + 1);
        let num_inputs = max_input.map_or(0, |m| u32::from(m) + 1);

        let mut semantics = vec![Semantic::Generic(0); num_outputs as usize];
        for (slot, sem) in semantics.iter_mut().enumerate() {
            *sem = Semantic::Generic(slot as u8);
        }
        for decl in shader.outputs() {
            semantics[decl.slot as usize] = decl.semantic;
        }

        let find = |want: Semantic| -> Option<u32> {
            semantics
                .iter()
                .position(|&s| s == want)
                .map(|slot| slot as u32)
        };

        let clipdist_outputs = [find(Semantic::ClipDist(0)), find(Semantic::ClipDist(1))];
        let mut clipdist_mask = [0u8; 2];
        for (slot, mask) in &written_masks {
            for (i, cd) in clipdist_outputs.iter().enumerate() {
                if *cd == Some(u32::from(*slot)) {
                    clipdist_mask[i] |= mask;
                }
            }
        }
        let num_written_clipdistance =
            u32::from(clipdist_mask[0].count_ones()) + clipdist_mask[1].count_ones();

        let resources = shader.resources();

        ShaderInfo {
            num_outputs,
            num_inputs,
            num_samplers: u32::from(resources.num_samplers),
            num_sampler_views: resources.num_sampler_views.map(u32::from),
            num_images: u32::from(resources.num_images),
            position_output: find(Semantic::Position),
            clipvertex_output: find(Semantic::ClipVertex),
            clipdist_outputs,
            num_written_clipdistance,
            edgeflag_output: find(Semantic::EdgeFlag),
            writes_viewport_index: find(Semantic::ViewportIndex).is_some(),
            semantics,
        }
    }

    /// Clip-vertex slot resolved against the position output.
    pub fn resolved_clipvertex(&self) -> Option<u32> {
        self.clipvertex_output.or(self.position_output)
    }
}

fn note_input(src: &Src, max_input: &mut Option<u16>) {
    if let SrcReg::Input(i) = src.reg {
        *max_input = Some(max_input.map_or(i, |m| m.max(i)));
    }
}

fn visit_insts(shader: &VertexShader, f: &mut impl FnMut(&Inst)) {
    match shader {
        VertexShader::Tokens(s) => {
            for inst in &s.insts {
                f(inst);
            }
        }
        VertexShader::Tree(s) => visit_block(&s.body, f),
    }
}

fn visit_block(block: &Block, f: &mut impl FnMut(&Inst)) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Op(inst) => f(inst),
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                visit_block(then_block, f);
                if let Some(else_block) = else_block {
                    visit_block(else_block, f);
                }
            }
            Stmt::Loop { body, .. } => visit_block(body, f),
        }
    }
}

/// Visit every source operand, including `If` conditions.
fn visit_srcs(shader: &VertexShader, f: &mut impl FnMut(&Src)) {
    match shader {
        VertexShader::Tokens(s) => {
            for inst in &s.insts {
                for src in &inst.srcs {
                    f(src);
                }
            }
        }
        VertexShader::Tree(s) => visit_block_srcs(&s.body, f),
    }
}

fn visit_block_srcs(block: &Block, f: &mut impl FnMut(&Src)) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Op(inst) => {
                for src in &inst.srcs {
                    f(src);
                }
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                f(cond);
                visit_block_srcs(then_block, f);
                if let Some(else_block) = else_block {
                    visit_block_srcs(else_block, f);
                }
            }
            Stmt::Loop { body, .. } => visit_block_srcs(body, f),
        }
    }
}
