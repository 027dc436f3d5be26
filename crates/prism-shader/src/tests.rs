use pretty_assertions::assert_eq;

use crate::exec::{BodyParams, SystemValues};
use crate::info::ShaderInfo;
use crate::ir::{
    Block, Dst, DstReg, Inst, Op, OutputDecl, ResourceDecls, Semantic, ShaderError, Src, SrcReg,
    Stmt, Swizzle, SystemValue, TokenShader, TreeShader, VertexShader, WriteMask,
};
use crate::soa::{SoaF32, SoaU32};

fn decl(slot: u16, semantic: Semantic) -> OutputDecl {
    OutputDecl { slot, semantic }
}

fn mov(dst: DstReg, src: SrcReg) -> Inst {
    Inst::new(Op::Mov, Dst::new(dst), vec![Src::new(src)])
}

fn token_shader(outputs: Vec<OutputDecl>, insts: Vec<Inst>) -> VertexShader {
    VertexShader::Tokens(TokenShader {
        outputs,
        resources: ResourceDecls::default(),
        insts,
    })
}

fn run_body(
    shader: &VertexShader,
    inputs: &[[SoaF32; 4]],
    constants: &[[f32; 4]],
    lanes: usize,
) -> Vec<[Option<SoaF32>; 4]> {
    let body = shader.lower().unwrap();
    let system = SystemValues::default();
    let params = BodyParams {
        constants,
        system: &system,
        exec_mask: SoaU32::splat(!0),
        lanes,
    };
    let mut outputs = vec![[None; 4]; body.num_outputs() as usize];
    body.run(&params, inputs, &mut outputs);
    outputs
}

fn lane_input(f: impl Fn(usize, usize) -> f32) -> [SoaF32; 4] {
    let mut out = [SoaF32::ZERO; 4];
    for (c, chan) in out.iter_mut().enumerate() {
        *chan = SoaF32::from_fn(|l| f(c, l));
    }
    out
}

#[test]
fn token_passthrough_copies_inputs() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![mov(DstReg::Output(0), SrcReg::Input(0))],
    );
    let input = lane_input(|c, l| (c * 10 + l) as f32);
    let outputs = run_body(&shader, &[input], &[], 4);
    for c in 0..4 {
        assert_eq!(outputs[0][c].unwrap().0[..4], input[c].0[..4]);
    }
}

#[test]
fn mad_with_swizzle_and_writemask() {
    // o0.xy = v0.yx * c0 + c1; o0.zw untouched.
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![Inst::new(
            Op::Mad,
            Dst::masked(DstReg::Output(0), WriteMask(0b0011)),
            vec![
                Src::swizzled(SrcReg::Input(0), Swizzle([1, 0, 2, 3])),
                Src::new(SrcReg::Const(0)),
                Src::new(SrcReg::Const(1)),
            ],
        )],
    );
    let input = lane_input(|c, _| c as f32); // (0, 1, 2, 3)
    let constants = [[2.0, 2.0, 2.0, 2.0], [0.5, 0.5, 0.5, 0.5]];
    let outputs = run_body(&shader, &[input], &constants, 4);
    assert_eq!(outputs[0][0].unwrap().0[0], 2.5); // y * 2 + 0.5
    assert_eq!(outputs[0][1].unwrap().0[0], 0.5); // x * 2 + 0.5
    assert!(outputs[0][2].is_none());
    assert!(outputs[0][3].is_none());
}

#[test]
fn dp4_replicates_dot() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![Inst::new(
            Op::Dp4,
            Dst::new(DstReg::Output(0)),
            vec![Src::new(SrcReg::Input(0)), Src::new(SrcReg::Const(0))],
        )],
    );
    let input = lane_input(|c, _| (c + 1) as f32); // (1, 2, 3, 4)
    let constants = [[1.0, 1.0, 1.0, 1.0]];
    let outputs = run_body(&shader, &[input], &constants, 4);
    for c in 0..4 {
        assert_eq!(outputs[0][c].unwrap().0[0], 10.0);
    }
}

#[test]
fn tree_if_blends_per_lane() {
    // t0 = v0; if (v0.x) o0 = 1 else o0 = 2
    let one = Src::new(SrcReg::Imm([1.0; 4]));
    let two = Src::new(SrcReg::Imm([2.0; 4]));
    let shader = VertexShader::Tree(TreeShader {
        outputs: vec![decl(0, Semantic::Position)],
        resources: ResourceDecls::default(),
        body: Block {
            stmts: vec![Stmt::If {
                cond: Src::new(SrcReg::Input(0)),
                then_block: Block {
                    stmts: vec![Inst::new(Op::Mov, Dst::new(DstReg::Output(0)), vec![one])]
                        .into_iter()
                        .map(Stmt::Op)
                        .collect(),
                },
                else_block: Some(Block {
                    stmts: vec![Inst::new(Op::Mov, Dst::new(DstReg::Output(0)), vec![two])]
                        .into_iter()
                        .map(Stmt::Op)
                        .collect(),
                }),
            }],
        },
    });
    // Lanes 0 and 2 take the then side.
    let input = lane_input(|c, l| if c == 0 && l % 2 == 0 { 5.0 } else { 0.0 });
    let outputs = run_body(&shader, &[input], &[], 4);
    let x = outputs[0][0].unwrap();
    assert_eq!(&x.0[..4], &[1.0, 2.0, 1.0, 2.0]);
}

#[test]
fn tree_loop_accumulates() {
    // t0 = 0; loop 3 { t0 = t0 + 1 }; o0 = t0
    let one = Src::new(SrcReg::Imm([1.0; 4]));
    let shader = VertexShader::Tree(TreeShader {
        outputs: vec![decl(0, Semantic::Position)],
        resources: ResourceDecls::default(),
        body: Block {
            stmts: vec![
                Stmt::Op(mov(DstReg::Temp(0), SrcReg::Imm([0.0; 4]))),
                Stmt::Loop {
                    count: 3,
                    body: Block {
                        stmts: vec![Stmt::Op(Inst::new(
                            Op::Add,
                            Dst::new(DstReg::Temp(0)),
                            vec![Src::new(SrcReg::Temp(0)), one],
                        ))],
                    },
                },
                Stmt::Op(mov(DstReg::Output(0), SrcReg::Temp(0))),
            ],
        },
    });
    let outputs = run_body(&shader, &[], &[], 4);
    assert_eq!(outputs[0][0].unwrap().0[0], 3.0);
}

#[test]
fn utof_converts_vertex_id() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![Inst::new(
            Op::Utof,
            Dst::new(DstReg::Output(0)),
            vec![Src::new(SrcReg::System(SystemValue::VertexId))],
        )],
    );
    let body = shader.lower().unwrap();
    let system = SystemValues {
        vertex_id: SoaU32::from_fn(|l| 100 + l as u32),
        ..SystemValues::default()
    };
    let params = BodyParams {
        constants: &[],
        system: &system,
        exec_mask: SoaU32::splat(!0),
        lanes: 4,
    };
    let mut outputs = vec![[None; 4]; 1];
    body.run(&params, &[], &mut outputs);
    assert_eq!(&outputs[0][0].unwrap().0[..4], &[100.0, 101.0, 102.0, 103.0]);
}

#[test]
fn conditional_writes_respect_exec_mask() {
    // if (1.0) o0 = 7 — unconditionally true, but masked lanes must keep
    // their pre-branch value.
    let seven = Src::new(SrcReg::Imm([7.0; 4]));
    let shader = VertexShader::Tree(TreeShader {
        outputs: vec![decl(0, Semantic::Position)],
        resources: ResourceDecls::default(),
        body: Block {
            stmts: vec![
                Stmt::Op(mov(DstReg::Output(0), SrcReg::Imm([0.0; 4]))),
                Stmt::If {
                    cond: Src::new(SrcReg::Imm([1.0; 4])),
                    then_block: Block {
                        stmts: vec![Stmt::Op(Inst::new(
                            Op::Mov,
                            Dst::new(DstReg::Output(0)),
                            vec![seven],
                        ))],
                    },
                    else_block: None,
                },
            ],
        },
    });
    let body = shader.lower().unwrap();
    let system = SystemValues::default();
    let params = BodyParams {
        constants: &[],
        system: &system,
        // Only lanes 0 and 1 active.
        exec_mask: SoaU32::from_fn(|l| if l < 2 { !0 } else { 0 }),
        lanes: 4,
    };
    let mut outputs = vec![[None; 4]; 1];
    body.run(&params, &[], &mut outputs);
    assert_eq!(&outputs[0][0].unwrap().0[..4], &[7.0, 7.0, 0.0, 0.0]);
}

#[test]
fn info_counts_inputs_outputs_and_clipdist() {
    let shader = token_shader(
        vec![
            decl(0, Semantic::Position),
            decl(1, Semantic::ClipDist(0)),
            decl(2, Semantic::ClipDist(1)),
        ],
        vec![
            mov(DstReg::Output(0), SrcReg::Input(3)),
            Inst::new(
                Op::Mov,
                Dst::masked(DstReg::Output(1), WriteMask(0b0111)),
                vec![Src::new(SrcReg::Input(0))],
            ),
            Inst::new(
                Op::Mov,
                Dst::masked(DstReg::Output(2), WriteMask(0b0001)),
                vec![Src::new(SrcReg::Input(0))],
            ),
        ],
    );
    let info = ShaderInfo::of(&shader);
    assert_eq!(info.num_inputs, 4);
    assert_eq!(info.num_outputs, 3);
    assert_eq!(info.position_output, Some(0));
    assert_eq!(info.clipdist_outputs, [Some(1), Some(2)]);
    assert_eq!(info.num_written_clipdistance, 4);
    assert_eq!(info.num_sampler_views, None);
    assert_eq!(info.resolved_clipvertex(), Some(0));
}

#[test]
fn info_distinct_clipvertex() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position), decl(1, Semantic::ClipVertex)],
        vec![
            mov(DstReg::Output(0), SrcReg::Input(0)),
            mov(DstReg::Output(1), SrcReg::Input(1)),
        ],
    );
    let info = ShaderInfo::of(&shader);
    assert_eq!(info.clipvertex_output, Some(1));
    assert_eq!(info.resolved_clipvertex(), Some(1));
}

#[test]
fn lower_rejects_bad_operand_count() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![Inst::new(
            Op::Add,
            Dst::new(DstReg::Output(0)),
            vec![Src::new(SrcReg::Input(0))],
        )],
    );
    match shader.lower() {
        Err(ShaderError::OperandCount { op: Op::Add, expected: 2, got: 1 }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn lower_rejects_out_of_range_temp() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![mov(DstReg::Temp(4096), SrcReg::Input(0))],
    );
    assert!(matches!(
        shader.lower(),
        Err(ShaderError::RegisterIndex { file: "temp", .. })
    ));
}

#[test]
fn lower_rejects_duplicate_output_decl() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position), decl(0, Semantic::Color(0))],
        vec![mov(DstReg::Output(0), SrcReg::Input(0))],
    );
    assert!(matches!(shader.lower(), Err(ShaderError::DuplicateOutput(0))));
}

#[test]
fn lower_rejects_excessive_nesting() {
    let mut block = Block {
        stmts: vec![Stmt::Op(mov(DstReg::Output(0), SrcReg::Input(0)))],
    };
    for _ in 0..40 {
        block = Block {
            stmts: vec![Stmt::If {
                cond: Src::new(SrcReg::Input(0)),
                then_block: block,
                else_block: None,
            }],
        };
    }
    let shader = VertexShader::Tree(TreeShader {
        outputs: vec![decl(0, Semantic::Position)],
        resources: ResourceDecls::default(),
        body: block,
    });
    assert!(matches!(shader.lower(), Err(ShaderError::ControlFlowNesting)));
}

#[test]
fn ir_bytes_are_deterministic() {
    let shader = token_shader(
        vec![decl(0, Semantic::Position)],
        vec![mov(DstReg::Output(0), SrcReg::Input(0))],
    );
    assert_eq!(shader.to_bytes().unwrap(), shader.to_bytes().unwrap());
}
