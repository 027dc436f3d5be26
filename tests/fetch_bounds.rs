//! Bounds-checked fetching: strict validity comparison, masked zero-fill,
//! and overflow fail-closed behavior, observed through end-to-end draws.

use pretty_assertions::assert_eq;

use prism_draw::layout::read_clip_pos;
use prism_draw::{
    DrawArgs, DrawBuffer, DrawJit, JitContext, JitResources, PipelineState, Variant,
    VertexBufferBinding, VertexElement, VertexFormat, Viewport, TOTAL_CLIP_PLANES,
};
use prism_shader::{
    Dst, DstReg, Inst, Op, OutputDecl, ResourceDecls, Semantic, Src, SrcReg, TokenShader,
    VertexShader,
};

/// Position pass-through: `mov o0, v0`.
fn passthrough() -> VertexShader {
    VertexShader::Tokens(TokenShader {
        outputs: vec![OutputDecl {
            slot: 0,
            semantic: Semantic::Position,
        }],
        resources: ResourceDecls::default(),
        insts: vec![Inst::new(
            Op::Mov,
            Dst::new(DstReg::Output(0)),
            vec![Src::new(SrcReg::Input(0))],
        )],
    })
}

fn compile(element: VertexElement) -> std::sync::Arc<Variant> {
    let elements = [element];
    let state = PipelineState {
        vertex_elements: &elements,
        // Keep positions in clip space so the stored clip_pos and data both
        // reflect the raw fetch result.
        bypass_viewport: true,
        ..PipelineState::default()
    };
    let mut jit = DrawJit::new();
    let vs = jit.create_vertex_shader(passthrough()).unwrap();
    let key = jit.make_variant_key(vs, &state).unwrap();
    jit.get_or_create_variant(vs, &key).unwrap()
}

struct Buffer<'a> {
    data: &'a [u8],
    offset: u32,
}

fn execute(
    variant: &Variant,
    buffer: Buffer<'_>,
    count: u32,
    instance: (u32, u32),
) -> Vec<u8> {
    let mut arena = vec![0u8; variant.required_arena_size(count)];
    let buffers = [DrawBuffer {
        data: buffer.data,
        size: buffer.data.len() as u32,
    }];
    let bindings = [VertexBufferBinding {
        is_user_buffer: 0,
        buffer_offset: buffer.offset,
    }];
    let planes = [[0.0; 4]; TOTAL_CLIP_PLANES];
    let viewports = [Viewport::IDENTITY];
    let context = JitContext {
        planes: &planes,
        viewports: &viewports,
    };
    let resources = JitResources {
        constants: &[],
        samplers: &[],
        textures: &[],
        images: &[],
    };
    let mut args = DrawArgs {
        context: &context,
        resources: &resources,
        vertex_headers: &mut arena,
        vbuffers: &buffers,
        count,
        start_or_fetch_elt_max: 0,
        stride: 0,
        vb_bindings: &bindings,
        instance_id: instance.0,
        vertex_id_offset: 0,
        start_instance: instance.1,
        fetch_elts: None,
        draw_id: 0,
        view_id: 0,
    };
    variant.execute(&mut args);
    arena
}

fn float1_element(offset: u32, stride: u32) -> VertexElement {
    VertexElement {
        src_format: VertexFormat::Float32x1,
        vertex_buffer_index: 0,
        src_offset: offset,
        src_stride: stride,
        instance_divisor: 0,
    }
}

#[test]
fn boundary_comparison_is_strict() {
    // 8-byte buffer, 4-byte element, stride 1:
    // buffer_size_adjusted = 8 - 3 - 0 = 5. Offsets 0..=4 are valid,
    // offset 5 is the first invalid one.
    let data: Vec<u8> = (0u8..8).collect();
    let variant = compile(float1_element(0, 1));
    let arena = execute(&variant, Buffer { data: &data, offset: 0 }, 6, (0, 0));

    let hdr = variant.header_layout();
    for i in 0..5 {
        let expected = f32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let got = read_clip_pos(&arena, hdr, i);
        assert_eq!(got[0], expected);
        // Fill channels of a valid lane: (0, 0, 1).
        assert_eq!(&got[1..], &[0.0, 0.0, 1.0]);
    }
    // offset == buffer_size_adjusted: invalid, exactly zero everywhere —
    // the fill channels are masked too.
    assert_eq!(read_clip_pos(&arena, hdr, 5), [0.0; 4]);
}

#[test]
fn out_of_bounds_lanes_ignore_garbage() {
    let data = vec![0xff_u8; 32]; // two float4 vertices of garbage bits
    let variant = compile(VertexElement {
        src_format: VertexFormat::Float32x4,
        vertex_buffer_index: 0,
        src_offset: 0,
        src_stride: 16,
        instance_divisor: 0,
    });
    let arena = execute(&variant, Buffer { data: &data, offset: 0 }, 4, (0, 0));
    let hdr = variant.header_layout();
    // Lanes 0 and 1 read the garbage bit patterns (0xffffffff is NaN).
    assert!(read_clip_pos(&arena, hdr, 0)[0].is_nan());
    // Lanes 2 and 3 run past the buffer and must be exactly zero.
    assert_eq!(read_clip_pos(&arena, hdr, 2), [0.0; 4]);
    assert_eq!(read_clip_pos(&arena, hdr, 3), [0.0; 4]);
}

#[test]
fn buffer_offset_shrinks_the_valid_range() {
    // Same 8-byte buffer, but the binding starts 4 bytes in:
    // buffer_size_adjusted = 8 - 3 - 4 = 1, so only offset 0 is valid.
    let data: Vec<u8> = (0u8..8).collect();
    let variant = compile(float1_element(0, 1));
    let arena = execute(&variant, Buffer { data: &data, offset: 4 }, 3, (0, 0));
    let hdr = variant.header_layout();
    let expected = f32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    assert_eq!(read_clip_pos(&arena, hdr, 0)[0], expected);
    assert_eq!(read_clip_pos(&arena, hdr, 1), [0.0; 4]);
    assert_eq!(read_clip_pos(&arena, hdr, 2), [0.0; 4]);
}

#[test]
fn undersized_buffer_fails_closed_to_zero() {
    // block_size - 1 underflows the size: every lane invalid.
    let data = [0u8; 2];
    let variant = compile(VertexElement {
        src_format: VertexFormat::Float32x4,
        vertex_buffer_index: 0,
        src_offset: 0,
        src_stride: 16,
        instance_divisor: 0,
    });
    let arena = execute(&variant, Buffer { data: &data, offset: 0 }, 4, (0, 0));
    let hdr = variant.header_layout();
    for i in 0..4 {
        assert_eq!(read_clip_pos(&arena, hdr, i), [0.0; 4]);
    }
}

#[test]
fn source_offset_overflow_fails_closed() {
    let data = vec![0x3f_u8; 64];
    let variant = compile(VertexElement {
        src_format: VertexFormat::Float32x4,
        vertex_buffer_index: 0,
        src_offset: 16,
        src_stride: 16,
        instance_divisor: 0,
    });
    // buffer_offset + src_offset overflows u32.
    let arena = execute(
        &variant,
        Buffer {
            data: &data,
            offset: u32::MAX - 4,
        },
        4,
        (0, 0),
    );
    let hdr = variant.header_layout();
    for i in 0..4 {
        assert_eq!(read_clip_pos(&arena, hdr, i), [0.0; 4]);
    }
}

#[test]
fn unbound_buffer_index_fetches_zero() {
    let data = vec![0x3f_u8; 64];
    let variant = compile(VertexElement {
        src_format: VertexFormat::Float32x4,
        vertex_buffer_index: 5, // no such buffer
        src_offset: 0,
        src_stride: 16,
        instance_divisor: 0,
    });
    let arena = execute(&variant, Buffer { data: &data, offset: 0 }, 4, (0, 0));
    let hdr = variant.header_layout();
    assert_eq!(read_clip_pos(&arena, hdr, 0), [0.0; 4]);
}

#[test]
fn unbound_element_sentinel_fetches_zero() {
    // Shader declares one input, nothing bound: the key carries the
    // sentinel element and the fetch never touches memory.
    let state = PipelineState {
        vertex_elements: &[],
        bypass_viewport: true,
        ..PipelineState::default()
    };
    let mut jit = DrawJit::new();
    let vs = jit.create_vertex_shader(passthrough()).unwrap();
    let key = jit.make_variant_key(vs, &state).unwrap();
    assert!(key.vertex_elements[0].src_format.is_none());
    let variant = jit.get_or_create_variant(vs, &key).unwrap();

    let arena = execute(&variant, Buffer { data: &[], offset: 0 }, 4, (0, 0));
    let hdr = variant.header_layout();
    for i in 0..4 {
        assert_eq!(read_clip_pos(&arena, hdr, i), [0.0; 4]);
    }
}

#[test]
fn instanced_attribute_reads_one_record_per_draw() {
    let values = [
        [10.0f32, 0.0, 0.0, 1.0],
        [20.0, 0.0, 0.0, 1.0],
        [30.0, 0.0, 0.0, 1.0],
        [40.0, 0.0, 0.0, 1.0],
    ];
    let data: Vec<u8> = values
        .iter()
        .flatten()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let variant = compile(VertexElement {
        src_format: VertexFormat::Float32x4,
        vertex_buffer_index: 0,
        src_offset: 0,
        src_stride: 16,
        instance_divisor: 2,
    });
    // index = start_instance + instance_id / divisor = 1 + 5/2 = 3.
    let arena = execute(&variant, Buffer { data: &data, offset: 0 }, 4, (5, 1));
    let hdr = variant.header_layout();
    for i in 0..4 {
        assert_eq!(read_clip_pos(&arena, hdr, i), values[3]);
    }
}

#[test]
fn instance_index_overflow_redirects_whole_element() {
    let values = [[10.0f32, 20.0, 30.0, 1.0]; 4];
    let data: Vec<u8> = values
        .iter()
        .flatten()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let variant = compile(VertexElement {
        src_format: VertexFormat::Float32x4,
        vertex_buffer_index: 0,
        src_offset: 0,
        src_stride: 16,
        instance_divisor: 1,
    });
    // start_instance + instance_id / divisor overflows u32: the entire
    // element redirects to the zero fallback for every lane of the draw,
    // even though the buffer itself could satisfy the fetch.
    let arena = execute(
        &variant,
        Buffer { data: &data, offset: 0 },
        4,
        (1, u32::MAX),
    );
    let hdr = variant.header_layout();
    for i in 0..4 {
        assert_eq!(read_clip_pos(&arena, hdr, i), [0.0; 4]);
    }
}
