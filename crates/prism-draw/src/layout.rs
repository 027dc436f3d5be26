//! Native record layouts shared with the host runtime and the consuming
//! rasterizer.
//!
//! The runtime-facing records are `#[repr(C)]` mirrors of externally fixed
//! layouts; the vertex-header arena is raw bytes written through
//! [`VertexHeaderLayout`], whose size depends on the shader's output count
//! and therefore cannot be a static struct. Every offset the writer uses
//! must equal the offset of the corresponding field in the consumer's
//! definition — a mismatch corrupts memory silently, which is why the
//! layout tests pin each one.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Frustum (6) + user (8) clip planes.
pub const TOTAL_CLIP_PLANES: usize = 14;
/// First user plane's index within the context plane array and clip mask.
pub const FIRST_USER_PLANE: u32 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Viewport {
    pub scale: [f32; 3],
    pub translate: [f32; 3],
}

impl Viewport {
    /// Pass-through viewport: clip-space xyz survives the transform
    /// unchanged (for `w == 1`).
    pub const IDENTITY: Viewport = Viewport {
        scale: [1.0, 1.0, 1.0],
        translate: [0.0, 0.0, 0.0],
    };
}

/// Per-sampler runtime state, consumed by the external sampling layer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SamplerRuntimeState {
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
    pub max_aniso: f32,
    pub border_color: [f32; 4],
}

/// Per-view texture runtime state, consumed by the external sampling layer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TextureRuntimeState {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub first_level: u32,
    pub last_level: u32,
    pub row_stride: u32,
    pub base_offset: u32,
}

/// Per-image runtime state, consumed by the external image-access layer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ImageRuntimeState {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub row_stride: u32,
    pub img_stride: u32,
    pub base_offset: u32,
}

/// Runtime context handed to every draw: clip planes and viewports.
///
/// User clip planes occupy entries [`FIRST_USER_PLANE`]`..` of `planes`,
/// matching their clip-mask bit positions.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JitContext<'a> {
    pub planes: &'a [[f32; 4]; TOTAL_CLIP_PLANES],
    pub viewports: &'a [Viewport],
}

/// Resource bundle handed to every draw. Sampler/texture/image state is
/// opaque to this crate and flows through to the sampling layer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JitResources<'a> {
    pub constants: &'a [[f32; 4]],
    pub samplers: &'a [SamplerRuntimeState],
    pub textures: &'a [TextureRuntimeState],
    pub images: &'a [ImageRuntimeState],
}

/// Draw-time vertex buffer: mapped bytes plus the host-declared size.
///
/// The effective size is `min(size, data.len())`; the explicit field
/// mirrors the external record, the slice length is what Rust can prove.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrawBuffer<'a> {
    pub data: &'a [u8],
    pub size: u32,
}

impl DrawBuffer<'_> {
    pub fn effective_size(&self) -> u32 {
        self.size.min(u32::try_from(self.data.len()).unwrap_or(u32::MAX))
    }
}

/// Per-binding vertex buffer state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub is_user_buffer: u8,
    pub buffer_offset: u32,
}

/// Byte layout of one vertex-header record:
///
/// ```text
/// struct vertex_header {
///     u32 mask;          // clipmask:14 | edgeflag:1 | pad:1 | vertex_id:16
///     f32 clip_pos[4];
///     f32 data[num_outputs][4];
/// }
/// ```
///
/// Parameterized by the shader's output count, so it is computed lazily per
/// variant rather than declared statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexHeaderLayout {
    num_outputs: u32,
}

impl VertexHeaderLayout {
    pub const HEADER_WORD_OFFSET: usize = 0;
    pub const CLIP_POS_OFFSET: usize = 4;
    pub const DATA_OFFSET: usize = 20;

    pub fn new(num_outputs: u32) -> VertexHeaderLayout {
        VertexHeaderLayout { num_outputs }
    }

    pub fn num_outputs(&self) -> u32 {
        self.num_outputs
    }

    /// Bytes per vertex record.
    pub fn stride(&self) -> usize {
        Self::DATA_OFFSET + 16 * self.num_outputs as usize
    }

    pub fn record_offset(&self, vertex: usize) -> usize {
        vertex * self.stride()
    }

    pub fn header_word_offset(&self, vertex: usize) -> usize {
        self.record_offset(vertex) + Self::HEADER_WORD_OFFSET
    }

    pub fn clip_pos_offset(&self, vertex: usize) -> usize {
        self.record_offset(vertex) + Self::CLIP_POS_OFFSET
    }

    pub fn attr_offset(&self, vertex: usize, attr: usize) -> usize {
        debug_assert!(attr < self.num_outputs as usize);
        self.record_offset(vertex) + Self::DATA_OFFSET + attr * 16
    }

    /// Arena bytes needed for `count` vertices: the generated loop always
    /// writes whole lane groups, so the count rounds up.
    pub fn arena_size(&self, count: u32, lanes: usize) -> usize {
        let groups = (count as usize).div_ceil(lanes);
        groups * lanes * self.stride()
    }
}

// The arena has no alignment guarantee (records are 4-byte-packed behind a
// u32 header), so all stores go through byte copies.

pub(crate) fn write_u32(arena: &mut [u8], offset: usize, v: u32) {
    arena[offset..offset + 4].copy_from_slice(&v.to_ne_bytes());
}

pub(crate) fn write_f32(arena: &mut [u8], offset: usize, v: f32) {
    arena[offset..offset + 4].copy_from_slice(&v.to_ne_bytes());
}

/// Read back a record's header word (consumer-side helper).
pub fn read_header_word(arena: &[u8], layout: &VertexHeaderLayout, vertex: usize) -> u32 {
    let o = layout.header_word_offset(vertex);
    u32::from_ne_bytes([arena[o], arena[o + 1], arena[o + 2], arena[o + 3]])
}

/// Read back a record's clip-space position (consumer-side helper).
pub fn read_clip_pos(arena: &[u8], layout: &VertexHeaderLayout, vertex: usize) -> [f32; 4] {
    read_vec4(arena, layout.clip_pos_offset(vertex))
}

/// Read back one attribute slot (consumer-side helper).
pub fn read_attr(arena: &[u8], layout: &VertexHeaderLayout, vertex: usize, attr: usize) -> [f32; 4] {
    read_vec4(arena, layout.attr_offset(vertex, attr))
}

fn read_vec4(arena: &[u8], offset: usize) -> [f32; 4] {
    let mut out = [0.0f32; 4];
    for (c, v) in out.iter_mut().enumerate() {
        let o = offset + c * 4;
        *v = f32::from_ne_bytes([arena[o], arena[o + 1], arena[o + 2], arena[o + 3]]);
    }
    out
}
