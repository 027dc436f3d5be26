//! Variant keys: the canonical descriptor of one compiled specialization.
//!
//! A key is a fixed-size prefix (flags, counts, user-plane mask) followed by
//! variable tails: vertex-element descriptors, packed sampler+texture static
//! state, and image static state. The canonical byte encoding is injective —
//! two keys describe the same generated code iff their bytes are equal — and
//! its length is a deterministic function of the counts, so hashing and
//! equality cover the whole key in one pass.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use prism_shader::ShaderInfo;

use crate::format::VertexFormat;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VariantFlags: u32 {
        const CLIP_XY = 1 << 0;
        const CLIP_Z = 1 << 1;
        const CLIP_USER = 1 << 2;
        const BYPASS_VIEWPORT = 1 << 3;
        const CLIP_HALFZ = 1 << 4;
        const NEED_EDGEFLAGS = 1 << 5;
        const HAS_GS_OR_TES = 1 << 6;
        const CLAMP_VERTEX_COLOR = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexElement {
    pub src_format: VertexFormat,
    pub vertex_buffer_index: u32,
    pub src_offset: u32,
    pub src_stride: u32,
    /// 0 = per-vertex; otherwise the attribute advances once every
    /// `instance_divisor` instances.
    pub instance_divisor: u32,
}

impl VertexElement {
    /// Zero-filled element carrying the "no format" sentinel.
    pub const UNBOUND: VertexElement = VertexElement {
        src_format: VertexFormat::None,
        vertex_buffer_index: 0,
        src_offset: 0,
        src_stride: 0,
        instance_divisor: 0,
    };
}

/// Opaque per-sampler static state, hashed into the key and passed through
/// to the sampling layer unexamined.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct SamplerStaticState {
    pub wrap_s: u32,
    pub wrap_t: u32,
    pub wrap_r: u32,
    pub min_img_filter: u32,
    pub mag_img_filter: u32,
    pub compare_func: u32,
}

/// Opaque per-view texture static state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct TextureStaticState {
    pub format: u32,
    pub target: u32,
    pub swizzle: [u32; 4],
}

/// Opaque per-image static state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ImageStaticState {
    pub format: u32,
    pub target: u32,
}

/// One key tail slot pairing sampler and texture static state, as the
/// sampling layer consumes them.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct SamplerSlot {
    pub sampler: SamplerStaticState,
    pub texture: TextureStaticState,
}

/// Pipeline state a variant key is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineState<'a> {
    pub clip_xy: bool,
    pub clip_z: bool,
    pub clip_user: bool,
    pub clip_halfz: bool,
    pub bypass_viewport: bool,
    pub clamp_vertex_color: bool,
    /// A geometry or tessellation stage consumes this shader's outputs.
    pub has_gs_or_tes: bool,
    /// User clip plane enable bitmask.
    pub ucp_enable: u32,
    pub vertex_elements: &'a [VertexElement],
    pub samplers: &'a [SamplerStaticState],
    pub sampler_textures: &'a [TextureStaticState],
    pub images: &'a [ImageStaticState],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantKey {
    pub flags: VariantFlags,
    pub ucp_enable: u32,
    pub num_outputs: u32,
    pub nr_samplers: u32,
    pub nr_sampler_views: u32,
    pub nr_images: u32,
    /// Length equals the shader's declared input count, not the bound
    /// element count; unbound slots carry [`VertexElement::UNBOUND`].
    pub vertex_elements: Vec<VertexElement>,
    /// Length equals `max(nr_samplers, nr_sampler_views)`.
    pub samplers: Vec<SamplerSlot>,
    pub images: Vec<ImageStaticState>,
}

impl VariantKey {
    pub fn nr_vertex_elements(&self) -> u32 {
        self.vertex_elements.len() as u32
    }

    pub fn clip_xy(&self) -> bool {
        self.flags.contains(VariantFlags::CLIP_XY)
    }

    pub fn clip_z(&self) -> bool {
        self.flags.contains(VariantFlags::CLIP_Z)
    }

    pub fn clip_user(&self) -> bool {
        self.flags.contains(VariantFlags::CLIP_USER)
    }

    pub fn bypass_viewport(&self) -> bool {
        self.flags.contains(VariantFlags::BYPASS_VIEWPORT)
    }

    pub fn clip_halfz(&self) -> bool {
        self.flags.contains(VariantFlags::CLIP_HALFZ)
    }

    pub fn need_edgeflags(&self) -> bool {
        self.flags.contains(VariantFlags::NEED_EDGEFLAGS)
    }

    pub fn has_gs_or_tes(&self) -> bool {
        self.flags.contains(VariantFlags::HAS_GS_OR_TES)
    }

    pub fn clamp_vertex_color(&self) -> bool {
        self.flags.contains(VariantFlags::CLAMP_VERTEX_COLOR)
    }

    /// Canonical byte encoding: fixed prefix, then the tails in order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            28 + self.vertex_elements.len() * 20
                + self.samplers.len() * std::mem::size_of::<SamplerSlot>()
                + self.images.len() * std::mem::size_of::<ImageStaticState>(),
        );
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out.extend_from_slice(&self.ucp_enable.to_le_bytes());
        out.extend_from_slice(&self.num_outputs.to_le_bytes());
        out.extend_from_slice(&self.nr_samplers.to_le_bytes());
        out.extend_from_slice(&self.nr_sampler_views.to_le_bytes());
        out.extend_from_slice(&self.nr_images.to_le_bytes());
        out.extend_from_slice(&self.nr_vertex_elements().to_le_bytes());
        for e in &self.vertex_elements {
            out.extend_from_slice(&e.src_format.as_u32().to_le_bytes());
            out.extend_from_slice(&e.vertex_buffer_index.to_le_bytes());
            out.extend_from_slice(&e.src_offset.to_le_bytes());
            out.extend_from_slice(&e.src_stride.to_le_bytes());
            out.extend_from_slice(&e.instance_divisor.to_le_bytes());
        }
        out.extend_from_slice(bytemuck::cast_slice(&self.samplers));
        out.extend_from_slice(bytemuck::cast_slice(&self.images));
        out
    }

    /// xxh3 fingerprint of the canonical bytes.
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(&self.canonical_bytes())
    }
}

impl std::hash::Hash for VariantKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint());
    }
}

/// Derive the canonical variant key from pipeline state and shader info.
///
/// Never fails: shortfalls degrade to sentinel-filled slots, and a shader
/// that writes clip distances force-enables user clipping with a mask
/// derived from the written component count (overriding the explicit
/// enables).
pub fn make_variant_key(state: &PipelineState<'_>, info: &ShaderInfo) -> VariantKey {
    let mut clip_user = state.clip_user;
    let mut ucp_enable = state.ucp_enable;
    if info.num_written_clipdistance > 0 {
        clip_user = true;
        ucp_enable = (1u32 << info.num_written_clipdistance) - 1;
    }

    let mut flags = VariantFlags::empty();
    flags.set(VariantFlags::CLIP_XY, state.clip_xy);
    flags.set(VariantFlags::CLIP_Z, state.clip_z);
    flags.set(VariantFlags::CLIP_USER, clip_user);
    flags.set(VariantFlags::BYPASS_VIEWPORT, state.bypass_viewport);
    flags.set(VariantFlags::CLIP_HALFZ, state.clip_halfz);
    flags.set(
        VariantFlags::NEED_EDGEFLAGS,
        info.edgeflag_output.is_some(),
    );
    flags.set(VariantFlags::HAS_GS_OR_TES, state.has_gs_or_tes);
    flags.set(
        VariantFlags::CLAMP_VERTEX_COLOR,
        state.clamp_vertex_color && !state.has_gs_or_tes,
    );

    // The key needs one element per declared shader input, not per bound
    // element: excess bound elements don't matter, and a shortfall is
    // tolerated by filling with the sentinel.
    let nr_vertex_elements = info.num_inputs as usize;
    if state.vertex_elements.len() < nr_vertex_elements {
        debug!(
            "vertex shader with {} inputs but only {} vertex elements bound",
            nr_vertex_elements,
            state.vertex_elements.len()
        );
    }
    let mut vertex_elements = Vec::with_capacity(nr_vertex_elements);
    for i in 0..nr_vertex_elements {
        vertex_elements.push(
            state
                .vertex_elements
                .get(i)
                .copied()
                .unwrap_or(VertexElement::UNBOUND),
        );
    }

    let nr_samplers = info.num_samplers;
    let nr_sampler_views = info.num_sampler_views.unwrap_or(nr_samplers);
    let nr_images = info.num_images;

    let nr_sampler_slots = nr_samplers.max(nr_sampler_views) as usize;
    let mut samplers = vec![SamplerSlot::default(); nr_sampler_slots];
    for (i, slot) in samplers.iter_mut().enumerate() {
        if i < nr_samplers as usize {
            if let Some(s) = state.samplers.get(i) {
                slot.sampler = *s;
            }
        }
        if i < nr_sampler_views as usize {
            if let Some(t) = state.sampler_textures.get(i) {
                slot.texture = *t;
            }
        }
    }

    let mut images = vec![ImageStaticState::default(); nr_images as usize];
    for (i, img) in images.iter_mut().enumerate() {
        if let Some(s) = state.images.get(i) {
            *img = *s;
        }
    }

    VariantKey {
        flags,
        ucp_enable,
        num_outputs: info.num_outputs,
        nr_samplers,
        nr_sampler_views,
        nr_images,
        vertex_elements,
        samplers,
        images,
    }
}

/// Field-by-field key dump at trace level.
pub fn trace_variant_key(key: &VariantKey) {
    trace!("clamp_vertex_color = {}", key.clamp_vertex_color());
    trace!("clip_xy = {}", key.clip_xy());
    trace!("clip_z = {}", key.clip_z());
    trace!("clip_user = {}", key.clip_user());
    trace!("bypass_viewport = {}", key.bypass_viewport());
    trace!("clip_halfz = {}", key.clip_halfz());
    trace!("need_edgeflags = {}", key.need_edgeflags());
    trace!("has_gs_or_tes = {}", key.has_gs_or_tes());
    trace!("ucp_enable = {:#x}", key.ucp_enable);
    for (i, e) in key.vertex_elements.iter().enumerate() {
        trace!(
            "vertex_element[{i}] = {:?} buffer {} offset {} stride {} divisor {}",
            e.src_format,
            e.vertex_buffer_index,
            e.src_offset,
            e.src_stride,
            e.instance_divisor
        );
    }
    for (i, s) in key.samplers.iter().enumerate() {
        trace!("sampler[{i}].texture.format = {}", s.texture.format);
    }
    for (i, img) in key.images.iter().enumerate() {
        trace!("image[{i}].format = {}", img.format);
    }
}
