//! Attribute fetching: bounds-checked, masked loads from vertex buffers.
//!
//! Per-lane offsets may wrap (`stride * index` is explicitly allowed to
//! overflow); safety comes from the adjusted buffer size, computed with
//! checked arithmetic that fails closed to zero. A lane is valid iff its
//! offset is strictly below the adjusted size; invalid lanes have their raw
//! channel words masked to zero before any reinterpretation.

use serde::{Deserialize, Serialize};

use prism_shader::{SoaF32, SoaU32};

use crate::format::{self, VertexFormat};
use crate::key::VertexElement;
use crate::layout::{DrawBuffer, VertexBufferBinding};

/// Per-element fetch recipe, fixed at variant-build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPlan {
    pub format: VertexFormat,
    pub buffer_index: u32,
    pub src_offset: u32,
    pub src_stride: u32,
    pub instance_divisor: u32,
}

impl FetchPlan {
    pub fn from_element(e: &VertexElement) -> FetchPlan {
        FetchPlan {
            format: e.src_format,
            buffer_index: e.vertex_buffer_index,
            src_offset: e.src_offset,
            src_stride: e.src_stride,
            instance_divisor: e.instance_divisor,
        }
    }
}

/// Where one element's data comes from for the duration of a draw.
#[derive(Debug, Clone, Copy)]
enum FetchSource<'a> {
    /// Sentinel format, unbound buffer, or overflowed addressing: every
    /// fetch yields zeros without touching memory.
    ZeroFill,
    Mapped {
        data: &'a [u8],
        /// `buffer_offset + src_offset`, already validated against `data`.
        base: usize,
        /// Adjusted size for the strict `offset < size_adj` lane test.
        size_adj: u32,
    },
}

/// Per-draw resolved fetch state for one element.
#[derive(Debug, Clone, Copy)]
pub struct PreparedFetch<'a> {
    plan: FetchPlan,
    source: FetchSource<'a>,
    /// Effective index for instanced elements, shared by every lane.
    instance_index: u32,
}

/// Resolve one element against the draw's buffers and bindings.
///
/// Everything constant per draw happens here: the adjusted-size chain
/// (`size - (block_size - 1) - (buffer_offset + src_offset)`, each step
/// checked, any underflow forcing zero), and the instanced index
/// (`start_instance + instance_id / divisor`, overflow redirecting the
/// whole element to the zero fallback for the entire draw).
pub fn prepare<'a>(
    plan: &FetchPlan,
    buffers: &[DrawBuffer<'a>],
    bindings: &[VertexBufferBinding],
    instance_id: u32,
    start_instance: u32,
) -> PreparedFetch<'a> {
    let zero_fill = |instance_index: u32| PreparedFetch {
        plan: *plan,
        source: FetchSource::ZeroFill,
        instance_index,
    };

    if plan.format.is_none() {
        return zero_fill(0);
    }

    let mut instance_index = 0;
    if plan.instance_divisor != 0 {
        let current_instance = instance_id / plan.instance_divisor;
        match start_instance.checked_add(current_instance) {
            Some(i) => instance_index = i,
            None => return zero_fill(0),
        }
    }

    let idx = plan.buffer_index as usize;
    let (Some(buffer), Some(binding)) = (buffers.get(idx), bindings.get(idx)) else {
        return zero_fill(instance_index);
    };

    let block_size = plan.format.desc().block_size;
    let Some(base) = binding.buffer_offset.checked_add(plan.src_offset) else {
        return zero_fill(instance_index);
    };
    let size_adj = buffer
        .effective_size()
        .checked_sub(block_size - 1)
        .and_then(|v| v.checked_sub(base))
        .unwrap_or(0);

    PreparedFetch {
        plan: *plan,
        source: FetchSource::Mapped {
            data: buffer.data,
            base: base as usize,
            size_adj,
        },
        instance_index,
    }
}

impl PreparedFetch<'_> {
    /// Fetch one lane group's channels for this element.
    pub fn fetch(&self, indices: SoaU32, lanes: usize) -> [SoaF32; 4] {
        match self.source {
            FetchSource::ZeroFill => [SoaF32::ZERO; 4],
            FetchSource::Mapped {
                data,
                base,
                size_adj,
            } => {
                if self.plan.instance_divisor != 0 {
                    self.fetch_instanced(data, base, size_adj)
                } else {
                    self.fetch_vector(data, base, size_adj, indices, lanes)
                }
            }
        }
    }

    fn fetch_vector(
        &self,
        data: &[u8],
        base: usize,
        size_adj: u32,
        indices: SoaU32,
        lanes: usize,
    ) -> [SoaF32; 4] {
        let mut chans = [SoaU32::ZERO; 4];
        for l in 0..lanes {
            // The multiply may wrap; the strict size test rejects the lane.
            let offset = self.plan.src_stride.wrapping_mul(indices.0[l]);
            let (raw, valid_mask) = if offset < size_adj {
                (
                    format::fetch_raw(self.plan.format, &data[base + offset as usize..]),
                    !0u32,
                )
            } else {
                ([0u32; 4], 0u32)
            };
            // Mask before reinterpretation so invalid lanes are exactly
            // zero in every channel, fill channels included.
            for c in 0..4 {
                chans[c].0[l] = raw[c] & valid_mask;
            }
        }
        chans.map(SoaF32::from_bits)
    }

    fn fetch_instanced(&self, data: &[u8], base: usize, size_adj: u32) -> [SoaF32; 4] {
        let offset = self.plan.src_stride.wrapping_mul(self.instance_index);
        let (raw, valid_mask) = if offset < size_adj {
            (
                format::fetch_raw(self.plan.format, &data[base + offset as usize..]),
                !0u32,
            )
        } else {
            ([0u32; 4], 0u32)
        };
        let mut out = [SoaF32::ZERO; 4];
        for c in 0..4 {
            out[c] = SoaF32::from_bits(SoaU32::splat(raw[c] & valid_mask));
        }
        out
    }
}
