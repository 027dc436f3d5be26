//! AoS packing of shader outputs into vertex-header records.

use prism_shader::{SoaF32, SoaU32, MAX_SOA_LANES};

use crate::clip::EDGE_BIT;
use crate::layout::{self, VertexHeaderLayout};

/// Header-word constant the clip mask is OR'd into: vertex id preset to
/// all-ones, pad 0, and the edge bit preset to 1 ("keep") unless edge flags
/// are tracked, in which case the mask bit provides it.
pub fn header_preset(need_edgeflag: bool) -> u32 {
    if need_edgeflag {
        0xffff << 16
    } else {
        (0xffff << 16) | EDGE_BIT
    }
}

/// Big-endian field swizzle for the packed header word:
///
/// ```text
/// (x >> 16)              // vertex_id
/// | ((x & 0x3fff) << 18) // clipmask
/// | ((x & 0x4000) << 3)  // edgeflag
/// ```
///
/// The pad bit (`(x & 0x8000) << 1`) does not move; nothing consumes it.
pub fn bswap_header_word(x: u32) -> u32 {
    (x >> 16) | ((x & 0x3fff) << 18) | ((x & 0x4000) << 3)
}

/// Inverse of [`bswap_header_word`], recovering vertex id, clip mask and
/// edge flag.
pub fn unswap_header_word(y: u32) -> u32 {
    ((y & 0xffff) << 16) | ((y >> 18) & 0x3fff) | ((y >> 3) & 0x4000)
}

/// Adjust the header word to the target's endianness before storing. On
/// little-endian targets the stored bit layout already matches the
/// consumer's field order and nothing moves.
pub fn adjust_mask(word: u32) -> u32 {
    #[cfg(target_endian = "big")]
    {
        bswap_header_word(word)
    }
    #[cfg(target_endian = "little")]
    {
        word
    }
}

/// SoA → AoS: four channel vectors into one `[f32; 4]` row per lane.
///
/// The four-lane case is a direct 4×4 transpose; wider groups go through a
/// full per-block transpose followed by sub-range extraction.
pub fn transpose_to_aos(soa: &[SoaF32; 4], lanes: usize, out: &mut [[f32; 4]; MAX_SOA_LANES]) {
    debug_assert!(lanes % 4 == 0 && lanes <= MAX_SOA_LANES);
    if lanes == 4 {
        for l in 0..4 {
            for c in 0..4 {
                out[l][c] = soa[c].0[l];
            }
        }
        return;
    }

    // Transpose each block of four lanes...
    let mut t = [[0.0f32; MAX_SOA_LANES]; 4];
    for b in 0..lanes / 4 {
        for i in 0..4 {
            for c in 0..4 {
                t[i][b * 4 + c] = soa[c].0[b * 4 + i];
            }
        }
    }
    // ...then extract each lane's four-channel row.
    for l in 0..lanes {
        for c in 0..4 {
            out[l][c] = t[l % 4][(l / 4) * 4 + c];
        }
    }
}

/// Store one lane group's outputs as AoS vertex-header records starting at
/// record `base_vertex` of the arena.
///
/// Attribute slot 0 additionally carries the packed header word: the preset
/// constant OR the lane's clip mask, endianness-adjusted.
#[allow(clippy::too_many_arguments)]
pub fn convert_to_aos(
    arena: &mut [u8],
    hdr: &VertexHeaderLayout,
    base_vertex: usize,
    outputs: &[[Option<SoaF32>; 4]],
    clipmask: SoaU32,
    num_outputs: u32,
    lanes: usize,
    need_edgeflag: bool,
) {
    let mut aos = [[0.0f32; 4]; MAX_SOA_LANES];
    for attrib in 0..num_outputs as usize {
        let mut soa = [SoaF32::ZERO; 4];
        for (chan, v) in soa.iter_mut().enumerate() {
            if let Some(out) = outputs[attrib][chan] {
                *v = out;
            }
        }
        transpose_to_aos(&soa, lanes, &mut aos);

        if attrib == 0 {
            let preset = header_preset(need_edgeflag);
            for l in 0..lanes {
                let word = adjust_mask(preset | clipmask.0[l]);
                layout::write_u32(arena, hdr.header_word_offset(base_vertex + l), word);
            }
        }

        for (l, row) in aos.iter().enumerate().take(lanes) {
            // Unaligned store due to the vertex header.
            let offset = hdr.attr_offset(base_vertex + l, attrib);
            for (c, v) in row.iter().enumerate() {
                layout::write_f32(arena, offset + c * 4, *v);
            }
        }
    }
}

/// Store original clip-space positions, before any viewport mutation.
pub fn store_clip(
    arena: &mut [u8],
    hdr: &VertexHeaderLayout,
    base_vertex: usize,
    outputs: &[[Option<SoaF32>; 4]],
    pos: u32,
    lanes: usize,
) {
    let mut soa = [SoaF32::ZERO; 4];
    for (chan, v) in soa.iter_mut().enumerate() {
        if let Some(out) = outputs[pos as usize][chan] {
            *v = out;
        }
    }
    let mut aos = [[0.0f32; 4]; MAX_SOA_LANES];
    transpose_to_aos(&soa, lanes, &mut aos);
    for (l, row) in aos.iter().enumerate().take(lanes) {
        let offset = hdr.clip_pos_offset(base_vertex + l);
        for (c, v) in row.iter().enumerate() {
            layout::write_f32(arena, offset + c * 4, *v);
        }
    }
}
