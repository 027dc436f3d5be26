//! Vertex attribute formats and raw channel decoding.
//!
//! A fetch produces four raw 32-bit channel words: f32 bit patterns for
//! float-destined formats, integer bit patterns for pure-integer formats.
//! Keeping the result as words lets the fetch engine mask out invalid lanes
//! before any reinterpretation happens.

use half::f16;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum VertexFormat {
    /// Sentinel for vertex elements the pipeline declared but the host never
    /// bound; fetches yield zero without touching memory.
    None = 0,
    Float32x1,
    Float32x2,
    Float32x3,
    Float32x4,
    Float16x2,
    Float16x4,
    Unorm8x4,
    Snorm8x4,
    Uint8x4,
    Sint8x4,
    Unorm16x2,
    Unorm16x4,
    Snorm16x2,
    Snorm16x4,
    Uint16x2,
    Uint16x4,
    Sint16x2,
    Sint16x4,
    Uint32x1,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32x1,
    Sint32x2,
    Sint32x3,
    Sint32x4,
    /// Packed signed normalized 10-10-10, two high bits unused.
    Snorm10x3,
    /// Packed unsigned 10-10-10, integer values 0..=1023 scaled to float.
    Uint10x3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDesc {
    /// Source bytes per vertex.
    pub block_size: u32,
    /// Channels actually present in memory; the rest fill with (0, 0, 0, 1).
    pub channels: u32,
    /// Channel words carry integer bit patterns instead of f32 bits.
    pub pure_integer: bool,
}

impl VertexFormat {
    pub fn is_none(self) -> bool {
        self == VertexFormat::None
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn desc(self) -> FormatDesc {
        use VertexFormat::*;
        let (block_size, channels, pure_integer) = match self {
            None => (0, 0, false),
            Float32x1 => (4, 1, false),
            Float32x2 => (8, 2, false),
            Float32x3 => (12, 3, false),
            Float32x4 => (16, 4, false),
            Float16x2 => (4, 2, false),
            Float16x4 => (8, 4, false),
            Unorm8x4 | Snorm8x4 => (4, 4, false),
            Uint8x4 | Sint8x4 => (4, 4, true),
            Unorm16x2 | Snorm16x2 => (4, 2, false),
            Unorm16x4 | Snorm16x4 => (8, 4, false),
            Uint16x2 | Sint16x2 => (4, 2, true),
            Uint16x4 | Sint16x4 => (8, 4, true),
            Uint32x1 | Sint32x1 => (4, 1, true),
            Uint32x2 | Sint32x2 => (8, 2, true),
            Uint32x3 | Sint32x3 => (12, 3, true),
            Uint32x4 | Sint32x4 => (16, 4, true),
            Snorm10x3 | Uint10x3 => (4, 3, false),
        };
        FormatDesc {
            block_size,
            channels,
            pure_integer,
        }
    }
}

/// Decode one vertex's channels from `src` (which must hold at least
/// `desc().block_size` bytes) into raw 32-bit words.
///
/// Missing channels fill with (0, 0, 0, 1): integer 1 for pure-integer
/// formats, 1.0f bits otherwise.
pub fn fetch_raw(format: VertexFormat, src: &[u8]) -> [u32; 4] {
    use VertexFormat::*;

    let desc = format.desc();
    let mut out = [0u32; 4];
    // Fill defaults first so partial formats end up with w = 1.
    if desc.channels < 4 {
        out[3] = if desc.pure_integer { 1 } else { 1.0f32.to_bits() };
    }

    match format {
        None => return [0; 4],
        Float32x1 | Float32x2 | Float32x3 | Float32x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                *chan = read_u32(src, c * 4);
            }
        }
        Float16x2 | Float16x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                let bits = read_u16(src, c * 2);
                *chan = f16::from_bits(bits).to_f32().to_bits();
            }
        }
        Unorm8x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(4) {
                *chan = (f32::from(src[c]) / 255.0).to_bits();
            }
        }
        Snorm8x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(4) {
                *chan = snorm_to_f32(i32::from(src[c] as i8), 127).to_bits();
            }
        }
        Uint8x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(4) {
                *chan = u32::from(src[c]);
            }
        }
        Sint8x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(4) {
                *chan = i32::from(src[c] as i8) as u32;
            }
        }
        Unorm16x2 | Unorm16x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                *chan = (f32::from(read_u16(src, c * 2)) / 65535.0).to_bits();
            }
        }
        Snorm16x2 | Snorm16x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                *chan = snorm_to_f32(i32::from(read_u16(src, c * 2) as i16), 32767).to_bits();
            }
        }
        Uint16x2 | Uint16x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                *chan = u32::from(read_u16(src, c * 2));
            }
        }
        Sint16x2 | Sint16x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                *chan = i32::from(read_u16(src, c * 2) as i16) as u32;
            }
        }
        Uint32x1 | Uint32x2 | Uint32x3 | Uint32x4 | Sint32x1 | Sint32x2 | Sint32x3 | Sint32x4 => {
            for (c, chan) in out.iter_mut().enumerate().take(desc.channels as usize) {
                *chan = read_u32(src, c * 4);
            }
        }
        Snorm10x3 => {
            let packed = read_u32(src, 0);
            let (x, y, z) = unpack_snorm10(packed);
            out[0] = x.to_bits();
            out[1] = y.to_bits();
            out[2] = z.to_bits();
        }
        Uint10x3 => {
            let packed = read_u32(src, 0);
            out[0] = ((packed & 0x3ff) as f32).to_bits();
            out[1] = (((packed >> 10) & 0x3ff) as f32).to_bits();
            out[2] = (((packed >> 20) & 0x3ff) as f32).to_bits();
        }
    }
    out
}

fn read_u16(src: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([src[offset], src[offset + 1]])
}

fn read_u32(src: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([src[offset], src[offset + 1], src[offset + 2], src[offset + 3]])
}

/// Signed normalized: [-max-1, max] maps to [-1, 1], with the most negative
/// value clamping to -1.
fn snorm_to_f32(v: i32, max: i32) -> f32 {
    if v <= -max {
        -1.0
    } else {
        v as f32 / max as f32
    }
}

fn unpack_snorm10(packed: u32) -> (f32, f32, f32) {
    // Each component is a signed 10-bit integer.
    let x = sign_extend_10((packed & 0x3ff) as i32);
    let y = sign_extend_10(((packed >> 10) & 0x3ff) as i32);
    let z = sign_extend_10(((packed >> 20) & 0x3ff) as i32);
    (snorm10_to_f32(x), snorm10_to_f32(y), snorm10_to_f32(z))
}

fn sign_extend_10(v: i32) -> i32 {
    // v is 10 bits.
    let shift = 32 - 10;
    (v << shift) >> shift
}

fn snorm10_to_f32(v: i32) -> f32 {
    // Signed normalized: [-512, 511] maps to [-1, 1].
    if v == -512 {
        -1.0
    } else {
        (v as f32) / 511.0
    }
}
