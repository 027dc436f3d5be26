//! Struct-of-arrays lane vectors.
//!
//! All shader and pipeline math runs on groups of `lanes` vertices at once,
//! one value per lane. Vectors are sized for the widest supported group;
//! lanes beyond the active width carry garbage and are never observed
//! (comparisons that feed control decisions take an explicit lane count).

use std::ops::{Add, BitAnd, BitOr, BitXor, Mul, Neg, Not, Sub};

/// Widest supported lane group (512-bit vectors of f32).
pub const MAX_SOA_LANES: usize = 16;

/// One f32 per lane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SoaF32(pub [f32; MAX_SOA_LANES]);

/// One u32 per lane. Doubles as a per-lane mask (all-ones or zero).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoaU32(pub [u32; MAX_SOA_LANES]);

impl SoaF32 {
    pub const ZERO: SoaF32 = SoaF32([0.0; MAX_SOA_LANES]);

    pub fn splat(v: f32) -> Self {
        SoaF32([v; MAX_SOA_LANES])
    }

    pub fn from_fn(f: impl Fn(usize) -> f32) -> Self {
        let mut out = [0.0; MAX_SOA_LANES];
        for (i, lane) in out.iter_mut().enumerate() {
            *lane = f(i);
        }
        SoaF32(out)
    }

    pub fn from_bits(bits: SoaU32) -> Self {
        Self::from_fn(|i| f32::from_bits(bits.0[i]))
    }

    pub fn to_bits(self) -> SoaU32 {
        SoaU32::from_fn(|i| self.0[i].to_bits())
    }

    pub fn mul_add(self, b: SoaF32, c: SoaF32) -> Self {
        Self::from_fn(|i| self.0[i].mul_add(b.0[i], c.0[i]))
    }

    pub fn div(self, rhs: SoaF32) -> Self {
        Self::from_fn(|i| self.0[i] / rhs.0[i])
    }

    pub fn min(self, rhs: SoaF32) -> Self {
        Self::from_fn(|i| self.0[i].min(rhs.0[i]))
    }

    pub fn max(self, rhs: SoaF32) -> Self {
        Self::from_fn(|i| self.0[i].max(rhs.0[i]))
    }

    pub fn abs(self) -> Self {
        Self::from_fn(|i| self.0[i].abs())
    }

    pub fn floor(self) -> Self {
        Self::from_fn(|i| self.0[i].floor())
    }

    pub fn sqrt(self) -> Self {
        Self::from_fn(|i| self.0[i].sqrt())
    }

    /// Clamp every lane to [0, 1]. NaN lanes collapse to 0.
    pub fn clamp01(self) -> Self {
        self.max(SoaF32::ZERO).min(SoaF32::splat(1.0))
    }

    /// Per-lane blend: `mask` lanes take `self`, the rest take `other`.
    pub fn select(mask: SoaU32, a: SoaF32, b: SoaF32) -> Self {
        Self::from_fn(|i| if mask.0[i] != 0 { a.0[i] } else { b.0[i] })
    }

    /// Unordered greater-than: true when `a > b` or either operand is NaN.
    ///
    /// NaN must land on the "true" side so that clip tests reject
    /// non-finite vertices instead of silently passing them.
    pub fn cmp_gt_unordered(self, rhs: SoaF32) -> SoaU32 {
        SoaU32::from_fn(|i| if !(self.0[i] <= rhs.0[i]) { !0 } else { 0 })
    }

    /// Ordered equality.
    pub fn cmp_eq(self, rhs: SoaF32) -> SoaU32 {
        SoaU32::from_fn(|i| if self.0[i] == rhs.0[i] { !0 } else { 0 })
    }

    pub fn cmp_lt(self, rhs: SoaF32) -> SoaU32 {
        SoaU32::from_fn(|i| if self.0[i] < rhs.0[i] { !0 } else { 0 })
    }

    pub fn cmp_ge(self, rhs: SoaF32) -> SoaU32 {
        SoaU32::from_fn(|i| if self.0[i] >= rhs.0[i] { !0 } else { 0 })
    }

    pub fn is_nan_or_inf(self) -> SoaU32 {
        SoaU32::from_fn(|i| if self.0[i].is_finite() { 0 } else { !0 })
    }
}

impl Add for SoaF32 {
    type Output = SoaF32;
    fn add(self, rhs: SoaF32) -> SoaF32 {
        SoaF32::from_fn(|i| self.0[i] + rhs.0[i])
    }
}

impl Sub for SoaF32 {
    type Output = SoaF32;
    fn sub(self, rhs: SoaF32) -> SoaF32 {
        SoaF32::from_fn(|i| self.0[i] - rhs.0[i])
    }
}

impl Mul for SoaF32 {
    type Output = SoaF32;
    fn mul(self, rhs: SoaF32) -> SoaF32 {
        SoaF32::from_fn(|i| self.0[i] * rhs.0[i])
    }
}

impl Neg for SoaF32 {
    type Output = SoaF32;
    fn neg(self) -> SoaF32 {
        SoaF32::from_fn(|i| -self.0[i])
    }
}

impl SoaU32 {
    pub const ZERO: SoaU32 = SoaU32([0; MAX_SOA_LANES]);

    pub fn splat(v: u32) -> Self {
        SoaU32([v; MAX_SOA_LANES])
    }

    pub fn from_fn(f: impl Fn(usize) -> u32) -> Self {
        let mut out = [0; MAX_SOA_LANES];
        for (i, lane) in out.iter_mut().enumerate() {
            *lane = f(i);
        }
        SoaU32(out)
    }

    /// True if any of the first `lanes` lanes is non-zero.
    pub fn any(self, lanes: usize) -> bool {
        self.0[..lanes].iter().any(|&v| v != 0)
    }

    pub fn select(mask: SoaU32, a: SoaU32, b: SoaU32) -> Self {
        Self::from_fn(|i| if mask.0[i] != 0 { a.0[i] } else { b.0[i] })
    }

    pub fn cmp_le(self, rhs: SoaU32) -> SoaU32 {
        Self::from_fn(|i| if self.0[i] <= rhs.0[i] { !0 } else { 0 })
    }

    pub fn cmp_lt(self, rhs: SoaU32) -> SoaU32 {
        Self::from_fn(|i| if self.0[i] < rhs.0[i] { !0 } else { 0 })
    }

    pub fn min(self, rhs: SoaU32) -> Self {
        Self::from_fn(|i| self.0[i].min(rhs.0[i]))
    }

    pub fn wrapping_mul(self, rhs: SoaU32) -> Self {
        Self::from_fn(|i| self.0[i].wrapping_mul(rhs.0[i]))
    }

    pub fn wrapping_add(self, rhs: SoaU32) -> Self {
        Self::from_fn(|i| self.0[i].wrapping_add(rhs.0[i]))
    }

    pub fn wrapping_sub(self, rhs: SoaU32) -> Self {
        Self::from_fn(|i| self.0[i].wrapping_sub(rhs.0[i]))
    }
}

impl BitAnd for SoaU32 {
    type Output = SoaU32;
    fn bitand(self, rhs: SoaU32) -> SoaU32 {
        SoaU32::from_fn(|i| self.0[i] & rhs.0[i])
    }
}

impl BitOr for SoaU32 {
    type Output = SoaU32;
    fn bitor(self, rhs: SoaU32) -> SoaU32 {
        SoaU32::from_fn(|i| self.0[i] | rhs.0[i])
    }
}

impl BitXor for SoaU32 {
    type Output = SoaU32;
    fn bitxor(self, rhs: SoaU32) -> SoaU32 {
        SoaU32::from_fn(|i| self.0[i] ^ rhs.0[i])
    }
}

impl Not for SoaU32 {
    type Output = SoaU32;
    fn not(self) -> SoaU32 {
        SoaU32::from_fn(|i| !self.0[i])
    }
}
