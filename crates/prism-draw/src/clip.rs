//! Clip-mask computation and viewport transform.
//!
//! Bit assignment (must match the consuming rasterizer exactly):
//! bits 0..4 the four xy frustum planes, bits 4..6 near/far z, bits 6..14
//! user planes, bit 14 the edge-flag bit. Comparisons are unordered so NaN
//! positions are conservatively clipped; exact ties (`x == w`) pass.

use serde::{Deserialize, Serialize};

use prism_shader::{ShaderInfo, SoaF32, SoaU32};

use crate::key::VariantKey;
use crate::layout::{Viewport, FIRST_USER_PLANE, TOTAL_CLIP_PLANES};

/// Edge-flag bit within the clip mask and header word.
pub const EDGE_BIT: u32 = 1 << TOTAL_CLIP_PLANES;

/// Per-variant clip/viewport decisions, fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipPlan {
    pub enable_cliptest: bool,
    pub bypass_viewport: bool,
    pub clip_xy: bool,
    pub clip_z: bool,
    pub clip_halfz: bool,
    pub clip_user: bool,
    pub ucp_enable: u32,
    pub need_edgeflags: bool,
    pub position_output: Option<u32>,
    /// Resolved: falls back to the position output when the shader has no
    /// distinct clip-vertex output.
    pub clipvertex_output: Option<u32>,
    pub clipdist_outputs: [Option<u32>; 2],
    pub num_written_clipdistance: u32,
    pub edgeflag_output: Option<u32>,
}

impl ClipPlan {
    pub fn new(key: &VariantKey, info: &ShaderInfo) -> ClipPlan {
        // A downstream geometry/tessellation stage consumes raw clip-space
        // outputs, and a shader-written viewport index can't be applied
        // per-lane here; both force the transform off.
        let bypass_viewport =
            key.has_gs_or_tes() || key.bypass_viewport() || info.writes_viewport_index;
        let enable_cliptest = !key.has_gs_or_tes()
            && (key.clip_xy() || key.clip_z() || key.clip_user() || key.need_edgeflags());
        ClipPlan {
            enable_cliptest,
            bypass_viewport,
            clip_xy: key.clip_xy(),
            clip_z: key.clip_z(),
            clip_halfz: key.clip_halfz(),
            clip_user: key.clip_user(),
            ucp_enable: key.ucp_enable,
            need_edgeflags: key.need_edgeflags(),
            position_output: info.position_output,
            clipvertex_output: info.resolved_clipvertex(),
            clipdist_outputs: info.clipdist_outputs,
            num_written_clipdistance: info.num_written_clipdistance,
            edgeflag_output: info.edgeflag_output,
        }
    }

    /// The edge-flag bit travels in the clip mask (and header word) when
    /// clip testing runs and the shader writes edge flags.
    pub fn edgeflag_in_clipmask(&self) -> bool {
        self.enable_cliptest && self.need_edgeflags
    }

    /// Compute the lane-group clip mask from shader outputs.
    pub fn compute_clipmask(
        &self,
        outputs: &[[Option<SoaF32>; 4]],
        planes: &[[f32; 4]; TOTAL_CLIP_PLANES],
    ) -> SoaU32 {
        let Some(pos) = self.position_output else {
            return SoaU32::ZERO;
        };
        let load = |slot: u32, chan: usize| -> SoaF32 {
            outputs[slot as usize][chan].unwrap_or(SoaF32::ZERO)
        };

        let zero = SoaF32::ZERO;
        let pos_v: [SoaF32; 4] = [load(pos, 0), load(pos, 1), load(pos, 2), load(pos, 3)];
        let cv = self.clipvertex_output.unwrap_or(pos);
        let cv_v: [SoaF32; 4] = if self.clip_user && cv != pos {
            [load(cv, 0), load(cv, 1), load(cv, 2), load(cv, 3)]
        } else {
            pos_v
        };
        let [pos_x, pos_y, pos_z, pos_w] = pos_v;

        let mut mask = SoaU32::ZERO;
        let bit = |test: SoaU32, b: u32| test & SoaU32::splat(1 << b);

        // Hardwired planes. Unordered compares: NaN always clips.
        if self.clip_xy {
            mask = mask | bit(pos_x.cmp_gt_unordered(pos_w), 0);
            mask = mask | bit(zero.cmp_gt_unordered(pos_x + pos_w), 1);
            mask = mask | bit(pos_y.cmp_gt_unordered(pos_w), 2);
            mask = mask | bit(zero.cmp_gt_unordered(pos_y + pos_w), 3);
        }

        if self.clip_z {
            let near = if self.clip_halfz {
                // [0, 1] depth range: near plane is z > 0.
                zero.cmp_gt_unordered(pos_z)
            } else {
                zero.cmp_gt_unordered(pos_z + pos_w)
            };
            mask = mask | bit(near, 4);
            mask = mask | bit(pos_z.cmp_gt_unordered(pos_w), 5);
        }

        if self.clip_user {
            let have_cd = self.clipdist_outputs[0].is_some() || self.clipdist_outputs[1].is_some();
            let mut ucp = self.ucp_enable;
            while ucp != 0 {
                let plane_idx = ucp.trailing_zeros();
                ucp &= ucp - 1;
                let bit_idx = plane_idx + FIRST_USER_PLANE;

                if have_cd && self.num_written_clipdistance > 0 {
                    // Shader-written clip distance: negative means clipped,
                    // and any non-finite distance conservatively clips.
                    let clipdist = if plane_idx < 4 {
                        self.clipdist_outputs[0]
                            .map(|cd| load(cd, plane_idx as usize))
                            .unwrap_or(zero)
                    } else {
                        self.clipdist_outputs[1]
                            .map(|cd| load(cd, (plane_idx - 4) as usize))
                            .unwrap_or(zero)
                    };
                    let test = zero.cmp_gt_unordered(clipdist) | clipdist.is_nan_or_inf();
                    mask = mask | bit(test, bit_idx);
                } else {
                    // Plane-equation dot product against the clip vertex.
                    let plane = planes[bit_idx as usize];
                    let mut sum = SoaF32::splat(plane[0]) * cv_v[0];
                    for i in 1..4 {
                        sum = SoaF32::splat(plane[i]).mul_add(cv_v[i], sum);
                    }
                    mask = mask | bit(zero.cmp_gt_unordered(sum), bit_idx);
                }
            }
        }

        if self.need_edgeflags {
            // Not really clipping, but the bit lives in the same header
            // word: set when the edge-flag output equals 1.0 exactly.
            let edge = self
                .edgeflag_output
                .map(|e| load(e, 0))
                .unwrap_or(SoaF32::ZERO);
            mask = mask | (SoaF32::splat(1.0).cmp_eq(edge) & SoaU32::splat(EDGE_BIT));
        }

        mask
    }
}

/// Perspective divide plus viewport scale/translate, in place.
///
/// The w channel is overwritten with `1/w`; x, y, z divide by the original
/// w (multiplying by the reciprocal) before the fused scale/translate.
pub fn apply_viewport(outputs: &mut [[Option<SoaF32>; 4]], pos: u32, viewport: &Viewport) {
    let pos = pos as usize;
    let out3 = outputs[pos][3].unwrap_or(SoaF32::ZERO);
    let w_recip = SoaF32::splat(1.0).div(out3);
    outputs[pos][3] = Some(w_recip);

    for i in 0..3 {
        let out = outputs[pos][i].unwrap_or(SoaF32::ZERO);
        let scale = SoaF32::splat(viewport.scale[i]);
        let trans = SoaF32::splat(viewport.translate[i]);
        outputs[pos][i] = Some((out * w_recip).mul_add(scale, trans));
    }
}
