//! The lowered vertex program and its per-draw execution loop.
//!
//! A [`VertexProgram`] is the compiled artifact of one variant: every
//! per-variant decision (fetch recipes, clip plan, color clamping, lane
//! width) is resolved when it is built, leaving the draw loop free of
//! key-dependent branching. The program is plain data — it is what the
//! persistent cache stores.

use serde::{Deserialize, Serialize};

use prism_shader::{
    BodyParams, Semantic, ShaderBody, ShaderError, ShaderInfo, SoaF32, SoaU32, SystemValues,
    VertexShader,
};

use crate::clip::{self, ClipPlan, EDGE_BIT};
use crate::fetch::{self, FetchPlan};
use crate::key::VariantKey;
use crate::layout::{DrawBuffer, JitContext, JitResources, VertexBufferBinding, VertexHeaderLayout};
use crate::output;

/// Arguments of one generated-function invocation, in the fixed calling
/// convention order consumed by the surrounding draw pipeline.
pub struct DrawArgs<'a> {
    pub context: &'a JitContext<'a>,
    pub resources: &'a JitResources<'a>,
    /// Output arena, laid out per the variant's [`VertexHeaderLayout`]. Must
    /// hold `count` records rounded up to a whole lane group.
    pub vertex_headers: &'a mut [u8],
    pub vbuffers: &'a [DrawBuffer<'a>],
    pub count: u32,
    /// Linear mode: first vertex. Indexed mode: the index-list capacity
    /// (vestigial — not consulted for clamping).
    pub start_or_fetch_elt_max: u32,
    /// Vestigial by convention; the record stride comes from the layout.
    pub stride: u32,
    pub vb_bindings: &'a [VertexBufferBinding],
    pub instance_id: u32,
    pub vertex_id_offset: u32,
    pub start_instance: u32,
    /// `None` selects linear fetch mode.
    pub fetch_elts: Option<&'a [u32]>,
    pub draw_id: u32,
    pub view_id: u32,
}

/// One variant's lowered program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexProgram {
    lanes: u32,
    num_outputs: u32,
    fetch: Vec<FetchPlan>,
    clip: ClipPlan,
    /// Output slots clamped to [0, 1] after the shader body (primary and
    /// secondary color, when the variant requests clamping).
    clamp_color_slots: Vec<u32>,
    body: ShaderBody,
}

impl VertexProgram {
    pub fn build(
        key: &VariantKey,
        shader: &VertexShader,
        info: &ShaderInfo,
        lanes: u32,
    ) -> Result<VertexProgram, ShaderError> {
        let body = shader.lower()?;
        debug_assert_eq!(body.num_outputs(), key.num_outputs);

        let clamp_color_slots = if key.clamp_vertex_color() {
            info.semantics
                .iter()
                .enumerate()
                .filter(|(_, s)| matches!(**s, Semantic::Color(_)))
                .map(|(slot, _)| slot as u32)
                .collect()
        } else {
            Vec::new()
        };

        Ok(VertexProgram {
            lanes,
            num_outputs: key.num_outputs,
            fetch: key.vertex_elements.iter().map(FetchPlan::from_element).collect(),
            clip: ClipPlan::new(key, info),
            clamp_color_slots,
            body,
        })
    }

    pub fn lanes(&self) -> u32 {
        self.lanes
    }

    pub fn num_outputs(&self) -> u32 {
        self.num_outputs
    }

    pub fn clip(&self) -> &ClipPlan {
        &self.clip
    }

    /// Run the program over `args.count` vertices in lane-group strides of
    /// increasing index order.
    ///
    /// Returns 1 when any emitted lane needs pipeline processing: a clip
    /// plane violated or, with edge-flag tracking active, an edge flag that
    /// is not exactly 1.0.
    pub fn run(&self, hdr: &VertexHeaderLayout, args: &mut DrawArgs<'_>) -> u8 {
        let lanes = self.lanes as usize;
        if args.count == 0 {
            return 0;
        }
        assert!(
            args.vertex_headers.len() >= hdr.arena_size(args.count, lanes),
            "vertex header arena too small: {} < {}",
            args.vertex_headers.len(),
            hdr.arena_size(args.count, lanes),
        );
        if let Some(elts) = args.fetch_elts {
            assert!(
                elts.len() >= args.count as usize,
                "index list shorter than vertex count"
            );
        }

        // Everything constant per draw.
        let prepared: Vec<_> = self
            .fetch
            .iter()
            .map(|plan| {
                fetch::prepare(
                    plan,
                    args.vbuffers,
                    args.vb_bindings,
                    args.instance_id,
                    args.start_instance,
                )
            })
            .collect();

        let fetch_max = args.count - 1;
        let mut inputs = vec![[SoaF32::ZERO; 4]; self.fetch.len()];
        let mut outputs: Vec<[Option<SoaF32>; 4]> =
            vec![[None; 4]; self.num_outputs.max(self.body.num_outputs()) as usize];
        let mut clipmask_accum = SoaU32::ZERO;

        let mut group = 0u32;
        while group < args.count {
            let linear = SoaU32::from_fn(|l| group.wrapping_add(l as u32));
            let exec_mask = linear.cmp_le(SoaU32::splat(fetch_max));
            // Clamp to the last vertex so trailing lanes fetch a valid
            // (duplicated) index instead of running past the buffers.
            let clamped = linear.min(SoaU32::splat(fetch_max));
            let true_index = match args.fetch_elts {
                Some(elts) => SoaU32::from_fn(|l| elts[clamped.0[l] as usize]),
                None => clamped.wrapping_add(SoaU32::splat(args.start_or_fetch_elt_max)),
            };

            for (input, prep) in inputs.iter_mut().zip(&prepared) {
                *input = prep.fetch(true_index, lanes);
            }

            let system = SystemValues {
                vertex_id: true_index,
                vertex_id_nobase: true_index
                    .wrapping_sub(SoaU32::splat(args.vertex_id_offset)),
                instance_id: args.instance_id,
                // Zero for linear draws, per draw-parameters semantics.
                base_vertex: if args.fetch_elts.is_some() {
                    args.vertex_id_offset
                } else {
                    0
                },
                base_instance: args.start_instance,
                first_vertex: args.vertex_id_offset,
                draw_id: args.draw_id,
                view_index: args.view_id,
            };
            let params = BodyParams {
                constants: args.resources.constants,
                system: &system,
                exec_mask,
                lanes,
            };
            self.body.run(&params, &inputs, &mut outputs);

            for &slot in &self.clamp_color_slots {
                for chan in outputs[slot as usize].iter_mut() {
                    if let Some(v) = chan {
                        *v = v.clamp01();
                    }
                }
            }

            let base = group as usize;
            let clipmask;
            if let (Some(pos), Some(_cv)) =
                (self.clip.position_output, self.clip.clipvertex_output)
            {
                // Original positions go to the clip field before any
                // further manipulation, viewport bypass included.
                output::store_clip(args.vertex_headers, hdr, base, &outputs, pos, lanes);

                if self.clip.enable_cliptest {
                    clipmask = self.clip.compute_clipmask(&outputs, args.context.planes);
                    clipmask_accum = clipmask_accum | clipmask;
                } else {
                    clipmask = SoaU32::ZERO;
                }

                if !self.clip.bypass_viewport {
                    if let Some(viewport) = args.context.viewports.first() {
                        clip::apply_viewport(&mut outputs, pos, viewport);
                    }
                }
            } else {
                clipmask = SoaU32::ZERO;
            }

            output::convert_to_aos(
                args.vertex_headers,
                hdr,
                base,
                &outputs,
                clipmask,
                self.num_outputs,
                lanes,
                self.clip.edgeflag_in_clipmask(),
            );

            group += self.lanes;
        }

        // The returned byte means "wants pipeline processing", so the edge
        // bit must be inverted: edge == 1.0 set it in the mask, but it is
        // edge != 1.0 that needs the pipeline.
        if self.clip.edgeflag_in_clipmask() {
            clipmask_accum = clipmask_accum ^ SoaU32::splat(EDGE_BIT);
        }
        u8::from(clipmask_accum.any(lanes))
    }
}
