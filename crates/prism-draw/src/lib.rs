//! Software vertex-pipeline specialization engine.
//!
//! Given a vertex shader and a variant key describing concrete pipeline
//! state (vertex-element layout, clip modes, user clip planes, edge flags,
//! viewport bypass, sampler/image bindings), [`DrawJit`] lowers a
//! specialized [`pipeline::VertexProgram`] that fetches attributes, runs the
//! shader body over SIMD lane groups, clips, viewport-transforms, and packs
//! AoS vertex-header records for the downstream rasterizer. Variants are
//! cached per shader: one lowering per distinct key, ever.
//!
//! ```no_run
//! use prism_draw::{DrawJit, PipelineState};
//! # fn shader() -> prism_shader::VertexShader { unimplemented!() }
//!
//! prism_draw::init();
//! let mut jit = DrawJit::new();
//! let vs = jit.create_vertex_shader(shader()).unwrap();
//! let key = jit.make_variant_key(vs, &PipelineState::default()).unwrap();
//! let variant = jit.get_or_create_variant(vs, &key).unwrap();
//! // variant.execute(&mut args) per draw call.
//! ```

pub mod cache;
pub mod clip;
pub mod fetch;
pub mod format;
pub mod init;
pub mod key;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod variant;


pub use cache::{content_hash, CacheKey, VariantDiskCache};
pub use clip::{ClipPlan, EDGE_BIT};
pub use format::VertexFormat;
pub use init::{init, native_vector_lanes, set_native_vector_width, shutdown, CodegenError};
pub use key::{
    make_variant_key, ImageStaticState, PipelineState, SamplerSlot, SamplerStaticState,
    TextureStaticState, VariantFlags, VariantKey, VertexElement,
};
pub use layout::{
    DrawBuffer, ImageRuntimeState, JitContext, JitResources, SamplerRuntimeState,
    TextureRuntimeState, VertexBufferBinding, VertexHeaderLayout, Viewport, FIRST_USER_PLANE,
    TOTAL_CLIP_PLANES,
};
pub use pipeline::{DrawArgs, VertexProgram};
pub use variant::{DrawJit, ShaderId, Variant, VariantError, VariantId};
