//! Compiled variants and their cache.
//!
//! Each shader owns a map from variant key to compiled variant; a global
//! count tracks every live variant in the registry. Lookup and insertion
//! take `&mut self` — concurrent draw submission must serialize access
//! externally (one registry per rendering context). Published variants are
//! `Arc`s: a draw that already holds one keeps a valid program even if the
//! variant is destroyed underneath it.

use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use thiserror::Error;
use tracing::debug;

use prism_shader::{ShaderError, ShaderInfo, VertexShader};

use crate::cache::{content_hash, VariantDiskCache};
use crate::init;
use crate::key::{make_variant_key, trace_variant_key, PipelineState, VariantKey};
use crate::layout::VertexHeaderLayout;
use crate::pipeline::{DrawArgs, VertexProgram};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantId(u32);

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("unknown shader id {0:?}")]
    UnknownShader(ShaderId),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error("persistent cache artifact could not be encoded: {0}")]
    CacheEncode(postcard::Error),
}

/// One compiled specialization: the key it was built for, its lowered
/// program, and the lazily computed output record layout.
pub struct Variant {
    id: VariantId,
    key: VariantKey,
    module_name: String,
    program: VertexProgram,
    // Depends on the key's output count; computed on first use.
    header_layout: OnceLock<VertexHeaderLayout>,
}

impl Variant {
    pub fn id(&self) -> VariantId {
        self.id
    }

    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn program(&self) -> &VertexProgram {
        &self.program
    }

    pub fn header_layout(&self) -> &VertexHeaderLayout {
        self.header_layout
            .get_or_init(|| VertexHeaderLayout::new(self.key.num_outputs))
    }

    /// Output arena bytes required for a `count`-vertex draw.
    pub fn required_arena_size(&self, count: u32) -> usize {
        self.header_layout()
            .arena_size(count, self.program.lanes() as usize)
    }

    /// Invoke the compiled function.
    pub fn execute(&self, args: &mut DrawArgs<'_>) -> u8 {
        let hdr = *self.header_layout();
        self.program.run(&hdr, args)
    }
}

struct ShaderState {
    ir: VertexShader,
    info: ShaderInfo,
    /// Serialized IR, hashed into persistent-cache keys.
    ir_bytes: Vec<u8>,
    variants: HashMap<VariantKey, Arc<Variant>>,
    by_id: HashMap<VariantId, VariantKey>,
    variants_cached: usize,
}

/// Per-context variant registry.
pub struct DrawJit {
    shaders: HashMap<ShaderId, ShaderState>,
    next_shader_id: u32,
    next_variant_id: u32,
    nr_variants: usize,
    variants_created: u64,
    disk_cache: Option<Box<dyn VariantDiskCache>>,
    vector_width: u32,
}

impl DrawJit {
    pub fn new() -> DrawJit {
        DrawJit {
            shaders: HashMap::new(),
            next_shader_id: 0,
            next_variant_id: 0,
            nr_variants: 0,
            variants_created: 0,
            disk_cache: None,
            vector_width: init::init(),
        }
    }

    pub fn with_disk_cache(cache: Box<dyn VariantDiskCache>) -> DrawJit {
        DrawJit {
            disk_cache: Some(cache),
            ..DrawJit::new()
        }
    }

    pub fn vector_width(&self) -> u32 {
        self.vector_width
    }

    pub fn lanes(&self) -> u32 {
        self.vector_width / 32
    }

    /// Live variants across all shaders in this registry.
    pub fn nr_variants(&self) -> usize {
        self.nr_variants
    }

    /// Total variants ever created. In-memory cache hits don't count; a
    /// persistent-cache hit still creates (and counts) a variant.
    pub fn variants_created(&self) -> u64 {
        self.variants_created
    }

    pub fn create_vertex_shader(&mut self, ir: VertexShader) -> Result<ShaderId, ShaderError> {
        // Validate up front so variant creation can't fail on IR problems.
        ir.lower()?;
        let info = ShaderInfo::of(&ir);
        let ir_bytes = ir.to_bytes()?;
        let id = ShaderId(self.next_shader_id);
        self.next_shader_id += 1;
        self.shaders.insert(
            id,
            ShaderState {
                ir,
                info,
                ir_bytes,
                variants: HashMap::new(),
                by_id: HashMap::new(),
                variants_cached: 0,
            },
        );
        Ok(id)
    }

    pub fn shader_info(&self, shader: ShaderId) -> Option<&ShaderInfo> {
        self.shaders.get(&shader).map(|s| &s.info)
    }

    pub fn shader_variants_cached(&self, shader: ShaderId) -> Option<usize> {
        self.shaders.get(&shader).map(|s| s.variants_cached)
    }

    pub fn make_variant_key(
        &self,
        shader: ShaderId,
        state: &PipelineState<'_>,
    ) -> Result<VariantKey, VariantError> {
        let st = self
            .shaders
            .get(&shader)
            .ok_or(VariantError::UnknownShader(shader))?;
        Ok(make_variant_key(state, &st.info))
    }

    /// Look up or compile the variant for `key`.
    ///
    /// At most one compilation happens per distinct key value; keys that
    /// differ in any byte never share a variant. A failure leaves the
    /// registry untouched.
    pub fn get_or_create_variant(
        &mut self,
        shader: ShaderId,
        key: &VariantKey,
    ) -> Result<Arc<Variant>, VariantError> {
        let lanes = self.vector_width / 32;
        let st = self
            .shaders
            .get_mut(&shader)
            .ok_or(VariantError::UnknownShader(shader))?;

        if let Some(variant) = st.variants.get(key) {
            return Ok(variant.clone());
        }

        let module_name = format!("draw_vs_variant{}", self.variants_created);
        trace_variant_key(key);

        // Consult the persistent cache before lowering; a hit restores the
        // program and skips compilation entirely.
        let mut cache_key = None;
        let mut program = None;
        if let Some(cache) = &self.disk_cache {
            let hash = content_hash(
                &key.canonical_bytes(),
                &st.ir_bytes,
                key.nr_vertex_elements(),
            );
            if let Some(blob) = cache.find(&hash) {
                // A stale or truncated artifact is just a miss.
                program = postcard::from_bytes::<VertexProgram>(&blob)
                    .ok()
                    .filter(|p: &VertexProgram| p.lanes() == lanes);
            }
            cache_key = Some(hash);
        }

        let needs_caching = program.is_none() && cache_key.is_some();
        let program = match program {
            Some(p) => p,
            None => VertexProgram::build(key, &st.ir, &st.info, lanes)?,
        };

        if needs_caching {
            if let (Some(cache), Some(hash)) = (&self.disk_cache, &cache_key) {
                let blob = postcard::to_allocvec(&program).map_err(VariantError::CacheEncode)?;
                cache.insert(hash, &blob);
            }
        }

        let id = VariantId(self.next_variant_id);
        self.next_variant_id += 1;
        let variant = Arc::new(Variant {
            id,
            key: key.clone(),
            module_name,
            program,
            header_layout: OnceLock::new(),
        });

        st.variants.insert(key.clone(), variant.clone());
        st.by_id.insert(id, key.clone());
        st.variants_cached += 1;
        self.nr_variants += 1;
        self.variants_created += 1;

        Ok(variant)
    }

    /// Evict one variant, unlinking it from both the per-shader and global
    /// registrations. Draws still holding the `Arc` keep a valid program.
    pub fn destroy_variant(&mut self, shader: ShaderId, variant: VariantId) -> bool {
        let Some(st) = self.shaders.get_mut(&shader) else {
            return false;
        };
        let Some(key) = st.by_id.remove(&variant) else {
            return false;
        };
        st.variants.remove(&key);
        st.variants_cached -= 1;
        self.nr_variants -= 1;
        debug!(
            "deleting vs variant: {} shader variants, {} total variants",
            st.variants_cached, self.nr_variants
        );
        true
    }

    /// Destroy a shader and every variant it still owns.
    pub fn destroy_shader(&mut self, shader: ShaderId) -> bool {
        let Some(st) = self.shaders.remove(&shader) else {
            return false;
        };
        self.nr_variants -= st.variants_cached;
        true
    }
}

impl Default for DrawJit {
    fn default() -> Self {
        DrawJit::new()
    }
}
