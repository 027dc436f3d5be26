//! Optional persistent variant cache.
//!
//! Keyed by a 20-byte content hash over the raw key bytes, the serialized
//! shader IR, and a 32-bit discriminator. Lookups that miss (or return a
//! blob that fails to decode) are silently treated as "not cached"; nothing
//! here is retried or surfaced as an error.

/// Content hash identifying one cached artifact.
pub type CacheKey = [u8; 20];

/// Host-provided persistent cache. Blobs are opaque to the host.
pub trait VariantDiskCache {
    fn find(&self, key: &CacheKey) -> Option<Vec<u8>>;
    fn insert(&self, key: &CacheKey, blob: &[u8]);
}

/// blake3 over {key bytes, IR bytes, discriminator}, truncated to 20 bytes.
pub fn content_hash(key_bytes: &[u8], ir_bytes: &[u8], discriminator: u32) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key_bytes);
    hasher.update(ir_bytes);
    hasher.update(&discriminator.to_le_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.as_bytes()[..20]);
    out
}
