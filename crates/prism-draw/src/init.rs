//! Process-wide codegen configuration.
//!
//! The native vector width is ambient state shared by every [`crate::DrawJit`]
//! in the process: it decides the lane count every lowered program runs at,
//! and it must not change while variants exist. Initialization is idempotent;
//! [`shutdown`] is the explicit teardown for hosts that re-initialize with a
//! different width between rendering sessions.

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Default SIMD width in bits (4 f32 lanes).
pub const DEFAULT_NATIVE_VECTOR_WIDTH: u32 = 128;

/// 0 = not initialized.
static NATIVE_VECTOR_WIDTH: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("native vector width is fixed once initialization has run")]
    AlreadyInitialized,
    #[error("unsupported native vector width {0} (expected 128, 256 or 512)")]
    UnsupportedVectorWidth(u32),
}

/// Initialize the codegen backend, fixing the native vector width.
///
/// Idempotent: the first call wins (defaulting to
/// [`DEFAULT_NATIVE_VECTOR_WIDTH`] unless [`set_native_vector_width`] ran
/// earlier); later calls return the already-fixed width.
pub fn init() -> u32 {
    match NATIVE_VECTOR_WIDTH.compare_exchange(
        0,
        DEFAULT_NATIVE_VECTOR_WIDTH,
        Ordering::SeqCst,
        Ordering::SeqCst,
    ) {
        Ok(_) => DEFAULT_NATIVE_VECTOR_WIDTH,
        Err(current) => current,
    }
}

/// Override the native vector width. Only valid before [`init`] has run.
pub fn set_native_vector_width(bits: u32) -> Result<(), CodegenError> {
    if !matches!(bits, 128 | 256 | 512) {
        return Err(CodegenError::UnsupportedVectorWidth(bits));
    }
    NATIVE_VECTOR_WIDTH
        .compare_exchange(0, bits, Ordering::SeqCst, Ordering::SeqCst)
        .map(|_| ())
        .map_err(|_| CodegenError::AlreadyInitialized)
}

/// Explicit teardown. The caller must guarantee no variants are alive and no
/// compilation is in flight.
pub fn shutdown() {
    NATIVE_VECTOR_WIDTH.store(0, Ordering::SeqCst);
}

/// Lane count implied by the current vector width (initializing on demand).
pub fn native_vector_lanes() -> usize {
    (init() / 32) as usize
}
