// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy wrapper used around every codec surface.

use crate::error::{Result, SlimImageError};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec operation under the global panic policy.
///
/// mozjpeg and libwebp cross an FFI boundary; a panic there must never
/// unwind through the worker loop as-is. Panics become `InternalPanic`
/// errors tagged with the stage that blew up.
pub fn run_with_panic_policy<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(SlimImageError::internal_panic(format!(
            "{stage}: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Best-effort extraction of a panic payload's message text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
