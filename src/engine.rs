// src/engine.rs
//
// The core of slim-image:
// 1. Validate input against the fixed limits
// 2. Hand the bytes to an isolated worker context
// 3. Decode, downscale if needed, run the size-targeting encode
// 4. Tear the context down unconditionally
//
// This file is a facade that delegates to the decomposed modules in engine/

// =============================================================================
// FIXED LIMITS
// =============================================================================

/// Maximum size of a single input file.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum aggregate input size. Redundant with the per-file ceiling while
/// the engine processes one file per call; kept as an independent invariant
/// for a future batch mode.
pub const MAX_TOTAL_BYTES: u64 = 25 * 1024 * 1024;

/// Soft pixel ceiling, checked on the post-downscale dimensions. Exceeding
/// it is a hard failure, never silently handled.
pub const SOFT_PIXEL_LIMIT: u64 = 30_000_000;

/// Hard deadline for one worker round trip.
pub const WORKER_TIMEOUT_MS: u64 = 20_000;

/// Size-target bucket threshold for the PNG reduction ladder. Targets at or
/// under this get the more aggressive scale/level candidates.
pub const PNG_SMALL_TARGET_BYTES: u64 = 150 * 1024;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod api;
mod common;
mod decoder;
mod encoder;
mod pipeline;
mod search;
mod worker;

pub use api::{compress, CompressOptions, CompressResult, CompressionStats};
pub use decoder::{decode_image, decode_jpeg_mozjpeg, decode_png_zune, decode_webp_libwebp};
pub use encoder::{encode_jpeg, encode_png_lossless, encode_webp, encode_with_preset};
pub use pipeline::{
    channel_levels, check_pixel_budget, downscale, quantize_rgb_in_place, resolve_target_size,
};
pub use search::{compress_lossy, compress_png};
pub use worker::{ProtocolState, WorkerProtocol, WorkerRequest, WorkerResponse};
