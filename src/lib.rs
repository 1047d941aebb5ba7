// lib.rs
//
// slim-image: an in-process image re-compression engine
//
// Design goals:
// - Same format in, smaller file out (no conversion, no metadata games)
// - Encoding runs in an isolated worker context, never on the caller's thread
// - Bounded work: linear parameter descent, hard deadline, hard pixel ceiling
// - One file per call; the caller owns the request and the result

pub mod engine;
pub mod error;
pub mod presets;

pub use engine::{compress, CompressOptions, CompressResult, CompressionStats};
pub use error::{ErrorCategory, Result, SlimImageError};
pub use presets::{Preset, PresetId, SupportedFormat, DEFAULT_PRESET, PRESETS};

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// MIME types the engine accepts as input (and therefore produces as
/// output - the format never changes).
pub fn supported_mime_types() -> [&'static str; 3] {
    ["image/jpeg", "image/png", "image/webp"]
}
