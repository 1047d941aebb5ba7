// src/engine/api.rs
//
// The public compression facade: validate, dispatch to an isolated worker,
// compute stats, tear the worker down on every path.

use crate::engine::worker::{WorkerProtocol, WorkerRequest};
use crate::engine::{MAX_FILE_BYTES, MAX_TOTAL_BYTES};
use crate::error::{Result, SlimImageError};
use crate::presets::{PresetId, SupportedFormat, DEFAULT_PRESET};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Process-wide request id counter. Ids only need to be unique per process;
/// correlation is what matters, not unpredictability.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Options for one compression call.
#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    pub preset: Option<PresetId>,
    /// Best-effort byte budget; the search attempts but does not guarantee it.
    pub target_bytes: Option<u64>,
    /// Must be true. Format conversion is a configuration error, not a
    /// runtime failure.
    pub keep_format: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            preset: None,
            target_bytes: None,
            keep_format: true,
        }
    }
}

/// Summary statistics for a successful compression, computed by the facade
/// around the full dispatch+execute+respond round trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub ratio: f64,
    pub elapsed_ms: u64,
}

/// A compressed file: output bytes in the same format as the input, plus
/// the derived stats.
#[derive(Debug, Clone)]
pub struct CompressResult {
    pub bytes: Vec<u8>,
    pub format: SupportedFormat,
    pub stats: CompressionStats,
}

impl CompressResult {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// Compress one image file.
///
/// Validates the declared MIME type and size limits synchronously, then
/// runs decode+encode in a dedicated worker context which is torn down
/// unconditionally after the call settles, success or failure.
pub fn compress(input: &[u8], declared_mime: &str, options: &CompressOptions) -> Result<CompressResult> {
    let format = validate(input, declared_mime, options)?;

    let started_at = Instant::now();
    let preset = options.preset.unwrap_or(DEFAULT_PRESET);
    let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);

    info!(
        request_id,
        preset = preset.as_str(),
        format = format.as_str(),
        input_bytes = input.len() as u64,
        target_bytes = ?options.target_bytes,
        "compression started"
    );

    let mut worker = WorkerProtocol::spawn();
    let outcome = worker.dispatch(WorkerRequest {
        id: request_id,
        bytes: input.to_vec(),
        format,
        preset_id: Some(preset),
        target_bytes: options.target_bytes,
        keep_format: options.keep_format,
    });
    // Unconditional teardown before the outcome is inspected; Drop covers
    // the panic path as well.
    worker.dispose();

    let bytes = match outcome {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(
                request_id,
                preset = preset.as_str(),
                category = error.category().as_str(),
                error = %error,
                "compression failed"
            );
            return Err(error);
        }
    };

    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    let stats = CompressionStats {
        input_bytes: input.len() as u64,
        output_bytes: bytes.len() as u64,
        ratio: bytes.len() as f64 / input.len() as f64,
        elapsed_ms,
    };

    info!(
        request_id,
        preset = preset.as_str(),
        input_bytes = stats.input_bytes,
        output_bytes = stats.output_bytes,
        ratio = stats.ratio,
        elapsed_ms = stats.elapsed_ms,
        "compression finished"
    );

    Ok(CompressResult {
        bytes,
        format,
        stats,
    })
}

/// Fail-fast validation. Runs before any worker context exists.
fn validate(input: &[u8], declared_mime: &str, options: &CompressOptions) -> Result<SupportedFormat> {
    let format = SupportedFormat::from_mime(declared_mime)
        .ok_or_else(|| SlimImageError::unsupported_format(declared_mime.to_string()))?;

    let len = input.len() as u64;
    if len > MAX_FILE_BYTES {
        return Err(SlimImageError::file_too_large(len, MAX_FILE_BYTES));
    }
    if len > MAX_TOTAL_BYTES {
        return Err(SlimImageError::total_size_exceeded(len, MAX_TOTAL_BYTES));
    }

    if !options.keep_format {
        return Err(SlimImageError::invalid_option(
            "keepFormat",
            "format conversion is not supported; keepFormat must be true",
        ));
    }

    if let Some(target) = options.target_bytes {
        if target == 0 {
            return Err(SlimImageError::invalid_option(
                "targetBytes",
                "must be a positive number",
            ));
        }
    }

    Ok(format)
}
