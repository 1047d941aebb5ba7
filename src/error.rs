// src/error.rs
//
// Unified error handling for slim-image
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - Validation: Invalid input, rejected before any worker is spawned
// - Encoding: Decode/encode failures inside the worker
// - ProtocolTimeout: No worker response within the deadline
// - ProtocolCrash: The worker context itself died
// - Internal: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy for caller-side handling.
///
/// - Validation: rejected synchronously, user picks another file/option
/// - Encoding: structured failure from the worker context
/// - ProtocolTimeout: deadline fired before a matching response
/// - ProtocolCrash: the worker context faulted (not a structured failure)
/// - Internal: library bugs (should not happen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Encoding,
    ProtocolTimeout,
    ProtocolCrash,
    Internal,
}

/// slim-image error types
///
/// All errors carry a human-readable message; the facade surfaces that
/// message verbatim to the calling UI.
#[derive(Debug, Clone, Error)]
pub enum SlimImageError {
    // Validation Errors
    #[error("Unsupported file format '{format}'. Use JPG, PNG or WebP.")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("File is too large ({bytes} bytes). Maximum size is {max} bytes.")]
    FileTooLarge { bytes: u64, max: u64 },

    #[error("Total size limit exceeded ({bytes} bytes, maximum {max} bytes).")]
    TotalSizeExceeded { bytes: u64, max: u64 },

    #[error("Invalid value for {name}: {reason}")]
    InvalidOption {
        name: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Decode/Encode Errors (raised inside the worker context)
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    /// Structured failure response from the worker context, carrying the
    /// original error text verbatim.
    #[error("{message}")]
    CompressionFailed { message: Cow<'static, str> },

    // Protocol Errors
    #[error("Compression worker timed out before responding.")]
    WorkerTimeout,

    #[error("Compression worker crashed{}", format_crash_details(.details))]
    WorkerCrashed { details: Cow<'static, str> },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn format_crash_details(details: &str) -> String {
    if details.is_empty() {
        ".".to_string()
    } else {
        format!(": {details}")
    }
}

// Constructor Helpers
impl SlimImageError {
    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn file_too_large(bytes: u64, max: u64) -> Self {
        Self::FileTooLarge { bytes, max }
    }

    pub fn total_size_exceeded(bytes: u64, max: u64) -> Self {
        Self::TotalSizeExceeded { bytes, max }
    }

    pub fn invalid_option(
        name: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn compression_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::CompressionFailed {
            message: message.into(),
        }
    }

    pub fn worker_timeout() -> Self {
        Self::WorkerTimeout
    }

    pub fn worker_crashed(details: impl Into<Cow<'static, str>>) -> Self {
        Self::WorkerCrashed {
            details: details.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check whether retrying with a different file, preset or moment in
    /// time can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self.category() {
            ErrorCategory::Validation
            | ErrorCategory::ProtocolTimeout
            | ErrorCategory::ProtocolCrash => true,
            ErrorCategory::Encoding | ErrorCategory::Internal => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedFormat { .. }
            | Self::FileTooLarge { .. }
            | Self::TotalSizeExceeded { .. }
            | Self::InvalidOption { .. } => ErrorCategory::Validation,

            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::CompressionFailed { .. } => ErrorCategory::Encoding,

            Self::WorkerTimeout => ErrorCategory::ProtocolTimeout,
            Self::WorkerCrashed { .. } => ErrorCategory::ProtocolCrash,

            Self::InternalPanic { .. } => ErrorCategory::Internal,
        }
    }
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "Validation",
            ErrorCategory::Encoding => "Encoding",
            ErrorCategory::ProtocolTimeout => "ProtocolTimeout",
            ErrorCategory::ProtocolCrash => "ProtocolCrash",
            ErrorCategory::Internal => "Internal",
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, SlimImageError>;
