// src/presets.rs
//
// Static compression presets and the supported-format allow-list.
// The table is read-only process-wide state: const data, no lifecycle.

use crate::error::SlimImageError;
use std::str::FromStr;

/// The three supported input/output formats. Conversion between formats is
/// not supported; the output MIME type always equals the declared input
/// MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedFormat {
    Jpeg,
    Png,
    WebP,
}

impl SupportedFormat {
    /// Map a declared MIME type onto a supported format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    /// Short lowercase name used in error messages and telemetry fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    /// Lossy formats share the quality-descent strategy; PNG gets the
    /// lossless ladder.
    pub fn is_lossy(&self) -> bool {
        !matches!(self, Self::Png)
    }
}

/// Preset identifier. Trades speed for size reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetId {
    Fast,
    Balanced,
    Max,
}

impl PresetId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Max => "max",
        }
    }

    /// Look up the preset parameters. Infallible: every id has an entry.
    pub fn preset(&self) -> &'static Preset {
        match self {
            Self::Fast => &PRESETS[0],
            Self::Balanced => &PRESETS[1],
            Self::Max => &PRESETS[2],
        }
    }
}

impl FromStr for PresetId {
    type Err = SlimImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "max" => Ok(Self::Max),
            other => Err(SlimImageError::invalid_option(
                "preset",
                format!("unknown preset '{other}'. Available: fast, balanced, max"),
            )),
        }
    }
}

/// Immutable bundle of encoding parameters.
///
/// Quality values are floats in [0,1] and are mapped to codec-native scales
/// at the encoder boundary. `png_*_colors` bound the quantization ladder for
/// PNG output; lossy formats ignore them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub id: PresetId,
    pub label: &'static str,
    pub max_dimension: u32,
    pub initial_quality: f32,
    pub min_quality: f32,
    pub quality_step: f32,
    pub max_iterations: u32,
    pub png_max_colors: u32,
    pub png_min_colors: u32,
    pub png_color_step: u32,
}

pub const DEFAULT_PRESET: PresetId = PresetId::Balanced;

pub const PRESETS: [Preset; 3] = [
    Preset {
        id: PresetId::Fast,
        label: "Fast",
        max_dimension: 2200,
        initial_quality: 0.82,
        min_quality: 0.72,
        quality_step: 0.07,
        max_iterations: 2,
        png_max_colors: 192,
        png_min_colors: 128,
        png_color_step: 32,
    },
    Preset {
        id: PresetId::Balanced,
        label: "Balanced",
        max_dimension: 2000,
        initial_quality: 0.74,
        min_quality: 0.55,
        quality_step: 0.06,
        max_iterations: 5,
        png_max_colors: 128,
        png_min_colors: 64,
        png_color_step: 16,
    },
    Preset {
        id: PresetId::Max,
        label: "Max",
        max_dimension: 1600,
        initial_quality: 0.60,
        min_quality: 0.35,
        quality_step: 0.05,
        max_iterations: 8,
        png_max_colors: 64,
        png_min_colors: 16,
        png_color_step: 16,
    },
];
