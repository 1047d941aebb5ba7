// src/engine/encoder.rs
//
// Encoder surface: JPEG (mozjpeg), WebP (libwebp), lossless PNG
// (image + oxipng), and the dispatch point that wires each format into the
// size-targeting search.

use crate::engine::common::run_with_panic_policy;
use crate::engine::search::{compress_lossy, compress_png};
use crate::error::{Result, SlimImageError};
use crate::presets::{Preset, SupportedFormat};
use image::{DynamicImage, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// 品質値(0.0-1.0)からWebPのエンコード設定を導出する。
/// High (>=0.85) / Balanced (>=0.70) / Fast (<0.70) の3帯域。
#[derive(Debug, Clone, Copy)]
struct WebPSettings {
    quality: f32,
}

impl WebPSettings {
    fn new(quality: f32) -> Self {
        Self {
            quality: quality.clamp(0.0, 1.0),
        }
    }

    fn libwebp_quality(&self) -> f32 {
        self.quality * 100.0
    }

    fn sns_strength(&self) -> i32 {
        if self.quality >= 0.85 {
            50
        } else if self.quality >= 0.70 {
            70
        } else {
            80
        }
    }

    fn filter_strength(&self) -> i32 {
        if self.quality >= 0.80 {
            20
        } else if self.quality >= 0.60 {
            30
        } else {
            40
        }
    }
}

/// Encode to JPEG using mozjpeg. Progressive, optimized coding, 2x2 chroma
/// subsampling. Quality is a float in [0,1].
pub fn encode_jpeg(img: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        // Zero-copy when the source is already RGB8
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(SlimImageError::internal_panic(
                "invalid image dimensions: width or height is zero",
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality((quality.clamp(0.0, 1.0) * 100.0).round());

        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let mut writer = comp.start_compress(&mut output).map_err(|e| {
            SlimImageError::encode_failed(
                "jpeg",
                format!("mozjpeg: failed to start compress: {e:?}"),
            )
        })?;

        let stride = w as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).map_err(|e| {
                SlimImageError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to write scanlines: {e:?}"),
                )
            })?;
        }

        writer.finish().map_err(|e| {
            SlimImageError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
        })?;

        Ok(output)
    })
}

/// Encode to WebP with libwebp advanced config. RGBA sources keep their
/// alpha channel; everything else goes through RGB.
pub fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let has_alpha = img.color().has_alpha();
        let (w, h) = (img.width(), img.height());

        let rgb_buf;
        let rgba_buf;
        let encoder = if has_alpha {
            rgba_buf = match img {
                DynamicImage::ImageRgba8(rgba) => Cow::Borrowed(rgba),
                _ => Cow::Owned(img.to_rgba8()),
            };
            webp::Encoder::from_rgba(&rgba_buf, w, h)
        } else {
            rgb_buf = match img {
                DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
                _ => Cow::Owned(img.to_rgb8()),
            };
            webp::Encoder::from_rgb(&rgb_buf, w, h)
        };

        let mut config = webp::WebPConfig::new()
            .map_err(|_| SlimImageError::internal_panic("failed to create WebPConfig"))?;

        let settings = WebPSettings::new(quality);
        config.quality = settings.libwebp_quality();
        config.method = 4;
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.filter_strength();

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            SlimImageError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;

        Ok(mem.to_vec())
    })
}

/// Lossless PNG encode: image crate first, then oxipng re-compression.
/// oxipng preset 2 keeps the reduction-ladder re-encodes affordable.
pub fn encode_png_lossless(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| SlimImageError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let options = oxipng::Options::from_preset(2);
        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            SlimImageError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode a decoded bitmap honoring the preset and the optional byte
/// budget. JPEG and lossy WebP share the quality-descent strategy; PNG runs
/// the lossless reduction ladder.
pub fn encode_with_preset(
    img: &DynamicImage,
    format: SupportedFormat,
    preset: &Preset,
    target_bytes: Option<u64>,
) -> Result<Vec<u8>> {
    match format {
        SupportedFormat::Jpeg => {
            compress_lossy(img, preset, target_bytes, |canvas, quality| {
                encode_jpeg(canvas, quality)
            })
        }
        SupportedFormat::WebP => {
            compress_lossy(img, preset, target_bytes, |canvas, quality| {
                encode_webp(canvas, quality)
            })
        }
        SupportedFormat::Png => {
            compress_png(img, preset, target_bytes, encode_png_lossless)
        }
    }
}
