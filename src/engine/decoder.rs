// src/engine/decoder.rs
//
// Decode surface: JPEG via mozjpeg, PNG via zune-png, WebP via libwebp.
// Routing is by container magic, not by the declared MIME type - bytes that
// lie about their type still decode when possible and get re-encoded to the
// declared type downstream.

use crate::engine::common::run_with_panic_policy;
use crate::error::{Result, SlimImageError};
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
/// Significantly faster than the image crate's pure Rust decoder.
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(SlimImageError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            SlimImageError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            SlimImageError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width() as u32;
        let height = decompress.height() as u32;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            SlimImageError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            SlimImageError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode PNG using zune-png. 16bit入力は8bitへダウンサンプル。
pub fn decode_png_zune(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| SlimImageError::decode_failed(format!("png: decode failed: {e}")))?;

        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| SlimImageError::decode_failed("png: missing header info"))?;

        let width = width as u32;
        let height = height as u32;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(SlimImageError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| SlimImageError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| SlimImageError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| {
                        SlimImageError::decode_failed("png: failed to build RGBA image")
                    })?
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| SlimImageError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| SlimImageError::decode_failed("png: failed to build LumaA image"))?,
            other => {
                return Err(SlimImageError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(img)
    })
}

/// Decode WebP using libwebp. Falls back to the image crate for animated
/// WebP, which the simple decoder does not support.
pub fn decode_webp_libwebp(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        // Parse the header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            SlimImageError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            return image::load_from_memory(data).map_err(|e| {
                SlimImageError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        let decoder = WebPDecoder::new(data);
        let decoded = decoder
            .decode()
            .ok_or_else(|| SlimImageError::decode_failed("webp: decode failed"))?;

        Ok(decoded.to_image())
    })
}

/// Decode via the image crate for anything the dedicated decoders don't
/// claim.
fn decode_with_image_crate(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| SlimImageError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Unified decode entrypoint:
/// - Detect the container once (magic bytes)
/// - Route JPEG to mozjpeg, PNG to zune-png, WebP to libwebp
/// - Fall back to the image crate for everything else
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    match image::guess_format(bytes).ok() {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes),
        Some(ImageFormat::Png) => decode_png_zune(bytes),
        Some(ImageFormat::WebP) => decode_webp_libwebp(bytes),
        _ => decode_with_image_crate(bytes),
    }
}
