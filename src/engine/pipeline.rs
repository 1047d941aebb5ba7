// src/engine/pipeline.rs
//
// Pixel-level primitives: target-size resolution, downscaling, and the
// uniform RGB quantization used by the PNG reduction ladder.

use crate::engine::SOFT_PIXEL_LIMIT;
use crate::error::{Result, SlimImageError};
use fast_image_resize::{self as fir, images::Image as FirImage, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

/// Resolve the canvas size for a decoded bitmap: if the longest side exceeds
/// `max_dimension`, scale both sides uniformly so it fits exactly, rounding
/// to the nearest integer with a 1px floor. Never upscales.
pub fn resolve_target_size(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let largest_side = width.max(height);
    if largest_side <= max_dimension {
        return (width, height);
    }

    let scale = max_dimension as f64 / largest_side as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Enforce the soft pixel ceiling on post-scale dimensions. Exceeding it is
/// a hard failure, never silently handled.
pub fn check_pixel_budget(width: u32, height: u32) -> Result<()> {
    let pixels = width as u64 * height as u64;
    if pixels > SOFT_PIXEL_LIMIT {
        return Err(SlimImageError::pixel_count_exceeds_limit(
            pixels,
            SOFT_PIXEL_LIMIT,
        ));
    }
    Ok(())
}

fn resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Downscale through fast_image_resize (Lanczos3). RGB and RGBA sources go
/// through fir directly; everything else takes the image-crate path.
pub fn downscale(img: &DynamicImage, dst_width: u32, dst_height: u32) -> Result<DynamicImage> {
    if dst_width == 0 || dst_height == 0 {
        return Err(SlimImageError::internal_panic(format!(
            "invalid resize target {dst_width}x{dst_height}"
        )));
    }
    if (dst_width, dst_height) == (img.width(), img.height()) {
        return Ok(img.clone());
    }

    match img {
        DynamicImage::ImageRgb8(rgb) => fir_resize(
            rgb.as_raw(),
            img.width(),
            img.height(),
            PixelType::U8x3,
            dst_width,
            dst_height,
        ),
        DynamicImage::ImageRgba8(rgba) => fir_resize(
            rgba.as_raw(),
            img.width(),
            img.height(),
            PixelType::U8x4,
            dst_width,
            dst_height,
        ),
        other => Ok(other.resize_exact(dst_width, dst_height, FilterType::Lanczos3)),
    }
}

fn fir_resize(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> Result<DynamicImage> {
    // fir wants a mutable source slice; copying into an owned image also
    // settles its buffer-alignment requirements.
    let src = FirImage::from_vec_u8(src_width, src_height, src_pixels.to_vec(), pixel_type)
        .map_err(|e| {
            SlimImageError::internal_panic(format!("fir source image error: {e:?}"))
        })?;

    let mut dst = FirImage::new(dst_width, dst_height, pixel_type);
    fir::Resizer::new()
        .resize(&src, &mut dst, &resize_options())
        .map_err(|e| SlimImageError::internal_panic(format!("fir resize error: {e:?}")))?;

    let buffer = dst.into_vec();
    let resized = match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst_width, dst_height, buffer)
            .map(DynamicImage::ImageRgb8),
        PixelType::U8x4 => RgbaImage::from_raw(dst_width, dst_height, buffer)
            .map(DynamicImage::ImageRgba8),
        _ => None,
    };

    resized.ok_or_else(|| {
        SlimImageError::internal_panic("fir produced a buffer of unexpected length")
    })
}

/// Map a preset color count onto per-channel quantization levels.
/// 192 colors → 6 levels/channel, 64 → 4, 16 → 3. Clamped to [2,16].
pub fn channel_levels(color_count: u32) -> u8 {
    let levels = (color_count as f64).cbrt().round() as i64;
    levels.clamp(2, 16) as u8
}

/// Uniformly quantize the RGB channels of an RGBA pixel buffer to `levels`
/// values per channel. Alpha is left untouched. The mapping is a fixed
/// lattice: step = 255/(levels-1), v → round(v/step)*step, clamped.
pub fn quantize_rgb_in_place(pixels: &mut [u8], levels: u8) {
    debug_assert!(levels >= 2);
    let step = 255.0 / (levels as f64 - 1.0);

    for pixel in pixels.chunks_exact_mut(4) {
        pixel[0] = quantize_channel(pixel[0], step);
        pixel[1] = quantize_channel(pixel[1], step);
        pixel[2] = quantize_channel(pixel[2], step);
    }
}

fn quantize_channel(value: u8, step: f64) -> u8 {
    let snapped = (value as f64 / step).round() * step;
    snapped.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, Rgba};
    use proptest::prelude::*;

    mod target_size_tests {
        use super::*;

        #[test]
        fn small_image_is_untouched() {
            assert_eq!(resolve_target_size(800, 600, 2000), (800, 600));
        }

        #[test]
        fn exact_fit_is_untouched() {
            assert_eq!(resolve_target_size(2000, 1000, 2000), (2000, 1000));
        }

        #[test]
        fn wide_image_scales_to_width() {
            assert_eq!(resolve_target_size(4000, 2000, 2000), (2000, 1000));
        }

        #[test]
        fn tall_image_scales_to_height() {
            assert_eq!(resolve_target_size(1000, 4000, 1600), (400, 1600));
        }

        #[test]
        fn rounding_is_to_nearest() {
            // 3000x2001 → scale 2/3 → 2000x1334
            assert_eq!(resolve_target_size(3000, 2001, 2000), (2000, 1334));
        }

        #[test]
        fn degenerate_strip_floors_at_one_pixel() {
            // 100000x1 → scale 0.02 → 2000x0.02 → floor at 1
            assert_eq!(resolve_target_size(100_000, 1, 2000), (2000, 1));
        }

        #[test]
        fn never_upscales() {
            assert_eq!(resolve_target_size(10, 10, 2000), (10, 10));
        }
    }

    mod pixel_budget_tests {
        use super::*;

        #[test]
        fn under_ceiling_is_ok() {
            assert!(check_pixel_budget(2000, 2000).is_ok());
            assert!(check_pixel_budget(6000, 5000).is_ok()); // exactly 30M
        }

        #[test]
        fn over_ceiling_is_hard_failure() {
            let err = check_pixel_budget(6001, 5000).unwrap_err();
            assert!(matches!(
                err,
                SlimImageError::PixelCountExceedsLimit { .. }
            ));
        }
    }

    mod downscale_tests {
        use super::*;

        #[test]
        fn rgb_downscale_hits_requested_dimensions() {
            let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 32, |x, _| {
                Rgb([(x * 4) as u8, 0, 0])
            }));
            let out = downscale(&img, 32, 16).unwrap();
            assert_eq!(out.dimensions(), (32, 16));
        }

        #[test]
        fn rgba_downscale_keeps_alpha_channel() {
            let img =
                DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([10, 20, 30, 200])));
            let out = downscale(&img, 20, 20).unwrap();
            assert_eq!(out.dimensions(), (20, 20));
            assert_eq!(out.to_rgba8().get_pixel(10, 10).0[3], 200);
        }

        #[test]
        fn same_size_is_identity() {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));
            let out = downscale(&img, 8, 8).unwrap();
            assert_eq!(out.to_rgb8().get_pixel(3, 3).0, [1, 2, 3]);
        }

        #[test]
        fn luma_goes_through_fallback_path() {
            let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(16, 16, image::Luma([80])));
            let out = downscale(&img, 8, 8).unwrap();
            assert_eq!(out.dimensions(), (8, 8));
        }

        #[test]
        fn zero_target_is_rejected() {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
            assert!(downscale(&img, 0, 8).is_err());
        }
    }

    mod quantize_tests {
        use super::*;

        #[test]
        fn channel_level_mapping() {
            assert_eq!(channel_levels(192), 6);
            assert_eq!(channel_levels(128), 5);
            assert_eq!(channel_levels(64), 4);
            assert_eq!(channel_levels(16), 3);
            assert_eq!(channel_levels(8), 2);
            // Clamped at both ends
            assert_eq!(channel_levels(1), 2);
            assert_eq!(channel_levels(1_000_000), 16);
        }

        #[test]
        fn two_levels_snap_to_black_or_white() {
            let mut px = [0u8, 100, 200, 255, 127, 128, 255, 9];
            quantize_rgb_in_place(&mut px, 2);
            assert_eq!(px, [0, 0, 255, 255, 0, 255, 255, 9]);
        }

        #[test]
        fn alpha_is_never_touched() {
            let mut px = [13u8, 77, 200, 42, 91, 18, 240, 171];
            quantize_rgb_in_place(&mut px, 4);
            assert_eq!(px[3], 42);
            assert_eq!(px[7], 171);
        }

        #[test]
        fn endpoints_are_fixed_points() {
            for levels in 2..=16u8 {
                let mut px = [0u8, 255, 0, 255];
                quantize_rgb_in_place(&mut px, levels);
                assert_eq!(&px[..3], &[0, 255, 0]);
            }
        }

        #[test]
        fn quantization_is_idempotent_at_same_level_count() {
            let source: Vec<u8> = (0u8..=255).flat_map(|v| [v, v, v, v]).collect();
            for levels in [2u8, 3, 4, 6, 16] {
                let mut once = source.clone();
                quantize_rgb_in_place(&mut once, levels);
                let mut twice = once.clone();
                quantize_rgb_in_place(&mut twice, levels);
                assert_eq!(once, twice, "levels={levels}");
            }
        }

        proptest! {
            #[test]
            fn quantized_values_always_land_on_the_lattice(
                r in 0u8..=255, g in 0u8..=255, b in 0u8..=255,
                levels in 2u8..=16,
            ) {
                let mut px = [r, g, b, 255];
                quantize_rgb_in_place(&mut px, levels);
                let step = 255.0 / (levels as f64 - 1.0);
                for v in &px[..3] {
                    let k = (*v as f64 / step).round();
                    let lattice = (k * step).round().clamp(0.0, 255.0) as u8;
                    prop_assert_eq!(*v, lattice);
                }
            }

            #[test]
            fn quantization_is_a_fixed_point_on_second_pass(
                data in proptest::collection::vec(0u8..=255, 4..64),
                levels in 2u8..=16,
            ) {
                let mut data = data;
                data.truncate(data.len() - data.len() % 4);
                let mut once = data.clone();
                quantize_rgb_in_place(&mut once, levels);
                let mut twice = once.clone();
                quantize_rgb_in_place(&mut twice, levels);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
