// src/engine/search.rs
//
// Size-targeting search. Linear descent only: quality decreasing for lossy
// formats, scale then channel levels decreasing for PNG. First candidate at
// or under the target wins; when the ladder runs out, the smallest candidate
// seen is the fallback. Encoders are injected so tests can count calls.

use crate::engine::pipeline::{channel_levels, downscale, quantize_rgb_in_place};
use crate::engine::PNG_SMALL_TARGET_BYTES;
use crate::error::{Result, SlimImageError};
use crate::presets::Preset;
use image::{DynamicImage, RgbaImage};
use std::borrow::Cow;

/// Scale-factor ladders for the PNG downscale phase, by target bucket.
const SCALE_STEPS_SMALL_TARGET: &[f64] = &[0.70, 0.50, 0.35, 0.25];
const SCALE_STEPS_LARGE_TARGET: &[f64] = &[0.85, 0.70, 0.55, 0.40];

/// Lossy (JPEG / WebP) strategy.
///
/// Without a target this is a single encode at `initial_quality` - the
/// caller asked for nothing smaller, so no quality is sacrificed. With a
/// target, quality steps down linearly from `initial_quality` to
/// `min_quality`, at most `max_iterations` re-encodes, and the FIRST
/// candidate at or under the target is returned: the highest quality that
/// fits the budget, not the smallest file.
pub fn compress_lossy<E>(
    img: &DynamicImage,
    preset: &Preset,
    target_bytes: Option<u64>,
    encode: E,
) -> Result<Vec<u8>>
where
    E: Fn(&DynamicImage, f32) -> Result<Vec<u8>>,
{
    let mut quality = preset.initial_quality;
    let first = encode(img, quality)?;

    let Some(target) = target_bytes else {
        return Ok(first);
    };
    if first.len() as u64 <= target {
        return Ok(first);
    }

    let mut best = first;
    for _ in 0..preset.max_iterations {
        let floored = quality <= preset.min_quality;
        if floored {
            break;
        }
        quality = (quality - preset.quality_step).max(preset.min_quality);

        let candidate = encode(img, quality)?;
        if candidate.len() as u64 <= target {
            return Ok(candidate);
        }
        if candidate.len() < best.len() {
            best = candidate;
        }
    }

    Ok(best)
}

/// PNG strategy: lossless first, then a two-phase reduction ladder.
///
/// Phase 1 re-encodes losslessly at descending scale factors, keeping the
/// smallest candidate and the bitmap that produced it. Phase 2, the last
/// resort, quantizes the RGB channels of the best-scaled bitmap to a
/// descending list of per-channel levels (alpha untouched). Both phases
/// short-circuit the moment a candidate meets the target; if none ever
/// does, the smallest candidate observed anywhere is returned.
pub fn compress_png<E>(
    img: &DynamicImage,
    preset: &Preset,
    target_bytes: Option<u64>,
    encode: E,
) -> Result<Vec<u8>>
where
    E: Fn(&DynamicImage) -> Result<Vec<u8>>,
{
    let lossless = encode(img)?;

    let Some(target) = target_bytes else {
        return Ok(lossless);
    };
    if lossless.len() as u64 <= target {
        return Ok(lossless);
    }

    let small_target = target <= PNG_SMALL_TARGET_BYTES;
    let scale_steps = if small_target {
        SCALE_STEPS_SMALL_TARGET
    } else {
        SCALE_STEPS_LARGE_TARGET
    };

    // Phase 1: downscale ladder. Track both the smallest encode and the
    // canvas it came from; the quantization phase works on that canvas.
    let mut best = lossless;
    let mut best_canvas: Cow<'_, DynamicImage> = Cow::Borrowed(img);

    for &factor in scale_steps {
        let width = ((img.width() as f64 * factor).round() as u32).max(1);
        let height = ((img.height() as f64 * factor).round() as u32).max(1);

        let scaled = downscale(img, width, height)?;
        let candidate = encode(&scaled)?;
        if candidate.len() as u64 <= target {
            return Ok(candidate);
        }
        if candidate.len() < best.len() {
            best = candidate;
            best_canvas = Cow::Owned(scaled);
        }
    }

    // Phase 2: uniform RGB quantization on the best-scaled canvas.
    let source = best_canvas.to_rgba8();
    let (width, height) = source.dimensions();

    for levels in quantization_levels(preset, small_target) {
        // Always quantize a fresh copy of the scaled pixels, never the
        // previous pass's output.
        let mut pixels = source.as_raw().clone();
        quantize_rgb_in_place(&mut pixels, levels);

        let quantized = RgbaImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| {
                SlimImageError::internal_panic("quantized buffer has unexpected length")
            })?;

        let candidate = encode(&quantized)?;
        if candidate.len() as u64 <= target {
            return Ok(candidate);
        }
        if candidate.len() < best.len() {
            best = candidate;
        }
    }

    Ok(best)
}

/// Descending per-channel level candidates derived from the preset's color
/// counts. Small targets extend the list down to 3 and 2 levels.
fn quantization_levels(preset: &Preset, small_target: bool) -> Vec<u8> {
    let mut levels = Vec::new();
    let mut colors = preset.png_max_colors;

    loop {
        let level = channel_levels(colors);
        if levels.last() != Some(&level) {
            levels.push(level);
        }
        if colors == preset.png_min_colors {
            break;
        }
        colors = colors
            .saturating_sub(preset.png_color_step)
            .max(preset.png_min_colors);
    }

    if small_target {
        for extra in [3u8, 2] {
            if levels.last().is_some_and(|&last| last > extra) {
                levels.push(extra);
            }
        }
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::PresetId;
    use image::{Rgb, RgbImage};
    use std::cell::Cell;

    fn canvas(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 99])
        }))
    }

    /// Fake lossy encoder: output size is a linear function of quality, and
    /// every call is counted.
    fn sized_lossy<'a>(
        calls: &'a Cell<u32>,
        bytes_per_quality_point: usize,
    ) -> impl Fn(&DynamicImage, f32) -> Result<Vec<u8>> + 'a {
        move |_, quality| {
            calls.set(calls.get() + 1);
            let len = (quality as f64 * 100.0 * bytes_per_quality_point as f64).round() as usize;
            Ok(vec![0u8; len.max(1)])
        }
    }

    mod lossy_tests {
        use super::*;

        #[test]
        fn no_target_means_exactly_one_encode() {
            let calls = Cell::new(0);
            let preset = PresetId::Balanced.preset();
            let out = compress_lossy(&canvas(8, 8), preset, None, sized_lossy(&calls, 100))
                .unwrap();
            assert_eq!(calls.get(), 1);
            // Single pass happened at initial_quality (0.74 → 7400 bytes)
            assert_eq!(out.len(), 7400);
        }

        #[test]
        fn initial_encode_meeting_target_short_circuits() {
            let calls = Cell::new(0);
            let preset = PresetId::Balanced.preset();
            let out =
                compress_lossy(&canvas(8, 8), preset, Some(8000), sized_lossy(&calls, 100))
                    .unwrap();
            assert_eq!(calls.get(), 1);
            assert_eq!(out.len(), 7400);
        }

        #[test]
        fn first_passing_candidate_wins_over_smaller_later_one() {
            // Policy: the FIRST candidate under target is returned, i.e. the
            // highest quality that fits the budget - not the smallest file
            // reachable by walking further down.
            let calls = Cell::new(0);
            let preset = PresetId::Balanced.preset();
            // initial 0.74 → 7400; step 0.06 → 0.68 → 6800 ≤ 7000: stop there.
            let out =
                compress_lossy(&canvas(8, 8), preset, Some(7000), sized_lossy(&calls, 100))
                    .unwrap();
            assert_eq!(calls.get(), 2);
            assert_eq!(out.len(), 6800);
        }

        #[test]
        fn unreachable_target_returns_smallest_and_respects_iteration_cap() {
            let calls = Cell::new(0);
            let preset = PresetId::Balanced.preset();
            // Target of 1 byte is unreachable; descent runs the quality range
            // down to min_quality (0.55) and falls back to the smallest.
            let out = compress_lossy(&canvas(8, 8), preset, Some(1), sized_lossy(&calls, 100))
                .unwrap();
            assert!(calls.get() <= preset.max_iterations + 1);
            // balanced: 0.74 → .68 → .62 → .56 → .55 (floor), 5 total encodes
            assert_eq!(calls.get(), 5);
            assert_eq!(out.len(), 5500);
        }

        #[test]
        fn quality_never_descends_below_floor() {
            let seen = std::cell::RefCell::new(Vec::new());
            let preset = PresetId::Max.preset();
            let encode = |_: &DynamicImage, quality: f32| {
                seen.borrow_mut().push(quality);
                Ok(vec![0u8; 1000])
            };
            compress_lossy(&canvas(8, 8), preset, Some(1), encode).unwrap();
            for quality in seen.borrow().iter() {
                assert!(*quality >= preset.min_quality - f32::EPSILON);
            }
        }

        #[test]
        fn iteration_cap_binds_before_quality_floor() {
            let calls = Cell::new(0);
            let preset = PresetId::Fast.preset();
            // fast: max_iterations 2, range 0.82..0.72 with step 0.07 would
            // allow more steps than the cap.
            compress_lossy(&canvas(8, 8), preset, Some(1), sized_lossy(&calls, 100)).unwrap();
            assert_eq!(calls.get(), preset.max_iterations + 1);
        }

        #[test]
        fn encode_error_propagates() {
            let preset = PresetId::Balanced.preset();
            let result = compress_lossy(&canvas(8, 8), preset, None, |_, _| {
                Err(SlimImageError::encode_failed("jpeg", "boom"))
            });
            assert!(result.is_err());
        }
    }

    mod png_tests {
        use super::*;

        /// Fake PNG encoder: output size proportional to pixel count, shrunk
        /// further for quantized (low distinct color) inputs.
        fn sized_png<'a>(calls: &'a Cell<u32>) -> impl Fn(&DynamicImage) -> Result<Vec<u8>> + 'a {
            move |img| {
                calls.set(calls.get() + 1);
                let rgba = img.to_rgba8();
                let mut distinct = std::collections::BTreeSet::new();
                for px in rgba.pixels() {
                    distinct.insert([px.0[0], px.0[1], px.0[2]]);
                }
                let pixels = (img.width() * img.height()) as usize;
                let len = pixels * distinct.len().min(64) / 16;
                Ok(vec![0u8; len.max(1)])
            }
        }

        #[test]
        fn no_target_is_single_lossless_encode() {
            let calls = Cell::new(0);
            let preset = PresetId::Balanced.preset();
            compress_png(&canvas(32, 32), preset, None, sized_png(&calls)).unwrap();
            assert_eq!(calls.get(), 1);
        }

        #[test]
        fn lossless_meeting_target_short_circuits() {
            let calls = Cell::new(0);
            let preset = PresetId::Max.preset();
            compress_png(&canvas(32, 32), preset, Some(10_000_000), sized_png(&calls)).unwrap();
            assert_eq!(calls.get(), 1);
        }

        #[test]
        fn scale_ladder_stops_at_first_passing_scale() {
            let preset = PresetId::Max.preset();
            let sizes = std::cell::RefCell::new(Vec::new());
            // Encoder size = 40 bytes per pixel; target 250000 sits in the
            // large bucket and is met at the second rung.
            let img = canvas(100, 100);
            let encode = |i: &DynamicImage| {
                let len = (i.width() * i.height()) as usize * 40;
                sizes.borrow_mut().push(len);
                Ok(vec![0u8; len])
            };
            let out = compress_png(&img, preset, Some(250_000), encode).unwrap();
            // 100x100 → 400000 fails; 85x85 → 289000 fails; 70x70 → 196000 passes
            assert_eq!(out.len(), 196_000);
            // lossless + two ladder rungs, never reaches the quantization phase
            assert_eq!(sizes.borrow().len(), 3);
        }

        #[test]
        fn quantization_is_the_last_resort() {
            let calls = Cell::new(0);
            let preset = PresetId::Max.preset();
            // Unreachable target forces both phases to run dry.
            compress_png(&canvas(64, 64), preset, Some(1), sized_png(&calls)).unwrap();
            let small_bucket = true;
            let ladder = SCALE_STEPS_SMALL_TARGET.len() as u32;
            let levels = quantization_levels(preset, small_bucket).len() as u32;
            assert_eq!(calls.get(), 1 + ladder + levels);
        }

        #[test]
        fn unreachable_target_returns_smallest_candidate() {
            let preset = PresetId::Max.preset();
            let out = compress_png(&canvas(64, 64), preset, Some(1), |img| {
                // Strictly decreasing with pixel count; quantized repeats of
                // the same canvas return the same size.
                Ok(vec![0u8; (img.width() * img.height()) as usize])
            })
            .unwrap();
            // Smallest scale rung of the small-target ladder is 0.25 → 16x16
            assert_eq!(out.len(), 256);
        }

        #[test]
        fn target_bucket_selects_ladder() {
            let preset = PresetId::Balanced.preset();
            let seen_dims = std::cell::RefCell::new(Vec::new());
            let encode = |img: &DynamicImage| {
                seen_dims.borrow_mut().push(img.width());
                Ok(vec![0u8; 1_000_000])
            };
            compress_png(&canvas(100, 100), preset, Some(200 * 1024), encode).unwrap();
            let dims = seen_dims.borrow();
            // Large bucket: 0.85, 0.70, 0.55, 0.40 of 100px
            assert_eq!(&dims[1..5], &[85, 70, 55, 40]);
        }

        #[test]
        fn quantization_levels_descend_from_preset_colors() {
            let balanced = PresetId::Balanced.preset();
            // 128..64 step 16 → cbrt {128:5,112:5,96:5,80:4,64:4} → [5,4]
            assert_eq!(quantization_levels(balanced, false), vec![5, 4]);
            assert_eq!(quantization_levels(balanced, true), vec![5, 4, 3, 2]);

            let max = PresetId::Max.preset();
            // 64..16 step 16 → {64:4,48:4,32:3,16:3} → [4,3]
            assert_eq!(quantization_levels(max, false), vec![4, 3]);
            assert_eq!(quantization_levels(max, true), vec![4, 3, 2]);
        }
    }
}
