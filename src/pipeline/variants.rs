//! Variant generation: derive several distinct renderings of one page.
//!
//! A single rendering plays to a single set of engine weaknesses — a faint
//! scan loses thin strokes, a high-contrast one fuses adjacent glyphs. The
//! hedge is to hand the engine several visually distinct versions of the
//! same page and let the consensus vote sort out the disagreements.
//!
//! The recipe list is fixed and versioned: recipes always run in
//! declaration order, because recipe order is the deterministic tie-break
//! for the vote downstream. A recipe that fails (degenerate input, zero
//! dimensions) yields no variant and a warning, never an abort — the other
//! recipes still run, each on its own copy of the bitmap.
//!
//! ## Why spawn_blocking?
//!
//! The transforms are pure CPU work over full-page bitmaps. Running them on
//! the async workers would stall the engine calls of other pages;
//! `tokio::task::spawn_blocking` moves them onto the blocking pool, the
//! same way rasterisation is handled in comparable pipelines.

use crate::config::VariantSet;
use crate::engine::RecognitionHint;
use crate::error::{RestoreError, VariantError};
use image::{DynamicImage, GrayImage};
use tracing::{debug, warn};

/// The fixed preprocessing recipes, in the order they always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RecipeKind {
    /// Mild contrast/sharpness boost; the baseline rendering.
    Traditional,
    /// Aggressive contrast to separate similar glyph shapes (m vs v).
    HighContrast,
    /// Windowed-mean binarisation; robust to uneven background.
    AdaptiveThreshold,
    /// Lanczos upscale for small-glyph pages.
    Upscaled,
    /// Blur-then-sharpen pass to suppress speckle noise.
    Denoised,
    /// Histogram equalization for washed-out scans.
    Equalized,
    /// Binarise then close gaps inside character strokes.
    Morphological,
}

impl RecipeKind {
    /// Stable tag used in logs, errors, and candidate bookkeeping.
    pub fn tag(&self) -> &'static str {
        match self {
            RecipeKind::Traditional => "traditional",
            RecipeKind::HighContrast => "high-contrast",
            RecipeKind::AdaptiveThreshold => "adaptive-threshold",
            RecipeKind::Upscaled => "upscaled",
            RecipeKind::Denoised => "denoised",
            RecipeKind::Equalized => "equalized",
            RecipeKind::Morphological => "morphological",
        }
    }

    /// The layout hint paired with this recipe's rendering.
    pub fn hint(&self) -> RecognitionHint {
        match self {
            RecipeKind::Traditional => RecognitionHint::SingleColumn,
            RecipeKind::HighContrast => RecognitionHint::UniformBlock,
            RecipeKind::AdaptiveThreshold => RecognitionHint::UniformBlock,
            RecipeKind::Upscaled => RecognitionHint::AutoPage,
            RecipeKind::Denoised => RecognitionHint::SparseText,
            RecipeKind::Equalized => RecognitionHint::SingleColumn,
            RecipeKind::Morphological => RecognitionHint::UniformBlock,
        }
    }
}

/// Recipes for a variant set, in canonical order.
pub fn recipes_for(set: VariantSet) -> &'static [RecipeKind] {
    const FAST: &[RecipeKind] = &[
        RecipeKind::Traditional,
        RecipeKind::HighContrast,
        RecipeKind::AdaptiveThreshold,
    ];
    const THOROUGH: &[RecipeKind] = &[
        RecipeKind::Traditional,
        RecipeKind::HighContrast,
        RecipeKind::AdaptiveThreshold,
        RecipeKind::Upscaled,
        RecipeKind::Denoised,
        RecipeKind::Equalized,
        RecipeKind::Morphological,
    ];
    match set {
        VariantSet::Fast => FAST,
        VariantSet::Thorough => THOROUGH,
    }
}

/// One preprocessed rendering of a page, owning its own bitmap.
pub struct Variant {
    pub recipe: RecipeKind,
    pub image: GrayImage,
}

/// Generate all variants for one page on the blocking pool.
///
/// Returns the variants that succeeded (in recipe order) and the errors
/// for the recipes that did not.
pub async fn generate_variants(
    page: DynamicImage,
    set: VariantSet,
    dpi: u32,
) -> Result<(Vec<Variant>, Vec<VariantError>), RestoreError> {
    tokio::task::spawn_blocking(move || generate_blocking(&page, set, dpi))
        .await
        .map_err(|e| RestoreError::Internal(format!("variant task panicked: {e}")))
}

/// Blocking implementation of variant generation.
fn generate_blocking(
    page: &DynamicImage,
    set: VariantSet,
    dpi: u32,
) -> (Vec<Variant>, Vec<VariantError>) {
    let mut variants = Vec::new();
    let mut errors = Vec::new();

    for &recipe in recipes_for(set) {
        match apply_recipe(recipe, page, dpi) {
            Ok(image) => {
                debug!(
                    recipe = recipe.tag(),
                    width = image.width(),
                    height = image.height(),
                    "variant ready"
                );
                variants.push(Variant { recipe, image });
            }
            Err(e) => {
                warn!(recipe = recipe.tag(), error = %e, "recipe failed, skipping variant");
                errors.push(e);
            }
        }
    }

    (variants, errors)
}

/// Apply one recipe to a fresh copy of the page bitmap.
fn apply_recipe(
    recipe: RecipeKind,
    page: &DynamicImage,
    dpi: u32,
) -> Result<GrayImage, VariantError> {
    if page.width() == 0 || page.height() == 0 {
        return Err(VariantError::Preprocess {
            recipe: recipe.tag().into(),
            detail: format!("degenerate page bitmap {}x{}", page.width(), page.height()),
        });
    }

    let gray = page.grayscale();

    let out = match recipe {
        RecipeKind::Traditional => gray
            .adjust_contrast(30.0)
            .brighten(8)
            .unsharpen(1.5, 2)
            .to_luma8(),
        RecipeKind::HighContrast => gray.adjust_contrast(80.0).unsharpen(2.0, 2).to_luma8(),
        RecipeKind::AdaptiveThreshold => {
            adaptive_threshold(&gray.to_luma8(), threshold_window(dpi), 2)
        }
        RecipeKind::Upscaled => {
            // Low-resolution scans gain the most from resampling; high-DPI
            // input only needs a nudge.
            let factor = if dpi < 300 { 2.0 } else { 1.2 };
            let (w, h) = (page.width(), page.height());
            gray.resize(
                (w as f32 * factor) as u32,
                (h as f32 * factor) as u32,
                image::imageops::FilterType::Lanczos3,
            )
            .adjust_contrast(30.0)
            .to_luma8()
        }
        RecipeKind::Denoised => gray.blur(1.0).unsharpen(1.5, 2).to_luma8(),
        RecipeKind::Equalized => equalize_histogram(&gray.to_luma8()),
        RecipeKind::Morphological => {
            let binary = adaptive_threshold(&gray.to_luma8(), threshold_window(dpi), 2);
            morphological_close(&binary)
        }
    };

    Ok(out)
}

/// Odd window edge for the threshold mean, scaled with input resolution.
fn threshold_window(dpi: u32) -> u32 {
    let w = (dpi / 30).max(11);
    if w % 2 == 0 {
        w + 1
    } else {
        w
    }
}

/// Windowed-mean adaptive threshold over an integral image.
///
/// A pixel goes black when it is darker than its neighbourhood mean minus
/// a small constant; everything else goes white. Handles pages with uneven
/// background illumination that a global threshold would destroy.
fn adaptive_threshold(img: &GrayImage, window: u32, c: i32) -> GrayImage {
    let (width, height) = img.dimensions();
    let w = width as usize;
    let h = height as usize;
    let half = (window / 2) as i64;

    // Integral image with a zero row/column border.
    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * (w + 1) + (x + 1)] = integral[y * (w + 1) + (x + 1)] + row_sum;
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let x0 = (x - half).max(0) as usize;
            let y0 = (y - half).max(0) as usize;
            let x1 = ((x + half).min(w as i64 - 1) + 1) as usize;
            let y1 = ((y + half).min(h as i64 - 1) + 1) as usize;
            let area = ((x1 - x0) * (y1 - y0)) as u64;

            let sum = integral[y1 * (w + 1) + x1] + integral[y0 * (w + 1) + x0]
                - integral[y0 * (w + 1) + x1]
                - integral[y1 * (w + 1) + x0];
            let mean = (sum / area) as i32;
            let pixel = img.get_pixel(x as u32, y as u32)[0] as i32;

            let value = if pixel < mean - c { 0u8 } else { 255u8 };
            out.put_pixel(x as u32, y as u32, image::Luma([value]));
        }
    }
    out
}

/// Classic histogram equalization: stretch the cumulative distribution so
/// washed-out scans use the full luminance range.
fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let total = (width as u64) * (height as u64);
    if total == 0 {
        return img.clone();
    }

    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (i, count) in histogram.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }
    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = total.saturating_sub(cdf_min).max(1);

    let mut lut = [0u8; 256];
    for i in 0..256 {
        let scaled = ((cdf[i].saturating_sub(cdf_min)) * 255 / denom) as u8;
        lut[i] = scaled;
    }

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    out
}

/// Close gaps inside dark strokes: grow dark regions one step, then shrink
/// them back. Reconnects characters the binarisation broke apart.
fn morphological_close(img: &GrayImage) -> GrayImage {
    let grown = morph_3x3(img, |a, b| a.min(b));
    morph_3x3(&grown, |a, b| a.max(b))
}

/// 3×3 neighbourhood fold with the given reducer (min = grow dark,
/// max = shrink dark).
fn morph_3x3(img: &GrayImage, fold: fn(u8, u8) -> u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = img.get_pixel(x, y)[0];
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64 {
                        acc = fold(acc, img.get_pixel(nx as u32, ny as u32)[0]);
                    }
                }
            }
            out.put_pixel(x, y, image::Luma([acc]));
        }
    }
    out
}
