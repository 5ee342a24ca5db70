use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

use crate::errors::{BgArbiterError, Result};

/// Mean-saliency threshold below which a scene is considered to have no
/// clear subject. Fixed empirical constant.
pub const SALIENCY_THRESHOLD: f64 = 0.4;

/// Center-surround window radii, in pixels. Multiple scales so that both
/// fine texture boundaries and broader subject outlines register.
const SURROUND_RADII: [u32; 3] = [2, 4, 8];

/// Per-pixel saliency estimate in `[0, 1]`, higher meaning more likely part
/// of a salient foreground object.
pub type SaliencyMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Saliency gate for the comparator's fallback path.
///
/// Returns `true` when the mean of the saliency map is below
/// [`SALIENCY_THRESHOLD`], i.e. when the scene has no clear subject. The
/// polarity is deliberate and load-bearing: downstream, a `true` gate
/// combined with a near-empty segmentation foreground selects the untouched
/// original instead of either removal candidate. Callers that cannot obtain
/// a gate result (estimator failure) should treat it as `false`.
pub fn needs_background_removal(image: &DynamicImage) -> Result<bool> {
    let map = saliency_map(&image.to_luma8())?;
    let n = (map.width() as f64) * (map.height() as f64);
    let score = map.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    Ok(gate(score))
}

/// The gate condition itself, kept verbatim: strictly below the threshold
/// means "no clear subject". A mean of exactly 0.4 does not gate.
fn gate(score: f64) -> bool {
    score < SALIENCY_THRESHOLD
}

/// Fine-grained static saliency of a grayscale image.
///
/// Each pixel's saliency is its absolute contrast against integral-image
/// local means at the [`SURROUND_RADII`] scales, averaged across scales and
/// then min-max normalized into `[0, 1]`. A map with no contrast anywhere
/// normalizes to all zeros rather than dividing by a vanishing range.
pub fn saliency_map(gray: &GrayImage) -> Result<SaliencyMap> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(BgArbiterError::Saliency {
            reason: "empty image".to_string(),
        });
    }

    let integral = integral_image(gray);
    let mut values = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let center = f64::from(gray.get_pixel(x, y).0[0]);
            let mut contrast = 0.0;
            for &radius in &SURROUND_RADII {
                let surround = window_mean(&integral, width, height, x, y, radius);
                contrast += (center - surround).abs() / 255.0;
            }
            values.push((contrast / SURROUND_RADII.len() as f64) as f32);
        }
    }

    let max = values.iter().copied().fold(f32::MIN, f32::max);
    let min = values.iter().copied().fold(f32::MAX, f32::min);
    let range = max - min;
    if range > f32::EPSILON {
        for value in &mut values {
            *value = (*value - min) / range;
        }
    } else {
        values.fill(0.0);
    }

    SaliencyMap::from_raw(width, height, values).ok_or_else(|| BgArbiterError::Saliency {
        reason: "saliency buffer construction failed".to_string(),
    })
}

/// Summed-area table with a zero row and column prepended, so any window sum
/// is four lookups.
fn integral_image(gray: &GrayImage) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    let stride = width as usize + 1;
    let mut integral = vec![0.0; stride * (height as usize + 1)];

    for y in 0..height as usize {
        let mut row_sum = 0.0;
        for x in 0..width as usize {
            row_sum += f64::from(gray.as_raw()[y * width as usize + x]);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
    integral
}

/// Mean pixel value of the window centered at `(x, y)`, clamped to the
/// image borders.
fn window_mean(integral: &[f64], width: u32, height: u32, x: u32, y: u32, radius: u32) -> f64 {
    let x0 = x.saturating_sub(radius) as usize;
    let y0 = y.saturating_sub(radius) as usize;
    let x1 = (x + radius + 1).min(width) as usize;
    let y1 = (y + radius + 1).min(height) as usize;
    let stride = width as usize + 1;

    let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
        - integral[y0 * stride + x1]
        - integral[y1 * stride + x0];
    sum / ((x1 - x0) * (y1 - y0)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn flat_image_has_zero_saliency_everywhere() {
        let gray = GrayImage::from_pixel(32, 32, Luma([180]));
        let map = saliency_map(&gray).unwrap();
        assert!(map.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn map_values_stay_in_unit_range() {
        let mut gray = GrayImage::from_pixel(32, 32, Luma([0]));
        for y in 12..20 {
            for x in 12..20 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        let map = saliency_map(&gray).unwrap();
        assert!(map.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(map.iter().any(|&v| v == 1.0));
        assert!(map.iter().any(|&v| v == 0.0));
    }

    #[test]
    fn solid_image_gates_toward_no_subject() {
        // No contrast anywhere: mean saliency 0, below the threshold, so the
        // gate reports true (low saliency).
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(64, 64, Rgb([90, 90, 90])));
        assert!(needs_background_removal(&image).unwrap());
    }

    #[test]
    fn gate_is_strict_at_the_threshold() {
        assert!(gate(0.0));
        assert!(gate(SALIENCY_THRESHOLD - f64::EPSILON));
        assert!(!gate(SALIENCY_THRESHOLD));
        assert!(!gate(1.0));
    }

    #[test]
    fn empty_image_is_a_saliency_error() {
        let gray = GrayImage::new(0, 0);
        assert!(matches!(
            saliency_map(&gray),
            Err(BgArbiterError::Saliency { .. })
        ));
    }
}
