use image::{GrayImage, RgbaImage};
use imageproc::edges::canny;

use crate::errors::{BgArbiterError, Result};

/// Canny thresholds used for the edge-similarity metric.
pub const CANNY_LOW_THRESHOLD: f32 = 100.0;
pub const CANNY_HIGH_THRESHOLD: f32 = 200.0;

const HISTOGRAM_BINS: usize = 256;

// SSIM stabilizing constants for 8-bit dynamic range (Wang et al., 2004).
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;
const SSIM_DYNAMIC_RANGE: f64 = 255.0;

/// Global-statistics structural similarity between two grayscale images.
///
/// Uses whole-image means, variances and covariance rather than a sliding
/// window; the comparator only consumes the scalar, so the windowed variant's
/// spatial map would be discarded anyway. Returns a value in `[-1, 1]`,
/// exactly `1.0` for identical inputs.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> Result<f64> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;

    let n = (a.width() as f64) * (a.height() as f64);
    if n == 0.0 {
        return Err(BgArbiterError::MetricComputation {
            metric: "ssim",
            reason: "empty image".to_string(),
        });
    }

    let c1 = (SSIM_K1 * SSIM_DYNAMIC_RANGE).powi(2);
    let c2 = (SSIM_K2 * SSIM_DYNAMIC_RANGE).powi(2);

    let mean_a = a.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| f64::from(v)).sum::<f64>() / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut covar = 0.0;
    for (&va, &vb) in a.iter().zip(b.iter()) {
        let da = f64::from(va) - mean_a;
        let db = f64::from(vb) - mean_b;
        var_a += da * da;
        var_b += db * db;
        covar += da * db;
    }
    var_a /= n;
    var_b /= n;
    covar /= n;

    let numerator = (2.0 * mean_a * mean_b + c1) * (2.0 * covar + c2);
    let denominator = (mean_a.powi(2) + mean_b.powi(2) + c1) * (var_a + var_b + c2);

    // c1 and c2 are strictly positive, so the denominator never vanishes.
    Ok(numerator / denominator)
}

/// Fraction of pixels with non-zero alpha, in `[0, 1]`.
///
/// Measures how much of the canvas the segmentation retained as foreground.
pub fn foreground_ratio(image: &RgbaImage) -> Result<f64> {
    let total = (image.width() as u64) * (image.height() as u64);
    if total == 0 {
        return Err(BgArbiterError::MetricComputation {
            metric: "foreground_ratio",
            reason: "empty image".to_string(),
        });
    }

    let foreground = image.pixels().filter(|pixel| pixel.0[3] != 0).count() as u64;
    Ok(foreground as f64 / total as f64)
}

/// Structural similarity between the Canny edge maps of two grayscale images.
pub fn edge_similarity(a: &GrayImage, b: &GrayImage) -> Result<f64> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;

    let edges_a = canny(a, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD);
    let edges_b = canny(b, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD);
    ssim(&edges_a, &edges_b)
}

/// Pearson correlation between the 256-bin first-channel histograms of two
/// images, in `[-1, 1]`.
///
/// A histogram with zero variance across bins (a perfectly uniform value
/// distribution) has no defined correlation; that degenerate case surfaces
/// as a metric error instead of a default score.
pub fn histogram_correlation(a: &RgbaImage, b: &RgbaImage) -> Result<f64> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;

    let hist_a = first_channel_histogram(a);
    let hist_b = first_channel_histogram(b);

    let n = HISTOGRAM_BINS as f64;
    let mean_a = hist_a.iter().sum::<f64>() / n;
    let mean_b = hist_b.iter().sum::<f64>() / n;

    let mut covar = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&ha, &hb) in hist_a.iter().zip(hist_b.iter()) {
        let da = ha - mean_a;
        let db = hb - mean_b;
        covar += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denominator = (var_a * var_b).sqrt();
    if denominator == 0.0 {
        return Err(BgArbiterError::MetricComputation {
            metric: "histogram_correlation",
            reason: "degenerate histogram with zero variance".to_string(),
        });
    }

    Ok(covar / denominator)
}

fn first_channel_histogram(image: &RgbaImage) -> [f64; HISTOGRAM_BINS] {
    let mut histogram = [0.0; HISTOGRAM_BINS];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1.0;
    }
    histogram
}

fn ensure_same_dimensions(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(BgArbiterError::DimensionMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    fn solid_gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    fn solid_rgba(width: u32, height: u32, pixel: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(pixel))
    }

    #[test]
    fn ssim_identical_images_is_one() {
        let a = solid_gray(16, 16, 100);
        let score = ssim(&a, &a).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ssim_opposite_images_is_near_zero() {
        let a = solid_gray(16, 16, 0);
        let b = solid_gray(16, 16, 255);
        let score = ssim(&a, &b).unwrap();
        assert!(score < 0.1, "got {score}");
    }

    #[test]
    fn ssim_rejects_dimension_mismatch() {
        let a = solid_gray(16, 16, 0);
        let b = solid_gray(8, 16, 0);
        assert!(matches!(
            ssim(&a, &b),
            Err(BgArbiterError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn foreground_ratio_all_opaque_is_one() {
        let image = solid_rgba(10, 10, [50, 60, 70, 255]);
        assert_eq!(foreground_ratio(&image).unwrap(), 1.0);
    }

    #[test]
    fn foreground_ratio_all_transparent_is_zero() {
        let image = solid_rgba(10, 10, [0, 0, 0, 0]);
        assert_eq!(foreground_ratio(&image).unwrap(), 0.0);
    }

    #[test]
    fn foreground_ratio_counts_partial_alpha_as_foreground() {
        let mut image = solid_rgba(10, 10, [0, 0, 0, 0]);
        for y in 0..5 {
            for x in 0..10 {
                image.put_pixel(x, y, Rgba([10, 20, 30, 128]));
            }
        }
        assert_eq!(foreground_ratio(&image).unwrap(), 0.5);
    }

    #[test]
    fn foreground_ratio_rejects_empty_image() {
        let image = RgbaImage::new(0, 0);
        assert!(matches!(
            foreground_ratio(&image),
            Err(BgArbiterError::MetricComputation { .. })
        ));
    }

    #[test]
    fn edge_similarity_identical_images_is_one() {
        let mut a = solid_gray(32, 32, 0);
        for y in 10..22 {
            for x in 10..22 {
                a.put_pixel(x, y, Luma([255]));
            }
        }
        let score = edge_similarity(&a, &a).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn histogram_correlation_identical_images_is_one() {
        let image = solid_rgba(16, 16, [120, 0, 0, 255]);
        let score = histogram_correlation(&image, &image).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn histogram_correlation_rejects_uniform_histogram() {
        // One pixel per possible first-channel value gives a perfectly flat
        // histogram with zero variance across bins.
        let mut image = RgbaImage::new(256, 1);
        for x in 0..256 {
            image.put_pixel(x, 0, Rgba([x as u8, 0, 0, 255]));
        }
        assert!(matches!(
            histogram_correlation(&image, &image),
            Err(BgArbiterError::MetricComputation { .. })
        ));
    }

    #[test]
    fn histogram_correlation_disjoint_values_is_low() {
        let a = solid_rgba(16, 16, [10, 0, 0, 255]);
        let b = solid_rgba(16, 16, [200, 0, 0, 255]);
        let score = histogram_correlation(&a, &b).unwrap();
        assert!(score < 0.5, "got {score}");
    }
}
