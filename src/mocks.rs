use image::{DynamicImage, Rgba, RgbaImage};

use crate::errors::Result;
use crate::traits::{BackgroundRemover, SegmentationModel};

/// Deterministic segmentation double.
///
/// Keeps the top `foreground_fraction` of rows as opaque foreground and
/// masks the rest out (alpha 0, color zeroed), mirroring the binary masks
/// the production adapter produces. The resulting foreground ratio equals
/// the fraction, which the decision tests rely on.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub foreground_fraction: f64,
}

impl MockSegmentationModel {
    pub const fn opaque() -> Self {
        Self {
            foreground_fraction: 1.0,
        }
    }

    pub const fn with_foreground_fraction(foreground_fraction: f64) -> Self {
        Self {
            foreground_fraction,
        }
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
        Ok(mask_rows(image, self.foreground_fraction, true))
    }
}

/// Deterministic external-remover double.
///
/// Same row-based pattern as [`MockSegmentationModel`], but keeps the
/// original colors under transparent pixels the way a soft-matting remover
/// does.
#[derive(Debug, Clone)]
pub struct MockBackgroundRemover {
    pub foreground_fraction: f64,
}

impl MockBackgroundRemover {
    pub const fn opaque() -> Self {
        Self {
            foreground_fraction: 1.0,
        }
    }

    pub const fn with_foreground_fraction(foreground_fraction: f64) -> Self {
        Self {
            foreground_fraction,
        }
    }
}

impl BackgroundRemover for MockBackgroundRemover {
    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        Ok(mask_rows(image, self.foreground_fraction, false))
    }
}

fn mask_rows(image: &DynamicImage, fraction: f64, zero_background: bool) -> RgbaImage {
    let rgba = image.to_rgba8();
    let opaque_rows = (f64::from(rgba.height()) * fraction).round() as u32;

    RgbaImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, _]) = *rgba.get_pixel(x, y);
        if y < opaque_rows {
            Rgba([r, g, b, 255])
        } else if zero_background {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([r, g, b, 0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::foreground_ratio;
    use image::{Rgb, RgbImage};

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([120, 30, 200])))
    }

    #[test]
    fn opaque_mock_keeps_the_whole_canvas() {
        let result = MockSegmentationModel::opaque()
            .segment(&test_image())
            .unwrap();
        assert_eq!(foreground_ratio(&result).unwrap(), 1.0);
    }

    #[test]
    fn fractional_mock_matches_its_foreground_ratio() {
        let result = MockSegmentationModel::with_foreground_fraction(0.3)
            .segment(&test_image())
            .unwrap();
        assert_eq!(foreground_ratio(&result).unwrap(), 0.3);
    }

    #[test]
    fn remover_mock_keeps_colors_under_transparency() {
        let result = MockBackgroundRemover::with_foreground_fraction(0.5)
            .remove(&test_image())
            .unwrap();
        assert_eq!(*result.get_pixel(0, 9), Rgba([120, 30, 200, 0]));
        assert_eq!(*result.get_pixel(0, 0), Rgba([120, 30, 200, 255]));
    }
}
