use image::{DynamicImage, Rgba, RgbaImage};

/// Replaces fully transparent pixels with opaque white.
///
/// Only pixels whose alpha is exactly 0 are touched; partially transparent
/// edge pixels keep their original color and alpha. Idempotent.
pub fn flatten_rgba(image: &RgbaImage) -> RgbaImage {
    let mut flattened = image.clone();
    for pixel in flattened.pixels_mut() {
        if pixel.0[3] == 0 {
            *pixel = Rgba([255, 255, 255, 255]);
        }
    }
    flattened
}

/// [`flatten_rgba`] lifted to `DynamicImage`: inputs without an alpha
/// channel pass through unchanged.
pub fn flatten_to_white(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(flatten_rgba(&image.to_rgba8()))
    } else {
        image.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn transparent_pixels_become_opaque_white() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        image.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        image.put_pixel(3, 3, Rgba([99, 99, 99, 0]));

        let flattened = flatten_rgba(&image);
        assert_eq!(*flattened.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*flattened.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
        assert!(flattened.pixels().all(|p| p.0[3] != 0));
    }

    #[test]
    fn partially_transparent_pixels_are_untouched() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        image.put_pixel(1, 1, Rgba([10, 20, 30, 128]));

        let flattened = flatten_rgba(&image);
        assert_eq!(*flattened.get_pixel(1, 1), Rgba([10, 20, 30, 128]));
    }

    #[test]
    fn opaque_pixels_keep_their_color() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        assert_eq!(flatten_rgba(&image), image);
    }

    #[test]
    fn flatten_is_idempotent() {
        let mut image = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        image.put_pixel(2, 2, Rgba([0, 0, 0, 0]));
        image.put_pixel(5, 5, Rgba([7, 7, 7, 64]));

        let once = flatten_rgba(&image);
        let twice = flatten_rgba(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn images_without_alpha_pass_through() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let flattened = flatten_to_white(&image);
        assert_eq!(flattened.color(), image.color());
        assert_eq!(flattened.as_bytes(), image.as_bytes());
    }
}
