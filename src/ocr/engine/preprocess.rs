use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

/// Neighbourhood size of the adaptive threshold, in pixels.
const ADAPTIVE_BLOCK_SIZE: u32 = 25;
/// Subtracted from the local Gaussian mean before comparing.
const ADAPTIVE_OFFSET: f32 = 10.0;

/// Grayscale, bound the largest side to `max_dimension`, then binarize with a
/// Gaussian adaptive threshold.
pub fn preprocess(image: &DynamicImage, max_dimension: u32) -> GrayImage {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let (target_w, target_h) = bounded_size(width, height, max_dimension);
    let resized = if (target_w, target_h) != (width, height) {
        image::imageops::resize(&gray, target_w, target_h, FilterType::Lanczos3)
    } else {
        gray
    };
    adaptive_threshold(&resized, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET)
}

/// Size after aspect-preserving downscaling so the larger side equals
/// `max_dimension`. Images already within bounds are returned unchanged.
pub fn bounded_size(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let largest = width.max(height);
    if max_dimension == 0 || largest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / largest as f64;
    let shrink = |side: u32| ((side as f64 * scale) as u32).clamp(1, max_dimension);
    if width >= height {
        (max_dimension, shrink(height))
    } else {
        (shrink(width), max_dimension)
    }
}

fn gaussian_sigma(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn adaptive_threshold(image: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let local_mean = image::imageops::blur(image, gaussian_sigma(block_size));
    let mut output = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let mean = local_mean.get_pixel(x, y)[0] as f32;
        let value = if pixel[0] as f32 > mean - offset { 255 } else { 0 };
        output.put_pixel(x, y, Luma([value]));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])))
    }

    #[test]
    fn small_images_keep_their_size() {
        let out = preprocess(&solid(640, 480, 200), 1600);
        assert_eq!(out.dimensions(), (640, 480));
        assert_eq!(bounded_size(1600, 900, 1600), (1600, 900));
    }

    #[test]
    fn large_images_are_bounded_to_max_dimension() {
        let out = preprocess(&solid(3200, 2400, 200), 1600);
        assert_eq!(out.dimensions(), (1600, 1200));
    }

    #[test]
    fn bounded_size_preserves_aspect_ratio() {
        for (w, h) in [(3000u32, 1999u32), (1999, 3000), (5000, 37), (4096, 4096), (1601, 1)] {
            let (bw, bh) = bounded_size(w, h, 1600);
            assert_eq!(bw.max(bh), 1600, "{}x{}", w, h);
            // cross-multiplied ratios differ by less than one source pixel
            let drift = (bw as i64 * h as i64 - bh as i64 * w as i64).abs();
            assert!(drift < w.max(h) as i64, "{}x{} -> {}x{}", w, h, bw, bh);
        }
    }

    #[test]
    fn output_is_binary() {
        let mut rgb = RgbImage::from_pixel(60, 60, Rgb([210, 210, 210]));
        for y in 20..40 {
            for x in 20..40 {
                rgb.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let out = preprocess(&DynamicImage::ImageRgb8(rgb), 1600);
        assert!(out.pixels().all(|pixel| pixel[0] == 0 || pixel[0] == 255));
        assert_eq!(out.get_pixel(21, 30)[0], 0);
        assert_eq!(out.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn uniform_image_becomes_white() {
        let out = preprocess(&solid(32, 32, 90), 1600);
        assert!(out.pixels().all(|pixel| pixel[0] == 255));
    }
}
