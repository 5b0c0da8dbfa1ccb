use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;

/// Convert image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Binarise against a Gaussian-weighted local mean: a pixel is white when it is
/// brighter than the mean of its neighbourhood minus `offset`.
pub fn adaptive_threshold(img: &GrayImage, sigma: f32, offset: f32) -> GrayImage {
    let local_mean = apply_blur(img, sigma);
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as f32 - offset;
        let value = if pixel[0] as f32 > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Logical OR of same-sized binary maps.
pub fn combine_edges(maps: &[GrayImage]) -> Option<GrayImage> {
    let (first, rest) = maps.split_first()?;
    let mut combined = first.clone();
    for map in rest {
        for (out, value) in combined.iter_mut().zip(map.iter()) {
            *out |= *value;
        }
    }
    Some(combined)
}

/// Edge map used by the fallback detector: three Canny passes at different
/// sensitivities (the last one over an adaptive threshold), OR-combined and
/// closed with a 3x3 square to bridge small gaps.
pub fn product_edges(gray: &GrayImage) -> GrayImage {
    let strong = detect_edges(gray, 50.0, 150.0);
    let weak = detect_edges(gray, 30.0, 100.0);
    // block size 11 / C = 2 in the usual adaptive threshold terms
    let binary = adaptive_threshold(gray, 2.0, 2.0);
    let texture = detect_edges(&binary, 20.0, 80.0);

    let combined = combine_edges(&[strong, weak, texture])
        .unwrap_or_else(|| GrayImage::new(gray.width(), gray.height()));
    close(&combined, Norm::LInf, 1)
}
