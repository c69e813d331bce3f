use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, laplacian_filter};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::map::map_colors;
use rayon::prelude::*;

use super::params::{BilateralParams, BlurParams, CannyParams, ThresholdParams};
use crate::error::{ProcessingError, ProcessingResult};

/// Largest Gaussian kernel side accepted once clamped to the image
pub const MAX_KERNEL_SIZE: u32 = 255;

/// Largest bilateral neighbourhood radius accepted once clamped to the image
pub const MAX_BILATERAL_RADIUS: i64 = 50;

fn too_large(operation: &str, reason: String) -> ProcessingError {
    ProcessingError::Transform {
        operation: operation.to_string(),
        reason,
    }
}

/// Gaussian blur of the color image with the sigma implied by the kernel size.
///
/// Differs from OpenCV's `GaussianBlur`: the kernel size only selects sigma,
/// and imageproc picks the kernel extent from sigma itself. A kernel wider
/// than twice the longest side is clamped to it first; anything still above
/// [`MAX_KERNEL_SIZE`] is rejected.
pub fn gaussian_blur(img: &RgbImage, params: &BlurParams) -> ProcessingResult<RgbImage> {
    let longest = img.width().max(img.height());
    let ksize = params.ksize.min(longest.saturating_mul(2).saturating_add(1));
    if ksize > MAX_KERNEL_SIZE {
        return Err(too_large(
            "blur",
            format!("kernel size {} exceeds the limit of {}", ksize, MAX_KERNEL_SIZE),
        ));
    }
    Ok(gaussian_blur_f32(img, BlurParams { ksize }.sigma()))
}

/// Canny edge map (0 or 255).
///
/// Differs from OpenCV's `Canny`: imageproc smooths the input with a
/// Gaussian (sigma 1.4) before taking gradients.
pub fn canny_edges(gray: &GrayImage, params: &CannyParams) -> GrayImage {
    let (low, high) = params.ordered();
    canny(gray, low, high)
}

/// Binary threshold: `maxval` where the pixel is strictly above `thresh`, else 0
pub fn binary_threshold(gray: &GrayImage, params: &ThresholdParams) -> GrayImage {
    let thresh = params.thresh;
    let maxval = params.maxval;
    map_colors(gray, |p| {
        if i32::from(p[0]) > thresh {
            Luma([maxval])
        } else {
            Luma([0u8])
        }
    })
}

pub fn equalize(gray: &GrayImage) -> GrayImage {
    equalize_histogram(gray)
}

/// Gradient magnitude from 3x3 Sobel derivatives, rounded and saturated to u8
pub fn sobel_magnitude(gray: &GrayImage) -> GrayImage {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let dx = f64::from(gx.get_pixel(x, y)[0]);
        let dy = f64::from(gy.get_pixel(x, y)[0]);
        Luma([saturate((dx * dx + dy * dy).sqrt())])
    })
}

/// Absolute response of the 4-neighbour Laplacian, saturated to u8
pub fn laplacian(gray: &GrayImage) -> GrayImage {
    let response = laplacian_filter(gray);
    map_colors(&response, |p| Luma([saturate(f64::from(p[0]).abs())]))
}

#[inline]
fn saturate(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Edge-preserving bilateral filter over RGB pixels.
///
/// The color distance between two pixels is the sum of absolute channel
/// differences. A non-positive diameter derives the radius from `sigma_space`.
/// The radius is clamped to the longest image side and rejected above
/// [`MAX_BILATERAL_RADIUS`].
pub fn bilateral(img: &RgbImage, params: &BilateralParams) -> ProcessingResult<RgbImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Ok(img.clone());
    }

    let sigma_color = if params.sigma_color <= 0 { 1.0 } else { params.sigma_color as f64 };
    let sigma_space = if params.sigma_space <= 0 { 1.0 } else { params.sigma_space as f64 };
    let radius = if params.diameter <= 0 {
        (sigma_space * 1.5).round() as i64
    } else {
        i64::from(params.diameter / 2)
    }
    .clamp(1, i64::from(width.max(height)));
    if radius > MAX_BILATERAL_RADIUS {
        return Err(too_large(
            "smooth_bilateral",
            format!("radius {} exceeds the limit of {}", radius, MAX_BILATERAL_RADIUS),
        ));
    }

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    // Circular neighbourhood with precomputed spatial weights
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f64;
            if dist2 <= (radius * radius) as f64 {
                offsets.push((dx, dy, (dist2 * space_coeff).exp()));
            }
        }
    }

    // Color weights indexed by the summed channel distance (0..=765)
    let color_weights: Vec<f64> = (0..=255 * 3)
        .map(|d| {
            let d = d as f64;
            (d * d * color_coeff).exp()
        })
        .collect();

    let stride = width as usize * 3;
    let mut out = vec![0u8; stride * height as usize];
    let max_x = i64::from(width) - 1;
    let max_y = i64::from(height) - 1;

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for x in 0..width as usize {
            let center = img.get_pixel(x as u32, y as u32);
            let mut sum = [0.0f64; 3];
            let mut weight_sum = 0.0f64;

            for &(dx, dy, space_weight) in &offsets {
                let sx = (x as i64 + dx).clamp(0, max_x) as u32;
                let sy = (y as i64 + dy).clamp(0, max_y) as u32;
                let neighbour = img.get_pixel(sx, sy);

                let distance: usize = (0..3)
                    .map(|c| (i32::from(neighbour[c]) - i32::from(center[c])).unsigned_abs() as usize)
                    .sum();
                let w = space_weight * color_weights[distance];

                for c in 0..3 {
                    sum[c] += w * f64::from(neighbour[c]);
                }
                weight_sum += w;
            }

            for c in 0..3 {
                row[x * 3 + c] = saturate(sum[c] / weight_sum);
            }
        }
    });

    // The buffer length always matches width * height * 3
    Ok(ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| img.clone()))
}
