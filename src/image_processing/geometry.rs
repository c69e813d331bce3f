use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::geometric_transformations::{rotate, Interpolation};

use super::params::{ResizeParams, RotateParams};
use crate::error::{ProcessingError, ProcessingResult};

/// Largest output `resize` will allocate, in pixels
pub const MAX_OUTPUT_PIXELS: u64 = 1 << 26;

/// Output dimensions for a uniform scale, rounded and never below one pixel
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let scale_dim = |d: u32| ((d as f64 * scale).round().clamp(1.0, u32::MAX as f64)) as u32;
    (scale_dim(width), scale_dim(height))
}

/// Uniform resize with an area-averaging (box) filter
pub fn resize(img: &RgbImage, params: &ResizeParams) -> ProcessingResult<RgbImage> {
    let (src_width, src_height) = img.dimensions();
    let (width, height) = scaled_dimensions(src_width, src_height, params.scale);

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    let transform_err = |reason: String| ProcessingError::Transform {
        operation: "resize".to_string(),
        reason,
    };

    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_OUTPUT_PIXELS {
        return Err(transform_err(format!(
            "output of {}x{} exceeds the limit of {} pixels",
            width, height, MAX_OUTPUT_PIXELS
        )));
    }

    let src_image = Image::from_vec_u8(src_width, src_height, img.as_raw().clone(), PixelType::U8x3)
        .map_err(|e| transform_err(e.to_string()))?;
    let mut dst_image = Image::new(width, height, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| transform_err(e.to_string()))?;

    ImageBuffer::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| transform_err("resized buffer has unexpected length".to_string()))
}

/// Rotate about `(w / 2, h / 2)` on a canvas of the same size, black fill.
/// Positive angles turn the picture counter-clockwise.
pub fn rotate_about_center(img: &RgbImage, params: &RotateParams) -> RgbImage {
    let (width, height) = img.dimensions();
    let center = ((width / 2) as f32, (height / 2) as f32);
    let theta = -(params.angle.to_radians() as f32);
    rotate(img, center, theta, Interpolation::Bilinear, Rgb([0, 0, 0]))
}

/// Circle parameters used by [`mask_circle`]: center `(w / 2, h / 2)` and
/// radius `min(h, w) / 4`
pub fn circle_geometry(width: u32, height: u32) -> ((i32, i32), i32) {
    let radius = (width.min(height) / 4) as i32;
    (((width / 2) as i32, (height / 2) as i32), radius)
}

/// Keep only the pixels inside the centered circle; everything else is black
pub fn mask_circle(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let (center, radius) = circle_geometry(width, height);

    let mut mask: GrayImage = ImageBuffer::new(width, height);
    draw_filled_circle_mut(&mut mask, center, radius, Luma([255u8]));

    ImageBuffer::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y)[0] > 0 {
            *img.get_pixel(x, y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(scaled_dimensions(100, 50, 0.5), (50, 25));
        assert_eq!(scaled_dimensions(101, 51, 0.5), (51, 26));
        assert_eq!(scaled_dimensions(3, 3, 0.01), (1, 1));
        assert_eq!(scaled_dimensions(10, 20, 2.0), (20, 40));
    }

    #[test]
    fn test_resize_halves_image() {
        let img = create_test_image(100, 60);
        let resized = resize(&img, &ResizeParams { scale: 0.5 }).unwrap();
        assert_eq!(resized.dimensions(), (50, 30));
    }

    #[test]
    fn test_resize_identity_scale() {
        let img = create_test_image(40, 30);
        let resized = resize(&img, &ResizeParams { scale: 1.0 }).unwrap();
        assert_eq!(resized, img);
    }

    #[test]
    fn test_resize_rejects_oversized_output() {
        let img = create_test_image(64, 48);
        let err = resize(&img, &ResizeParams { scale: 100_000.0 }).unwrap_err();
        assert!(matches!(err, ProcessingError::Transform { ref operation, .. } if operation == "resize"));
        // Enlarging within the limit still works
        assert_eq!(resize(&img, &ResizeParams { scale: 4.0 }).unwrap().dimensions(), (256, 192));
    }

    #[test]
    fn test_rotate_keeps_canvas() {
        let img = create_test_image(64, 32);
        let rotated = rotate_about_center(&img, &RotateParams { angle: 90.0 });
        assert_eq!(rotated.dimensions(), (64, 32));
        // Corners of a wide image fall outside the rotated content
        assert_eq!(*rotated.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*rotated.get_pixel(63, 31), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let img = create_test_image(16, 16);
        let rotated = rotate_about_center(&img, &RotateParams { angle: 0.0 });
        assert_eq!(rotated.get_pixel(5, 7), img.get_pixel(5, 7));
    }

    #[test]
    fn test_circle_geometry() {
        assert_eq!(circle_geometry(200, 100), ((100, 50), 25));
        assert_eq!(circle_geometry(81, 121), ((40, 60), 20));
    }

    #[test]
    fn test_mask_circle_radius_and_center() {
        let img: RgbImage = ImageBuffer::from_pixel(200, 100, Rgb([200, 100, 50]));
        let masked = mask_circle(&img);
        let ((cx, cy), r) = circle_geometry(200, 100);
        let (cx, cy, r) = (cx as u32, cy as u32, r as u32);

        assert_eq!(*masked.get_pixel(cx, cy), Rgb([200, 100, 50]));
        assert_eq!(*masked.get_pixel(cx + r - 1, cy), Rgb([200, 100, 50]));
        assert_eq!(*masked.get_pixel(cx, cy - r + 1), Rgb([200, 100, 50]));
        assert_eq!(*masked.get_pixel(cx + r + 1, cy), Rgb([0, 0, 0]));
        assert_eq!(*masked.get_pixel(cx, cy + r + 1), Rgb([0, 0, 0]));
        assert_eq!(*masked.get_pixel(0, 0), Rgb([0, 0, 0]));
    }
}
