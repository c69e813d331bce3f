//! The single entry point that turns (input, operation, parameters) into an
//! output image on disk.

use image::{GrayImage, ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::color::{gray_to_rgb, invert, swap_red_blue, to_gray, to_hsv, to_lab};
use super::contours::draw_external_contours;
use super::face_detection::detect_faces;
use super::filters::{
    bilateral, binary_threshold, canny_edges, equalize, gaussian_blur, laplacian, sobel_magnitude,
};
use super::geometry::{mask_circle, resize, rotate_about_center};
use super::params::{Operation, RawParams};
use crate::error::{ProcessingError, ProcessingResult};

/// Result of one transform before it is written out
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Gray(GrayImage),
    Color(RgbImage),
}

impl Processed {
    /// Expand single-channel results to three channels for encoding
    pub fn into_rgb(self) -> RgbImage {
        match self {
            Processed::Gray(gray) => gray_to_rgb(&gray),
            Processed::Color(rgb) => rgb,
        }
    }
}

/// Load an image from disk as 8-bit RGB. The format is sniffed from the file
/// contents, so a wrong or missing extension still decodes.
pub fn load_image(path: &Path) -> ProcessingResult<RgbImage> {
    let load_err = |source: image::ImageError| ProcessingError::Load {
        path: path.to_path_buf(),
        source,
    };

    let img = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| load_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(load_err)?;
    Ok(img.to_rgb8())
}

/// Run one typed operation on an in-memory image.
///
/// `base_dir` is only consulted by operations that need external resources
/// (the face cascade).
pub fn run(img: &RgbImage, operation: &Operation, base_dir: &Path) -> ProcessingResult<Processed> {
    let processed = match operation {
        Operation::Grayscale => Processed::Gray(to_gray(img)),
        Operation::Blur(params) => Processed::Color(gaussian_blur(img, params)?),
        Operation::Canny(params) => Processed::Gray(canny_edges(&to_gray(img), params)),
        Operation::Threshold(params) => Processed::Gray(binary_threshold(&to_gray(img), params)),
        Operation::EqualizeHist => Processed::Gray(equalize(&to_gray(img))),
        Operation::ConvertHsv => Processed::Color(to_hsv(img)),
        Operation::ConvertLab => Processed::Color(to_lab(img)),
        Operation::SplitMerge => Processed::Color(swap_red_blue(img)),
        Operation::BitwiseNot => Processed::Color(invert(img)),
        Operation::Resize(params) => Processed::Color(resize(img, params)?),
        Operation::Rotate(params) => Processed::Color(rotate_about_center(img, params)),
        Operation::SmoothBilateral(params) => Processed::Color(bilateral(img, params)?),
        Operation::MaskCircle => Processed::Color(mask_circle(img)),
        Operation::Sobel => Processed::Gray(sobel_magnitude(&to_gray(img))),
        Operation::Laplacian => Processed::Gray(laplacian(&to_gray(img))),
        Operation::Contours => Processed::Color(draw_external_contours(img)),
        Operation::FaceDetect(params) => Processed::Color(detect_faces(img, params, base_dir)?),
    };
    Ok(processed)
}

/// Save an image, creating parent directories; the format follows the extension
pub fn save_image(img: &RgbImage, path: &Path) -> ProcessingResult<()> {
    let write_err = |reason: String| ProcessingError::Write {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    img.save(path).map_err(|e| write_err(e.to_string()))
}

/// Load `input`, apply the named operation, write the result to `output`.
///
/// Nothing is written unless the load, the name lookup and the transform
/// all succeed.
pub fn apply(
    input: &Path,
    output: &Path,
    operation_name: &str,
    params: &RawParams,
    base_dir: &Path,
) -> ProcessingResult<PathBuf> {
    let start = Instant::now();

    let img = load_image(input)?;
    let operation = Operation::parse(operation_name, params)?;
    debug!(?operation, "resolved operation parameters");

    let result = run(&img, &operation, base_dir)?.into_rgb();
    save_image(&result, output)?;

    info!(
        operation = %operation.kind(),
        input = %input.display(),
        output = %output.display(),
        width = result.width(),
        height = result.height(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "image processed"
    );
    Ok(output.to_path_buf())
}
