use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::cascade::{HaarCascade, IntegralImages};
use super::color::to_gray;
use super::params::FaceDetectParams;
use crate::error::{ProcessingError, ProcessingResult};

pub const CASCADE_FILE_NAME: &str = "haar_face.xml";

/// Neighbouring hits closer than this fraction of their size are merged
const GROUP_EPS: f64 = 0.2;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Pyramids deeper than this are refused; scale factors barely above 1 would
/// otherwise rescan the image thousands of times
pub const MAX_PYRAMID_LEVELS: u32 = 200;

/// Candidate cascade locations relative to the base directory, in lookup order
pub fn cascade_candidates(base_dir: &Path) -> Vec<PathBuf> {
    vec![
        base_dir.join("Leraning_opencv").join(CASCADE_FILE_NAME),
        base_dir.join(CASCADE_FILE_NAME),
    ]
}

/// First existing cascade file, or a missing-resource error listing every
/// path that was checked
pub fn locate_cascade(base_dir: &Path) -> ProcessingResult<PathBuf> {
    let candidates = cascade_candidates(base_dir);
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| ProcessingError::MissingResource {
            name: CASCADE_FILE_NAME.to_string(),
            searched: candidates,
        })
}

/// Axis-aligned detection in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Detection {
    fn right(&self) -> i32 {
        self.x + self.width
    }

    fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Number of pyramid levels whose scaled image still holds one window
pub fn pyramid_levels(width: u32, height: u32, window: (u32, u32), scale_factor: f64) -> u32 {
    let (win_w, win_h) = window;
    if win_w == 0 || win_h == 0 || width < win_w || height < win_h {
        return 0;
    }
    let ratio = (width as f64 / win_w as f64).min(height as f64 / win_h as f64);
    let levels = ratio.ln() / scale_factor.ln();
    if levels.is_finite() {
        levels.floor().min(u32::MAX as f64 - 1.0) as u32 + 1
    } else {
        u32::MAX
    }
}

/// Slide the cascade window over an image pyramid and return grouped hits
pub fn detect_multi_scale(
    cascade: &HaarCascade,
    gray: &GrayImage,
    params: &FaceDetectParams,
) -> ProcessingResult<Vec<Detection>> {
    let (width, height) = gray.dimensions();
    let (win_w, win_h) = (cascade.window_width, cascade.window_height);
    let levels = pyramid_levels(width, height, (win_w, win_h), params.scale_factor);
    if levels > MAX_PYRAMID_LEVELS {
        return Err(ProcessingError::Transform {
            operation: "face_detect".to_string(),
            reason: format!(
                "scaleFactor {} needs {} pyramid levels (limit {})",
                params.scale_factor, levels, MAX_PYRAMID_LEVELS
            ),
        });
    }
    let mut raw = Vec::new();

    let mut factor = 1.0f64;
    loop {
        let scaled_w = (width as f64 / factor).round() as u32;
        let scaled_h = (height as f64 / factor).round() as u32;
        if scaled_w < win_w || scaled_h < win_h {
            break;
        }

        let scaled = if factor == 1.0 {
            gray.clone()
        } else {
            imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle)
        };
        let integrals = IntegralImages::new(&scaled);
        let step = if factor > 2.0 { 1 } else { 2 };

        let window_w = (win_w as f64 * factor).round() as i32;
        let window_h = (win_h as f64 * factor).round() as i32;

        for y in (0..=scaled_h - win_h).step_by(step) {
            for x in (0..=scaled_w - win_w).step_by(step) {
                if cascade.evaluate(&integrals, x, y) {
                    raw.push(Detection {
                        x: (x as f64 * factor).round() as i32,
                        y: (y as f64 * factor).round() as i32,
                        width: window_w,
                        height: window_h,
                    });
                }
            }
        }

        factor *= params.scale_factor;
    }

    debug!(raw = raw.len(), levels, "cascade window hits");
    Ok(group_rectangles(&raw, params.min_neighbors, GROUP_EPS))
}

fn similar(a: &Detection, b: &Detection, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

fn find_root(parents: &mut [usize], mut i: usize) -> usize {
    while parents[i] != i {
        parents[i] = parents[parents[i]];
        i = parents[i];
    }
    i
}

/// Cluster similar rectangles, average each cluster, keep clusters with more
/// than `group_threshold` members, then drop clusters nested inside a
/// stronger one. A threshold of zero returns the input untouched.
pub fn group_rectangles(rects: &[Detection], group_threshold: u32, eps: f64) -> Vec<Detection> {
    if group_threshold == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let n = rects.len();
    let mut parents: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find_root(&mut parents, i), find_root(&mut parents, j));
                if ri != rj {
                    parents[rj] = ri;
                }
            }
        }
    }

    // Label clusters in order of first appearance
    let mut labels = vec![usize::MAX; n];
    let mut cluster_of_root = std::collections::HashMap::new();
    for i in 0..n {
        let root = find_root(&mut parents, i);
        let next = cluster_of_root.len();
        labels[i] = *cluster_of_root.entry(root).or_insert(next);
    }
    let clusters = cluster_of_root.len();

    let mut sums = vec![[0i64; 4]; clusters];
    let mut counts = vec![0u32; clusters];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += rect.x as i64;
        s[1] += rect.y as i64;
        s[2] += rect.width as i64;
        s[3] += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Detection> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &count)| {
            let c = count as f64;
            Detection {
                x: (s[0] as f64 / c).round() as i32,
                y: (s[1] as f64 / c).round() as i32,
                width: (s[2] as f64 / c).round() as i32,
                height: (s[3] as f64 / c).round() as i32,
            }
        })
        .collect();

    let mut grouped = Vec::new();
    for i in 0..clusters {
        let n1 = counts[i];
        if n1 <= group_threshold {
            continue;
        }
        let r1 = averaged[i];

        let nested = (0..clusters).any(|j| {
            let n2 = counts[j];
            if j == i || n2 <= group_threshold {
                return false;
            }
            let r2 = averaged[j];
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !nested {
            grouped.push(r1);
        }
    }
    grouped
}

/// Outline each detection with a 2 pixel green rectangle
pub fn draw_detections(img: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut out = img.clone();
    for d in detections {
        if d.width <= 0 || d.height <= 0 {
            continue;
        }
        draw_hollow_rect_mut(&mut out, Rect::at(d.x, d.y).of_size(d.width as u32, d.height as u32), BOX_COLOR);
        if d.width > 2 && d.height > 2 {
            let inner = Rect::at(d.x + 1, d.y + 1).of_size(d.width as u32 - 2, d.height as u32 - 2);
            draw_hollow_rect_mut(&mut out, inner, BOX_COLOR);
        }
    }
    out
}

/// Locate and load the cascade under `base_dir`, detect, and annotate a copy
pub fn detect_faces(img: &RgbImage, params: &FaceDetectParams, base_dir: &Path) -> ProcessingResult<RgbImage> {
    let cascade_path = locate_cascade(base_dir)?;
    let cascade = HaarCascade::from_file(&cascade_path)?;
    debug!(path = %cascade_path.display(), stages = cascade.stages.len(), "loaded cascade");

    let detections = detect_multi_scale(&cascade, &to_gray(img), params)?;
    debug!(faces = detections.len(), "face detection finished");
    Ok(draw_detections(img, &detections))
}
