use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_line_segment_mut;

use super::color::to_gray;
use super::filters::canny_edges;
use super::params::CannyParams;

const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outer borders that are not nested inside any other border
pub fn external_contours(edges: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
        .collect()
}

/// Draw a closed polyline with a 2 pixel stroke
pub fn draw_outline(img: &mut RgbImage, contour: &Contour<i32>, color: Rgb<u8>) {
    let points = &contour.points;
    if points.is_empty() {
        return;
    }

    for (i, start) in points.iter().enumerate() {
        let end = &points[(i + 1) % points.len()];
        for (ox, oy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            draw_line_segment_mut(
                img,
                (start.x as f32 + ox, start.y as f32 + oy),
                (end.x as f32 + ox, end.y as f32 + oy),
                color,
            );
        }
    }
}

/// Canny(100, 200) edges, external contours, outlines drawn in green on a copy
pub fn draw_external_contours(img: &RgbImage) -> RgbImage {
    let gray = to_gray(img);
    let edges = canny_edges(&gray, &CannyParams { threshold1: 100, threshold2: 200 });

    let mut out = img.clone();
    for contour in external_contours(&edges) {
        draw_outline(&mut out, &contour, OUTLINE_COLOR);
    }
    out
}
