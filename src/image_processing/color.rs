use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;

/// Luma with the BT.601 weights (0.299, 0.587, 0.114) in 14-bit fixed point
pub fn to_gray(img: &RgbImage) -> GrayImage {
    map_colors(img, |p| Luma([luma(p)]))
}

#[inline]
fn luma(p: Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    let y = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
    y.min(255) as u8
}

/// Expand a single-channel image to three identical channels
pub fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    map_colors(img, |p| Rgb([p[0], p[0], p[0]]))
}

/// Swap the red and blue channels
pub fn swap_red_blue(img: &RgbImage) -> RgbImage {
    map_colors(img, |p| Rgb([p[2], p[1], p[0]]))
}

/// Bitwise NOT of every channel
pub fn invert(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    image::imageops::invert(&mut out);
    out
}

/// 8-bit HSV (H in 0..180, S and V in 0..255).
///
/// The result keeps H, S, V in the first, second and third stored channel
/// slots read back-to-front, i.e. pixel = [V, S, H], so a saved file has the
/// same byte layout a BGR-ordered writer would produce.
pub fn to_hsv(img: &RgbImage) -> RgbImage {
    map_colors(img, |p| {
        let (h, s, v) = rgb_to_hsv8(p);
        Rgb([v, s, h])
    })
}

fn rgb_to_hsv8(p: Rgb<u8>) -> (u8, u8, u8) {
    let [r, g, b] = p.0.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    (
        (h / 2.0).round().clamp(0.0, 180.0) as u8,
        s.round().clamp(0.0, 255.0) as u8,
        v as u8,
    )
}

/// 8-bit CIE L*a*b* (D65): L scaled to 0..255, a and b offset by 128.
///
/// Stored as [b, a, L] for the same reason as [`to_hsv`].
pub fn to_lab(img: &RgbImage) -> RgbImage {
    map_colors(img, |p| {
        let (l, a, b) = rgb_to_lab8(p);
        Rgb([b, a, l])
    })
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn rgb_to_lab8(p: Rgb<u8>) -> (u8, u8, u8) {
    let r = srgb_to_linear(p[0]);
    let g = srgb_to_linear(p[1]);
    let b = srgb_to_linear(p[2]);

    // sRGB -> XYZ, normalized by the D65 white point
    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);

    (
        (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8,
        (a + 128.0).round().clamp(0.0, 255.0) as u8,
        (bb + 128.0).round().clamp(0.0, 255.0) as u8,
    )
}
