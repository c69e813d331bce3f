//! Parameter coercion and the typed operation set
//!
//! Clients send parameters as loosely typed values (form fields are strings,
//! JSON bodies may carry numbers). Each operation picks the keys it knows,
//! coerces them with a fallback default, and ignores everything else.

use serde_json::Value;
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{ProcessingError, ProcessingResult};

/// Raw parameter mapping as received from a request
pub type RawParams = HashMap<String, Value>;

/// Best-effort integer conversion; any failure yields `default`
pub fn coerce_int(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(default),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                // Fractional numbers truncate toward zero
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => f.trunc() as i64,
                    _ => default,
                }
            }
        }
        Some(Value::Bool(b)) => i64::from(*b),
        _ => default,
    }
}

/// Best-effort float conversion; any failure yields `default`
pub fn coerce_float(value: Option<&Value>, default: f64) -> f64 {
    match value {
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(default),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => default,
    }
}

fn int_param(params: &RawParams, key: &str, default: i64) -> i64 {
    coerce_int(params.get(key), default)
}

fn float_param(params: &RawParams, key: &str, default: f64) -> f64 {
    coerce_float(params.get(key), default)
}

/// Saturating conversion into the i32 range used by the transforms
fn to_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Names of every supported operation, in registry order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OperationKind {
    Grayscale,
    Blur,
    Canny,
    Threshold,
    EqualizeHist,
    ConvertHsv,
    ConvertLab,
    SplitMerge,
    BitwiseNot,
    Resize,
    Rotate,
    SmoothBilateral,
    MaskCircle,
    Sobel,
    Laplacian,
    Contours,
    FaceDetect,
}

impl OperationKind {
    /// Case-insensitive lookup; surrounding whitespace is ignored
    pub fn from_name(name: &str) -> ProcessingResult<Self> {
        name.trim()
            .parse::<OperationKind>()
            .map_err(|_| ProcessingError::UnsupportedOperation(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurParams {
    /// Always odd and >= 1
    pub ksize: u32,
}

impl BlurParams {
    pub const DEFAULT_KSIZE: i64 = 5;

    pub fn from_raw(params: &RawParams) -> Self {
        let mut k = int_param(params, "ksize", Self::DEFAULT_KSIZE);
        if k < 1 {
            k = Self::DEFAULT_KSIZE;
        }
        if k % 2 == 0 {
            k += 1;
        }
        Self {
            ksize: k.min(u32::MAX as i64 - 1) as u32,
        }
    }

    /// Gaussian sigma derived from the kernel size, as OpenCV does for sigma = 0
    pub fn sigma(&self) -> f32 {
        0.3 * ((self.ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CannyParams {
    pub threshold1: i32,
    pub threshold2: i32,
}

impl CannyParams {
    pub fn from_raw(params: &RawParams) -> Self {
        Self {
            threshold1: to_i32(int_param(params, "threshold1", 100)),
            threshold2: to_i32(int_param(params, "threshold2", 200)),
        }
    }

    /// (low, high) regardless of the order the caller used
    pub fn ordered(&self) -> (f32, f32) {
        let low = self.threshold1.min(self.threshold2) as f32;
        let high = self.threshold1.max(self.threshold2) as f32;
        (low, high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdParams {
    pub thresh: i32,
    pub maxval: u8,
}

impl ThresholdParams {
    pub fn from_raw(params: &RawParams) -> Self {
        Self {
            thresh: to_i32(int_param(params, "thresh", 127)),
            maxval: int_param(params, "maxval", 255).clamp(0, 255) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeParams {
    pub scale: f64,
}

impl ResizeParams {
    pub const DEFAULT_SCALE: f64 = 0.5;

    pub fn from_raw(params: &RawParams) -> Self {
        let scale = float_param(params, "scale", Self::DEFAULT_SCALE);
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            Self::DEFAULT_SCALE
        };
        Self { scale }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotateParams {
    /// Degrees, counter-clockwise
    pub angle: f64,
}

impl RotateParams {
    pub fn from_raw(params: &RawParams) -> Self {
        let angle = float_param(params, "angle", 90.0);
        Self {
            angle: if angle.is_finite() { angle } else { 90.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BilateralParams {
    pub diameter: i32,
    pub sigma_color: i32,
    pub sigma_space: i32,
}

impl BilateralParams {
    pub fn from_raw(params: &RawParams) -> Self {
        Self {
            diameter: to_i32(int_param(params, "d", 9)),
            sigma_color: to_i32(int_param(params, "sigmaColor", 75)),
            sigma_space: to_i32(int_param(params, "sigmaSpace", 75)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetectParams {
    pub scale_factor: f64,
    pub min_neighbors: u32,
}

impl FaceDetectParams {
    pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;

    pub fn from_raw(params: &RawParams) -> Self {
        let scale_factor = float_param(params, "scaleFactor", Self::DEFAULT_SCALE_FACTOR);
        let scale_factor = if scale_factor.is_finite() && scale_factor > 1.0 {
            scale_factor
        } else {
            Self::DEFAULT_SCALE_FACTOR
        };
        let min_neighbors = int_param(params, "minNeighbors", 5).clamp(0, u32::MAX as i64) as u32;
        Self {
            scale_factor,
            min_neighbors,
        }
    }
}

/// One fully-typed operation request
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Grayscale,
    Blur(BlurParams),
    Canny(CannyParams),
    Threshold(ThresholdParams),
    EqualizeHist,
    ConvertHsv,
    ConvertLab,
    SplitMerge,
    BitwiseNot,
    Resize(ResizeParams),
    Rotate(RotateParams),
    SmoothBilateral(BilateralParams),
    MaskCircle,
    Sobel,
    Laplacian,
    Contours,
    FaceDetect(FaceDetectParams),
}

impl Operation {
    /// Resolve an operation name and raw parameters into a typed operation
    pub fn parse(name: &str, params: &RawParams) -> ProcessingResult<Self> {
        Ok(Self::from_kind(OperationKind::from_name(name)?, params))
    }

    pub fn from_kind(kind: OperationKind, params: &RawParams) -> Self {
        match kind {
            OperationKind::Grayscale => Operation::Grayscale,
            OperationKind::Blur => Operation::Blur(BlurParams::from_raw(params)),
            OperationKind::Canny => Operation::Canny(CannyParams::from_raw(params)),
            OperationKind::Threshold => Operation::Threshold(ThresholdParams::from_raw(params)),
            OperationKind::EqualizeHist => Operation::EqualizeHist,
            OperationKind::ConvertHsv => Operation::ConvertHsv,
            OperationKind::ConvertLab => Operation::ConvertLab,
            OperationKind::SplitMerge => Operation::SplitMerge,
            OperationKind::BitwiseNot => Operation::BitwiseNot,
            OperationKind::Resize => Operation::Resize(ResizeParams::from_raw(params)),
            OperationKind::Rotate => Operation::Rotate(RotateParams::from_raw(params)),
            OperationKind::SmoothBilateral => {
                Operation::SmoothBilateral(BilateralParams::from_raw(params))
            }
            OperationKind::MaskCircle => Operation::MaskCircle,
            OperationKind::Sobel => Operation::Sobel,
            OperationKind::Laplacian => Operation::Laplacian,
            OperationKind::Contours => Operation::Contours,
            OperationKind::FaceDetect => Operation::FaceDetect(FaceDetectParams::from_raw(params)),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Grayscale => OperationKind::Grayscale,
            Operation::Blur(_) => OperationKind::Blur,
            Operation::Canny(_) => OperationKind::Canny,
            Operation::Threshold(_) => OperationKind::Threshold,
            Operation::EqualizeHist => OperationKind::EqualizeHist,
            Operation::ConvertHsv => OperationKind::ConvertHsv,
            Operation::ConvertLab => OperationKind::ConvertLab,
            Operation::SplitMerge => OperationKind::SplitMerge,
            Operation::BitwiseNot => OperationKind::BitwiseNot,
            Operation::Resize(_) => OperationKind::Resize,
            Operation::Rotate(_) => OperationKind::Rotate,
            Operation::SmoothBilateral(_) => OperationKind::SmoothBilateral,
            Operation::MaskCircle => OperationKind::MaskCircle,
            Operation::Sobel => OperationKind::Sobel,
            Operation::Laplacian => OperationKind::Laplacian,
            Operation::Contours => OperationKind::Contours,
            Operation::FaceDetect(_) => OperationKind::FaceDetect,
        }
    }
}

/// Parse `key=value` pairs from the command line into raw parameters
pub fn parse_key_values<S: AsRef<str>>(pairs: &[S]) -> RawParams {
    pairs
        .iter()
        .filter_map(|pair| {
            let (key, value) = pair.as_ref().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), Value::String(value.trim().to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_coerce_int_falls_back_on_garbage() {
        for input in ["", "abc", "7.5", "1e3", "0x10", "--3"] {
            assert_eq!(coerce_int(Some(&json!(input)), 42), 42, "input {:?}", input);
        }
        assert_eq!(coerce_int(None, -1), -1);
        assert_eq!(coerce_int(Some(&Value::Null), 9), 9);
        assert_eq!(coerce_int(Some(&json!([1, 2])), 3), 3);
    }

    #[test]
    fn test_coerce_int_parses_numbers() {
        assert_eq!(coerce_int(Some(&json!("15")), 0), 15);
        assert_eq!(coerce_int(Some(&json!(" -4 ")), 0), -4);
        assert_eq!(coerce_int(Some(&json!("+8")), 0), 8);
        assert_eq!(coerce_int(Some(&json!(12)), 0), 12);
        assert_eq!(coerce_int(Some(&json!(7.9)), 0), 7);
        assert_eq!(coerce_int(Some(&json!(-7.9)), 0), -7);
        assert_eq!(coerce_int(Some(&json!(true)), 0), 1);
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(coerce_float(Some(&json!("0.25")), 1.0), 0.25);
        assert_eq!(coerce_float(Some(&json!("1e-1")), 1.0), 0.1);
        assert_eq!(coerce_float(Some(&json!("12")), 1.0), 12.0);
        assert_eq!(coerce_float(Some(&json!(3)), 1.0), 3.0);
        assert_eq!(coerce_float(Some(&json!("scale")), 0.5), 0.5);
        assert_eq!(coerce_float(Some(&json!("")), 0.5), 0.5);
        assert_eq!(coerce_float(None, 1.1), 1.1);
    }

    #[test]
    fn test_operation_kind_is_case_insensitive() {
        assert_eq!(OperationKind::from_name("BLUR").unwrap(), OperationKind::Blur);
        assert_eq!(
            OperationKind::from_name(" Equalize_Hist ").unwrap(),
            OperationKind::EqualizeHist
        );
        assert_eq!(OperationKind::FaceDetect.to_string(), "face_detect");
        assert_eq!(OperationKind::SmoothBilateral.as_ref(), "smooth_bilateral");
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let err = Operation::parse("not_a_real_op", &RawParams::new()).unwrap_err();
        assert!(matches!(err, ProcessingError::UnsupportedOperation(name) if name == "not_a_real_op"));
    }

    #[test]
    fn test_blur_even_kernel_is_bumped() {
        for k in [2, 4, 6, 10, 30] {
            let params = BlurParams::from_raw(&raw(&[("ksize", json!(k.to_string()))]));
            assert_eq!(params.ksize, k + 1);
        }
        let params = BlurParams::from_raw(&raw(&[("ksize", json!("7"))]));
        assert_eq!(params.ksize, 7);
    }

    #[test]
    fn test_blur_defaults_and_invalid_kernel() {
        assert_eq!(BlurParams::from_raw(&RawParams::new()).ksize, 5);
        assert_eq!(BlurParams::from_raw(&raw(&[("ksize", json!("big"))])).ksize, 5);
        assert_eq!(BlurParams::from_raw(&raw(&[("ksize", json!("-2"))])).ksize, 5);
        let sigma = BlurParams { ksize: 5 }.sigma();
        assert!((sigma - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_defaults_for_parameterized_operations() {
        let empty = RawParams::new();
        assert_eq!(
            ThresholdParams::from_raw(&empty),
            ThresholdParams { thresh: 127, maxval: 255 }
        );
        assert_eq!(ResizeParams::from_raw(&empty).scale, 0.5);
        assert_eq!(RotateParams::from_raw(&empty).angle, 90.0);
        assert_eq!(
            BilateralParams::from_raw(&empty),
            BilateralParams { diameter: 9, sigma_color: 75, sigma_space: 75 }
        );
        let face = FaceDetectParams::from_raw(&empty);
        assert_eq!(face.scale_factor, 1.1);
        assert_eq!(face.min_neighbors, 5);
        assert_eq!(CannyParams::from_raw(&empty).ordered(), (100.0, 200.0));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let params = raw(&[("angle", json!("45")), ("colour", json!("red"))]);
        let op = Operation::parse("rotate", &params).unwrap();
        assert_eq!(op, Operation::Rotate(RotateParams { angle: 45.0 }));
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let params = raw(&[("scale", json!("-2"))]);
        assert_eq!(ResizeParams::from_raw(&params).scale, 0.5);
        let params = raw(&[("scaleFactor", json!("0.9")), ("minNeighbors", json!("-3"))]);
        let face = FaceDetectParams::from_raw(&params);
        assert_eq!(face.scale_factor, 1.1);
        assert_eq!(face.min_neighbors, 0);
        let params = raw(&[("maxval", json!("999"))]);
        assert_eq!(ThresholdParams::from_raw(&params).maxval, 255);
    }

    #[test]
    fn test_parse_key_values() {
        let params = parse_key_values(&["ksize=7", "bad", "=3", "angle = 30"]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("ksize"), Some(&json!("7")));
        assert_eq!(params.get("angle"), Some(&json!("30")));
    }
}
