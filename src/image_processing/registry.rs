//! Static descriptors for every supported operation.
//!
//! The UI renders its parameter controls from these, the JSON API returns
//! them verbatim, and the CLI prints them as a table.

use serde::Serialize;
use strum::IntoEnumIterator;

use super::params::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamDefault {
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for ParamDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamDefault::Int(v) => write!(f, "{}", v),
            ParamDefault::Float(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub default: ParamDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub params: Vec<ParamDescriptor>,
}

fn int(name: &'static str, label: &'static str, default: i64) -> ParamDescriptor {
    ParamDescriptor {
        name,
        label,
        kind: ParamKind::Int,
        default: ParamDefault::Int(default),
    }
}

fn float(name: &'static str, label: &'static str, default: f64) -> ParamDescriptor {
    ParamDescriptor {
        name,
        label,
        kind: ParamKind::Float,
        default: ParamDefault::Float(default),
    }
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Grayscale => "Grayscale",
            OperationKind::Blur => "Gaussian Blur",
            OperationKind::Canny => "Canny Edge",
            OperationKind::Threshold => "Binary Threshold",
            OperationKind::EqualizeHist => "Histogram Equalization (Gray)",
            OperationKind::ConvertHsv => "Convert to HSV",
            OperationKind::ConvertLab => "Convert to LAB",
            OperationKind::SplitMerge => "Split & Merge channels (Swap R/B)",
            OperationKind::BitwiseNot => "Bitwise NOT",
            OperationKind::Resize => "Resize",
            OperationKind::Rotate => "Rotate",
            OperationKind::SmoothBilateral => "Bilateral Filter",
            OperationKind::MaskCircle => "Mask Circle",
            OperationKind::Sobel => "Sobel Gradients",
            OperationKind::Laplacian => "Laplacian",
            OperationKind::Contours => "Find Contours",
            OperationKind::FaceDetect => "Face Detection (Haar)",
        }
    }

    pub fn param_schema(&self) -> Vec<ParamDescriptor> {
        match self {
            OperationKind::Blur => vec![int("ksize", "Kernel Size (odd)", 5)],
            OperationKind::Canny => vec![
                int("threshold1", "Threshold 1", 100),
                int("threshold2", "Threshold 2", 200),
            ],
            OperationKind::Threshold => vec![
                int("thresh", "Threshold", 127),
                int("maxval", "Max Value", 255),
            ],
            OperationKind::Resize => vec![float("scale", "Scale", 0.5)],
            OperationKind::Rotate => vec![float("angle", "Angle (deg)", 90.0)],
            OperationKind::SmoothBilateral => vec![
                int("d", "Diameter", 9),
                int("sigmaColor", "Sigma Color", 75),
                int("sigmaSpace", "Sigma Space", 75),
            ],
            OperationKind::FaceDetect => vec![
                float("scaleFactor", "Scale Factor", 1.1),
                int("minNeighbors", "Min Neighbors", 5),
            ],
            _ => Vec::new(),
        }
    }

    pub fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor {
            name: (*self).into(),
            label: self.label(),
            params: self.param_schema(),
        }
    }
}

/// Every operation, in display order
pub fn list_operations() -> Vec<OperationDescriptor> {
    OperationKind::iter().map(|kind| kind.descriptor()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_registry_is_complete_and_unique() {
        let ops = list_operations();
        assert_eq!(ops.len(), 17);
        let names: HashSet<_> = ops.iter().map(|op| op.name).collect();
        assert_eq!(names.len(), ops.len());
        assert_eq!(ops[0].name, "grayscale");
        assert_eq!(ops[16].name, "face_detect");
    }

    #[test]
    fn test_registry_is_deterministic() {
        assert_eq!(list_operations(), list_operations());
    }

    #[test]
    fn test_every_name_parses_back() {
        for op in list_operations() {
            let kind = OperationKind::from_name(op.name).unwrap();
            assert_eq!(kind.descriptor(), op);
        }
    }

    #[test]
    fn test_descriptor_json_shape() {
        let value = serde_json::to_value(OperationKind::Threshold.descriptor()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "threshold",
                "label": "Binary Threshold",
                "params": [
                    {"name": "thresh", "label": "Threshold", "type": "int", "default": 127},
                    {"name": "maxval", "label": "Max Value", "type": "int", "default": 255}
                ]
            })
        );
        let value = serde_json::to_value(OperationKind::Resize.descriptor()).unwrap();
        assert_eq!(value["params"][0]["type"], "float");
        assert_eq!(value["params"][0]["default"], 0.5);
    }
}
