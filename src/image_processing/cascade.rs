//! Boosted Haar cascade classifier in the OpenCV XML format
//!
//! Only the "new" format (`<cascade>` with `stageType` BOOST and
//! `featureType` HAAR) is understood. Weak classifiers may be stumps or small
//! trees; tilted features are rejected.

use image::GrayImage;
use imageproc::integral_image::{integral_image, integral_squared_image};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{ProcessingError, ProcessingResult};

/// Stage thresholds are relaxed by this much, as OpenCV does when loading
const STAGE_THRESHOLD_EPS: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    /// Child index when the feature is below the threshold; <= 0 is a leaf
    pub left: i32,
    /// Child index otherwise; <= 0 is a leaf
    pub right: i32,
    pub feature: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

/// Summed-area tables of one gray image
pub struct IntegralImages {
    width: u32,
    sums: Vec<f64>,
    squares: Vec<f64>,
}

impl IntegralImages {
    pub fn new(gray: &GrayImage) -> Self {
        let sums = integral_image::<_, u64>(gray);
        let squares = integral_squared_image::<_, u64>(gray);
        Self {
            width: sums.width(),
            sums: sums.pixels().map(|p| p[0] as f64).collect(),
            squares: squares.pixels().map(|p| p[0] as f64).collect(),
        }
    }

    #[inline]
    fn at(table: &[f64], stride: u32, x: u32, y: u32) -> f64 {
        table[(y * stride + x) as usize]
    }

    #[inline]
    fn rect_sum(table: &[f64], stride: u32, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::at(table, stride, x + w, y + h) - Self::at(table, stride, x, y + h)
            - Self::at(table, stride, x + w, y)
            + Self::at(table, stride, x, y)
    }

    /// Sum of pixels in `[x, x + w) x [y, y + h)`
    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::rect_sum(&self.sums, self.width, x, y, w, h)
    }

    pub fn square_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::rect_sum(&self.squares, self.width, x, y, w, h)
    }
}

impl HaarCascade {
    /// Load a cascade from an XML file
    pub fn from_file(path: &Path) -> ProcessingResult<Self> {
        let reader = Reader::from_file(path).map_err(|e| invalid(path, e.to_string()))?;
        Self::parse(reader, path)
    }

    /// Parse a cascade from an in-memory XML document
    pub fn from_xml(xml: &str) -> ProcessingResult<Self> {
        Self::parse(Reader::from_reader(xml.as_bytes()), Path::new("<memory>"))
    }

    fn parse<R: BufRead>(mut reader: Reader<R>, path: &Path) -> ProcessingResult<Self> {
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut stack: Vec<String> = Vec::new();

        let mut window_width = 0u32;
        let mut window_height = 0u32;
        let mut stages: Vec<Stage> = Vec::new();
        let mut features: Vec<HaarFeature> = Vec::new();
        let mut seen_cascade = false;

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| invalid(path, e.to_string()))?
            {
                Event::Start(ref e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let parent = stack.last().map(String::as_str);
                    match (tag.as_str(), parent) {
                        ("cascade", _) => seen_cascade = true,
                        ("_", Some("stages")) => stages.push(Stage::default()),
                        ("_", Some("weakClassifiers")) => {
                            let stage = stages
                                .last_mut()
                                .ok_or_else(|| invalid(path, "weak classifier outside a stage"))?;
                            stage.classifiers.push(WeakClassifier::default());
                        }
                        ("_", Some("features")) => features.push(HaarFeature::default()),
                        _ => {}
                    }
                    stack.push(tag);
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(|e| invalid(path, e.to_string()))?;
                    let text = text.trim();
                    let depth = stack.len();
                    let tag = stack.last().map(String::as_str).unwrap_or("");
                    let parent = if depth >= 2 { stack[depth - 2].as_str() } else { "" };

                    match (tag, parent) {
                        ("width", "cascade") => window_width = parse_number(path, text)?,
                        ("height", "cascade") => window_height = parse_number(path, text)?,
                        ("stageType", "cascade") if text != "BOOST" => {
                            return Err(invalid(path, format!("unsupported stage type {}", text)));
                        }
                        ("featureType", "cascade") if text != "HAAR" => {
                            return Err(invalid(path, format!("unsupported feature type {}", text)));
                        }
                        ("stageThreshold", _) => {
                            let stage = stages
                                .last_mut()
                                .ok_or_else(|| invalid(path, "stage threshold outside a stage"))?;
                            let threshold: f32 = parse_number(path, text)?;
                            stage.threshold = threshold - STAGE_THRESHOLD_EPS;
                        }
                        ("internalNodes", _) => {
                            let classifier = last_classifier(&mut stages, path)?;
                            classifier.nodes = parse_nodes(path, text)?;
                        }
                        ("leafValues", _) => {
                            let classifier = last_classifier(&mut stages, path)?;
                            classifier.leaves = parse_list(path, text)?;
                        }
                        ("_", "rects") => {
                            let feature = features
                                .last_mut()
                                .ok_or_else(|| invalid(path, "rect outside a feature"))?;
                            feature.rects.push(parse_rect(path, text)?);
                        }
                        ("tilted", _) if text != "0" => {
                            return Err(invalid(path, "tilted features are not supported"));
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !seen_cascade {
            return Err(invalid(path, "no <cascade> element (old-style cascades are not supported)"));
        }

        let cascade = HaarCascade {
            window_width,
            window_height,
            stages,
            features,
        };
        cascade.validate(path)?;
        Ok(cascade)
    }

    fn validate(&self, path: &Path) -> ProcessingResult<()> {
        if self.window_width < 3 || self.window_height < 3 {
            return Err(invalid(path, "window size must be at least 3x3"));
        }
        if self.stages.is_empty() {
            return Err(invalid(path, "cascade has no stages"));
        }

        for (si, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(invalid(path, format!("stage {} has no classifiers", si)));
            }
            for classifier in &stage.classifiers {
                if classifier.nodes.is_empty() || classifier.leaves.is_empty() {
                    return Err(invalid(path, format!("stage {} has an empty classifier", si)));
                }
                for node in &classifier.nodes {
                    if node.feature >= self.features.len() {
                        return Err(invalid(path, format!("feature index {} out of range", node.feature)));
                    }
                    for child in [node.left, node.right] {
                        let in_range = if child > 0 {
                            (child as usize) < classifier.nodes.len()
                        } else {
                            (child.unsigned_abs() as usize) < classifier.leaves.len()
                        };
                        if !in_range {
                            return Err(invalid(path, format!("child index {} out of range", child)));
                        }
                    }
                }
            }
        }

        for feature in &self.features {
            if feature.rects.is_empty() {
                return Err(invalid(path, "feature without rectangles"));
            }
            for r in &feature.rects {
                if r.x + r.width > self.window_width || r.y + r.height > self.window_height {
                    return Err(invalid(path, "feature rectangle exceeds the window"));
                }
            }
        }
        Ok(())
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    /// Returns true when all stages accept.
    pub fn evaluate(&self, integrals: &IntegralImages, x: u32, y: u32) -> bool {
        let (w, h) = (self.window_width, self.window_height);

        // Variance normalization over the window shrunk by one pixel per side
        let area = f64::from((w - 2) * (h - 2));
        let sum = integrals.sum(x + 1, y + 1, w - 2, h - 2);
        let square_sum = integrals.square_sum(x + 1, y + 1, w - 2, h - 2);
        let variance = area * square_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut stage_sum = 0.0f32;
            for classifier in &stage.classifiers {
                let mut idx: i32 = 0;
                loop {
                    let node = &classifier.nodes[idx as usize];
                    let value = self.feature_value(integrals, node.feature, x, y) / norm;
                    idx = if value < f64::from(node.threshold) {
                        node.left
                    } else {
                        node.right
                    };
                    if idx <= 0 {
                        break;
                    }
                }
                stage_sum += classifier.leaves[idx.unsigned_abs() as usize];
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }

    fn feature_value(&self, integrals: &IntegralImages, feature: usize, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| f64::from(r.weight) * integrals.sum(x + r.x, y + r.y, r.width, r.height))
            .sum()
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> ProcessingError {
    ProcessingError::InvalidCascade {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

fn last_classifier<'a>(stages: &'a mut [Stage], path: &Path) -> ProcessingResult<&'a mut WeakClassifier> {
    stages
        .last_mut()
        .and_then(|stage| stage.classifiers.last_mut())
        .ok_or_else(|| invalid(path, "classifier data outside a weak classifier"))
}

fn parse_number<T: std::str::FromStr>(path: &Path, text: &str) -> ProcessingResult<T> {
    text.parse::<T>()
        .map_err(|_| invalid(path, format!("invalid number '{}'", text)))
}

fn parse_list(path: &Path, text: &str) -> ProcessingResult<Vec<f32>> {
    text.split_whitespace()
        .map(|token| parse_number::<f32>(path, token))
        .collect()
}

/// `internalNodes` holds groups of four: left right featureIdx threshold
fn parse_nodes(path: &Path, text: &str) -> ProcessingResult<Vec<TreeNode>> {
    let values = parse_list(path, text)?;
    if values.is_empty() || values.len() % 4 != 0 {
        return Err(invalid(path, "internalNodes must hold groups of 4 values"));
    }
    values
        .chunks_exact(4)
        .map(|chunk| {
            if chunk[2] < 0.0 {
                return Err(invalid(path, "negative feature index"));
            }
            Ok(TreeNode {
                left: chunk[0] as i32,
                right: chunk[1] as i32,
                feature: chunk[2] as usize,
                threshold: chunk[3],
            })
        })
        .collect()
}

/// A rect is "x y width height weight"
fn parse_rect(path: &Path, text: &str) -> ProcessingResult<WeightedRect> {
    let values = parse_list(path, text)?;
    if values.len() != 5 || values[..4].iter().any(|v| *v < 0.0) {
        return Err(invalid(path, format!("invalid rect '{}'", text)));
    }
    Ok(WeightedRect {
        x: values[0] as u32,
        y: values[1] as u32,
        width: values[2] as u32,
        height: values[3] as u32,
        weight: values[4],
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    /// 6x6 window accepting a dark-over-bright horizontal edge
    pub(crate) const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>6</height>
  <width>6</width>
  <stageParams><maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams><maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>5.0e-01</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 6 3 -1.</_>
        <_>
          0 3 6 3 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    fn edge_image() -> GrayImage {
        ImageBuffer::from_fn(6, 6, |_, y| Luma([if y < 3 { 0 } else { 255 }]))
    }

    #[test]
    fn test_parse_edge_cascade() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        assert_eq!((cascade.window_width, cascade.window_height), (6, 6));
        assert_eq!(cascade.stages.len(), 1);
        assert_eq!(cascade.stages[0].classifiers.len(), 1);
        assert_eq!(cascade.features.len(), 1);
        assert_eq!(cascade.features[0].rects.len(), 2);
        assert_eq!(
            cascade.stages[0].classifiers[0].nodes[0],
            TreeNode { left: 0, right: -1, feature: 0, threshold: 0.5 }
        );
        assert!((cascade.stages[0].threshold - (0.5 - STAGE_THRESHOLD_EPS)).abs() < 1e-7);
    }

    #[test]
    fn test_evaluate_accepts_edge_and_rejects_flat() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        assert!(cascade.evaluate(&IntegralImages::new(&edge_image()), 0, 0));

        let flat: GrayImage = ImageBuffer::from_pixel(6, 6, Luma([128]));
        assert!(!cascade.evaluate(&IntegralImages::new(&flat), 0, 0));

        let inverted: GrayImage = ImageBuffer::from_fn(6, 6, |_, y| Luma([if y < 3 { 255 } else { 0 }]));
        assert!(!cascade.evaluate(&IntegralImages::new(&inverted), 0, 0));
    }

    #[test]
    fn test_integral_sums() {
        let img: GrayImage = ImageBuffer::from_pixel(4, 3, Luma([2]));
        let integrals = IntegralImages::new(&img);
        assert_eq!(integrals.sum(0, 0, 4, 3), 24.0);
        assert_eq!(integrals.sum(1, 1, 2, 2), 8.0);
        assert_eq!(integrals.square_sum(0, 0, 4, 3), 48.0);
    }

    #[test]
    fn test_rejects_old_format() {
        let xml = r#"<?xml version="1.0"?>
<opencv_storage>
<haarcascade_frontalface type_id="opencv-haar-classifier">
  <size>24 24</size>
  <stages></stages>
</haarcascade_frontalface>
</opencv_storage>"#;
        let err = HaarCascade::from_xml(xml).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidCascade { .. }));
    }

    #[test]
    fn test_rejects_bad_feature_index() {
        let xml = EDGE_CASCADE.replace("0 -1 0 5.0e-01", "0 -1 3 5.0e-01");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(ProcessingError::InvalidCascade { .. })
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(HaarCascade::from_xml("not xml at all").is_err());
        assert!(HaarCascade::from_xml("").is_err());
    }
}
