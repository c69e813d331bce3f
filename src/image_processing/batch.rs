use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use super::dispatch::apply;
use super::params::{Operation, RawParams};
use crate::error::{ProcessingError, ProcessingResult};
use crate::utils::is_allowed_image;

/// Batch statistics and progress tracking
pub struct BatchProcessor {
    pub total_files: usize,
    pub processed_count: AtomicUsize,
    pub start_time: Instant,
}

impl BatchProcessor {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            processed_count: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Increment processed count and return current count
    pub fn increment(&self) -> usize {
        self.processed_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Estimated time remaining
    pub fn eta(&self) -> Option<Duration> {
        let processed = self.processed_count.load(Ordering::Relaxed);
        if processed == 0 {
            return None;
        }

        let remaining = self.total_files.saturating_sub(processed);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }

        let time_per_item = self.start_time.elapsed() / processed as u32;
        Some(time_per_item * remaining as u32)
    }
}

/// Outcome of one file in a batch
#[derive(Debug)]
pub struct BatchItem {
    pub input: PathBuf,
    pub result: ProcessingResult<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem]) -> Self {
        let successful = items.iter().filter(|item| item.result.is_ok()).count();
        Self {
            total: items.len(),
            successful,
            failed: items.len() - successful,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.successful as f64 / self.total as f64) * 100.0
        }
    }
}

/// Every allow-listed image under `input_dir`, sorted for a stable order
pub fn discover_images(input_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(false)
        .max_depth(10)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_allowed_image(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// `<output_dir>/<dir relative to input_dir>/<stem>.png` for an input file.
/// Inputs outside `input_dir` land directly in `output_dir`.
pub fn output_path_for(input: &Path, input_dir: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let subdir = input
        .strip_prefix(input_dir)
        .ok()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    output_dir.join(subdir).join(format!("{}.png", stem))
}

/// Output path for every input, in input order.
///
/// Inputs sharing a stem in one directory (`c.jpg`, `c.bmp`) keep their
/// extension in the name instead (`c_jpg.png`, `c_bmp.png`). Any collision
/// left after that fails the whole batch before anything is written.
pub fn plan_outputs(files: &[PathBuf], input_dir: &Path, output_dir: &Path) -> ProcessingResult<Vec<PathBuf>> {
    let planned: Vec<PathBuf> = files
        .iter()
        .map(|input| output_path_for(input, input_dir, output_dir))
        .collect();

    let mut counts: HashMap<&Path, usize> = HashMap::new();
    for output in &planned {
        *counts.entry(output.as_path()).or_insert(0) += 1;
    }

    let outputs: Vec<PathBuf> = files
        .iter()
        .zip(&planned)
        .map(|(input, output)| {
            if counts.get(output.as_path()).copied().unwrap_or(0) < 2 {
                return output.clone();
            }
            let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
            let ext = input
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("img")
                .to_lowercase();
            output.with_file_name(format!("{}_{}.png", stem, ext))
        })
        .collect();

    let mut seen = HashSet::new();
    for (input, output) in files.iter().zip(&outputs) {
        if !seen.insert(output.as_path()) {
            return Err(ProcessingError::Write {
                path: output.clone(),
                reason: format!("output for {} collides with another input", input.display()),
            });
        }
    }
    Ok(outputs)
}

/// Apply one operation to many files in parallel.
///
/// The operation name and the output layout are checked once up front, so an
/// unknown name or colliding outputs fail the whole batch instead of every
/// file. The callback receives the completed count and the estimated time left.
pub fn process_batch<P>(
    files: &[PathBuf],
    input_dir: &Path,
    output_dir: &Path,
    operation_name: &str,
    params: &RawParams,
    base_dir: &Path,
    progress_callback: P,
) -> ProcessingResult<Vec<BatchItem>>
where
    P: Fn(usize, Option<Duration>) + Send + Sync,
{
    Operation::parse(operation_name, params)?;
    let outputs = plan_outputs(files, input_dir, output_dir)?;

    let processor = BatchProcessor::new(files.len());
    let items = files
        .par_iter()
        .zip(outputs.par_iter())
        .map(|(input, output)| {
            let result = apply(input, output, operation_name, params, base_dir);

            let completed = processor.increment();
            progress_callback(completed, processor.eta());

            BatchItem {
                input: input.clone(),
                result,
            }
        })
        .collect();
    Ok(items)
}

/// Errors collected from a batch, for reporting
pub fn failures(items: &[BatchItem]) -> Vec<(&Path, &ProcessingError)> {
    items
        .iter()
        .filter_map(|item| item.result.as_ref().err().map(|e| (item.input.as_path(), e)))
        .collect()
}
