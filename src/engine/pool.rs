// src/engine/pool.rs
//
// Global thread pool and batch processing for `clipshrink shrink`.
//
// A single global pool is shared by every batch instead of building one per
// call. Pool is initialized lazily on first use; the thread count is fixed
// from then on.

use crate::engine::encoder::EncodeSettings;
use crate::engine::io::{write_atomic, Source};
use crate::engine::search::{process_with, ImageBuffer};
use crate::error::ShrinkError;
use crate::ops::{Constraints, Outcome, OutputFormat};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// The shared pool, or `None` when no pool could be built (the batch then
/// runs on rayon's implicit global pool).
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_RAYON_THREADS)
                .max(MIN_RAYON_THREADS);

            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("clipshrink-worker-{i}"))
                .build()
                .map_err(|e| warn!(error = %e, "failed to build worker pool"))
                .ok()
        })
        .as_ref()
}

/// What happened to one input of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Already within limits, nothing written
    Unchanged { width: u32, height: u32, bytes: usize },
    Written {
        path: PathBuf,
        format: OutputFormat,
        original: (u32, u32),
        resized: (u32, u32),
        original_bytes: usize,
        new_bytes: usize,
    },
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub source: PathBuf,
    pub outcome: std::result::Result<BatchOutcome, String>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn output_path(output_dir: &Path, stem: &str, format: OutputFormat) -> PathBuf {
    output_dir.join(format!("{stem}.{}", format.extension()))
}

/// Absolute form of `path` for comparisons. Paths that do not exist yet are
/// resolved through their parent directory.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match (std::fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// One output stem per input, in input order. Stems are unique within the
/// batch, and no stem names an output (in either format) that is one of the
/// inputs. Clashes get a numeric suffix: `shot`, `shot-1`, `shot-2`.
pub fn plan_output_stems(inputs: &[PathBuf], output_dir: &Path) -> Vec<String> {
    let protected: HashSet<PathBuf> = inputs.iter().map(|input| resolve(input)).collect();
    let output_dir = resolve(output_dir);
    let would_replace_input = |stem: &str| {
        [OutputFormat::Png, OutputFormat::Jpeg]
            .into_iter()
            .any(|format| protected.contains(&output_path(&output_dir, stem, format)))
    };

    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let base = file_stem(input);
            let mut stem = base.clone();
            let mut suffix = 0usize;
            while taken.contains(&stem) || would_replace_input(&stem) {
                suffix += 1;
                stem = format!("{base}-{suffix}");
            }
            if suffix > 0 {
                debug!(input = %input.display(), stem, "output name clashes, renamed");
            }
            taken.insert(stem.clone());
            stem
        })
        .collect()
}

fn shrink_one(
    input: &Path,
    output_dir: &Path,
    stem: &str,
    constraints: &Constraints,
    settings: &EncodeSettings,
) -> std::result::Result<BatchOutcome, ShrinkError> {
    let source = Source::open(input)?;
    let buffer = ImageBuffer::decode(source.as_bytes())?;
    let (width, height) = buffer.dimensions();

    match process_with(&buffer, constraints, settings)? {
        Outcome::Unchanged => {
            debug!(input = %input.display(), "already within limits");
            Ok(BatchOutcome::Unchanged {
                width,
                height,
                bytes: source.len(),
            })
        }
        Outcome::Encoded(result) => {
            let path = output_path(output_dir, stem, result.format);
            write_atomic(&path, &result.bytes)?;
            info!(
                input = %input.display(),
                output = %path.display(),
                from = source.len(),
                to = result.len(),
                "shrunk"
            );
            Ok(BatchOutcome::Written {
                path,
                format: result.format,
                original: (width, height),
                resized: result.dimensions(),
                original_bytes: source.len(),
                new_bytes: result.len(),
            })
        }
    }
}

/// Shrink every file in `inputs`, writing results into `output_dir`.
/// Failures are reported per file and never abort the batch. Output names
/// come from [`plan_output_stems`], so no two results share a path and no
/// input is overwritten.
pub fn shrink_files(
    inputs: &[PathBuf],
    output_dir: &Path,
    constraints: &Constraints,
    settings: &EncodeSettings,
) -> std::result::Result<Vec<BatchResult>, ShrinkError> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| ShrinkError::file_write_failed(output_dir.display().to_string(), e))?;
    let stems = plan_output_stems(inputs, output_dir);

    let process_one = |(input, stem): (&PathBuf, &String)| -> BatchResult {
        let outcome =
            shrink_one(input, output_dir, stem, constraints, settings).map_err(|err| {
                warn!(input = %input.display(), error = %err, "failed to shrink");
                err.to_string()
            });
        BatchResult {
            source: input.clone(),
            outcome,
        }
    };

    let results: Vec<BatchResult> = match get_pool() {
        Some(pool) => {
            pool.install(|| inputs.par_iter().zip(stems.par_iter()).map(process_one).collect())
        }
        None => inputs.par_iter().zip(stems.par_iter()).map(process_one).collect(),
    };
    Ok(results)
}
