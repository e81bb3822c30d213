//! Product image conversion: every JPEG/PNG under the images root becomes a
//! size-bounded WebP in the site's asset directory.
//!
//! ## Output Structure
//!
//! Sources are discovered recursively but written flat, keyed by file stem,
//! because the storefront looks product images up by name:
//!
//! ```text
//! images/                        web/static/assets/product-images/
//! ├── mugs/                      ├── mug-red.webp
//! │   ├── mug-red.JPG      →     ├── mug-blue.webp
//! │   └── mug-blue.png           └── poster.webp
//! └── poster.jpeg
//! ```
//!
//! Two sources with the same stem would race for one output. Tasks are sorted
//! by source path; the first keeps the name and the rest are reported as
//! [`ConvertError::DuplicateDestination`], so the output set never depends on
//! worker timing.
//!
//! ## Parallel Processing
//!
//! Tasks run on a dedicated [rayon](https://docs.rs/rayon) pool sized by
//! [`ConvertOptions::workers`]. Each worker decodes, normalises and encodes one
//! image at a time and owns its pixel buffers; the backend and the cache
//! index are shared read-only. Output directories are created before the
//! pool starts.
//!
//! ## Failure Policy
//!
//! A bad image is logged and recorded in its [`TaskOutcome`]; the pool always
//! runs every task. Only problems that stop dispatch altogether (output
//! directory creation, pool construction, walking the source tree) are
//! returned as `Err`.

use crate::cache::{CacheKey, CacheStats, CachedEncode, ConversionCache};
use crate::imaging::{
    EncodeBudget, ImageBackend, ImagingError, OUTPUT_EXTENSION, convert_image, is_source_image,
};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to walk images directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} has the same output name as {}", path.display(), kept.display())]
    DuplicateDestination { path: PathBuf, kept: PathBuf },
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("images directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
}

/// One source file and where its WebP goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    pub budget: EncodeBudget,
    /// Worker threads; values below 1 are treated as 1.
    pub workers: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            budget: EncodeBudget::default(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// A successfully written output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converted {
    pub quality: u32,
    pub size_bytes: u64,
    pub within_budget: bool,
    /// Copied from the conversion cache instead of encoded.
    pub cached: bool,
}

impl From<&Converted> for CachedEncode {
    fn from(converted: &Converted) -> Self {
        Self {
            quality: converted.quality,
            size_bytes: converted.size_bytes,
            within_budget: converted.within_budget,
        }
    }
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub task: ImageTask,
    pub result: Result<Converted, ConvertError>,
    /// Set for successful tasks when caching is enabled.
    pub cache_key: Option<CacheKey>,
}

impl TaskOutcome {
    fn failed(task: ImageTask, error: ConvertError) -> Self {
        Self {
            task,
            result: Err(error),
            cache_key: None,
        }
    }
}

/// Outcomes of a whole conversion run, in source-path order.
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub outcomes: Vec<TaskOutcome>,
    pub cache: CacheStats,
}

impl ConversionReport {
    pub fn converted(&self) -> impl Iterator<Item = (&ImageTask, &Converted)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|c| (&o.task, c)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ImageTask, &ConvertError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.task, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Recursively find source images under `source_root`, sorted by path.
///
/// Directory symlinks are not followed; symlinked files are picked up. An
/// unreadable entry below the root is logged and skipped.
pub fn discover_tasks(source_root: &Path, dest_root: &Path) -> Result<Vec<ImageTask>, ConvertError> {
    let mut tasks = Vec::new();
    for entry in WalkDir::new(source_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("skipping unreadable source entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        let is_file =
            entry.file_type().is_file() || (entry.path_is_symlink() && path.is_file());
        if !is_file || !is_source_image(path) {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        tasks.push(ImageTask {
            source_path: path.to_path_buf(),
            destination_path: dest_root.join(file_name).with_extension(OUTPUT_EXTENSION),
        });
    }
    tasks.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(tasks)
}

/// Convert every task on a pool of `options.workers` threads.
///
/// Returns one outcome per task, in input order.
pub fn convert_all(
    backend: &impl ImageBackend,
    tasks: &[ImageTask],
    options: &ConvertOptions,
    cache: Option<&ConversionCache>,
) -> Result<Vec<TaskOutcome>, ConvertError> {
    // Claim destinations in input order so the winner of a name clash is fixed.
    let mut claimed: HashMap<&Path, &Path> = HashMap::new();
    let mut rejected: HashMap<usize, PathBuf> = HashMap::new();
    for (index, task) in tasks.iter().enumerate() {
        if let Some(kept) = claimed.get(task.destination_path.as_path()) {
            warn!(
                source = %task.source_path.display(),
                kept = %kept.display(),
                "duplicate output name, skipping"
            );
            rejected.insert(index, kept.to_path_buf());
        } else {
            claimed.insert(&task.destination_path, &task.source_path);
        }
    }

    let output_dirs: BTreeSet<&Path> = claimed.keys().filter_map(|dest| dest.parent()).collect();
    for dir in output_dirs {
        std::fs::create_dir_all(dir)?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()?;

    let outcomes = pool.install(|| {
        tasks
            .par_iter()
            .enumerate()
            .map(|(index, task)| match rejected.get(&index) {
                Some(kept) => TaskOutcome::failed(
                    task.clone(),
                    ConvertError::DuplicateDestination {
                        path: task.source_path.clone(),
                        kept: kept.clone(),
                    },
                ),
                None => convert_task(backend, task, &options.budget, cache),
            })
            .collect()
    });
    Ok(outcomes)
}

fn convert_task(
    backend: &impl ImageBackend,
    task: &ImageTask,
    budget: &EncodeBudget,
    cache: Option<&ConversionCache>,
) -> TaskOutcome {
    let cache_key = cache.and_then(|_| match CacheKey::for_source(&task.source_path, budget) {
        Ok(key) => Some(key),
        Err(e) => {
            debug!(source = %task.source_path.display(), "cannot hash source: {e}");
            None
        }
    });

    if let (Some(cache), Some(key)) = (cache, &cache_key)
        && let Some((encode, blob)) = cache.lookup(key)
    {
        match std::fs::copy(&blob, &task.destination_path) {
            Ok(_) => {
                info!(
                    source = %task.source_path.display(),
                    quality = encode.quality,
                    "cached"
                );
                return TaskOutcome {
                    task: task.clone(),
                    result: Ok(Converted {
                        quality: encode.quality,
                        size_bytes: encode.size_bytes,
                        within_budget: encode.within_budget,
                        cached: true,
                    }),
                    cache_key: Some(key.clone()),
                };
            }
            Err(e) => warn!(blob = %blob.display(), "cache copy failed, re-encoding: {e}"),
        }
    }

    let result = encode_and_write(backend, task, budget);
    match &result {
        Ok(converted) => info!(
            source = %task.source_path.display(),
            quality = converted.quality,
            size_bytes = converted.size_bytes,
            within_budget = converted.within_budget,
            "converted"
        ),
        Err(e) => warn!(source = %task.source_path.display(), "conversion failed: {e}"),
    }
    TaskOutcome {
        task: task.clone(),
        cache_key: if result.is_ok() { cache_key } else { None },
        result,
    }
}

fn encode_and_write(
    backend: &impl ImageBackend,
    task: &ImageTask,
    budget: &EncodeBudget,
) -> Result<Converted, ConvertError> {
    let encoded = convert_image(backend, &task.source_path, budget)?;
    std::fs::write(&task.destination_path, &encoded.bytes).map_err(|source| {
        ConvertError::Write {
            path: task.destination_path.clone(),
            source,
        }
    })?;
    Ok(Converted {
        quality: encoded.quality,
        size_bytes: encoded.size_bytes,
        within_budget: encoded.within_budget,
        cached: false,
    })
}

/// Convert everything under `source_root` into `dest_root`.
///
/// With `cache_dir`, unchanged sources are copied from the cache and fresh
/// encodes are added to it afterwards.
pub fn convert_directory(
    backend: &impl ImageBackend,
    source_root: &Path,
    dest_root: &Path,
    options: &ConvertOptions,
    cache_dir: Option<&Path>,
) -> Result<ConversionReport, ConvertError> {
    if !source_root.is_dir() {
        return Err(ConvertError::SourceNotFound(source_root.to_path_buf()));
    }
    std::fs::create_dir_all(dest_root)?;

    let tasks = discover_tasks(source_root, dest_root)?;
    info!(
        count = tasks.len(),
        workers = options.workers,
        "converting images from {}",
        source_root.display()
    );

    let mut cache = cache_dir.map(ConversionCache::open);
    let outcomes = convert_all(backend, &tasks, options, cache.as_ref())?;

    let mut stats = CacheStats::default();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(converted) if converted.cached => stats.hits += 1,
            Ok(converted) => {
                stats.misses += 1;
                if let (Some(cache), Some(key)) = (cache.as_mut(), &outcome.cache_key)
                    && let Err(e) = cache.store(
                        key,
                        CachedEncode::from(converted),
                        &outcome.task.destination_path,
                    )
                {
                    warn!("failed to cache {}: {e}", outcome.task.destination_path.display());
                }
            }
            Err(_) => {}
        }
    }
    if let Some(cache) = cache.as_mut() {
        let dropped = cache.retain(outcomes.iter().filter_map(|o| o.cache_key.as_ref()));
        if dropped > 0 {
            debug!(dropped, "dropping cache entries for sources no longer present");
        }
        if let Err(e) = cache.save() {
            warn!("failed to save conversion cache: {e}");
        }
    }

    Ok(ConversionReport {
        outcomes,
        cache: stats,
    })
}
