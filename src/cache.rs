//! Content-addressed cache of encoded product images.
//!
//! The quality search encodes every image up to six times with libwebp at its
//! slowest method, and a deploy re-clones the site repository, which wipes the
//! previous outputs. The cache lives outside the working copy so that an
//! unchanged product photo is copied instead of re-encoded.
//!
//! # Keys
//!
//! - **`source_hash`**: SHA-256 of the source file bytes. Content-based, so
//!   renaming a photo or touching its mtime does not invalidate it.
//! - **`params_hash`**: SHA-256 of the encode budget (target size, quality
//!   window, step) and the codec settings. Changing any of them re-encodes.
//!
//! Each encoded file is stored as `<source_hash>-<params_hash>.webp`, and
//! `index.json` records the quality and size chosen for it so cached results
//! report the same numbers as fresh ones.
//!
//! # Concurrency
//!
//! The cache is loaded before the worker pool starts and only read by
//! workers. New entries are added by the caller after the pool has finished,
//! so no locking is needed.
//!
//! # Pruning
//!
//! [`ConversionCache::retain`] drops index entries the current run did not
//! use, and [`ConversionCache::save`] deletes every blob the saved index no
//! longer names. Edited photos and budget changes therefore do not leave
//! orphaned encodes behind.

use crate::imaging::{EncodeBudget, OUTPUT_EXTENSION};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const INDEX_FILENAME: &str = "index.json";

/// Bump to invalidate every existing cache when key computation changes.
const INDEX_VERSION: u32 = 1;

/// Codec settings folded into `params_hash`.
const CODEC_TAG: &[u8] = b"webp-lossy-method6\0";

/// Quality and size recorded for a cached encode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedEncode {
    pub quality: u32,
    pub size_bytes: u64,
    pub within_budget: bool,
}

/// Lookup key for one (source content, encode parameters) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_hash: String,
    pub params_hash: String,
}

impl CacheKey {
    /// Hash the source file and the budget it will be encoded with.
    pub fn for_source(source: &Path, budget: &EncodeBudget) -> io::Result<Self> {
        Ok(Self {
            source_hash: hash_file(source)?,
            params_hash: hash_budget(budget),
        })
    }

    fn index_key(&self) -> String {
        format!("{}-{}", self.source_hash, self.params_hash)
    }

    fn blob_name(&self) -> String {
        format!("{}.{}", self.index_key(), OUTPUT_EXTENSION)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    version: u32,
    entries: BTreeMap<String, CachedEncode>,
}

impl CacheIndex {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// On-disk encode cache rooted at one directory.
#[derive(Debug)]
pub struct ConversionCache {
    dir: PathBuf,
    index: CacheIndex,
}

impl ConversionCache {
    /// Open the cache in `dir`. A missing, unreadable or outdated index
    /// yields an empty cache; stale blobs are simply never looked up.
    pub fn open(dir: &Path) -> Self {
        let index = std::fs::read_to_string(dir.join(INDEX_FILENAME))
            .ok()
            .and_then(|content| serde_json::from_str::<CacheIndex>(&content).ok())
            .filter(|index| index.version == INDEX_VERSION)
            .unwrap_or_else(CacheIndex::empty);
        Self {
            dir: dir.to_path_buf(),
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.entries.is_empty()
    }

    /// Find a cached encode. Only a hit if the blob is still on disk.
    pub fn lookup(&self, key: &CacheKey) -> Option<(CachedEncode, PathBuf)> {
        let encode = self.index.entries.get(&key.index_key())?;
        let blob = self.dir.join(key.blob_name());
        blob.exists().then_some((*encode, blob))
    }

    /// Copy a freshly written output into the cache and index it.
    pub fn store(&mut self, key: &CacheKey, encode: CachedEncode, output: &Path) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::copy(output, self.dir.join(key.blob_name()))?;
        self.index.entries.insert(key.index_key(), encode);
        Ok(())
    }

    /// Keep only the entries for `live` keys. Returns how many were dropped.
    pub fn retain<'a>(&mut self, live: impl IntoIterator<Item = &'a CacheKey>) -> usize {
        let live: HashSet<String> = live.into_iter().map(CacheKey::index_key).collect();
        let before = self.index.entries.len();
        self.index.entries.retain(|key, _| live.contains(key));
        before - self.index.entries.len()
    }

    /// Write the index, then delete blobs it does not name.
    ///
    /// Returns the number of blobs removed.
    pub fn save(&self) -> io::Result<usize> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(&self.index)?;
        std::fs::write(self.dir.join(INDEX_FILENAME), json)?;

        let mut pruned = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let orphan = path.extension().is_some_and(|ext| ext == OUTPUT_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_none_or(|stem| !self.index.entries.contains_key(stem));
            if orphan {
                std::fs::remove_file(&path)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, dir = %self.dir.display(), "pruned orphaned cache blobs");
        }
        Ok(pruned)
    }
}

/// SHA-256 of a file's contents, as hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// SHA-256 of everything that influences the encoded bytes besides the source.
pub fn hash_budget(budget: &EncodeBudget) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CODEC_TAG);
    hasher.update(budget.target_bytes.to_le_bytes());
    hasher.update(budget.quality_min.value().to_le_bytes());
    hasher.update(budget.quality_max.value().to_le_bytes());
    hasher.update(budget.step.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache hit/miss counts for one conversion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} encoded ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} encoded", self.misses)
        }
    }
}
