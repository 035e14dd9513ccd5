//! Flat-file persistence for scraped collections.
//!
//! Every collection is a JSON array in a file under the data directory:
//!
//! ```text
//! {data}/r_{source}/posts.json          social, month window
//! {data}/r_{source}_yearly/posts.json   social, year window
//! {data}/news/articles.json
//! {data}/digest/articles.json
//! {data}/read_posts.json
//! {data}/favorite_posts.json
//! ```
//!
//! Writes go through a temporary file in the same directory followed by a
//! rename, so readers only ever see the old or the new complete file.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::error::PersistenceError;
use crate::models::{Keyed, TimeWindow};

/// Root of the persisted data.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

/// One social (source, window) collection found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialPartition {
    pub source: String,
    pub window: TimeWindow,
    pub path: PathBuf,
}

/// Outcome of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub existing: usize,
    pub added: usize,
    pub duplicates: usize,
    /// False when nothing new arrived and the file was left alone.
    pub written: bool,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn social_path(&self, source: &str, window: TimeWindow) -> PathBuf {
        self.root
            .join(format!("r_{source}{}", window.dir_suffix()))
            .join("posts.json")
    }

    pub fn news_path(&self) -> PathBuf {
        self.root.join("news").join("articles.json")
    }

    pub fn digest_path(&self) -> PathBuf {
        self.root.join("digest").join("articles.json")
    }

    pub fn read_set_path(&self) -> PathBuf {
        self.root.join("read_posts.json")
    }

    pub fn favorites_path(&self) -> PathBuf {
        self.root.join("favorite_posts.json")
    }

    /// Social collections present under the root, sorted by directory name.
    pub fn social_partitions(&self) -> Result<Vec<SocialPartition>, PersistenceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.root, e)),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix("r_") else {
                continue;
            };
            let (source, window) = match rest.strip_suffix(TimeWindow::Year.dir_suffix()) {
                Some(source) => (source, TimeWindow::Year),
                None => (rest, TimeWindow::Month),
            };
            let path = entry.path().join("posts.json");
            if source.is_empty() || !path.is_file() {
                continue;
            }
            out.push(SocialPartition {
                source: source.to_string(),
                window,
                path,
            });
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    /// Merge `batch` into the collection at `path` and persist the union.
    ///
    /// # Arguments
    ///
    /// * `path` - Collection file; a missing file counts as empty
    /// * `batch` - Freshly normalized rows, in fetch order
    ///
    /// # Returns
    ///
    /// A [`MergeReport`] with the counts. The file is only rewritten when at
    /// least one new key arrived. A collection that exists but does not
    /// decode is an error and is left untouched.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let store = Store::new("data");
    /// let report = store.merge_into(&store.news_path(), rows)?;
    /// println!("{} new, {} already known", report.added, report.duplicates);
    /// ```
    #[instrument(level = "info", skip_all, fields(path = %path.display(), batch = batch.len()))]
    pub fn merge_into<T>(&self, path: &Path, batch: Vec<T>) -> Result<MergeReport, PersistenceError>
    where
        T: Keyed + Serialize + DeserializeOwned,
    {
        let existing = load_collection::<T>(path)?;
        let (merged, mut report) = merge(existing, batch);
        if report.added == 0 {
            debug!("Nothing new; leaving file untouched");
            return Ok(report);
        }
        write_json_atomic(path, &merged)?;
        report.written = true;
        info!(
            existing = report.existing,
            added = report.added,
            duplicates = report.duplicates,
            total = merged.len(),
            "Merged collection"
        );
        Ok(report)
    }
}

/// Union of `existing` and `batch` by key.
///
/// Existing rows are kept as they are and in their order; rows of `batch`
/// whose key is new are appended in batch order. Duplicate keys inside the
/// batch keep only their first occurrence.
pub fn merge<T: Keyed>(existing: Vec<T>, batch: Vec<T>) -> (Vec<T>, MergeReport) {
    let mut seen: HashSet<_> = existing.iter().map(Keyed::key).collect();
    let mut report = MergeReport {
        existing: existing.len(),
        ..MergeReport::default()
    };
    let mut merged = existing;
    for row in batch {
        if seen.insert(row.key()) {
            merged.push(row);
            report.added += 1;
        } else {
            report.duplicates += 1;
        }
    }
    (merged, report)
}

/// Read a collection; a missing file is an empty collection.
pub fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Write `bytes` to a sibling temporary file, sync it, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| PersistenceError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PersistenceError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}
