// Append-only record log backing one partition of a collection.
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use fs2::FileExt;
use serde_json::Value;

use crate::core::error::{Error, ErrorKind, io_error_kind};

pub const CLUSTER_EXTENSION: &str = "dat";

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterEntry {
    pub key: Option<String>,
    pub record: Value,
}

/// Replayed content of a cluster file.
///
/// Keyed entries are last-write-wins: a later line with the same key replaces the
/// earlier record but keeps the position where the key first appeared. Keyless
/// entries are never merged; every one of them is kept in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterData {
    entries: Vec<ClusterEntry>,
    keyed: HashMap<String, usize>,
}

impl ClusterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, key: Option<String>, record: Value) {
        match key {
            Some(key) => match self.keyed.get(&key) {
                Some(&position) => self.entries[position].record = record,
                None => {
                    self.keyed.insert(key.clone(), self.entries.len());
                    self.entries.push(ClusterEntry {
                        key: Some(key),
                        record,
                    });
                }
            },
            None => self.entries.push(ClusterEntry { key: None, record }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClusterEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keyed
            .get(key)
            .map(|&position| &self.entries[position].record)
    }

    /// Entries whose key lies in `start..=end` under plain string ordering.
    ///
    /// Keys are compared as text, never as numbers or dates: `"2023-2-1"` sorts
    /// after `"2023-10-1"`. Keyless entries never match.
    pub fn range<'a>(
        &'a self,
        start: &'a str,
        end: &'a str,
    ) -> impl Iterator<Item = &'a ClusterEntry> + 'a {
        self.entries.iter().filter(move |entry| {
            entry
                .key
                .as_deref()
                .is_some_and(|key| start <= key && key <= end)
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

struct CachedLoad {
    fingerprint: Fingerprint,
    data: Arc<ClusterData>,
}

#[derive(Clone)]
pub struct Cluster {
    path: PathBuf,
    cache: Option<Arc<Mutex<Option<CachedLoad>>>>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("path", &self.path)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl Cluster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: None,
        }
    }

    /// A cluster that keeps its last decoded content in memory and reuses it
    /// while the file's length and modification time are unchanged.
    pub fn with_cache(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Some(Arc::new(Mutex::new(None))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn touch(&self) -> Result<(), Error> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| Error::io(err, &self.path))?;
        Ok(())
    }

    pub fn delete(&self) -> Result<(), Error> {
        self.invalidate();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(err, &self.path)),
        }
    }

    /// Appends one `[key, record]` line with a single write.
    pub fn append(&self, key: Option<&str>, record: &Value) -> Result<(), Error> {
        let mut line = serde_json::to_string(&(key, record)).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode record")
                .with_path(&self.path)
                .with_source(err)
        })?;
        line.push('\n');

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| Error::io(err, &self.path))?;
        let _lock = AppendLock::acquire(&file, &self.path)?;
        (&file)
            .write_all(line.as_bytes())
            .map_err(|err| Error::io(err, &self.path))?;
        self.invalidate();
        Ok(())
    }

    /// Replays the whole file. A missing file reads as an empty cluster.
    pub fn load_all(&self) -> Result<Arc<ClusterData>, Error> {
        let Some(cache) = &self.cache else {
            return self.read_file().map(|(data, _)| Arc::new(data));
        };

        let mut slot = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.fingerprint()?;
        if let (Some(cached), Some(fingerprint)) = (slot.as_ref(), current) {
            if cached.fingerprint == fingerprint {
                tracing::trace!(path = %self.path.display(), "cluster cache hit");
                return Ok(Arc::clone(&cached.data));
            }
        }

        tracing::debug!(path = %self.path.display(), "loading cluster");
        let (data, fingerprint) = self.read_file()?;
        let data = Arc::new(data);
        *slot = fingerprint.map(|fingerprint| CachedLoad {
            fingerprint,
            data: Arc::clone(&data),
        });
        Ok(data)
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            let mut slot = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = None;
        }
    }

    fn fingerprint(&self) -> Result<Option<Fingerprint>, Error> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(Fingerprint {
                len: meta.len(),
                modified: meta.modified().ok(),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(err, &self.path)),
        }
    }

    fn read_file(&self) -> Result<(ClusterData, Option<Fingerprint>), Error> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok((ClusterData::new(), None));
            }
            Err(err) => return Err(Error::io(err, &self.path)),
        };
        let meta = file.metadata().map_err(|err| Error::io(err, &self.path))?;
        let fingerprint = Fingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        };

        let mut data = ClusterData::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index as u64 + 1;
            let line = line.map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("cluster file is not valid UTF-8 text")
                    .with_path(&self.path)
                    .with_line(line_no)
                    .with_source(err)
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let (key, record): (Option<String>, Value) =
                serde_json::from_str(&line).map_err(|err| {
                    Error::new(ErrorKind::Corrupt)
                        .with_message("invalid record line")
                        .with_hint("Clear the collection and ingest again.")
                        .with_path(&self.path)
                        .with_line(line_no)
                        .with_source(err)
                })?;
            data.apply(key, record);
        }
        Ok((data, Some(fingerprint)))
    }
}

struct AppendLock<'a> {
    file: &'a File,
}

impl<'a> AppendLock<'a> {
    fn acquire(file: &'a File, path: &Path) -> Result<Self, Error> {
        file.lock_exclusive().map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to lock cluster for append")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self { file })
    }
}

impl Drop for AppendLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}
