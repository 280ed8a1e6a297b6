// src/dedup.rs
//! Durable fingerprint set behind the at-most-once alerting guarantee.
//!
//! Marks are written through to a JSON snapshot (tmp + rename) so a crash
//! after `mark_known` but before dispatch drops the opportunity instead of
//! repeating it on restart. Capacity-bounded: exceeding `capacity` compacts
//! the set down to half, oldest entries first.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use metrics::gauge;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[allow(dead_code)]
    updated_at: i64,
    /// fingerprint -> last_seen unix seconds
    fingerprints: HashMap<String, i64>,
}

/// Borrowed view for writes, so marking never clones the full set.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    updated_at: i64,
    fingerprints: &'a HashMap<String, i64>,
}

struct Inner {
    seen: HashMap<String, i64>,
    /// Insertion order, oldest first. Rebuilt from timestamps on load.
    order: VecDeque<String>,
}

pub struct DedupStore {
    path: PathBuf,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl DedupStore {
    /// Opens the store at `path`, loading any existing snapshot. A missing
    /// file starts empty; an unreadable one is logged loudly and dropped
    /// rather than blocking startup.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let seen = match load_snapshot(&path) {
            Ok(map) => map,
            Err(err) => {
                tracing::error!(target: "dedup", error = %err, "snapshot load failed, starting empty");
                HashMap::new()
            }
        };
        let mut order: Vec<(String, i64)> = seen.iter().map(|(k, v)| (k.clone(), *v)).collect();
        order.sort_by_key(|(_, ts)| *ts);
        let order: VecDeque<String> = order.into_iter().map(|(k, _)| k).collect();
        tracing::info!(target: "dedup", entries = order.len(), path = %path.display(), "dedup store opened");
        Self {
            path,
            capacity: capacity.max(2),
            inner: Mutex::new(Inner { seen, order }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_known(&self, fingerprint: &str) -> bool {
        self.lock().seen.contains_key(fingerprint)
    }

    /// Records the fingerprint and writes the snapshot through to disk.
    /// The in-memory set is updated even when the write fails, so dedup
    /// keeps working for the rest of the run.
    pub fn mark_known(&self, fingerprint: &str) -> Result<(), PersistenceError> {
        self.mark_known_at(fingerprint, chrono::Utc::now().timestamp())
    }

    pub fn mark_known_at(&self, fingerprint: &str, now_unix: i64) -> Result<(), PersistenceError> {
        let body = {
            let mut inner = self.lock();
            if inner.seen.insert(fingerprint.to_string(), now_unix).is_none() {
                inner.order.push_back(fingerprint.to_string());
            }
            if inner.order.len() > self.capacity {
                let keep = self.capacity / 2;
                while inner.order.len() > keep {
                    if let Some(old) = inner.order.pop_front() {
                        inner.seen.remove(&old);
                    }
                }
                tracing::info!(target: "dedup", kept = keep, "compacted fingerprint set");
            }
            gauge!("dedup_entries").set(inner.order.len() as f64);
            encode_snapshot(&self.path, now_unix, &inner.seen)?
        };
        write_snapshot(&self.path, &body)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full rewrite, used at shutdown.
    pub fn persist(&self) -> Result<(), PersistenceError> {
        let body = {
            let inner = self.lock();
            encode_snapshot(&self.path, chrono::Utc::now().timestamp(), &inner.seen)?
        };
        write_snapshot(&self.path, &body)
    }
}

fn load_snapshot(path: &Path) -> Result<HashMap<String, i64>, PersistenceError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parsed: SnapshotFile =
        serde_json::from_str(&raw).map_err(|source| PersistenceError::Decode {
            path: path.display().to_string(),
            source,
        })?;
    Ok(parsed.fingerprints)
}

fn encode_snapshot(
    path: &Path,
    updated_at: i64,
    fingerprints: &HashMap<String, i64>,
) -> Result<String, PersistenceError> {
    serde_json::to_string(&SnapshotRef {
        updated_at,
        fingerprints,
    })
    .map_err(|source| PersistenceError::Encode {
        path: path.display().to_string(),
        source,
    })
}

fn write_snapshot(path: &Path, body: &str) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).map_err(|source| PersistenceError::Io {
        path: tmp.display().to_string(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    })
}
