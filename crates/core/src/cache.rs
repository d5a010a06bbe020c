//! Persistent build cache.
//!
//! Maps target names to the fingerprint of their last successful build.
//! The manifest lives at `<cache_dir>/manifest.json` and is written
//! atomically (temp file + rename) on [`Cache::save`] and on drop when
//! dirty. Loading is lossy-tolerant: a manifest that cannot be read or
//! parsed degrades to an empty cache, and individual malformed entries
//! are skipped, because a cold cache is always a correct starting point.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default cache directory name, relative to the project root.
pub const CACHE_DIR: &str = ".iris-cache";

const MANIFEST_FILENAME: &str = "manifest.json";

/// One cached build record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub target: String,
  pub input_hash: String,
  pub command_hash: String,
  /// Wall-clock seconds at store time.
  pub timestamp: u64,
  pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cannot write cache manifest {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestDoc {
  entries: Vec<serde_json::Value>,
}

/// The on-disk cache of target fingerprints.
#[derive(Debug)]
pub struct Cache {
  dir: PathBuf,
  entries: HashMap<String, CacheEntry>,
  dirty: bool,
}

impl Cache {
  /// Open the cache rooted at `dir`, loading the manifest when present.
  pub fn open(dir: impl Into<PathBuf>) -> Self {
    let dir = dir.into();
    let entries = load_manifest(&dir.join(MANIFEST_FILENAME));
    Self {
      dir,
      entries,
      dirty: false,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// True iff the stored fingerprint matches and every recorded output
  /// still exists on disk.
  pub fn is_up_to_date(&self, target: &str, input_hash: &str, command_hash: &str) -> bool {
    let Some(entry) = self.entries.get(target) else {
      return false;
    };
    if entry.input_hash != input_hash || entry.command_hash != command_hash {
      return false;
    }
    entry.outputs.iter().all(|output| output.exists())
  }

  /// Record a successful build, replacing any previous entry.
  pub fn store(&mut self, target: &str, input_hash: &str, command_hash: &str, outputs: Vec<PathBuf>) {
    let timestamp = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or(0);

    self.entries.insert(
      target.to_string(),
      CacheEntry {
        target: target.to_string(),
        input_hash: input_hash.to_string(),
        command_hash: command_hash.to_string(),
        timestamp,
        outputs,
      },
    );
    self.dirty = true;
  }

  pub fn get(&self, target: &str) -> Option<&CacheEntry> {
    self.entries.get(target)
  }

  pub fn invalidate(&mut self, target: &str) {
    if self.entries.remove(target).is_some() {
      self.dirty = true;
    }
  }

  pub fn clear(&mut self) {
    if !self.entries.is_empty() {
      self.entries.clear();
    }
    self.dirty = true;
  }

  /// Write the manifest if anything changed since load.
  pub fn save(&mut self) -> Result<(), CacheError> {
    if !self.dirty {
      return Ok(());
    }

    let path = self.dir.join(MANIFEST_FILENAME);
    let write_err = |source| CacheError::Write {
      path: path.clone(),
      source,
    };

    fs::create_dir_all(&self.dir).map_err(write_err)?;

    let mut records: Vec<&CacheEntry> = self.entries.values().collect();
    records.sort_by(|a, b| a.target.cmp(&b.target));
    let doc = serde_json::json!({ "entries": records });
    let json = serde_json::to_string_pretty(&doc).expect("cache serialization is infallible");

    // Write-then-rename keeps a crash from truncating the manifest.
    let tmp = self.dir.join(format!("{MANIFEST_FILENAME}.tmp"));
    fs::write(&tmp, json).map_err(write_err)?;
    fs::rename(&tmp, &path).map_err(write_err)?;

    self.dirty = false;
    debug!(path = %path.display(), entries = self.entries.len(), "cache manifest written");
    Ok(())
  }
}

impl Drop for Cache {
  fn drop(&mut self) {
    if self.dirty {
      if let Err(e) = self.save() {
        warn!(error = %e, "failed to persist cache manifest");
      }
    }
  }
}

fn load_manifest(path: &Path) -> HashMap<String, CacheEntry> {
  let data = match fs::read_to_string(path) {
    Ok(data) => data,
    Err(_) => return HashMap::new(),
  };

  let doc: ManifestDoc = match serde_json::from_str(&data) {
    Ok(doc) => doc,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "unreadable cache manifest, starting empty");
      return HashMap::new();
    }
  };

  let mut entries = HashMap::new();
  for value in doc.entries {
    match serde_json::from_value::<CacheEntry>(value) {
      Ok(entry) => {
        entries.insert(entry.target.clone(), entry);
      }
      Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed cache entry"),
    }
  }
  entries
}
