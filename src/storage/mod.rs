//! # Storage Module - persisted key/value settings
//!
//! Small string settings that must survive a reboot (the WiFi credentials) are
//! kept in one JSON object file:
//!
//! ```text
//! data/
//! └── config.json   ← {"WiFiSSid": "...", "WiFiPsw": "..."}
//! ```
//!
//! The file is read once at boot. Every `set`/`remove` rewrites it before the
//! in-memory map changes: the destination is locked with `fs2`, the new content
//! goes to a temp file in the same directory, and the temp file is renamed over
//! the destination.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lorachat::storage::{KvStore, KEY_WIFI_SSID};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = KvStore::open("./data")?;
//!     store.set(KEY_WIFI_SSID, "meshlab")?;
//!     assert_eq!(store.get(KEY_WIFI_SSID).as_deref(), Some("meshlab"));
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

pub const KEY_WIFI_SSID: &str = "WiFiSSid";
pub const KEY_WIFI_PASSWORD: &str = "WiFiPsw";

const STORE_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted string map. In-memory only when created with [`KvStore::in_memory`].
#[derive(Debug)]
pub struct KvStore {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, String>>,
}

impl KvStore {
    /// Open (or create) the store under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(STORE_FILE);
        let values = match fs::read_to_string(&path) {
            Ok(content) => {
                // Guard against leading NULs left by an interrupted write
                let cleaned = content.trim_start_matches('\0');
                if cleaned.trim().is_empty() {
                    BTreeMap::new()
                } else {
                    serde_json::from_str(cleaned).map_err(|source| StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        log::debug!("key/value store {} loaded ({} keys)", path.display(), values.len());
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.values.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Memory only changes once the new content is on disk.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(values).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_file_locked(path, &content).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }
}

/// Lock the destination, write a temp sibling, rename it over the destination.
fn write_file_locked(path: &Path, content: &str) -> std::io::Result<()> {
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    lock_file.lock_exclusive()?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or(STORE_FILE);
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                if let Err(e) = tmp.write_all(content.as_bytes()).and_then(|()| tmp.flush()) {
                    let _ = fs::remove_file(&candidate);
                    return Err(e);
                }
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    };

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    drop(lock_file);
    Ok(())
}
