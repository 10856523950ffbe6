//! Content-addressed translation cache with a load/flush lifecycle.
//!
//! Entries are keyed by [`content_hash`] of `(source text, target language)`
//! and are write-once: the first confirmed translation of a text wins and is
//! never replaced. The cache is loaded from disk when the process starts and
//! flushed (atomically, sorted by hash) when a run ends.

use crate::error::CacheError;
use crate::models::TranslationCacheEntry;
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

const FORMAT_VERSION: u32 = 1;

/// Deterministic key for a text in a target language.
pub fn content_hash(text: &str, target_lang: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target_lang.trim().to_ascii_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<TranslationCacheEntry>,
}

#[derive(Debug, Default)]
pub struct TranslationCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, TranslationCacheEntry>>,
    dirty: AtomicBool,
}

impl TranslationCache {
    /// A cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty cache; an unreadable or
    /// corrupt file is an error so it is never silently overwritten.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => {
                let file: CacheFile =
                    serde_json::from_str(&text).map_err(|source| CacheError::Decode {
                        path: path.display().to_string(),
                        source,
                    })?;
                if file.version != FORMAT_VERSION {
                    warn!(version = file.version, "Unknown cache format version; loading anyway");
                }
                file.entries
                    .into_iter()
                    .map(|e| (e.content_hash.clone(), e))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No translation cache yet; starting empty");
                HashMap::new()
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        info!(entries = entries.len(), "Loaded translation cache");
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn get(&self, hash: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(hash).map(|e| e.translated_text.clone())
    }

    /// Insert unless the key already exists. Returns whether it was added.
    pub fn insert(&self, entry: TranslationCacheEntry) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        if entries.contains_key(&entry.content_hash) {
            return false;
        }
        entries.insert(entry.content_hash.clone(), entry);
        self.dirty.store(true, Ordering::SeqCst);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist new entries. A no-op for in-memory caches and clean caches.
    #[instrument(level = "info", skip_all)]
    pub fn flush(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }

        let sorted: BTreeMap<String, TranslationCacheEntry> = {
            let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let file = CacheFile {
            version: FORMAT_VERSION,
            entries: sorted.into_values().collect(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| CacheError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        write_atomic(path, &json).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.dirty.store(false, Ordering::SeqCst);
        info!(path = %path.display(), entries = file.entries.len(), "Flushed translation cache");
        Ok(())
    }
}
