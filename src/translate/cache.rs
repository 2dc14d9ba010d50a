use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    translation: String,
    timestamp: u64,
}

/// Persistent, advisory translation cache keyed by `(provider_tag, text_hash)`
/// (spec §4.6 "Caching"). Not a correctness requirement: a missing or
/// corrupt cache file degrades to "always miss", never an error.
///
/// `text_hash` uses `std::hash::Hasher` rather than a cryptographic hash
/// (spec §4.6 "Cache hashing (supplemented)") — a cache key has no security
/// requirement, and the source implementation makes the same tradeoff with
/// a standard-library hash.
pub struct TranslationCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

impl TranslationCache {
    pub fn load(cache_dir: &Path) -> Self {
        let path = cache_dir.join("translation_cache.json");
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str::<HashMap<String, CacheEntry>>(&contents).ok())
            .map(|loaded| evict_to_newest(loaded, MAX_ENTRIES))
            .unwrap_or_default();

        Self { path, entries, dirty: false }
    }

    pub fn key(provider_tag: &str, text: &str) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        format!("{provider_tag}:{:x}", hasher.finish())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.translation.as_str())
    }

    pub fn put(&mut self, key: String, translation: String, now_unix_secs: u64) {
        self.entries.insert(key, CacheEntry { translation, timestamp: now_unix_secs });
        self.dirty = true;
    }

    /// Save on worker completion (spec §4.6 "Caching"). Atomic write via a
    /// temp file + rename so a crash mid-write never corrupts the cache.
    pub fn save(&mut self) -> std::io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let trimmed = evict_to_newest(self.entries.clone(), MAX_ENTRIES);
        let contents = serde_json::to_string_pretty(&trimmed)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, &self.path)?;

        self.entries = trimmed;
        self.dirty = false;
        Ok(())
    }
}

fn evict_to_newest(
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
) -> HashMap<String, CacheEntry> {
    if entries.len() <= max_entries {
        return entries;
    }
    let mut sorted: Vec<_> = entries.into_iter().collect();
    sorted.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
    sorted.into_iter().take(max_entries).collect()
}
