//! On-disk result cache for single-shot runs

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

const KEY_VERSION: &str = "v1";
const CACHE_SUBDIR: &str = "ocr_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    payload: Value,
    created_at: DateTime<Utc>,
}

/// JSON file per key under `<base>/ocr_cache`
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

/// Hex sha256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&data)))
}

impl ResultCache {
    /// Open (and create) the cache under `base`. A TTL of 0 hours, or one too
    /// large to represent, never expires.
    pub fn open(base: &Path, ttl_hours: u64) -> Result<Self> {
        let dir = base.join(CACHE_SUBDIR);
        std::fs::create_dir_all(&dir)?;
        let ttl = match ttl_hours {
            0 => None,
            hours => i64::try_from(hours).ok().and_then(Duration::try_hours),
        };
        Ok(Self { dir, ttl })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `sha256("v1|kind|engine|file_sha|args")`, hex encoded.
    ///
    /// Blank args are skipped; the rest are trimmed and space-joined.
    pub fn key(kind: &str, engine: &str, file_sha: &str, args: &[String]) -> String {
        let args = args
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let raw = [KEY_VERSION, kind.trim(), engine.trim(), file_sha.trim(), args.as_str()].join("|");
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached payload for `key`. Expired and unreadable entries are misses;
    /// expired ones are deleted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        let data = std::fs::read(&path).ok()?;
        let entry: CacheEntry = serde_json::from_slice(&data).ok()?;

        if let Some(ttl) = self.ttl {
            if Utc::now() - entry.created_at > ttl {
                debug!(key, "Cache entry expired");
                let _ = std::fs::remove_file(&path);
                return None;
            }
        }
        if payload_text_is_blank(&entry.payload) {
            return None;
        }
        Some(entry.payload)
    }

    /// Store `payload`. Payloads with blank `text` are not cached.
    pub fn put(&self, key: &str, payload: &Value) -> Result<bool> {
        if key.trim().is_empty() || payload_text_is_blank(payload) {
            return Ok(false);
        }
        let entry = CacheEntry {
            payload: payload.clone(),
            created_at: Utc::now(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&serde_json::to_vec(&entry)?)?;
        if let Err(e) = tmp.persist(self.entry_path(key)) {
            warn!(key, error = %e, "Failed to persist cache entry");
            return Ok(false);
        }
        Ok(true)
    }
}

fn payload_text_is_blank(payload: &Value) -> bool {
    payload
        .get("text")
        .and_then(Value::as_str)
        .map_or(true, |t| t.trim().is_empty())
}
