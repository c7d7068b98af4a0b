//! File-backed cache: one JSON file per key.
//!
//! Writes go to a temporary file that is then renamed over the target, so a
//! reader never observes a half-written log.

use crate::core::{KeyValueCache, Result, SyncError};
use async_trait::async_trait;
use peerchat_common::sanitize_segment;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!("JSON cache initialized at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage path for a key
    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_segment(key)))
    }
}

#[async_trait]
impl KeyValueCache for JsonFileCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::CacheRead(format!("{}: {}", key, e))),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.key_path(key);
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, value)
            .await
            .map_err(|e| SyncError::CacheWrite(format!("{}: {}", key, e)))?;

        // Atomic rename
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| SyncError::CacheWrite(format!("{}: {}", key, e)))?;

        debug!("Cached {} at {:?}", key, path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::CacheWrite(format!("{}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(temp_dir.path().join("cache")).await.unwrap();

        cache.set("u1_u2", "[]".into()).await.unwrap();
        assert_eq!(cache.get("u1_u2").await.unwrap().as_deref(), Some("[]"));
        assert!(temp_dir.path().join("cache").join("u1_u2.json").exists());
        assert!(!temp_dir.path().join("cache").join("u1_u2.tmp").exists());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = JsonFileCache::new(temp_dir.path()).await.unwrap();
            cache.set("a_b", "[1]".into()).await.unwrap();
        }

        let cache = JsonFileCache::new(temp_dir.path()).await.unwrap();
        assert_eq!(cache.get("a_b").await.unwrap().as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn test_missing_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(temp_dir.path()).await.unwrap();

        assert_eq!(cache.get("nope").await.unwrap(), None);
        cache.remove("nope").await.unwrap();

        cache.set("k", "v".into()).await.unwrap();
        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("cache");
        let cache = JsonFileCache::new(&dir).await.unwrap();

        cache.set("../outside", "x".into()).await.unwrap();
        assert!(!temp_dir.path().join("outside.json").exists());
        assert_eq!(cache.get("../outside").await.unwrap().as_deref(), Some("x"));
    }
}
