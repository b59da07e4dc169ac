//! On-disk content cache keyed by a hash of the page URL.
//!
//! Each cached page lives in `<dir>/<sha256-hex-of-url>.html`. An entry
//! counts only when the file exists and is non-empty; a zero-byte file is a
//! miss. Entries are never expired; [`ContentCache::evict`] is the only way
//! to force a re-fetch.
//!
//! Writes go to a uniquely named temporary file in the same directory which
//! is then renamed over the entry, so a concurrent reader sees either the
//! old entry, nothing, or the complete new body.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable cache key for a URL.
    pub fn key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    /// Path of the entry a URL would be stored under.
    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.html", Self::key(url)))
    }

    /// Return the cached body for `url`, or `None` on a miss.
    ///
    /// Missing files, zero-byte files and unreadable files are all misses;
    /// the last one is logged since it usually means a permissions problem.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn get(&self, url: &str) -> Option<String> {
        let path = self.entry_path(url);
        match fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => {
                debug!(path = %path.display(), "Empty cache entry; treating as miss");
                return None;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache entry unreadable");
                return None;
            }
        }

        match fs::read_to_string(&path).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry");
                None
            }
        }
    }

    /// Store `body` as the entry for `url`, replacing any existing entry.
    #[instrument(level = "debug", skip_all, fields(%url, bytes = body.len()))]
    pub async fn put(&self, url: &str, body: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.entry_path(url);
        let nonce: u64 = rand::rng().random();
        let tmp = self
            .dir
            .join(format!(".{}.{:016x}.tmp", Self::key(url), nonce));

        if let Err(e) = fs::write(&tmp, body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        debug!(path = %path.display(), "Cached content");
        Ok(())
    }

    /// Delete the entry for `url`. Returns `false` when there was none.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn evict(&self, url: &str) -> io::Result<bool> {
        match fs::remove_file(self.entry_path(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = ContentCache::key("https://site/news/1");
        assert_eq!(a, ContentCache::key("https://site/news/1"));
        assert_ne!(a, ContentCache::key("https://site/news/2"));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        cache.put("https://site/a", "<html>a</html>").await.unwrap();
        assert_eq!(
            cache.get("https://site/a").await.as_deref(),
            Some("<html>a</html>")
        );
        assert_eq!(cache.get("https://site/b").await, None);
    }

    #[tokio::test]
    async fn test_zero_size_entry_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        std::fs::write(cache.entry_path("https://site/a"), "").unwrap();
        assert_eq!(cache.get("https://site/a").await, None);
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path().join("nested"));
        cache.put("https://site/a", "one").await.unwrap();
        cache.put("https://site/a", "two").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(cache.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.html", ContentCache::key("https://site/a"))]);
        assert_eq!(cache.get("https://site/a").await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_same_url_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        let body = "x".repeat(64 * 1024);

        let writes = (0..8).map(|_| cache.put("https://site/same", &body));
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }
        assert_eq!(cache.get("https://site/same").await, Some(body));
    }

    #[tokio::test]
    async fn test_evict() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        cache.put("https://site/a", "body").await.unwrap();
        assert!(cache.evict("https://site/a").await.unwrap());
        assert!(!cache.evict("https://site/a").await.unwrap());
        assert_eq!(cache.get("https://site/a").await, None);
    }
}
