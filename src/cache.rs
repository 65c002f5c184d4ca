//! TTL-gated fetch-or-reuse cache for remote catalog and metadata text.
//!
//! Each provider namespaces its own files under the host's cache directory,
//! so two providers never collide on a cache path. Within a process, at most
//! one download is in flight per distinct `(url, cache_file)` pair; late
//! arrivals join the winner's result by re-checking freshness under the
//! per-key lock instead of issuing a duplicate request.

use crate::error::{EngineError, Error};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP-backed cache service.
#[derive(Clone)]
pub struct CacheService {
    client: reqwest::Client,
    // One async mutex per (url, cache_file) key; holders serialize fetches.
    in_flight: Arc<std::sync::Mutex<HashMap<(String, PathBuf), Arc<tokio::sync::Mutex<()>>>>>,
}

impl CacheService {
    pub fn new() -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("librestore/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            in_flight: Arc::new(std::sync::Mutex::new(HashMap::new())),
        })
    }

    /// Return the cached text when `cache_file` is younger than `ttl`,
    /// otherwise download `url`, atomically refresh the cache file, and
    /// return the downloaded text.
    ///
    /// On download failure the error is `DownloadFailed` and any pre-existing
    /// cache file is left untouched; a stale-but-present cache beats no cache
    /// on the next attempt a caller makes with a longer TTL.
    pub async fn fetch(
        &self,
        url: &str,
        cache_file: &Path,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        if let Some(text) = read_if_fresh(cache_file, ttl) {
            return Ok(text);
        }

        let key = (url.to_string(), cache_file.to_path_buf());
        let gate = {
            let mut map = self
                .in_flight
                .lock()
                .expect("cache in-flight table poisoned");
            map.entry(key).or_default().clone()
        };
        let _guard = gate.lock().await;

        // Another caller may have populated the cache while we waited.
        if let Some(text) = read_if_fresh(cache_file, ttl) {
            return Ok(text);
        }
        if cancel.is_cancelled() {
            return Err(Error::download_failed(url));
        }

        let text = self.download_text(url).await.map_err(|e| {
            tracing::warn!("download of {} failed: {}", url, e);
            Error::download_failed(url)
        })?;

        if let Err(e) = write_atomically(cache_file, text.as_bytes()).await {
            // A cache miss next time is acceptable; the fetch itself worked.
            tracing::warn!("failed to cache {}: {}", cache_file.display(), e);
        }

        Ok(text)
    }

    async fn download_text(&self, url: &str) -> Result<String, EngineError> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Download raw bytes without touching the cache. Used for library file
    /// content, which is written straight into the working directory.
    pub async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        let result: Result<Vec<u8>, EngineError> = async {
            let response = self.client.get(url).send().await?;
            let response = response.error_for_status()?;
            Ok(response.bytes().await?.to_vec())
        }
        .await;
        result.map_err(|e| {
            tracing::warn!("download of {} failed: {}", url, e);
            Error::download_failed(url)
        })
    }
}

/// Read the cache file's contents when its mtime is within `ttl` of now.
fn read_if_fresh(cache_file: &Path, ttl: Duration) -> Option<String> {
    let metadata = std::fs::metadata(cache_file).ok()?;
    let modified = metadata.modified().ok()?;
    let age = SystemTime::now().duration_since(modified).ok()?;
    if age < ttl {
        std::fs::read_to_string(cache_file).ok()
    } else {
        None
    }
}

/// Write through a sibling temp file and rename, so a failed write can never
/// leave a truncated cache file behind.
async fn write_atomically(cache_file: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let parent = cache_file
        .parent()
        .ok_or_else(|| EngineError::Path(format!("{} has no parent", cache_file.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let temp = cache_file.with_extension("tmp");
    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, cache_file).await?;
    Ok(())
}

/// Deterministic cache file name for an arbitrary URL.
pub fn url_cache_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hasher.finalize();
    // First 16 bytes keep the name short without realistic collisions
    format!("{}.json", hex::encode(&hash[..16]))
}
