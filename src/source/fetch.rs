//! Audio Fetchers
//!
//! Resolve an audio reference to its encoded bytes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, ReverieError};

/// Boxed future yielding fetched bytes
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Retrieves encoded audio by reference
pub trait AudioFetcher: Send + Sync {
    fn fetch<'a>(&'a self, reference: &'a str) -> FetchFuture<'a>;
}

// ============================================================================
// Default Fetcher
// ============================================================================

/// Fetches `http(s)://` references over the network and everything else
/// (`file://` URLs, bare paths) from the local filesystem
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    #[cfg(feature = "http")]
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "http")]
            client: reqwest::Client::new(),
            timeout: None,
        }
    }

    /// Fail fetches that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn fetch_inner(&self, reference: &str) -> Result<Vec<u8>> {
        if is_remote(reference) {
            return self.fetch_remote(reference).await;
        }

        let path = reference.strip_prefix("file://").unwrap_or(reference);
        tokio::fs::read(path)
            .await
            .map_err(|e| ReverieError::fetch(reference, e))
    }

    #[cfg(feature = "http")]
    async fn fetch_remote(&self, reference: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReverieError::fetch(reference, e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReverieError::fetch(reference, e))?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "http"))]
    async fn fetch_remote(&self, reference: &str) -> Result<Vec<u8>> {
        Err(ReverieError::fetch(
            reference,
            "built without the `http` feature",
        ))
    }
}

impl AudioFetcher for DefaultFetcher {
    fn fetch<'a>(&'a self, reference: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            debug!(reference, "fetching audio");
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.fetch_inner(reference))
                    .await
                    .map_err(|_| ReverieError::fetch(reference, "timed out"))?,
                None => self.fetch_inner(reference).await,
            }
        })
    }
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

// ============================================================================
// Memory Fetcher
// ============================================================================

/// Serves bytes registered in memory, optionally after a delay
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    latency: Duration,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&self, reference: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(reference.into(), bytes);
        }
    }

    /// Number of fetches served or failed so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl AudioFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, reference: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.entries
                .lock()
                .ok()
                .and_then(|entries| entries.get(reference).cloned())
                .ok_or_else(|| ReverieError::fetch(reference, "not found"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_fetcher_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();

        let fetcher = DefaultFetcher::new();
        let plain = fetcher.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(plain, b"abc");

        let url = format!("file://{}", path.display());
        assert_eq!(fetcher.fetch(&url).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_default_fetcher_missing_file() {
        let err = DefaultFetcher::new()
            .fetch("/definitely/not/here.wav")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FETCH_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_fetcher_latency_and_count() {
        let fetcher = MemoryFetcher::new().with_latency(Duration::from_millis(300));
        fetcher.insert("a", vec![1, 2, 3]);

        let start = tokio::time::Instant::now();
        assert_eq!(fetcher.fetch("a").await.unwrap(), vec![1, 2, 3]);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(fetcher.fetch("missing").await.is_err());
        assert_eq!(fetcher.request_count(), 2);
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://cdn.example/a.wav"));
        assert!(!is_remote("file:///tmp/a.wav"));
        assert!(!is_remote("segments/a.wav"));
    }
}
