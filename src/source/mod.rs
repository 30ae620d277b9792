//! Segment Source
//!
//! Turns a segment's audio reference into a decoded buffer, once per
//! segment per session.

mod fetch;
mod soundscape;

pub use fetch::{AudioFetcher, DefaultFetcher, FetchFuture, MemoryFetcher};
pub use soundscape::{DirectorySoundscapes, SoundscapeStore};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::engine::{decode_wav, AudioBuffer};
use crate::error::{Result, ReverieError};
use crate::segment::Segment;

/// Fetches, decodes and caches segment audio
pub struct SegmentSource {
    fetcher: Arc<dyn AudioFetcher>,
    cache: Mutex<HashMap<String, Arc<AudioBuffer>>>,
}

impl SegmentSource {
    pub fn new(fetcher: Arc<dyn AudioFetcher>) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decoded audio for `segment`, from cache when already decoded
    ///
    /// # Errors
    /// * `Fetch` - The reference could not be retrieved
    /// * `Decode` - The bytes are not valid audio
    pub async fn fetch_and_decode(&self, segment: &Segment) -> Result<Arc<AudioBuffer>> {
        if let Some(buffer) = self.cached(&segment.id) {
            debug!(segment = %segment.id, "segment audio served from cache");
            return Ok(buffer);
        }

        let bytes = self.fetcher.fetch(&segment.audio_reference).await?;
        let buffer = decode_bytes(bytes).await?;

        debug!(
            segment = %segment.id,
            duration = buffer.duration_secs(),
            "segment audio decoded"
        );
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(segment.id.clone(), Arc::clone(&buffer));
        }
        Ok(buffer)
    }

    pub fn cached(&self, segment_id: &str) -> Option<Arc<AudioBuffer>> {
        self.cache.lock().ok()?.get(segment_id).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

/// Decode off the control task; long recordings take a while
pub(crate) async fn decode_bytes(bytes: Vec<u8>) -> Result<Arc<AudioBuffer>> {
    tokio::task::spawn_blocking(move || decode_wav(&bytes))
        .await
        .map_err(|e| ReverieError::decode(format!("decoder task failed: {}", e)))?
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{encode_wav, ChannelLayout};
    use approx::assert_relative_eq;

    fn wav(seconds: f64) -> Vec<u8> {
        let n = (seconds * 8000.0) as usize;
        let mut buffer = AudioBuffer::new(n, ChannelLayout::Mono, 8000);
        buffer.channel_mut(0).fill(0.25);
        encode_wav(&buffer).unwrap()
    }

    fn source_with(entries: &[(&str, Vec<u8>)]) -> (Arc<MemoryFetcher>, SegmentSource) {
        let fetcher = Arc::new(MemoryFetcher::new());
        for (reference, bytes) in entries {
            fetcher.insert(*reference, bytes.clone());
        }
        let source = SegmentSource::new(fetcher.clone());
        (fetcher, source)
    }

    #[tokio::test]
    async fn test_decodes_real_duration() {
        let (_fetcher, source) = source_with(&[("a.wav", wav(1.5))]);
        let segment = Segment::new("a.wav", "").with_estimated_duration(9.0);
        let buffer = source.fetch_and_decode(&segment).await.unwrap();
        assert_relative_eq!(buffer.duration_secs(), 1.5);
    }

    #[tokio::test]
    async fn test_second_request_uses_cache() {
        let (fetcher, source) = source_with(&[("a.wav", wav(0.5))]);
        let segment = Segment::new("a.wav", "");
        source.fetch_and_decode(&segment).await.unwrap();
        source.fetch_and_decode(&segment).await.unwrap();
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(source.cache_len(), 1);

        source.clear_cache();
        source.fetch_and_decode(&segment).await.unwrap();
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_is_fetch_error() {
        let (_fetcher, source) = source_with(&[]);
        let err = source
            .fetch_and_decode(&Segment::new("gone.wav", ""))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FETCH_ERROR");
        assert_eq!(source.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_bytes_is_decode_error() {
        let (_fetcher, source) = source_with(&[("bad.wav", b"not audio at all".to_vec())]);
        let err = source
            .fetch_and_decode(&Segment::new("bad.wav", ""))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
        assert!(err.is_recoverable());
    }
}
