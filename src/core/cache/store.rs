//! In-memory cache of synthesized prompt audio.
//!
//! Menu prompts and hold announcements repeat across calls, so synthesized
//! audio is kept in a Moka cache keyed by an xxHash of voice, sample rate and
//! text. Concurrent misses for the same key share one synthesis request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_128;

use crate::core::speech::{SpeechError, SpeechService};

/// Cache configuration options.
#[derive(Debug, Clone, Copy)]
pub struct PromptCacheConfig {
    pub max_entries: u64,
    pub ttl: Duration,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            ttl: Duration::from_secs(86_400),
        }
    }
}

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheMetrics {
    /// Returns current statistics as a tuple (hits, misses).
    pub fn get_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// Hashes voice, sample rate and text into a cache key.
pub fn prompt_key(voice: &str, sample_rate: u32, text: &str) -> u128 {
    let material = format!("{voice}\u{1f}{sample_rate}\u{1f}{text}");
    xxh3_128(material.as_bytes())
}

pub struct PromptCache {
    cache: MokaCache<u128, Arc<Vec<i16>>>,
    metrics: CacheMetrics,
}

impl PromptCache {
    pub fn new(config: PromptCacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self {
            cache,
            metrics: CacheMetrics::default(),
        }
    }

    /// Cached audio for `text`, synthesizing it on a miss.
    ///
    /// Failed synthesis is not cached.
    pub async fn get_or_synthesize(
        &self,
        speech: &dyn SpeechService,
        text: &str,
    ) -> Result<Arc<Vec<i16>>, SpeechError> {
        let key = prompt_key(speech.voice(), speech.sample_rate(), text);
        if let Some(audio) = self.cache.get(&key).await {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(audio);
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);

        self.cache
            .try_get_with(key, async {
                let samples = speech.synthesize(text).await?;
                debug!(samples = samples.len(), "Caching synthesized prompt");
                Ok::<_, SpeechError>(Arc::new(samples))
            })
            .await
            .map_err(|err: Arc<SpeechError>| (*err).clone())
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
