//! Speech cache
//!
//! Wraps any [`SpeechService`] with a time-expiring, size-bounded cache keyed
//! by normalized text. One instance is built per application and injected
//! wherever speech is needed.

use crate::error::Result;
use crate::services::speech::{SpeechClip, SpeechService};
use async_trait::async_trait;
use polaris_common::config::SpeechCacheConfig;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry {
    clip: SpeechClip,
    inserted: Instant,
}

pub struct CachedSpeech<S> {
    inner: S,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Cache key: surrounding whitespace and letter case do not change the speech
pub fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}

impl<S: SpeechService> CachedSpeech<S> {
    pub fn new(inner: S, config: &SpeechCacheConfig) -> Self {
        Self {
            inner,
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &str) -> Option<SpeechClip> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(SpeechClip {
                cache_hit: true,
                ..entry.clip.clone()
            }),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, clip: &SpeechClip) {
        let mut entries = self.lock();
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted.elapsed() < ttl);

        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            CacheEntry {
                clip: clip.clone(),
                inserted: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl<S: SpeechService> SpeechService for CachedSpeech<S> {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip> {
        let key = cache_key(text);
        if let Some(clip) = self.lookup(&key) {
            debug!("Speech cache hit");
            return Ok(clip);
        }

        let clip = self.inner.synthesize(text).await?;
        self.store(key, &clip);
        Ok(SpeechClip {
            cache_hit: false,
            ..clip
        })
    }
}
