//! In-memory cache of completed definitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::credentials::ProviderId;
use crate::definition::Language;

/// A topic is cached separately per language and answering provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub topic: String,
    pub language: Language,
    /// `None` when the encyclopedia fallback answers.
    pub provider: Option<ProviderId>,
}

impl CacheKey {
    pub fn new(
        topic: impl Into<String>,
        language: Language,
        provider: impl Into<Option<ProviderId>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            language,
            provider: provider.into(),
        }
    }

    /// Provider tag for logs.
    pub fn source(&self) -> &'static str {
        self.provider.map_or("wiki", ProviderId::tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub text: String,
    /// How long the original lookup took.
    pub elapsed: Duration,
}

/// Process-lifetime cache, shared by clones.
///
/// Entries never expire; only [`ResponseCache::invalidate`] and
/// [`ResponseCache::clear`] remove them.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries().get(key).cloned()
    }

    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        tracing::debug!(topic = %key.topic, provider = key.source(), "caching definition");
        self.entries().insert(key, entry);
    }

    /// Removes one entry; a missing key is not an error.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
