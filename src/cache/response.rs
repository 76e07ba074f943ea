//! Response cache with TTL expiry and insertion-order eviction.
//!
//! # Keying
//!
//! Keys are `"{method}:{sha256}"` where the digest covers every field of the
//! sanitized input (prompt, chat turns with their roles, image bytes and
//! mime type). Identical sanitized inputs therefore always map to the same
//! key, across processes and restarts.
//!
//! # Eviction
//!
//! Insertion order is tracked with a monotonically increasing sequence
//! number. When the cache is full, the entry with the lowest sequence number
//! is dropped before the new one is added. Re-inserting an existing key
//! moves it to the back of the order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::types::{GenerationInput, TokenCounts};

/// Configuration for the response cache.
///
/// ```rust
/// # use portunus::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(1_000)
///     .ttl(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Hard cap on stored entries. Default: 500.
    pub max_entries: usize,
    /// Age after which an entry is no longer served. Default: 15 minutes.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with the default cap and TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A stored response. Read-only once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub response: String,
    pub created_at: Instant,
    pub tokens: TokenCounts,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, (u64, CacheEntry)>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let (seq, entry) = self.entries.remove(key)?;
        self.order.remove(&seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key).map(|(_, entry)| entry)
    }
}

/// In-memory response cache shared by concurrent requests of one backend.
///
/// All operations take a short synchronous lock and never hold it across
/// an await point.
pub struct ResponseCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    /// Create an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry.
    ///
    /// An entry whose age has reached the TTL is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            Some((_, entry)) if entry.created_at.elapsed() < self.config.ttl => {
                return Some(entry.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.remove(key);
        }
        None
    }

    /// Store a response, evicting the oldest-inserted entry when full.
    pub fn insert(&self, key: impl Into<String>, response: impl Into<String>, tokens: TokenCounts) {
        if self.config.max_entries == 0 {
            return;
        }
        let key = key.into();
        let mut state = self.lock();
        state.remove(&key);
        while state.entries.len() >= self.config.max_entries {
            if state.evict_oldest().is_none() {
                break;
            }
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.clone());
        let entry = CacheEntry {
            key: key.clone(),
            response: response.into(),
            created_at: Instant::now(),
            tokens,
        };
        state.entries.insert(key, (seq, entry));
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.order.clear();
        removed
    }

    /// Number of stored entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Compute the deterministic cache key of a sanitized input.
pub fn cache_key(input: &GenerationInput) -> String {
    let mut hasher = Sha256::new();
    match input {
        GenerationInput::Text { prompt } => {
            hasher.update(prompt.as_bytes());
        }
        GenerationInput::Image {
            prompt,
            image,
            mime_type,
        } => {
            hasher.update(prompt.as_bytes());
            hasher.update([0u8]);
            hasher.update(mime_type.as_bytes());
            hasher.update([0u8]);
            hasher.update(image);
        }
        GenerationInput::Chat { messages } => {
            for message in messages {
                hasher.update(message.role.as_str().as_bytes());
                hasher.update([0u8]);
                hasher.update(message.content.as_bytes());
                hasher.update([0x1eu8]);
            }
        }
    }
    format!("{}:{:x}", input.method(), hasher.finalize())
}
