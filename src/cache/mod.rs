//! Caching subsystem.
//!
//! [`ResponseCache`] stores generated responses keyed on a content hash of
//! the sanitized input. Each backend client owns its own instance, so a
//! response produced by the local backend is never served as if it came
//! from the cloud backend (and vice versa).
//!
//! Expiry is lazy: an entry older than the TTL is dropped when a lookup
//! finds it. Capacity pressure evicts in insertion order, not LRU.

pub mod response;

pub use response::{CacheConfig, CacheEntry, ResponseCache, cache_key};
