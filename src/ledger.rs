//! Usage ledger: append-only, capacity-bounded log of token consumption.
//!
//! One ledger instance is shared by both backend clients. Once the
//! retention cap is reached the oldest entries are dropped, so the ledger
//! never holds more than `capacity` entries. Cache hits are logged too,
//! flagged `cached` and carrying the token counts of the original
//! generation.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::types::{BackendKind, GenerationMethod, TokenCounts};

/// Default number of entries retained.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// One logged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub user_id: u64,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub method: GenerationMethod,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached: bool,
    pub backend: BackendKind,
}

impl UsageLogEntry {
    /// Build an entry stamped with the current wall-clock time.
    pub fn now(
        user_id: u64,
        method: GenerationMethod,
        tokens: TokenCounts,
        cached: bool,
        backend: BackendKind,
    ) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            user_id,
            timestamp,
            method,
            input_tokens: tokens.input,
            output_tokens: tokens.output,
            cached,
            backend,
        }
    }
}

/// Token totals for one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUsage {
    pub requests: u64,
    pub cached: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl BackendUsage {
    fn add(&mut self, entry: &UsageLogEntry) {
        self.requests += 1;
        if entry.cached {
            self.cached += 1;
        }
        self.input_tokens += u64::from(entry.input_tokens);
        self.output_tokens += u64::from(entry.output_tokens);
    }
}

/// Aggregate view over the retained entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub entries: usize,
    pub capacity: usize,
    pub cloud: BackendUsage,
    pub local: BackendUsage,
}

/// Bounded in-memory usage log.
pub struct UsageLedger {
    capacity: usize,
    entries: Mutex<VecDeque<UsageLogEntry>>,
}

impl UsageLedger {
    /// Create a ledger retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<UsageLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, truncating the oldest ones beyond the cap.
    pub fn record(&self, entry: UsageLogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<UsageLogEntry> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Most recent entries of one user, newest first.
    pub fn recent_for_user(&self, user_id: u64, limit: usize) -> Vec<UsageLogEntry> {
        self.lock()
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Totals over the retained entries.
    pub fn summary(&self) -> LedgerSummary {
        let entries = self.lock();
        let mut summary = LedgerSummary {
            entries: entries.len(),
            capacity: self.capacity,
            ..LedgerSummary::default()
        };
        for entry in entries.iter() {
            match entry.backend {
                BackendKind::Cloud => summary.cloud.add(entry),
                BackendKind::Local => summary.local.add(entry),
            }
        }
        summary
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}
