//! Frequency/recency cache of navigated tags.
//!
//! Two tiers: an unbounded ledger counting every insert since the last
//! reset, and a capacity-bounded hot set drawn from it. Eviction only
//! removes an entry from the hot set; the ledger keeps counting until
//! `erase` or `reset`.

use std::{
    cmp::Reverse,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{core::tag::TagRecord, infra::utils::FsUtils};

/// Identity of a cached tag: (name, file, line, kind, info)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub name: String,
    pub file: PathBuf,
    pub line: usize,
    pub kind: Option<char>,
    pub info: String,
}

impl From<&TagRecord> for CacheKey {
    fn from(t: &TagRecord) -> Self {
        Self {
            name: t.name.clone(),
            file: t.file.clone(),
            line: t.line,
            kind: t.kind,
            info: t.info.clone(),
        }
    }
}

/// A tag with its visit count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub tag: TagRecord,
    pub frequency: u64,
    /// Logical clock of the last insert; larger is more recent
    pub touched: u64,
}

/// On-disk form of a cache
#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    reset_at: DateTime<Utc>,
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Clone)]
pub struct TagsCache {
    capacity: usize,
    ledger: IndexMap<CacheKey, CacheEntry>,
    hot: IndexSet<CacheKey>,
    clock: u64,
    reset_at: DateTime<Utc>,
}

impl TagsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ledger: IndexMap::new(),
            hot: IndexSet::new(),
            clock: 0,
            reset_at: Utc::now(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries in the hot set
    pub fn len(&self) -> usize {
        self.hot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hot.is_empty()
    }

    /// Count `freq` visits of `tag`, admitting it to the hot set.
    ///
    /// When the hot set is full the entry with the lowest frequency
    /// (ties: least recently touched) leaves it first.
    pub fn insert(
        &mut self,
        tag: &TagRecord,
        freq: u64,
    ) {
        self.clock += 1;
        let key = CacheKey::from(tag);
        let entry = self
            .ledger
            .entry(key.clone())
            .or_insert_with(|| CacheEntry {
                tag: tag.clone(),
                frequency: 0,
                touched: 0,
            });
        entry.frequency += freq;
        entry.touched = self.clock;

        if self.hot.contains(&key) || self.capacity == 0 {
            return;
        }
        if self.hot.len() >= self.capacity {
            self.evict_one();
        }
        self.hot.insert(key);
    }

    /// Hot entries, most frequent first, ties most recent first.
    /// A `limit` of 0 returns every hot entry.
    pub fn get(
        &self,
        limit: usize,
    ) -> Vec<CacheEntry> {
        let mut out: Vec<CacheEntry> = self
            .hot
            .iter()
            .filter_map(|k| self.ledger.get(k))
            .cloned()
            .collect();
        sort_entries(&mut out);
        if limit > 0 {
            out.truncate(limit);
        }
        out
    }

    /// Change the hot-set bound; shrinking evicts immediately.
    pub fn set_capacity(
        &mut self,
        capacity: usize,
    ) {
        self.capacity = capacity;
        while self.hot.len() > capacity {
            self.evict_one();
        }
    }

    /// Drop `tag` from both tiers. Returns whether it was present.
    pub fn erase(
        &mut self,
        tag: &TagRecord,
    ) -> bool {
        let key = CacheKey::from(tag);
        self.hot.swap_remove(&key);
        self.ledger.shift_remove(&key).is_some()
    }

    /// Whole ledger, including entries outside the hot set.
    pub fn stat(&self) -> Vec<CacheEntry> {
        let mut out: Vec<CacheEntry> = self.ledger.values().cloned().collect();
        sort_entries(&mut out);
        out
    }

    /// Forget all counters and restart the elapsed-time clock.
    pub fn reset(&mut self) {
        self.ledger.clear();
        self.hot.clear();
        self.clock = 0;
        self.reset_at = Utc::now();
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Time since counters were last reset
    pub fn since_reset(&self) -> chrono::TimeDelta {
        Utc::now() - self.reset_at
    }

    pub fn contains(
        &self,
        tag: &TagRecord,
    ) -> bool {
        self.hot.contains(&CacheKey::from(tag))
    }

    /// Persist the ledger as JSON.
    pub fn save(
        &self,
        path: &Path,
    ) -> Result<()> {
        let mut entries: Vec<CacheEntry> = self.ledger.values().cloned().collect();
        entries.sort_by_key(|e| e.touched);
        let snapshot = CacheSnapshot {
            reset_at: self.reset_at,
            entries,
        };
        let text = serde_json::to_string_pretty(&snapshot).context("serialize tags cache")?;
        FsUtils::write_atomic(path, text.as_bytes())
    }

    /// Restore a saved ledger; the hot set is refilled by rank.
    pub fn load(
        path: &Path,
        capacity: usize,
    ) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read tags cache {}", path.display()))?;
        let snapshot: CacheSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("parse tags cache {}", path.display()))?;

        let mut cache = Self::new(capacity);
        cache.reset_at = snapshot.reset_at;
        let mut entries = snapshot.entries;
        entries.sort_by_key(|e| e.touched);
        for (i, mut e) in entries.into_iter().enumerate() {
            e.touched = i as u64 + 1;
            cache.ledger.insert(CacheKey::from(&e.tag), e);
        }
        cache.clock = cache.ledger.len() as u64;

        let mut ranked: Vec<&CacheEntry> = cache.ledger.values().collect();
        ranked.sort_by_key(|e| (Reverse(e.frequency), Reverse(e.touched)));
        let hot: IndexSet<CacheKey> = ranked
            .into_iter()
            .take(capacity)
            .map(|e| CacheKey::from(&e.tag))
            .collect();
        cache.hot = hot;
        Ok(cache)
    }

    fn evict_one(&mut self) {
        let victim = self
            .hot
            .iter()
            .filter_map(|k| self.ledger.get(k).map(|e| (k, e.frequency, e.touched)))
            .min_by_key(|&(_, freq, touched)| (freq, touched))
            .map(|(k, _, _)| k.clone());
        if let Some(k) = victim {
            trace!(name = %k.name, "evicting cached tag");
            self.hot.swap_remove(&k);
        }
    }
}

fn sort_entries(entries: &mut [CacheEntry]) {
    entries.sort_by_key(|e| (Reverse(e.frequency), Reverse(e.touched)));
}
