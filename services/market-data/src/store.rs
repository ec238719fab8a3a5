//! Candle storage
//!
//! A sliding window per (instrument, granularity): newest candle first,
//! bounded by a capacity, oldest evicted from the tail. The `CandleStore`
//! trait is the only thing the aggregator knows about storage; the
//! in-memory implementation keeps one lock per window so writers to
//! different keys never contend.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use types::candle::Candle;
use types::granularity::Granularity;
use types::ids::InstrumentCode;

/// Hard capacity of a sliding window.
pub const WINDOW_CAPACITY: usize = 500;

/// Errors raised by a candle store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable for {key}: {reason}")]
    Unavailable { key: String, reason: String },
}

impl StoreError {
    pub fn unavailable(key: &WindowKey, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Identifies one sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    pub code: InstrumentCode,
    pub granularity: Granularity,
}

impl WindowKey {
    pub fn new(code: InstrumentCode, granularity: Granularity) -> Self {
        Self { code, granularity }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "candle:{}:{}", self.code, self.granularity)
    }
}

/// What to do with a window after looking at its head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadWrite {
    /// Overwrite the head (or create it if the window is empty).
    Replace(Candle),
    /// Push a new head and trim the tail to capacity.
    Prepend(Candle),
    /// Leave the window untouched.
    Keep,
}

/// Result of an atomic window write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Window length after the write.
    pub len: usize,
    /// Candles dropped from the tail.
    pub evicted: usize,
}

/// Storage collaborator for candle windows.
///
/// Every method acts on exactly one key. `apply` is the read-modify-write
/// primitive: implementations must hold the key's lock (or equivalent)
/// from reading the head until the decision has been written, and must
/// leave the window untouched if they fail. Whatever `capacity` is
/// passed, no window retains more than `WINDOW_CAPACITY` candles.
pub trait CandleStore: Send + Sync {
    fn read_head(&self, key: &WindowKey) -> Result<Option<Candle>, StoreError>;

    /// Up to `count` candles, newest first.
    fn read_range(&self, key: &WindowKey, count: usize) -> Result<Vec<Candle>, StoreError>;

    fn len(&self, key: &WindowKey) -> Result<usize, StoreError>;

    fn exists(&self, key: &WindowKey) -> Result<bool, StoreError> {
        Ok(self.len(key)? > 0)
    }

    /// Overwrite the head. An empty window gets `candle` as its only entry.
    fn replace_head(&self, key: &WindowKey, candle: Candle) -> Result<(), StoreError>;

    /// Push a new head, then trim to `capacity`. Returns the eviction count.
    fn prepend_and_trim(
        &self,
        key: &WindowKey,
        candle: Candle,
        capacity: usize,
    ) -> Result<usize, StoreError>;

    /// Atomically read the head, let `decide` choose a write, and apply it.
    fn apply(
        &self,
        key: &WindowKey,
        capacity: usize,
        decide: &mut dyn FnMut(Option<&Candle>) -> HeadWrite,
    ) -> Result<WriteOutcome, StoreError>;

    /// All keys that currently hold a window.
    fn keys(&self) -> Result<Vec<WindowKey>, StoreError>;
}

type Window = Arc<Mutex<VecDeque<Candle>>>;

/// Process-local candle store.
#[derive(Debug, Default)]
pub struct InMemoryCandleStore {
    windows: DashMap<WindowKey, Window>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every window (process-level reset).
    pub fn clear(&self) {
        self.windows.clear();
    }

    fn existing(&self, key: &WindowKey) -> Option<Window> {
        // clone the Arc so the shard guard is released before locking
        self.windows.get(key).map(|w| Arc::clone(w.value()))
    }

    fn get_or_create(&self, key: &WindowKey) -> Window {
        Arc::clone(self.windows.entry(key.clone()).or_default().value())
    }

    fn lock<'a>(
        key: &WindowKey,
        window: &'a Window,
    ) -> Result<MutexGuard<'a, VecDeque<Candle>>, StoreError> {
        window.lock().map_err(|_| {
            error!(key = %key, "Window lock poisoned");
            StoreError::unavailable(key, "window lock poisoned")
        })
    }

    /// Trim to `capacity`, never keeping more than `WINDOW_CAPACITY`.
    fn trim(window: &mut VecDeque<Candle>, capacity: usize) -> usize {
        let capacity = capacity.clamp(1, WINDOW_CAPACITY);
        let excess = window.len().saturating_sub(capacity);
        window.truncate(capacity);
        excess
    }
}

impl CandleStore for InMemoryCandleStore {
    fn read_head(&self, key: &WindowKey) -> Result<Option<Candle>, StoreError> {
        let Some(window) = self.existing(key) else {
            return Ok(None);
        };
        let head = Self::lock(key, &window)?.front().cloned();
        Ok(head)
    }

    fn read_range(&self, key: &WindowKey, count: usize) -> Result<Vec<Candle>, StoreError> {
        let Some(window) = self.existing(key) else {
            return Ok(Vec::new());
        };
        let range = Self::lock(key, &window)?
            .iter()
            .take(count)
            .cloned()
            .collect();
        Ok(range)
    }

    fn len(&self, key: &WindowKey) -> Result<usize, StoreError> {
        let Some(window) = self.existing(key) else {
            return Ok(0);
        };
        let len = Self::lock(key, &window)?.len();
        Ok(len)
    }

    fn replace_head(&self, key: &WindowKey, candle: Candle) -> Result<(), StoreError> {
        let window = self.get_or_create(key);
        let mut guard = Self::lock(key, &window)?;
        match guard.front_mut() {
            Some(head) => *head = candle,
            None => guard.push_front(candle),
        }
        Ok(())
    }

    fn prepend_and_trim(
        &self,
        key: &WindowKey,
        candle: Candle,
        capacity: usize,
    ) -> Result<usize, StoreError> {
        let window = self.get_or_create(key);
        let mut guard = Self::lock(key, &window)?;
        guard.push_front(candle);
        Ok(Self::trim(&mut guard, capacity))
    }

    fn apply(
        &self,
        key: &WindowKey,
        capacity: usize,
        decide: &mut dyn FnMut(Option<&Candle>) -> HeadWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let window = self.get_or_create(key);
        let outcome = Self::decide_and_write(key, &window, capacity, decide)?;

        if outcome.len == 0 {
            // Nothing was written to a fresh window. Unregister it unless
            // another writer has picked up the same Arc; clones only happen
            // under the shard lock that `remove_if` holds.
            self.windows.remove_if(key, |_, w| {
                Arc::strong_count(w) == 2 && w.try_lock().map(|g| g.is_empty()).unwrap_or(false)
            });
        }

        Ok(outcome)
    }

    fn keys(&self) -> Result<Vec<WindowKey>, StoreError> {
        let mut keys: Vec<WindowKey> = self.windows.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

impl InMemoryCandleStore {
    fn decide_and_write(
        key: &WindowKey,
        window: &Window,
        capacity: usize,
        decide: &mut dyn FnMut(Option<&Candle>) -> HeadWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let mut guard = Self::lock(key, window)?;

        let evicted = match decide(guard.front()) {
            HeadWrite::Replace(candle) => {
                match guard.front_mut() {
                    Some(head) => *head = candle,
                    None => guard.push_front(candle),
                }
                0
            }
            HeadWrite::Prepend(candle) => {
                guard.push_front(candle);
                Self::trim(&mut guard, capacity)
            }
            HeadWrite::Keep => 0,
        };

        if evicted > 0 {
            debug!(key = %key, evicted, "Trimmed window tail");
        }

        Ok(WriteOutcome {
            len: guard.len(),
            evicted,
        })
    }
}
