//! Bounded LRU cache of resolved color tables
//!
//! Shared by every render worker. The mutex guards only the bookkeeping;
//! tables are handed out as `Arc`s and read without the lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::transform::ColorLut;
use super::{ColorAdjustments, ColorCategory, ColorSpec};

/// Exact identity of a (color, adjustments) pair.
///
/// Floats are stored as bit patterns so the key is `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorKey {
    id: String,
    category: ColorCategory,
    base: [u32; 3],
    stops: Vec<[u32; 3]>,
    adjustments: [u32; 2],
}

impl ColorKey {
    pub fn new(spec: &ColorSpec, adjustments: &ColorAdjustments) -> Self {
        let bits = |h: f32, s: f32, b: f32| [h.to_bits(), s.to_bits(), b.to_bits()];
        Self {
            id: spec.id().to_string(),
            category: spec.category(),
            base: bits(spec.hue(), spec.saturation(), spec.brightness()),
            stops: spec
                .gradient_stops()
                .iter()
                .map(|stop| bits(stop.h, stop.s, stop.b))
                .collect(),
            adjustments: [adjustments.brightness.to_bits(), adjustments.saturation.to_bits()],
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

/// Cached table plus its last-access tick
struct CacheEntry {
    value: Arc<ColorLut>,
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ColorKey, CacheEntry>,
    /// Logical clock, bumped on every access
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU cache of color lookup tables
pub struct ColorCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl ColorCache {
    /// Create a cache holding at most `capacity` tables (0 disables it)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity),
                ..Default::default()
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a table, marking it most recently used
    pub fn get(&self, key: &ColorKey) -> Option<Arc<ColorLut>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;

        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = tick;
                let value = entry.value.clone();
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Insert a table, evicting the least recently used entry when full
    pub fn put(&self, key: ColorKey, value: Arc<ColorLut>) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                state.evictions += 1;
                tracing::trace!(target: "hair_recolor::cache", color = %oldest.id, "Evicted color table");
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: tick,
            },
        );
    }

    /// Drop every entry (session teardown)
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            len: state.entries.len(),
        }
    }
}

impl std::fmt::Debug for ColorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
