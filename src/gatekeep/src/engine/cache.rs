//! Per-cycle grant cache
//!
//! Lives for exactly one apply cycle. Within that cycle a permission value
//! resolves to the same answer for every element, however many share it.

use std::collections::HashMap;

use serde::Serialize;

use crate::permission::Perm;

/// Grant decisions memoised for one apply cycle
#[derive(Debug, Default)]
pub struct GrantCache {
    grants: HashMap<Perm, bool>,
    hits: usize,
    misses: usize,
}

impl GrantCache {
    /// Create a cache sized for roughly `capacity` distinct permissions
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            grants: HashMap::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Cached answer for `permission`, counting the hit or miss
    pub fn get(&mut self, permission: &Perm) -> Option<bool> {
        match self.grants.get(permission) {
            Some(granted) => {
                self.hits += 1;
                Some(*granted)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Remember the answer for `permission`
    pub fn insert(&mut self, permission: Perm, granted: bool) {
        self.grants.insert(permission, granted);
    }

    /// Number of distinct permissions resolved so far
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether nothing was resolved yet
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Hit/miss counters for this cycle
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.grants.len(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
