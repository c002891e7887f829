//! Bounds the number of distinct values a tag key can take.
//!
//! Operation names and query signature hashes come from clients, so recording
//! them verbatim would let any caller mint new metric series without limit.
//! A [`CardinalityLimiter`] admits the first N distinct values it sees and
//! maps every later newcomer to [`OVERFLOW_SENTINEL`].

use crate::constants::{DEFAULT_LIMITER_CAPACITY, OVERFLOW_SENTINEL};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

pub struct CardinalityLimiter {
    capacity: usize,
    admitted: RwLock<HashSet<String>>,
}

impl CardinalityLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            admitted: RwLock::new(HashSet::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `value` if it is (or can become) one of the admitted values,
    /// otherwise the overflow sentinel.
    pub fn limit(&self, value: &str) -> String {
        {
            let admitted = self.admitted.read().unwrap_or_else(PoisonError::into_inner);
            if admitted.contains(value) {
                return value.to_owned();
            }
            if admitted.len() >= self.capacity {
                return OVERFLOW_SENTINEL.to_owned();
            }
        }

        // Membership and size are re-checked under the write lock so racing
        // first inserts cannot push the set past capacity.
        let mut admitted = self.admitted.write().unwrap_or_else(PoisonError::into_inner);
        if admitted.contains(value) {
            return value.to_owned();
        }
        if admitted.len() >= self.capacity {
            debug!(capacity = self.capacity, "cardinality limit reached");
            return OVERFLOW_SENTINEL.to_owned();
        }
        admitted.insert(value.to_owned());
        value.to_owned()
    }

    /// Number of distinct values admitted so far.
    pub fn admitted(&self) -> usize {
        self.admitted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for CardinalityLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMITER_CAPACITY)
    }
}

impl std::fmt::Debug for CardinalityLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardinalityLimiter")
            .field("capacity", &self.capacity)
            .field("admitted", &self.admitted())
            .finish()
    }
}

/// Creates independent limiters, one per limited tag key.
pub trait CardinalityLimiterProvider: Send + Sync {
    fn limiter(&self) -> CardinalityLimiter;
}

/// Admits the first `N` distinct values.
#[derive(Debug, Clone, Copy)]
pub struct FirstN(pub usize);

impl Default for FirstN {
    fn default() -> Self {
        FirstN(DEFAULT_LIMITER_CAPACITY)
    }
}

impl CardinalityLimiterProvider for FirstN {
    fn limiter(&self) -> CardinalityLimiter {
        CardinalityLimiter::new(self.0)
    }
}
