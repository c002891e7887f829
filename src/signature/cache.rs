use super::{QuerySignature, SignatureKey};
use dashmap::DashMap;
use tracing::debug;

/// Key-value store memoizing signatures. Eviction and expiry belong to the
/// implementation; the service only gets and puts.
pub trait SignatureCache: Send + Sync {
    fn get(&self, key: &SignatureKey) -> Option<QuerySignature>;
    fn put(&self, key: SignatureKey, signature: QuerySignature);
}

/// Process-local cache. With `max_entries` set, new keys are refused once full.
#[derive(Debug, Default)]
pub struct InMemorySignatureCache {
    entries: DashMap<SignatureKey, QuerySignature>,
    max_entries: Option<usize>,
}

impl InMemorySignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: Some(max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SignatureCache for InMemorySignatureCache {
    fn get(&self, key: &SignatureKey) -> Option<QuerySignature> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: SignatureKey, signature: QuerySignature) {
        if let Some(max) = self.max_entries {
            if self.entries.len() >= max && !self.entries.contains_key(&key) {
                debug!(max_entries = max, "signature cache full, not storing");
                return;
            }
        }
        // Racing writers store identical values for the same key.
        self.entries.insert(key, signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash: &str) -> SignatureKey {
        SignatureKey::new(hash, Some("Op"))
    }

    fn sig(value: &str) -> QuerySignature {
        QuerySignature::from_canonical(value.to_string())
    }

    #[test]
    fn test_get_put() {
        let cache = InMemorySignatureCache::new();
        assert!(cache.get(&key("a")).is_none());
        cache.put(key("a"), sig("query {a}"));
        assert_eq!(cache.get(&key("a")), Some(sig("query {a}")));
        assert!(cache.get(&SignatureKey::new("a", None)).is_none());
    }

    #[test]
    fn test_bounded_cache_refuses_new_keys() {
        let cache = InMemorySignatureCache::with_max_entries(1);
        cache.put(key("a"), sig("query {a}"));
        cache.put(key("b"), sig("query {b}"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("b")).is_none());
        cache.put(key("a"), sig("query {a}"));
        assert_eq!(cache.len(), 1);
    }
}
