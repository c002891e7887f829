//! Query signatures: a canonical, literal-free form of a query plus its hash.
//!
//! Two queries that differ only in literal argument values, aliases or the
//! order of their selections share a signature, so the signature hash can
//! group executions of "the same query" in dashboards.

mod cache;
mod printer;

pub use cache::{InMemorySignatureCache, SignatureCache};
pub use printer::print_signature;

use crate::constants::{GqlMetric, GqlTag, TAG_VALUE_FAILURE, TAG_VALUE_SUCCESS};
use crate::document;
use crate::error::Result;
use crate::metrics::{emit_timer, MetricsSink};
use crate::tags::TagSet;
use async_graphql_parser::types::ExecutableDocument;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuerySignature {
    pub value: String,
    pub hash: String,
}

impl QuerySignature {
    /// Wraps canonical text, hashing it.
    pub fn from_canonical(value: String) -> Self {
        let hash = sha256_hex(&value);
        Self { value, hash }
    }
}

/// Cache key: hash of the raw query text plus the selected operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureKey {
    pub query_hash: String,
    pub operation_name: Option<String>,
}

impl SignatureKey {
    pub fn new(query_hash: impl Into<String>, operation_name: Option<&str>) -> Self {
        Self {
            query_hash: query_hash.into(),
            operation_name: operation_name.map(str::to_owned),
        }
    }

    pub fn for_query(query: &str, operation_name: Option<&str>) -> Self {
        Self::new(sha256_hex(query), operation_name)
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the signature of the selected operation without any caching.
pub fn compute_signature(
    document: &ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<QuerySignature> {
    print_signature(document, operation_name).map(QuerySignature::from_canonical)
}

/// Get-or-compute-and-store over a [`SignatureCache`].
pub struct QuerySignatureService {
    cache: Arc<dyn SignatureCache>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl QuerySignatureService {
    pub fn new(cache: Arc<dyn SignatureCache>) -> Self {
        Self { cache, sink: None }
    }

    /// Records `gql_query_signature_latency` for every lookup.
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Signature for raw query text, parsing it only on a cache miss.
    pub fn get(&self, query: &str, operation_name: Option<&str>) -> Option<QuerySignature> {
        self.lookup("get", query, operation_name, || {
            let document = document::parse(query)?;
            compute_signature(&document, operation_name)
        })
    }

    /// Signature for a query the engine has already parsed.
    pub fn get_with_document(
        &self,
        query: &str,
        document: &ExecutableDocument,
        operation_name: Option<&str>,
    ) -> Option<QuerySignature> {
        self.lookup("get_with_document", query, operation_name, || {
            compute_signature(document, operation_name)
        })
    }

    fn lookup<F>(
        &self,
        method: &'static str,
        query: &str,
        operation_name: Option<&str>,
        compute: F,
    ) -> Option<QuerySignature>
    where
        F: FnOnce() -> Result<QuerySignature>,
    {
        let started = Instant::now();
        let key = SignatureKey::for_query(query, operation_name);

        let result = match self.cache.get(&key) {
            Some(hit) => Ok(hit),
            None => compute().map(|signature| {
                debug!(query_hash = %key.query_hash, "query signature computed");
                self.cache.put(key.clone(), signature.clone());
                signature
            }),
        };

        let outcome = if result.is_ok() { TAG_VALUE_SUCCESS } else { TAG_VALUE_FAILURE };
        if let Some(sink) = &self.sink {
            let tags = TagSet::new()
                .with(GqlTag::Method.as_str(), format!("QuerySignatureService.{}", method))
                .with(GqlTag::Outcome.as_str(), outcome);
            emit_timer(
                sink.as_ref(),
                GqlMetric::QuerySignatureLatency,
                &tags,
                started.elapsed(),
            );
        }

        match result {
            Ok(signature) => Some(signature),
            Err(e) => {
                error!(
                    query_hash = %key.query_hash,
                    operation_name = operation_name.unwrap_or_default(),
                    error = %e,
                    "Failed to compute query signature"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCache {
        inner: InMemorySignatureCache,
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    impl SignatureCache for CountingCache {
        fn get(&self, key: &SignatureKey) -> Option<QuerySignature> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn put(&self, key: SignatureKey, signature: QuerySignature) {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, signature)
        }
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_cache_hit_skips_recomputation() {
        let cache = Arc::new(CountingCache::default());
        let service = QuerySignatureService::new(cache.clone());

        let first = service.get("{ shows { id } }", None).unwrap();
        let second = service.get("{ shows { id } }", None).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_literal_values_share_signature() {
        let service = QuerySignatureService::new(Arc::new(InMemorySignatureCache::new()));
        let a = service.get(r#"{ shows(city: "Seattle") { id } }"#, None).unwrap();
        let b = service.get(r#"{ shows(city: "Portland") { id } }"#, None).unwrap();
        let c = service.get(r#"{ shows(city: "Seattle") { id name } }"#, None).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.hash, sha256_hex(&a.value));
    }

    #[test]
    fn test_operation_name_is_part_of_the_key() {
        let cache = Arc::new(CountingCache::default());
        let service = QuerySignatureService::new(cache.clone());
        let query = "query A { shows { id } } query B { venues { id } }";

        let a = service.get(query, Some("A")).unwrap();
        let b = service.get(query, Some("B")).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failures_are_absent_and_timed() {
        let sink = Arc::new(InMemorySink::new());
        let service = QuerySignatureService::new(Arc::new(InMemorySignatureCache::new()))
            .with_sink(sink.clone());

        assert!(service.get("{ shows {", None).is_none());
        assert!(service.get("query A { a } query B { b }", None).is_none());
        assert!(service.get("{ ok }", None).is_some());

        let timers = sink.timers(GqlMetric::QuerySignatureLatency.as_str());
        let outcomes: Vec<_> = timers
            .iter()
            .map(|m| m.tags.get("outcome").unwrap_or_default().to_string())
            .collect();
        assert_eq!(outcomes, vec!["failure", "failure", "success"]);
    }

    #[test]
    fn test_concurrent_lookups_agree() {
        let service = Arc::new(QuerySignatureService::new(Arc::new(
            InMemorySignatureCache::new(),
        )));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || service.get("{ shows(first: 3) { id } }", None))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| r.is_some() && r == &results[0]));
    }
}
