//! Per-execution state shared between the lifecycle hooks.

use crate::constants::{GqlTag, TAG_VALUE_ANONYMOUS, TAG_VALUE_NONE};
use crate::limiter::CardinalityLimiter;
use crate::signature::QuerySignature;
use crate::tags::TagSet;
use crate::types::OperationKind;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the engine knows when an execution begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStart {
    pub operation_name: Option<String>,
    pub operation_kind: Option<OperationKind>,
}

impl ExecutionStart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_name(mut self, name: Option<impl Into<String>>) -> Self {
        self.operation_name = name.map(Into::into);
        self
    }

    pub fn operation_kind(mut self, kind: OperationKind) -> Self {
        self.operation_kind = Some(kind);
        self
    }
}

/// Holds one execution's start time and the values derived at validation.
///
/// The context is created at execution start and then shared (behind an
/// `Arc`) with every timed resolver of the execution. Derived values are
/// written once, after validation succeeds; readers before that see them as
/// absent.
pub struct ExecutionContext {
    started_at: Instant,
    operation_name: Option<String>,
    operation_kind: OnceCell<OperationKind>,
    complexity: OnceCell<Option<u32>>,
    signature: OnceCell<Option<QuerySignature>>,
    operation_name_limiter: Arc<CardinalityLimiter>,
    signature_hash_limiter: Arc<CardinalityLimiter>,
}

impl ExecutionContext {
    pub(crate) fn new(
        start: ExecutionStart,
        operation_name_limiter: Arc<CardinalityLimiter>,
        signature_hash_limiter: Arc<CardinalityLimiter>,
    ) -> Self {
        let operation_kind = OnceCell::new();
        if let Some(kind) = start.operation_kind {
            let _ = operation_kind.set(kind);
        }
        Self {
            started_at: Instant::now(),
            operation_name: start.operation_name,
            operation_kind,
            complexity: OnceCell::new(),
            signature: OnceCell::new(),
            operation_name_limiter,
            signature_hash_limiter,
        }
    }

    /// A context with its own default-sized limiters, not tied to any observer.
    pub fn detached(start: ExecutionStart) -> Self {
        Self::new(
            start,
            Arc::new(CardinalityLimiter::default()),
            Arc::new(CardinalityLimiter::default()),
        )
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn operation_kind(&self) -> Option<OperationKind> {
        self.operation_kind.get().copied()
    }

    pub fn complexity(&self) -> Option<u32> {
        self.complexity.get().copied().flatten()
    }

    pub fn signature(&self) -> Option<&QuerySignature> {
        self.signature.get().and_then(Option::as_ref)
    }

    /// Whether validation-time values have been recorded.
    pub fn is_validated(&self) -> bool {
        self.complexity.get().is_some() || self.signature.get().is_some()
    }

    /// Stores validation-time values. Later calls leave the first values in place.
    pub(crate) fn record_validation(
        &self,
        complexity: Option<u32>,
        signature: Option<QuerySignature>,
        fallback_kind: Option<OperationKind>,
    ) {
        let _ = self.complexity.set(complexity);
        let _ = self.signature.set(signature);
        if let Some(kind) = fallback_kind {
            let _ = self.operation_kind.set(kind);
        }
    }

    /// Tags derived from this execution's state.
    ///
    /// Operation names and signature hashes pass through the cardinality
    /// limiters; everything else falls back to `none` or `anonymous`.
    pub fn tags(&self) -> TagSet {
        let complexity = self
            .complexity()
            .map(|bucket| bucket.to_string())
            .unwrap_or_else(|| TAG_VALUE_NONE.to_string());
        let operation = self
            .operation_kind()
            .map(|kind| kind.as_tag().to_string())
            .unwrap_or_else(|| TAG_VALUE_NONE.to_string());
        let operation_name = self
            .operation_name()
            .map(|name| self.operation_name_limiter.limit(name))
            .unwrap_or_else(|| TAG_VALUE_ANONYMOUS.to_string());
        let signature_hash = self
            .signature()
            .map(|signature| self.signature_hash_limiter.limit(&signature.hash))
            .unwrap_or_else(|| TAG_VALUE_NONE.to_string());

        TagSet::new()
            .with(GqlTag::QueryComplexity.as_str(), complexity)
            .with(GqlTag::Operation.as_str(), operation)
            .with(GqlTag::OperationName.as_str(), operation_name)
            .with(GqlTag::QuerySigHash.as_str(), signature_hash)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("operation_name", &self.operation_name)
            .field("operation_kind", &self.operation_kind())
            .field("complexity", &self.complexity())
            .field("signature_hash", &self.signature().map(|s| s.hash.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OVERFLOW_SENTINEL;

    #[test]
    fn test_tags_before_validation() {
        let context = ExecutionContext::detached(ExecutionStart::default());
        let tags = context.tags();

        assert_eq!(tags.get("gql_query_complexity"), Some("none"));
        assert_eq!(tags.get("gql_operation"), Some("none"));
        assert_eq!(tags.get("gql_operation_name"), Some("anonymous"));
        assert_eq!(tags.get("gql_query_sig_hash"), Some("none"));
        assert!(!context.is_validated());
    }

    #[test]
    fn test_tags_after_validation() {
        let context = ExecutionContext::detached(
            ExecutionStart::new().operation_name(Some("GetShows")),
        );
        let signature = QuerySignature::from_canonical("query GetShows {shows {id}}".to_string());
        let hash = signature.hash.clone();
        context.record_validation(Some(10), Some(signature), Some(OperationKind::Query));

        let tags = context.tags();
        assert_eq!(tags.get("gql_query_complexity"), Some("10"));
        assert_eq!(tags.get("gql_operation"), Some("QUERY"));
        assert_eq!(tags.get("gql_operation_name"), Some("GetShows"));
        assert_eq!(tags.get("gql_query_sig_hash"), Some(hash.as_str()));
    }

    #[test]
    fn test_start_kind_wins_over_fallback() {
        let context = ExecutionContext::detached(
            ExecutionStart::new().operation_kind(OperationKind::Mutation),
        );
        context.record_validation(None, None, Some(OperationKind::Query));
        assert_eq!(context.operation_kind(), Some(OperationKind::Mutation));
        assert!(context.is_validated());
    }

    #[test]
    fn test_operation_name_is_limited() {
        let names = Arc::new(CardinalityLimiter::new(1));
        let hashes = Arc::new(CardinalityLimiter::new(1));
        let first = ExecutionContext::new(
            ExecutionStart::new().operation_name(Some("A")),
            names.clone(),
            hashes.clone(),
        );
        let second = ExecutionContext::new(
            ExecutionStart::new().operation_name(Some("B")),
            names,
            hashes,
        );

        assert_eq!(first.tags().get("gql_operation_name"), Some("A"));
        assert_eq!(second.tags().get("gql_operation_name"), Some(OVERFLOW_SENTINEL));
    }
}
