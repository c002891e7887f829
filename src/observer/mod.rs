//! The execution observer: lifecycle hooks that turn one GraphQL execution
//! into query, resolver and error measurements.
//!
//! Hooks run in this order for each execution:
//!
//! 1. [`ExecutionObserver::on_execution_start`] creates the shared
//!    [`ExecutionContext`] and starts the query clock.
//! 2. [`ExecutionObserver::on_validation_complete`] derives complexity, the
//!    query signature and (if still unknown) the operation kind.
//! 3. [`ExecutionObserver::wrap_field_resolution`] (or
//!    [`ExecutionObserver::start_field_timer`]) times individual resolvers.
//! 4. [`ExecutionObserver::on_execution_complete`] records the query timer
//!    and one error counter per distinct error.

mod context;
mod resolver;

pub use context::{ExecutionContext, ExecutionStart};
pub use resolver::{
    BoxResolveFuture, FieldEnvironment, FieldResolver, ResolveResult, Resolution,
};

use crate::complexity::ComplexityEstimator;
use crate::config::TelemetryConfig;
use crate::constants::{should_ignore_field, GqlMetric, GqlTag};
use crate::document;
use crate::limiter::{CardinalityLimiter, CardinalityLimiterProvider, FirstN};
use crate::metrics::{emit_counter, emit_timer, FieldTimer, MetricsSink};
use crate::sanitize::ErrorPathSanitizer;
use crate::signature::{InMemorySignatureCache, QuerySignatureService, SignatureCache};
use crate::tags::{NoopTagsProvider, TagSet, TagsProvider};
use crate::types::{ExecutionResult, FieldFetchParams, GraphQLError, ValidationParams};
use resolver::{resolver_base_tags, TimedResolver};
use std::sync::Arc;
use tracing::debug;

pub struct ExecutionObserver {
    sink: Arc<dyn MetricsSink>,
    tags_provider: Arc<dyn TagsProvider>,
    signatures: Option<QuerySignatureService>,
    complexity: Option<ComplexityEstimator>,
    sanitizer: ErrorPathSanitizer,
    resolver_timing: bool,
    operation_name_limiter: Arc<CardinalityLimiter>,
    signature_hash_limiter: Arc<CardinalityLimiter>,
}

impl ExecutionObserver {
    pub fn builder(sink: Arc<dyn MetricsSink>) -> ObserverBuilder {
        ObserverBuilder::new(sink)
    }

    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    pub fn tags_provider(&self) -> &Arc<dyn TagsProvider> {
        &self.tags_provider
    }

    /// Starts timing an execution.
    pub fn on_execution_start(&self, start: ExecutionStart) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(
            start,
            self.operation_name_limiter.clone(),
            self.signature_hash_limiter.clone(),
        ))
    }

    /// Derives complexity, signature and operation kind once validation has
    /// passed. Does nothing when validation reported errors.
    pub fn on_validation_complete(
        &self,
        context: &ExecutionContext,
        params: &ValidationParams<'_>,
        errors: &[GraphQLError],
    ) {
        if !errors.is_empty() {
            debug!(errors = errors.len(), "validation failed, skipping derived tags");
            return;
        }
        let Some(doc) = params.document else {
            debug!("no parsed document available, skipping derived tags");
            context.record_validation(None, None, None);
            return;
        };

        let signature = self
            .signatures
            .as_ref()
            .and_then(|service| service.get_with_document(params.query, doc, params.operation_name));
        let complexity = self
            .complexity
            .as_ref()
            .and_then(|estimator| estimator.estimate(doc, params.operation_name, params.variables));
        let kind = document::select_operation(doc, params.operation_name)
            .ok()
            .map(|(_, operation)| operation.ty.into());

        context.record_validation(complexity, signature, kind);
    }

    /// Whether a resolver for `params` gets a timer at all.
    pub fn should_time(&self, params: &FieldFetchParams) -> bool {
        self.resolver_timing && !params.trivial && !should_ignore_field(&params.field_identifier())
    }

    /// Starts a resolver timer for engines that drive resolution themselves.
    /// Returns `None` for fields that are not timed.
    pub fn start_field_timer(
        &self,
        context: &ExecutionContext,
        params: FieldFetchParams,
    ) -> Option<FieldTimer> {
        if !self.should_time(&params) {
            return None;
        }
        let base_tags = resolver_base_tags(&params, self.tags_provider.as_ref(), context);
        Some(FieldTimer::start(
            Arc::new(params),
            base_tags,
            self.tags_provider.clone(),
            self.sink.clone(),
        ))
    }

    /// Wraps `resolver` so each invocation records a `gql_resolver` timer.
    ///
    /// Untimed fields get the original resolver back.
    pub fn wrap_field_resolution(
        &self,
        context: &Arc<ExecutionContext>,
        resolver: Arc<dyn FieldResolver>,
        params: FieldFetchParams,
    ) -> Arc<dyn FieldResolver> {
        if !self.should_time(&params) {
            return resolver;
        }
        Arc::new(TimedResolver {
            inner: resolver,
            context: context.clone(),
            params: Arc::new(params),
            tags_provider: self.tags_provider.clone(),
            sink: self.sink.clone(),
        })
    }

    /// Records the query timer and one `gql_error` counter per distinct
    /// (path, classification) among the result's errors.
    pub fn on_execution_complete(
        &self,
        context: &ExecutionContext,
        result: &ExecutionResult,
        error: Option<&anyhow::Error>,
    ) {
        let duration = context.elapsed();
        let query_tags = TagSet::new()
            .and(self.tags_provider.contextual_tags())
            .and(self.tags_provider.execution_tags(context, result, error))
            .and(context.tags());
        emit_timer(self.sink.as_ref(), GqlMetric::Query, &query_tags, duration);

        let records = self.sanitizer.sanitize(&result.errors);
        if !records.is_empty() {
            let base_tags = TagSet::new()
                .and(self.tags_provider.contextual_tags())
                .and(self.tags_provider.execution_tags(context, result, None))
                .and(context.tags());
            for record in &records {
                let tags = base_tags
                    .clone()
                    .with(GqlTag::Path.as_str(), record.path_tag())
                    .with(GqlTag::ErrorCode.as_str(), record.classification.clone())
                    .with(GqlTag::ErrorDetail.as_str(), record.detail.clone());
                emit_counter(self.sink.as_ref(), GqlMetric::Error, &tags);
            }
        }

        debug!(
            operation_name = context.operation_name().unwrap_or_default(),
            elapsed_ms = duration.as_millis() as u64,
            errors = result.errors.len(),
            distinct_errors = records.len(),
            "execution complete"
        );
    }
}

impl std::fmt::Debug for ExecutionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionObserver")
            .field("resolver_timing", &self.resolver_timing)
            .field("query_signature", &self.signatures.is_some())
            .field("query_complexity", &self.complexity.is_some())
            .finish()
    }
}

/// Assembles an [`ExecutionObserver`]. Every feature is on by default.
pub struct ObserverBuilder {
    sink: Arc<dyn MetricsSink>,
    tags_provider: Arc<dyn TagsProvider>,
    signature_cache: Option<Arc<dyn SignatureCache>>,
    limiter_provider: Arc<dyn CardinalityLimiterProvider>,
    complexity: ComplexityEstimator,
    query_signature: bool,
    query_complexity: bool,
    resolver_timing: bool,
}

impl ObserverBuilder {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            tags_provider: Arc::new(NoopTagsProvider),
            signature_cache: None,
            limiter_provider: Arc::new(FirstN::default()),
            complexity: ComplexityEstimator::default(),
            query_signature: true,
            query_complexity: true,
            resolver_timing: true,
        }
    }

    /// Applies feature switches and sizing from configuration.
    pub fn config(mut self, config: &TelemetryConfig) -> Self {
        self.query_signature = config.query_signature;
        self.query_complexity = config.query_complexity;
        self.resolver_timing = config.resolver_timing;
        self.limiter_provider = Arc::new(FirstN(config.limiter_capacity));
        self.complexity = ComplexityEstimator::new(config.complexity_buckets.clone());
        if let Some(max_entries) = config.signature_cache_max_entries {
            self.signature_cache =
                Some(Arc::new(InMemorySignatureCache::with_max_entries(max_entries)));
        }
        self
    }

    pub fn tags_provider(mut self, provider: Arc<dyn TagsProvider>) -> Self {
        self.tags_provider = provider;
        self
    }

    pub fn signature_cache(mut self, cache: Arc<dyn SignatureCache>) -> Self {
        self.signature_cache = Some(cache);
        self
    }

    pub fn limiter_provider(mut self, provider: Arc<dyn CardinalityLimiterProvider>) -> Self {
        self.limiter_provider = provider;
        self
    }

    pub fn complexity_estimator(mut self, estimator: ComplexityEstimator) -> Self {
        self.complexity = estimator;
        self
    }

    pub fn query_signature(mut self, enabled: bool) -> Self {
        self.query_signature = enabled;
        self
    }

    pub fn query_complexity(mut self, enabled: bool) -> Self {
        self.query_complexity = enabled;
        self
    }

    pub fn resolver_timing(mut self, enabled: bool) -> Self {
        self.resolver_timing = enabled;
        self
    }

    pub fn build(self) -> ExecutionObserver {
        let signatures = self.query_signature.then(|| {
            let cache = self
                .signature_cache
                .unwrap_or_else(|| Arc::new(InMemorySignatureCache::new()));
            QuerySignatureService::new(cache).with_sink(self.sink.clone())
        });

        ExecutionObserver {
            signatures,
            complexity: self.query_complexity.then_some(self.complexity),
            sanitizer: ErrorPathSanitizer::new(),
            resolver_timing: self.resolver_timing,
            operation_name_limiter: Arc::new(self.limiter_provider.limiter()),
            signature_hash_limiter: Arc::new(self.limiter_provider.limiter()),
            sink: self.sink,
            tags_provider: self.tags_provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemorySink;
    use crate::types::{FieldError, OperationKind, PathSegment, TypeRef};
    use serde_json::json;

    fn observer(sink: &Arc<InMemorySink>) -> ExecutionObserver {
        ExecutionObserver::builder(sink.clone()).build()
    }

    fn shows_params() -> FieldFetchParams {
        FieldFetchParams::new(TypeRef::named("Query"), "shows")
    }

    #[test]
    fn test_validation_derives_tags() {
        let sink = Arc::new(InMemorySink::new());
        let observer = observer(&sink);
        let query = "query GetShows { shows(first: 3) { id title } }";
        let doc = document::parse(query).unwrap();

        let context = observer.on_execution_start(
            ExecutionStart::new().operation_name(Some("GetShows")),
        );
        observer.on_validation_complete(
            &context,
            &ValidationParams::new(query)
                .operation_name(Some("GetShows"))
                .document(&doc),
            &[],
        );

        assert_eq!(context.operation_kind(), Some(OperationKind::Query));
        assert!(context.complexity().is_some());
        assert!(context.signature().is_some());
        // The signature lookup is timed.
        assert_eq!(sink.timers("gql_query_signature_latency").len(), 1);
    }

    #[test]
    fn test_validation_errors_leave_context_untouched() {
        let sink = Arc::new(InMemorySink::new());
        let observer = observer(&sink);
        let query = "{ shows { id } }";
        let doc = document::parse(query).unwrap();

        let context = observer.on_execution_start(ExecutionStart::default());
        observer.on_validation_complete(
            &context,
            &ValidationParams::new(query).document(&doc),
            &[GraphQLError::validation("bad", None, Some("FieldUndefined".to_string()))],
        );

        assert!(!context.is_validated());
        assert_eq!(context.tags().get("gql_query_sig_hash"), Some("none"));
        assert!(sink.timers("gql_query_signature_latency").is_empty());
    }

    #[test]
    fn test_disabled_features_are_absent() {
        let sink = Arc::new(InMemorySink::new());
        let observer = ExecutionObserver::builder(sink.clone())
            .query_signature(false)
            .query_complexity(false)
            .build();
        let query = "{ shows { id } }";
        let doc = document::parse(query).unwrap();

        let context = observer.on_execution_start(ExecutionStart::default());
        observer.on_validation_complete(&context, &ValidationParams::new(query).document(&doc), &[]);

        assert_eq!(context.complexity(), None);
        assert!(context.signature().is_none());
        assert_eq!(context.operation_kind(), Some(OperationKind::Query));
    }

    #[test]
    fn test_untimed_fields_bypass_wrapping() {
        let sink = Arc::new(InMemorySink::new());
        let observer = observer(&sink);
        let context = observer.on_execution_start(ExecutionStart::default());
        let resolver: Arc<dyn FieldResolver> =
            Arc::new(|_: &FieldEnvironment| Resolution::ready(Ok(json!("Query"))));

        let typename = FieldFetchParams::new(TypeRef::named("Query"), "__typename");
        let wrapped = observer.wrap_field_resolution(&context, resolver.clone(), typename);
        assert!(Arc::ptr_eq(&wrapped, &resolver));

        let trivial = shows_params().trivial(true);
        let wrapped = observer.wrap_field_resolution(&context, resolver.clone(), trivial);
        assert!(Arc::ptr_eq(&wrapped, &resolver));

        let disabled = ExecutionObserver::builder(sink.clone())
            .resolver_timing(false)
            .build();
        assert!(disabled.start_field_timer(&context, shows_params()).is_none());
    }

    #[test]
    fn test_wrapped_resolver_records_timer() {
        let sink = Arc::new(InMemorySink::new());
        let observer = observer(&sink);
        let context = observer.on_execution_start(ExecutionStart::default());
        let resolver: Arc<dyn FieldResolver> =
            Arc::new(|_: &FieldEnvironment| Resolution::ready(Ok(json!([1, 2]))));

        let wrapped = observer.wrap_field_resolution(&context, resolver, shows_params());
        match wrapped.resolve(&FieldEnvironment::default()) {
            Resolution::Ready(Ok(value)) => assert_eq!(value, json!([1, 2])),
            other => panic!("unexpected resolution: {:?}", other),
        }

        let timers = sink.timers("gql_resolver");
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].tags.get("gql_field"), Some("Query.shows"));
        assert_eq!(timers[0].tags.get("outcome"), Some("success"));
        assert_eq!(timers[0].tags.get("gql_operation_name"), Some("anonymous"));
    }

    #[test]
    fn test_completion_counts_distinct_errors() {
        let sink = Arc::new(InMemorySink::new());
        let observer = observer(&sink);
        let context = observer.on_execution_start(ExecutionStart::default());

        let field_error = FieldError::new("boom").with_extension("errorType", "INTERNAL");
        let path = vec![
            PathSegment::field("shows"),
            PathSegment::Index(0),
            PathSegment::field("venue"),
        ];
        let other_item = vec![
            PathSegment::field("shows"),
            PathSegment::Index(7),
            PathSegment::field("venue"),
        ];
        let result = ExecutionResult::with_errors(
            Some(json!({"shows": null})),
            vec![
                GraphQLError::from_field_error(&field_error, path),
                GraphQLError::from_field_error(&field_error, other_item),
            ],
        );
        observer.on_execution_complete(&context, &result, None);

        assert_eq!(sink.timers("gql_query").len(), 1);
        let counters = sink.counters("gql_error");
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].tags.get("gql_path"), Some("[shows, number, venue]"));
        assert_eq!(counters[0].tags.get("gql_error_code"), Some("INTERNAL"));
    }

    #[test]
    fn test_limiters_are_shared_across_executions() {
        let sink = Arc::new(InMemorySink::new());
        let observer = ExecutionObserver::builder(sink.clone())
            .limiter_provider(Arc::new(FirstN(1)))
            .build();

        let first = observer.on_execution_start(ExecutionStart::new().operation_name(Some("A")));
        let second = observer.on_execution_start(ExecutionStart::new().operation_name(Some("B")));
        assert_eq!(first.tags().get("gql_operation_name"), Some("A"));
        assert_eq!(second.tags().get("gql_operation_name"), Some("--others--"));
    }
}
