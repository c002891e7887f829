use super::Tag;
use crate::constants::{GqlTag, TAG_VALUE_FAILURE, TAG_VALUE_SUCCESS};
use crate::observer::ExecutionContext;
use crate::types::{ExecutionResult, FieldError, FieldFetchParams};
use std::sync::Arc;

/// Supplies application-specific tags for each kind of measurement.
///
/// Every method defaults to no tags, so implementors only override the
/// measurements they care about.
pub trait TagsProvider: Send + Sync {
    /// Tags added to every query and resolver measurement.
    fn contextual_tags(&self) -> Vec<Tag> {
        Vec::new()
    }

    /// Tags added to the query timer and the error counters.
    fn execution_tags(
        &self,
        _context: &ExecutionContext,
        _result: &ExecutionResult,
        _error: Option<&anyhow::Error>,
    ) -> Vec<Tag> {
        Vec::new()
    }

    /// Tags added to a resolver timer once the field has completed.
    fn field_fetch_tags(&self, _params: &FieldFetchParams, _error: Option<&FieldError>) -> Vec<Tag> {
        Vec::new()
    }
}

/// Provider that contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTagsProvider;

impl TagsProvider for NoopTagsProvider {}

pub trait ContextualTagCustomizer: Send + Sync {
    fn contextual_tags(&self) -> Vec<Tag>;
}

pub trait ExecutionTagCustomizer: Send + Sync {
    fn execution_tags(
        &self,
        context: &ExecutionContext,
        result: &ExecutionResult,
        error: Option<&anyhow::Error>,
    ) -> Vec<Tag>;
}

pub trait FieldFetchTagCustomizer: Send + Sync {
    fn field_fetch_tags(&self, params: &FieldFetchParams, error: Option<&FieldError>) -> Vec<Tag>;
}

/// Concatenates the tags of every registered customizer, in registration order.
#[derive(Default, Clone)]
pub struct CollatedTagsProvider {
    contextual: Vec<Arc<dyn ContextualTagCustomizer>>,
    execution: Vec<Arc<dyn ExecutionTagCustomizer>>,
    field_fetch: Vec<Arc<dyn FieldFetchTagCustomizer>>,
}

impl CollatedTagsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contextual(mut self, customizer: Arc<dyn ContextualTagCustomizer>) -> Self {
        self.contextual.push(customizer);
        self
    }

    pub fn execution(mut self, customizer: Arc<dyn ExecutionTagCustomizer>) -> Self {
        self.execution.push(customizer);
        self
    }

    pub fn field_fetch(mut self, customizer: Arc<dyn FieldFetchTagCustomizer>) -> Self {
        self.field_fetch.push(customizer);
        self
    }

    /// Registers the outcome customizer for both executions and field fetches.
    pub fn with_outcome_tags(self) -> Self {
        let outcome = Arc::new(OutcomeTagCustomizer);
        self.execution(outcome.clone()).field_fetch(outcome)
    }
}

impl TagsProvider for CollatedTagsProvider {
    fn contextual_tags(&self) -> Vec<Tag> {
        self.contextual
            .iter()
            .flat_map(|c| c.contextual_tags())
            .collect()
    }

    fn execution_tags(
        &self,
        context: &ExecutionContext,
        result: &ExecutionResult,
        error: Option<&anyhow::Error>,
    ) -> Vec<Tag> {
        self.execution
            .iter()
            .flat_map(|c| c.execution_tags(context, result, error))
            .collect()
    }

    fn field_fetch_tags(&self, params: &FieldFetchParams, error: Option<&FieldError>) -> Vec<Tag> {
        self.field_fetch
            .iter()
            .flat_map(|c| c.field_fetch_tags(params, error))
            .collect()
    }
}

/// Tags executions and field fetches with `outcome=success|failure`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutcomeTagCustomizer;

fn outcome(failed: bool) -> Tag {
    let value = if failed { TAG_VALUE_FAILURE } else { TAG_VALUE_SUCCESS };
    Tag::new(GqlTag::Outcome.as_str(), value)
}

impl ExecutionTagCustomizer for OutcomeTagCustomizer {
    fn execution_tags(
        &self,
        _context: &ExecutionContext,
        result: &ExecutionResult,
        error: Option<&anyhow::Error>,
    ) -> Vec<Tag> {
        vec![outcome(error.is_some() || !result.errors.is_empty())]
    }
}

impl FieldFetchTagCustomizer for OutcomeTagCustomizer {
    fn field_fetch_tags(&self, _params: &FieldFetchParams, error: Option<&FieldError>) -> Vec<Tag> {
        vec![outcome(error.is_some())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ExecutionStart;
    use crate::types::{GraphQLError, TypeRef};

    struct Region;

    impl ContextualTagCustomizer for Region {
        fn contextual_tags(&self) -> Vec<Tag> {
            vec![Tag::new("region", "us-west-2")]
        }
    }

    #[test]
    fn test_collated_provider_concatenates_customizers() {
        let provider = CollatedTagsProvider::new()
            .contextual(Arc::new(Region))
            .with_outcome_tags();

        assert_eq!(provider.contextual_tags(), vec![Tag::new("region", "us-west-2")]);

        let params = FieldFetchParams::new(TypeRef::named("Query"), "shows");
        let failed = provider.field_fetch_tags(&params, Some(&FieldError::new("boom")));
        assert_eq!(failed, vec![Tag::new("outcome", "failure")]);
        let ok = provider.field_fetch_tags(&params, None);
        assert_eq!(ok, vec![Tag::new("outcome", "success")]);
    }

    #[test]
    fn test_execution_outcome_reflects_result_errors() {
        let context = ExecutionContext::detached(ExecutionStart::default());
        let customizer = OutcomeTagCustomizer;

        let clean = ExecutionResult::ok(serde_json::json!({"shows": []}));
        assert_eq!(
            customizer.execution_tags(&context, &clean, None),
            vec![Tag::new("outcome", "success")]
        );

        let failed = ExecutionResult::with_errors(None, vec![GraphQLError::syntax("bad")]);
        assert_eq!(
            customizer.execution_tags(&context, &failed, None),
            vec![Tag::new("outcome", "failure")]
        );
    }
}
