//! Timing guard for a single field resolution.

use super::{emit_timer, MetricsSink};
use crate::constants::{GqlMetric, GqlTag, TAG_VALUE_FAILURE, TAG_VALUE_SUCCESS};
use crate::tags::{TagSet, TagsProvider};
use crate::types::{FieldError, FieldFetchParams};
use std::sync::Arc;
use std::time::Instant;

/// Records one `gql_resolver` timer.
///
/// Call [`FieldTimer::finish`] with the resolver's error, if any. A guard that
/// is dropped without finishing (the resolver panicked, or its future was
/// dropped) still records, with `outcome=failure`.
pub struct FieldTimer {
    started: Instant,
    params: Arc<FieldFetchParams>,
    base_tags: TagSet,
    tags_provider: Arc<dyn TagsProvider>,
    sink: Arc<dyn MetricsSink>,
    finished: bool,
}

impl FieldTimer {
    pub(crate) fn start(
        params: Arc<FieldFetchParams>,
        base_tags: TagSet,
        tags_provider: Arc<dyn TagsProvider>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            started: Instant::now(),
            params,
            base_tags,
            tags_provider,
            sink,
            finished: false,
        }
    }

    pub fn finish(mut self, error: Option<&FieldError>) {
        self.finished = true;
        self.record(error, error.is_some());
    }

    fn record(&self, error: Option<&FieldError>, failed: bool) {
        let outcome = if failed { TAG_VALUE_FAILURE } else { TAG_VALUE_SUCCESS };
        let mut tags = self.base_tags.clone();
        tags.merge(self.tags_provider.field_fetch_tags(&self.params, error));
        // Provider tags cannot override the outcome observed by the timer.
        tags.insert(GqlTag::Outcome.as_str(), outcome);
        emit_timer(
            self.sink.as_ref(),
            GqlMetric::Resolver,
            &tags,
            self.started.elapsed(),
        );
    }
}

impl Drop for FieldTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.record(None, true);
        }
    }
}
