//! Engine-neutral field resolvers and the timing wrapper around them.

use super::context::ExecutionContext;
use crate::constants::GqlTag;
use crate::metrics::{FieldTimer, MetricsSink};
use crate::tags::{TagSet, TagsProvider};
use crate::types::{FieldError, FieldFetchParams};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ResolveResult = std::result::Result<Value, FieldError>;

pub type BoxResolveFuture = Pin<Box<dyn Future<Output = ResolveResult> + Send + 'static>>;

/// A resolver's answer: available now, or a future that completes later.
pub enum Resolution {
    Ready(ResolveResult),
    Pending(BoxResolveFuture),
}

impl Resolution {
    pub fn ready(result: ResolveResult) -> Self {
        Resolution::Ready(result)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = ResolveResult> + Send + 'static,
    {
        Resolution::Pending(Box::pin(future))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending(_))
    }

    /// Awaits the result, whichever shape it arrived in.
    pub async fn into_result(self) -> ResolveResult {
        match self {
            Resolution::Ready(result) => result,
            Resolution::Pending(future) => future.await,
        }
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Resolution::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Inputs handed to a resolver.
#[derive(Debug, Clone, Default)]
pub struct FieldEnvironment {
    pub source: Value,
    pub arguments: Map<String, Value>,
}

impl FieldEnvironment {
    pub fn new(source: Value) -> Self {
        Self {
            source,
            arguments: Map::new(),
        }
    }

    pub fn argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

pub trait FieldResolver: Send + Sync {
    fn resolve(&self, env: &FieldEnvironment) -> Resolution;
}

impl<F> FieldResolver for F
where
    F: Fn(&FieldEnvironment) -> Resolution + Send + Sync,
{
    fn resolve(&self, env: &FieldEnvironment) -> Resolution {
        self(env)
    }
}

/// Base tags of a resolver timer: field identifier, contextual tags, then the
/// execution's state tags. Later keys win.
pub(crate) fn resolver_base_tags(
    params: &FieldFetchParams,
    tags_provider: &dyn TagsProvider,
    context: &ExecutionContext,
) -> TagSet {
    TagSet::new()
        .with(GqlTag::Field.as_str(), params.field_identifier())
        .and(tags_provider.contextual_tags())
        .and(context.tags())
}

/// Times every invocation of the wrapped resolver and returns its result
/// untouched.
pub(crate) struct TimedResolver {
    pub(crate) inner: Arc<dyn FieldResolver>,
    pub(crate) context: Arc<ExecutionContext>,
    pub(crate) params: Arc<FieldFetchParams>,
    pub(crate) tags_provider: Arc<dyn TagsProvider>,
    pub(crate) sink: Arc<dyn MetricsSink>,
}

impl FieldResolver for TimedResolver {
    fn resolve(&self, env: &FieldEnvironment) -> Resolution {
        let base_tags = resolver_base_tags(&self.params, self.tags_provider.as_ref(), &self.context);
        let timer = FieldTimer::start(
            self.params.clone(),
            base_tags,
            self.tags_provider.clone(),
            self.sink.clone(),
        );

        // A panic in `resolve` unwinds through `timer`, which records a failure.
        match self.inner.resolve(env) {
            Resolution::Ready(result) => {
                timer.finish(result.as_ref().err());
                Resolution::Ready(result)
            }
            Resolution::Pending(future) => Resolution::pending(async move {
                let result = future.await;
                timer.finish(result.as_ref().err());
                result
            }),
        }
    }
}
