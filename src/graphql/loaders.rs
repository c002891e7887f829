use crate::constants::{GqlMetric, GqlTag, TAG_VALUE_FAILURE, TAG_VALUE_SUCCESS};
use crate::metrics::{emit_timer, MetricsSink};
use crate::tags::{NoopTagsProvider, TagSet, TagsProvider};
use async_graphql::dataloader::{DataLoader, Loader};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

/// Wraps a [`Loader`] and records a `gql_data_loader` timer per batch.
pub struct InstrumentedLoader<L> {
    inner: L,
    name: String,
    sink: Arc<dyn MetricsSink>,
    tags_provider: Arc<dyn TagsProvider>,
    enabled: bool,
}

impl<L> InstrumentedLoader<L> {
    pub fn new(inner: L, name: impl Into<String>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner,
            name: name.into(),
            sink,
            tags_provider: Arc::new(NoopTagsProvider),
            enabled: true,
        }
    }

    pub fn tags_provider(mut self, provider: Arc<dyn TagsProvider>) -> Self {
        self.tags_provider = provider;
        self
    }

    /// Turns timing off while keeping the loader in place.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<K, L> Loader<K> for InstrumentedLoader<L>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    L: Loader<K>,
{
    type Value = L::Value;
    type Error = L::Error;

    async fn load(&self, keys: &[K]) -> Result<HashMap<K, Self::Value>, Self::Error> {
        if !self.enabled {
            return self.inner.load(keys).await;
        }

        let started = Instant::now();
        let result = self.inner.load(keys).await;
        let outcome = if result.is_ok() { TAG_VALUE_SUCCESS } else { TAG_VALUE_FAILURE };
        let tags = TagSet::new()
            .and(self.tags_provider.contextual_tags())
            .with(GqlTag::LoaderName.as_str(), self.name.as_str())
            .with(GqlTag::LoaderBatchSize.as_str(), keys.len().to_string())
            .with(GqlTag::Outcome.as_str(), outcome);
        emit_timer(self.sink.as_ref(), GqlMetric::DataLoader, &tags, started.elapsed());
        result
    }
}

/// Demo owner record served by [`OwnerLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: i32,
    pub name: String,
}

/// Synthesizes owners from their ids; negative ids fail the whole batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerLoader;

impl OwnerLoader {
    pub fn data_loader(
        sink: Arc<dyn MetricsSink>,
        enabled: bool,
    ) -> DataLoader<InstrumentedLoader<OwnerLoader>> {
        DataLoader::new(
            InstrumentedLoader::new(OwnerLoader, "OwnerLoader", sink).enabled(enabled),
            tokio::spawn,
        )
    }
}

#[async_trait]
impl Loader<i32> for OwnerLoader {
    type Value = Owner;
    type Error = Arc<String>;

    async fn load(&self, keys: &[i32]) -> Result<HashMap<i32, Self::Value>, Self::Error> {
        if let Some(bad) = keys.iter().find(|id| **id < 0) {
            return Err(Arc::new(format!("no owner with id {}", bad)));
        }
        Ok(keys
            .iter()
            .map(|&id| {
                (
                    id,
                    Owner {
                        id,
                        name: format!("owner-{}", id),
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemorySink;

    #[tokio::test]
    async fn test_batch_is_timed_with_loader_tags() {
        let sink = Arc::new(InMemorySink::new());
        let loader = InstrumentedLoader::new(OwnerLoader, "OwnerLoader", sink.clone());

        let owners = loader.load(&[1, 2, 3]).await.unwrap();
        assert_eq!(owners.len(), 3);
        assert!(loader.load(&[-1]).await.is_err());

        let timers = sink.timers("gql_data_loader");
        assert_eq!(timers.len(), 2);
        assert_eq!(timers[0].tags.get("gql_loader_name"), Some("OwnerLoader"));
        assert_eq!(timers[0].tags.get("gql_loader_batch_size"), Some("3"));
        assert_eq!(timers[0].tags.get("outcome"), Some("success"));
        assert_eq!(timers[1].tags.get("outcome"), Some("failure"));
    }

    #[tokio::test]
    async fn test_disabled_loader_records_nothing() {
        let sink = Arc::new(InMemorySink::new());
        let loader = InstrumentedLoader::new(OwnerLoader, "OwnerLoader", sink.clone()).enabled(false);

        loader.load(&[1]).await.unwrap();
        assert!(sink.timers("gql_data_loader").is_empty());
    }
}
