use super::extension::MetricsExtensionFactory;
use super::loaders::{InstrumentedLoader, Owner, OwnerLoader};
use crate::config::TelemetryConfig;
use crate::observer::ExecutionObserver;
use async_graphql::dataloader::DataLoader;
use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, FieldResult, Object, Schema, SimpleObject,
};
use std::sync::Arc;

pub type DemoSchema = Schema<Query, Mutation, EmptySubscription>;

type OwnerDataLoader = DataLoader<InstrumentedLoader<OwnerLoader>>;

#[derive(SimpleObject, Clone)]
#[graphql(complex)]
pub struct Item {
    pub id: i32,
    pub name: String,
    #[graphql(skip)]
    pub owner_id: i32,
}

#[async_graphql::ComplexObject]
impl Item {
    async fn owner(&self, ctx: &Context<'_>) -> FieldResult<Option<OwnerObject>> {
        let loader = ctx.data::<OwnerDataLoader>()?;
        let owner = loader.load_one(self.owner_id).await?;
        Ok(owner.map(OwnerObject::from))
    }
}

#[derive(SimpleObject, Clone)]
#[graphql(name = "Owner")]
pub struct OwnerObject {
    pub id: i32,
    pub name: String,
}

impl From<Owner> for OwnerObject {
    fn from(owner: Owner) -> Self {
        Self {
            id: owner.id,
            name: owner.name,
        }
    }
}

/// Root query object of the demo schema
pub struct Query;

#[Object]
impl Query {
    async fn ping(&self) -> String {
        "pong".to_string()
    }

    async fn echo(&self, message: String) -> String {
        message
    }

    /// `first` items; the last one has a missing owner when `broken` is set.
    async fn items(&self, first: Option<i32>, #[graphql(default)] broken: bool) -> Vec<Item> {
        let count = first.unwrap_or(3).clamp(0, 100);
        (0..count)
            .map(|i| Item {
                id: i,
                name: format!("item-{}", i),
                owner_id: if broken && i == count - 1 { -1 } else { i % 4 },
            })
            .collect()
    }

    async fn failing(&self) -> FieldResult<String> {
        Err(async_graphql::Error::new("this field always fails")
            .extend_with(|_, e| e.set("errorType", "INTERNAL")))
    }
}

pub struct Mutation;

#[Object]
impl Mutation {
    async fn touch(&self, id: i32) -> i32 {
        id
    }
}

/// Builds the demo schema, installing the metrics extension when an observer
/// is given.
pub fn create_schema(observer: Option<Arc<ExecutionObserver>>, config: &TelemetryConfig) -> DemoSchema {
    let sink = match &observer {
        Some(observer) => observer.sink().clone(),
        None => Arc::new(crate::metrics::RecorderSink),
    };
    let owners = OwnerLoader::data_loader(sink, observer.is_some() && config.data_loader_timing);

    let builder = Schema::build(Query, Mutation, EmptySubscription).data(owners);
    match observer {
        Some(observer) => builder.extension(MetricsExtensionFactory::new(observer)).finish(),
        None => builder.finish(),
    }
}
