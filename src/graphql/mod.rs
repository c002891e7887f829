pub mod extension;
pub mod loaders;
pub mod schema;

pub use extension::{MetricsExtension, MetricsExtensionFactory};
pub use loaders::InstrumentedLoader;
pub use schema::{create_schema, DemoSchema};
