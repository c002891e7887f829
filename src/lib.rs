//! Execution-lifecycle telemetry for GraphQL servers.
//!
//! An [`observer::ExecutionObserver`] turns each execution into a query
//! latency timer, per-resolver timers and deduplicated error counters, tagged
//! with the operation, a cardinality-limited operation name, a literal-free
//! query signature hash and a complexity bucket. [`graphql`] binds it to
//! async-graphql.

pub mod complexity;
pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod graphql;
pub mod limiter;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod sanitize;
pub mod server;
pub mod signature;
pub mod tags;
pub mod types;

pub use error::{Result, TelemetryError};
pub use observer::{ExecutionContext, ExecutionObserver, ExecutionStart};
