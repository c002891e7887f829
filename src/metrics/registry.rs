//! Documentation and registration of every metric the crate emits.

use crate::constants::{GqlMetric, GqlTag};
use std::collections::HashMap;
use tracing::{info, warn};

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub metric: GqlMetric,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<GqlTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Timer,
}

const EXECUTION_LABELS: [GqlTag; 5] = [
    GqlTag::Operation,
    GqlTag::OperationName,
    GqlTag::QueryComplexity,
    GqlTag::QuerySigHash,
    GqlTag::Outcome,
];

pub fn metrics_documentation() -> Vec<MetricDoc> {
    let with = |extra: &[GqlTag]| {
        let mut labels = EXECUTION_LABELS.to_vec();
        labels.extend_from_slice(extra);
        labels
    };

    vec![
        MetricDoc {
            metric: GqlMetric::Query,
            metric_type: MetricType::Timer,
            help: "Elapsed time of a GraphQL query execution in seconds",
            labels: with(&[]),
        },
        MetricDoc {
            metric: GqlMetric::Error,
            metric_type: MetricType::Counter,
            help: "GraphQL errors encountered during query execution, deduplicated per sanitized path",
            labels: with(&[GqlTag::Path, GqlTag::ErrorCode, GqlTag::ErrorDetail]),
        },
        MetricDoc {
            metric: GqlMetric::Resolver,
            metric_type: MetricType::Timer,
            help: "Elapsed time of each field resolver invocation in seconds",
            labels: with(&[GqlTag::Field]),
        },
        MetricDoc {
            metric: GqlMetric::DataLoader,
            metric_type: MetricType::Timer,
            help: "Elapsed time of a data loader batch in seconds",
            labels: vec![GqlTag::LoaderName, GqlTag::LoaderBatchSize, GqlTag::Outcome],
        },
        MetricDoc {
            metric: GqlMetric::QuerySignatureLatency,
            metric_type: MetricType::Timer,
            help: "Elapsed time of query signature lookups in seconds",
            labels: vec![GqlTag::Method, GqlTag::Outcome],
        },
    ]
}

/// Describes every metric to the installed recorder and warns on duplicate names.
pub fn register_all_metrics() {
    let mut seen: HashMap<&'static str, MetricDoc> = HashMap::new();

    for doc in metrics_documentation() {
        let name = doc.metric.as_str();
        if seen.contains_key(name) {
            warn!("Metric name conflict detected: '{}' is documented twice", name);
            continue;
        }
        match doc.metric_type {
            MetricType::Counter => ::metrics::describe_counter!(name, doc.help),
            MetricType::Timer => ::metrics::describe_histogram!(name, doc.help),
        }
        seen.insert(name, doc);
    }

    info!("Registered {} GraphQL metrics", seen.len());
}
