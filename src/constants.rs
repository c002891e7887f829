//! Metric names, tag keys and well-known tag values shared by every emitter.

use std::fmt;

/// Metrics emitted by the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GqlMetric {
    /// Timer for a whole query execution.
    Query,
    /// Counter of sanitized errors found in an execution result.
    Error,
    /// Timer for one field resolver invocation.
    Resolver,
    /// Timer for one data loader batch.
    DataLoader,
    /// Timer for query signature lookups.
    QuerySignatureLatency,
}

impl GqlMetric {
    pub const ALL: [GqlMetric; 5] = [
        GqlMetric::Query,
        GqlMetric::Error,
        GqlMetric::Resolver,
        GqlMetric::DataLoader,
        GqlMetric::QuerySignatureLatency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GqlMetric::Query => "gql_query",
            GqlMetric::Error => "gql_error",
            GqlMetric::Resolver => "gql_resolver",
            GqlMetric::DataLoader => "gql_data_loader",
            GqlMetric::QuerySignatureLatency => "gql_query_signature_latency",
        }
    }
}

impl fmt::Display for GqlMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag keys applied to [`GqlMetric`] series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GqlTag {
    /// QUERY, MUTATION or SUBSCRIPTION.
    Operation,
    /// Operation name, `anonymous` when the document has none.
    OperationName,
    /// Sanitized error path.
    Path,
    /// Error classification such as `InvalidSyntax` or `INTERNAL`.
    ErrorCode,
    /// Optional error detail taken from the error extensions.
    ErrorDetail,
    /// `<ParentType>.<field>` of the resolved field.
    Field,
    LoaderName,
    LoaderBatchSize,
    Outcome,
    QueryComplexity,
    /// Hash of the query signature, absent when validation failed.
    QuerySigHash,
    Method,
}

impl GqlTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GqlTag::Operation => "gql_operation",
            GqlTag::OperationName => "gql_operation_name",
            GqlTag::Path => "gql_path",
            GqlTag::ErrorCode => "gql_error_code",
            GqlTag::ErrorDetail => "gql_error_detail",
            GqlTag::Field => "gql_field",
            GqlTag::LoaderName => "gql_loader_name",
            GqlTag::LoaderBatchSize => "gql_loader_batch_size",
            GqlTag::Outcome => "outcome",
            GqlTag::QueryComplexity => "gql_query_complexity",
            GqlTag::QuerySigHash => "gql_query_sig_hash",
            GqlTag::Method => "method",
        }
    }
}

impl fmt::Display for GqlTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const TAG_VALUE_NONE: &str = "none";
pub const TAG_VALUE_ANONYMOUS: &str = "anonymous";
pub const TAG_VALUE_UNKNOWN: &str = "unknown";
pub const TAG_VALUE_SUCCESS: &str = "success";
pub const TAG_VALUE_FAILURE: &str = "failure";

/// Replacement value once a cardinality limiter is full.
pub const OVERFLOW_SENTINEL: &str = "--others--";

/// Replacement for list indices in sanitized error paths.
pub const PATH_INDEX_TOKEN: &str = "number";

/// Classification given to every syntax error.
pub const SYNTAX_ERROR_CLASSIFICATION: &str = "InvalidSyntax";

pub const DEFAULT_LIMITER_CAPACITY: usize = 100;

pub const DEFAULT_COMPLEXITY_BUCKETS: [u32; 11] =
    [5, 10, 25, 50, 100, 200, 500, 1000, 2000, 5000, 10000];

/// Field identifiers containing any of these are never timed.
pub const INSTRUMENTATION_IGNORES: [&str; 5] = ["__typename", "__schema", "__type", "__Schema", "__Type"];

/// Error extension keys read by the sanitizer.
pub const EXTENSION_ERROR_TYPE: &str = "errorType";
pub const EXTENSION_ERROR_DETAIL: &str = "errorDetail";

/// Returns true when a field identifier belongs to introspection machinery.
pub fn should_ignore_field(field: &str) -> bool {
    INSTRUMENTATION_IGNORES.iter().any(|ignored| field.contains(ignored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prometheus_safe() {
        for metric in GqlMetric::ALL {
            assert!(metric
                .as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_should_ignore_field() {
        assert!(should_ignore_field("Query.__typename"));
        assert!(should_ignore_field("__Schema.types"));
        assert!(should_ignore_field("__Type.fields"));
        assert!(should_ignore_field("Query.__schema"));
        assert!(!should_ignore_field("Query.shows"));
    }
}
