//! Normalizes the errors of one execution into bounded-cardinality records.
//!
//! List indices in error paths are replaced with a fixed token so that a batch
//! loader failing for every element of a list yields one record rather than
//! one per index.

use crate::constants::{
    EXTENSION_ERROR_DETAIL, EXTENSION_ERROR_TYPE, PATH_INDEX_TOKEN, SYNTAX_ERROR_CLASSIFICATION,
    TAG_VALUE_NONE, TAG_VALUE_UNKNOWN,
};
use crate::types::{GraphQLError, PathSegment};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One sanitized error, ready to become an error counter increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub normalized_path: Vec<String>,
    pub classification: String,
    pub detail: String,
}

impl ErrorRecord {
    /// Path rendered as a tag value, e.g. `[items, number, name]`.
    pub fn path_tag(&self) -> String {
        format!("[{}]", self.normalized_path.join(", "))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorPathSanitizer;

impl ErrorPathSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Sanitizes and deduplicates `errors`, keeping first appearances in order.
    ///
    /// Two errors are duplicates when both their normalized path and their
    /// classification match; the first one's detail is kept.
    pub fn sanitize(&self, errors: &[GraphQLError]) -> Vec<ErrorRecord> {
        let mut seen: HashSet<(Vec<String>, String)> = HashSet::new();
        let mut records = Vec::new();

        for error in errors {
            let record = self.to_record(error);
            let key = (record.normalized_path.clone(), record.classification.clone());
            if seen.insert(key) {
                records.push(record);
            }
        }
        records
    }

    fn to_record(&self, error: &GraphQLError) -> ErrorRecord {
        let detail = extension_value(error.extensions(), EXTENSION_ERROR_DETAIL, TAG_VALUE_NONE);
        let (normalized_path, classification) = match error {
            GraphQLError::Validation {
                query_path,
                error_type,
                ..
            } => (
                normalize_path(query_path.as_deref().unwrap_or_default()),
                error_type
                    .clone()
                    .unwrap_or_else(|| TAG_VALUE_UNKNOWN.to_string()),
            ),
            GraphQLError::Syntax { .. } => (Vec::new(), SYNTAX_ERROR_CLASSIFICATION.to_string()),
            GraphQLError::Generic {
                path, extensions, ..
            } => (
                normalize_path(path.as_deref().unwrap_or_default()),
                extension_value(extensions, EXTENSION_ERROR_TYPE, TAG_VALUE_UNKNOWN),
            ),
        };

        ErrorRecord {
            normalized_path,
            classification,
            detail,
        }
    }
}

pub fn normalize_path(path: &[PathSegment]) -> Vec<String> {
    path.iter()
        .map(|segment| {
            if segment.is_index_like() {
                PATH_INDEX_TOKEN.to_string()
            } else {
                segment.to_string()
            }
        })
        .collect()
}

fn extension_value(extensions: &Map<String, Value>, key: &str, default: &str) -> String {
    match extensions.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items_path(index: usize) -> Option<Vec<PathSegment>> {
        Some(vec![
            PathSegment::field("items"),
            PathSegment::Index(index),
            PathSegment::field("name"),
        ])
    }

    #[test]
    fn test_batched_errors_collapse_to_one_record() {
        let errors: Vec<GraphQLError> = (0..3)
            .map(|i| {
                GraphQLError::generic("lookup failed", items_path(i))
                    .with_extension("errorType", "UNAVAILABLE")
            })
            .collect();

        let records = ErrorPathSanitizer::new().sanitize(&errors);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].normalized_path, vec!["items", "number", "name"]);
        assert_eq!(records[0].path_tag(), "[items, number, name]");
        assert_eq!(records[0].classification, "UNAVAILABLE");
        assert_eq!(records[0].detail, "none");
    }

    #[test]
    fn test_kind_specific_extraction() {
        let errors = vec![
            GraphQLError::validation(
                "unknown field",
                Some(vec![PathSegment::field("shows"), PathSegment::field("bogus")]),
                Some("FieldUndefined".to_string()),
            ),
            GraphQLError::syntax("unexpected token").with_extension("errorDetail", "EOF"),
            GraphQLError::generic("no path", None),
        ];

        let records = ErrorPathSanitizer::new().sanitize(&errors);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].normalized_path, vec!["shows", "bogus"]);
        assert_eq!(records[0].classification, "FieldUndefined");
        assert_eq!(records[1].normalized_path, Vec::<String>::new());
        assert_eq!(records[1].classification, "InvalidSyntax");
        assert_eq!(records[1].detail, "EOF");
        assert_eq!(records[2].classification, "unknown");
        assert_eq!(records[2].path_tag(), "[]");
    }

    #[test]
    fn test_same_path_different_classification_kept() {
        let errors = vec![
            GraphQLError::generic("a", items_path(0)).with_extension("errorType", "NOT_FOUND"),
            GraphQLError::generic("b", items_path(1)).with_extension("errorType", "INTERNAL"),
            GraphQLError::generic("c", items_path(2)).with_extension("errorType", "NOT_FOUND"),
        ];

        let records = ErrorPathSanitizer::new().sanitize(&errors);
        let classes: Vec<&str> = records.iter().map(|r| r.classification.as_str()).collect();
        assert_eq!(classes, vec!["NOT_FOUND", "INTERNAL"]);
    }

    #[test]
    fn test_first_detail_wins() {
        let errors = vec![
            GraphQLError::generic("a", items_path(0)).with_extension("errorDetail", "FIRST"),
            GraphQLError::generic("b", items_path(4)).with_extension("errorDetail", "SECOND"),
        ];
        let records = ErrorPathSanitizer::new().sanitize(&errors);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detail, "FIRST");
    }

    #[test]
    fn test_non_string_extension_is_stringified() {
        let errors = vec![GraphQLError::generic("a", None).with_extension("errorType", 503)];
        let records = ErrorPathSanitizer::new().sanitize(&errors);
        assert_eq!(records[0].classification, "503");
    }
}
