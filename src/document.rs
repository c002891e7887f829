//! Helpers over parsed executable documents shared by the complexity
//! traversal and the signature printer.

use crate::error::{Result, TelemetryError};
use async_graphql_parser::types::{
    Directive, DocumentOperations, ExecutableDocument, OperationDefinition,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{Name, Value};
use serde_json::Map;

/// Parses query text, mapping parser failures into [`TelemetryError::Parse`].
pub fn parse(query: &str) -> Result<ExecutableDocument> {
    async_graphql_parser::parse_query(query).map_err(|e| TelemetryError::Parse(e.to_string()))
}

/// Picks the operation an execution runs: the named one, or the only one.
pub fn select_operation<'d>(
    document: &'d ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<(Option<&'d Name>, &'d OperationDefinition)> {
    match &document.operations {
        DocumentOperations::Single(operation) => Ok((None, &operation.node)),
        DocumentOperations::Multiple(operations) => {
            let found = match operation_name {
                Some(wanted) => operations.iter().find(|(name, _)| name.as_str() == wanted),
                None if operations.len() == 1 => operations.iter().next(),
                None => None,
            };
            found
                .map(|(name, operation)| (Some(name), &operation.node))
                .ok_or_else(|| TelemetryError::UnknownOperation(operation_name.map(str::to_owned)))
        }
    }
}

/// Evaluates `@skip(if:)` and `@include(if:)`. Conditions that cannot be
/// resolved leave the selection included.
pub fn is_included(
    directives: &[Positioned<Directive>],
    variables: Option<&Map<String, serde_json::Value>>,
) -> bool {
    for directive in directives {
        let name = directive.node.name.node.as_str();
        if name != "skip" && name != "include" {
            continue;
        }
        let condition = directive
            .node
            .arguments
            .iter()
            .find(|(arg, _)| arg.node.as_str() == "if")
            .and_then(|(_, value)| condition_value(&value.node, variables));

        match (name, condition) {
            ("skip", Some(true)) | ("include", Some(false)) => return false,
            _ => {}
        }
    }
    true
}

fn condition_value(value: &Value, variables: Option<&Map<String, serde_json::Value>>) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Variable(name) => variables?.get(name.as_str())?.as_bool(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_named_operation() {
        let doc = parse("query A { shows { id } } query B { venues { id } }").unwrap();
        let (name, _) = select_operation(&doc, Some("B")).unwrap();
        assert_eq!(name.map(|n| n.as_str()), Some("B"));
        assert!(select_operation(&doc, None).is_err());
        assert!(select_operation(&doc, Some("C")).is_err());
    }

    #[test]
    fn test_select_anonymous_operation() {
        let doc = parse("{ shows { id } }").unwrap();
        let (name, _) = select_operation(&doc, None).unwrap();
        assert!(name.is_none());
    }

    #[test]
    fn test_parse_failure_is_reported() {
        assert!(matches!(parse("{ shows {"), Err(TelemetryError::Parse(_))));
    }

    #[test]
    fn test_skip_and_include_conditions() {
        let doc = parse(
            "query Q($hide: Boolean) { a @skip(if: true) b @include(if: false) c @skip(if: $hide) d }",
        )
        .unwrap();
        let (_, op) = select_operation(&doc, None).unwrap();
        let vars = json!({"hide": true});
        let vars = vars.as_object();
        let included: Vec<bool> = op
            .selection_set
            .node
            .items
            .iter()
            .map(|item| match &item.node {
                async_graphql_parser::types::Selection::Field(f) => {
                    is_included(&f.node.directives, vars)
                }
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(included, vec![false, false, false, true]);
    }
}
