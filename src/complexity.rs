//! Structural cost of a query, reported as a bucket.
//!
//! Every field costs one plus the cost of its selected children, except
//! introspection fields which cost nothing. Fragments are expanded in place, so a
//! field reached through a fragment counts exactly as if it were written
//! inline. The raw score is then mapped onto a small fixed set of buckets to
//! keep the resulting tag low-cardinality.

use crate::constants::DEFAULT_COMPLEXITY_BUCKETS;
use crate::document::{is_included, select_operation};
use crate::error::{Result, TelemetryError};
use async_graphql_parser::types::{ExecutableDocument, Field, Selection, SelectionSet};
use serde_json::{Map, Value};
use tracing::error;

/// `__typename`, `__schema` and `__type` cost nothing, nor does anything below them.
const INTROSPECTION_PREFIX: &str = "__";

/// Upper bound on collected fields plus fragment expansions.
pub const DEFAULT_MAX_NODES: usize = 50_000;

#[derive(Debug, Clone)]
pub struct ComplexityEstimator {
    buckets: Vec<u32>,
    max_nodes: usize,
}

enum Step<'d> {
    Enter { field: &'d Field, parent: usize },
    Exit { node: usize, parent: usize, free: bool },
}

impl ComplexityEstimator {
    pub fn new(buckets: Vec<u32>) -> Self {
        Self {
            buckets,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn buckets(&self) -> &[u32] {
        &self.buckets
    }

    /// Bucketed complexity of the selected operation. Traversal failures are
    /// logged and reported as `None`.
    pub fn estimate(
        &self,
        document: &ExecutableDocument,
        operation_name: Option<&str>,
        variables: Option<&Map<String, Value>>,
    ) -> Option<u32> {
        match self.score(document, operation_name, variables) {
            Ok(score) => self.bucket(score),
            Err(e) => {
                error!(operation_name = operation_name.unwrap_or_default(), error = %e, "Unable to compute the query complexity");
                None
            }
        }
    }

    /// Smallest bucket strictly greater than `score`.
    pub fn bucket(&self, score: u32) -> Option<u32> {
        self.buckets.iter().copied().filter(|&b| score < b).min()
    }

    /// Raw complexity score via an iterative post-order walk.
    ///
    /// `totals[n]` accumulates the cost of node `n`'s children; node 0 is the
    /// operation root. A node's exit step runs after all of its children.
    pub fn score(
        &self,
        document: &ExecutableDocument,
        operation_name: Option<&str>,
        variables: Option<&Map<String, Value>>,
    ) -> Result<u32> {
        let (_, operation) = select_operation(document, operation_name)?;

        let mut totals: Vec<u32> = vec![0];
        let mut stack: Vec<Step<'_>> = Vec::new();
        let mut budget = self.max_nodes;
        self.push_children(&mut stack, &mut budget, document, &operation.selection_set.node, 0, variables)?;

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter { field, parent } => {
                    let node = totals.len();
                    totals.push(0);
                    let free = field.name.node.starts_with(INTROSPECTION_PREFIX);
                    stack.push(Step::Exit { node, parent, free });
                    if !free {
                        self.push_children(
                            &mut stack,
                            &mut budget,
                            document,
                            &field.selection_set.node,
                            node,
                            variables,
                        )?;
                    }
                }
                Step::Exit { node, parent, free } => {
                    let cost = if free { 0 } else { totals[node].saturating_add(1) };
                    totals[parent] = totals[parent].saturating_add(cost);
                }
            }
        }

        Ok(totals[0])
    }

    fn push_children<'d>(
        &self,
        stack: &mut Vec<Step<'d>>,
        budget: &mut usize,
        document: &'d ExecutableDocument,
        selection_set: &'d SelectionSet,
        parent: usize,
        variables: Option<&Map<String, Value>>,
    ) -> Result<()> {
        let mut fields = Vec::new();
        let mut walk = FragmentWalk {
            document,
            variables,
            active_fragments: Vec::new(),
            budget,
            max_nodes: self.max_nodes,
        };
        walk.collect_fields(selection_set, &mut fields)?;
        // Reversed so children are entered in document order.
        stack.extend(fields.into_iter().rev().map(|field| Step::Enter { field, parent }));
        Ok(())
    }
}

impl Default for ComplexityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLEXITY_BUCKETS.to_vec())
    }
}

/// State of one selection-set flattening.
///
/// `budget` is shared by the whole traversal and is charged for every
/// collected field and every fragment expansion, so fragments that fan out
/// fail as soon as the budget runs out instead of after expanding in full.
struct FragmentWalk<'d, 'b> {
    document: &'d ExecutableDocument,
    variables: Option<&'b Map<String, Value>>,
    active_fragments: Vec<&'d str>,
    budget: &'b mut usize,
    max_nodes: usize,
}

impl<'d, 'b> FragmentWalk<'d, 'b> {
    fn charge(&mut self) -> Result<()> {
        match self.budget.checked_sub(1) {
            Some(left) => {
                *self.budget = left;
                Ok(())
            }
            None => Err(TelemetryError::TraversalBudget(self.max_nodes)),
        }
    }

    /// Flattens a selection set into its fields, expanding fragments.
    fn collect_fields(
        &mut self,
        selection_set: &'d SelectionSet,
        out: &mut Vec<&'d Field>,
    ) -> Result<()> {
        for item in &selection_set.items {
            match &item.node {
                Selection::Field(field) => {
                    if is_included(&field.node.directives, self.variables) {
                        self.charge()?;
                        out.push(&field.node);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if is_included(&fragment.node.directives, self.variables) {
                        self.charge()?;
                        self.collect_fields(&fragment.node.selection_set.node, out)?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !is_included(&spread.node.directives, self.variables) {
                        continue;
                    }
                    let name = &spread.node.fragment_name.node;
                    if self.active_fragments.contains(&name.as_str()) {
                        return Err(TelemetryError::FragmentCycle(name.to_string()));
                    }
                    let fragment = self
                        .document
                        .fragments
                        .get(name)
                        .ok_or_else(|| TelemetryError::UnknownFragment(name.to_string()))?;
                    self.charge()?;
                    self.active_fragments.push(name.as_str());
                    self.collect_fields(&fragment.node.selection_set.node, out)?;
                    self.active_fragments.pop();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse;
    use serde_json::json;

    fn score(query: &str) -> Result<u32> {
        let doc = parse(query).unwrap();
        ComplexityEstimator::default().score(&doc, None, None)
    }

    #[test]
    fn test_flat_and_nested_scores() {
        assert_eq!(score("{ a b c }").unwrap(), 3);
        // a(1 + b(1 + c(1)) ) = 3
        assert_eq!(score("{ a { b { c } } }").unwrap(), 3);
        // shows(1 + id + venue(1 + name)) = 1 + 1 + 2 = 4
        assert_eq!(score("{ shows { id venue { name } } }").unwrap(), 4);
    }

    #[test]
    fn test_typename_is_free() {
        assert_eq!(score("{ __typename }").unwrap(), 0);
        assert_eq!(score("{ shows { __typename id } }").unwrap(), 2);
        assert_eq!(score("{ __schema { types { name fields { name } } } }").unwrap(), 0);
    }

    #[test]
    fn test_fragments_are_expanded() {
        let inline = score("{ shows { id venue { name city } } }").unwrap();
        let spread = score(
            "query { shows { ...ShowParts } } fragment ShowParts on Show { id venue { ...on Venue { name city } } }",
        )
        .unwrap();
        assert_eq!(inline, spread);
    }

    #[test]
    fn test_skipped_fields_do_not_count() {
        let doc = parse("query Q($v: Boolean) { a b @skip(if: true) c @include(if: $v) }").unwrap();
        let vars = json!({"v": false});
        let estimator = ComplexityEstimator::default();
        assert_eq!(estimator.score(&doc, None, vars.as_object()).unwrap(), 1);
    }

    #[test]
    fn test_bucket_boundaries() {
        let estimator = ComplexityEstimator::default();
        assert_eq!(estimator.bucket(0), Some(5));
        assert_eq!(estimator.bucket(4), Some(5));
        assert_eq!(estimator.bucket(5), Some(10));
        assert_eq!(estimator.bucket(101), Some(200));
        assert_eq!(estimator.bucket(9_999), Some(10_000));
        assert_eq!(estimator.bucket(10_000), None);
        assert_eq!(estimator.bucket(u32::MAX), None);
    }

    #[test]
    fn test_failures_yield_absent_bucket() {
        let estimator = ComplexityEstimator::default();

        let unknown = parse("{ shows { ...Missing } }").unwrap();
        assert!(matches!(
            estimator.score(&unknown, None, None),
            Err(TelemetryError::UnknownFragment(_))
        ));
        assert_eq!(estimator.estimate(&unknown, None, None), None);

        let cyclic = parse("{ ...A } fragment A on Query { ...B } fragment B on Query { ...A }").unwrap();
        assert!(matches!(
            estimator.score(&cyclic, None, None),
            Err(TelemetryError::FragmentCycle(_))
        ));
    }

    #[test]
    fn test_recursive_fragment_hits_budget() {
        let doc = parse("{ ...Loop } fragment Loop on Query { me { ...Loop } }").unwrap();
        let estimator = ComplexityEstimator::default().with_max_nodes(100);
        assert!(matches!(
            estimator.score(&doc, None, None),
            Err(TelemetryError::TraversalBudget(100))
        ));
    }

    fn fan_out_document(levels: usize, leaf: &str) -> String {
        let mut query = String::from("{ ...F0 }\n");
        for level in 0..levels {
            query.push_str(&format!(
                "fragment F{} on Query {{ ...F{} ...F{} }}\n",
                level,
                level + 1,
                level + 1
            ));
        }
        query.push_str(&format!("fragment F{} on Query {{ {} }}\n", levels, leaf));
        query
    }

    #[test]
    fn test_fragment_fan_out_hits_budget_early() {
        let estimator = ComplexityEstimator::default().with_max_nodes(100);

        let doc = parse(&fan_out_document(40, "a")).unwrap();
        assert!(matches!(
            estimator.score(&doc, None, None),
            Err(TelemetryError::TraversalBudget(100))
        ));

        // Skipped leaves add no fields, but the expansions are still charged.
        let doc = parse(&fan_out_document(40, "a @skip(if: true)")).unwrap();
        assert!(matches!(
            estimator.score(&doc, None, None),
            Err(TelemetryError::TraversalBudget(100))
        ));
    }

    #[test]
    fn test_small_fan_out_within_budget() {
        let doc = parse(&fan_out_document(3, "a")).unwrap();
        assert_eq!(ComplexityEstimator::default().score(&doc, None, None).unwrap(), 8);
    }

    #[test]
    fn test_estimate_returns_bucket() {
        let doc = parse("{ shows { id venue { name } } }").unwrap();
        assert_eq!(ComplexityEstimator::default().estimate(&doc, None, None), Some(5));
    }
}
