//! Canonical, literal-free rendering of one operation.
//!
//! The output keeps only what determines the shape of a query: the selected
//! operation, the fragments it actually uses, field names, argument names and
//! directives. Aliases are dropped, literal values are replaced by a fixed
//! value of the same kind, and selections, arguments, directives, variables
//! and fragments are sorted so that formatting and ordering differences do not
//! produce distinct signatures.

use crate::document::select_operation;
use crate::error::{Result, TelemetryError};
use crate::types::OperationKind;
use async_graphql_parser::types::{
    Directive, ExecutableDocument, Field, OperationDefinition, Selection, SelectionSet,
    VariableDefinition,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Name, Value};
use std::collections::BTreeSet;

pub fn print_signature(document: &ExecutableDocument, operation_name: Option<&str>) -> Result<String> {
    let (name, operation) = select_operation(document, operation_name)?;

    let mut used = BTreeSet::new();
    collect_fragments(document, &operation.selection_set.node, &mut used)?;

    let mut out = vec![print_operation(name, operation)];
    for fragment_name in &used {
        // Presence was checked while collecting.
        if let Some(fragment) = document.fragments.iter().find(|(n, _)| n.as_str() == fragment_name) {
            let (name, definition) = fragment;
            out.push(format!(
                "fragment {} on {}{} {}",
                name,
                definition.node.type_condition.node.on.node,
                print_directives(&definition.node.directives),
                print_selection_set(&definition.node.selection_set.node)
            ));
        }
    }
    Ok(out.join("\n"))
}

fn collect_fragments(
    document: &ExecutableDocument,
    selection_set: &SelectionSet,
    used: &mut BTreeSet<String>,
) -> Result<()> {
    for item in &selection_set.items {
        match &item.node {
            Selection::Field(field) => {
                collect_fragments(document, &field.node.selection_set.node, used)?
            }
            Selection::InlineFragment(fragment) => {
                collect_fragments(document, &fragment.node.selection_set.node, used)?
            }
            Selection::FragmentSpread(spread) => {
                let name = &spread.node.fragment_name.node;
                let fragment = document
                    .fragments
                    .get(name)
                    .ok_or_else(|| TelemetryError::UnknownFragment(name.to_string()))?;
                if used.insert(name.to_string()) {
                    collect_fragments(document, &fragment.node.selection_set.node, used)?;
                }
            }
        }
    }
    Ok(())
}

fn print_operation(name: Option<&Name>, operation: &OperationDefinition) -> String {
    let mut out = String::from(OperationKind::from(operation.ty).keyword());
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name.as_str());
    }
    out.push_str(&print_variables(&operation.variable_definitions));
    out.push_str(&print_directives(&operation.directives));
    out.push(' ');
    out.push_str(&print_selection_set(&operation.selection_set.node));
    out
}

fn print_variables(variables: &[Positioned<VariableDefinition>]) -> String {
    if variables.is_empty() {
        return String::new();
    }
    let mut printed: Vec<String> = variables
        .iter()
        .map(|v| {
            let mut s = format!("${}: {}", v.node.name.node, v.node.var_type.node);
            if let Some(default) = &v.node.default_value {
                s.push_str(" = ");
                s.push_str(&hidden_const_value(&default.node));
            }
            s
        })
        .collect();
    printed.sort();
    format!("({})", printed.join(", "))
}

fn print_arguments(arguments: &[(Positioned<Name>, Positioned<Value>)]) -> String {
    if arguments.is_empty() {
        return String::new();
    }
    let mut printed: Vec<String> = arguments
        .iter()
        .map(|(name, value)| format!("{}: {}", name.node, hidden_value(&value.node)))
        .collect();
    printed.sort();
    format!("({})", printed.join(", "))
}

fn print_directives(directives: &[Positioned<Directive>]) -> String {
    let mut printed: Vec<String> = directives
        .iter()
        .map(|d| format!(" @{}{}", d.node.name.node, print_arguments(&d.node.arguments)))
        .collect();
    printed.sort();
    printed.concat()
}

fn print_selection_set(selection_set: &SelectionSet) -> String {
    let mut items: Vec<(u8, String, String)> = selection_set
        .items
        .iter()
        .map(|item| match &item.node {
            Selection::Field(field) => (0, field.node.name.node.to_string(), print_field(&field.node)),
            Selection::FragmentSpread(spread) => {
                let name = spread.node.fragment_name.node.to_string();
                let printed = format!("...{}{}", name, print_directives(&spread.node.directives));
                (1, name, printed)
            }
            Selection::InlineFragment(fragment) => {
                let on = fragment
                    .node
                    .type_condition
                    .as_ref()
                    .map(|c| c.node.on.node.to_string())
                    .unwrap_or_default();
                let condition = if on.is_empty() { String::new() } else { format!(" on {}", on) };
                let printed = format!(
                    "...{}{} {}",
                    condition,
                    print_directives(&fragment.node.directives),
                    print_selection_set(&fragment.node.selection_set.node)
                );
                (2, on, printed)
            }
        })
        .collect();
    items.sort();
    items.dedup();

    let body: Vec<String> = items.into_iter().map(|(_, _, printed)| printed).collect();
    format!("{{{}}}", body.join(" "))
}

fn print_field(field: &Field) -> String {
    let mut out = field.name.node.to_string();
    out.push_str(&print_arguments(&field.arguments));
    out.push_str(&print_directives(&field.directives));
    if !field.selection_set.node.items.is_empty() {
        out.push(' ');
        out.push_str(&print_selection_set(&field.selection_set.node));
    }
    out
}

fn hidden_value(value: &Value) -> String {
    match value {
        Value::Variable(name) => format!("${}", name),
        Value::Null => "null".to_string(),
        Value::Number(n) if n.is_f64() => "0.0".to_string(),
        Value::Number(_) => "0".to_string(),
        Value::Boolean(_) => "false".to_string(),
        Value::Enum(name) => name.to_string(),
        Value::List(_) => "[]".to_string(),
        Value::Object(_) => "{}".to_string(),
        _ => "\"\"".to_string(),
    }
}

fn hidden_const_value(value: &ConstValue) -> String {
    match value {
        ConstValue::Null => "null".to_string(),
        ConstValue::Number(n) if n.is_f64() => "0.0".to_string(),
        ConstValue::Number(_) => "0".to_string(),
        ConstValue::Boolean(_) => "false".to_string(),
        ConstValue::Enum(name) => name.to_string(),
        ConstValue::List(_) => "[]".to_string(),
        ConstValue::Object(_) => "{}".to_string(),
        _ => "\"\"".to_string(),
    }
}
