use async_graphql_parser::types::{ExecutableDocument, OperationType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of GraphQL operation being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Upper-cased form used as a tag value.
    pub fn as_tag(&self) -> &'static str {
        match self {
            OperationKind::Query => "QUERY",
            OperationKind::Mutation => "MUTATION",
            OperationKind::Subscription => "SUBSCRIPTION",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl From<OperationType> for OperationKind {
    fn from(ty: OperationType) -> Self {
        match ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// One step of a response path: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}

impl PathSegment {
    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    /// Reads a segment from its JSON response form (string or non-negative integer).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PathSegment::Field(s.clone())),
            Value::Number(n) => n.as_u64().map(|i| PathSegment::Index(i as usize)),
            _ => None,
        }
    }

    /// True for list indices, and for field segments that parse as integers.
    pub fn is_index_like(&self) -> bool {
        match self {
            PathSegment::Index(_) => true,
            PathSegment::Field(s) => s.parse::<i64>().is_ok(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Field(s) => f.write_str(s),
        }
    }
}

/// Schema type reference as seen by the engine at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        TypeRef::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        TypeRef::List(Box::new(inner))
    }

    /// Name of the type after removing at most one non-null wrapper.
    pub fn unwrapped_name(&self) -> String {
        let unwrapped = match self {
            TypeRef::NonNull(inner) => inner.as_ref(),
            other => other,
        };
        match unwrapped {
            TypeRef::Named(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
        }
    }
}

/// What the engine knows about a field it is about to resolve.
#[derive(Debug, Clone)]
pub struct FieldFetchParams {
    pub parent_type: TypeRef,
    pub field_name: String,
    pub path: Vec<PathSegment>,
    /// Pure passthrough resolvers (property reads) are never timed.
    pub trivial: bool,
}

impl FieldFetchParams {
    pub fn new(parent_type: TypeRef, field_name: impl Into<String>) -> Self {
        Self {
            parent_type,
            field_name: field_name.into(),
            path: Vec::new(),
            trivial: false,
        }
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    pub fn trivial(mut self, trivial: bool) -> Self {
        self.trivial = trivial;
        self
    }

    /// `<ParentType>.<field>`
    pub fn field_identifier(&self) -> String {
        format!("{}.{}", self.parent_type.unwrapped_name(), self.field_name)
    }
}

/// Error raised by a field resolver. Passed back to the engine untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
    pub extensions: Map<String, Value>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Map::new(),
        }
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

/// Errors attached to an execution result, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphQLError {
    Validation {
        message: String,
        query_path: Option<Vec<PathSegment>>,
        error_type: Option<String>,
        extensions: Map<String, Value>,
    },
    Syntax {
        message: String,
        extensions: Map<String, Value>,
    },
    Generic {
        message: String,
        path: Option<Vec<PathSegment>>,
        extensions: Map<String, Value>,
    },
}

impl GraphQLError {
    pub fn validation(
        message: impl Into<String>,
        query_path: Option<Vec<PathSegment>>,
        error_type: Option<String>,
    ) -> Self {
        GraphQLError::Validation {
            message: message.into(),
            query_path,
            error_type,
            extensions: Map::new(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        GraphQLError::Syntax {
            message: message.into(),
            extensions: Map::new(),
        }
    }

    pub fn generic(message: impl Into<String>, path: Option<Vec<PathSegment>>) -> Self {
        GraphQLError::Generic {
            message: message.into(),
            path,
            extensions: Map::new(),
        }
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let extensions = match &mut self {
            GraphQLError::Validation { extensions, .. }
            | GraphQLError::Syntax { extensions, .. }
            | GraphQLError::Generic { extensions, .. } => extensions,
        };
        extensions.insert(key.into(), value.into());
        self
    }

    pub fn message(&self) -> &str {
        match self {
            GraphQLError::Validation { message, .. }
            | GraphQLError::Syntax { message, .. }
            | GraphQLError::Generic { message, .. } => message,
        }
    }

    pub fn extensions(&self) -> &Map<String, Value> {
        match self {
            GraphQLError::Validation { extensions, .. }
            | GraphQLError::Syntax { extensions, .. }
            | GraphQLError::Generic { extensions, .. } => extensions,
        }
    }

    /// Wraps a resolver error raised at `path`.
    pub fn from_field_error(error: &FieldError, path: Vec<PathSegment>) -> Self {
        GraphQLError::Generic {
            message: error.message.clone(),
            path: Some(path),
            extensions: error.extensions.clone(),
        }
    }
}

/// Outcome of one execution as reported by the engine.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(data: Option<Value>, errors: Vec<GraphQLError>) -> Self {
        Self { data, errors }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Inputs available once validation has finished.
#[derive(Debug, Clone, Copy)]
pub struct ValidationParams<'a> {
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub document: Option<&'a ExecutableDocument>,
    pub variables: Option<&'a Map<String, Value>>,
}

impl<'a> ValidationParams<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            operation_name: None,
            document: None,
            variables: None,
        }
    }

    pub fn operation_name(mut self, name: Option<&'a str>) -> Self {
        self.operation_name = name;
        self
    }

    pub fn document(mut self, document: &'a ExecutableDocument) -> Self {
        self.document = Some(document);
        self
    }

    pub fn variables(mut self, variables: &'a Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }
}
