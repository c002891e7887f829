//! Bridges async-graphql's extension hooks onto an [`ExecutionObserver`].
//!
//! | async-graphql hook | observer hook |
//! |--------------------|---------------|
//! | `prepare_request`  | `on_execution_start` |
//! | `validation` (ok)  | `on_validation_complete` |
//! | `resolve`          | `start_field_timer` |
//! | `request` (end)    | `on_execution_complete` |

use crate::observer::{ExecutionContext, ExecutionObserver, ExecutionStart};
use crate::types::{
    ExecutionResult, FieldError, FieldFetchParams, GraphQLError, PathSegment, TypeRef,
    ValidationParams,
};
use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextParseQuery, NextPrepareRequest, NextRequest,
    NextResolve, NextValidation, ResolveInfo,
};
use async_graphql::parser::types::ExecutableDocument;
use async_graphql::{Request, Response, ServerError, ServerResult, ValidationResult, Value, Variables};
use once_cell::sync::OnceCell;
use serde_json::Map;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Installs a fresh [`MetricsExtension`] per request.
pub struct MetricsExtensionFactory {
    observer: Arc<ExecutionObserver>,
    response_data: bool,
}

impl MetricsExtensionFactory {
    pub fn new(observer: Arc<ExecutionObserver>) -> Self {
        Self {
            observer,
            response_data: false,
        }
    }

    /// Copies response data into [`ExecutionResult::data`] for tag providers
    /// that read it. Off by default.
    pub fn with_response_data(mut self, enabled: bool) -> Self {
        self.response_data = enabled;
        self
    }
}

impl ExtensionFactory for MetricsExtensionFactory {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(MetricsExtension::new(self.observer.clone()).with_response_data(self.response_data))
    }
}

/// Which phase, if any, rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Execution,
    Parse,
    Validation,
}

#[derive(Default)]
struct ParsedQuery {
    query: String,
    document: Option<ExecutableDocument>,
    variables: Option<Map<String, serde_json::Value>>,
}

pub struct MetricsExtension {
    observer: Arc<ExecutionObserver>,
    context: OnceCell<Arc<ExecutionContext>>,
    operation_name: OnceCell<Option<String>>,
    parsed: Mutex<ParsedQuery>,
    failed_phase: Mutex<Phase>,
    response_data: bool,
}

impl MetricsExtension {
    pub fn new(observer: Arc<ExecutionObserver>) -> Self {
        Self {
            observer,
            context: OnceCell::new(),
            operation_name: OnceCell::new(),
            parsed: Mutex::new(ParsedQuery::default()),
            failed_phase: Mutex::new(Phase::default()),
            response_data: false,
        }
    }

    pub fn with_response_data(mut self, enabled: bool) -> Self {
        self.response_data = enabled;
        self
    }

    fn fail(&self, phase: Phase) {
        *self.failed_phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn phase(&self) -> Phase {
        *self.failed_phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execution_result(&self, response: &Response) -> ExecutionResult {
        let phase = self.phase();
        let errors = response
            .errors
            .iter()
            .map(|error| convert_error(error, phase))
            .collect();
        let data = match &response.data {
            Value::Null => None,
            _ if !self.response_data => None,
            data => data.clone().into_json().ok(),
        };
        ExecutionResult::with_errors(data, errors)
    }
}

#[async_trait::async_trait]
impl Extension for MetricsExtension {
    async fn request(&self, ctx: &ExtensionContext<'_>, next: NextRequest<'_>) -> Response {
        let response = next.run(ctx).await;
        match self.context.get() {
            Some(context) => {
                let result = self.execution_result(&response);
                self.observer.on_execution_complete(context, &result, None);
            }
            None => debug!("request finished before execution start, nothing recorded"),
        }
        response
    }

    async fn prepare_request(
        &self,
        ctx: &ExtensionContext<'_>,
        request: Request,
        next: NextPrepareRequest<'_>,
    ) -> ServerResult<Request> {
        let operation_name = request.operation_name.clone();
        let start = ExecutionStart::new().operation_name(operation_name.clone());
        let _ = self.context.set(self.observer.on_execution_start(start));
        let _ = self.operation_name.set(operation_name);
        next.run(ctx, request).await
    }

    async fn parse_query(
        &self,
        ctx: &ExtensionContext<'_>,
        query: &str,
        variables: &Variables,
        next: NextParseQuery<'_>,
    ) -> ServerResult<ExecutableDocument> {
        let result = next.run(ctx, query, variables).await;
        let mut parsed = self.parsed.lock().unwrap_or_else(PoisonError::into_inner);
        parsed.query = query.to_string();
        match &result {
            Ok(document) => {
                parsed.document = Some(document.clone());
                parsed.variables = match variables.clone().into_value().into_json() {
                    Ok(serde_json::Value::Object(map)) => Some(map),
                    _ => None,
                };
            }
            Err(_) => {
                drop(parsed);
                self.fail(Phase::Parse);
            }
        }
        result
    }

    async fn validation(
        &self,
        ctx: &ExtensionContext<'_>,
        next: NextValidation<'_>,
    ) -> Result<ValidationResult, Vec<ServerError>> {
        let result = next.run(ctx).await;
        let Some(context) = self.context.get() else {
            return result;
        };

        let errors = match &result {
            Ok(_) => Vec::new(),
            Err(errors) => {
                self.fail(Phase::Validation);
                errors
                    .iter()
                    .map(|error| convert_error(error, Phase::Validation))
                    .collect()
            }
        };

        let operation_name = self.operation_name.get().cloned().flatten();
        let parsed = self.parsed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut params =
            ValidationParams::new(&parsed.query).operation_name(operation_name.as_deref());
        if let Some(document) = &parsed.document {
            params = params.document(document);
        }
        if let Some(variables) = &parsed.variables {
            params = params.variables(variables);
        }
        self.observer.on_validation_complete(context, &params, &errors);
        drop(parsed);

        result
    }

    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        let timer = self.context.get().and_then(|context| {
            let params = FieldFetchParams::new(TypeRef::named(info.parent_type), info.name)
                .with_path(
                    info.path_node
                        .to_string_vec()
                        .into_iter()
                        .map(path_segment)
                        .collect(),
                );
            self.observer.start_field_timer(context, params)
        });

        let result = next.run(ctx, info).await;
        if let Some(timer) = timer {
            let error = result.as_ref().err().map(field_error);
            timer.finish(error.as_ref());
        }
        result
    }
}

fn path_segment(segment: String) -> PathSegment {
    match segment.parse::<usize>() {
        Ok(index) => PathSegment::Index(index),
        Err(_) => PathSegment::Field(segment),
    }
}

fn extensions(error: &ServerError) -> Map<String, serde_json::Value> {
    match error
        .extensions
        .as_ref()
        .and_then(|extensions| serde_json::to_value(extensions).ok())
    {
        Some(serde_json::Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn field_error(error: &ServerError) -> FieldError {
    let mut field_error = FieldError::new(error.message.clone());
    field_error.extensions = extensions(error);
    field_error
}

/// Classifies an engine error by the phase that produced it.
fn convert_error(error: &ServerError, phase: Phase) -> GraphQLError {
    let extensions = extensions(error);
    let path: Vec<PathSegment> = error
        .path
        .iter()
        .map(|segment| match segment {
            async_graphql::PathSegment::Field(name) => PathSegment::Field(name.clone()),
            async_graphql::PathSegment::Index(index) => PathSegment::Index(*index),
        })
        .collect();

    let converted = match phase {
        Phase::Parse => GraphQLError::syntax(error.message.clone()),
        Phase::Validation => {
            let error_type = extensions
                .get(crate::constants::EXTENSION_ERROR_TYPE)
                .and_then(|value| value.as_str())
                .map(str::to_owned);
            GraphQLError::validation(error.message.clone(), Some(path), error_type)
        }
        Phase::Execution => GraphQLError::generic(error.message.clone(), Some(path)),
    };
    extensions
        .into_iter()
        .fold(converted, |error, (key, value)| error.with_extension(key, value))
}
