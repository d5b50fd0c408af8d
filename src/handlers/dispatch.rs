use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{EXPRESSION_COMPILER_KEY, parse_config};
use crate::{
    core::{
        condition::ConditionCompiler,
        heap::{Heap, HeapError, HeapObject, HeapResult, Heaplet},
        name::Name,
    },
    ports::{
        expression::{Bindings, Expression, ExpressionCompiler},
        handler::{Context, Handler, HandlerRef, plain_response},
    },
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatchConfig {
    bindings: Vec<BindingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingConfig {
    #[serde(default)]
    condition: Option<String>,
    handler: Value,
}

/// One conditional branch of a [`DispatchHandler`].
pub struct Binding {
    condition: Option<Arc<dyn Expression>>,
    handler: HandlerRef,
}

/// Hands the request to the first binding whose condition accepts it; a
/// binding without condition always accepts.
pub struct DispatchHandler {
    bindings: Vec<Binding>,
}

impl DispatchHandler {
    pub fn new(bindings: Vec<(Option<Arc<dyn Expression>>, HandlerRef)>) -> Self {
        Self {
            bindings: bindings
                .into_iter()
                .map(|(condition, handler)| Binding { condition, handler })
                .collect(),
        }
    }
}

#[async_trait]
impl Handler for DispatchHandler {
    async fn handle(&self, context: &mut Context, request: Request<Body>) -> Response<Body> {
        let bindings = Bindings::from_request(context, &request);
        let selected = self.bindings.iter().find(|binding| {
            binding
                .condition
                .as_ref()
                .is_none_or(|condition| condition.accepts(&bindings))
        });
        match selected {
            Some(binding) => binding.handler.handle(context, request).await,
            None => plain_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}

/// Heaplet for `DispatchHandler`. Conditions compile with the heap's
/// `ExpressionCompiler` object when one is reachable.
pub struct DispatchHeaplet;

impl Heaplet for DispatchHeaplet {
    fn create(&mut self, name: &Name, config: &Value, heap: &Heap) -> HeapResult<Option<HeapObject>> {
        let config: DispatchConfig = parse_config(name, config)?;
        let compiler: Arc<dyn ExpressionCompiler> = heap
            .resolve_as::<Arc<dyn ExpressionCompiler>>(
                &Value::String(EXPRESSION_COMPILER_KEY.to_string()),
                true,
            )?
            .unwrap_or_else(|| Arc::new(ConditionCompiler::new()));

        let mut bindings = Vec::with_capacity(config.bindings.len());
        for binding in config.bindings {
            let condition = binding
                .condition
                .as_deref()
                .map(|source| compiler.compile(source))
                .transpose()
                .map_err(|e| HeapError::config(name, e.to_string()))?;
            let handler = heap.require_as::<HandlerRef>(&binding.handler)?;
            bindings.push((condition, handler));
        }
        Ok(Some(HeapObject::new(
            Arc::new(DispatchHandler::new(bindings)) as HandlerRef
        )))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handlers::{builtin_registry, test_support::body_text};

    fn dispatcher() -> HandlerRef {
        let heap = Heap::root(Name::of("test"), builtin_registry());
        heap.require_as::<HandlerRef>(&json!({
            "type": "DispatchHandler",
            "config": {
                "bindings": [
                    {
                        "condition": "${request.path =~ '^/admin'}",
                        "handler": {"type": "StaticResponseHandler", "config": {"status": 403}}
                    },
                    {
                        "handler": {"type": "StaticResponseHandler", "config": {"body": "public"}}
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_accepting_binding_wins() {
        let handler = dispatcher();
        let request = Request::builder()
            .uri("/admin/users")
            .body(Body::empty())
            .unwrap();
        let response = handler.handle(&mut Context::new(), request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unconditional_binding_is_the_fallback() {
        let handler = dispatcher();
        let request = Request::builder().uri("/home").body(Body::empty()).unwrap();
        let response = handler.handle(&mut Context::new(), request).await;
        assert_eq!(body_text(response).await, "public");
    }

    #[tokio::test]
    async fn test_no_match_is_not_found() {
        let heap = Heap::root(Name::of("test"), builtin_registry());
        let handler = heap
            .require_as::<HandlerRef>(&json!({
                "type": "DispatchHandler",
                "config": {"bindings": [{
                    "condition": "false",
                    "handler": {"type": "StaticResponseHandler"}
                }]}
            }))
            .unwrap();
        let response = handler
            .handle(&mut Context::new(), Request::new(Body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_condition_is_a_config_error() {
        let heap = Heap::root(Name::of("test"), builtin_registry());
        let result = heap.require_as::<HandlerRef>(&json!({
            "type": "DispatchHandler",
            "config": {"bindings": [{
                "condition": "request.path ==",
                "handler": {"type": "StaticResponseHandler"}
            }]}
        }));
        assert!(matches!(result, Err(HeapError::Config { .. })));
    }
}
