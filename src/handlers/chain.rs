use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::parse_config;
use crate::{
    core::{
        heap::{Heap, HeapObject, HeapResult, Heaplet},
        name::Name,
        pipeline::Chain,
    },
    ports::handler::{FilterRef, HandlerRef},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChainConfig {
    #[serde(default)]
    filters: Vec<Value>,
    handler: Value,
}

/// Heaplet for `Chain`: filters and handler are heap references or inline
/// declarations.
pub struct ChainHeaplet;

impl Heaplet for ChainHeaplet {
    fn create(&mut self, name: &Name, config: &Value, heap: &Heap) -> HeapResult<Option<HeapObject>> {
        let config: ChainConfig = parse_config(name, config)?;
        let filters = config
            .filters
            .iter()
            .map(|filter| heap.require_as::<FilterRef>(filter))
            .collect::<HeapResult<Vec<_>>>()?;
        let handler = heap.require_as::<HandlerRef>(&config.handler)?;
        tracing::debug!(object = %name, filters = filters.len(), "Built chain");
        Ok(Some(HeapObject::new(
            Arc::new(Chain::new(filters, handler)) as HandlerRef
        )))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::{
        core::heap::{HeapError, ObjectDeclaration},
        handlers::{builtin_registry, test_support::body_text},
        ports::handler::Context,
    };

    #[tokio::test]
    async fn test_chain_with_named_and_inline_references() {
        let heap = Heap::root(Name::of("test"), builtin_registry());
        heap.init(&[ObjectDeclaration {
            name: "tag".into(),
            type_name: "HeaderFilter".into(),
            config: json!({"messageType": "response", "add": {"X-Chain": "yes"}}),
        }])
        .unwrap();

        let handler = heap
            .require_as::<HandlerRef>(&json!({
                "type": "Chain",
                "config": {
                    "filters": ["tag"],
                    "handler": {"type": "StaticResponseHandler", "config": {"body": "end"}}
                }
            }))
            .unwrap();

        let response = handler
            .handle(&mut Context::new(), Request::new(Body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-chain"], "yes");
        assert_eq!(body_text(response).await, "end");
    }

    #[test]
    fn test_handler_used_as_filter_is_a_type_error() {
        let heap = Heap::root(Name::of("test"), builtin_registry());
        let error = heap
            .require_as::<HandlerRef>(&json!({
                "type": "Chain",
                "config": {
                    "filters": [{"type": "StaticResponseHandler"}],
                    "handler": {"type": "StaticResponseHandler"}
                }
            }))
            .err()
            .unwrap();
        assert!(matches!(error, HeapError::WrongType { .. }));
    }

    #[test]
    fn test_missing_handler_is_a_config_error() {
        let heap = Heap::root(Name::of("test"), builtin_registry());
        let error = heap
            .require_as::<HandlerRef>(&json!({"type": "Chain", "config": {"filters": []}}))
            .err()
            .unwrap();
        assert!(matches!(error, HeapError::Config { .. }));
    }
}
