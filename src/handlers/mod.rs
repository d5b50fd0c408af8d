//! Built-in object types that route files can declare.
//!
//! Every type is exposed to the heap through a [`Heaplet`](crate::core::heap::Heaplet)
//! registered by [`register_builtin`]. Handlers are stored in the heap as
//! [`HandlerRef`](crate::ports::handler::HandlerRef), filters as
//! [`FilterRef`](crate::ports::handler::FilterRef).
use std::collections::BTreeMap;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::core::{
    heap::{HeapError, HeapResult, HeapletRegistry},
    name::Name,
};

pub mod chain;
pub mod dispatch;
pub mod header_filter;
pub mod reverse_proxy;
pub mod static_response;

pub use chain::ChainHeaplet;
pub use dispatch::{DispatchHandler, DispatchHeaplet};
pub use header_filter::{HeaderFilter, HeaderFilterHeaplet, MessageType};
pub use reverse_proxy::{ReverseProxyHandler, ReverseProxyHeaplet};
pub use static_response::{StaticResponseHandler, StaticResponseHeaplet};

/// Heap key of the shared outbound client seeded into the root heap.
pub const HTTP_CLIENT_KEY: &str = "HttpClient";
/// Heap key of the expression compiler seeded into the root heap.
pub const EXPRESSION_COMPILER_KEY: &str = "ExpressionCompiler";

/// Register every built-in object type.
pub fn register_builtin(registry: &mut HeapletRegistry) -> &mut HeapletRegistry {
    registry
        .register("StaticResponseHandler", || Box::new(StaticResponseHeaplet))
        .register("Chain", || Box::new(ChainHeaplet))
        .register("HeaderFilter", || Box::new(HeaderFilterHeaplet))
        .register("ReverseProxyHandler", || Box::new(ReverseProxyHeaplet))
        .register("DispatchHandler", || Box::new(DispatchHeaplet))
}

/// Registry pre-loaded with the built-in types.
pub fn builtin_registry() -> HeapletRegistry {
    let mut registry = HeapletRegistry::new();
    register_builtin(&mut registry);
    registry
}

/// Deserialize a heaplet configuration, reporting errors against `name`.
pub(crate) fn parse_config<T: DeserializeOwned>(name: &Name, config: &Value) -> HeapResult<T> {
    let config = match config {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(config).map_err(|e| HeapError::config(name, e.to_string()))
}

/// A header value, or several values for the same header.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    fn values(&self) -> &[String] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

/// Validate configured headers once, at build time.
pub(crate) fn header_map(
    name: &Name,
    headers: &BTreeMap<String, HeaderValues>,
) -> HeapResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (header, values) in headers {
        let header = HeaderName::try_from(header.as_str())
            .map_err(|e| HeapError::config(name, format!("invalid header name '{header}': {e}")))?;
        for value in values.values() {
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                HeapError::config(name, format!("invalid value for header '{header}': {e}"))
            })?;
            map.append(header.clone(), value);
        }
    }
    Ok(map)
}
