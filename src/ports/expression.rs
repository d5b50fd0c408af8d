use std::{fmt, sync::Arc};

use axum::body::Body;
use http::Request;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::ports::handler::Context;

/// Error type for expression compilation
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExpressionError {
    #[error("invalid expression '{expression}' at offset {offset}: {message}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Request-scoped values an expression is evaluated against.
///
/// The tree exposes `attributes.*` (context attributes), `context.id`,
/// `context.client`, and `request.{method,uri,path,query,headers}` where
/// header names are lower-cased and map to their first value.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    root: Value,
}

impl Bindings {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn from_request(context: &Context, request: &Request<Body>) -> Self {
        let mut headers = Map::new();
        for (name, value) in request.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }
        Self::new(json!({
            "attributes": Value::Object(context.attributes.clone()),
            "context": {
                "id": context.id().to_string(),
                "client": context.client_addr().map(|a| a.ip().to_string()),
            },
            "request": {
                "method": request.method().as_str(),
                "uri": request.uri().to_string(),
                "path": request.uri().path(),
                "query": request.uri().query(),
                "headers": headers,
            },
        }))
    }

    /// Follow a dotted path (`request.headers.host`).
    pub fn lookup<'a, I>(&self, path: I) -> Option<&Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        path.into_iter()
            .try_fold(&self.root, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

/// A compiled condition or value expression.
pub trait Expression: Send + Sync + fmt::Debug {
    /// Evaluate against `bindings`; `None` when the expression has no value
    /// (missing binding, type mismatch).
    fn eval(&self, bindings: &Bindings) -> Option<Value>;

    /// The text the expression was compiled from.
    fn source(&self) -> &str;

    /// Evaluate as a condition: only a boolean `true` accepts.
    fn accepts(&self, bindings: &Bindings) -> bool {
        matches!(self.eval(bindings), Some(Value::Bool(true)))
    }
}

/// Compiles expression strings once, at configuration time.
pub trait ExpressionCompiler: Send + Sync + 'static {
    fn compile(&self, source: &str) -> Result<Arc<dyn Expression>, ExpressionError>;
}
