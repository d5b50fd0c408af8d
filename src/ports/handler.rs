use std::{fmt, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response, StatusCode, header};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Per-request state shared by every filter and handler of a pipeline.
#[derive(Debug, Clone)]
pub struct Context {
    id: Uuid,
    client_addr: Option<SocketAddr>,
    route_id: Option<String>,
    /// Free-form request attributes, visible to conditions as `attributes.*`.
    pub attributes: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            client_addr: None,
            route_id: None,
            attributes: Map::new(),
        }
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Id of the route that accepted this request, once dispatched.
    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    pub(crate) fn set_route_id(&mut self, id: &str) {
        self.route_id = Some(id.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal request processor. Failures are expressed as responses.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, context: &mut Context, request: Request<Body>) -> Response<Body>;
}

/// Request/response interceptor placed in front of a [`Handler`].
///
/// A filter calls `next` at most once; not calling it short-circuits the rest
/// of the pipeline.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter(
        &self,
        context: &mut Context,
        request: Request<Body>,
        next: &dyn Handler,
    ) -> Response<Body>;
}

/// Shared handler as stored in a heap.
pub type HandlerRef = Arc<dyn Handler>;
/// Shared filter as stored in a heap.
pub type FilterRef = Arc<dyn Filter>;

/// Build a small plain-text response, used for gateway-generated errors.
pub fn plain_response(status: StatusCode, message: impl fmt::Display) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
