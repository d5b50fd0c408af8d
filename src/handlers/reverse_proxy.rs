use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderName, HeaderValue, Request, Response, StatusCode, Uri, header};
use serde::Deserialize;
use serde_json::Value;

use super::{HTTP_CLIENT_KEY, parse_config};
use crate::{
    core::{
        heap::{Heap, HeapError, HeapObject, HeapResult, Heaplet},
        name::Name,
    },
    ports::{
        handler::{Context, Handler, HandlerRef, plain_response},
        http_client::{HttpClientError, HttpClientRef},
    },
};

const HOP_BY_HOP: [&str; 6] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReverseProxyConfig {
    base_uri: String,
    #[serde(default)]
    http_client: Option<Value>,
}

/// Forwards requests to `base_uri`, keeping the original path and query.
pub struct ReverseProxyHandler {
    base_uri: Uri,
    client: HttpClientRef,
}

impl ReverseProxyHandler {
    pub fn new(base_uri: Uri, client: HttpClientRef) -> Self {
        Self { base_uri, client }
    }

    pub fn base_uri(&self) -> &Uri {
        &self.base_uri
    }

    /// `base_uri` path prefix followed by the request's path and query.
    fn target_uri(&self, original: &Uri) -> Result<Uri, http::Error> {
        let prefix = self.base_uri.path().trim_end_matches('/');
        let path_and_query = original.path_and_query().map_or("/", |pq| pq.as_str());
        let mut parts = self.base_uri.clone().into_parts();
        parts.path_and_query = Some(format!("{prefix}{path_and_query}").parse()?);
        Ok(Uri::from_parts(parts)?)
    }
}

#[async_trait]
impl Handler for ReverseProxyHandler {
    async fn handle(&self, context: &mut Context, mut request: Request<Body>) -> Response<Body> {
        let original = request.uri().clone();
        let target = match self.target_uri(&original) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(uri = %original, error = %e, "Unable to build backend URI");
                return plain_response(StatusCode::BAD_REQUEST, "Invalid request URI");
            }
        };
        *request.uri_mut() = target;

        let headers = request.headers_mut();
        for name in HOP_BY_HOP {
            headers.remove(name);
        }
        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert(HeaderName::from_static("x-forwarded-host"), host);
        }
        if let Some(addr) = context.client_addr() {
            let forwarded_for = match headers
                .get(HeaderName::from_static("x-forwarded-for"))
                .and_then(|v| v.to_str().ok())
            {
                Some(chain) => format!("{chain}, {}", addr.ip()),
                None => addr.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(HeaderName::from_static("x-forwarded-for"), value);
            }
        }

        match self.client.send_request(request).await {
            Ok(response) => response,
            Err(HttpClientError::Timeout(seconds)) => {
                tracing::warn!(backend = %self.base_uri, seconds, "Backend timed out");
                plain_response(StatusCode::GATEWAY_TIMEOUT, "Backend timed out")
            }
            Err(e) => {
                tracing::warn!(backend = %self.base_uri, error = %e, "Backend request failed");
                plain_response(StatusCode::BAD_GATEWAY, "Backend request failed")
            }
        }
    }
}

/// Heaplet for `ReverseProxyHandler`. The client defaults to the heap's
/// `HttpClient` object.
pub struct ReverseProxyHeaplet;

impl Heaplet for ReverseProxyHeaplet {
    fn create(&mut self, name: &Name, config: &Value, heap: &Heap) -> HeapResult<Option<HeapObject>> {
        let config: ReverseProxyConfig = parse_config(name, config)?;
        let base_uri: Uri = config
            .base_uri
            .parse()
            .map_err(|e| HeapError::config(name, format!("invalid baseUri: {e}")))?;
        if base_uri.scheme().is_none() || base_uri.authority().is_none() {
            return Err(HeapError::config(
                name,
                format!("baseUri '{base_uri}' must be absolute"),
            ));
        }
        let client_ref = config
            .http_client
            .unwrap_or_else(|| Value::String(HTTP_CLIENT_KEY.to_string()));
        let client = heap.require_as::<HttpClientRef>(&client_ref)?;
        Ok(Some(HeapObject::new(
            Arc::new(ReverseProxyHandler::new(base_uri, client)) as HandlerRef,
        )))
    }
}
