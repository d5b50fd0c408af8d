use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use hyper::ext::ReasonPhrase;
use serde::Deserialize;
use serde_json::Value;

use super::{HeaderValues, header_map, parse_config};
use crate::{
    core::{
        heap::{Heap, HeapError, HeapObject, HeapResult, Heaplet},
        name::Name,
    },
    ports::handler::{Context, Handler, HandlerRef},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StaticResponseConfig {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, HeaderValues>,
    #[serde(default)]
    body: Option<String>,
}

fn default_status() -> u16 {
    200
}

/// Answers every request with the same configured response.
#[derive(Debug, Clone)]
pub struct StaticResponseHandler {
    status: StatusCode,
    reason: Option<ReasonPhrase>,
    headers: HeaderMap,
    body: Bytes,
}

impl StaticResponseHandler {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

#[async_trait]
impl Handler for StaticResponseHandler {
    async fn handle(&self, _context: &mut Context, _request: Request<Body>) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        if let Some(reason) = &self.reason {
            response.extensions_mut().insert(reason.clone());
        }
        response
    }
}

/// Heaplet for `StaticResponseHandler`.
pub struct StaticResponseHeaplet;

impl Heaplet for StaticResponseHeaplet {
    fn create(&mut self, name: &Name, config: &Value, _heap: &Heap) -> HeapResult<Option<HeapObject>> {
        let config: StaticResponseConfig = parse_config(name, config)?;
        let status = StatusCode::from_u16(config.status)
            .map_err(|_| HeapError::config(name, format!("invalid status {}", config.status)))?;
        let reason = config
            .reason
            .map(|reason| {
                ReasonPhrase::try_from(reason)
                    .map_err(|e| HeapError::config(name, format!("invalid reason phrase: {e}")))
            })
            .transpose()?;
        let handler = StaticResponseHandler {
            status,
            reason,
            headers: header_map(name, &config.headers)?,
            body: config.body.map(Bytes::from).unwrap_or_default(),
        };
        Ok(Some(HeapObject::new(Arc::new(handler) as HandlerRef)))
    }
}
