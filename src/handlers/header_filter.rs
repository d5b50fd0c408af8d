use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, HeaderName, Request, Response};
use serde::Deserialize;
use serde_json::Value;

use super::{HeaderValues, header_map, parse_config};
use crate::{
    core::{
        heap::{Heap, HeapError, HeapObject, HeapResult, Heaplet},
        name::Name,
    },
    ports::handler::{Context, Filter, FilterRef, Handler},
};

/// Which message a [`HeaderFilter`] rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Request,
    Response,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HeaderFilterConfig {
    #[serde(default)]
    message_type: MessageType,
    #[serde(default)]
    add: BTreeMap<String, HeaderValues>,
    #[serde(default)]
    remove: Vec<String>,
}

/// Removes, then appends, headers on the request or the response.
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    message_type: MessageType,
    add: HeaderMap,
    remove: Vec<HeaderName>,
}

impl HeaderFilter {
    pub fn new(message_type: MessageType, add: HeaderMap, remove: Vec<HeaderName>) -> Self {
        Self {
            message_type,
            add,
            remove,
        }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.remove {
            headers.remove(name);
        }
        for (name, value) in &self.add {
            headers.append(name.clone(), value.clone());
        }
    }
}

#[async_trait]
impl Filter for HeaderFilter {
    async fn filter(
        &self,
        context: &mut Context,
        mut request: Request<Body>,
        next: &dyn Handler,
    ) -> Response<Body> {
        match self.message_type {
            MessageType::Request => {
                self.apply(request.headers_mut());
                next.handle(context, request).await
            }
            MessageType::Response => {
                let mut response = next.handle(context, request).await;
                self.apply(response.headers_mut());
                response
            }
        }
    }
}

/// Heaplet for `HeaderFilter`.
pub struct HeaderFilterHeaplet;

impl Heaplet for HeaderFilterHeaplet {
    fn create(&mut self, name: &Name, config: &Value, _heap: &Heap) -> HeapResult<Option<HeapObject>> {
        let config: HeaderFilterConfig = parse_config(name, config)?;
        let remove = config
            .remove
            .iter()
            .map(|header| {
                HeaderName::try_from(header.as_str()).map_err(|e| {
                    HeapError::config(name, format!("invalid header name '{header}': {e}"))
                })
            })
            .collect::<HeapResult<Vec<_>>>()?;
        let filter = HeaderFilter::new(config.message_type, header_map(name, &config.add)?, remove);
        Ok(Some(HeapObject::new(Arc::new(filter) as FilterRef)))
    }
}
