//! Filter chains folded around a terminal handler.
use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};

use crate::ports::handler::{Context, FilterRef, Handler, HandlerRef};

/// A pipeline: `filters` applied in order, then `handler`.
pub struct Chain {
    filters: Vec<FilterRef>,
    handler: HandlerRef,
}

impl Chain {
    pub fn new(filters: Vec<FilterRef>, handler: HandlerRef) -> Self {
        Self { filters, handler }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[async_trait]
impl Handler for Chain {
    async fn handle(&self, context: &mut Context, request: Request<Body>) -> Response<Body> {
        Next {
            filters: &self.filters,
            handler: self.handler.as_ref(),
        }
        .handle(context, request)
        .await
    }
}

/// The remainder of a chain, handed to each filter as its `next`.
struct Next<'a> {
    filters: &'a [FilterRef],
    handler: &'a dyn Handler,
}

#[async_trait]
impl Handler for Next<'_> {
    async fn handle(&self, context: &mut Context, request: Request<Body>) -> Response<Body> {
        match self.filters.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    filters: rest,
                    handler: self.handler,
                };
                first.filter(context, request, &next).await
            }
            None => self.handler.handle(context, request).await,
        }
    }
}
