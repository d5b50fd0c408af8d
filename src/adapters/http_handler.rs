use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    http::HeaderValue,
};
use hyper::Response;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::{core::router::Router, ports::handler::Context, tracing_setup};

/// Bridges axum requests into the route table.
#[derive(Clone)]
pub struct HttpHandler {
    router: Arc<Router>,
}

impl HttpHandler {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Run one request through the router. Every outcome is a response.
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let mut context = Context::new();
        if let Some(addr) = client_addr {
            context = context.with_client_addr(addr);
        }
        let span = tracing_setup::request_span(&context, req.method().as_str(), req.uri().path());

        async {
            let mut response = self.router.handle(&mut context, req).await;
            let span = tracing::Span::current();
            if let Some(route) = context.route_id() {
                span.record("route.id", route);
            }
            span.record("http.status_code", response.status().as_u16());
            if let Ok(value) = HeaderValue::from_str(&context.id().to_string()) {
                response.headers_mut().entry("x-request-id").or_insert(value);
            }
            response
        }
        .instrument(span)
        .await
    }
}

/// The gateway's axum application: optional admin routes, everything else
/// dispatched through `handler`.
pub fn build_app(handler: HttpHandler, admin: Option<axum::Router>) -> axum::Router {
    let app = admin.unwrap_or_default();
    app.fallback(move |req: Request| {
        let handler = handler.clone();
        async move {
            let client_addr = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            handler.handle_request(req, client_addr).await
        }
    })
    .layer(CompressionLayer::new())
    .layer(TraceLayer::new_for_http())
}
