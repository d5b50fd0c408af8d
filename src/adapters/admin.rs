//! Read-mostly admin endpoints for the route table.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    core::{route::RouteDescriptor, router::Router},
    tracing_setup,
};

/// `GET {prefix}/routes`, `GET {prefix}/routes/{id}` and `POST {prefix}/rescan`.
pub fn admin_routes(router: Arc<Router>, prefix: &str) -> axum::Router {
    let prefix = prefix.trim_end_matches('/');
    axum::Router::new()
        .route(&format!("{prefix}/routes"), get(list_routes))
        .route(&format!("{prefix}/routes/{{id}}"), get(get_route))
        .route(&format!("{prefix}/rescan"), post(rescan))
        .with_state(router)
}

async fn list_routes(State(router): State<Arc<Router>>) -> Json<Vec<RouteDescriptor>> {
    Json(
        router
            .routes()
            .iter()
            .map(|route| route.descriptor())
            .collect(),
    )
}

async fn get_route(State(router): State<Arc<Router>>, Path(id): Path<String>) -> Response {
    match router.route(&id) {
        Some(descriptor) => Json(descriptor).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("route '{id}' not found") })),
        )
            .into_response(),
    }
}

async fn rescan(State(router): State<Arc<Router>>) -> Response {
    let span = tracing_setup::reload_span("admin");
    let result = tokio::task::spawn_blocking(move || span.in_scope(|| router.rescan().summary())).await;
    match result {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            tracing::error!("Admin rescan failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "rescan failed" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        adapters::LocalFileSystem,
        core::{
            condition::ConditionCompiler, heap::Heap, monitor::DirectoryMonitor, name::Name,
            route_builder::RouteBuilder,
        },
        handlers::{builtin_registry, test_support::body_text},
    };

    fn router(dir: &std::path::Path) -> Arc<Router> {
        let fs = Arc::new(LocalFileSystem::new());
        let monitor = DirectoryMonitor::new(dir, "json", fs.clone());
        Arc::new(
            Router::new(
                Name::of("router"),
                Heap::root(Name::of("root"), builtin_registry()),
                RouteBuilder::new(fs, Arc::new(ConditionCompiler::new())),
            )
            .with_monitor(Arc::new(parking_lot::Mutex::new(monitor))),
        )
    }

    async fn call(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = body_text(response).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rescan_then_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("api.json"),
            r#"{"name": "API", "handler": {"type": "StaticResponseHandler"}}"#,
        )
        .unwrap();
        let router = router(dir.path());
        let app = admin_routes(router.clone(), "/_router/");

        let (status, report) = call(app.clone(), "POST", "/_router/rescan").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["installed"], json!(["api"]));

        let (status, routes) = call(app.clone(), "GET", "/_router/routes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(routes[0]["id"], "api");
        assert_eq!(routes[0]["name"], "API");

        let (status, route) = call(app.clone(), "GET", "/_router/routes/api").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(route["state"], "active");

        let (status, _) = call(app, "GET", "/_router/routes/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
