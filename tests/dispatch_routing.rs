// Dispatch precedence between conditional routes and handlers
#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use switchyard::{
        Context,
        adapters::LocalFileSystem,
        core::{ConditionCompiler, Heap, Name, RouteBuilder, Router, RouterError},
        handlers::{StaticResponseHandler, builtin_registry},
    };

    fn router() -> Router {
        Router::new(
            Name::of("gateway").child("router"),
            Heap::root(Name::of("gateway"), builtin_registry()),
            RouteBuilder::new(
                Arc::new(LocalFileSystem::new()),
                Arc::new(ConditionCompiler::new()),
            ),
        )
    }

    async fn call(router: &Router, context: &mut Context, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.handle(context, request).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_attribute_condition_wins_over_fallback() {
        let router = router();
        router
            .load(
                "a",
                Some("00"),
                json!({
                    "condition": "${attributes.v == 42}",
                    "handler": {"type": "StaticResponseHandler", "config": {"body": "A"}}
                }),
            )
            .unwrap();
        router
            .load(
                "fallback",
                Some("01"),
                json!({"handler": {"type": "StaticResponseHandler", "config": {"body": "fallback"}}}),
            )
            .unwrap();

        let mut matching = Context::new().with_attribute("v", 42);
        assert_eq!(call(&router, &mut matching, "/").await.1, "A");
        assert_eq!(matching.route_id(), Some("a"));

        let mut other = Context::new().with_attribute("v", 44);
        assert_eq!(call(&router, &mut other, "/").await.1, "fallback");
        assert_eq!(other.route_id(), Some("fallback"));
    }

    #[tokio::test]
    async fn test_default_handler_when_nothing_accepts() {
        let router = router();
        router
            .load(
                "only",
                None,
                json!({
                    "condition": "request.method == 'POST'",
                    "handler": {"type": "StaticResponseHandler"}
                }),
            )
            .unwrap();

        let mut context = Context::new();
        assert_eq!(call(&router, &mut context, "/").await.0, StatusCode::NOT_FOUND);

        router.set_default_handler(Some(Arc::new(StaticResponseHandler::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "maintenance",
        ))));
        let mut context = Context::new();
        assert_eq!(
            call(&router, &mut context, "/").await,
            (StatusCode::SERVICE_UNAVAILABLE, "maintenance".to_string())
        );
        assert_eq!(context.route_id(), None);
    }

    #[tokio::test]
    async fn test_dispatch_handler_inside_a_route() {
        let router = router();
        router
            .load(
                "site",
                None,
                json!({
                    "heap": [
                        {"name": "Api", "type": "StaticResponseHandler", "config": {"body": "api"}},
                        {
                            "name": "Stamp",
                            "type": "HeaderFilter",
                            "config": {"messageType": "response", "add": {"x-served-by": "switchyard"}}
                        }
                    ],
                    "handler": {
                        "type": "Chain",
                        "config": {
                            "filters": ["Stamp"],
                            "handler": {
                                "type": "DispatchHandler",
                                "config": {
                                    "bindings": [
                                        {"condition": "request.path =~ '^/api'", "handler": "Api"},
                                        {"handler": {"type": "StaticResponseHandler", "config": {"status": 302}}}
                                    ]
                                }
                            }
                        }
                    }
                }),
            )
            .unwrap();

        let request = Request::builder().uri("/api/v1").body(Body::empty()).unwrap();
        let response = router.handle(&mut Context::new(), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-served-by"], "switchyard");

        let mut context = Context::new();
        assert_eq!(call(&router, &mut context, "/home").await.0, StatusCode::FOUND);
    }

    #[test]
    fn test_duplicate_route_id_is_rejected() {
        let router = router();
        let route = json!({"handler": {"type": "StaticResponseHandler"}});
        router.load("dup", None, route.clone()).unwrap();

        let error = router.load("dup", None, route).unwrap_err();
        assert!(matches!(error, RouterError::DuplicateRoute { .. }));
        assert_eq!(router.routes().len(), 1);
    }
}
