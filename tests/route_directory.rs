// Route files on a real directory, served through the axum app
#[cfg(test)]
mod test {
    use std::{
        fs::File,
        path::Path,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, SystemTime},
    };

    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use switchyard::{
        adapters::{HttpHandler, LocalFileSystem, build_app},
        core::{
            ConditionCompiler, DirectoryMonitor, Heap, HeapObject, Heaplet, HeapletRegistry, Name, RouteBuilder,
            Router, heap::HeapResult,
        },
        handlers::register_builtin,
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Counted(Arc<AtomicUsize>);

    impl Heaplet for Counted {
        fn create(&mut self, _: &Name, _: &Value, _: &Heap) -> HeapResult<Option<HeapObject>> {
            Ok(Some(HeapObject::new(())))
        }

        fn destroy(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Gateway {
        dir: TempDir,
        router: Arc<Router>,
        destroyed: Arc<AtomicUsize>,
    }

    fn gateway() -> Gateway {
        let dir = TempDir::new().unwrap();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = destroyed.clone();
        let mut registry = HeapletRegistry::new();
        register_builtin(&mut registry)
            .register("Counted", move || Box::new(Counted(counter.clone())));

        let file_system = Arc::new(LocalFileSystem::new());
        let monitor = DirectoryMonitor::new(dir.path(), "json", file_system.clone());
        let router = Router::new(
            Name::of("gateway").child("router"),
            Heap::root(Name::of("gateway"), registry),
            RouteBuilder::new(file_system, Arc::new(ConditionCompiler::new())),
        )
        .with_monitor(Arc::new(Mutex::new(monitor)));
        Gateway {
            dir,
            router: Arc::new(router),
            destroyed,
        }
    }

    /// Write a route file with an explicit modification time so that
    /// back-to-back edits are always visible to the monitor.
    fn write_route(dir: &Path, file: &str, route: Value, age: u64) {
        let path = dir.join(file);
        std::fs::write(&path, route.to_string()).unwrap();
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + age);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    fn static_route(name: &str, condition: Option<&str>, body: &str) -> Value {
        let mut route = json!({
            "name": name,
            "heap": [{"name": "counted", "type": "Counted"}],
            "handler": {"type": "StaticResponseHandler", "config": {"body": body}}
        });
        if let Some(condition) = condition {
            route["condition"] = json!(condition);
        }
        route
    }

    async fn get(router: &Arc<Router>, uri: &str) -> (StatusCode, String) {
        let app = build_app(HttpHandler::new(router.clone()), None);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn ids(router: &Router) -> Vec<String> {
        router.routes().iter().map(|r| r.id().to_string()).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_route_file_lifecycle() {
        let g = gateway();
        write_route(g.dir.path(), "hello.json", static_route("hello", None, "v1"), 1);

        let report = g.router.rescan();
        assert_eq!(report.installed, vec!["hello"]);
        assert_eq!(get(&g.router, "/").await, (StatusCode::OK, "v1".to_string()));

        write_route(g.dir.path(), "hello.json", static_route("hello", None, "v2"), 2);
        let report = g.router.rescan();
        assert_eq!(report.replaced, vec!["hello"]);
        assert_eq!(get(&g.router, "/").await.1, "v2");
        assert_eq!(g.destroyed.load(Ordering::SeqCst), 1);

        std::fs::remove_file(g.dir.path().join("hello.json")).unwrap();
        let report = g.router.rescan();
        assert_eq!(report.removed, vec!["hello"]);
        assert_eq!(get(&g.router, "/").await.0, StatusCode::NOT_FOUND);
        assert_eq!(g.destroyed.load(Ordering::SeqCst), 2);

        assert!(g.router.rescan().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_routes_ordered_by_name() {
        let g = gateway();
        write_route(g.dir.path(), "aaa.json", static_route("01", None, "aaa"), 1);
        write_route(g.dir.path(), "zzz.json", static_route("00", None, "zzz"), 1);
        g.router.rescan();

        assert_eq!(ids(&g.router), vec!["zzz", "aaa"]);
        assert_eq!(get(&g.router, "/").await.1, "zzz");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_condition_precedence() {
        let g = gateway();
        write_route(
            g.dir.path(),
            "api.json",
            static_route("00-api", Some("${request.path =~ '^/api/'}"), "api"),
            1,
        );
        write_route(g.dir.path(), "fallback.json", static_route("99-fallback", None, "fallback"), 1);
        g.router.rescan();

        assert_eq!(get(&g.router, "/api/users").await.1, "api");
        assert_eq!(get(&g.router, "/index.html").await.1, "fallback");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broken_file_is_isolated() {
        let g = gateway();
        write_route(g.dir.path(), "good.json", static_route("good", None, "good"), 1);
        std::fs::write(g.dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(g.dir.path().join("notes.txt"), "ignored").unwrap();

        let report = g.router.rescan();
        assert_eq!(report.installed, vec!["good"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].file.ends_with("broken.json"));
        assert_eq!(get(&g.router, "/").await.1, "good");

        // A later breakage of a working file keeps the last good version.
        std::fs::write(g.dir.path().join("good.json"), "[]").unwrap();
        File::options()
            .write(true)
            .open(g.dir.path().join("good.json"))
            .unwrap()
            .set_modified(SystemTime::now())
            .unwrap();
        let report = g.router.rescan();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(get(&g.router, "/").await.1, "good");
        assert_eq!(g.destroyed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_releases_every_route() {
        let g = gateway();
        write_route(g.dir.path(), "a.json", static_route("a", None, "a"), 1);
        write_route(g.dir.path(), "b.json", static_route("b", None, "b"), 1);
        g.router.rescan();

        g.router.stop();
        g.router.stop();
        assert!(g.router.routes().is_empty());
        assert_eq!(g.destroyed.load(Ordering::SeqCst), 2);

        write_route(g.dir.path(), "c.json", static_route("c", None, "c"), 1);
        assert!(g.router.rescan().is_empty());
    }
}
