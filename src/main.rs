use std::{
    future::IntoFuture,
    net::SocketAddr,
    path::Path,
    sync::Arc,
};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use http::StatusCode;
use parking_lot::Mutex;
use switchyard::{
    adapters::{
        DirectoryWatcher, HttpHandler, HyperHttpClient, LocalFileSystem, TokioScheduler,
        admin_routes, build_app, directory_watcher::DEFAULT_DEBOUNCE,
    },
    config::{DEFAULT_CONFIG_TOML, GatewayConfig, GatewayConfigValidator, load_config},
    core::{
        ConditionCompiler, DirectoryMonitor, Heap, HeapObject, Name, PeriodicScanner,
        RouteBuilder, Router,
    },
    handlers::{EXPRESSION_COMPILER_KEY, HTTP_CLIENT_KEY, StaticResponseHandler, builtin_registry},
    ports::{
        expression::ExpressionCompiler, handler::HandlerRef, http_client::HttpClientRef,
    },
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file and route directory
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config),
        Some(Commands::Init { config }) => init_config_command(&config),
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    GatewayConfigValidator::validate(&config)?;

    tracing_setup::init_tracing(&config.logging)?;

    let router = Arc::new(build_router(&config)?);

    // Routes are in place before the listener accepts anything.
    let initial = {
        let router = router.clone();
        tokio::task::spawn_blocking(move || router.rescan())
            .await
            .context("Initial route scan panicked")?
    };
    tracing::info!(
        routes = router.table().len(),
        failures = initial.failures.len(),
        directory = %config.routes.directory.display(),
        "Initial routes loaded"
    );

    let shutdown = Arc::new(GracefulShutdown::with_timeout(config.shutdown_timeout));
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let mut scanner = None;
    match (config.routes.scan_interval.period(), router.monitor()) {
        (Some(period), Some(monitor)) => {
            let mut periodic =
                PeriodicScanner::new(monitor, Arc::new(TokioScheduler::new()), router.clone());
            periodic.set_scan_period(period)?;
            periodic.start()?;
            scanner = Some(periodic);
        }
        _ => tracing::info!("Periodic route scanning disabled"),
    }

    let watcher = if config.routes.watch {
        match DirectoryWatcher::new(&config.routes.directory, &config.routes.extension) {
            Ok(watcher) => Some(watcher.spawn(router.clone(), DEFAULT_DEBOUNCE, shutdown.token())),
            Err(e) => {
                tracing::warn!("File watching unavailable, relying on periodic scans: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let admin = config
        .admin
        .enabled
        .then(|| admin_routes(router.clone(), &config.admin.prefix));
    let app = build_app(HttpHandler::new(router.clone()), admin);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        %addr,
        admin = config.admin.enabled,
        watch = config.routes.watch,
        scan_interval = %config.routes.scan_interval,
        "Switchyard gateway listening"
    );
    println!("Switchyard gateway listening on {addr}");

    let server_token = shutdown.token();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { server_token.cancelled().await })
    .into_future();
    let drain_deadline = async {
        let reason = shutdown.wait().await;
        tracing::info!(?reason, drain_timeout = ?shutdown.drain_timeout(), "Draining connections");
        tokio::time::sleep(shutdown.drain_timeout()).await;
    };

    let server_result = tokio::select! {
        result = server => result.context("Server error"),
        _ = drain_deadline => {
            tracing::warn!("Drain timeout elapsed, closing remaining connections");
            Ok(())
        }
    };

    if let Some(mut scanner) = scanner {
        scanner.stop();
    }
    if let Some(handle) = watcher {
        handle.abort();
    }
    router.stop();
    tracing::info!("Graceful shutdown completed");

    server_result
}

/// Root heap with the shared services, and the router on top of it.
fn build_router(config: &GatewayConfig) -> Result<Router> {
    let gateway = Name::of("gateway");
    let heap = Heap::root(gateway.clone(), builtin_registry());

    let client: HttpClientRef = Arc::new(
        HyperHttpClient::with_timeout(config.client.request_timeout)
            .context("Failed to create HTTP client")?,
    );
    heap.put(HTTP_CLIENT_KEY, HeapObject::new(client))?;

    let expressions: Arc<dyn ExpressionCompiler> = Arc::new(ConditionCompiler::new());
    heap.put(EXPRESSION_COMPILER_KEY, HeapObject::new(expressions.clone()))?;

    let file_system = Arc::new(LocalFileSystem::new());
    let monitor = DirectoryMonitor::new(
        &config.routes.directory,
        &config.routes.extension,
        file_system.clone(),
    );
    let builder = RouteBuilder::new(file_system, expressions);
    let router =
        Router::new(gateway.child("router"), heap, builder).with_monitor(Arc::new(Mutex::new(monitor)));

    if let Some(default) = &config.default_handler {
        let status = StatusCode::from_u16(default.status)
            .map_err(|_| eyre!("Invalid default handler status {}", default.status))?;
        let body = default.body.clone().unwrap_or_default();
        let handler: HandlerRef = Arc::new(StaticResponseHandler::new(status, body));
        router.set_default_handler(Some(handler));
    }
    Ok(router)
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Route Directory: {}", config.routes.directory.display());
            println!("   • Route Extension: .{}", config.routes.extension);
            println!("   • Scan Interval: {}", config.routes.scan_interval);
            println!("   • Watch: {}", config.routes.watch);
            if config.admin.enabled {
                println!("   • Admin API: {}", config.admin.prefix);
            } else {
                println!("   • Admin API: disabled");
            }
            if !config.routes.directory.is_dir() {
                println!();
                println!(
                    "⚠️  Route directory does not exist yet; routes appear once it is created"
                );
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

const WELCOME_ROUTE: &str = r#"{
  "name": "welcome",
  "handler": {
    "type": "StaticResponseHandler",
    "config": {
      "status": 200,
      "headers": { "content-type": "text/plain; charset=utf-8" },
      "body": "Hello from switchyard\n"
    }
  }
}
"#;

/// Initialize a new configuration file
fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write {config_path}"))?;
    println!("✅ Created configuration file: {config_path}");

    let routes = path.parent().unwrap_or(Path::new(".")).join("routes");
    std::fs::create_dir_all(&routes)
        .with_context(|| format!("Failed to create {}", routes.display()))?;
    let welcome = routes.join("welcome.json");
    if !welcome.exists() {
        std::fs::write(&welcome, WELCOME_ROUTE)
            .with_context(|| format!("Failed to write {}", welcome.display()))?;
        println!("✅ Created sample route: {}", welcome.display());
    }

    println!();
    println!("📝 Next steps:");
    println!("   1. Add route files to {}", routes.display());
    println!("   2. Run: switchyard validate --config {config_path}");
    println!("   3. Run: switchyard serve --config {config_path}");
    Ok(())
}
