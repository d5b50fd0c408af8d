pub mod admin;
pub mod directory_watcher;
pub mod file_system;
pub mod http_client;
pub mod http_handler;
pub mod scheduler;

/// Re-export commonly used types from adapters
pub use admin::admin_routes;
pub use directory_watcher::DirectoryWatcher;
pub use file_system::LocalFileSystem;
pub use http_client::HyperHttpClient;
pub use http_handler::{HttpHandler, build_app};
pub use scheduler::TokioScheduler;
