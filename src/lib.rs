//! Switchyard - an HTTP gateway whose routes live in a directory.
//!
//! Each file in the route directory describes one route: an optional accept
//! condition, a set of heap objects and the handler that serves requests.
//! Files are picked up, rebuilt and retired while the gateway keeps serving;
//! a broken file never takes down the routes that already work.
//!
//! # Features
//! - Hierarchical [`core::Heap`] of lazily built, named objects with
//!   fall-through lookup to the parent heap
//! - Snapshot based [`core::DirectoryMonitor`] driven by a
//!   [`core::PeriodicScanner`] and, optionally, file system notifications
//! - Deterministic route precedence: routes are tried by name, then id
//! - Built-in handlers and filters: static responses, chains, header
//!   rewriting, reverse proxying and condition based dispatch
//! - Admin endpoints listing routes and forcing a rescan
//! - Structured tracing via `tracing` and graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use parking_lot::Mutex;
//! use switchyard::{
//!     adapters::LocalFileSystem,
//!     core::{ConditionCompiler, DirectoryMonitor, Heap, Name, RouteBuilder, Router},
//!     handlers::builtin_registry,
//! };
//!
//! let file_system = Arc::new(LocalFileSystem::new());
//! let heap = Heap::root(Name::of("gateway"), builtin_registry());
//! let builder = RouteBuilder::new(file_system.clone(), Arc::new(ConditionCompiler::new()));
//! let monitor = DirectoryMonitor::new("config/routes", "json", file_system);
//! let router = Router::new(Name::of("gateway").child("router"), heap, builder)
//!     .with_monitor(Arc::new(Mutex::new(monitor)));
//!
//! let report = router.rescan();
//! println!("{} routes installed", report.installed.len());
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the heap, routes and router inside `core`. Handlers and
//! filters that route files can instantiate live in `handlers`.
//!
//! # Error Handling
//! Library APIs return domain specific `thiserror` types ([`core::HeapError`],
//! [`core::RouteError`], [`core::RouterError`]). The binary and the
//! configuration loader use `eyre::Result` with attached context.
pub mod config;
pub mod handlers;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::HttpHandler,
    core::{Heap, Name, Route, RouteBuilder, Router},
    ports::handler::{Context, Filter, Handler},
    utils::GracefulShutdown,
};
