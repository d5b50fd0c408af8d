//! The live route table: dispatch, hot reload and programmatic registration.
//!
//! Requests read an immutable [`RouteTable`] snapshot through [`ArcSwap`] and
//! never block on reloads. Writers (scanner ticks, admin rescans, `load` and
//! `unload`) serialize on one mutex, build the next table off to the side and
//! publish it with a single store. Routes that fall out of the table are
//! destroyed only after the new table is visible.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use arc_swap::{ArcSwap, ArcSwapOption};
use axum::body::Body;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    core::{
        heap::Heap,
        monitor::{DirectoryMonitor, FileChangeSet},
        name::Name,
        route::{Route, RouteDescriptor, RouteSource},
        route_builder::{RouteBuilder, RouteError},
        scanner::ChangeListener,
    },
    ports::{
        expression::Bindings,
        handler::{Context, HandlerRef, plain_response},
    },
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouterError {
    #[error("route '{id}' is already defined by {existing}")]
    DuplicateRoute { id: String, existing: String },

    #[error(transparent)]
    Build(#[from] RouteError),

    #[error("route '{0}' not found")]
    NotFound(String),

    #[error("router is stopped")]
    Stopped,
}

/// A file that could not be turned into a route during a reload.
#[derive(Debug)]
pub struct ReloadFailure {
    pub file: PathBuf,
    pub error: RouterError,
}

/// Outcome of applying one change set.
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Ids of routes that were not active before.
    pub installed: Vec<String>,
    /// Ids of routes whose previous instance was swapped out.
    pub replaced: Vec<String>,
    /// Ids of routes evicted because their file disappeared.
    pub removed: Vec<String>,
    pub failures: Vec<ReloadFailure>,
}

impl ReloadReport {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
            && self.replaced.is_empty()
            && self.removed.is_empty()
            && self.failures.is_empty()
    }

    pub fn summary(&self) -> ReloadSummary {
        ReloadSummary {
            installed: self.installed.clone(),
            replaced: self.replaced.clone(),
            removed: self.removed.clone(),
            failures: self
                .failures
                .iter()
                .map(|f| FailureSummary {
                    file: f.file.display().to_string(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Serializable form of a [`ReloadReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ReloadSummary {
    pub installed: Vec<String>,
    pub replaced: Vec<String>,
    pub removed: Vec<String>,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub file: String,
    pub error: String,
}

/// Immutable snapshot of the active routes.
#[derive(Default)]
pub struct RouteTable {
    by_id: HashMap<String, Arc<Route>>,
    ordered: Vec<Arc<Route>>,
}

impl RouteTable {
    fn from_map(by_id: HashMap<String, Arc<Route>>) -> Self {
        let mut ordered: Vec<Arc<Route>> = by_id.values().cloned().collect();
        ordered.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Self { by_id, ordered }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Route>> {
        self.by_id.get(id)
    }

    /// Routes in dispatch order.
    pub fn ordered(&self) -> &[Arc<Route>] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Pending edit of the route table, published by [`Router::commit`].
struct Draft {
    routes: HashMap<String, Arc<Route>>,
    retired: Vec<Arc<Route>>,
}

impl Draft {
    fn install(&mut self, route: Route) -> Option<String> {
        route.activate();
        let id = route.id().to_string();
        let previous = self.routes.insert(id.clone(), Arc::new(route));
        previous.map(|old| {
            self.retired.push(old);
            id
        })
    }

    fn evict(&mut self, id: &str) -> bool {
        match self.routes.remove(id) {
            Some(route) => {
                self.retired.push(route);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct ReloadState {
    // Route id currently installed for each tracked file.
    files: HashMap<PathBuf, String>,
}

/// Dispatches requests to the first accepting route and keeps the route set
/// in sync with a directory of route files.
pub struct Router {
    name: Name,
    heap: Heap,
    builder: RouteBuilder,
    table: ArcSwap<RouteTable>,
    default_handler: ArcSwapOption<HandlerRef>,
    monitor: ArcSwapOption<Mutex<DirectoryMonitor>>,
    reload: Mutex<ReloadState>,
    stopped: AtomicBool,
}

impl Router {
    /// Route heaps are created as children of `heap` and named `name/<id>`.
    pub fn new(name: Name, heap: Heap, builder: RouteBuilder) -> Self {
        Self {
            name,
            heap,
            builder,
            table: ArcSwap::from_pointee(RouteTable::default()),
            default_handler: ArcSwapOption::empty(),
            monitor: ArcSwapOption::empty(),
            reload: Mutex::new(ReloadState::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Attach the monitor used by [`Router::rescan`].
    pub fn with_monitor(self, monitor: Arc<Mutex<DirectoryMonitor>>) -> Self {
        self.monitor.store(Some(monitor));
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn monitor(&self) -> Option<Arc<Mutex<DirectoryMonitor>>> {
        self.monitor.load_full()
    }

    /// Current snapshot of the route table.
    pub fn table(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Active routes in dispatch order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.load().ordered.clone()
    }

    pub fn route(&self, id: &str) -> Option<RouteDescriptor> {
        self.table.load().get(id).map(|route| route.descriptor())
    }

    /// Handler for requests no route accepts. Defaults to `404 Not Found`.
    pub fn set_default_handler(&self, handler: Option<HandlerRef>) {
        self.default_handler.store(handler.map(Arc::new));
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Dispatch to the first route in order whose condition accepts the request.
    pub async fn handle(&self, context: &mut Context, request: Request<Body>) -> Response<Body> {
        let table = self.table.load_full();
        let selected = if table.ordered.iter().any(|route| route.has_condition()) {
            let bindings = Bindings::from_request(context, &request);
            table
                .ordered
                .iter()
                .find(|route| route.accepts(&bindings))
                .cloned()
        } else {
            table.ordered.first().cloned()
        };
        drop(table);

        if let Some(route) = selected {
            context.set_route_id(route.id());
            tracing::debug!(route = %route.id(), path = %request.uri().path(), "Dispatching request");
            return route.handle(context, request).await;
        }
        match self.default_handler.load_full() {
            Some(handler) => handler.handle(context, request).await,
            None => plain_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    /// Register a route from an in-memory configuration. An id that is
    /// already active is rejected and the existing route is left untouched.
    pub fn load(&self, id: &str, name: Option<&str>, config: Value) -> Result<(), RouterError> {
        let _state = self.reload.lock();
        self.ensure_running()?;
        if let Some(existing) = self.table.load().get(id) {
            return Err(RouterError::DuplicateRoute {
                id: id.to_string(),
                existing: existing.source().to_string(),
            });
        }
        let route = self
            .builder
            .build_from_config(id, name, config, &self.heap, &self.name)?;
        let mut draft = self.draft();
        draft.install(route);
        self.commit(draft);
        tracing::info!(route = %id, "Route loaded");
        Ok(())
    }

    /// Like [`Router::load`] but explicitly replaces a route with the same id.
    pub fn replace(&self, id: &str, name: Option<&str>, config: Value) -> Result<(), RouterError> {
        let mut state = self.reload.lock();
        self.ensure_running()?;
        let route = self
            .builder
            .build_from_config(id, name, config, &self.heap, &self.name)?;
        let mut draft = self.draft();
        draft.install(route);
        state.files.retain(|_, route_id| route_id != id);
        self.commit(draft);
        tracing::info!(route = %id, "Route replaced");
        Ok(())
    }

    /// Remove and destroy a route.
    pub fn unload(&self, id: &str) -> Result<(), RouterError> {
        let mut state = self.reload.lock();
        let mut draft = self.draft();
        if !draft.evict(id) {
            return Err(RouterError::NotFound(id.to_string()));
        }
        state.files.retain(|_, route_id| route_id != id);
        self.commit(draft);
        tracing::info!(route = %id, "Route unloaded");
        Ok(())
    }

    /// Apply one change set. Every file is handled independently: a broken
    /// file is reported and the rest still apply. A file that fails to build
    /// keeps its previous route, if any.
    pub fn on_changes(&self, changes: FileChangeSet) -> ReloadReport {
        let mut state = self.reload.lock();
        let mut report = ReloadReport::default();
        if self.is_stopped() {
            return report;
        }
        let mut draft = self.draft();

        for file in &changes.removed {
            // A removal observed by an older scan must not evict a route
            // whose file has since come back.
            if self.builder.file_system().exists(file) {
                tracing::debug!(file = %file.display(), "Ignoring removal of a file that exists");
                continue;
            }
            let Some(id) = state.files.remove(file) else {
                continue;
            };
            if draft.evict(&id) {
                report.removed.push(id);
            }
        }

        for file in changes.added.iter().chain(&changes.modified) {
            match self.build_file(file, &draft) {
                Ok(route) => {
                    let id = route.id().to_string();
                    // The file may now declare a different id.
                    let previous = state.files.insert(file.clone(), id.clone());
                    if let Some(previous) = previous.filter(|previous| *previous != id) {
                        if draft.evict(&previous) {
                            report.removed.push(previous);
                        }
                    }
                    match draft.install(route) {
                        Some(replaced) => report.replaced.push(replaced),
                        None => report.installed.push(id),
                    }
                }
                Err(error) => {
                    tracing::error!(file = %file.display(), %error, "Failed to load route");
                    report.failures.push(ReloadFailure {
                        file: file.clone(),
                        error,
                    });
                }
            }
        }

        self.commit(draft);
        tracing::info!(
            installed = report.installed.len(),
            replaced = report.replaced.len(),
            removed = report.removed.len(),
            failed = report.failures.len(),
            "Applied route changes"
        );
        report
    }

    /// Scan the attached directory now and apply what changed.
    ///
    /// The monitor stays locked until the changes are applied, so concurrent
    /// rescans and scanner ticks apply their change sets in scan order.
    pub fn rescan(&self) -> ReloadReport {
        let Some(monitor) = self.monitor.load_full() else {
            return ReloadReport::default();
        };
        let mut monitor = monitor.lock();
        let changes = monitor.scan();
        if changes.is_empty() {
            return ReloadReport::default();
        }
        self.on_changes(changes)
    }

    /// Destroy every route and detach the monitor. Later change sets are
    /// ignored and registrations fail with [`RouterError::Stopped`].
    pub fn stop(&self) {
        let mut state = self.reload.lock();
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        state.files.clear();
        self.monitor.store(None);
        let previous = self.table.swap(Arc::new(RouteTable::default()));
        for route in previous.ordered() {
            route.destroy();
        }
        tracing::info!(router = %self.name, routes = previous.len(), "Router stopped");
    }

    fn ensure_running(&self) -> Result<(), RouterError> {
        if self.is_stopped() {
            return Err(RouterError::Stopped);
        }
        Ok(())
    }

    /// Build `file` and reject ids already owned by another source.
    fn build_file(&self, file: &Path, draft: &Draft) -> Result<Route, RouterError> {
        let route = self.builder.build(file, &self.heap, &self.name)?;
        let conflict = draft
            .routes
            .get(route.id())
            .filter(|existing| existing.source().file() != Some(file));
        if let Some(existing) = conflict {
            let error = RouterError::DuplicateRoute {
                id: route.id().to_string(),
                existing: existing.source().to_string(),
            };
            route.destroy();
            return Err(error);
        }
        Ok(route)
    }

    fn draft(&self) -> Draft {
        Draft {
            routes: self.table.load().by_id.clone(),
            retired: Vec::new(),
        }
    }

    fn commit(&self, draft: Draft) {
        self.table.store(Arc::new(RouteTable::from_map(draft.routes)));
        for route in draft.retired {
            route.destroy();
        }
    }
}

impl ChangeListener for Router {
    fn on_changes(&self, changes: FileChangeSet) {
        Router::on_changes(self, changes);
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop();
    }
}
