//! A compiled route: accept condition, pipeline and the heap that owns both.
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use axum::body::Body;
use chrono::{DateTime, Utc};
use http::{Request, Response};
use serde::Serialize;

use crate::{
    core::heap::Heap,
    ports::{
        expression::{Bindings, Expression},
        handler::{Context, HandlerRef},
    },
};

/// Lifecycle of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteState {
    Building,
    Active,
    Destroyed,
}

impl RouteState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Building,
            1 => Self::Active,
            _ => Self::Destroyed,
        }
    }
}

/// Where a route's configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSource {
    File(PathBuf),
    Api,
}

impl RouteSource {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Api => None,
        }
    }
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Api => f.write_str("api"),
        }
    }
}

/// One independently built pipeline. A route exclusively owns its heap;
/// destroying the route destroys the heap.
pub struct Route {
    id: String,
    name: String,
    source: RouteSource,
    condition: Option<Arc<dyn Expression>>,
    handler: HandlerRef,
    heap: Heap,
    state: AtomicU8,
    loaded_at: DateTime<Utc>,
}

impl Route {
    pub(crate) fn new(
        id: String,
        name: String,
        source: RouteSource,
        condition: Option<Arc<dyn Expression>>,
        handler: HandlerRef,
        heap: Heap,
    ) -> Self {
        Self {
            id,
            name,
            source,
            condition,
            handler,
            heap,
            state: AtomicU8::new(RouteState::Building as u8),
            loaded_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// When this route was built.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn source(&self) -> &RouteSource {
        &self.source
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_ref().map(|c| c.source())
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn state(&self) -> RouteState {
        RouteState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Building → Active. A destroyed route stays destroyed.
    pub(crate) fn activate(&self) {
        let _ = self.state.compare_exchange(
            RouteState::Building as u8,
            RouteState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// A route without condition accepts everything.
    pub fn accepts(&self, bindings: &Bindings) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.accepts(bindings))
    }

    pub(crate) fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub async fn handle(&self, context: &mut Context, request: Request<Body>) -> Response<Body> {
        self.handler.handle(context, request).await
    }

    /// Destroy the route and its heap. Returns `false` when it was already
    /// destroyed, in which case nothing happens.
    pub fn destroy(&self) -> bool {
        let previous = self
            .state
            .swap(RouteState::Destroyed as u8, Ordering::AcqRel);
        if previous == RouteState::Destroyed as u8 {
            return false;
        }
        self.heap.destroy();
        tracing::info!(route = %self.id, "Route destroyed");
        true
    }

    /// Dispatch order: display name, then id.
    pub(crate) fn order_key(&self) -> (&str, &str) {
        (&self.name, &self.id)
    }

    pub fn descriptor(&self) -> RouteDescriptor {
        RouteDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            condition: self.condition().map(str::to_string),
            source: self.source.file().map(|p| p.display().to_string()),
            state: self.state(),
            heap: self.heap.name().to_string(),
            objects: self.heap.declared_names(),
            loaded_at: self.loaded_at,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("condition", &self.condition())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a route, as exposed by the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub state: RouteState,
    pub heap: String,
    pub objects: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::{
        core::{condition::ConditionCompiler, heap::HeapObject, name::Name},
        handlers::{StaticResponseHandler, builtin_registry},
        ports::expression::ExpressionCompiler,
    };

    fn route(condition: Option<&str>) -> Route {
        let heap = Heap::root(Name::of("route"), builtin_registry());
        heap.put("marker", HeapObject::new(1u8)).unwrap();
        Route::new(
            "r1".into(),
            "first".into(),
            RouteSource::Api,
            condition.map(|c| ConditionCompiler::new().compile(c).unwrap()),
            Arc::new(StaticResponseHandler::new(StatusCode::OK, "ok")),
            heap,
        )
    }

    #[test]
    fn test_lifecycle() {
        let route = route(None);
        assert_eq!(route.state(), RouteState::Building);
        route.activate();
        assert_eq!(route.state(), RouteState::Active);

        assert!(route.destroy());
        assert!(!route.destroy());
        assert_eq!(route.state(), RouteState::Destroyed);
        assert!(route.heap().is_destroyed());

        route.activate();
        assert_eq!(route.state(), RouteState::Destroyed);
    }

    #[test]
    fn test_accepts() {
        let always = route(None);
        let conditional = route(Some("attributes.v == 42"));
        let matching = Bindings::new(json!({"attributes": {"v": 42}}));
        let other = Bindings::new(json!({"attributes": {"v": 1}}));

        assert!(always.accepts(&other));
        assert!(conditional.accepts(&matching));
        assert!(!conditional.accepts(&other));
    }

    #[test]
    fn test_descriptor_serializes() {
        let route = route(Some("true"));
        route.activate();
        let value = serde_json::to_value(route.descriptor()).unwrap();
        assert_eq!(value["id"], "r1");
        assert_eq!(value["state"], "active");
        assert_eq!(value["condition"], "true");
        assert!(value.get("source").is_none());
        assert!(value["loaded_at"].is_string());
    }
}
