//! Builds [`Route`]s from route configuration files.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    core::{
        heap::{Heap, HeapError, ObjectDeclaration},
        name::Name,
        route::{Route, RouteSource},
    },
    ports::{
        expression::{Expression, ExpressionCompiler, ExpressionError},
        file_system::{FileSystem, FileSystemError, slug_from_path},
        handler::HandlerRef,
    },
};

/// Errors raised while turning a configuration into a route.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteError {
    #[error("failed to read route file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: FileSystemError,
    },

    #[error("invalid route configuration from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid route id '{0}'")]
    InvalidId(String),

    #[error("route '{id}': {source}")]
    Heap {
        id: String,
        #[source]
        source: HeapError,
    },

    #[error("route '{id}' has an invalid condition: {source}")]
    Condition {
        id: String,
        #[source]
        source: ExpressionError,
    },
}

/// Shape of a route file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, alias = "objects")]
    pub heap: Vec<ObjectDeclaration>,
    pub handler: Value,
}

/// Reads route files and assembles routes in fresh child heaps.
#[derive(Clone)]
pub struct RouteBuilder {
    file_system: Arc<dyn FileSystem>,
    expressions: Arc<dyn ExpressionCompiler>,
}

impl RouteBuilder {
    pub fn new(file_system: Arc<dyn FileSystem>, expressions: Arc<dyn ExpressionCompiler>) -> Self {
        Self {
            file_system,
            expressions,
        }
    }

    pub(crate) fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    /// Build the route defined by `file`. The id defaults to the file stem and
    /// the display name to the slugified file name.
    pub fn build(&self, file: &Path, parent: &Heap, scope: &Name) -> Result<Route, RouteError> {
        let content = self
            .file_system
            .read_file(file)
            .map_err(|source| RouteError::Read {
                path: file.to_path_buf(),
                source,
            })?;
        let config: RouteConfig =
            serde_json::from_slice(&content).map_err(|source| RouteError::Parse {
                origin: file.display().to_string(),
                source,
            })?;

        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = config.id.clone().unwrap_or(stem);
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| slug_from_path(file));
        self.assemble(id, name, RouteSource::File(file.to_path_buf()), config, parent, scope)
    }

    /// Build a route from an in-memory configuration. `name` defaults to the
    /// configuration's `name`, then to `id`.
    pub fn build_from_config(
        &self,
        id: &str,
        name: Option<&str>,
        config: Value,
        parent: &Heap,
        scope: &Name,
    ) -> Result<Route, RouteError> {
        let config: RouteConfig =
            serde_json::from_value(config).map_err(|source| RouteError::Parse {
                origin: format!("route '{id}'"),
                source,
            })?;
        let name = name
            .map(str::to_string)
            .or_else(|| config.name.clone())
            .unwrap_or_else(|| id.to_string());
        self.assemble(id.to_string(), name, RouteSource::Api, config, parent, scope)
    }

    fn assemble(
        &self,
        id: String,
        name: String,
        source: RouteSource,
        config: RouteConfig,
        parent: &Heap,
        scope: &Name,
    ) -> Result<Route, RouteError> {
        if id.trim().is_empty() || id.contains('/') {
            return Err(RouteError::InvalidId(id));
        }

        let heap = parent.new_child(scope.child(id.as_str()));
        let built = self.populate(&id, &config, &heap);
        match built {
            Ok((condition, handler)) => {
                tracing::debug!(route = %id, %source, "Route built");
                Ok(Route::new(id, name, source, condition, handler, heap))
            }
            Err(error) => {
                heap.destroy();
                Err(error)
            }
        }
    }

    fn populate(
        &self,
        id: &str,
        config: &RouteConfig,
        heap: &Heap,
    ) -> Result<(Option<Arc<dyn Expression>>, HandlerRef), RouteError> {
        let heap_error = |source| RouteError::Heap {
            id: id.to_string(),
            source,
        };
        heap.init(&config.heap).map_err(heap_error)?;
        let condition = config
            .condition
            .as_deref()
            .map(|source| self.expressions.compile(source))
            .transpose()
            .map_err(|source| RouteError::Condition {
                id: id.to_string(),
                source,
            })?;
        let handler = heap
            .require_as::<HandlerRef>(&config.handler)
            .map_err(heap_error)?;
        Ok((condition, handler))
    }
}
