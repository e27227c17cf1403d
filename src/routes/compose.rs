//! Router composer: merge route tables into one axum router. First registration of a (method, path) wins.

use super::{Route, RouteHandler, RouteTable};
use crate::context::{Record, RequestData};
use crate::error::AppError;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns a failure into a response. Status mapping and serialization live here, not in the pipeline.
pub type ErrorBoundary = Arc<dyn Fn(AppError) -> Response + Send + Sync>;

fn default_boundary() -> ErrorBoundary {
    Arc::new(|e: AppError| e.into_response())
}

#[derive(Default)]
pub struct RouterComposer {
    tables: Vec<RouteTable>,
    boundary: Option<ErrorBoundary>,
}

impl RouterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: RouteTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn error_boundary<F>(mut self, f: F) -> Self
    where
        F: Fn(AppError) -> Response + Send + Sync + 'static,
    {
        self.boundary = Some(Arc::new(f));
        self
    }

    /// Flatten tables in order. A later route is dropped, not rejected, when it repeats a
    /// (method, path) pair or when its path cannot share the router with an earlier one.
    pub fn compose(self) -> ComposedRoutes {
        let mut routes: Vec<Route> = Vec::new();
        for route in self.tables.into_iter().flatten() {
            if let Some(existing) = routes.iter().find(|r| r.method == route.method && r.path == route.path) {
                tracing::warn!(
                    method = %route.method,
                    path = %route.path,
                    kept = existing.handler.label(),
                    dropped = route.handler.label(),
                    "duplicate route ignored"
                );
                continue;
            }
            if let Some(existing) = routes.iter().find(|r| paths_conflict(&r.path, &route.path)) {
                tracing::warn!(
                    method = %route.method,
                    path = %route.path,
                    conflicts_with = %existing.path,
                    kept = existing.handler.label(),
                    dropped = route.handler.label(),
                    "conflicting route ignored"
                );
                continue;
            }
            routes.push(route);
        }
        ComposedRoutes {
            routes,
            boundary: self.boundary.unwrap_or_else(default_boundary),
        }
    }
}

/// Compose with the default error boundary.
pub fn compose(tables: impl IntoIterator<Item = RouteTable>) -> ComposedRoutes {
    tables
        .into_iter()
        .fold(RouterComposer::new(), RouterComposer::table)
        .compose()
}

/// The mountable handler set.
pub struct ComposedRoutes {
    routes: Vec<Route>,
    boundary: ErrorBoundary,
}

impl ComposedRoutes {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn handler_for(&self, method: &Method, path: &str) -> Option<&Arc<RouteHandler>> {
        self.routes
            .iter()
            .find(|r| r.method == *method && r.path == path)
            .map(|r| &r.handler)
    }

    /// One axum route per distinct path, with every method registered for it.
    pub fn into_router(self) -> Router {
        let mut by_path: Vec<(String, Vec<(MethodFilter, Arc<RouteHandler>)>)> = Vec::new();
        for route in &self.routes {
            let Ok(filter) = MethodFilter::try_from(route.method.clone()) else {
                tracing::warn!(method = %route.method, path = %route.path, "unsupported method, route skipped");
                continue;
            };
            match by_path.iter_mut().find(|(p, _)| *p == route.path) {
                Some((_, handlers)) => handlers.push((filter, route.handler.clone())),
                None => by_path.push((route.path.clone(), vec![(filter, route.handler.clone())])),
            }
        }
        let mut router = Router::new();
        for (path, handlers) in by_path {
            let mut methods = MethodRouter::new();
            for (filter, handler) in handlers {
                let boundary = self.boundary.clone();
                methods = methods.on(
                    filter,
                    move |method: Method,
                          uri: Uri,
                          params: Option<Path<HashMap<String, String>>>,
                          Query(query): Query<HashMap<String, String>>,
                          headers: HeaderMap,
                          body: Bytes| {
                        dispatch(handler.clone(), boundary.clone(), method, uri, params, query, headers, body)
                    },
                );
            }
            tracing::info!(path = %path, "mounted");
            router = router.route(&path, methods);
        }
        router
    }
}

fn is_capture(segment: &str) -> bool {
    segment.starts_with(':') || segment.starts_with('*')
}

/// Whether the router would refuse to hold both paths: after an identical prefix, the same
/// segment position captures under two different names, or a wildcard meets anything else.
fn paths_conflict(a: &str, b: &str) -> bool {
    if a == b {
        return false;
    }
    for (x, y) in a.split('/').zip(b.split('/')) {
        if x == y {
            continue;
        }
        let wildcard = x.starts_with('*') || y.starts_with('*');
        return wildcard || (is_capture(x) && is_capture(y));
    }
    false
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    handler: Arc<RouteHandler>,
    boundary: ErrorBoundary,
    method: Method,
    uri: Uri,
    params: Option<Path<HashMap<String, String>>>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = match request_data(method, uri, params, query, headers, &body) {
        Ok(request) => handler.respond(request).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| boundary(e))
}

fn request_data(
    method: Method,
    uri: Uri,
    params: Option<Path<HashMap<String, String>>>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: &[u8],
) -> Result<RequestData, AppError> {
    let body = parse_body(body)?;
    let mut request = RequestData::new(method, uri.path()).with_body(body);
    request.params = params.map(|Path(p)| p).unwrap_or_default();
    request.query = query;
    request.headers = headers;
    Ok(request)
}

/// Empty body is an empty mapping; anything but a JSON object is rejected.
fn parse_body(body: &[u8]) -> Result<Record, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Record::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(m)) => Ok(m),
        Ok(_) => Err(AppError::BadRequest("body must be a JSON object".into())),
        Err(e) => Err(AppError::BadRequest(format!("invalid JSON body: {}", e))),
    }
}
