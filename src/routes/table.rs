//! A route table maps (method, path) to a pipeline-backed handler.

use crate::context::{Context, Output, RequestData};
use crate::error::AppError;
use crate::pipeline::Pipeline;
use crate::response::{success_many, success_one};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use std::sync::Arc;

/// Runs one pipeline per request and turns its output into a response.
#[derive(Debug)]
pub struct RouteHandler {
    label: String,
    success: StatusCode,
    pipeline: Pipeline,
}

impl RouteHandler {
    pub fn new(label: impl Into<String>, success: StatusCode, pipeline: Pipeline) -> Self {
        RouteHandler {
            label: label.into(),
            success,
            pipeline,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the pipeline; the converted output, or the first failure untouched.
    pub async fn handle(&self, request: RequestData) -> Result<Output, AppError> {
        let ctx = self.pipeline.run(Context::new(request)).await?;
        ctx.output
            .ok_or_else(|| AppError::Internal(format!("{} produced no output", self.label)))
    }

    /// Success envelope, or the failure for the error boundary. `Output::NotFound` becomes `AppError::NotFound`.
    pub async fn respond(&self, request: RequestData) -> Result<Response, AppError> {
        let path = request.path.clone();
        match self.handle(request).await? {
            Output::One(data) => Ok(success_one(self.success, data)),
            Output::Many(rows) => Ok(success_many(self.success, rows)),
            Output::NotFound => Err(AppError::NotFound(path)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub handler: Arc<RouteHandler>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: RouteHandler) -> Self {
        Route {
            method,
            path: path.into(),
            handler: Arc::new(handler),
        }
    }
}

/// Built once per resource at startup; consumed by the composer.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.method == *method && r.path == path)
    }
}

impl IntoIterator for RouteTable {
    type Item = Route;
    type IntoIter = std::vec::IntoIter<Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.into_iter()
    }
}
