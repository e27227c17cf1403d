//! Per-request state threaded through one pipeline run.

use crate::error::AppError;
use crate::stage::QueryDescriptor;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue, Method};
use serde_json::Value;
use std::collections::HashMap;

/// A persisted record or a parsed request body.
pub type Record = serde_json::Map<String, Value>;

/// What the transport hands to a route handler. The body is already parsed.
#[derive(Clone, Debug)]
pub struct RequestData {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Record,
}

impl RequestData {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        RequestData {
            method,
            path: path.into(),
            params: HashMap::new(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            body: Record::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Record) -> Self {
        self.body = body;
        self
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            self.headers.insert(AUTHORIZATION, v);
        }
        self
    }

    /// Token from `Authorization: Bearer <token>`, if present and well formed.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Authenticated caller attached by the authentication hook.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub subject: String,
    /// Account type, e.g. "admin" or "user".
    pub kind: String,
    /// Id of the entity this account acts for.
    pub owner: Option<String>,
    pub claims: Record,
}

impl Identity {
    /// Build from an account record carrying `type` and `owner` fields.
    pub fn from_record(record: &Record, primary_key: &str) -> Self {
        Identity {
            subject: record.get(primary_key).map(value_to_string).unwrap_or_default(),
            kind: record.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
            owner: record.get("owner").filter(|v| !v.is_null()).map(value_to_string),
            claims: record.clone(),
        }
    }
}

/// Render a scalar as a plain string (no JSON quoting).
pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON equality where numbers compare by value, so `1` matches `1.0`.
/// Integers compare exactly; only floats go through `f64`.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => {
            if let (Some(x), Some(y)) = (n.as_i64(), m.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (n.as_u64(), m.as_u64()) {
                x == y
            } else if n.is_f64() || m.is_f64() {
                n.as_f64() == m.as_f64()
            } else {
                false
            }
        }
        _ => a == b,
    }
}

/// What the run stage got back from the store.
#[derive(Clone, Debug, PartialEq)]
pub enum RawResult {
    Many(Vec<Record>),
    One(Option<Record>),
}

/// Response payload produced by the convert stage.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Many(Vec<Value>),
    One(Value),
    /// A single-record operation matched nothing.
    NotFound,
}

/// Owned by exactly one pipeline run.
#[derive(Debug)]
pub struct Context {
    pub request: RequestData,
    pub identity: Option<Identity>,
    pub query: Option<QueryDescriptor>,
    pub raw: Option<RawResult>,
    pub output: Option<Output>,
}

impl Context {
    pub fn new(request: RequestData) -> Self {
        Context {
            request,
            identity: None,
            query: None,
            raw: None,
            output: None,
        }
    }

    /// The identity, or Unauthenticated when no authentication hook ran before.
    pub fn identity(&self) -> Result<&Identity, AppError> {
        self.identity
            .as_ref()
            .ok_or_else(|| AppError::Unauthenticated("no authenticated identity".into()))
    }

    pub fn query_mut(&mut self) -> Result<&mut QueryDescriptor, AppError> {
        self.query
            .as_mut()
            .ok_or_else(|| AppError::Internal("query descriptor not built yet".into()))
    }

    /// The single record returned by the run stage, if any.
    pub fn raw_record(&self) -> Option<&Record> {
        match &self.raw {
            Some(RawResult::One(Some(r))) => Some(r),
            Some(RawResult::Many(rows)) => rows.first(),
            _ => None,
        }
    }
}
