//! Convert stage: per-field output transforms applied after execution.

use crate::action::Hook;
use crate::context::{Context, Output, RawResult, Record};
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maps a field value to its output form; `None` removes the field.
pub type Transform = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Field name to transform. Fields without an entry pass through verbatim.
#[derive(Clone, Default)]
pub struct ConverterTable {
    fields: BTreeMap<String, Transform>,
}

impl ConverterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.fields.insert(name.into(), Arc::new(f));
        self
    }

    /// Drop `name` from every output record.
    pub fn hide(self, name: impl Into<String>) -> Self {
        self.field(name, |_| None)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Apply to one record. Only fields present in the record are transformed.
    pub fn apply(&self, record: &Record) -> Record {
        let mut out = Record::new();
        for (k, v) in record {
            match self.fields.get(k) {
                Some(f) => {
                    if let Some(converted) = f(v) {
                        out.insert(k.clone(), converted);
                    }
                }
                None => {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        out
    }
}

impl fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fields.keys()).finish()
    }
}

/// Lists keep order and length; an absent single record becomes `Output::NotFound`.
pub fn convert(raw: &RawResult, table: &ConverterTable) -> Output {
    match raw {
        RawResult::Many(rows) => Output::Many(rows.iter().map(|r| Value::Object(table.apply(r))).collect()),
        RawResult::One(Some(r)) => Output::One(Value::Object(table.apply(r))),
        RawResult::One(None) => Output::NotFound,
    }
}

/// Default on-convert action.
pub struct ConvertData {
    converter: ConverterTable,
}

impl ConvertData {
    pub fn new(converter: ConverterTable) -> Self {
        ConvertData { converter }
    }
}

#[async_trait]
impl Hook for ConvertData {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let raw = ctx
            .raw
            .as_ref()
            .ok_or_else(|| AppError::Internal("convert stage reached without a result".into()))?;
        ctx.output = Some(convert(raw, &self.converter));
        Ok(())
    }
}
