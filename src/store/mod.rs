//! Persistence collaborators: the five primitives every store provides per model.

mod memory;
mod postgres;
mod sql;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::context::Record;
use crate::error::StoreError;
use crate::model::{Model, Relation};
use async_trait::async_trait;
use std::collections::HashMap;

/// Limit/offset window for list queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    /// Read `limit` and `offset` from query-string pairs. Unparsable values fall back to defaults.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let limit = query
            .get("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT);
        let offset = query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
        Page { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Shared by every in-flight request; implementations must be safe for concurrent use.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_many(
        &self,
        model: &Model,
        conditions: &Record,
        relations: &[Relation],
        page: Page,
    ) -> Result<Vec<Record>, StoreError>;

    async fn find_one(
        &self,
        model: &Model,
        conditions: &Record,
        relations: &[Relation],
    ) -> Result<Option<Record>, StoreError>;

    async fn insert_one(&self, model: &Model, data: &Record) -> Result<Record, StoreError>;

    async fn update_one(
        &self,
        model: &Model,
        conditions: &Record,
        data: &Record,
    ) -> Result<Option<Record>, StoreError>;

    async fn delete_one(&self, model: &Model, conditions: &Record) -> Result<Option<Record>, StoreError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
