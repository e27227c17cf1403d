//! PostgreSQL store. Each primitive issues exactly one statement; rows come back as JSONB objects.

use super::sql::{self, QueryBuf};
use super::{Page, Store};
use crate::context::Record;
use crate::error::StoreError;
use crate::model::{Model, Relation};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Record>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, Value>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_db_error)?;
        rows.into_iter().map(into_record).collect()
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Record>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, Value>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let row = query.fetch_optional(&self.pool).await.map_err(map_db_error)?;
        row.map(into_record).transpose()
    }
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
        _ => StoreError::Database(e),
    }
}

fn into_record(v: Value) -> Result<Record, StoreError> {
    match v {
        Value::Object(m) => Ok(m),
        other => Err(StoreError::InvalidData(format!("expected a row object, got {}", other))),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_many(
        &self,
        model: &Model,
        conditions: &Record,
        relations: &[Relation],
        page: Page,
    ) -> Result<Vec<Record>, StoreError> {
        self.fetch_all(&sql::select_many(model, conditions, relations, page)).await
    }

    async fn find_one(
        &self,
        model: &Model,
        conditions: &Record,
        relations: &[Relation],
    ) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::select_one(model, conditions, relations)).await
    }

    async fn insert_one(&self, model: &Model, data: &Record) -> Result<Record, StoreError> {
        self.fetch_optional(&sql::insert(model, data))
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_one(
        &self,
        model: &Model,
        conditions: &Record,
        data: &Record,
    ) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::update(model, conditions, data)).await
    }

    async fn delete_one(&self, model: &Model, conditions: &Record) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::delete(model, conditions)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}
