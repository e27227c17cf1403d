//! Run stage: one store call per invocation, chosen by the descriptor's operation.

use super::{Operation, QueryDescriptor};
use crate::action::Hook;
use crate::context::{Context, RawResult, Record};
use crate::error::{AppError, StoreError};
use crate::model::Model;
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;

pub async fn execute(store: &dyn Store, model: &Model, query: &QueryDescriptor) -> Result<RawResult, StoreError> {
    let empty = Record::new();
    let data = query.data.as_ref().unwrap_or(&empty);
    Ok(match query.operation() {
        Operation::List => RawResult::Many(
            store
                .find_many(model, &query.conditions, &query.relations, query.page.unwrap_or_default())
                .await?,
        ),
        Operation::Read => RawResult::One(store.find_one(model, &query.conditions, &query.relations).await?),
        Operation::Create => RawResult::One(Some(store.insert_one(model, data).await?)),
        Operation::Update => RawResult::One(store.update_one(model, &query.conditions, data).await?),
        Operation::Delete => RawResult::One(store.delete_one(model, &query.conditions).await?),
    })
}

/// Default on-run action.
pub struct RunQuery {
    store: Arc<dyn Store>,
    model: Arc<Model>,
}

impl RunQuery {
    pub fn new(store: Arc<dyn Store>, model: Arc<Model>) -> Self {
        RunQuery { store, model }
    }
}

#[async_trait]
impl Hook for RunQuery {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let query = ctx
            .query
            .as_ref()
            .ok_or_else(|| AppError::Internal("run stage reached without a query descriptor".into()))?;
        let raw = execute(self.store.as_ref(), &self.model, query).await?;
        ctx.raw = Some(raw);
        Ok(())
    }
}
