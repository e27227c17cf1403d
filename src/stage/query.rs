//! Query stage: derive a query descriptor from the request and the active route.

use crate::action::Hook;
use crate::context::{Context, Record, RequestData};
use crate::error::AppError;
use crate::model::{Model, Relation};
use crate::resource::RouteKind;
use crate::store::Page;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

/// What the run stage should execute. `operation` is fixed at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDescriptor {
    operation: Operation,
    pub conditions: Record,
    pub data: Option<Record>,
    pub relations: Vec<Relation>,
    pub page: Option<Page>,
}

impl QueryDescriptor {
    pub fn new(operation: Operation) -> Self {
        QueryDescriptor {
            operation,
            conditions: Record::new(),
            data: None,
            relations: Vec::new(),
            page: None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn relation_names(&self) -> Vec<&str> {
        self.relations.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Pure function of its inputs; `relations` are already resolved for the route.
pub fn build_query(
    model: &Model,
    request: &RequestData,
    kind: RouteKind,
    relations: &[Relation],
) -> Result<QueryDescriptor, AppError> {
    let operation = kind.operation();
    let mut query = QueryDescriptor::new(operation);
    if kind.needs_id() {
        let raw = request
            .params
            .get("id")
            .ok_or_else(|| AppError::BadRequest("missing id path parameter".into()))?;
        query
            .conditions
            .insert(model.primary_key.clone(), model.key_type.parse(raw)?);
    }
    if matches!(operation, Operation::Create | Operation::Update) {
        query.data = Some(request.body.clone());
    }
    if operation == Operation::List {
        query.page = Some(Page::from_query(&request.query));
    }
    query.relations = relations.to_vec();
    Ok(query)
}

/// Default on-query action.
pub struct BuildQuery {
    model: Arc<Model>,
    kind: RouteKind,
    relations: Vec<Relation>,
}

impl BuildQuery {
    pub fn new(model: Arc<Model>, kind: RouteKind, relations: Vec<Relation>) -> Self {
        BuildQuery { model, kind, relations }
    }
}

#[async_trait]
impl Hook for BuildQuery {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        ctx.query = Some(build_query(&self.model, &ctx.request, self.kind, &self.relations)?);
        Ok(())
    }
}
