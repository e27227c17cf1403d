//! Reusable authorization and body hooks. All of them expect `Authenticate` to have run first.

mod validate;

pub use validate::{ValidateBody, ValidationRule};

use crate::action::Hook;
use crate::context::{value_eq, Context, Identity, Record};
use crate::error::AppError;
use crate::model::Model;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

fn kind_allowed(identity: &Identity, kinds: &[String]) -> bool {
    kinds.iter().any(|k| *k == identity.kind)
}

fn kinds<I, S>(kinds: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    kinds.into_iter().map(Into::into).collect()
}

/// Continue only when the caller's account kind is one of `kinds`.
pub struct RequireKind {
    kinds: Vec<String>,
}

impl RequireKind {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequireKind { kinds: kinds(allowed) }
    }
}

#[async_trait]
impl Hook for RequireKind {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let identity = ctx.identity()?;
        if kind_allowed(identity, &self.kinds) {
            return Ok(());
        }
        Err(AppError::Forbidden(format!("account type '{}' not allowed", identity.kind)))
    }
}

/// Overwrite `body[field]` with the caller's owner id, whatever the client sent.
pub struct AssignOwner {
    field: String,
}

impl AssignOwner {
    pub fn new(field: impl Into<String>) -> Self {
        AssignOwner { field: field.into() }
    }
}

#[async_trait]
impl Hook for AssignOwner {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let owner = ctx
            .identity()?
            .owner
            .clone()
            .ok_or_else(|| AppError::Forbidden("account has no owner".into()))?;
        ctx.request.body.insert(self.field.clone(), Value::String(owner));
        Ok(())
    }
}

/// The `:id` path parameter must be the caller's own owner id, unless the kind is exempt.
pub struct RequireSelfOrKind {
    kinds: Vec<String>,
}

impl RequireSelfOrKind {
    pub fn new<I, S>(exempt: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequireSelfOrKind { kinds: kinds(exempt) }
    }
}

#[async_trait]
impl Hook for RequireSelfOrKind {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let identity = ctx.identity()?;
        if kind_allowed(identity, &self.kinds) {
            return Ok(());
        }
        let target = ctx.request.params.get("id");
        if target.is_some() && target == identity.owner.as_ref() {
            return Ok(());
        }
        Err(AppError::Forbidden("not your record".into()))
    }
}

/// Loads the addressed record and requires `record[field]` to equal the caller's owner id.
/// Exempt kinds skip the lookup. A missing record is NotFound.
pub struct RequireWriterOrKind {
    store: Arc<dyn Store>,
    model: Arc<Model>,
    field: String,
    kinds: Vec<String>,
}

impl RequireWriterOrKind {
    pub fn new<I, S>(store: Arc<dyn Store>, model: Arc<Model>, field: impl Into<String>, exempt: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequireWriterOrKind {
            store,
            model,
            field: field.into(),
            kinds: kinds(exempt),
        }
    }
}

#[async_trait]
impl Hook for RequireWriterOrKind {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let identity = ctx.identity()?;
        if kind_allowed(identity, &self.kinds) {
            return Ok(());
        }
        let id = ctx
            .request
            .params
            .get("id")
            .ok_or_else(|| AppError::BadRequest("missing :id path parameter".into()))?;
        let mut conditions = Record::new();
        conditions.insert(self.model.primary_key.clone(), self.model.key_type.parse(id)?);
        let record = self
            .store
            .find_one(&self.model, &conditions, &[])
            .await?
            .ok_or_else(|| AppError::NotFound(ctx.request.path.clone()))?;

        let owner = identity.owner.as_ref().map(|o| Value::String(o.clone()));
        match (record.get(&self.field), owner) {
            (Some(writer), Some(owner)) if value_eq(writer, &owner) => Ok(()),
            _ => {
                tracing::debug!(model = %self.model.name, id = %id, subject = %identity.subject, "write denied");
                Err(AppError::Forbidden(format!("only the {} may change this record", self.field)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestData;
    use crate::store::MemoryStore;
    use axum::http::Method;
    use serde_json::json;

    fn who(kind: &str, owner: &str) -> Identity {
        Identity {
            subject: "acc".into(),
            kind: kind.into(),
            owner: Some(owner.into()),
            claims: Record::new(),
        }
    }

    fn ctx(identity: Option<Identity>, request: RequestData) -> Context {
        let mut ctx = Context::new(request);
        ctx.identity = identity;
        ctx
    }

    #[tokio::test]
    async fn require_kind_checks_account_type() {
        let hook = RequireKind::new(["admin"]);
        let mut admin = ctx(Some(who("admin", "a")), RequestData::new(Method::GET, "/users"));
        assert!(hook.call(&mut admin).await.is_ok());

        let mut user = ctx(Some(who("user", "u1")), RequestData::new(Method::GET, "/users"));
        assert!(matches!(hook.call(&mut user).await, Err(AppError::Forbidden(_))));

        let mut nobody = ctx(None, RequestData::new(Method::GET, "/users"));
        assert!(matches!(hook.call(&mut nobody).await, Err(AppError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn assign_owner_overwrites_client_value() {
        let body = json!({"title": "hi", "writer": "someone-else"}).as_object().cloned().unwrap();
        let mut c = ctx(Some(who("user", "u1")), RequestData::new(Method::POST, "/posts").with_body(body));
        AssignOwner::new("writer").call(&mut c).await.unwrap();
        assert_eq!(c.request.body.get("writer"), Some(&json!("u1")));
        assert_eq!(c.request.body.get("title"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn self_or_kind_compares_path_id() {
        let hook = RequireSelfOrKind::new(["admin"]);
        let mut own = ctx(Some(who("user", "u1")), RequestData::new(Method::GET, "/users/u1").with_param("id", "u1"));
        assert!(hook.call(&mut own).await.is_ok());

        let mut other = ctx(Some(who("user", "u1")), RequestData::new(Method::GET, "/users/u2").with_param("id", "u2"));
        assert!(matches!(hook.call(&mut other).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn writer_check_has_one_outcome_per_request() {
        let store = Arc::new(MemoryStore::new());
        let post = Arc::new(Model::new("Post"));
        store
            .seed(&post, [json!({"id": "p1", "title": "t", "writer": "u1"})])
            .unwrap();
        let hook = RequireWriterOrKind::new(store.clone(), post.clone(), "writer", ["admin"]);
        let request = || RequestData::new(Method::PUT, "/posts/p1").with_param("id", "p1");

        assert!(hook.call(&mut ctx(Some(who("user", "u1")), request())).await.is_ok());
        assert!(matches!(
            hook.call(&mut ctx(Some(who("user", "u2")), request())).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(hook.call(&mut ctx(Some(who("admin", "a")), request())).await.is_ok());

        let missing = RequestData::new(Method::PUT, "/posts/p9").with_param("id", "p9");
        assert!(matches!(
            hook.call(&mut ctx(Some(who("user", "u1")), missing)).await,
            Err(AppError::NotFound(_))
        ));
    }
}
