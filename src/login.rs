//! Login route: look up an account by credential fields from the body and answer with a bearer token.

use crate::action::{Action, Hook, Phase};
use crate::auth::TokenIssuer;
use crate::context::{Context, Identity, Output, Record};
use crate::error::{AppError, ConfigError};
use crate::model::Model;
use crate::pipeline::Pipeline;
use crate::resource::validate_uri;
use crate::routes::{Route, RouteHandler, RouteTable};
use crate::stage::{Operation, QueryDescriptor, RunQuery};
use crate::store::Store;
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_LOGIN_URI: &str = "/login";

#[derive(Clone, Debug, Default)]
pub struct LoginConfig {
    pub uri: Option<String>,
    /// Extra actions, e.g. a before-convert check rejecting inactive accounts.
    pub actions: Vec<Action>,
}

impl LoginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }
}

/// On-query: a read whose conditions are the credential fields taken verbatim from the body.
struct LoginQuery {
    fields: Vec<String>,
}

#[async_trait]
impl Hook for LoginQuery {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let mut conditions = Record::new();
        for field in &self.fields {
            let value = ctx
                .request
                .body
                .get(field)
                .filter(|v| !v.is_null())
                .ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))?;
            conditions.insert(field.clone(), value.clone());
        }
        let mut query = QueryDescriptor::new(Operation::Read);
        query.conditions = conditions;
        ctx.query = Some(query);
        Ok(())
    }
}

/// On-convert: `{token}` for the matched account, Unauthenticated otherwise.
struct IssueToken {
    issuer: Arc<dyn TokenIssuer>,
    primary_key: String,
}

#[async_trait]
impl Hook for IssueToken {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let account = ctx
            .raw_record()
            .ok_or_else(|| AppError::Unauthenticated("invalid credentials".into()))?;
        let identity = Identity::from_record(account, &self.primary_key);
        tracing::info!(subject = %identity.subject, kind = %identity.kind, "login");
        let token = self.issuer.issue(identity).await?;
        ctx.output = Some(Output::One(json!({ "token": token })));
        Ok(())
    }
}

/// Build the single-route table for `POST /login` (or `config.uri`).
pub fn login<I, S>(
    store: Arc<dyn Store>,
    model: Model,
    fields: I,
    issuer: Arc<dyn TokenIssuer>,
    config: LoginConfig,
) -> Result<RouteTable, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let uri = config.uri.unwrap_or_else(|| DEFAULT_LOGIN_URI.to_string());
    validate_uri(&uri)?;
    let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
    if fields.is_empty() {
        return Err(ConfigError::InvalidRoute("login needs at least one credential field".into()));
    }
    let model = Arc::new(model);
    let mut actions = vec![
        Action::new(Phase::OnQuery, LoginQuery { fields }),
        Action::new(Phase::OnRun, RunQuery::new(store, model.clone())),
        Action::new(
            Phase::OnConvert,
            IssueToken {
                issuer,
                primary_key: model.primary_key.clone(),
            },
        ),
    ];
    actions.extend(config.actions);

    let label = format!("{}.login", model.name);
    tracing::debug!(route = %label, path = %uri, "route built");
    let mut table = RouteTable::new();
    table.push(Route::new(
        Method::POST,
        uri,
        RouteHandler::new(label, StatusCode::OK, Pipeline::new(actions)),
    ));
    Ok(table)
}
