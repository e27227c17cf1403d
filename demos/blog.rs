//! Blog API: accounts with login, users, categories, posts, comments and tags.
//!
//! Runs against PostgreSQL when DATABASE_URL is set, otherwise against a seeded in-memory store.

use axum::response::IntoResponse;
use axum::Router;
use resource_pipeline::action::before_query;
use resource_pipeline::hooks::{AssignOwner, RequireKind, RequireSelfOrKind, RequireWriterOrKind, ValidateBody, ValidationRule};
use resource_pipeline::server::{app, connect_store, serve};
use resource_pipeline::{
    common_routes, login, resource, Action, AppError, Authenticate, Context, ConverterTable, Hook, LoginConfig, Model, OperationConfig,
    Phase, Record, Relation, ResourceConfig, RouteKind, RouterComposer, SessionTokens, Settings, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Models {
    account: Model,
    user: Model,
    category: Model,
    post: Model,
    comment: Model,
    tag: Model,
}

fn models() -> Models {
    Models {
        account: Model::new("Account"),
        user: Model::new("User"),
        category: Model::new("Category"),
        post: Model::new("Post"),
        comment: Model::new("Comment"),
        tag: Model::new("Tag"),
    }
}

fn relations(m: &Models) -> Vec<Relation> {
    vec![
        Relation::belongs_to(&m.account, "user", &m.user, "owner"),
        Relation::has_many(&m.user, "posts", &m.post, "writer"),
        Relation::has_many(&m.user, "comments", &m.comment, "writer"),
        Relation::belongs_to(&m.post, "writer", &m.user, "writer"),
        Relation::belongs_to(&m.post, "category", &m.category, "category"),
        Relation::has_many(&m.post, "comments", &m.comment, "post"),
        Relation::has_many(&m.category, "posts", &m.post, "category"),
        Relation::belongs_to(&m.comment, "writer", &m.user, "writer"),
        Relation::belongs_to(&m.comment, "post", &m.post, "post"),
    ]
}

/// Rejects logins for accounts flagged inactive.
fn reject_inactive(ctx: &mut Context) -> Result<(), AppError> {
    match ctx.raw_record().and_then(|a| a.get("active")) {
        Some(Value::Bool(false)) => Err(AppError::Forbidden("inactive account".into())),
        _ => Ok(()),
    }
}

fn record(v: Value) -> Record {
    match v {
        Value::Object(m) => m,
        _ => Record::new(),
    }
}

async fn seed(store: &dyn Store, m: &Models) -> Result<(), AppError> {
    store.insert_one(&m.user, &record(json!({"id": "u1", "name": "Ada"}))).await?;
    for account in [
        json!({"id": "a0", "email": "admin@blog.local", "password": "admin", "type": "admin", "owner": "u1", "active": true}),
        json!({"id": "a1", "email": "ada@blog.local", "password": "ada", "type": "user", "owner": "u1", "active": true}),
    ] {
        store.insert_one(&m.account, &record(account)).await?;
    }
    tracing::info!("seeded demo accounts admin@blog.local and ada@blog.local");
    Ok(())
}

fn api(store: Arc<dyn Store>, tokens: Arc<SessionTokens>) -> Result<Router, Box<dyn std::error::Error>> {
    let m = models();
    let rels = relations(&m);
    let auth: Arc<dyn Hook> = Arc::new(Authenticate::new(tokens.clone()));
    let is_admin: Arc<dyn Hook> = Arc::new(RequireKind::new(["admin"]));
    let set_writer: Arc<dyn Hook> = Arc::new(AssignOwner::new("writer"));
    let admin_only = || OperationConfig::new().actions(before_query([auth.clone(), is_admin.clone()]));
    let writer_of = |model: &Model| -> Arc<dyn Hook> {
        Arc::new(RequireWriterOrKind::new(store.clone(), Arc::new(model.clone()), "writer", ["admin"]))
    };
    let post_rules: Arc<dyn Hook> = Arc::new(ValidateBody::new([(
        "title",
        ValidationRule {
            required: true,
            min_length: Some(1),
            max_length: Some(200),
            ..Default::default()
        },
    )])?);

    let login_table = login(
        store.clone(),
        m.account.clone(),
        ["email", "password"],
        tokens,
        LoginConfig::new()
            .uri("/auth")
            .actions([Action::from_fn(Phase::BeforeConvert, reject_inactive)]),
    )?;

    let accounts = resource(
        store.clone(),
        m.account.clone(),
        ResourceConfig::new().relations(rels.clone()).defaults(
            OperationConfig::new()
                .converter(ConverterTable::new().hide("password"))
                .actions(before_query([auth.clone(), is_admin.clone()])),
        ),
    )?;

    let users = resource(
        store.clone(),
        m.user.clone(),
        ResourceConfig::new()
            .relations(rels.clone())
            .on(
                RouteKind::Edit,
                OperationConfig::new()
                    .actions(before_query([auth.clone(), Arc::new(RequireSelfOrKind::new(["admin"])) as Arc<dyn Hook>])),
            )
            .on(RouteKind::Destroy, admin_only()),
    )?;

    let categories = resource(
        store.clone(),
        m.category.clone(),
        ResourceConfig::new()
            .relations(rels.clone())
            .on(RouteKind::Add, admin_only())
            .on(RouteKind::Edit, admin_only())
            .on(RouteKind::Destroy, admin_only()),
    )?;

    let posts = resource(
        store.clone(),
        m.post.clone(),
        ResourceConfig::new()
            .relations(rels.clone())
            .defaults(OperationConfig::new().relations(["writer", "category"]))
            .on(RouteKind::Get, OperationConfig::new().relations(["writer", "category", "comments"]))
            .on(
                RouteKind::Add,
                OperationConfig::new().actions(before_query([auth.clone(), set_writer.clone(), post_rules])),
            )
            .on(
                RouteKind::Edit,
                OperationConfig::new().actions(before_query([auth.clone(), writer_of(&m.post), set_writer.clone()])),
            )
            .on(
                RouteKind::Destroy,
                OperationConfig::new().actions(before_query([auth.clone(), writer_of(&m.post)])),
            ),
    )?;

    let comments = resource(
        store.clone(),
        m.comment.clone(),
        ResourceConfig::new()
            .relations(rels)
            .on(
                RouteKind::Add,
                OperationConfig::new().actions(before_query([auth.clone(), set_writer.clone()])),
            )
            .on(
                RouteKind::Edit,
                OperationConfig::new().actions(before_query([auth.clone(), writer_of(&m.comment), set_writer])),
            )
            .on(
                RouteKind::Destroy,
                OperationConfig::new().actions(before_query([auth.clone(), writer_of(&m.comment)])),
            ),
    )?;

    let tags = resource(
        store.clone(),
        m.tag.clone(),
        ResourceConfig::new()
            .on(RouteKind::Add, admin_only())
            .on(RouteKind::Edit, admin_only())
            .on(RouteKind::Destroy, admin_only()),
    )?;

    let routes = RouterComposer::new()
        .table(login_table)
        .table(accounts)
        .table(users)
        .table(categories)
        .table(posts)
        .table(comments)
        .table(tags)
        .error_boundary(|e: AppError| {
            tracing::info!(code = e.code(), status = %e.status(), "request failed");
            e.into_response()
        })
        .compose()
        .into_router();

    Ok(Router::new().merge(common_routes(store)).merge(routes))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("resource_pipeline=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    let store = connect_store(&settings).await?;
    if settings.database_url.is_none() {
        seed(store.as_ref(), &models()).await?;
    }

    let tokens = Arc::new(SessionTokens::new());
    let router = app(api(store, tokens)?, &settings);
    serve(router, &settings).await?;
    Ok(())
}
