#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use resource_pipeline::action::before_query;
use resource_pipeline::hooks::{AssignOwner, RequireKind, RequireWriterOrKind};
use resource_pipeline::{
    common_routes, login, resource, Authenticate, ConverterTable, Hook, LoginConfig, MemoryStore, Model,
    OperationConfig, Relation, ResourceConfig, RouteKind, RouterComposer, SessionTokens, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub struct Blog {
    pub store: Arc<MemoryStore>,
    pub router: Router,
    pub post: Model,
}

pub fn models() -> (Model, Model, Model, Model) {
    (Model::new("Account"), Model::new("User"), Model::new("Post"), Model::new("Comment"))
}

pub fn blog() -> Blog {
    let store = Arc::new(MemoryStore::new());
    let (account, user, post, comment) = models();
    store
        .seed(
            &account,
            [
                json!({"id": "a0", "email": "root@x.io", "password": "root", "type": "admin", "owner": "u0"}),
                json!({"id": "a1", "email": "one@x.io", "password": "one", "type": "user", "owner": "u1"}),
                json!({"id": "a2", "email": "two@x.io", "password": "two", "type": "user", "owner": "u2"}),
            ],
        )
        .unwrap();
    store
        .seed(&user, [json!({"id": "u1", "name": "One"}), json!({"id": "u2", "name": "Two"})])
        .unwrap();
    store
        .seed(
            &post,
            [
                json!({"id": "p1", "title": "first", "writer": "u1"}),
                json!({"id": "p2", "title": "second", "writer": "u2"}),
            ],
        )
        .unwrap();
    store
        .seed(&comment, [json!({"id": "c1", "post": "p1", "writer": "u2", "text": "nice"})])
        .unwrap();

    let dyn_store: Arc<dyn Store> = store.clone();
    let tokens = Arc::new(SessionTokens::new());
    let auth: Arc<dyn Hook> = Arc::new(Authenticate::new(tokens.clone()));
    let is_admin: Arc<dyn Hook> = Arc::new(RequireKind::new(["admin"]));
    let set_writer: Arc<dyn Hook> = Arc::new(AssignOwner::new("writer"));
    let is_writer: Arc<dyn Hook> = Arc::new(RequireWriterOrKind::new(
        dyn_store.clone(),
        Arc::new(post.clone()),
        "writer",
        ["admin"],
    ));
    let relations = vec![
        Relation::belongs_to(&post, "writer", &user, "writer"),
        Relation::has_many(&post, "comments", &comment, "post"),
    ];

    let login_table = login(
        dyn_store.clone(),
        account.clone(),
        ["email", "password"],
        tokens,
        LoginConfig::new(),
    )
    .unwrap();
    let accounts = resource(
        dyn_store.clone(),
        account,
        ResourceConfig::new().defaults(
            OperationConfig::new()
                .converter(ConverterTable::new().hide("password"))
                .actions(before_query([auth.clone(), is_admin])),
        ),
    )
    .unwrap();
    let posts = resource(
        dyn_store.clone(),
        post.clone(),
        ResourceConfig::new()
            .relations(relations)
            .on(RouteKind::Get, OperationConfig::new().relations(["writer", "comments"]))
            .on(
                RouteKind::Add,
                OperationConfig::new().actions(before_query([auth.clone(), set_writer.clone()])),
            )
            .on(
                RouteKind::Edit,
                OperationConfig::new().actions(before_query([auth.clone(), is_writer.clone(), set_writer])),
            )
            .on(
                RouteKind::Destroy,
                OperationConfig::new().actions(before_query([auth, is_writer])),
            ),
    )
    .unwrap();
    let users = resource(dyn_store.clone(), user.clone(), ResourceConfig::new()).unwrap();
    let shadow_users = resource(
        dyn_store.clone(),
        Model::new("Member").table("members"),
        ResourceConfig::new().defaults(OperationConfig::new().uri("/users")),
    )
    .unwrap();

    let routes = RouterComposer::new()
        .table(login_table)
        .table(accounts)
        .table(posts)
        .table(users)
        .table(shadow_users)
        .compose()
        .into_router();
    let router = Router::new().merge(common_routes(dyn_store)).merge(routes);
    Blog { store, router, post }
}

pub async fn call(router: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn token_for(router: &Router, email: &str, password: &str) -> String {
    let (status, body) = call(
        router,
        Method::POST,
        "/login",
        None,
        Some(json!({"email": email, "password": password})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["data"]["token"].as_str().unwrap().to_string()
}
