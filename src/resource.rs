//! Resource route builder: five CRUD routes per model, each a pipeline of default stages plus caller hooks.
//!
//! Per-operation settings take precedence over the resource `defaults`, which take precedence over
//! built-in behavior (pass-through converter, every declared relation of the model, no extra actions).

use crate::action::{Action, Phase};
use crate::error::ConfigError;
use crate::model::{relations_of, Model, Relation};
use crate::pipeline::Pipeline;
use crate::routes::{Route, RouteHandler, RouteTable};
use crate::stage::{BuildQuery, ConvertData, ConverterTable, Operation, RunQuery};
use crate::store::Store;
use axum::http::{Method, StatusCode};
use std::sync::Arc;

/// Which generated CRUD route is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKind {
    List,
    Get,
    Add,
    Edit,
    Destroy,
}

impl RouteKind {
    pub const ALL: [RouteKind; 5] = [
        RouteKind::List,
        RouteKind::Get,
        RouteKind::Add,
        RouteKind::Edit,
        RouteKind::Destroy,
    ];

    pub fn operation(self) -> Operation {
        match self {
            RouteKind::List => Operation::List,
            RouteKind::Get => Operation::Read,
            RouteKind::Add => Operation::Create,
            RouteKind::Edit => Operation::Update,
            RouteKind::Destroy => Operation::Delete,
        }
    }

    /// Whether the route addresses a single record by `:id`.
    pub fn needs_id(self) -> bool {
        matches!(self, RouteKind::Get | RouteKind::Edit | RouteKind::Destroy)
    }

    pub fn method(self) -> Method {
        match self {
            RouteKind::List | RouteKind::Get => Method::GET,
            RouteKind::Add => Method::POST,
            RouteKind::Edit => Method::PUT,
            RouteKind::Destroy => Method::DELETE,
        }
    }

    pub fn success_status(self) -> StatusCode {
        match self {
            RouteKind::Add => StatusCode::CREATED,
            _ => StatusCode::OK,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteKind::List => "list",
            RouteKind::Get => "get",
            RouteKind::Add => "add",
            RouteKind::Edit => "edit",
            RouteKind::Destroy => "destroy",
        }
    }
}

/// Options recognized at both the resource `defaults` level and per operation.
#[derive(Clone, Debug, Default)]
pub struct OperationConfig {
    /// Full route path for an operation. At the defaults level: the collection path, `/:id` appended where needed.
    pub uri: Option<String>,
    pub converter: Option<ConverterTable>,
    pub actions: Option<Vec<Action>>,
    /// Names of declared relations to expand. Unset means all of the model's declared relations.
    pub relations: Option<Vec<String>>,
}

impl OperationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn converter(mut self, converter: ConverterTable) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions = Some(actions.into_iter().collect());
        self
    }

    pub fn relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceConfig {
    /// Declared relation set (may span several models); only this model's entries are used.
    pub relations: Vec<Relation>,
    pub defaults: OperationConfig,
    pub list: OperationConfig,
    pub get: OperationConfig,
    pub add: OperationConfig,
    pub edit: OperationConfig,
    pub destroy: OperationConfig,
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relations(mut self, relations: Vec<Relation>) -> Self {
        self.relations = relations;
        self
    }

    pub fn defaults(mut self, config: OperationConfig) -> Self {
        self.defaults = config;
        self
    }

    pub fn on(mut self, kind: RouteKind, config: OperationConfig) -> Self {
        *self.operation_mut(kind) = config;
        self
    }

    pub fn operation(&self, kind: RouteKind) -> &OperationConfig {
        match kind {
            RouteKind::List => &self.list,
            RouteKind::Get => &self.get,
            RouteKind::Add => &self.add,
            RouteKind::Edit => &self.edit,
            RouteKind::Destroy => &self.destroy,
        }
    }

    fn operation_mut(&mut self, kind: RouteKind) -> &mut OperationConfig {
        match kind {
            RouteKind::List => &mut self.list,
            RouteKind::Get => &mut self.get,
            RouteKind::Add => &mut self.add,
            RouteKind::Edit => &mut self.edit,
            RouteKind::Destroy => &mut self.destroy,
        }
    }
}

pub(crate) fn validate_uri(uri: &str) -> Result<(), ConfigError> {
    if !uri.starts_with('/') || uri.contains("//") {
        return Err(ConfigError::InvalidRoute(format!("route path must start with a single '/': {}", uri)));
    }
    Ok(())
}

fn route_path(model: &Model, kind: RouteKind, config: &ResourceConfig) -> Result<String, ConfigError> {
    let path = match (&config.operation(kind).uri, &config.defaults.uri) {
        (Some(uri), _) => uri.clone(),
        (None, Some(base)) if kind.needs_id() => format!("{}/:id", base.trim_end_matches('/')),
        (None, Some(base)) => base.clone(),
        (None, None) if kind.needs_id() => model.item_path(),
        (None, None) => model.collection_path(),
    };
    validate_uri(&path)?;
    let id_segments = path.split('/').filter(|segment| *segment == ":id").count();
    if kind.needs_id() && id_segments != 1 {
        return Err(ConfigError::InvalidRoute(format!(
            "{} route for {} must capture exactly one :id segment: {}",
            kind.as_str(),
            model.name,
            path
        )));
    }
    Ok(path)
}

/// Compose the default stages and the caller's actions for one operation.
pub fn operation_actions(
    store: &Arc<dyn Store>,
    model: &Arc<Model>,
    kind: RouteKind,
    config: &ResourceConfig,
) -> Result<Vec<Action>, ConfigError> {
    let op = config.operation(kind);
    let relations = match op.relations.as_ref().or(config.defaults.relations.as_ref()) {
        Some(names) => relations_of(model, &config.relations, names)?,
        None => config
            .relations
            .iter()
            .filter(|r| r.source == model.name)
            .cloned()
            .collect(),
    };
    let converter = op
        .converter
        .as_ref()
        .or(config.defaults.converter.as_ref())
        .cloned()
        .unwrap_or_default();
    let extra = op
        .actions
        .as_ref()
        .or(config.defaults.actions.as_ref())
        .cloned()
        .unwrap_or_default();

    let mut actions = vec![
        Action::new(Phase::OnQuery, BuildQuery::new(model.clone(), kind, relations)),
        Action::new(Phase::OnRun, RunQuery::new(store.clone(), model.clone())),
        Action::new(Phase::OnConvert, ConvertData::new(converter)),
    ];
    actions.extend(extra);
    Ok(actions)
}

/// Build the route table for `model`. Fails only on configuration errors.
pub fn resource(store: Arc<dyn Store>, model: Model, config: ResourceConfig) -> Result<RouteTable, ConfigError> {
    let model = Arc::new(model);
    let mut table = RouteTable::new();
    for kind in RouteKind::ALL {
        let path = route_path(&model, kind, &config)?;
        let pipeline = Pipeline::new(operation_actions(&store, &model, kind, &config)?);
        let label = format!("{}.{}", model.name, kind.as_str());
        tracing::debug!(route = %label, method = %kind.method(), path = %path, actions = pipeline.len(), "route built");
        table.push(Route::new(
            kind.method(),
            path,
            RouteHandler::new(label, kind.success_status(), pipeline),
        ));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn default_table_has_five_routes() {
        let table = resource(store(), Model::new("Post"), ResourceConfig::new()).unwrap();
        let routes: Vec<(Method, &str)> = table.routes().iter().map(|r| (r.method.clone(), r.path.as_str())).collect();
        assert_eq!(
            routes,
            vec![
                (Method::GET, "/posts"),
                (Method::GET, "/posts/:id"),
                (Method::POST, "/posts"),
                (Method::PUT, "/posts/:id"),
                (Method::DELETE, "/posts/:id"),
            ]
        );
    }

    #[test]
    fn operation_uri_beats_defaults_uri() {
        let config = ResourceConfig::new()
            .defaults(OperationConfig::new().uri("/articles"))
            .on(RouteKind::Get, OperationConfig::new().uri("/article/:id"));
        let table = resource(store(), Model::new("Post"), config).unwrap();
        let paths: Vec<&str> = table.routes().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/articles", "/article/:id", "/articles", "/articles/:id", "/articles/:id"]);
    }

    #[test]
    fn caller_actions_land_in_their_phase_after_defaults() {
        let model = Arc::new(Model::new("Post"));
        let hook = Action::from_fn(Phase::OnQuery, |_ctx| Ok(()));
        let config = ResourceConfig::new()
            .defaults(OperationConfig::new().actions([Action::from_fn(Phase::BeforeQuery, |_ctx| Ok(()))]))
            .on(RouteKind::Add, OperationConfig::new().actions([hook]));

        let add = Pipeline::new(operation_actions(&store(), &model, RouteKind::Add, &config).unwrap());
        assert_eq!(add.actions_in(Phase::OnQuery).len(), 2);
        assert!(add.actions_in(Phase::BeforeQuery).is_empty());

        let list = Pipeline::new(operation_actions(&store(), &model, RouteKind::List, &config).unwrap());
        assert_eq!(list.actions_in(Phase::BeforeQuery).len(), 1);
        assert_eq!(list.actions_in(Phase::OnQuery).len(), 1);
    }

    #[tokio::test]
    async fn writer_assigned_before_query_reaches_descriptor() {
        use crate::context::{Context, Identity, Record, RequestData};
        use crate::hooks::AssignOwner;
        use serde_json::json;

        let model = Arc::new(Model::new("Post"));
        let config = ResourceConfig::new().on(
            RouteKind::Add,
            OperationConfig::new().actions([Action::new(Phase::BeforeQuery, AssignOwner::new("writer"))]),
        );
        let pipeline = Pipeline::new(operation_actions(&store(), &model, RouteKind::Add, &config).unwrap());
        let body = json!({"title": "hi"}).as_object().cloned().unwrap();
        let mut ctx = Context::new(RequestData::new(Method::POST, "/posts").with_body(body));
        ctx.identity = Some(Identity {
            subject: "a1".into(),
            kind: "user".into(),
            owner: Some("u1".into()),
            claims: Record::new(),
        });

        let ctx = pipeline.run(ctx).await.unwrap();
        let expected = json!({"title": "hi", "writer": "u1"}).as_object().cloned().unwrap();
        assert_eq!(ctx.query.unwrap().data, Some(expected));
    }

    #[tokio::test]
    async fn declared_relations_expand_unless_narrowed() {
        use crate::context::{Output, RequestData};
        use serde_json::json;

        let memory = Arc::new(MemoryStore::new());
        let post = Model::new("Post");
        let user = Model::new("User");
        let comment = Model::new("Comment");
        memory.seed(&user, [json!({"id": "u1", "name": "One"})]).unwrap();
        memory.seed(&post, [json!({"id": "p1", "writer": "u1"})]).unwrap();
        memory.seed(&comment, [json!({"id": "c1", "post": "p1"})]).unwrap();
        let declared = vec![
            Relation::belongs_to(&post, "writer", &user, "writer"),
            Relation::has_many(&post, "comments", &comment, "post"),
            Relation::belongs_to(&comment, "post", &post, "post"),
        ];
        let get = |config: ResourceConfig| {
            let table = resource(memory.clone(), post.clone(), config).unwrap();
            table.find(&Method::GET, "/posts/:id").unwrap().handler.clone()
        };
        let request = || RequestData::new(Method::GET, "/posts/p1").with_param("id", "p1");

        let all = get(ResourceConfig::new().relations(declared.clone()));
        let Output::One(out) = all.handle(request()).await.unwrap() else {
            panic!("expected a single record");
        };
        assert_eq!(out["writer"]["name"], "One");
        assert_eq!(out["comments"][0]["id"], "c1");
        assert!(out.get("post").is_none());

        let narrowed = get(
            ResourceConfig::new()
                .relations(declared)
                .defaults(OperationConfig::new().relations(["comments"])),
        );
        let Output::One(out) = narrowed.handle(request()).await.unwrap() else {
            panic!("expected a single record");
        };
        assert_eq!(out["writer"], "u1");
        assert_eq!(out["comments"][0]["id"], "c1");
    }

    #[test]
    fn malformed_routes_and_relations_fail_at_build_time() {
        let bad_uri = ResourceConfig::new().on(RouteKind::Edit, OperationConfig::new().uri("/posts/edit"));
        assert!(matches!(
            resource(store(), Model::new("Post"), bad_uri),
            Err(ConfigError::InvalidRoute(_))
        ));

        for uri in ["/posts/:idx", "/posts/:identifier", "/posts/:id/:id"] {
            let near_miss = ResourceConfig::new().on(RouteKind::Get, OperationConfig::new().uri(uri));
            assert!(
                matches!(resource(store(), Model::new("Post"), near_miss), Err(ConfigError::InvalidRoute(_))),
                "{} accepted",
                uri
            );
        }
        let nested = ResourceConfig::new().on(RouteKind::Get, OperationConfig::new().uri("/blog/:id/post"));
        assert!(resource(store(), Model::new("Post"), nested).is_ok());

        let bad_rel = ResourceConfig::new().defaults(OperationConfig::new().relations(["ghost"]));
        assert!(matches!(
            resource(store(), Model::new("Post"), bad_rel),
            Err(ConfigError::UnknownRelation { .. })
        ));
    }
}
