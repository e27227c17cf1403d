//! Resource pipeline: CRUD REST routes generated from model configuration, each request
//! flowing through a nine-phase pipeline of pluggable hooks.

pub mod action;
pub mod auth;
pub mod context;
pub mod error;
pub mod hooks;
pub mod login;
pub mod model;
pub mod pipeline;
pub mod resource;
pub mod response;
pub mod routes;
pub mod server;
pub mod settings;
pub mod stage;
pub mod store;

pub use action::{Action, Hook, Phase};
pub use auth::{Authenticate, Authenticator, SessionTokens, TokenIssuer};
pub use context::{Context, Identity, Output, RawResult, Record, RequestData};
pub use error::{AppError, ConfigError, StoreError};
pub use login::{login, LoginConfig};
pub use model::{KeyType, Model, Relation, RelationKind};
pub use pipeline::Pipeline;
pub use resource::{resource, OperationConfig, ResourceConfig, RouteKind};
pub use response::{success_many, success_one};
pub use routes::{common_routes, compose, ComposedRoutes, ErrorBoundary, RouteTable, RouterComposer};
pub use settings::Settings;
pub use stage::{ConverterTable, Operation, QueryDescriptor};
pub use store::{MemoryStore, Page, PgStore, Store};
