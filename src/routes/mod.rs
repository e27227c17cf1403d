//! Route tables, the composer that mounts them, and ambient service routes.

mod common;
mod compose;
mod table;

pub use common::common_routes;
pub use compose::{compose, ComposedRoutes, ErrorBoundary, RouterComposer};
pub use table::{Route, RouteHandler, RouteTable};
