//! Scoped read side: PIN → scope, then JSON, CSV or map output.

pub mod gateway;
pub mod handlers;
pub mod render;
pub mod routes;

pub use gateway::{ViewError, ViewFilters, ViewFormat, ViewGateway, ViewRange};
pub use routes::create_view_router;
