pub mod client_addr;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use client_addr::client_address;
pub use routes::create_redirect_router;
