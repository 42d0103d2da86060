//! HTTP surface: router, health endpoint, middleware layers

pub mod routes;

pub use routes::build_router;
