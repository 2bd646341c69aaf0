//! HTTP server for Strata.
//!
//! Exposes the core services as a JSON API under `/v1`. Callers are
//! authenticated upstream; their user and team arrive in the
//! `x-strata-user` and `x-strata-team` headers. Error kinds map onto
//! 404/409/403/502/400, and upstream failures are answered with a
//! correlation ID instead of their cause.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod storage;

pub use auth::{Identity, TEAM_HEADER, USER_HEADER};
pub use config::ServerConfig;
pub use error::{ErrorBody, ServerError, ServerResult};
pub use handler::AppState;
pub use server::StrataServer;
