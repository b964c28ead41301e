//! Authenticating reverse proxy: OIDC bearer tokens in, RBAC-checked
//! requests out to the registered backend services.
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod server;
pub mod services;
pub mod state;
