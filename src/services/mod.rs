pub mod auth;
pub mod cache;
pub mod policy;
pub mod proxy;
