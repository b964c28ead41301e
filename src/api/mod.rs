/*
 * Responsibility
 * - HTTP の入口 (routes / handlers) の公開インターフェース
 */
pub mod handlers;
mod routes;

pub use routes::routes;
