/*
 * Responsibility
 * - middleware の公開インターフェース (re-export)
 * - 現状は transport 層の http::apply のみ
 */
pub mod http;

pub use http::HttpLimits;
