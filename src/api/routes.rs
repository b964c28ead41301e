/*
 * Responsibility
 * - ゲートウェイの URL 構造を定義
 * - /healthz は固定ルート、それ以外はすべて fallback で proxy に渡す
 * - /healthz が優先されるため "healthz" という名前の service には到達できない
 */
use axum::{Router, routing::get};

use crate::api::handlers::{health::health, proxy::proxy};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .fallback(proxy)
        .with_state(state)
}
