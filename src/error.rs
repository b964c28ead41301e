/*
 * Responsibility
 * - ゲートウェイ共通の GatewayError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - auth / policy / proxy の各エラーを統一的に変換
 * - トークンや内部エラーの詳細はレスポンスに含めない
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::AuthenticationError;
use crate::services::policy::PolicyError;
use crate::services::proxy::{ProxyError, TargetError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request path: {0}")]
    InvalidPath(String),
    #[error("unknown service: {0}")]
    ServiceNotFound(String),
    #[error("authentication failed: {0}")]
    Unauthenticated(#[from] AuthenticationError),
    #[error("identity is not registered")]
    UnknownIdentity,
    #[error("access denied")]
    Forbidden,
    #[error("policy store failure: {0}")]
    PolicyStore(String),
    #[error("backend failure: {0}")]
    BadGateway(String),
    #[error("backend timed out")]
    GatewayTimeout,
    #[error("gateway overloaded")]
    Overloaded,
    #[error("internal server error")]
    Internal,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            GatewayError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::UnknownIdentity | GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::PolicyStore(_) | GatewayError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidPath(_) => "INVALID_PATH",
            GatewayError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            GatewayError::Unauthenticated(_) => "UNAUTHENTICATED",
            GatewayError::UnknownIdentity | GatewayError::Forbidden => "FORBIDDEN",
            GatewayError::PolicyStore(_) => "POLICY_STORE_ERROR",
            GatewayError::BadGateway(_) => "BAD_GATEWAY",
            GatewayError::GatewayTimeout => "GATEWAY_TIMEOUT",
            GatewayError::Overloaded => "OVERLOADED",
            GatewayError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Short outcome label used in decision logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::InvalidPath(_) => "invalid_path",
            GatewayError::ServiceNotFound(_) => "unknown_service",
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::UnknownIdentity => "unknown_identity",
            GatewayError::Forbidden => "denied",
            GatewayError::PolicyStore(_) => "store_error",
            GatewayError::BadGateway(_) => "backend_error",
            GatewayError::GatewayTimeout => "backend_timeout",
            GatewayError::Overloaded => "overloaded",
            GatewayError::Internal => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            GatewayError::InvalidPath(_) => "request path is not allowed".into(),
            GatewayError::ServiceNotFound(name) => format!("service '{name}' not found."),
            GatewayError::Unauthenticated(_) => "missing or invalid bearer token".into(),
            GatewayError::UnknownIdentity | GatewayError::Forbidden => "access denied".into(),
            GatewayError::PolicyStore(_) => "policy lookup failed".into(),
            GatewayError::BadGateway(_) => "backend unavailable".into(),
            GatewayError::GatewayTimeout => "backend timed out".into(),
            GatewayError::Overloaded => "too many requests in flight".into(),
            GatewayError::Internal => "internal server error".into(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
            },
        };

        let mut response = (self.status(), Json(body)).into_response();
        if matches!(self, GatewayError::Unauthenticated(_)) {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

impl From<PolicyError> for GatewayError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::UnknownIdentity => GatewayError::UnknownIdentity,
            PolicyError::Store(err) => GatewayError::PolicyStore(err.to_string()),
        }
    }
}

impl From<TargetError> for GatewayError {
    fn from(e: TargetError) -> Self {
        match e {
            TargetError::MissingService => GatewayError::ServiceNotFound(String::new()),
            TargetError::UnsafePath => GatewayError::InvalidPath(e.to_string()),
        }
    }
}

impl From<ProxyError> for GatewayError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::Timeout(_) => GatewayError::GatewayTimeout,
            ProxyError::Upstream(err) => GatewayError::BadGateway(err.to_string()),
            ProxyError::InvalidUpstream(err) => GatewayError::BadGateway(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;

    use super::*;
    use crate::repos::RepoError;

    async fn body_json(err: GatewayError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_and_code_mapping() {
        let cases = [
            (TargetError::UnsafePath.into(), 400, "INVALID_PATH"),
            (TargetError::MissingService.into(), 404, "SERVICE_NOT_FOUND"),
            (GatewayError::ServiceNotFound("nope".into()), 404, "SERVICE_NOT_FOUND"),
            (AuthenticationError::Expired.into(), 401, "UNAUTHENTICATED"),
            (PolicyError::UnknownIdentity.into(), 403, "FORBIDDEN"),
            (GatewayError::Forbidden, 403, "FORBIDDEN"),
            (PolicyError::Store(RepoError::Timeout).into(), 500, "POLICY_STORE_ERROR"),
            (ProxyError::Timeout(Duration::from_secs(1)).into(), 504, "GATEWAY_TIMEOUT"),
            (GatewayError::Overloaded, 503, "OVERLOADED"),
        ];

        for (err, status, code) in cases {
            let (actual_status, body) = body_json(err).await;
            assert_eq!(actual_status.as_u16(), status);
            assert_eq!(body["error"]["code"], code);
        }
    }

    #[tokio::test]
    async fn error_bodies_do_not_echo_internals() {
        let err = GatewayError::from(PolicyError::Store(RepoError::InvalidSeed(
            "secret detail".into(),
        )));
        let (_, body) = body_json(err).await;
        assert!(!body.to_string().contains("secret detail"));
    }

    #[test]
    fn unauthenticated_advertises_bearer_scheme() {
        let response = GatewayError::from(AuthenticationError::MissingToken).into_response();
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
    }
}
