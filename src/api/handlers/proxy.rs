/*
 * Responsibility
 * - /<service>/<remainder...> を受けて認証・認可・転送を順に実行する
 *   - path 検査 (400) → service 解決 (404) → bearer 検証 (401) → policy (403/500) → 転送 (502/504)
 * - 結果ごとに decision log を 1 件出す (token は出さない)
 */
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::services::auth::{AuthenticationError, extract_bearer_token};
use crate::services::policy::Decision;
use crate::services::proxy::{GatewayTarget, ProxyError};
use crate::state::AppState;

/// Fields of the decision record, filled in as the request progresses.
#[derive(Debug, Default)]
struct DecisionRecord {
    service: Option<String>,
    identity: Option<String>,
    role: Option<String>,
}

pub async fn proxy(State(state): State<AppState>, req: Request<Body>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let mut record = DecisionRecord::default();

    match handle(&state, req, &mut record).await {
        Ok(response) => {
            info!(
                identity = record.identity.as_deref().unwrap_or("-"),
                service = record.service.as_deref().unwrap_or("-"),
                method = %method,
                path = %path,
                role = record.role.as_deref().unwrap_or("-"),
                status = response.status().as_u16(),
                outcome = "allowed",
                "access decision"
            );
            response
        }
        Err(err) => {
            log_failure(&record, &method, &path, &err);
            err.into_response()
        }
    }
}

async fn handle(
    state: &AppState,
    req: Request<Body>,
    record: &mut DecisionRecord,
) -> Result<Response, GatewayError> {
    let target = GatewayTarget::parse(req.uri())?;
    record.service = Some(target.service.clone());

    let service = state
        .policy
        .resolve_service(&target.service)
        .await?
        .ok_or_else(|| GatewayError::ServiceNotFound(target.service.clone()))?;

    let token = extract_bearer_token(req.headers()).ok_or(AuthenticationError::MissingToken)?;
    let identity = state.verifier.verify(token).await?;
    record.identity = Some(identity.email.clone());

    let decision = state
        .policy
        .authorize(
            &identity.email,
            &service,
            req.method().as_str(),
            &target.remainder,
        )
        .await?;

    match decision {
        Decision::Allow { role } => record.role = Some(role),
        Decision::Deny => return Err(GatewayError::Forbidden),
    }

    let upstream = target
        .upstream_url(&service.base_url)
        .map_err(ProxyError::from)?;

    Ok(state.forwarder.forward(upstream, &identity, req).await?)
}

fn log_failure(record: &DecisionRecord, method: &Method, path: &str, err: &GatewayError) {
    let identity = record.identity.as_deref().unwrap_or("-");
    let service = record.service.as_deref().unwrap_or("-");
    let outcome = err.outcome();

    match err {
        GatewayError::PolicyStore(_)
        | GatewayError::BadGateway(_)
        | GatewayError::GatewayTimeout
        | GatewayError::Internal => warn!(
            identity,
            service,
            method = %method,
            path = %path,
            role = record.role.as_deref().unwrap_or("-"),
            outcome,
            error = %err,
            "access decision"
        ),
        _ => info!(
            identity,
            service,
            method = %method,
            path = %path,
            outcome,
            reason = %err,
            "access decision"
        ),
    }
}
