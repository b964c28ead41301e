//! HTTP-level middleware (cross-cutting concerns).
//!
//! Applied to every route, the health check included.
//!
//! Responsibility:
//! - Request-Id generation + propagation (X-Request-Id)
//! - Access logging / request tracing (TraceLayer)
//! - Load shedding past `max_in_flight` concurrent requests (503)
//! - Overall request deadline (504)
//! - Inbound body size limit (413)

use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::header::HeaderName;
use axum::response::IntoResponse;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::load_shed::error::Overloaded;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub request_timeout: Duration,
    pub max_in_flight: usize,
    pub max_body_bytes: usize,
}

impl HttpLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout,
            max_in_flight: config.max_in_flight_requests,
            max_body_bytes: config.max_request_body_bytes,
        }
    }
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_in_flight: 1024,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Apply HTTP-level middleware to the given Router.
///
/// The concurrency limit is global: `Router::layer` clones the stack per
/// route, and every clone draws on the same semaphore.
pub fn apply(router: Router, limits: HttpLimits) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    let layers = ServiceBuilder::new()
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            handle_error(err).into_response()
        }))
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(TraceLayer::new_for_http())
        .layer(LoadShedLayer::new())
        .layer(GlobalConcurrencyLimitLayer::new(limits.max_in_flight))
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(RequestBodyLimitLayer::new(limits.max_body_bytes));

    router.layer(layers)
}

fn handle_error(err: BoxError) -> GatewayError {
    if err.is::<Overloaded>() {
        warn!(outcome = "overloaded", "request shed: too many in flight");
        GatewayError::Overloaded
    } else if err.is::<Elapsed>() {
        warn!(outcome = "request_timeout", "request deadline exceeded");
        GatewayError::GatewayTimeout
    } else {
        error!(error = %err, "unhandled middleware error");
        GatewayError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};
    use tower::ServiceExt;

    fn app(limits: HttpLimits) -> Router {
        let router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "done"
                }),
            )
            .route("/echo", post(|body: String| async move { body }));
        apply(router, limits)
    }

    fn get_slow() -> Request<Body> {
        Request::builder().uri("/slow").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn sheds_requests_past_in_flight_limit() {
        let app = app(HttpLimits {
            max_in_flight: 1,
            ..HttpLimits::default()
        });

        let first = tokio::spawn(app.clone().oneshot(get_slow()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let shed = app.clone().oneshot(get_slow()).await.unwrap();
        assert_eq!(shed.status(), StatusCode::SERVICE_UNAVAILABLE);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn request_deadline_maps_to_gateway_timeout() {
        let app = app(HttpLimits {
            request_timeout: Duration::from_millis(50),
            ..HttpLimits::default()
        });

        let response = app.oneshot(get_slow()).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = app(HttpLimits {
            max_body_bytes: 4,
            ..HttpLimits::default()
        });

        let req = Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-length", "16")
            .body(Body::from("0123456789abcdef"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
