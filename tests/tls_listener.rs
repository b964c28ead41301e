//! The full stack served over TLS on an ephemeral port.
mod common;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use common::*;
use rbac_gateway::server;
use rbac_gateway::services::proxy::ForwarderConfig;

async fn start(app: axum::Router) -> (SocketAddr, axum_server::Handle) {
    server::install_crypto_provider();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let tls = server::load_tls(&fixtures.join("tls_cert.pem"), &fixtures.join("tls_key.pem"))
        .await
        .expect("tls");

    let handle = axum_server::Handle::new();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    tokio::spawn(server::serve(app, addr, tls, handle.clone()));
    let bound = handle.listening().await.expect("listening");
    (bound, handle)
}

fn client() -> reqwest::Client {
    // Self-signed fixture certificate.
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn serves_gateway_over_https() {
    let backend = spawn_backend().await;
    let gw = gateway(&scenario_seed(&backend), ForwarderConfig::default());
    let (addr, handle) = start(gw.app).await;

    let health = client()
        .get(format!("https://127.0.0.1:{}/healthz", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    let response = client()
        .get(format!("https://127.0.0.1:{}/TEST/", addr.port()))
        .bearer_auth(token_for("u@c-s.fr"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/date/");
    assert_eq!(body["headers"]["x-forwarded-for"], "127.0.0.1");
    assert_eq!(body["headers"]["x-forwarded-proto"], "https");

    handle.graceful_shutdown(Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn plain_http_is_not_served() {
    let backend = spawn_backend().await;
    let gw = gateway(&scenario_seed(&backend), ForwarderConfig::default());
    let (addr, handle) = start(gw.app).await;

    let result = client()
        .get(format!("http://127.0.0.1:{}/healthz", addr.port()))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.map(|r| !r.status().is_success()).unwrap_or(true));

    handle.graceful_shutdown(Some(Duration::from_secs(1)));
}
