#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::Request;
use axum::response::IntoResponse;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rbac_gateway::app::build_router;
use rbac_gateway::middleware::HttpLimits;
use rbac_gateway::repos::MemoryPolicyStore;
use rbac_gateway::repos::seed::PolicySeed;
use rbac_gateway::services::auth::{OidcConfig, OidcVerifier};
use rbac_gateway::services::policy::PolicyEngine;
use rbac_gateway::services::proxy::{Forwarder, ForwarderConfig};
use rbac_gateway::state::AppState;
use serde_json::{Value, json};

pub const ISSUER: &str = "https://idp.example.test/realms/master";
pub const CLIENT_ID: &str = "safescale";
pub const ISSUER_KEY: &str = include_str!("../fixtures/issuer_ed25519.pem");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue_ed25519.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_secs()
}

pub fn sign(claims: Value, pem: &str, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = kid.map(str::to_string);
    encode(
        &header,
        &claims,
        &EncodingKey::from_ed_pem(pem.as_bytes()).expect("ed25519 pem"),
    )
    .expect("sign")
}

pub fn claims_for(email: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": "0b7c5a1e",
        "email": email,
        "exp": now() + 300,
    })
}

pub fn token_for(email: &str) -> String {
    sign(claims_for(email), ISSUER_KEY, Some("issuer-key-1"))
}

pub fn oidc_config() -> OidcConfig {
    OidcConfig {
        issuer_url: ISSUER.to_string(),
        client_id: Some(CLIENT_ID.to_string()),
        leeway_seconds: 0,
        ..OidcConfig::default()
    }
}

/// Echo backend. Paths under `/slow` stall for `SLOW_DELAY`.
pub struct Backend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

pub const SLOW_DELAY: Duration = Duration::from_secs(5);

impl Backend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn echo(State(hits): State<Arc<AtomicUsize>>, req: Request<Body>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);

    let (parts, body) = req.into_parts();
    if parts.uri.path().starts_with("/slow") {
        tokio::time::sleep(SLOW_DELAY).await;
    }

    let headers: serde_json::Map<String, Value> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();

    (
        [("x-backend", "echo")],
        axum::Json(json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": parts.uri.query(),
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        })),
    )
}

pub async fn spawn_backend() -> Backend {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().fallback(echo).with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("backend server");
    });

    Backend { addr, hits }
}

/// Scenario policy: `USER` may GET anything on `TEST` and `SLOW`.
pub fn scenario_seed(backend: &Backend) -> PolicySeed {
    PolicySeed::from_json(
        &json!({
            "roles": [
                { "name": "USER", "permissions": [{ "action": "GET", "resource": "*" }] },
                { "name": "ADMIN", "permissions": [{ "action": "*", "resource": "*" }] }
            ],
            "services": [
                { "name": "TEST", "base_url": backend.url("/date"), "roles": ["USER", "ADMIN"] },
                { "name": "SLOW", "base_url": backend.url("/slow"), "roles": ["USER"] }
            ],
            "users": [
                { "email": "u@c-s.fr", "roles": ["USER"] },
                { "email": "admin@c-s.fr", "roles": ["ADMIN"] }
            ]
        })
        .to_string(),
    )
    .expect("seed")
}

pub struct Gateway {
    pub app: Router,
    pub store: MemoryPolicyStore,
}

pub fn gateway(seed: &PolicySeed, forwarder: ForwarderConfig) -> Gateway {
    let store = MemoryPolicyStore::from_seed(seed).expect("store");
    let policy = Arc::new(PolicyEngine::new(
        Arc::new(store.clone()),
        Duration::from_secs(2),
    ));
    let verifier = OidcVerifier::with_key_set(
        oidc_config(),
        serde_json::from_str(JWKS).expect("jwks"),
    );
    let forwarder = Forwarder::new(forwarder).expect("forwarder");

    let state = AppState::new(policy, Arc::new(verifier), Arc::new(forwarder));
    Gateway {
        app: build_router(state, HttpLimits::default()),
        store,
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}
