//! RFC 7662 token introspection, used for tokens that are not JWTs.
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::warn;

use crate::services::auth::oidc::string_claim;
use crate::services::auth::verifier::{AuthenticationError, VerifiedIdentity};

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Client-authenticated introspection against the issuer.
#[derive(Clone)]
pub struct Introspector {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
    issuer: String,
}

impl std::fmt::Debug for Introspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Introspector")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl Introspector {
    pub fn new(
        http: reqwest::Client,
        endpoint: String,
        client_id: String,
        client_secret: String,
        issuer: String,
    ) -> Self {
        Self {
            http,
            endpoint,
            client_id,
            client_secret,
            issuer,
        }
    }

    pub async fn introspect(
        &self,
        token: &str,
        identity_claim: &str,
    ) -> Result<VerifiedIdentity, AuthenticationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                warn!(error = %e, "token introspection failed");
                AuthenticationError::IssuerUnavailable(e.to_string())
            })?;

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthenticationError::IssuerUnavailable(e.to_string()))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        check_introspection(body, &self.issuer, identity_claim, now)
    }
}

fn check_introspection(
    body: IntrospectionResponse,
    issuer: &str,
    identity_claim: &str,
    now: u64,
) -> Result<VerifiedIdentity, AuthenticationError> {
    if !body.active {
        return Err(AuthenticationError::Inactive);
    }
    if body.iss.as_deref().is_some_and(|iss| iss != issuer) {
        return Err(AuthenticationError::WrongIssuer);
    }
    if body.exp.is_some_and(|exp| exp <= now) {
        return Err(AuthenticationError::Expired);
    }

    let email = string_claim(&body.extra, identity_claim)?;
    Ok(VerifiedIdentity {
        email,
        expires_at: body.exp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ISSUER: &str = "https://idp.example.test/realms/master";

    fn body(value: serde_json::Value) -> IntrospectionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn active_token_yields_identity() {
        let identity = check_introspection(
            body(json!({ "active": true, "iss": ISSUER, "exp": 2_000, "email": "user@c-s.fr" })),
            ISSUER,
            "email",
            1_000,
        )
        .unwrap();
        assert_eq!(identity.email, "user@c-s.fr");
        assert_eq!(identity.expires_at, Some(2_000));
    }

    #[test]
    fn inactive_token_is_rejected() {
        let err = check_introspection(body(json!({ "active": false })), ISSUER, "email", 0)
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::Inactive));
    }

    #[test]
    fn foreign_issuer_and_past_expiry_are_rejected() {
        let err = check_introspection(
            body(json!({ "active": true, "iss": "https://other", "email": "u@c-s.fr" })),
            ISSUER,
            "email",
            0,
        )
        .unwrap_err();
        assert!(matches!(err, AuthenticationError::WrongIssuer));

        let err = check_introspection(
            body(json!({ "active": true, "exp": 10, "email": "u@c-s.fr" })),
            ISSUER,
            "email",
            10,
        )
        .unwrap_err();
        assert!(matches!(err, AuthenticationError::Expired));
    }

    #[test]
    fn active_token_without_identity_claim_is_rejected() {
        let err = check_introspection(body(json!({ "active": true, "sub": "x" })), ISSUER, "email", 0)
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingClaim(_)));
    }
}
