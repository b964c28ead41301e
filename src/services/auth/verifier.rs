/*
 * Responsibility
 * - Token Verifier の契約 (trait) と、検証結果・失敗の型
 * - 実装は oidc.rs (JWT + JWKS) / introspection.rs / cached.rs
 */
use async_trait::async_trait;
use thiserror::Error;

/// Identity established by a successfully verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    /// Token expiry (unix seconds), when the token carries one.
    pub expires_at: Option<u64>,
}

/// Every way bearer-token verification can fail. All of them mean 401.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("missing or malformed authorization header")]
    MissingToken,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token expired")]
    Expired,
    #[error("token issuer mismatch")]
    WrongIssuer,
    #[error("token audience mismatch")]
    WrongAudience,
    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("no verification key for kid {0:?}")]
    UnknownKey(Option<String>),
    #[error("token rejected: {0}")]
    Rejected(jsonwebtoken::errors::Error),
    #[error("missing required claim '{0}'")]
    MissingClaim(String),
    #[error("token is not active")]
    Inactive,
    #[error("identity provider unavailable: {0}")]
    IssuerUnavailable(String),
}

impl From<jsonwebtoken::errors::Error> for AuthenticationError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let mapped = match e.kind() {
            ErrorKind::ExpiredSignature => Some(Self::Expired),
            ErrorKind::InvalidIssuer => Some(Self::WrongIssuer),
            ErrorKind::InvalidAudience => Some(Self::WrongAudience),
            ErrorKind::MissingRequiredClaim(claim) => Some(Self::MissingClaim(claim.clone())),
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Some(Self::Malformed(e.to_string())),
            _ => None,
        };

        match mapped {
            Some(err) => err,
            None => Self::Rejected(e),
        }
    }
}

/// `verify(raw_token) -> identity`, all-or-nothing.
///
/// Implementations must not log or persist the raw token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, raw_token: &str) -> Result<VerifiedIdentity, AuthenticationError>;
}
