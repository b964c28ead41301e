pub mod bearer;
pub mod cached;
pub mod factory;
pub mod introspection;
pub mod oidc;
pub mod verifier;

pub use bearer::extract_bearer_token;
pub use cached::CachingVerifier;
pub use factory::build_token_verifier;
pub use oidc::{OidcConfig, OidcVerifier};
pub use verifier::{AuthenticationError, TokenVerifier, VerifiedIdentity};
