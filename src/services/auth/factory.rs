/// Factory: build the bearer-token verifier from application `Config`.
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::services::auth::{CachingVerifier, OidcConfig, OidcVerifier, TokenVerifier};
use crate::services::cache::{MemoryCache, ValkeyClient};

/// Entry bound for the in-process verification cache.
const MEMORY_CACHE_ENTRIES: u64 = 10_000;

pub fn oidc_config(config: &Config) -> OidcConfig {
    OidcConfig {
        issuer_url: config.oidc_issuer_url.clone(),
        client_id: config.oidc_client_id.clone(),
        client_secret: config.oidc_client_secret.clone(),
        identity_claim: config.oidc_identity_claim.clone(),
        verify_audience: !config.oidc_skip_audience_check,
        leeway_seconds: config.oidc_leeway_seconds,
        http_timeout: config.oidc_timeout,
        ..OidcConfig::default()
    }
}

/// Discover the issuer and wrap the verifier in the verification cache.
pub async fn build_token_verifier(config: &Config) -> anyhow::Result<Arc<dyn TokenVerifier>> {
    let oidc = OidcVerifier::discover(oidc_config(config))
        .await
        .context("OIDC issuer discovery failed")?;
    let verifier: Arc<dyn TokenVerifier> = Arc::new(oidc);

    let ttl = config.token_cache_ttl;
    if ttl.is_zero() {
        info!("token verification cache disabled");
        return Ok(verifier);
    }

    match &config.cache_url {
        Some(url) => {
            let cache = ValkeyClient::new(url)
                .await
                .context("verification cache connection failed")?;
            info!(backend = "valkey", ttl_secs = ttl.as_secs(), "token verification cache enabled");
            Ok(Arc::new(CachingVerifier::new(verifier, cache, ttl)))
        }
        None => {
            info!(backend = "memory", ttl_secs = ttl.as_secs(), "token verification cache enabled");
            let cache = MemoryCache::new(MEMORY_CACHE_ENTRIES);
            Ok(Arc::new(CachingVerifier::new(verifier, cache, ttl)))
        }
    }
}
