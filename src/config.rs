/*
 * Responsibility
 * - 環境変数の読み込み (listener / TLS / OIDC / policy store / cache / proxy)
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Where role/permission/service relations come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Postgres {
        database_url: String,
        max_connections: u32,
        run_migrations: bool,
    },
    SeedFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,
    pub addr: SocketAddr,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,

    pub oidc_issuer_url: String,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret: Option<String>,
    pub oidc_identity_claim: String,
    pub oidc_skip_audience_check: bool,
    pub oidc_leeway_seconds: u64,
    pub oidc_timeout: Duration,

    pub policy_source: PolicySource,
    pub store_timeout: Duration,

    pub cache_url: Option<String>,
    /// Upper bound for cached verifications. Zero disables the cache.
    pub token_cache_ttl: Duration,

    pub backend_timeout: Duration,
    pub request_timeout: Duration,
    pub max_in_flight_requests: usize,
    pub max_request_body_bytes: usize,
    pub forward_authorization: bool,
    pub identity_header: Option<HeaderName>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let app_env = AppEnv::parse(var("APP_ENV"));

        let addr = match var("GATEWAY_LISTEN_ADDR") {
            Some(raw) => SocketAddr::from_str(&raw)
                .map_err(|_| ConfigError::Invalid("GATEWAY_LISTEN_ADDR"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 4443)),
        };

        let tls_cert_path = PathBuf::from(required("TLS_CERT_PATH")?);
        let tls_key_path = PathBuf::from(required("TLS_KEY_PATH")?);

        let oidc_issuer_url = required("OIDC_ISSUER_URL")?;
        url::Url::parse(&oidc_issuer_url).map_err(|_| ConfigError::Invalid("OIDC_ISSUER_URL"))?;

        let policy_source = match (var("DATABASE_URL"), var("POLICY_SEED_FILE")) {
            (Some(database_url), _) => PolicySource::Postgres {
                database_url,
                max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
                run_migrations: parse_bool(&var, "DATABASE_RUN_MIGRATIONS", false)?,
            },
            (None, Some(path)) => PolicySource::SeedFile(PathBuf::from(path)),
            (None, None) => return Err(ConfigError::Missing("DATABASE_URL")),
        };

        let identity_header = match var("GATEWAY_IDENTITY_HEADER") {
            Some(raw) => Some(
                HeaderName::from_str(&raw.to_ascii_lowercase())
                    .map_err(|_| ConfigError::Invalid("GATEWAY_IDENTITY_HEADER"))?,
            ),
            None => None,
        };

        let max_in_flight_requests: usize = parse_or(&var, "MAX_IN_FLIGHT_REQUESTS", 1024)?;
        if max_in_flight_requests == 0 {
            return Err(ConfigError::Invalid("MAX_IN_FLIGHT_REQUESTS"));
        }

        Ok(Self {
            app_env,
            addr,
            tls_cert_path,
            tls_key_path,
            oidc_issuer_url,
            oidc_client_id: var("OIDC_CLIENT_ID"),
            oidc_client_secret: var("OIDC_CLIENT_SECRET"),
            oidc_identity_claim: var("OIDC_IDENTITY_CLAIM").unwrap_or_else(|| "email".to_string()),
            oidc_skip_audience_check: parse_bool(&var, "OIDC_SKIP_AUDIENCE_CHECK", false)?,
            oidc_leeway_seconds: parse_or(&var, "OIDC_LEEWAY_SECONDS", 60)?,
            oidc_timeout: millis(&var, "OIDC_TIMEOUT_MS", 5_000)?,
            policy_source,
            store_timeout: millis(&var, "STORE_TIMEOUT_MS", 2_000)?,
            cache_url: var("CACHE_URL"),
            token_cache_ttl: Duration::from_secs(parse_or(&var, "TOKEN_CACHE_TTL_SECONDS", 60)?),
            backend_timeout: millis(&var, "BACKEND_TIMEOUT_MS", 30_000)?,
            request_timeout: millis(&var, "REQUEST_TIMEOUT_MS", 60_000)?,
            max_in_flight_requests,
            max_request_body_bytes: parse_or(&var, "MAX_REQUEST_BODY_BYTES", 10 * 1024 * 1024)?,
            forward_authorization: parse_bool(&var, "GATEWAY_FORWARD_AUTHORIZATION", false)?,
            identity_header,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_bool<F>(var: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(key)),
    }
}

fn millis<F>(var: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse_or(var, key, default)?;
    if ms == 0 {
        return Err(ConfigError::Invalid(key));
    }
    Ok(Duration::from_millis(ms))
}
