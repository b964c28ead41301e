/*
 * Responsibility
 * - Config 読み込み → 依存生成 (policy store / verifier / forwarder) → Router 組み立て
 * - Middleware の適用 (request id / trace / load shed / timeout / body limit)
 * - TLS listener で起動し、シグナルで graceful shutdown
 */
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};

use anyhow::Context;
use axum::Router;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, PolicySource};
use crate::middleware::{self, HttpLimits};
use crate::repos::seed::PolicySeed;
use crate::repos::{MemoryPolicyStore, PgPolicyStore, PolicyStore};
use crate::services::auth::build_token_verifier;
use crate::services::policy::PolicyEngine;
use crate::services::proxy::{Forwarder, ForwarderConfig};
use crate::state::AppState;
use crate::{api, server};

/// Upper bound on draining in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,rbac_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash the whole process so the panic is noticed.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());
    server::install_crypto_provider();

    info!(
        "starting gateway in {:?} mode on {}",
        config.app_env, config.addr
    );

    let tls = server::load_tls(&config.tls_cert_path, &config.tls_key_path).await?;
    let state = build_state(&config).await?;
    let app = build_router(state, HttpLimits::from_config(&config));

    let handle = axum_server::Handle::new();
    tokio::spawn(server::shutdown_on_signal(handle.clone(), SHUTDOWN_GRACE));

    server::serve(app, config.addr, tls, handle).await?;
    info!("gateway stopped");
    Ok(())
}

pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store = build_policy_store(config).await?;
    info!(backend = store.backend_name(), "policy store ready");
    let policy = Arc::new(PolicyEngine::new(store, config.store_timeout));

    let verifier = build_token_verifier(config).await?;

    let forwarder = Forwarder::new(ForwarderConfig {
        backend_timeout: config.backend_timeout,
        forward_authorization: config.forward_authorization,
        identity_header: config.identity_header.clone(),
        ..ForwarderConfig::default()
    })
    .context("failed to build backend HTTP client")?;

    Ok(AppState::new(policy, verifier, Arc::new(forwarder)))
}

async fn build_policy_store(config: &Config) -> anyhow::Result<Arc<dyn PolicyStore>> {
    match &config.policy_source {
        PolicySource::Postgres {
            database_url,
            max_connections,
            run_migrations,
        } => {
            let store = PgPolicyStore::connect(database_url, *max_connections, config.store_timeout)
                .await
                .context("failed to connect to policy database")?;
            if *run_migrations {
                store.migrate().await.context("policy migrations failed")?;
            }
            Ok(Arc::new(store))
        }
        PolicySource::SeedFile(path) => {
            let seed = PolicySeed::from_file(path)
                .await
                .with_context(|| format!("failed to load policy seed {}", path.display()))?;
            Ok(Arc::new(MemoryPolicyStore::from_seed(&seed)?))
        }
    }
}

pub fn build_router(state: AppState, limits: HttpLimits) -> Router {
    middleware::http::apply(api::routes(state), limits)
}
