//! TLS listener.
//!
//! Serves the gateway router over HTTPS with the aws-lc-rs rustls provider.
//! Certificate load and bind failures are fatal; Ctrl-C / SIGTERM start a
//! graceful shutdown that lets in-flight requests drain.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to load TLS material from {cert} / {key}: {source}")]
    Tls {
        cert: PathBuf,
        key: PathBuf,
        source: std::io::Error,
    },
    #[error("listener failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Install aws-lc-rs as the process-wide rustls provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

pub async fn load_tls(cert: &Path, key: &Path) -> Result<RustlsConfig, ServerError> {
    RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|source| ServerError::Tls {
            cert: cert.to_path_buf(),
            key: key.to_path_buf(),
            source,
        })
}

/// Serve until `handle` is shut down. Peer addresses are exposed as `ConnectInfo`.
pub async fn serve(
    app: Router,
    addr: SocketAddr,
    tls: RustlsConfig,
    handle: Handle,
) -> Result<(), ServerError> {
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then ask `handle` to drain for up to `grace`.
pub async fn shutdown_on_signal(handle: Handle, grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(grace_secs = grace.as_secs(), "shutdown signal received; draining");
    handle.graceful_shutdown(Some(grace));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_reported_with_paths() {
        install_crypto_provider();
        let err = load_tls(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }

    #[tokio::test]
    async fn fixture_certificate_loads() {
        install_crypto_provider();
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        load_tls(&dir.join("tls_cert.pem"), &dir.join("tls_key.pem"))
            .await
            .unwrap();
    }
}
