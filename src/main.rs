// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "dev")]
use school_auth::auth::InsecureJwtVerifier;
use school_auth::{
    api::router,
    auth::{AuthGate, JwksManager, JwtVerifier, TokenVerifier},
    config::{ServerConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    state::AppState,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        tracing::error!(error = %e, "School auth server failed");
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let (json_layer, pretty_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        (Some(layer), None)
    } else {
        (None, Some(fmt::layer().pretty()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;
    Ok(())
}

async fn run() -> Result<(), BoxError> {
    let config = ServerConfig::from_env()?;
    let state = build_state(&config)?;
    let app = router(state);

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    match &config.tls {
        Some(paths) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| "rustls crypto provider already installed")?;

            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;
            log_listening("https", config.bind_addr);
            axum_server::bind_rustls(config.bind_addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            log_listening("http", config.bind_addr);
            axum_server::bind(config.bind_addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    tracing::info!("School auth server stopped");
    Ok(())
}

fn build_state(config: &ServerConfig) -> Result<AppState, BoxError> {
    let Some(issuer) = &config.issuer else {
        return insecure_state(config);
    };

    // A cold-cache fetch runs inside token verification, so it has to give
    // up well before the verification timeout does.
    let fetch_timeout = config.verify_timeout / 2;
    let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
    let jwks = Arc::new(
        JwksManager::new(config.jwks_url.as_str(), client)
            .with_cache_ttl(config.jwks_cache_ttl)
            .with_fetch_timeout(fetch_timeout),
    );

    let mut verifier = JwtVerifier::new(jwks.clone(), issuer.as_str());
    if let Some(audience) = &config.audience {
        verifier = verifier.with_audience(audience.as_str());
    }
    tracing::info!(
        issuer = %issuer,
        audience = config.audience.as_deref().unwrap_or("-"),
        jwks_url = %config.jwks_url,
        "Verifying bearer tokens against JWKS"
    );

    let verifier: Arc<dyn TokenVerifier> = Arc::new(verifier);
    let gate = AuthGate::new(verifier).with_timeout(config.verify_timeout);
    Ok(AppState::new(gate).with_jwks(jwks))
}

#[cfg(feature = "dev")]
fn insecure_state(config: &ServerConfig) -> Result<AppState, BoxError> {
    tracing::warn!("No token issuer configured, signatures will NOT be verified (dev build)");
    let gate = AuthGate::new(Arc::new(InsecureJwtVerifier)).with_timeout(config.verify_timeout);
    Ok(AppState::new(gate))
}

#[cfg(not(feature = "dev"))]
fn insecure_state(_config: &ServerConfig) -> Result<AppState, BoxError> {
    Err(school_auth::config::ConfigError::MissingIssuer.into())
}

fn log_listening(scheme: &str, addr: SocketAddr) {
    tracing::info!(%addr, "School auth server listening on {scheme}://{addr}");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, draining connections"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
