use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use innkeep::clock::{Clock, SystemClock};
use innkeep::config::{AdminBootstrap, Config};
use innkeep::engine::{Engine, EngineError, NewAccount};
use innkeep::http::{self, AppState};
use innkeep::session::{TokenIssuer, hash_password};
use innkeep::sso::{
    HttpKeySetSource, HttpSsoClient, IdentityReconciler, KeySetCache, RetryPolicy, SsoLogin,
    SsoTokenValidator, TokenCipher,
};
use innkeep::{compactor, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing();

    let config = Config::from_env()?;
    observability::init_metrics(config.metrics_port)?;
    http::error::expose_internal_errors(config.debug);

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "creating data directory {} (check that it is writable by the service user)",
            config.data_dir.display()
        )
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(
        Engine::new(config.wal_path(), clock.clone())
            .with_context(|| format!("opening WAL at {}", config.wal_path().display()))?,
    );

    if let Some(admin) = &config.admin_bootstrap {
        bootstrap_admin(&engine, admin).await?;
    }

    tokio::spawn(compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    let sso = &config.sso;
    let http_client = reqwest::Client::builder()
        .timeout(sso.timeout)
        .build()
        .context("building SSO HTTP client")?;
    let keys = Arc::new(KeySetCache::new(
        Arc::new(HttpKeySetSource::new(http_client.clone(), sso.jwks_url.clone())),
        sso.jwks_ttl,
        clock.clone(),
    ));
    let login = SsoLogin::new(
        Arc::new(HttpSsoClient::new(http_client, sso)),
        SsoTokenValidator::new(
            keys,
            sso.algorithm,
            sso.audience.clone(),
            sso.backend_url.clone(),
            clock.clone(),
        ),
        IdentityReconciler::new(engine.clone(), Arc::new(TokenCipher::from_config(sso.token_key))),
        RetryPolicy {
            attempts: sso.profile_attempts,
            delay: sso.profile_retry_delay,
        },
        clock.clone(),
    );

    let state = AppState {
        engine: engine.clone(),
        tokens: Arc::new(TokenIssuer::new(config.session.clone(), clock)),
        sso: Arc::new(login),
    };

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("innkeep listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  sso backend: {}", sso.backend_url);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("innkeep stopped");
    Ok(())
}

/// Create the configured staff account if it does not exist yet.
async fn bootstrap_admin(engine: &Engine, admin: &AdminBootstrap) -> anyhow::Result<()> {
    if engine.username_taken(&admin.username) {
        return Ok(());
    }
    let password = admin.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    match engine
        .create_account(
            NewAccount {
                username: admin.username.clone(),
                is_staff: true,
                password_hash: Some(password_hash),
                ..NewAccount::default()
            },
            None,
        )
        .await
    {
        Ok(user) => {
            info!(user = %user.id, username = %user.username, "bootstrapped staff account");
            Ok(())
        }
        Err(EngineError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
        }
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for ctrl-c");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
    info!("shutdown signal received, draining requests");
}
