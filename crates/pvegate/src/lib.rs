pub mod app_state;
pub mod audit;
pub mod auth;
pub mod canonical;
pub mod config;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod policy;
pub mod runner;
pub mod validation;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

use std::{future::Future, path::Path, sync::Arc};

use common::api::EnvironmentSummary;
use pve_api::PveClient;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app_state::{AppState, IdempotencyTtls};
use crate::auth::OperatorAuth;
use crate::config::AppConfig;
use crate::idempotency::IdempotencyStore;
use crate::policy::Engine;
use crate::runner::Runner;
use crate::validation::RequestValidator;

/// Boot the gateway: load config, build state, and serve until shutdown.
pub async fn run() -> Result<()> {
    let config_path = std::env::var(config::ENV_CONFIG_PATH)
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::load(Path::new(&config_path))?;
    let state = build_state(&cfg)?;
    serve(&cfg.listen_addr, state, shutdown_signal()).await
}

/// Builds the shared application state from configuration. Token secrets are
/// resolved here, once, inside the adapter constructor.
pub fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let client = PveClient::new(&cfg.environments)?;
    let audit_sink = audit::sink_for_path(&cfg.audit_log_path);
    let runner = Runner::new(Engine::new(), Arc::new(client), audit_sink);

    let environments: Vec<EnvironmentSummary> = cfg
        .environments
        .iter()
        .map(|env| EnvironmentSummary {
            name: env.name.clone(),
            base_url: env.base_url.clone(),
            token_id: env.token_id.clone(),
        })
        .collect();

    Ok(AppState {
        runner: Arc::new(runner),
        validator: Arc::new(RequestValidator::new(
            cfg.environments.iter().map(|env| env.name.clone()),
        )),
        idempotency: Arc::new(IdempotencyStore::new()),
        ttls: IdempotencyTtls::from(&cfg.idempotency),
        auth: OperatorAuth::from_env(),
        environments: Arc::new(environments),
    })
}

/// Binds the listener and serves the router with graceful shutdown.
pub async fn serve<S>(listen_addr: &str, state: AppState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = http::build_router(state.clone()).with_state(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, "pvegate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }
}
