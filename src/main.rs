//! Application entrypoint and state wiring.

mod claims;
mod config;
mod crypto;
mod error;
mod model;
mod policy;
mod routes;
mod storage;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use claims::ClaimEngine;
use config::Config;
use model::Ledger;
use tracing_subscriber::EnvFilter;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
    pub engine: Arc<ClaimEngine>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::new())),
            engine: Arc::new(ClaimEngine::new(config)),
        }
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/policies", post(routes::issue_policy))
        .route("/policies/:recipient", get(routes::list_policies))
        .route("/claims", post(routes::submit_claim))
        .route("/events", get(routes::events))
        .route("/chain", get(routes::chain))
        .route("/validate", get(routes::validate_chain))
        .route("/reset", post(routes::reset))
        .route("/export", get(routes::export))
        .route("/import", post(routes::import))
        .route("/health", get(routes::health))
        .route("/version", get(routes::version))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 0) config
    let config = Config::from_env().context("load configuration")?;

    // 1) logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("build log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // 2) shared state, starting from genesis
    let state = AppState::new(&config);
    tracing::info!(
        pool = %config.pool_account,
        min_premium = config.min_premium,
        multiplier = config.coverage_multiplier,
        "ledger initialised with genesis block"
    );

    // 3) serve
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, "running");
    axum::serve(listener, app(state))
        .await
        .context("http server")?;
    Ok(())
}
