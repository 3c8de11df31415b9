// =============================================================================
// Meridian — intraday crypto paper-trading daemon
// =============================================================================
//
// Boot order: environment -> tracing -> config -> store (+migrations) ->
// adapters -> cycle loop. Exit codes: 0 clean shutdown, 1 startup error,
// 2 configuration error, 3 cancelled mid-shutdown. Recoverable mid-run
// errors never terminate the process; the event log carries them.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod agents;
mod broker;
mod config;
mod events;
mod exchange;
mod features;
mod indicators;
mod killswitch;
mod market_data;
mod nav;
mod orchestrator;
mod sentiment;
mod signals;
mod store;
mod types;
mod validator;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::agents::advisor::Advisor;
use crate::agents::consultant::Consultant;
use crate::agents::{HttpLlmTransport, LlmTransport};
use crate::config::Config;
use crate::exchange::BinanceAdapter;
use crate::orchestrator::Orchestrator;
use crate::sentiment::SentimentProvider;
use crate::store::Store;

const EXIT_STARTUP: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_CANCELLED: i32 = 3;

#[tokio::main]
async fn main() {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Meridian paper-trading daemon starting up");

    // ── 2. Configuration ─────────────────────────────────────────────────
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration error");
            std::process::exit(EXIT_CONFIG);
        }
    };

    // ── 3. Store & migrations ────────────────────────────────────────────
    let store = match Store::open(&config.db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, db_path = %config.db_path, "startup error: store unavailable");
            std::process::exit(EXIT_STARTUP);
        }
    };

    // ── 4. External adapters ─────────────────────────────────────────────
    let exchange = Arc::new(BinanceAdapter::new());

    let llm: Option<Arc<dyn LlmTransport>> = config.llm_api_key.as_ref().map(|key| {
        Arc::new(HttpLlmTransport::new(&config.llm_api_url, key)) as Arc<dyn LlmTransport>
    });
    if llm.is_none() {
        warn!("no LLM key configured: advisor runs deterministically, consultant auto-approves");
    }

    let advisor = Advisor::new(llm.clone(), &config.primary_model, &config.fallback_model);
    let consultant = Consultant::new(llm, &config.primary_model);
    let sentiment = Arc::new(SentimentProvider::from_key(
        config.sentiment_api_key.as_deref(),
    ));

    // ── 5. Cycle loop with graceful shutdown ─────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        store,
        exchange,
        sentiment,
        advisor,
        consultant,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let loop_handle = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_forever(shutdown_rx).await })
    };

    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to listen for shutdown signal");
        std::process::exit(EXIT_STARTUP);
    }
    warn!("shutdown signal received, finishing current cycle");
    let _ = shutdown_tx.send(true);

    // A second signal cancels instead of waiting for the cycle to drain.
    tokio::select! {
        _ = loop_handle => {
            let status = orchestrator.status();
            info!(
                error_count = status.error_count,
                open_positions = status.open_position_symbols.len(),
                "Meridian shut down cleanly"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("second shutdown signal, cancelling");
            std::process::exit(EXIT_CANCELLED);
        }
    }
}
