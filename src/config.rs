// =============================================================================
// Boot configuration — read from the environment once at startup
// =============================================================================
//
// Every knob has a default so a bare `meridian` invocation runs a demo
// paper-trader out of the box. Missing optional API keys degrade features
// (no LLM key => deterministic local advisor; no sentiment key => fallback
// provider) but never prevent startup. Malformed numeric values are a
// configuration error and abort with exit code 2.
// =============================================================================

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::timeframe_ms;

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

/// Immutable daemon configuration, fixed for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_path: String,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub cycle_secs: u64,
    pub starting_cash: f64,
    /// Per-trade risk fraction of NAV (0.005 = 0.5%).
    pub risk_budget: f64,
    /// Notional exposure cap as a fraction of NAV.
    pub max_exposure: f64,
    pub allow_shorts: bool,
    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub primary_model: String,
    pub fallback_model: String,
    pub sentiment_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "meridian.db".to_string(),
            symbols: default_symbols(),
            timeframe: "5m".to_string(),
            cycle_secs: 60,
            starting_cash: 10_000.0,
            risk_budget: 0.005,
            max_exposure: 0.02,
            allow_shorts: false,
            llm_api_key: None,
            llm_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            primary_model: "gpt-4o".to_string(),
            fallback_model: "gpt-4o-mini".to_string(),
            sentiment_api_key: None,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("MERIDIAN_DB_PATH") {
            cfg.db_path = v;
        }
        if let Ok(v) = std::env::var("MERIDIAN_SYMBOLS") {
            let syms: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !syms.is_empty() {
                cfg.symbols = syms;
            }
        }
        if let Ok(v) = std::env::var("MERIDIAN_TIMEFRAME") {
            cfg.timeframe = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("MERIDIAN_CYCLE_SECS") {
            cfg.cycle_secs = v
                .parse()
                .with_context(|| format!("invalid MERIDIAN_CYCLE_SECS: {v}"))?;
        }
        if let Ok(v) = std::env::var("MERIDIAN_STARTING_CASH") {
            cfg.starting_cash = v
                .parse()
                .with_context(|| format!("invalid MERIDIAN_STARTING_CASH: {v}"))?;
        }
        if let Ok(v) = std::env::var("MERIDIAN_RISK_BUDGET") {
            cfg.risk_budget = v
                .parse()
                .with_context(|| format!("invalid MERIDIAN_RISK_BUDGET: {v}"))?;
        }
        if let Ok(v) = std::env::var("MERIDIAN_MAX_EXPOSURE") {
            cfg.max_exposure = v
                .parse()
                .with_context(|| format!("invalid MERIDIAN_MAX_EXPOSURE: {v}"))?;
        }
        if let Ok(v) = std::env::var("MERIDIAN_ALLOW_SHORTS") {
            cfg.allow_shorts = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        cfg.llm_api_key = std::env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty());
        if let Ok(v) = std::env::var("LLM_API_URL") {
            cfg.llm_api_url = v;
        }
        if let Ok(v) = std::env::var("LLM_PRIMARY_MODEL") {
            cfg.primary_model = v;
        }
        if let Ok(v) = std::env::var("LLM_FALLBACK_MODEL") {
            cfg.fallback_model = v;
        }
        cfg.sentiment_api_key = std::env::var("SENTIMENT_API_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        cfg.validate()?;

        info!(
            symbols = ?cfg.symbols,
            timeframe = %cfg.timeframe,
            cycle_secs = cfg.cycle_secs,
            starting_cash = cfg.starting_cash,
            llm_enabled = cfg.llm_api_key.is_some(),
            sentiment_key = cfg.sentiment_api_key.is_some(),
            "configuration loaded"
        );

        Ok(cfg)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("symbol universe is empty");
        }
        if timeframe_ms(&self.timeframe).is_none() {
            bail!("unrecognised timeframe: {}", self.timeframe);
        }
        if self.cycle_secs == 0 {
            bail!("cycle interval must be positive");
        }
        if self.starting_cash <= 0.0 {
            bail!("starting cash must be positive");
        }
        if !(self.risk_budget > 0.0 && self.risk_budget < 1.0) {
            bail!("risk budget must be in (0, 1)");
        }
        if !(self.max_exposure > 0.0 && self.max_exposure <= 1.0) {
            bail!("max exposure must be in (0, 1]");
        }
        Ok(())
    }

    /// Timeframe duration in milliseconds. Valid by construction after
    /// `validate()`.
    pub fn tf_ms(&self) -> i64 {
        timeframe_ms(&self.timeframe).unwrap_or(300_000)
    }
}
