// =============================================================================
// Advisor agent — turns a deterministic signal into a typed proposal
// =============================================================================
//
// The advisor cannot invent prices, sizes, or P&L; those stay deterministic.
// It may refine confidence, rationale, stop multiplier, and hold horizon,
// all bounded by the schema below and re-checked by the validator.
//
// Model policy: primary model first; on HTTP error, deadline, or a
// schema-invalid reply, one retry with the fallback model. Both failing is
// an ADVISOR_FAIL for the symbol this cycle. With no transport configured
// the advisor degrades to a deterministic local proposal so the rest of the
// pipeline still runs.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::features::FeatureRow;
use crate::sentiment::SentimentSnapshot;
use crate::signals::STOP_ATR_MULT;
use crate::types::{Regime, Side};

use super::LlmTransport;

/// Default completion deadline for one advisor call.
const ADVISOR_TIMEOUT: Duration = Duration::from_secs(20);

/// Hold horizon the local fallback proposes (matches the time stop).
const DEFAULT_MAX_HOLD_BARS: u32 = 40;

// ---------------------------------------------------------------------------
// Proposal schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSide {
    Long,
    Short,
    Flat,
}

impl ProposalSide {
    pub fn as_side(self) -> Option<Side> {
        match self {
            Self::Long => Some(Side::Long),
            Self::Short => Some(Side::Short),
            Self::Flat => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntrySpec {
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StopSpec {
    Atr { multiplier: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitSpec {
    pub rr: f64,
}

/// Strictly-typed advisor output. Any missing or out-of-range field is a
/// schema violation and the proposal is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub symbol: String,
    pub side: ProposalSide,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub entry: EntrySpec,
    pub stop: StopSpec,
    pub take_profit: TakeProfitSpec,
    pub max_hold_bars: u32,
}

impl Proposal {
    /// Range checks beyond what serde enforces structurally.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        let StopSpec::Atr { multiplier } = self.stop;
        if !(multiplier > 0.0) {
            return Err(format!("stop multiplier {multiplier} must be positive"));
        }
        if !(self.take_profit.rr > 0.0) {
            return Err(format!("take-profit rr {} must be positive", self.take_profit.rr));
        }
        if self.max_hold_bars == 0 {
            return Err("max_hold_bars must be positive".to_string());
        }
        Ok(())
    }

    pub fn stop_multiplier(&self) -> f64 {
        let StopSpec::Atr { multiplier } = self.stop;
        multiplier
    }
}

// ---------------------------------------------------------------------------
// Advisor
// ---------------------------------------------------------------------------

/// Everything the advisor is allowed to see.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisorContext<'a> {
    pub symbol: &'a str,
    pub signal_side: Side,
    pub regime: Regime,
    pub features: &'a FeatureRow,
    pub position: Option<serde_json::Value>,
    pub sentiment: &'a SentimentSnapshot,
    pub risk_budget: f64,
    pub max_exposure: f64,
}

/// Why no proposal came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorFailure {
    pub detail: String,
}

pub struct Advisor {
    transport: Option<Arc<dyn LlmTransport>>,
    primary_model: String,
    fallback_model: String,
}

impl Advisor {
    pub fn new(
        transport: Option<Arc<dyn LlmTransport>>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
        }
    }

    /// Produce a proposal for the signalled entry, or a failure after the
    /// fallback model also came up empty.
    pub async fn propose(&self, ctx: &AdvisorContext<'_>) -> Result<Proposal, AdvisorFailure> {
        let Some(transport) = &self.transport else {
            debug!(symbol = ctx.symbol, "no LLM configured, using local proposal");
            return Ok(Self::local_proposal(ctx));
        };

        let system = system_prompt();
        let user = user_prompt(ctx);

        for model in [&self.primary_model, &self.fallback_model] {
            match transport
                .complete(model, &system, &user, ADVISOR_TIMEOUT)
                .await
            {
                Ok(raw) => match Self::parse_proposal(raw, ctx.symbol) {
                    Ok(p) => {
                        debug!(symbol = ctx.symbol, model, confidence = p.confidence, "proposal accepted");
                        return Ok(p);
                    }
                    Err(e) => {
                        warn!(symbol = ctx.symbol, model, error = %e, "schema-invalid proposal");
                    }
                },
                Err(e) => {
                    warn!(symbol = ctx.symbol, model, error = %e, "advisor completion failed");
                }
            }
        }

        Err(AdvisorFailure {
            detail: "primary and fallback models both failed".to_string(),
        })
    }

    fn parse_proposal(raw: serde_json::Value, symbol: &str) -> Result<Proposal, String> {
        let proposal: Proposal =
            serde_json::from_value(raw).map_err(|e| format!("schema: {e}"))?;
        proposal.validate()?;
        if proposal.symbol != symbol {
            return Err(format!(
                "proposal symbol {} does not match {}",
                proposal.symbol, symbol
            ));
        }
        Ok(proposal)
    }

    /// Deterministic proposal mirroring the signal rules, used when no LLM
    /// is configured.
    pub fn local_proposal(ctx: &AdvisorContext<'_>) -> Proposal {
        let side = match ctx.signal_side {
            Side::Long => ProposalSide::Long,
            Side::Short => ProposalSide::Short,
        };
        Proposal {
            symbol: ctx.symbol.to_string(),
            side,
            confidence: 0.5,
            reasons: vec![format!(
                "donchian breakout with cmf {:.3} and rvol {:.2} in {} regime",
                ctx.features.cmf20, ctx.features.rvol20, ctx.regime
            )],
            entry: EntrySpec::Market,
            stop: StopSpec::Atr {
                multiplier: STOP_ATR_MULT,
            },
            take_profit: TakeProfitSpec { rr: 2.0 },
            max_hold_bars: DEFAULT_MAX_HOLD_BARS,
        }
    }
}

impl std::fmt::Debug for Advisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advisor")
            .field("llm", &self.transport.is_some())
            .field("primary_model", &self.primary_model)
            .field("fallback_model", &self.fallback_model)
            .finish()
    }
}

fn system_prompt() -> String {
    "You are the trade advisor of a crypto paper-trading daemon. Respond with \
     a single JSON object matching the proposal schema: symbol, side \
     (long|short|flat), confidence in [0,1], reasons (array of strings), \
     entry {type:\"market\"}, stop {type:\"atr\", multiplier>0}, take_profit \
     {rr>0}, max_hold_bars (positive integer). Do not invent prices or sizes."
        .to_string()
}

fn user_prompt(ctx: &AdvisorContext<'_>) -> String {
    serde_json::to_string(ctx).unwrap_or_else(|_| "{}".to_string())
}
