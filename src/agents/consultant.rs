// =============================================================================
// Consultant agent — independent second opinion with auto-approve fallback
// =============================================================================
//
// The consultant reviews an advisor proposal against a market-context
// summary and answers approve / reject / modify. The reconciliation of that
// answer into an executable decision is deterministic and happens here, not
// in the model:
//
//   approve => execute unchanged
//   reject  => do not execute
//   modify  => stop clamped to [entry - 3*ATR, entry - 0.5*ATR] (mirrored
//              for shorts); size may only reduce
//
// The consultant must never block trading: a deadline or transport error
// auto-approves (logged as CONSULTANT_AUTO_APPROVE).
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::sentiment::SentimentSnapshot;
use crate::types::{Regime, Side};

use super::advisor::Proposal;
use super::LlmTransport;

/// Review deadline; past it the proposal is auto-approved.
pub const CONSULTANT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stop clamp bounds in ATR multiples from entry.
const STOP_CLAMP_MIN_ATR: f64 = 0.5;
const STOP_CLAMP_MAX_ATR: f64 = 3.0;

// ---------------------------------------------------------------------------
// Review schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Reject,
    Modify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifications {
    #[serde(default)]
    pub stop: Option<f64>,
    #[serde(default)]
    pub size: Option<f64>,
}

/// Strictly-typed consultant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub recommendation: Recommendation,
    pub concerns: Vec<String>,
    pub modifications: Option<Modifications>,
    pub confidence: f64,
    pub reasoning: String,
}

impl Review {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        Ok(())
    }
}

/// Market summary handed to the consultant alongside the proposal.
#[derive(Debug, Clone, Serialize)]
pub struct MarketContext<'a> {
    pub regime: Regime,
    pub sentiment: &'a SentimentSnapshot,
    /// Volatility band label from ATR as a fraction of price.
    pub volatility_band: &'static str,
}

/// Classify ATR/price into the coarse volatility band the consultant sees.
pub fn volatility_band(atr: f64, price: f64) -> &'static str {
    if price <= 0.0 || !atr.is_finite() {
        return "unknown";
    }
    let pct = atr / price;
    if pct < 0.005 {
        "low"
    } else if pct < 0.02 {
        "normal"
    } else {
        "high"
    }
}

// ---------------------------------------------------------------------------
// Reconciled outcome
// ---------------------------------------------------------------------------

/// Deterministic reconciliation of the review — the only thing the
/// execution path consumes. Exhaustively matched downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Approve,
    /// Deadline or transport failure: trade proceeds, flagged in the log.
    AutoApprove,
    Reject(Vec<String>),
    Modify {
        stop: Option<f64>,
        qty: Option<f64>,
    },
}

/// Apply the reconciliation rules to a validated review.
///
/// * `entry` / `atr` / `side` — for the stop clamp.
/// * `proposed_qty` — size modifications may only reduce it.
pub fn reconcile(
    review: &Review,
    entry: f64,
    atr: f64,
    side: Side,
    proposed_qty: f64,
) -> ReviewOutcome {
    match review.recommendation {
        Recommendation::Approve => ReviewOutcome::Approve,
        Recommendation::Reject => ReviewOutcome::Reject(review.concerns.clone()),
        Recommendation::Modify => {
            let mods = review.modifications.clone().unwrap_or(Modifications {
                stop: None,
                size: None,
            });

            let stop = mods.stop.map(|s| clamp_stop(s, entry, atr, side));

            let qty = mods.size.and_then(|s| {
                if s > 0.0 && s < proposed_qty {
                    Some(s)
                } else {
                    // Size increases are ignored, not honoured.
                    None
                }
            });

            if stop.is_none() && qty.is_none() {
                // A modify with no effective change executes as proposed.
                ReviewOutcome::Approve
            } else {
                ReviewOutcome::Modify { stop, qty }
            }
        }
    }
}

/// Keep a modified stop inside [entry - 3*ATR, entry - 0.5*ATR], mirrored
/// for shorts.
fn clamp_stop(stop: f64, entry: f64, atr: f64, side: Side) -> f64 {
    match side {
        Side::Long => stop.clamp(entry - STOP_CLAMP_MAX_ATR * atr, entry - STOP_CLAMP_MIN_ATR * atr),
        Side::Short => stop.clamp(entry + STOP_CLAMP_MIN_ATR * atr, entry + STOP_CLAMP_MAX_ATR * atr),
    }
}

// ---------------------------------------------------------------------------
// Consultant
// ---------------------------------------------------------------------------

pub struct Consultant {
    transport: Option<Arc<dyn LlmTransport>>,
    model: String,
}

impl Consultant {
    pub fn new(transport: Option<Arc<dyn LlmTransport>>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    /// Review a proposal. Returns the reconciled outcome plus the raw review
    /// JSON for the rationale blob (Null when auto-approved).
    pub async fn review(
        &self,
        proposal: &Proposal,
        market: &MarketContext<'_>,
        entry: f64,
        atr: f64,
        side: Side,
        proposed_qty: f64,
    ) -> (ReviewOutcome, serde_json::Value) {
        let Some(transport) = &self.transport else {
            debug!(symbol = %proposal.symbol, "no LLM configured, auto-approving");
            return (ReviewOutcome::AutoApprove, serde_json::Value::Null);
        };

        let system = system_prompt();
        let user = serde_json::json!({
            "proposal": proposal,
            "market_context": market,
        })
        .to_string();

        match transport
            .complete(&self.model, &system, &user, CONSULTANT_TIMEOUT)
            .await
        {
            Ok(raw) => match serde_json::from_value::<Review>(raw.clone()) {
                Ok(review) if review.validate().is_ok() => {
                    let outcome = reconcile(&review, entry, atr, side, proposed_qty);
                    debug!(
                        symbol = %proposal.symbol,
                        recommendation = ?review.recommendation,
                        "consultant review reconciled"
                    );
                    (outcome, raw)
                }
                Ok(_) | Err(_) => {
                    warn!(symbol = %proposal.symbol, "schema-invalid review, auto-approving");
                    (ReviewOutcome::AutoApprove, raw)
                }
            },
            Err(e) => {
                warn!(symbol = %proposal.symbol, error = %e, "consultant unavailable, auto-approving");
                (ReviewOutcome::AutoApprove, serde_json::Value::Null)
            }
        }
    }
}

impl std::fmt::Debug for Consultant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consultant")
            .field("llm", &self.transport.is_some())
            .field("model", &self.model)
            .finish()
    }
}

fn system_prompt() -> String {
    "You are the risk consultant of a crypto paper-trading daemon, giving an \
     independent second opinion on a trade proposal. Respond with a single \
     JSON object: recommendation (approve|reject|modify), concerns (array of \
     strings), modifications ({stop?, size?} or null), confidence in [0,1], \
     reasoning (string). Size modifications may only reduce the position."
        .to_string()
}
