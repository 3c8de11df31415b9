// =============================================================================
// Event log vocabulary & decision rationale
// =============================================================================
//
// Every component writes through one append-only sink. Tags and actions are
// closed sets; anything new must be added here, never as a free-form string.
// `decision_id` groups all events of one cycle for one symbol into a single
// causal trace, ending (when a trade happens) at the trade row's rationale
// blob.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::types::Regime;

/// Event category. One event may carry several tags (e.g. RISK + EXIT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tag {
    Cycle,
    Data,
    Features,
    Signal,
    Sentiment,
    Proposal,
    Consultant,
    Validation,
    Trade,
    Exit,
    Risk,
    Reflection,
    Qa,
    Error,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cycle => "CYCLE",
            Self::Data => "DATA",
            Self::Features => "FEATURES",
            Self::Signal => "SIGNAL",
            Self::Sentiment => "SENTIMENT",
            Self::Proposal => "PROPOSAL",
            Self::Consultant => "CONSULTANT",
            Self::Validation => "VALIDATION",
            Self::Trade => "TRADE",
            Self::Exit => "EXIT",
            Self::Risk => "RISK",
            Self::Reflection => "REFLECTION",
            Self::Qa => "QA",
            Self::Error => "ERROR",
        }
    }
}

/// Closed action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    RegimeTrend,
    RegimeChop,
    SkipNoSignal,
    AdvisorFail,
    ConsultantApprove,
    ConsultantReject,
    ConsultantModify,
    ConsultantAutoApprove,
    ValidationReject,
    OpenLong,
    OpenShort,
    ExitStop,
    ExitTime,
    ExitKill,
    StaleData,
    KillSwitch,
    Timeout,
    Invariant,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegimeTrend => "REGIME_TREND",
            Self::RegimeChop => "REGIME_CHOP",
            Self::SkipNoSignal => "SKIP_NO_SIGNAL",
            Self::AdvisorFail => "ADVISOR_FAIL",
            Self::ConsultantApprove => "CONSULTANT_APPROVE",
            Self::ConsultantReject => "CONSULTANT_REJECT",
            Self::ConsultantModify => "CONSULTANT_MODIFY",
            Self::ConsultantAutoApprove => "CONSULTANT_AUTO_APPROVE",
            Self::ValidationReject => "VALIDATION_REJECT",
            Self::OpenLong => "OPEN_LONG",
            Self::OpenShort => "OPEN_SHORT",
            Self::ExitStop => "EXIT_STOP",
            Self::ExitTime => "EXIT_TIME",
            Self::ExitKill => "EXIT_KILL",
            Self::StaleData => "STALE_DATA",
            Self::KillSwitch => "KILL_SWITCH",
            Self::Timeout => "TIMEOUT",
            Self::Invariant => "INVARIANT",
        }
    }
}

/// Severity of an event-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One append-only event-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// UTC milliseconds at emission.
    pub ts: i64,
    pub level: Level,
    pub tags: Vec<Tag>,
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub action: Option<Action>,
    pub decision_id: Option<String>,
    pub trade_id: Option<String>,
    pub payload: serde_json::Value,
}

impl EventRecord {
    pub fn new(ts: i64, level: Level, tags: Vec<Tag>) -> Self {
        Self {
            ts,
            level,
            tags,
            symbol: None,
            timeframe: None,
            action: None,
            decision_id: None,
            trade_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn timeframe(mut self, tf: impl Into<String>) -> Self {
        self.timeframe = Some(tf.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn decision(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }

    pub fn trade(mut self, trade_id: impl Into<String>) -> Self {
        self.trade_id = Some(trade_id.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// Decision rationale
// ---------------------------------------------------------------------------

/// Terminal verdict recorded on the rationale blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalDecision {
    Executed,
    ExecutedModified {
        stop: Option<f64>,
        qty: Option<f64>,
    },
    Rejected {
        reason: String,
    },
}

/// Structured audit blob attached to each trade at creation time. Typed
/// internally, serialised to JSON at the storage boundary, never read back
/// for control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRationale {
    pub decision_id: String,
    pub indicators: FeatureRow,
    pub regime: Regime,
    pub sentiment: serde_json::Value,
    pub advisor_proposal: serde_json::Value,
    pub consultant_review: serde_json::Value,
    pub decision: FinalDecision,
}
