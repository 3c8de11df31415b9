// =============================================================================
// Risk validator — last deterministic gate before the paper broker
// =============================================================================
//
// Runs after the consultant and re-checks everything that matters on the
// final (possibly modified) numbers. A rejection is expected control flow:
// it is logged with a machine-readable reason code and never raises.
// =============================================================================

use crate::types::Side;

/// Why a proposal was refused. `code()` is the stable machine-readable
/// identifier written to the event log.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    SchemaInvalid(String),
    RegimeMismatch,
    PositionExists,
    ExposureCap,
    RiskCap,
    KillSwitchActive,
    CooldownActive,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaInvalid(_) => "schema_invalid",
            Self::RegimeMismatch => "regime_mismatch",
            Self::PositionExists => "position_exists",
            Self::ExposureCap => "exposure_cap",
            Self::RiskCap => "risk_cap",
            Self::KillSwitchActive => "kill_switch_active",
            Self::CooldownActive => "cooldown_active",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaInvalid(detail) => write!(f, "schema_invalid: {detail}"),
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Everything the validator needs, already resolved to plain numbers.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub side: Side,
    pub qty: f64,
    pub entry: f64,
    pub stop: f64,
    pub nav: f64,
    /// Directional trend from the regime check, if any.
    pub trend_direction: Option<Side>,
    pub has_open_position: bool,
    pub kill_switch_active: bool,
    pub cooldown_active: bool,
    pub risk_budget: f64,
    pub max_exposure: f64,
    /// Schema validation outcome carried in from the agents.
    pub schema_error: Option<String>,
}

/// Tolerance for float cap comparisons so a qty sized exactly at the cap is
/// not rejected by rounding noise.
const CAP_EPSILON: f64 = 1e-9;

/// Apply every rejection rule in order; first failure wins.
pub fn validate(req: &ValidationRequest) -> Result<(), RejectReason> {
    if let Some(detail) = &req.schema_error {
        return Err(RejectReason::SchemaInvalid(detail.clone()));
    }
    if req.trend_direction != Some(req.side) {
        return Err(RejectReason::RegimeMismatch);
    }
    if req.has_open_position {
        return Err(RejectReason::PositionExists);
    }
    if req.qty * req.entry > req.max_exposure * req.nav * (1.0 + CAP_EPSILON) {
        return Err(RejectReason::ExposureCap);
    }
    if req.qty * (req.entry - req.stop).abs() > req.risk_budget * req.nav * (1.0 + CAP_EPSILON) {
        return Err(RejectReason::RiskCap);
    }
    if req.kill_switch_active {
        return Err(RejectReason::KillSwitchActive);
    }
    if req.cooldown_active {
        return Err(RejectReason::CooldownActive);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ValidationRequest {
        ValidationRequest {
            side: Side::Long,
            qty: 1.9,
            entry: 100.0,
            stop: 98.0,
            nav: 10_000.0,
            trend_direction: Some(Side::Long),
            has_open_position: false,
            kill_switch_active: false,
            cooldown_active: false,
            risk_budget: 0.005,
            max_exposure: 0.02,
            schema_error: None,
        }
    }

    #[test]
    fn clean_request_passes() {
        assert!(validate(&request()).is_ok());
    }

    #[test]
    fn schema_error_rejected_first() {
        let mut req = request();
        req.schema_error = Some("missing stop".to_string());
        req.has_open_position = true;
        match validate(&req).unwrap_err() {
            RejectReason::SchemaInvalid(detail) => assert_eq!(detail, "missing stop"),
            other => panic!("expected schema reject, got {other:?}"),
        }
    }

    #[test]
    fn regime_mismatch_rejected() {
        let mut req = request();
        req.trend_direction = None;
        assert_eq!(validate(&req).unwrap_err(), RejectReason::RegimeMismatch);

        let mut req = request();
        req.trend_direction = Some(Side::Short);
        assert_eq!(validate(&req).unwrap_err(), RejectReason::RegimeMismatch);
    }

    #[test]
    fn existing_position_rejected() {
        let mut req = request();
        req.has_open_position = true;
        assert_eq!(validate(&req).unwrap_err(), RejectReason::PositionExists);
    }

    #[test]
    fn exposure_cap_enforced() {
        let mut req = request();
        req.qty = 2.5; // 250 notional > 200 cap
        assert_eq!(validate(&req).unwrap_err(), RejectReason::ExposureCap);
    }

    #[test]
    fn exposure_cap_boundary_accepted() {
        let mut req = request();
        req.qty = 2.0; // exactly 0.02 * NAV notional
        req.stop = 99.0; // keep risk within budget too
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn risk_cap_enforced() {
        let mut req = request();
        req.qty = 1.9;
        req.stop = 70.0; // 1.9 * 30 = 57 risk > 50 budget
        assert_eq!(validate(&req).unwrap_err(), RejectReason::RiskCap);
    }

    #[test]
    fn kill_switch_rejects() {
        let mut req = request();
        req.kill_switch_active = true;
        assert_eq!(validate(&req).unwrap_err(), RejectReason::KillSwitchActive);
    }

    #[test]
    fn cooldown_rejects() {
        let mut req = request();
        req.cooldown_active = true;
        assert_eq!(validate(&req).unwrap_err(), RejectReason::CooldownActive);
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(RejectReason::RegimeMismatch.code(), "regime_mismatch");
        assert_eq!(
            RejectReason::SchemaInvalid("x".into()).code(),
            "schema_invalid"
        );
        assert_eq!(RejectReason::CooldownActive.code(), "cooldown_active");
    }
}
