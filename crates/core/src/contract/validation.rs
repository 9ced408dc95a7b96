//! # Validation Contracts
//!
//! Policy bundle, risk toggles, delivery target, and the ternary
//! validation result.

use super::artifacts::Artifact;
use super::envelope::{elements, require_fields, EnvelopePayload, FieldSpec, JsonKind};
use super::trends::parse_utc_instant;
use crate::error::{ContractError, ContractResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Built-in risk toggle keys
pub mod toggles {
    pub const REQUIRE_DISCLOSURE: &str = "require_disclosure";
    pub const MAX_NEGATIVE_SENTIMENT: &str = "max_negative_sentiment";
    pub const REQUIRE_WALLET_CALLOUT: &str = "require_wallet_callout";
}

/// Document references governing one validation. Locators are opaque and
/// resolved by external stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyBundle {
    #[serde(default)]
    pub brand_voice_ref: Option<String>,
    #[serde(default)]
    pub regulatory_refs: Vec<String>,
    #[serde(default)]
    pub platform_rules: Vec<String>,
}

/// Open set of risk knobs, keyed by name with any JSON value. Unknown
/// keys are ignored. A flag is on only when its value is `true`; a
/// threshold is read from a finite number, and anything else disables
/// its check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RiskToggles(BTreeMap<String, Value>);

impl RiskToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, key: impl Into<String>, on: bool) -> Self {
        self.0.insert(key.into(), Value::Bool(on));
        self
    }

    pub fn with_threshold(mut self, key: impl Into<String>, value: f64) -> Self {
        self.0.insert(key.into(), Value::from(value));
        self
    }

    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn threshold(&self, key: &str) -> Option<f64> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }
}

/// Where and when the artifact ships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeliveryTarget {
    pub geo: String,
    #[serde(default)]
    pub audience_segment: Option<String>,
    /// UTC instant ending in `Z`
    pub release_window: String,
}

impl DeliveryTarget {
    pub fn validate(&self) -> ContractResult<()> {
        if self.geo.trim().is_empty() {
            return Err(ContractError::invalid_request(
                "delivery_target.geo must be a non-empty string",
            ));
        }
        parse_utc_instant(&self.release_window)
            .map(|_| ())
            .map_err(|reason| ContractError::invalid_request(format!("delivery_target.release_window: {}", reason)))
    }
}

/// Validation request as sent by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationRequest {
    pub trace_id: String,
    pub planner_task_id: String,
    pub artifact: Artifact,
    #[serde(default)]
    pub policy_bundle: PolicyBundle,
    pub delivery_target: DeliveryTarget,
    #[serde(default)]
    pub risk_toggles: RiskToggles,
}

/// Finding severity. Ordered: `Blocking` dominates `Advisory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Advisory,
    Blocking,
}

/// One policy finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub detail: String,
}

impl Finding {
    pub fn blocking(rule: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Blocking,
            detail: detail.into(),
        }
    }

    pub fn advisory(rule: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Advisory,
            detail: detail.into(),
        }
    }
}

/// Ternary validation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationOutcome {
    Approved,
    NeedsReview,
    Rejected,
}

impl ValidationOutcome {
    /// Severity lattice: any blocking finding rejects, advisory-only
    /// findings need review, none approves.
    pub fn from_findings(findings: &[Finding]) -> Self {
        match findings.iter().map(|f| f.severity).max() {
            Some(Severity::Blocking) => ValidationOutcome::Rejected,
            Some(Severity::Advisory) => ValidationOutcome::NeedsReview,
            None => ValidationOutcome::Approved,
        }
    }
}

/// Validation response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    pub artifact_id: String,
    pub validation_result: ValidationOutcome,
    pub violations: Vec<Finding>,
    /// Present only for `NEEDS_REVIEW`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_hint: Option<String>,
}

impl ValidationResult {
    /// Outcome/violation invariants hold
    pub fn is_consistent(&self) -> bool {
        let blocking = self
            .violations
            .iter()
            .any(|f| f.severity == Severity::Blocking);
        match self.validation_result {
            ValidationOutcome::Approved => self.violations.is_empty() && self.reviewer_hint.is_none(),
            ValidationOutcome::NeedsReview => {
                !self.violations.is_empty() && !blocking && self.reviewer_hint.is_some()
            }
            ValidationOutcome::Rejected => blocking && self.reviewer_hint.is_none(),
        }
    }
}

const OUTCOME_NAMES: &[&str] = &["APPROVED", "NEEDS_REVIEW", "REJECTED"];

const FINDING_FIELDS: [FieldSpec; 3] = [
    ("rule", JsonKind::String),
    ("severity", JsonKind::OneOf(&["advisory", "blocking"])),
    ("detail", JsonKind::String),
];

impl EnvelopePayload for ValidationResult {
    const FIELDS: &'static [FieldSpec] = &[
        ("artifact_id", JsonKind::String),
        ("validation_result", JsonKind::OneOf(OUTCOME_NAMES)),
        ("violations", JsonKind::Array),
    ];

    fn check_fields(payload: &Value) -> ContractResult<()> {
        require_fields("payload", payload, Self::FIELDS)?;
        for (i, finding) in elements(&payload["violations"]).iter().enumerate() {
            require_fields(&format!("payload.violations[{}]", i), finding, &FINDING_FIELDS)?;
        }
        Ok(())
    }

    fn check_invariants(&self) -> ContractResult<()> {
        if self.artifact_id.trim().is_empty() {
            return Err(ContractError::schema(
                "payload.artifact_id",
                "must be a non-empty string",
            ));
        }
        if !self.is_consistent() {
            return Err(ContractError::schema(
                "payload.validation_result",
                format!(
                    "{:?} is inconsistent with {} violation(s) and reviewer hint {:?}",
                    self.validation_result,
                    self.violations.len(),
                    self.reviewer_hint
                ),
            ));
        }
        Ok(())
    }
}
