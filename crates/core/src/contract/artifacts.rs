//! # Artifact Contracts
//!
//! Generation plan items, produced artifacts, guardrails, and the
//! modality capability table that resolves length units and cost models
//! at dispatch time.

use super::envelope::{elements, require_fields, EnvelopePayload, FieldSpec, JsonKind, Status};
use crate::error::{ContractError, ContractResult, ErrorKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// Modality
// ============================================================================

/// Artifact modality. Open set: unknown names round-trip as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Modality {
    Text,
    Image,
    Video,
    Audio,
    Other(String),
}

impl Modality {
    pub fn as_str(&self) -> &str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Video => "video",
            Modality::Audio => "audio",
            Modality::Other(name) => name,
        }
    }
}

impl From<String> for Modality {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "text" => Modality::Text,
            "image" => Modality::Image,
            "video" => Modality::Video,
            "audio" => Modality::Audio,
            _ => Modality::Other(s),
        }
    }
}

impl From<&str> for Modality {
    fn from(s: &str) -> Self {
        Modality::from(s.to_string())
    }
}

impl From<Modality> for String {
    fn from(m: Modality) -> Self {
        m.as_str().to_string()
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Capability Table
// ============================================================================

/// Unit a modality's length is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    Tokens,
    Seconds,
    /// No length constraint applies
    Unbounded,
}

impl LengthUnit {
    /// Suffix used by `min_<unit>` / `max_<unit>` plan keys
    pub fn key(&self) -> Option<&'static str> {
        match self {
            LengthUnit::Tokens => Some("tokens"),
            LengthUnit::Seconds => Some("seconds"),
            LengthUnit::Unbounded => None,
        }
    }
}

/// How an artifact's cost is estimated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostModel {
    /// Use the generator's own `estimated_cost_usd`
    Reported,
    /// Measured length times a fixed rate
    PerUnit { usd_per_unit: f64 },
}

/// Length unit and cost model for one modality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Capability {
    pub length_unit: LengthUnit,
    pub cost_model: CostModel,
}

impl Capability {
    pub const fn reported(length_unit: LengthUnit) -> Self {
        Self {
            length_unit,
            cost_model: CostModel::Reported,
        }
    }
}

/// `{modality -> capability}` lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CapabilityTable(BTreeMap<String, Capability>);

impl Default for CapabilityTable {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert("text".to_string(), Capability::reported(LengthUnit::Tokens));
        table.insert("image".to_string(), Capability::reported(LengthUnit::Unbounded));
        table.insert("video".to_string(), Capability::reported(LengthUnit::Seconds));
        table.insert("audio".to_string(), Capability::reported(LengthUnit::Seconds));
        Self(table)
    }
}

impl CapabilityTable {
    /// Defaults overlaid with `overrides` (keys are modality names)
    pub fn with_overrides(overrides: &BTreeMap<String, Capability>) -> Self {
        let mut table = Self::default();
        for (name, capability) in overrides {
            table.0.insert(name.to_ascii_lowercase(), *capability);
        }
        table
    }

    /// Unknown modalities are unbounded and use reported cost
    pub fn resolve(&self, modality: &Modality) -> Capability {
        self.0
            .get(&modality.as_str().to_ascii_lowercase())
            .copied()
            .unwrap_or(Capability::reported(LengthUnit::Unbounded))
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Modality-dependent length bounds, e.g. `{"min_tokens": 60, "max_tokens": 120}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LengthConstraint(BTreeMap<String, u64>);

impl LengthConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: u64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn tokens(min: u64, max: u64) -> Self {
        Self::new().with("min_tokens", min).with("max_tokens", max)
    }

    pub fn seconds(min: u64, max: u64) -> Self {
        Self::new().with("min_seconds", min).with("max_seconds", max)
    }

    /// `(min, max)` for a unit; `None` when neither bound is set
    pub fn bounds(&self, unit: LengthUnit) -> Option<(Option<u64>, Option<u64>)> {
        let key = unit.key()?;
        let min = self.0.get(&format!("min_{}", key)).copied();
        let max = self.0.get(&format!("max_{}", key)).copied();
        if min.is_none() && max.is_none() {
            None
        } else {
            Some((min, max))
        }
    }
}

/// One planned artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactPlanItem {
    pub artifact_id: String,
    #[schemars(with = "String")]
    pub modality: Modality,
    pub platform: String,
    #[serde(default)]
    pub length: LengthConstraint,
}

/// Hard constraints for a whole plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Guardrails {
    /// Cumulative ceiling across the plan
    pub max_budget_usd: f64,
    /// Matched case-insensitively as substrings
    #[serde(default)]
    pub banned_topics: Vec<String>,
}

impl Guardrails {
    /// Lowercased, trimmed, de-duplicated terms in their given order
    pub fn banned_terms(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.banned_topics
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

/// Trend the plan is generated against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendContext {
    #[serde(default)]
    pub trend_id: Option<String>,
    #[serde(default)]
    pub insight_summary: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TrendContext {
    /// Every string in the context, joined, for topic checks
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.trend_id.as_deref());
        parts.extend(self.insight_summary.as_deref());
        for value in self.extra.values() {
            collect_strings(value, &mut parts);
        }
        parts.join("\n")
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Disclosure label attached for a delivery geo (`"global"` covers all)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DisclosureMarker {
    pub geo: String,
    pub label: String,
}

/// Derived guardrail outcome for one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactCompliance {
    pub guardrails_honored: bool,
    #[serde(default)]
    pub violations: Vec<ErrorKind>,
}

/// A produced artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    pub artifact_id: String,
    #[schemars(with = "String")]
    pub modality: Modality,
    pub platform: String,
    /// Text body, or caption/transcript for rich media
    #[serde(default)]
    pub content: String,
    /// Storage reference for rich media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
    /// Length in the modality's unit, as measured by the generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_length: Option<u64>,
    #[serde(default)]
    pub estimated_cost_usd: f64,
    /// Attached sentiment score in `[-1, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disclosures: Vec<DisclosureMarker>,
    /// Explicit wallet/commerce callout flag; content is scanned when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_callout: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ArtifactCompliance>,
}

impl Artifact {
    pub fn new(
        artifact_id: impl Into<String>,
        modality: impl Into<Modality>,
        platform: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            modality: modality.into(),
            platform: platform.into(),
            content: content.into(),
            content_ref: None,
            measured_length: None,
            estimated_cost_usd: 0.0,
            sentiment: None,
            disclosures: Vec::new(),
            wallet_callout: None,
            compliance: None,
        }
    }

    pub fn with_cost(mut self, usd: f64) -> Self {
        self.estimated_cost_usd = usd;
        self
    }

    pub fn with_length(mut self, measured: u64) -> Self {
        self.measured_length = Some(measured);
        self
    }

    pub fn with_sentiment(mut self, score: f64) -> Self {
        self.sentiment = Some(score);
        self
    }

    pub fn with_disclosure(mut self, geo: impl Into<String>, label: impl Into<String>) -> Self {
        self.disclosures.push(DisclosureMarker {
            geo: geo.into(),
            label: label.into(),
        });
        self
    }

    pub fn with_wallet_callout(mut self, present: bool) -> Self {
        self.wallet_callout = Some(present);
        self
    }
}

// ============================================================================
// Enforcement
// ============================================================================

/// One guardrail defect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GuardrailViolation {
    pub kind: ErrorKind,
    /// `None` for plan-level violations (budget, topic context)
    #[serde(default)]
    pub artifact_id: Option<String>,
    /// Offending banned term, when `kind` is `BannedTopicDetected`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub detail: String,
}

/// Aggregated enforcement outcome; `status` is SUCCESS only with zero
/// violations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnforcementResult {
    pub status: Status,
    pub violations: Vec<GuardrailViolation>,
    pub total_cost_usd: f64,
}

impl EnforcementResult {
    pub fn new(violations: Vec<GuardrailViolation>, total_cost_usd: f64) -> Self {
        let status = if violations.is_empty() {
            Status::Success
        } else {
            Status::Failure
        };
        Self {
            status,
            violations,
            total_cost_usd,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    /// Violations attributed to one artifact
    pub fn for_artifact<'a>(&'a self, artifact_id: &'a str) -> impl Iterator<Item = &'a GuardrailViolation> + 'a {
        self.violations
            .iter()
            .filter(move |v| v.artifact_id.as_deref() == Some(artifact_id))
    }
}

// ============================================================================
// Request / Payload
// ============================================================================

/// Generation request as sent by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    pub trace_id: String,
    pub planner_task_id: String,
    pub campaign_id: String,
    pub agent_id: String,
    /// Opaque locator, e.g. `filesystem://agents/<name>/SOUL.md`
    pub persona_profile_ref: String,
    #[serde(default)]
    pub trend_context: TrendContext,
    pub artifact_plan: Vec<ArtifactPlanItem>,
    pub guardrails: Guardrails,
}

impl GenerationRequest {
    /// Structural checks on the plan and guardrails
    pub fn validate(&self, capabilities: &CapabilityTable) -> ContractResult<()> {
        for (name, value) in [
            ("campaign_id", &self.campaign_id),
            ("agent_id", &self.agent_id),
            ("persona_profile_ref", &self.persona_profile_ref),
        ] {
            if value.trim().is_empty() {
                return Err(ContractError::invalid_request(format!(
                    "{} must be a non-empty string",
                    name
                )));
            }
        }

        let budget = self.guardrails.max_budget_usd;
        if !budget.is_finite() || budget < 0.0 {
            return Err(ContractError::invalid_request(format!(
                "guardrails.max_budget_usd must be a non-negative number, got {}",
                budget
            )));
        }

        let mut seen = HashSet::new();
        for (i, item) in self.artifact_plan.iter().enumerate() {
            if item.artifact_id.trim().is_empty() {
                return Err(ContractError::invalid_request(format!(
                    "artifact_plan[{}].artifact_id must be a non-empty string",
                    i
                )));
            }
            if !seen.insert(item.artifact_id.as_str()) {
                return Err(ContractError::invalid_request(format!(
                    "artifact_plan[{}].artifact_id `{}` is not unique",
                    i, item.artifact_id
                )));
            }
            let unit = capabilities.resolve(&item.modality).length_unit;
            if let Some((Some(min), Some(max))) = item.length.bounds(unit) {
                if min > max {
                    return Err(ContractError::invalid_request(format!(
                        "artifact_plan[{}].length has min {} above max {}",
                        i, min, max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Generation response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationPayload {
    pub campaign_id: String,
    pub agent_id: String,
    pub artifacts: Vec<Artifact>,
    pub enforcement: EnforcementResult,
}

const ARTIFACT_FIELDS: [FieldSpec; 3] = [
    ("artifact_id", JsonKind::String),
    ("modality", JsonKind::String),
    ("platform", JsonKind::String),
];

const ENFORCEMENT_FIELDS: [FieldSpec; 3] = [
    ("status", JsonKind::OneOf(&["SUCCESS", "FAILURE"])),
    ("violations", JsonKind::Array),
    ("total_cost_usd", JsonKind::Number),
];

const VIOLATION_FIELDS: [FieldSpec; 2] = [("kind", JsonKind::String), ("detail", JsonKind::String)];

impl EnvelopePayload for GenerationPayload {
    const FIELDS: &'static [FieldSpec] = &[
        ("campaign_id", JsonKind::String),
        ("agent_id", JsonKind::String),
        ("artifacts", JsonKind::Array),
        ("enforcement", JsonKind::Object),
    ];

    fn check_fields(payload: &Value) -> ContractResult<()> {
        require_fields("payload", payload, Self::FIELDS)?;
        for (i, artifact) in elements(&payload["artifacts"]).iter().enumerate() {
            require_fields(&format!("payload.artifacts[{}]", i), artifact, &ARTIFACT_FIELDS)?;
        }
        let enforcement = &payload["enforcement"];
        require_fields("payload.enforcement", enforcement, &ENFORCEMENT_FIELDS)?;
        for (i, violation) in elements(&enforcement["violations"]).iter().enumerate() {
            require_fields(
                &format!("payload.enforcement.violations[{}]", i),
                violation,
                &VIOLATION_FIELDS,
            )?;
        }
        Ok(())
    }

    fn check_invariants(&self) -> ContractResult<()> {
        for (name, value) in [("campaign_id", &self.campaign_id), ("agent_id", &self.agent_id)] {
            if value.trim().is_empty() {
                return Err(ContractError::schema(
                    format!("payload.{}", name),
                    "must be a non-empty string",
                ));
            }
        }
        for (i, artifact) in self.artifacts.iter().enumerate() {
            if artifact.artifact_id.trim().is_empty() {
                return Err(ContractError::schema(
                    format!("payload.artifacts[{}].artifact_id", i),
                    "must be a non-empty string",
                ));
            }
        }

        let enforcement = &self.enforcement;
        if (enforcement.status == Status::Success) != enforcement.violations.is_empty() {
            return Err(ContractError::schema(
                "payload.enforcement.status",
                format!(
                    "{:?} is inconsistent with {} violation(s)",
                    enforcement.status,
                    enforcement.violations.len()
                ),
            ));
        }
        let cost = enforcement.total_cost_usd;
        if !cost.is_finite() || cost < 0.0 {
            return Err(ContractError::schema(
                "payload.enforcement.total_cost_usd",
                format!("{} is not a non-negative amount", cost),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::envelope::decode;
    use serde_json::json;

    #[test]
    fn test_modality_open_set() {
        let m: Modality = serde_json::from_value(json!("video")).unwrap();
        assert_eq!(m, Modality::Video);
        let m: Modality = serde_json::from_value(json!("hologram")).unwrap();
        assert_eq!(m, Modality::Other("hologram".to_string()));
        assert_eq!(serde_json::to_value(&m).unwrap(), json!("hologram"));
    }

    #[test]
    fn test_capability_resolution() {
        let table = CapabilityTable::default();
        assert_eq!(table.resolve(&Modality::Text).length_unit, LengthUnit::Tokens);
        assert_eq!(table.resolve(&Modality::Audio).length_unit, LengthUnit::Seconds);
        assert_eq!(
            table.resolve(&Modality::from("hologram")).length_unit,
            LengthUnit::Unbounded
        );

        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Hologram".to_string(),
            Capability {
                length_unit: LengthUnit::Seconds,
                cost_model: CostModel::PerUnit { usd_per_unit: 0.01 },
            },
        );
        let table = CapabilityTable::with_overrides(&overrides);
        assert_eq!(
            table.resolve(&Modality::from("hologram")).length_unit,
            LengthUnit::Seconds
        );
    }

    #[test]
    fn test_length_bounds_by_unit() {
        let length: LengthConstraint =
            serde_json::from_value(json!({"min_tokens": 60, "max_tokens": 120})).unwrap();
        assert_eq!(length.bounds(LengthUnit::Tokens), Some((Some(60), Some(120))));
        assert_eq!(length.bounds(LengthUnit::Seconds), None);
        assert_eq!(length.bounds(LengthUnit::Unbounded), None);
    }

    #[test]
    fn test_banned_terms_normalized() {
        let guardrails = Guardrails {
            max_budget_usd: 1.0,
            banned_topics: vec!["Politics".into(), " politics ".into(), "".into(), "Gambling".into()],
        };
        assert_eq!(guardrails.banned_terms(), vec!["politics", "gambling"]);
    }

    #[test]
    fn test_trend_context_text_includes_extra_strings() {
        let ctx: TrendContext = serde_json::from_value(json!({
            "trend_id": "trend-456",
            "insight_summary": "solar denim",
            "topic": "#SolarThreads",
            "tags": ["eco", 3],
        }))
        .unwrap();
        let text = ctx.text();
        assert!(text.contains("trend-456"));
        assert!(text.contains("#SolarThreads"));
        assert!(text.contains("eco"));
    }

    #[test]
    fn test_minimal_artifact_deserializes() {
        let artifact: Artifact = serde_json::from_value(json!({
            "artifact_id": "artifact-2",
            "modality": "text",
            "platform": "instagram",
            "content": "Solar denim drop",
        }))
        .unwrap();
        assert_eq!(artifact.estimated_cost_usd, 0.0);
        assert!(artifact.disclosures.is_empty());
        assert!(artifact.compliance.is_none());
    }

    fn generation_wire(enforcement: Value) -> Value {
        json!({
            "version": "1.0",
            "status": "SUCCESS",
            "trace_id": "t",
            "planner_task_id": "p",
            "payload": {
                "campaign_id": "campaign-111",
                "agent_id": "agent-222",
                "artifacts": [{
                    "artifact_id": "artifact-1",
                    "modality": "text",
                    "platform": "instagram",
                    "content": "Solar denim drop"
                }],
                "enforcement": enforcement,
            },
        })
    }

    #[test]
    fn test_decode_generation_payload_checks() {
        let ok = decode::<GenerationPayload>(&generation_wire(json!({
            "status": "SUCCESS", "violations": [], "total_cost_usd": 0.05
        })));
        assert_eq!(ok.unwrap().body().unwrap().artifacts.len(), 1);

        let err = decode::<GenerationPayload>(&generation_wire(json!({
            "status": "SUCCESS", "violations": [], "total_cost_usd": "cheap"
        })))
        .unwrap_err();
        assert_eq!(
            err,
            ContractError::schema("payload.enforcement.total_cost_usd", "expected a number")
        );

        // Violations reported under a SUCCESS status
        let err = decode::<GenerationPayload>(&generation_wire(json!({
            "status": "SUCCESS",
            "violations": [{ "kind": "BudgetExceeded", "artifact_id": null, "detail": "over" }],
            "total_cost_usd": 0.9
        })))
        .unwrap_err();
        match err {
            ContractError::SchemaViolation { field, .. } => assert_eq!(field, "payload.enforcement.status"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = decode::<GenerationPayload>(&generation_wire(json!({
            "status": "SUCCESS", "violations": [], "total_cost_usd": -0.5
        })))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    fn request(plan: Vec<ArtifactPlanItem>, budget: f64) -> GenerationRequest {
        GenerationRequest {
            trace_id: "t".into(),
            planner_task_id: "p".into(),
            campaign_id: "campaign-111".into(),
            agent_id: "agent-222".into(),
            persona_profile_ref: "filesystem://agents/liyu/SOUL.md".into(),
            trend_context: TrendContext::default(),
            artifact_plan: plan,
            guardrails: Guardrails {
                max_budget_usd: budget,
                banned_topics: vec![],
            },
        }
    }

    fn item(id: &str, length: LengthConstraint) -> ArtifactPlanItem {
        ArtifactPlanItem {
            artifact_id: id.into(),
            modality: Modality::Text,
            platform: "instagram".into(),
            length,
        }
    }

    #[test]
    fn test_request_validation() {
        let table = CapabilityTable::default();
        assert!(request(vec![item("a", LengthConstraint::tokens(60, 120))], 0.45)
            .validate(&table)
            .is_ok());

        let dup = request(
            vec![item("a", LengthConstraint::new()), item("a", LengthConstraint::new())],
            1.0,
        );
        assert!(matches!(dup.validate(&table), Err(ContractError::InvalidRequest(_))));

        let inverted = request(vec![item("a", LengthConstraint::tokens(120, 60))], 1.0);
        assert!(inverted.validate(&table).is_err());

        let negative = request(vec![], -0.01);
        assert!(negative.validate(&table).is_err());

        let nan = request(vec![], f64::NAN);
        assert!(nan.validate(&table).is_err());
    }
}
