//! # Guardrail Enforcer
//!
//! Checks a produced artifact set against its plan and guardrails.
//!
//! ## Checks
//!
//! Per plan item, in plan order; the first failing check ends that item:
//! - `PlanNotFulfilled` - no produced artifact carries the item's id
//! - `BannedTopicDetected` - content contains a banned term (one per term)
//! - `LengthOutOfBounds` - measured length outside `[min, max]`
//!
//! Then plan-level, regardless of per-item outcomes:
//! - `BannedTopicDetected` - banned term in the trend topic context
//! - `BudgetExceeded` - cumulative cost above `max_budget_usd`, once
//!
//! The budget check needs the full artifact set, so callers run the
//! enforcer only after every generation has returned.

use crate::contract::artifacts::{
    Artifact, ArtifactCompliance, ArtifactPlanItem, CapabilityTable, CostModel, EnforcementResult,
    GuardrailViolation, Guardrails, LengthUnit,
};
use crate::error::ErrorKind;
use std::collections::HashMap;

/// Float slack for the budget comparison
const BUDGET_EPSILON: f64 = 1e-9;

/// Plan/guardrail enforcer
#[derive(Debug, Clone, Default)]
pub struct GuardrailEnforcer {
    capabilities: CapabilityTable,
}

impl GuardrailEnforcer {
    pub fn new(capabilities: CapabilityTable) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Enforce without a topic context
    pub fn enforce(
        &self,
        plan: &[ArtifactPlanItem],
        produced: &[Artifact],
        guardrails: &Guardrails,
    ) -> EnforcementResult {
        self.enforce_with_context(plan, produced, guardrails, None)
    }

    /// Enforce, also scanning `topic_context` for banned terms
    pub fn enforce_with_context(
        &self,
        plan: &[ArtifactPlanItem],
        produced: &[Artifact],
        guardrails: &Guardrails,
        topic_context: Option<&str>,
    ) -> EnforcementResult {
        let terms = guardrails.banned_terms();
        let mut violations = Vec::new();

        // First artifact wins on duplicate ids
        let mut by_id: HashMap<&str, &Artifact> = HashMap::new();
        for artifact in produced {
            by_id.entry(artifact.artifact_id.as_str()).or_insert(artifact);
        }

        for item in plan {
            let Some(artifact) = by_id.get(item.artifact_id.as_str()) else {
                violations.push(GuardrailViolation {
                    kind: ErrorKind::PlanNotFulfilled,
                    artifact_id: Some(item.artifact_id.clone()),
                    term: None,
                    detail: format!("No artifact produced for plan item `{}`", item.artifact_id),
                });
                continue;
            };

            let content = artifact.content.to_lowercase();
            let before = violations.len();
            for term in terms.iter().filter(|t| content.contains(t.as_str())) {
                violations.push(GuardrailViolation {
                    kind: ErrorKind::BannedTopicDetected,
                    artifact_id: Some(item.artifact_id.clone()),
                    term: Some(term.clone()),
                    detail: format!("Content contains banned topic `{}`", term),
                });
            }
            if violations.len() > before {
                continue;
            }

            if let Some(violation) = self.check_length(item, artifact) {
                violations.push(violation);
            }
        }

        // One plan-level violation naming the first hit
        if let Some(context) = topic_context {
            let context = context.to_lowercase();
            let hits: Vec<&str> = terms
                .iter()
                .map(String::as_str)
                .filter(|t| context.contains(t))
                .collect();
            if let Some(first) = hits.first() {
                violations.push(GuardrailViolation {
                    kind: ErrorKind::BannedTopicDetected,
                    artifact_id: None,
                    term: Some(first.to_string()),
                    detail: format!("Trend context contains banned topics: {}", hits.join(", ")),
                });
            }
        }

        let total_cost_usd: f64 = produced.iter().map(|a| self.artifact_cost(a)).sum();
        if total_cost_usd > guardrails.max_budget_usd + BUDGET_EPSILON {
            violations.push(GuardrailViolation {
                kind: ErrorKind::BudgetExceeded,
                artifact_id: None,
                term: None,
                detail: format!(
                    "Estimated cost ${:.4} exceeds budget ${:.4}",
                    total_cost_usd, guardrails.max_budget_usd
                ),
            });
        }

        if !violations.is_empty() {
            tracing::info!(
                violations = violations.len(),
                total_cost_usd,
                "Guardrail enforcement found violations"
            );
        }

        EnforcementResult::new(violations, total_cost_usd)
    }

    fn check_length(&self, item: &ArtifactPlanItem, artifact: &Artifact) -> Option<GuardrailViolation> {
        let unit = self.capabilities.resolve(&item.modality).length_unit;
        let (min, max) = item.length.bounds(unit)?;
        let unit_name = unit.key().unwrap_or("units");

        let detail = match measure(artifact, unit) {
            None => format!("No measured length in {} for `{}`", unit_name, item.artifact_id),
            Some(n) if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) => format!(
                "Length {} {} outside [{}, {}]",
                n,
                unit_name,
                min.map_or("-".to_string(), |m| m.to_string()),
                max.map_or("-".to_string(), |m| m.to_string()),
            ),
            Some(_) => return None,
        };

        Some(GuardrailViolation {
            kind: ErrorKind::LengthOutOfBounds,
            artifact_id: Some(item.artifact_id.clone()),
            term: None,
            detail,
        })
    }

    /// Cost of one artifact under its modality's cost model. Non-finite or
    /// negative reports count as zero.
    pub fn artifact_cost(&self, artifact: &Artifact) -> f64 {
        let capability = self.capabilities.resolve(&artifact.modality);
        let reported = sanitize(artifact.estimated_cost_usd);
        match capability.cost_model {
            CostModel::Reported => reported,
            CostModel::PerUnit { usd_per_unit } => match measure(artifact, capability.length_unit) {
                Some(units) => sanitize(units as f64 * usd_per_unit),
                None => reported,
            },
        }
    }
}

/// Measured length in `unit`. Text falls back to a whitespace token count.
pub fn measure(artifact: &Artifact, unit: LengthUnit) -> Option<u64> {
    match (artifact.measured_length, unit) {
        (Some(n), _) => Some(n),
        (None, LengthUnit::Tokens) => Some(artifact.content.split_whitespace().count() as u64),
        (None, _) => None,
    }
}

fn sanitize(usd: f64) -> f64 {
    if usd.is_finite() && usd > 0.0 {
        usd
    } else {
        0.0
    }
}

/// Attach per-artifact compliance derived from `result`
pub fn annotate(artifacts: &mut [Artifact], result: &EnforcementResult) {
    for artifact in artifacts.iter_mut() {
        let violations: Vec<ErrorKind> = result
            .for_artifact(&artifact.artifact_id)
            .map(|v| v.kind)
            .collect();
        artifact.compliance = Some(ArtifactCompliance {
            guardrails_honored: violations.is_empty(),
            violations,
        });
    }
}
