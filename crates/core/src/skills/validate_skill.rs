//! # Validation Skill
//!
//! Checks the request, then hands the artifact to the [`PolicyComposer`].
//! A REJECTED artifact is a successful call; only malformed requests
//! produce a FAILURE envelope.

use super::{correlation_of, ensure_correlation, parse_request};
use crate::config::SkillConfig;
use crate::contract::envelope::Envelope;
use crate::contract::validation::{ValidationRequest, ValidationResult};
use crate::error::{ContractError, ContractResult};
use crate::tools::policy::{PolicyComposer, ResolverRegistry};
use serde_json::Value;

/// Content validation façade
#[derive(Debug, Clone)]
pub struct ValidationSkill {
    composer: PolicyComposer,
}

impl ValidationSkill {
    /// Fails only on an invalid marker pattern in `config`
    pub fn new(config: &SkillConfig, registry: ResolverRegistry) -> anyhow::Result<Self> {
        Ok(Self {
            composer: PolicyComposer::new(config, registry)?,
        })
    }

    #[tracing::instrument(
        name = "validate_artifact",
        skip_all,
        fields(
            trace_id = %request.trace_id,
            planner_task_id = %request.planner_task_id,
            artifact_id = %request.artifact.artifact_id
        )
    )]
    pub async fn validate_artifact(&self, request: &ValidationRequest) -> Envelope<ValidationResult> {
        let result = self.run(request).await;
        match &result {
            Ok(verdict) => tracing::info!(outcome = ?verdict.validation_result, "Artifact validated"),
            Err(e) => tracing::warn!(error = %e, "Validation request rejected"),
        }
        Envelope::respond(&request.trace_id, &request.planner_task_id, result)
    }

    /// Untyped entry point for planners sending raw JSON
    pub async fn handle(&self, request: &Value) -> Envelope<ValidationResult> {
        match parse_request::<ValidationRequest>(request) {
            Ok(typed) => self.validate_artifact(&typed).await,
            Err(e) => {
                let (trace_id, planner_task_id) = correlation_of(request);
                Envelope::respond(&trace_id, &planner_task_id, Err(e))
            }
        }
    }

    async fn run(&self, request: &ValidationRequest) -> ContractResult<ValidationResult> {
        ensure_correlation(&request.trace_id, &request.planner_task_id)?;
        if request.artifact.artifact_id.trim().is_empty() {
            return Err(ContractError::invalid_request(
                "artifact.artifact_id must be a non-empty string",
            ));
        }
        request.delivery_target.validate()?;

        Ok(self
            .composer
            .validate(
                &request.artifact,
                &request.policy_bundle,
                &request.delivery_target,
                &request.risk_toggles,
            )
            .await)
    }
}
