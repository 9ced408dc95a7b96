//! # Generation Skill
//!
//! Generates every plan item concurrently, waits for all of them, then
//! runs the guardrail enforcer over the complete set.
//!
//! ```text
//! plan ─► scatter(generate) ─► join barrier ─► enforce ─► annotate ─► envelope
//! ```
//!
//! A generation that fails or times out leaves its plan item unfulfilled;
//! the enforcer reports it as `PlanNotFulfilled`. Guardrail violations are
//! result data: the envelope stays SUCCESS and `enforcement.status`
//! carries the verdict.

use super::collaborators::ContentGenerator;
use super::{correlation_of, ensure_correlation, parse_request};
use crate::config::SkillConfig;
use crate::contract::artifacts::{CapabilityTable, GenerationPayload, GenerationRequest};
use crate::contract::envelope::Envelope;
use crate::error::{ContractError, ContractResult};
use crate::swarm::fanout::{gather, Cancellation, TaskOutcome};
use crate::tools::guardrails::{annotate, GuardrailEnforcer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Multimodal generation façade
#[derive(Clone)]
pub struct GenerationSkill {
    generator: Arc<dyn ContentGenerator>,
    enforcer: GuardrailEnforcer,
    timeout: Duration,
}

impl GenerationSkill {
    pub fn new(config: &SkillConfig, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            generator,
            enforcer: GuardrailEnforcer::new(CapabilityTable::with_overrides(&config.capabilities)),
            timeout: config.generation_timeout(),
        }
    }

    pub async fn generate_artifacts(&self, request: &GenerationRequest) -> Envelope<GenerationPayload> {
        self.generate_artifacts_with_cancel(request, &Cancellation::never())
            .await
    }

    #[tracing::instrument(
        name = "generate_artifacts",
        skip_all,
        fields(
            trace_id = %request.trace_id,
            planner_task_id = %request.planner_task_id,
            campaign_id = %request.campaign_id,
            items = request.artifact_plan.len()
        )
    )]
    pub async fn generate_artifacts_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &Cancellation,
    ) -> Envelope<GenerationPayload> {
        let result = self.run(request, cancel).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Generation failed");
        }
        Envelope::respond(&request.trace_id, &request.planner_task_id, result)
    }

    /// Untyped entry point for planners sending raw JSON
    pub async fn handle(&self, request: &Value) -> Envelope<GenerationPayload> {
        match parse_request::<GenerationRequest>(request) {
            Ok(typed) => self.generate_artifacts(&typed).await,
            Err(e) => {
                let (trace_id, planner_task_id) = correlation_of(request);
                Envelope::respond(&trace_id, &planner_task_id, Err(e))
            }
        }
    }

    async fn run(&self, request: &GenerationRequest, cancel: &Cancellation) -> ContractResult<GenerationPayload> {
        ensure_correlation(&request.trace_id, &request.planner_task_id)?;
        request.validate(self.enforcer.capabilities())?;

        // SCATTER
        let tasks: Vec<_> = request
            .artifact_plan
            .iter()
            .map(|item| {
                let generator = self.generator.clone();
                let item = item.clone();
                let context = request.trend_context.clone();
                let persona = request.persona_profile_ref.clone();
                let id = item.artifact_id.clone();
                (id, async move { generator.generate(&item, &context, &persona).await })
            })
            .collect();

        // BARRIER
        let outcomes = gather(tasks, self.timeout, cancel).await?;

        let mut artifacts = Vec::with_capacity(outcomes.len());
        for (artifact_id, outcome) in outcomes {
            match outcome {
                TaskOutcome::Completed(artifact) => {
                    if artifact.artifact_id != artifact_id {
                        tracing::warn!(
                            %artifact_id,
                            returned = %artifact.artifact_id,
                            "Generator returned a different artifact id"
                        );
                    }
                    artifacts.push(artifact);
                }
                TaskOutcome::Failed(error) => {
                    tracing::warn!(%artifact_id, %error, "Generation failed; item left unfulfilled");
                }
                TaskOutcome::TimedOut => {
                    tracing::warn!(%artifact_id, "Generation timed out; item left unfulfilled");
                }
                TaskOutcome::Panicked(error) => {
                    return Err(ContractError::Collaborator(format!(
                        "generator crashed on `{}`: {}",
                        artifact_id, error
                    )));
                }
            }
        }

        // ENFORCE
        let context = request.trend_context.text();
        let topic_context = (!context.trim().is_empty()).then_some(context.as_str());
        let enforcement = self.enforcer.enforce_with_context(
            &request.artifact_plan,
            &artifacts,
            &request.guardrails,
            topic_context,
        );
        annotate(&mut artifacts, &enforcement);

        tracing::info!(
            produced = artifacts.len(),
            violations = enforcement.violations.len(),
            total_cost_usd = enforcement.total_cost_usd,
            "Generation complete"
        );

        Ok(GenerationPayload {
            campaign_id: request.campaign_id.clone(),
            agent_id: request.agent_id.clone(),
            artifacts,
            enforcement,
        })
    }
}
