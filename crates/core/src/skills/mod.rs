//! # Chimera Skills
//!
//! The three planner-facing façades. Each one checks correlation ids,
//! delegates to its component, and always answers with an [`Envelope`].
//!
//! ## Skills
//!
//! - `TrendFetchSkill` - fan out to trend sources, normalize, rank
//! - `GenerationSkill` - generate a plan concurrently, then enforce guardrails
//! - `ValidationSkill` - compose policy dimensions into a ternary verdict
//!
//! [`Envelope`]: crate::contract::Envelope

pub mod collaborators;
pub mod fetch_trends_skill;
pub mod generate_skill;
pub mod validate_skill;

pub use collaborators::{ContentGenerator, TrendSource};
pub use fetch_trends_skill::{assemble_trend_response, TrendFetchSkill};
pub use generate_skill::GenerationSkill;
pub use validate_skill::ValidationSkill;

use crate::error::{ContractError, ContractResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Both correlation ids must be non-empty
pub(crate) fn ensure_correlation(trace_id: &str, planner_task_id: &str) -> ContractResult<()> {
    if trace_id.trim().is_empty() {
        return Err(ContractError::invalid_request("trace_id must be a non-empty string"));
    }
    if planner_task_id.trim().is_empty() {
        return Err(ContractError::invalid_request(
            "planner_task_id must be a non-empty string",
        ));
    }
    Ok(())
}

/// Best-effort ids from an untyped request, for echoing on rejection
pub(crate) fn correlation_of(request: &Value) -> (String, String) {
    let field = |name: &str| {
        request
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("trace_id"), field("planner_task_id"))
}

/// Deserialize a request; shape errors are the caller's to fix
pub(crate) fn parse_request<R: DeserializeOwned>(request: &Value) -> ContractResult<R> {
    R::deserialize(request).map_err(|e| ContractError::invalid_request(e.to_string()))
}
