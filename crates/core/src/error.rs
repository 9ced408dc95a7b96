//! # Error Kinds
//!
//! Every failure that can reach a caller carries one of the stable kinds
//! below. The serialized names are part of the wire contract.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, wire-visible error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    /// Malformed or missing request field; never retried
    InvalidRequest,
    /// Empty correlation identifier handed to the envelope codec
    InvalidIdentifier,
    /// Raw trend observation could not populate every required field
    IncompleteObservation,
    /// Plan item without a produced artifact
    PlanNotFulfilled,
    /// Banned topic term found in content or topic context
    BannedTopicDetected,
    /// Produced length outside the plan item's bounds
    LengthOutOfBounds,
    /// Cumulative cost above the plan budget
    BudgetExceeded,
    /// Envelope decode failure
    SchemaViolation,
    /// Caller-initiated abort before the join barrier
    Cancelled,
    /// Collaborator task crashed
    CollaboratorError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::InvalidIdentifier => "InvalidIdentifier",
            Self::IncompleteObservation => "IncompleteObservation",
            Self::PlanNotFulfilled => "PlanNotFulfilled",
            Self::BannedTopicDetected => "BannedTopicDetected",
            Self::LengthOutOfBounds => "LengthOutOfBounds",
            Self::BudgetExceeded => "BudgetExceeded",
            Self::SchemaViolation => "SchemaViolation",
            Self::Cancelled => "Cancelled",
            Self::CollaboratorError => "CollaboratorError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that cross the façade boundary as a FAILURE envelope
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid identifier: `{field}` must be a non-empty string")]
    InvalidIdentifier { field: &'static str },

    #[error("Schema violation at `{field}`: {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("Request cancelled before all collaborators returned")]
    Cancelled,

    #[error("Collaborator failure: {0}")]
    Collaborator(String),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Collaborator(_) => ErrorKind::CollaboratorError,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A raw observation that was discarded instead of coerced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationDefect {
    #[error("Observation {index} from `{source_name}` is missing `{field}`")]
    Missing {
        index: usize,
        source_name: String,
        field: &'static str,
    },

    #[error("Observation {index} from `{source_name}` has malformed `{field}`: {reason}")]
    Malformed {
        index: usize,
        source_name: String,
        field: &'static str,
        reason: String,
    },
}

impl ObservationDefect {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::IncompleteObservation
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field, .. } | Self::Malformed { field, .. } => field,
        }
    }
}

pub type ContractResult<T> = Result<T, ContractError>;
