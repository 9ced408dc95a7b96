//! # Skill Contracts
//!
//! Wire types shared by every skill. Everything here serializes to the
//! JSON shapes the planner exchanges with the skills; field names and
//! enum strings are fixed.
//!
//! ## Modules
//!
//! - `envelope` - Uniform response wrapper and its codec
//! - `trends` - Trend query, canonical record, response payload
//! - `artifacts` - Plan items, artifacts, guardrails, capability table
//! - `validation` - Policy bundle, risk toggles, ternary result
//! - `schema` - JSON Schema exports

pub mod artifacts;
pub mod envelope;
pub mod schema;
pub mod trends;
pub mod validation;

pub use artifacts::{
    Artifact, ArtifactCompliance, ArtifactPlanItem, Capability, CapabilityTable, CostModel,
    DisclosureMarker, EnforcementResult, GenerationPayload, GenerationRequest, GuardrailViolation,
    Guardrails, LengthConstraint, LengthUnit, Modality, TrendContext,
};
pub use envelope::{
    decode, decode_str, Envelope, EnvelopePayload, ErrorPayload, Payload, Status,
    PROTOCOL_VERSION,
};
pub use trends::{
    Signals, SourceCitation, TimeWindow, TrendDiagnostics, TrendFetchRequest, TrendPayload,
    TrendQuery, TrendRecord,
};
pub use validation::{
    DeliveryTarget, Finding, PolicyBundle, RiskToggles, Severity, ValidationOutcome,
    ValidationRequest, ValidationResult,
};
