//! # Payload Schemas
//!
//! JSON Schema exports so planners can discover each skill's contract.

use super::artifacts::{GenerationPayload, GenerationRequest};
use super::envelope::Envelope;
use super::trends::{TrendFetchRequest, TrendPayload};
use super::validation::{ValidationRequest, ValidationResult};
use schemars::{schema_for, JsonSchema, Schema};

/// Schema of a full envelope around `P`
pub fn envelope_schema<P: JsonSchema>() -> Schema {
    schema_for!(Envelope<P>)
}

pub fn trend_request_schema() -> Schema {
    schema_for!(TrendFetchRequest)
}

pub fn trend_response_schema() -> Schema {
    envelope_schema::<TrendPayload>()
}

pub fn generation_request_schema() -> Schema {
    schema_for!(GenerationRequest)
}

pub fn generation_response_schema() -> Schema {
    envelope_schema::<GenerationPayload>()
}

pub fn validation_request_schema() -> Schema {
    schema_for!(ValidationRequest)
}

pub fn validation_response_schema() -> Schema {
    envelope_schema::<ValidationResult>()
}
