//! # Envelope Codec
//!
//! Uniform request/response wrapper shared by every skill.
//!
//! ```text
//! { "version": "1.0", "status": "SUCCESS" | "FAILURE",
//!   "trace_id": "...", "planner_task_id": "...", "payload": { ... } }
//! ```
//!
//! The version is injected here and never taken from callers. Decoding
//! walks canonical field lists, checking presence and JSON shape field by
//! field, so the first reported violation is the same on every run. Each
//! payload type then checks its own invariants on the typed value.

use crate::error::{ContractError, ContractResult, ErrorKind};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current protocol version. Bumped only on a compatibility break.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Canonical envelope field order; [`decode`] checks fields in this sequence
pub const ENVELOPE_FIELDS: [&str; 5] = ["version", "status", "trace_id", "planner_task_id", "payload"];

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Structured body of a FAILURE envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorPayload {
    pub error_kind: ErrorKind,
    pub message: String,
}

impl ErrorPayload {
    pub const FIELDS: [FieldSpec; 2] = [("error_kind", JsonKind::String), ("message", JsonKind::String)];
}

impl From<&ContractError> for ErrorPayload {
    fn from(err: &ContractError) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Skill-specific body or the error that replaced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Payload<P> {
    Success(P),
    Failure(ErrorPayload),
}

impl<P> Payload<P> {
    fn status(&self) -> Status {
        match self {
            Payload::Success(_) => Status::Success,
            Payload::Failure(_) => Status::Failure,
        }
    }
}

/// Expected JSON shape of a required field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Number,
    /// Non-negative integer
    Count,
    Bool,
    Array,
    Object,
    /// String from a fixed vocabulary
    OneOf(&'static [&'static str]),
}

impl JsonKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Number => value.is_number(),
            JsonKind::Count => value.is_u64(),
            JsonKind::Bool => value.is_boolean(),
            JsonKind::Array => value.is_array(),
            JsonKind::Object => value.is_object(),
            JsonKind::OneOf(names) => value.as_str().is_some_and(|s| names.contains(&s)),
        }
    }

    fn expectation(self) -> String {
        match self {
            JsonKind::String => "expected a string".to_string(),
            JsonKind::Number => "expected a number".to_string(),
            JsonKind::Count => "expected a non-negative integer".to_string(),
            JsonKind::Bool => "expected a boolean".to_string(),
            JsonKind::Array => "expected an array".to_string(),
            JsonKind::Object => "expected a JSON object".to_string(),
            JsonKind::OneOf(names) => format!("expected one of {}", names.join(", ")),
        }
    }
}

/// Field name and the JSON shape it must have
pub type FieldSpec = (&'static str, JsonKind);

/// A payload type that can ride inside an envelope
pub trait EnvelopePayload: Serialize + DeserializeOwned {
    /// Required payload fields, in the order decode reports them
    const FIELDS: &'static [FieldSpec];

    /// Structural check run before typed deserialization
    fn check_fields(payload: &Value) -> ContractResult<()> {
        require_fields("payload", payload, Self::FIELDS)
    }

    /// Invariants of the decoded value
    fn check_invariants(&self) -> ContractResult<()> {
        Ok(())
    }
}

/// Check that `value` is an object holding every field in `fields` with
/// the expected shape. The first absent or malformed field is reported
/// as `{path}.{field}`.
pub fn require_fields(path: &str, value: &Value, fields: &[FieldSpec]) -> ContractResult<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| ContractError::schema(path, "expected a JSON object"))?;
    for (field, kind) in fields {
        let reason = match obj.get(*field) {
            None => "missing field".to_string(),
            Some(Value::Null) => "field is null".to_string(),
            Some(v) if !kind.accepts(v) => kind.expectation(),
            Some(_) => continue,
        };
        return Err(ContractError::schema(format!("{}.{}", path, field), reason));
    }
    Ok(())
}

/// Check every element of the array at `path` against `kind`
pub fn require_elements(path: &str, value: &Value, kind: JsonKind) -> ContractResult<()> {
    for (i, item) in elements(value).iter().enumerate() {
        if !kind.accepts(item) {
            return Err(ContractError::schema(
                format!("{}[{}]", path, i),
                kind.expectation(),
            ));
        }
    }
    Ok(())
}

/// Array items, or nothing for a non-array
pub fn elements(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Immutable response wrapper
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Envelope<P> {
    version: &'static str,
    status: Status,
    trace_id: String,
    planner_task_id: String,
    payload: Payload<P>,
}

impl<P> Envelope<P> {
    /// Build an envelope. Identifiers must be non-empty and `status` must
    /// agree with the payload variant.
    pub fn build(
        trace_id: impl Into<String>,
        planner_task_id: impl Into<String>,
        status: Status,
        payload: Payload<P>,
    ) -> ContractResult<Self> {
        let trace_id = trace_id.into();
        let planner_task_id = planner_task_id.into();
        if trace_id.trim().is_empty() {
            return Err(ContractError::InvalidIdentifier { field: "trace_id" });
        }
        if planner_task_id.trim().is_empty() {
            return Err(ContractError::InvalidIdentifier {
                field: "planner_task_id",
            });
        }
        if payload.status() != status {
            return Err(ContractError::schema(
                "status",
                format!("{:?} does not match the payload variant", status),
            ));
        }
        Ok(Self::assemble(trace_id, planner_task_id, payload))
    }

    pub fn success(
        trace_id: impl Into<String>,
        planner_task_id: impl Into<String>,
        payload: P,
    ) -> ContractResult<Self> {
        Self::build(trace_id, planner_task_id, Status::Success, Payload::Success(payload))
    }

    pub fn failure(
        trace_id: impl Into<String>,
        planner_task_id: impl Into<String>,
        err: &ContractError,
    ) -> ContractResult<Self> {
        Self::build(
            trace_id,
            planner_task_id,
            Status::Failure,
            Payload::Failure(err.into()),
        )
    }

    /// Infallible façade exit: wraps either outcome and echoes the
    /// identifiers verbatim, even when they are the reason for rejection.
    pub fn respond(trace_id: &str, planner_task_id: &str, result: ContractResult<P>) -> Self {
        let payload = match result {
            Ok(p) => Payload::Success(p),
            Err(err) => Payload::Failure((&err).into()),
        };
        Self::assemble(trace_id.to_string(), planner_task_id.to_string(), payload)
    }

    fn assemble(trace_id: String, planner_task_id: String, payload: Payload<P>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            status: payload.status(),
            trace_id,
            planner_task_id,
            payload,
        }
    }

    pub fn version(&self) -> &str {
        self.version
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn planner_task_id(&self) -> &str {
        &self.planner_task_id
    }

    pub fn payload(&self) -> &Payload<P> {
        &self.payload
    }

    /// The skill body, if the call succeeded
    pub fn body(&self) -> Option<&P> {
        match &self.payload {
            Payload::Success(p) => Some(p),
            Payload::Failure(_) => None,
        }
    }

    /// The error body, if the call failed
    pub fn error(&self) -> Option<&ErrorPayload> {
        match &self.payload {
            Payload::Success(_) => None,
            Payload::Failure(e) => Some(e),
        }
    }

}

impl<P: Serialize> Envelope<P> {
    /// Encode to the wire shape
    pub fn encode(&self) -> ContractResult<Value> {
        serde_json::to_value(self).map_err(|e| ContractError::schema("envelope", e.to_string()))
    }
}

/// Decode an envelope, reporting the first missing or malformed field in
/// canonical order.
pub fn decode<P: EnvelopePayload>(value: &Value) -> ContractResult<Envelope<P>> {
    let obj = value
        .as_object()
        .ok_or_else(|| ContractError::schema("envelope", "expected a JSON object"))?;

    let field = |name: &'static str| {
        obj.get(name)
            .ok_or_else(|| ContractError::schema(name, "missing field"))
    };

    let version = field("version")?
        .as_str()
        .ok_or_else(|| ContractError::schema("version", "expected a string"))?;
    if version != PROTOCOL_VERSION {
        return Err(ContractError::schema(
            "version",
            format!(
                "unsupported protocol version `{}` (expected `{}`)",
                version, PROTOCOL_VERSION
            ),
        ));
    }

    let status = field("status")?
        .as_str()
        .and_then(Status::parse)
        .ok_or_else(|| ContractError::schema("status", "expected SUCCESS or FAILURE"))?;

    let trace_id = non_empty_str(field("trace_id")?, "trace_id")?;
    let planner_task_id = non_empty_str(field("planner_task_id")?, "planner_task_id")?;

    let raw_payload = field("payload")?;
    let payload = match status {
        Status::Success => {
            P::check_fields(raw_payload)?;
            let body = serde_json::from_value::<P>(raw_payload.clone())
                .map_err(|e| ContractError::schema("payload", e.to_string()))?;
            body.check_invariants()?;
            Payload::Success(body)
        }
        Status::Failure => {
            require_fields("payload", raw_payload, &ErrorPayload::FIELDS)?;
            let body = serde_json::from_value::<ErrorPayload>(raw_payload.clone())
                .map_err(|e| ContractError::schema("payload", e.to_string()))?;
            Payload::Failure(body)
        }
    };

    Ok(Envelope::assemble(
        trace_id.to_string(),
        planner_task_id.to_string(),
        payload,
    ))
}

/// Decode from JSON text
pub fn decode_str<P: EnvelopePayload>(json: &str) -> ContractResult<Envelope<P>> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ContractError::schema("envelope", e.to_string()))?;
    decode(&value)
}

fn non_empty_str<'a>(value: &'a Value, field: &'static str) -> ContractResult<&'a str> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(ContractError::schema(field, "must be a non-empty string")),
        None => Err(ContractError::schema(field, "expected a string")),
    }
}
