//! # Trend Contracts
//!
//! Query, canonical record, and response payload for the trend fetch
//! skill. Instants stay as ISO-8601 strings on the wire so they echo
//! verbatim; they are parsed with `chrono` wherever ordering matters.

use super::envelope::{elements, require_elements, require_fields, EnvelopePayload, FieldSpec, JsonKind};
use crate::error::{ContractError, ContractResult};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Every trend record carries exactly these fields
pub const TREND_RECORD_FIELDS: [FieldSpec; 8] = [
    ("trend_id", JsonKind::String),
    ("platform", JsonKind::String),
    ("topic", JsonKind::String),
    ("momentum_score", JsonKind::Number),
    ("volume", JsonKind::Count),
    ("sentiment", JsonKind::Number),
    ("summary", JsonKind::String),
    ("source_citations", JsonKind::Array),
];

/// Every citation carries exactly these fields
pub const CITATION_FIELDS: [FieldSpec; 3] = [
    ("type", JsonKind::String),
    ("url", JsonKind::String),
    ("captured_at", JsonKind::String),
];

const TIME_WINDOW_FIELDS: [FieldSpec; 2] = [("start", JsonKind::String), ("end", JsonKind::String)];

/// Signal toggles prefixed with this name select a source category
pub const SIGNAL_PREFIX: &str = "include_";

/// Parse an ISO-8601 instant and normalize it to UTC
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("`{}` is not an ISO-8601 instant: {}", raw, e))
}

/// Parse an instant that must be written in UTC with a trailing `Z`
pub fn parse_utc_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    if !raw.ends_with('Z') {
        return Err(format!("`{}` must be a UTC instant ending in `Z`", raw));
    }
    parse_instant(raw)
}

/// Inclusive query window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Parsed bounds; `start <= end` is required
    pub fn bounds(&self) -> ContractResult<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_instant(&self.start).map_err(ContractError::InvalidRequest)?;
        let end = parse_instant(&self.end).map_err(ContractError::InvalidRequest)?;
        if start > end {
            return Err(ContractError::invalid_request(format!(
                "time_window.start {} is after time_window.end {}",
                self.start, self.end
            )));
        }
        Ok((start, end))
    }
}

/// Open set of named toggles. Any key and any JSON value are accepted
/// and echoed back; a toggle is on only when its value is `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Signals(BTreeMap<String, Value>);

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.0.insert(key.into(), Value::Bool(enabled));
        self
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Source categories switched on by `include_<category>` toggles,
    /// in key order
    pub fn enabled_categories(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, value)| value.as_bool() == Some(true))
            .filter_map(|(key, _)| key.strip_prefix(SIGNAL_PREFIX))
            .filter(|category| !category.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Trend fetch query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendQuery {
    pub platform: String,
    /// Empty means unscoped
    #[serde(default)]
    pub topics: Vec<String>,
    pub time_window: TimeWindow,
    #[serde(default)]
    pub signals: Signals,
    #[serde(default)]
    pub geo: Option<String>,
    /// Ranking bias for downstream consumers; carried, not enforced
    #[serde(default)]
    pub persona_priority: Option<Vec<String>>,
}

impl TrendQuery {
    /// Validate the query and return its parsed window
    pub fn validate(&self) -> ContractResult<(DateTime<Utc>, DateTime<Utc>)> {
        if self.platform.trim().is_empty() {
            return Err(ContractError::invalid_request(
                "platform must be a non-empty string",
            ));
        }
        self.time_window.bounds()
    }
}

/// Trend fetch request as sent by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendFetchRequest {
    pub trace_id: String,
    pub planner_task_id: String,
    #[serde(flatten)]
    pub query: TrendQuery,
}

/// Provenance of a trend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceCitation {
    #[serde(rename = "type")]
    pub kind: String,
    /// Absolute HTTPS URL
    pub url: String,
    /// UTC instant ending in `Z`
    pub captured_at: String,
}

impl SourceCitation {
    pub fn validate(&self, path: &str) -> ContractResult<DateTime<Utc>> {
        if self.kind.trim().is_empty() {
            return Err(ContractError::schema(
                format!("{}.type", path),
                "must be a non-empty string",
            ));
        }
        check_https_url(&self.url)
            .map_err(|reason| ContractError::schema(format!("{}.url", path), reason))?;
        parse_utc_instant(&self.captured_at)
            .map_err(|reason| ContractError::schema(format!("{}.captured_at", path), reason))
    }
}

/// Accept only absolute `https://` URLs
pub fn check_https_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("`{}` is not an absolute URL: {}", raw, e))?;
    if parsed.scheme() != "https" {
        return Err(format!("`{}` must use https", raw));
    }
    if parsed.host_str().is_none() {
        return Err(format!("`{}` has no host", raw));
    }
    Ok(())
}

/// Canonical trend record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendRecord {
    pub trend_id: String,
    pub platform: String,
    pub topic: String,
    /// In `[0, 1]`
    pub momentum_score: f64,
    pub volume: u64,
    /// In `[-1, 1]`
    pub sentiment: f64,
    pub summary: String,
    pub source_citations: Vec<SourceCitation>,
}

impl TrendRecord {
    /// Check every record invariant, naming the offending field path
    pub fn validate(&self, path: &str) -> ContractResult<()> {
        let field = |name: &str| format!("{}.{}", path, name);
        for (name, value) in [
            ("trend_id", &self.trend_id),
            ("platform", &self.platform),
            ("topic", &self.topic),
            ("summary", &self.summary),
        ] {
            if value.trim().is_empty() {
                return Err(ContractError::schema(field(name), "must be a non-empty string"));
            }
        }
        if !self.momentum_score.is_finite() || !(0.0..=1.0).contains(&self.momentum_score) {
            return Err(ContractError::schema(
                field("momentum_score"),
                format!("{} is outside [0, 1]", self.momentum_score),
            ));
        }
        if !self.sentiment.is_finite() || !(-1.0..=1.0).contains(&self.sentiment) {
            return Err(ContractError::schema(
                field("sentiment"),
                format!("{} is outside [-1, 1]", self.sentiment),
            ));
        }
        for (i, citation) in self.source_citations.iter().enumerate() {
            citation.validate(&format!("{}.source_citations[{}]", path, i))?;
        }
        Ok(())
    }

    /// Most recent citation capture time
    pub fn latest_capture(&self) -> Option<DateTime<Utc>> {
        self.source_citations
            .iter()
            .filter_map(|c| parse_instant(&c.captured_at).ok())
            .max()
    }
}

/// Non-fatal accounting for a normalization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TrendDiagnostics {
    /// Raw observations received from all sources
    pub received: usize,
    /// Observations discarded as incomplete or malformed
    pub discarded: usize,
    /// Observations dropped for falling outside the time window
    pub outside_window: usize,
    /// Observations merged away by deduplication
    pub duplicates_merged: usize,
    /// Source categories that failed, timed out, or had no provider
    #[serde(default)]
    pub degraded_sources: Vec<String>,
}

/// Trend fetch response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendPayload {
    pub platform: String,
    pub topics: Vec<String>,
    pub time_window: TimeWindow,
    pub signals: Signals,
    pub geo: Option<String>,
    pub persona_priority: Option<Vec<String>>,
    pub trends: Vec<TrendRecord>,
    #[serde(default)]
    pub diagnostics: TrendDiagnostics,
}

impl TrendPayload {
    /// Echo the query around a set of records
    pub fn from_query(query: &TrendQuery, trends: Vec<TrendRecord>, diagnostics: TrendDiagnostics) -> Self {
        Self {
            platform: query.platform.clone(),
            topics: query.topics.clone(),
            time_window: query.time_window.clone(),
            signals: query.signals.clone(),
            geo: query.geo.clone(),
            persona_priority: query.persona_priority.clone(),
            trends,
            diagnostics,
        }
    }
}

impl EnvelopePayload for TrendPayload {
    const FIELDS: &'static [FieldSpec] = &[
        ("platform", JsonKind::String),
        ("topics", JsonKind::Array),
        ("time_window", JsonKind::Object),
        ("signals", JsonKind::Object),
        ("trends", JsonKind::Array),
    ];

    fn check_fields(payload: &Value) -> ContractResult<()> {
        require_fields("payload", payload, Self::FIELDS)?;
        require_elements("payload.topics", &payload["topics"], JsonKind::String)?;
        require_fields("payload.time_window", &payload["time_window"], &TIME_WINDOW_FIELDS)?;
        for (i, trend) in elements(&payload["trends"]).iter().enumerate() {
            let path = format!("payload.trends[{}]", i);
            require_fields(&path, trend, &TREND_RECORD_FIELDS)?;
            for (j, citation) in elements(&trend["source_citations"]).iter().enumerate() {
                require_fields(
                    &format!("{}.source_citations[{}]", path, j),
                    citation,
                    &CITATION_FIELDS,
                )?;
            }
        }
        Ok(())
    }

    fn check_invariants(&self) -> ContractResult<()> {
        if self.platform.trim().is_empty() {
            return Err(ContractError::schema("payload.platform", "must be a non-empty string"));
        }
        self.time_window.bounds().map_err(|e| match e {
            ContractError::InvalidRequest(reason) => ContractError::schema("payload.time_window", reason),
            other => other,
        })?;
        for (i, record) in self.trends.iter().enumerate() {
            record.validate(&format!("payload.trends[{}]", i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::envelope::decode;
    use serde_json::json;

    fn sample_record() -> TrendRecord {
        TrendRecord {
            trend_id: "trend-123".to_string(),
            platform: "twitter".to_string(),
            topic: "#SolarThreads".to_string(),
            momentum_score: 0.82,
            volume: 15432,
            sentiment: 0.66,
            summary: "Designers pairing solar fabrics with traditional Ethiopian patterns."
                .to_string(),
            source_citations: vec![SourceCitation {
                kind: "tweet".to_string(),
                url: "https://twitter.com/example".to_string(),
                captured_at: "2026-02-05T10:02:00Z".to_string(),
            }],
        }
    }

    #[test]
    fn test_signals_unknown_keys_default_false() {
        let signals: Signals = serde_json::from_value(json!({
            "include_news": true,
            "include_social": true,
            "include_commerce": false,
            "experimental_boost": true,
        }))
        .unwrap();
        assert!(signals.is_enabled("include_news"));
        assert!(!signals.is_enabled("include_commerce"));
        assert!(!signals.is_enabled("include_podcasts"));
        assert_eq!(signals.enabled_categories(), vec!["news", "social"]);
    }

    #[test]
    fn test_signals_accept_non_boolean_values() {
        let raw = json!({
            "include_news": true,
            "ranking_mode": "fresh",
            "max_items": 25,
            "include_video": "yes",
        });
        let signals: Signals = serde_json::from_value(raw.clone()).unwrap();
        assert!(!signals.is_enabled("ranking_mode"));
        assert!(!signals.is_enabled("include_video"));
        assert_eq!(signals.enabled_categories(), vec!["news"]);
        assert_eq!(serde_json::to_value(&signals).unwrap(), raw);
    }

    #[test]
    fn test_time_window_ordering() {
        let ok = TimeWindow::new("2026-02-01T00:00:00Z", "2026-02-06T00:00:00Z");
        assert!(ok.bounds().is_ok());

        let reversed = TimeWindow::new("2026-02-06T00:00:00Z", "2026-02-01T00:00:00Z");
        assert!(matches!(reversed.bounds(), Err(ContractError::InvalidRequest(_))));

        let garbage = TimeWindow::new("yesterday", "2026-02-01T00:00:00Z");
        assert!(garbage.bounds().is_err());
    }

    #[test]
    fn test_record_validation() {
        assert!(sample_record().validate("trends[0]").is_ok());

        let mut bad = sample_record();
        bad.source_citations[0].url = "http://twitter.com/example".to_string();
        let err = bad.validate("trends[0]").unwrap_err();
        assert_eq!(
            err,
            ContractError::schema(
                "trends[0].source_citations[0].url",
                "`http://twitter.com/example` must use https"
            )
        );

        let mut bad = sample_record();
        bad.source_citations[0].captured_at = "2026-02-05T10:02:00+01:00".to_string();
        assert!(bad.validate("t").is_err());

        let mut bad = sample_record();
        bad.momentum_score = f64::NAN;
        assert!(bad.validate("t").is_err());
    }

    #[test]
    fn test_record_serializes_all_fields() {
        let value = serde_json::to_value(sample_record()).unwrap();
        for (field, _) in TREND_RECORD_FIELDS {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["source_citations"][0]["type"], "tweet");
    }

    #[test]
    fn test_payload_check_names_missing_record_field() {
        let mut record = serde_json::to_value(sample_record()).unwrap();
        record.as_object_mut().unwrap().remove("volume");
        let payload = json!({
            "platform": "twitter",
            "topics": [],
            "time_window": { "start": "2026-02-01T00:00:00Z", "end": "2026-02-06T00:00:00Z" },
            "signals": {},
            "trends": [record],
        });
        let err = TrendPayload::check_fields(&payload).unwrap_err();
        assert_eq!(err, ContractError::schema("payload.trends[0].volume", "missing field"));
    }

    fn envelope_with(record: Value) -> Value {
        json!({
            "version": "1.0",
            "status": "SUCCESS",
            "trace_id": "trace-1",
            "planner_task_id": "task-1",
            "payload": {
                "platform": "twitter",
                "topics": ["fashion"],
                "time_window": { "start": "2026-02-01T00:00:00Z", "end": "2026-02-06T00:00:00Z" },
                "signals": { "include_news": true },
                "geo": "ET",
                "persona_priority": null,
                "trends": [record],
            },
        })
    }

    #[test]
    fn test_decode_names_mistyped_record_field() {
        let mut record = serde_json::to_value(sample_record()).unwrap();
        record["momentum_score"] = json!("high");
        let err = decode::<TrendPayload>(&envelope_with(record)).unwrap_err();
        assert_eq!(
            err,
            ContractError::schema("payload.trends[0].momentum_score", "expected a number")
        );

        let mut record = serde_json::to_value(sample_record()).unwrap();
        record["source_citations"][0]["captured_at"] = json!(1738749720);
        let err = decode::<TrendPayload>(&envelope_with(record)).unwrap_err();
        assert_eq!(
            err,
            ContractError::schema("payload.trends[0].source_citations[0].captured_at", "expected a string")
        );
    }

    #[test]
    fn test_decode_enforces_record_invariants() {
        let mut record = serde_json::to_value(sample_record()).unwrap();
        record["momentum_score"] = json!(7.5);
        record["source_citations"][0]["url"] = json!("http://twitter.com/example");
        let err = decode::<TrendPayload>(&envelope_with(record)).unwrap_err();
        match err {
            ContractError::SchemaViolation { field, .. } => {
                assert_eq!(field, "payload.trends[0].momentum_score")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut record = serde_json::to_value(sample_record()).unwrap();
        record["source_citations"][0]["url"] = json!("http://twitter.com/example");
        let err = decode::<TrendPayload>(&envelope_with(record)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SchemaViolation);

        let ok = decode::<TrendPayload>(&envelope_with(serde_json::to_value(sample_record()).unwrap()));
        assert_eq!(ok.unwrap().body().unwrap().trends[0], sample_record());
    }

    #[test]
    fn test_latest_capture() {
        let mut record = sample_record();
        record.source_citations.push(SourceCitation {
            kind: "article".to_string(),
            url: "https://news.example.com/a".to_string(),
            captured_at: "2026-02-05T12:00:00Z".to_string(),
        });
        assert_eq!(
            record.latest_capture().unwrap(),
            parse_instant("2026-02-05T12:00:00Z").unwrap()
        );
    }
}
