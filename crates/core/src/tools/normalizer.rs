//! # Trend Normalizer
//!
//! Maps heterogeneous provider observations onto the canonical
//! [`TrendRecord`] shape.
//!
//! ## Pipeline
//!
//! ```text
//! raw observations → map fields (discard incomplete) → window filter
//!                  → dedupe by (platform, topic) → sort
//! ```
//!
//! Output order: `momentum_score` desc, `volume` desc, `trend_id` asc.

use crate::config::FieldAliases;
use crate::contract::trends::{
    check_https_url, parse_utc_instant, SourceCitation, TrendDiagnostics, TrendQuery, TrendRecord,
};
use crate::error::{ContractResult, ObservationDefect};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Built-in aliases, canonical name first
const DEFAULT_ALIASES: &[(&str, &[&str])] = &[
    ("trend_id", &["trend_id", "id", "trend"]),
    ("platform", &["platform", "network", "channel"]),
    ("topic", &["topic", "hashtag", "title", "keyword"]),
    ("momentum_score", &["momentum_score", "momentum", "score"]),
    ("volume", &["volume", "mentions", "count"]),
    ("sentiment", &["sentiment", "sentiment_score", "polarity"]),
    ("summary", &["summary", "description", "snippet"]),
    ("source_citations", &["source_citations", "citations", "sources"]),
    ("type", &["type", "kind", "source_type"]),
    ("url", &["url", "link", "href"]),
    ("captured_at", &["captured_at", "timestamp", "published_at"]),
];

// ============================================================================
// Types
// ============================================================================

/// One provider-shaped observation
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    /// Source category that produced it (e.g. "news")
    pub source: String,
    pub fields: Map<String, Value>,
}

impl RawObservation {
    /// Non-object values become an empty (and therefore incomplete) record
    pub fn new(source: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            source: source.into(),
            fields,
        }
    }
}

/// Normalization output
#[derive(Debug, Clone, Default)]
pub struct NormalizedTrends {
    pub trends: Vec<TrendRecord>,
    pub diagnostics: TrendDiagnostics,
    pub defects: Vec<ObservationDefect>,
}

// ============================================================================
// Normalizer
// ============================================================================

/// Canonicalizes raw observations
#[derive(Debug, Clone)]
pub struct TrendNormalizer {
    aliases: FieldAliases,
}

impl Default for TrendNormalizer {
    fn default() -> Self {
        Self::new(&FieldAliases::new())
    }
}

impl TrendNormalizer {
    /// Built-in aliases with `extra` aliases tried first
    pub fn new(extra: &FieldAliases) -> Self {
        let mut aliases = FieldAliases::new();
        for (field, names) in DEFAULT_ALIASES {
            let mut list: Vec<String> = extra.get(*field).cloned().unwrap_or_default();
            list.extend(names.iter().map(|n| n.to_string()));
            aliases.insert(field.to_string(), list);
        }
        Self { aliases }
    }

    /// Normalize observations for `query`. Fails only when the query
    /// itself is invalid; bad observations are counted and discarded.
    pub fn normalize(
        &self,
        query: &TrendQuery,
        observations: Vec<RawObservation>,
    ) -> ContractResult<NormalizedTrends> {
        let (start, end) = query.validate()?;
        let mut out = NormalizedTrends::default();
        out.diagnostics.received = observations.len();

        let mut in_window: Vec<(TrendRecord, DateTime<Utc>)> = Vec::new();
        for (index, obs) in observations.iter().enumerate() {
            match self.map_observation(index, obs, query) {
                Ok((record, captured)) => {
                    if captured < start || captured > end {
                        out.diagnostics.outside_window += 1;
                        continue;
                    }
                    in_window.push((record, captured));
                }
                Err(defect) => {
                    tracing::warn!(%defect, "Discarding incomplete observation");
                    out.defects.push(defect);
                }
            }
        }
        out.diagnostics.discarded = out.defects.len();

        // Dedupe by (platform, topic), keeping the strongest observation
        let mut best: HashMap<(String, String), (TrendRecord, DateTime<Utc>)> = HashMap::new();
        for (record, captured) in in_window {
            let key = (record.platform.to_lowercase(), record.topic.to_lowercase());
            let replace = match best.get(&key) {
                Some((kept, kept_at)) => {
                    out.diagnostics.duplicates_merged += 1;
                    outranks((&record, captured), (kept, *kept_at))
                }
                None => true,
            };
            if replace {
                best.insert(key, (record, captured));
            }
        }

        let mut trends: Vec<TrendRecord> = best.into_values().map(|(r, _)| r).collect();
        sort_trends(&mut trends);

        // trend_id must be unique within a response
        let mut seen = HashSet::new();
        trends.retain(|r| {
            let fresh = seen.insert(r.trend_id.clone());
            if !fresh {
                out.diagnostics.duplicates_merged += 1;
            }
            fresh
        });

        tracing::debug!(
            received = out.diagnostics.received,
            kept = trends.len(),
            discarded = out.diagnostics.discarded,
            outside_window = out.diagnostics.outside_window,
            "Normalized trend observations"
        );

        out.trends = trends;
        Ok(out)
    }

    /// Map one observation; returns the record and its latest capture time
    fn map_observation(
        &self,
        index: usize,
        obs: &RawObservation,
        query: &TrendQuery,
    ) -> Result<(TrendRecord, DateTime<Utc>), ObservationDefect> {
        let ctx = FieldCtx {
            index,
            source: &obs.source,
        };

        let trend_id = match self.lookup(&obs.fields, "trend_id") {
            Some(Value::Number(n)) => n.to_string(),
            other => ctx.string("trend_id", other)?,
        };
        let platform = match self.lookup(&obs.fields, "platform") {
            None => query.platform.clone(),
            other => ctx.string("platform", other)?,
        };
        let topic = ctx.string("topic", self.lookup(&obs.fields, "topic"))?;

        let momentum_score = ctx.number("momentum_score", self.lookup(&obs.fields, "momentum_score"))?;
        if !(0.0..=1.0).contains(&momentum_score) {
            return Err(ctx.malformed("momentum_score", format!("{} is outside [0, 1]", momentum_score)));
        }

        let volume = match self.lookup(&obs.fields, "volume") {
            None => return Err(ctx.missing("volume")),
            Some(v) => as_count(v).ok_or_else(|| ctx.malformed("volume", "expected a non-negative integer"))?,
        };

        let sentiment = ctx.number("sentiment", self.lookup(&obs.fields, "sentiment"))?;
        if !(-1.0..=1.0).contains(&sentiment) {
            return Err(ctx.malformed("sentiment", format!("{} is outside [-1, 1]", sentiment)));
        }

        let summary = ctx.string("summary", self.lookup(&obs.fields, "summary"))?;

        let raw_citations = match self.lookup(&obs.fields, "source_citations") {
            None => return Err(ctx.missing("source_citations")),
            Some(Value::Array(items)) if !items.is_empty() => items,
            Some(_) => return Err(ctx.malformed("source_citations", "expected a non-empty array")),
        };

        let mut source_citations = Vec::with_capacity(raw_citations.len());
        let mut latest: Option<DateTime<Utc>> = None;
        for raw in raw_citations {
            let fields = raw
                .as_object()
                .ok_or_else(|| ctx.malformed("source_citations", "citation is not an object"))?;
            let kind = ctx.string("type", self.lookup(fields, "type"))?;
            let url = ctx.string("url", self.lookup(fields, "url"))?;
            check_https_url(&url).map_err(|reason| ctx.malformed("url", reason))?;
            let captured_at = ctx.string("captured_at", self.lookup(fields, "captured_at"))?;
            let captured =
                parse_utc_instant(&captured_at).map_err(|reason| ctx.malformed("captured_at", reason))?;
            latest = latest.max(Some(captured));
            source_citations.push(SourceCitation {
                kind,
                url,
                captured_at,
            });
        }
        let captured = latest.ok_or_else(|| ctx.missing("captured_at"))?;

        Ok((
            TrendRecord {
                trend_id,
                platform,
                topic,
                momentum_score,
                volume,
                sentiment,
                summary,
                source_citations,
            },
            captured,
        ))
    }

    /// First non-null alias of a canonical field
    fn lookup<'a>(&self, fields: &'a Map<String, Value>, canonical: &str) -> Option<&'a Value> {
        self.aliases
            .get(canonical)?
            .iter()
            .filter_map(|alias| fields.get(alias))
            .find(|v| !v.is_null())
    }
}

/// Sort by momentum desc, volume desc, trend_id asc
pub fn sort_trends(trends: &mut [TrendRecord]) {
    trends.sort_by(|a, b| {
        b.momentum_score
            .total_cmp(&a.momentum_score)
            .then_with(|| b.volume.cmp(&a.volume))
            .then_with(|| a.trend_id.cmp(&b.trend_id))
    });
}

/// Higher momentum wins; then the most recent capture; then the lower id
fn outranks(a: (&TrendRecord, DateTime<Utc>), b: (&TrendRecord, DateTime<Utc>)) -> bool {
    let ordering = a
        .0
        .momentum_score
        .total_cmp(&b.0.momentum_score)
        .then_with(|| a.1.cmp(&b.1))
        .then_with(|| b.0.trend_id.cmp(&a.0.trend_id));
    ordering == Ordering::Greater
}

fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then(|| f as u64)
}

/// Defect builder bound to one observation
struct FieldCtx<'a> {
    index: usize,
    source: &'a str,
}

impl FieldCtx<'_> {
    fn missing(&self, field: &'static str) -> ObservationDefect {
        ObservationDefect::Missing {
            index: self.index,
            source_name: self.source.to_string(),
            field,
        }
    }

    fn malformed(&self, field: &'static str, reason: impl Into<String>) -> ObservationDefect {
        ObservationDefect::Malformed {
            index: self.index,
            source_name: self.source.to_string(),
            field,
            reason: reason.into(),
        }
    }

    fn string(&self, field: &'static str, value: Option<&Value>) -> Result<String, ObservationDefect> {
        match value {
            None => Err(self.missing(field)),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::String(_)) => Err(self.malformed(field, "empty string")),
            Some(_) => Err(self.malformed(field, "expected a string")),
        }
    }

    fn number(&self, field: &'static str, value: Option<&Value>) -> Result<f64, ObservationDefect> {
        match value {
            None => Err(self.missing(field)),
            Some(v) => v
                .as_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| self.malformed(field, "expected a finite number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::trends::{Signals, TimeWindow};
    use serde_json::json;

    fn query() -> TrendQuery {
        TrendQuery {
            platform: "twitter".to_string(),
            topics: vec!["solar fashion".to_string()],
            time_window: TimeWindow::new("2026-02-01T00:00:00Z", "2026-02-06T00:00:00Z"),
            signals: Signals::new().with("include_news", true),
            geo: Some("global".to_string()),
            persona_priority: None,
        }
    }

    fn obs(id: &str, topic: &str, momentum: f64, volume: u64, captured_at: &str) -> RawObservation {
        RawObservation::new(
            "social",
            json!({
                "trend_id": id,
                "platform": "twitter",
                "topic": topic,
                "momentum_score": momentum,
                "volume": volume,
                "sentiment": 0.4,
                "summary": format!("{} is rising", topic),
                "source_citations": [
                    { "type": "tweet", "url": "https://twitter.com/example", "captured_at": captured_at }
                ]
            }),
        )
    }

    #[test]
    fn test_maps_provider_aliases() {
        let raw = RawObservation::new(
            "news",
            json!({
                "id": 42,
                "hashtag": "#SolarThreads",
                "momentum": 0.7,
                "mentions": 1200.0,
                "polarity": -0.2,
                "description": "Coverage of solar textiles",
                "citations": [
                    { "kind": "article", "link": "https://news.example.com/solar", "published_at": "2026-02-03T08:00:00Z" }
                ]
            }),
        );
        let out = TrendNormalizer::default().normalize(&query(), vec![raw]).unwrap();
        assert_eq!(out.trends.len(), 1);
        let record = &out.trends[0];
        assert_eq!(record.trend_id, "42");
        assert_eq!(record.platform, "twitter");
        assert_eq!(record.topic, "#SolarThreads");
        assert_eq!(record.volume, 1200);
        assert_eq!(record.source_citations[0].kind, "article");
        assert!(record.validate("trend").is_ok());
    }

    #[test]
    fn test_custom_aliases_take_precedence() {
        let mut extra = FieldAliases::new();
        extra.insert("topic".to_string(), vec!["query_term".to_string()]);
        let normalizer = TrendNormalizer::new(&extra);

        let mut raw = obs("t-1", "#fallback", 0.5, 10, "2026-02-02T00:00:00Z");
        raw.fields.insert("query_term".to_string(), json!("#preferred"));
        let out = normalizer.normalize(&query(), vec![raw]).unwrap();
        assert_eq!(out.trends[0].topic, "#preferred");
    }

    #[test]
    fn test_incomplete_observations_are_discarded_and_counted() {
        let mut missing_summary = obs("t-1", "#a", 0.5, 10, "2026-02-02T00:00:00Z");
        missing_summary.fields.remove("summary");
        let mut insecure = obs("t-2", "#b", 0.5, 10, "2026-02-02T00:00:00Z");
        insecure.fields.insert(
            "source_citations".to_string(),
            json!([{ "type": "tweet", "url": "http://twitter.com/x", "captured_at": "2026-02-02T00:00:00Z" }]),
        );
        let negative = obs("t-3", "#c", -0.1, 10, "2026-02-02T00:00:00Z");
        let good = obs("t-4", "#d", 0.5, 10, "2026-02-02T00:00:00Z");

        let out = TrendNormalizer::default()
            .normalize(&query(), vec![missing_summary, insecure, negative, good])
            .unwrap();
        assert_eq!(out.trends.len(), 1);
        assert_eq!(out.diagnostics.received, 4);
        assert_eq!(out.diagnostics.discarded, 3);
        assert_eq!(out.defects[0].field(), "summary");
        assert_eq!(out.defects[1].field(), "url");
        assert_eq!(out.defects[2].field(), "momentum_score");
    }

    #[test]
    fn test_drops_observations_outside_window() {
        let early = obs("t-1", "#a", 0.9, 10, "2026-01-31T23:59:59Z");
        let inside = obs("t-2", "#b", 0.5, 10, "2026-02-06T00:00:00Z");
        let out = TrendNormalizer::default()
            .normalize(&query(), vec![early, inside])
            .unwrap();
        assert_eq!(out.trends.len(), 1);
        assert_eq!(out.trends[0].trend_id, "t-2");
        assert_eq!(out.diagnostics.outside_window, 1);
    }

    #[test]
    fn test_dedupe_keeps_highest_momentum_then_latest_capture() {
        let weak = obs("t-1", "#Solar", 0.4, 100, "2026-02-05T00:00:00Z");
        let strong = obs("t-2", "#solar", 0.8, 10, "2026-02-02T00:00:00Z");
        let out = TrendNormalizer::default()
            .normalize(&query(), vec![weak, strong])
            .unwrap();
        assert_eq!(out.trends.len(), 1);
        assert_eq!(out.trends[0].trend_id, "t-2");
        assert_eq!(out.diagnostics.duplicates_merged, 1);

        let older = obs("t-3", "#tie", 0.6, 10, "2026-02-02T00:00:00Z");
        let newer = obs("t-4", "#tie", 0.6, 10, "2026-02-04T00:00:00Z");
        let out = TrendNormalizer::default()
            .normalize(&query(), vec![newer, older])
            .unwrap();
        assert_eq!(out.trends[0].trend_id, "t-4");
    }

    #[test]
    fn test_output_order_is_deterministic() {
        let observations = vec![
            obs("t-c", "#c", 0.5, 10, "2026-02-02T00:00:00Z"),
            obs("t-a", "#a", 0.5, 10, "2026-02-02T00:00:00Z"),
            obs("t-b", "#b", 0.5, 99, "2026-02-02T00:00:00Z"),
            obs("t-d", "#d", 0.9, 1, "2026-02-02T00:00:00Z"),
        ];
        let out = TrendNormalizer::default()
            .normalize(&query(), observations)
            .unwrap();
        let ids: Vec<_> = out.trends.iter().map(|r| r.trend_id.as_str()).collect();
        assert_eq!(ids, vec!["t-d", "t-b", "t-a", "t-c"]);
    }

    #[test]
    fn test_duplicate_trend_ids_across_topics_are_dropped() {
        let first = obs("t-1", "#a", 0.9, 10, "2026-02-02T00:00:00Z");
        let clash = obs("t-1", "#b", 0.3, 10, "2026-02-02T00:00:00Z");
        let out = TrendNormalizer::default()
            .normalize(&query(), vec![first, clash])
            .unwrap();
        assert_eq!(out.trends.len(), 1);
        assert_eq!(out.trends[0].topic, "#a");
    }

    #[test]
    fn test_invalid_query_window_fails() {
        let mut q = query();
        q.time_window = TimeWindow::new("2026-02-06T00:00:00Z", "2026-02-01T00:00:00Z");
        assert!(TrendNormalizer::default().normalize(&q, vec![]).is_err());
    }
}
