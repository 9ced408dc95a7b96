//! # Trend Fetch Skill
//!
//! Fans out to one [`TrendSource`] per enabled signal category, waits at
//! the join barrier, then normalizes and ranks the observations.
//!
//! A source that fails or times out contributes nothing and is listed in
//! `diagnostics.degraded_sources`; so is an enabled category without a
//! registered provider.

use super::collaborators::TrendSource;
use super::{correlation_of, ensure_correlation, parse_request};
use crate::config::SkillConfig;
use crate::contract::envelope::{Envelope, EnvelopePayload};
use crate::contract::trends::{TrendFetchRequest, TrendPayload, TrendQuery, TrendRecord};
use crate::error::{ContractError, ContractResult};
use crate::swarm::fanout::{gather, Cancellation, TaskOutcome};
use crate::tools::normalizer::{RawObservation, TrendNormalizer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trend discovery façade
#[derive(Clone)]
pub struct TrendFetchSkill {
    sources: BTreeMap<String, Arc<dyn TrendSource>>,
    normalizer: TrendNormalizer,
    config: SkillConfig,
}

impl TrendFetchSkill {
    pub fn new(config: SkillConfig) -> Self {
        Self {
            sources: BTreeMap::new(),
            normalizer: TrendNormalizer::new(&config.field_aliases),
            config,
        }
    }

    /// Register the provider for `include_<category>`
    pub fn with_source(mut self, category: impl Into<String>, source: Arc<dyn TrendSource>) -> Self {
        self.sources.insert(category.into(), source);
        self
    }

    pub async fn fetch_trends(&self, request: &TrendFetchRequest) -> Envelope<TrendPayload> {
        self.fetch_trends_with_cancel(request, &Cancellation::never())
            .await
    }

    #[tracing::instrument(
        name = "fetch_trends",
        skip_all,
        fields(trace_id = %request.trace_id, planner_task_id = %request.planner_task_id)
    )]
    pub async fn fetch_trends_with_cancel(
        &self,
        request: &TrendFetchRequest,
        cancel: &Cancellation,
    ) -> Envelope<TrendPayload> {
        let result = self.run(request, cancel).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Trend fetch failed");
        }
        Envelope::respond(&request.trace_id, &request.planner_task_id, result)
    }

    /// Untyped entry point for planners sending raw JSON
    pub async fn handle(&self, request: &Value) -> Envelope<TrendPayload> {
        match parse_request::<TrendFetchRequest>(request) {
            Ok(typed) => self.fetch_trends(&typed).await,
            Err(e) => {
                let (trace_id, planner_task_id) = correlation_of(request);
                Envelope::respond(&trace_id, &planner_task_id, Err(e))
            }
        }
    }

    async fn run(&self, request: &TrendFetchRequest, cancel: &Cancellation) -> ContractResult<TrendPayload> {
        ensure_correlation(&request.trace_id, &request.planner_task_id)?;
        let query = &request.query;
        query.validate()?;

        let mut degraded = Vec::new();
        let mut tasks = Vec::new();
        for category in query.signals.enabled_categories() {
            let Some(source) = self.sources.get(&category) else {
                tracing::warn!(%category, "No trend source registered for enabled signal");
                degraded.push(category);
                continue;
            };
            let source = source.clone();
            let query = query.clone();
            tasks.push((category, async move { source.fetch(&query).await }));
        }

        let outcomes = gather(tasks, self.config.source_timeout(), cancel).await?;

        let mut observations = Vec::new();
        for (category, outcome) in outcomes {
            match outcome {
                TaskOutcome::Completed(values) => {
                    tracing::debug!(%category, count = values.len(), "Source returned observations");
                    observations.extend(values.into_iter().map(|v| RawObservation::new(category.clone(), v)));
                }
                TaskOutcome::Failed(error) => {
                    tracing::warn!(%category, %error, "Trend source failed; degrading");
                    degraded.push(category);
                }
                TaskOutcome::TimedOut => {
                    tracing::warn!(%category, "Trend source timed out; degrading");
                    degraded.push(category);
                }
                TaskOutcome::Panicked(error) => {
                    return Err(ContractError::Collaborator(format!(
                        "trend source `{}` crashed: {}",
                        category, error
                    )));
                }
            }
        }

        let normalized = self.normalizer.normalize(query, observations)?;
        let mut diagnostics = normalized.diagnostics;
        degraded.sort();
        diagnostics.degraded_sources = degraded;

        tracing::info!(
            trends = normalized.trends.len(),
            discarded = diagnostics.discarded,
            degraded = diagnostics.degraded_sources.len(),
            "Trend fetch complete"
        );

        Ok(TrendPayload::from_query(query, normalized.trends, diagnostics))
    }
}

/// Wrap already-normalized records in a trend envelope, checking every
/// record first. A bad record fails the whole response with a
/// `SchemaViolation` naming its field path.
pub fn assemble_trend_response(
    trace_id: &str,
    planner_task_id: &str,
    query: &TrendQuery,
    trends: Vec<TrendRecord>,
) -> Envelope<TrendPayload> {
    let result = checked_payload(trace_id, planner_task_id, query, trends);
    Envelope::respond(trace_id, planner_task_id, result)
}

fn checked_payload(
    trace_id: &str,
    planner_task_id: &str,
    query: &TrendQuery,
    trends: Vec<TrendRecord>,
) -> ContractResult<TrendPayload> {
    ensure_correlation(trace_id, planner_task_id)?;
    query.validate()?;
    let payload = TrendPayload::from_query(query, trends, Default::default());
    payload.check_invariants()?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::envelope::{decode, Status};
    use crate::contract::trends::{Signals, SourceCitation, TimeWindow};
    use crate::error::ErrorKind;
    use crate::swarm::fanout::cancellation;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Returns canned observations after an optional delay
    struct CannedSource {
        delay: Duration,
        observations: Vec<Value>,
    }

    #[async_trait]
    impl TrendSource for CannedSource {
        async fn fetch(&self, _query: &TrendQuery) -> Result<Vec<Value>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.observations.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl TrendSource for BrokenSource {
        async fn fetch(&self, _query: &TrendQuery) -> Result<Vec<Value>> {
            anyhow::bail!("upstream returned 503")
        }
    }

    fn canned(delay_ms: u64, observations: Vec<Value>) -> Arc<dyn TrendSource> {
        Arc::new(CannedSource {
            delay: Duration::from_millis(delay_ms),
            observations,
        })
    }

    fn news_items() -> Vec<Value> {
        vec![
            json!({
                "id": "trend-123",
                "title": "#SolarThreads",
                "momentum": 0.82,
                "mentions": 15432,
                "sentiment": 0.66,
                "description": "Designers pairing solar fabrics with Ethiopian patterns.",
                "citations": [{
                    "type": "article",
                    "url": "https://news.example.com/solar-threads",
                    "captured_at": "2026-02-05T10:02:00Z"
                }]
            }),
            // Outside the window
            json!({
                "id": "trend-old",
                "title": "#OldNews",
                "momentum": 0.99,
                "mentions": 1,
                "sentiment": 0.1,
                "description": "Stale",
                "citations": [{
                    "type": "article",
                    "url": "https://news.example.com/old",
                    "captured_at": "2025-12-01T00:00:00Z"
                }]
            }),
        ]
    }

    fn social_items() -> Vec<Value> {
        vec![
            json!({
                "trend_id": "trend-456",
                "platform": "twitter",
                "hashtag": "#SunDenim",
                "score": 0.64,
                "volume": 9000,
                "sentiment_score": 0.2,
                "snippet": "Sun-bleached denim is back.",
                "sources": [{
                    "kind": "tweet",
                    "link": "https://twitter.com/example/status/1",
                    "timestamp": "2026-02-04T08:00:00Z"
                }]
            }),
            // No summary: discarded
            json!({
                "trend_id": "trend-789",
                "platform": "twitter",
                "hashtag": "#Incomplete",
                "score": 0.5,
                "volume": 10,
                "sentiment_score": 0.0,
                "sources": []
            }),
        ]
    }

    fn scenario_a_request() -> TrendFetchRequest {
        TrendFetchRequest {
            trace_id: "trace-a".to_string(),
            planner_task_id: "task-a".to_string(),
            query: TrendQuery {
                platform: "twitter".to_string(),
                topics: vec!["solar fashion".to_string()],
                time_window: TimeWindow::new("2026-02-01T00:00:00Z", "2026-02-06T00:00:00Z"),
                signals: Signals::new()
                    .with("include_news", true)
                    .with("include_social", true)
                    .with("include_commerce", false),
                geo: Some("ET".to_string()),
                persona_priority: None,
            },
        }
    }

    fn skill() -> TrendFetchSkill {
        TrendFetchSkill::new(SkillConfig::default())
            .with_source("news", canned(5, news_items()))
            .with_source("social", canned(1, social_items()))
            .with_source("commerce", Arc::new(BrokenSource))
    }

    #[tokio::test]
    async fn test_scenario_a_fetch_trends() {
        let request = scenario_a_request();
        let envelope = skill().fetch_trends(&request).await;

        assert_eq!(envelope.status(), Status::Success);
        assert_eq!(envelope.trace_id(), "trace-a");
        assert_eq!(envelope.planner_task_id(), "task-a");

        let payload = envelope.body().unwrap();
        assert_eq!(payload.platform, "twitter");
        assert_eq!(payload.topics, vec!["solar fashion"]);
        assert!(!payload.trends.is_empty());
        for (i, record) in payload.trends.iter().enumerate() {
            record.validate(&format!("trends[{}]", i)).unwrap();
            assert!(record.source_citations.iter().all(|c| c.url.starts_with("https://")
                && c.captured_at.ends_with('Z')));
        }

        let ids: Vec<_> = payload.trends.iter().map(|r| r.trend_id.as_str()).collect();
        assert_eq!(ids, vec!["trend-123", "trend-456"]);
        assert_eq!(payload.diagnostics.received, 4);
        assert_eq!(payload.diagnostics.discarded, 1);
        assert_eq!(payload.diagnostics.outside_window, 1);
        assert!(payload.diagnostics.degraded_sources.is_empty());

        // Wire round trip through the decoder
        let wire = envelope.encode().unwrap();
        let decoded = decode::<TrendPayload>(&wire).unwrap();
        assert_eq!(decoded.body(), envelope.body());
    }

    #[tokio::test]
    async fn test_failing_and_missing_sources_degrade() {
        let mut request = scenario_a_request();
        request.query.signals = Signals::new()
            .with("include_news", true)
            .with("include_commerce", true)
            .with("include_podcasts", true);

        let envelope = skill().fetch_trends(&request).await;
        assert!(envelope.is_success());
        let payload = envelope.body().unwrap();
        assert_eq!(payload.trends.len(), 1);
        assert_eq!(payload.diagnostics.degraded_sources, vec!["commerce", "podcasts"]);
    }

    #[tokio::test]
    async fn test_slow_source_times_out_as_empty() {
        let config = SkillConfig::default().with_source_timeout(Duration::from_millis(30));
        let skill = TrendFetchSkill::new(config)
            .with_source("news", canned(5_000, news_items()))
            .with_source("social", canned(1, social_items()));

        let envelope = skill.fetch_trends(&scenario_a_request()).await;
        let payload = envelope.body().unwrap();
        assert_eq!(payload.trends.len(), 1);
        assert_eq!(payload.trends[0].trend_id, "trend-456");
        assert_eq!(payload.diagnostics.degraded_sources, vec!["news"]);
    }

    #[tokio::test]
    async fn test_cancel_before_barrier_returns_cancelled() {
        let skill = TrendFetchSkill::new(SkillConfig::default())
            .with_source("news", canned(5_000, news_items()))
            .with_source("social", canned(1, social_items()));
        let (handle, cancel) = cancellation();
        let request = scenario_a_request();

        let fetch = skill.fetch_trends_with_cancel(&request, &cancel);
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (envelope, _) = tokio::join!(fetch, trigger);

        assert_eq!(envelope.status(), Status::Failure);
        assert_eq!(envelope.error().unwrap().error_kind, ErrorKind::Cancelled);
        assert_eq!(envelope.trace_id(), "trace-a");
    }

    #[tokio::test]
    async fn test_invalid_requests_fail_with_echo() {
        let mut request = scenario_a_request();
        request.planner_task_id = String::new();
        let envelope = skill().fetch_trends(&request).await;
        assert_eq!(envelope.error().unwrap().error_kind, ErrorKind::InvalidRequest);
        assert_eq!(envelope.planner_task_id(), "");

        let mut request = scenario_a_request();
        request.query.time_window = TimeWindow::new("2026-02-06T00:00:00Z", "2026-02-01T00:00:00Z");
        let envelope = skill().fetch_trends(&request).await;
        assert_eq!(envelope.error().unwrap().error_kind, ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_handle_raw_json() {
        let envelope = skill()
            .handle(&json!({
                "trace_id": "trace-json",
                "planner_task_id": "task-json",
                "platform": "twitter",
                "topics": [],
                "time_window": { "start": "2026-02-01T00:00:00Z", "end": "2026-02-06T00:00:00Z" },
                "signals": { "include_social": true }
            }))
            .await;
        assert!(envelope.is_success());
        assert_eq!(envelope.trace_id(), "trace-json");

        let envelope = skill()
            .handle(&json!({ "trace_id": "trace-bad", "planner_task_id": "task-bad" }))
            .await;
        assert_eq!(envelope.error().unwrap().error_kind, ErrorKind::InvalidRequest);
        assert_eq!(envelope.trace_id(), "trace-bad");
    }

    #[test]
    fn test_assemble_trend_response_checks_records() {
        let query = scenario_a_request().query;
        let record = TrendRecord {
            trend_id: "trend-123".to_string(),
            platform: "twitter".to_string(),
            topic: "#SolarThreads".to_string(),
            momentum_score: 0.82,
            volume: 15432,
            sentiment: 0.66,
            summary: "Solar fabrics".to_string(),
            source_citations: vec![SourceCitation {
                kind: "tweet".to_string(),
                url: "https://twitter.com/example".to_string(),
                captured_at: "2026-02-05T10:02:00Z".to_string(),
            }],
        };

        let envelope = assemble_trend_response("t", "p", &query, vec![record.clone()]);
        assert!(envelope.is_success());
        assert_eq!(envelope.body().unwrap().geo.as_deref(), Some("ET"));

        let mut bad = record;
        bad.source_citations[0].url = "ftp://twitter.com/example".to_string();
        let envelope = assemble_trend_response("t", "p", &query, vec![bad]);
        let error = envelope.error().unwrap();
        assert_eq!(error.error_kind, ErrorKind::SchemaViolation);
        assert!(error.message.contains("payload.trends[0].source_citations[0].url"));
    }
}
