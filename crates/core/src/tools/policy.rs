//! # Policy Composer
//!
//! Evaluates independent policy dimensions for one artifact and merges
//! them through the severity lattice into a ternary outcome.
//!
//! ## Dimensions (evaluation order)
//!
//! 1. Disclosure marker for the delivery geo (blocking)
//! 2. Regulatory references (blocking)
//! 3. Negative sentiment threshold (advisory)
//! 4. Wallet/commerce callout (advisory)
//! 5. Platform rules (blocking, named by rule id)
//! 6. Brand voice (advisory)
//!
//! External checks go through a [`ResolverRegistry`] that maps locator
//! schemes (`compliance://`, `platform://`, `filesystem://`) to injected
//! [`PolicyStore`]s. A reference nobody can resolve becomes an advisory
//! finding.
//!
//! `gather` performs the external calls; `compose` is a pure function of
//! its inputs.

use crate::config::SkillConfig;
use crate::contract::artifacts::Artifact;
use crate::contract::validation::{
    toggles, DeliveryTarget, Finding, PolicyBundle, RiskToggles, ValidationOutcome,
    ValidationResult,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Disclosure markers with this geo apply everywhere
pub const GLOBAL_GEO: &str = "global";

pub const RULE_DISCLOSURE: &str = "regulatory.disclosure";
pub const RULE_NEGATIVE_SENTIMENT: &str = "risk.negative_sentiment";
pub const RULE_WALLET_CALLOUT: &str = "risk.wallet_callout";
pub const RULE_BRAND_VOICE: &str = "brand.voice";

// ============================================================================
// Stores
// ============================================================================

/// Verdict from an external policy store. A failure lists each issue
/// found; every entry becomes its own finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCheck {
    Pass,
    Fail { details: Vec<String> },
}

impl RuleCheck {
    pub fn fail(detail: impl Into<String>) -> Self {
        Self::Fail {
            details: vec![detail.into()],
        }
    }

    pub fn fail_all<I, S>(details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fail {
            details: details.into_iter().map(Into::into).collect(),
        }
    }
}

/// External policy, brand, or platform-rule store
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Check `artifact` against the document or rule named by `reference`
    async fn check(
        &self,
        reference: &str,
        artifact: &Artifact,
        target: &DeliveryTarget,
    ) -> Result<RuleCheck>;
}

/// Outcome of one external check after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    /// One entry per issue, never empty
    Fail(Vec<String>),
    /// No store for the scheme, or the store errored
    Unresolved(String),
}

/// Scheme → store map
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    stores: HashMap<String, Arc<dyn PolicyStore>>,
    fallback: Option<Arc<dyn PolicyStore>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.stores.keys().collect();
        schemes.sort();
        f.debug_struct("ResolverRegistry")
            .field("schemes", &schemes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store for `scheme` (without `://`)
    pub fn with_store(mut self, scheme: impl Into<String>, store: Arc<dyn PolicyStore>) -> Self {
        self.stores.insert(scheme.into().to_ascii_lowercase(), store);
        self
    }

    /// Store for references without a scheme (bare rule ids)
    pub fn with_fallback(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.fallback = Some(store);
        self
    }

    /// Scheme prefix of a locator, if any
    pub fn scheme_of(reference: &str) -> Option<&str> {
        reference
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .filter(|s| !s.is_empty())
    }

    fn store_for(&self, reference: &str) -> Option<&Arc<dyn PolicyStore>> {
        match Self::scheme_of(reference) {
            Some(scheme) => self.stores.get(&scheme.to_ascii_lowercase()),
            None => self.fallback.as_ref(),
        }
    }

    /// Resolve and run one check; never fails
    pub async fn check(&self, reference: &str, artifact: &Artifact, target: &DeliveryTarget) -> CheckOutcome {
        let Some(store) = self.store_for(reference) else {
            tracing::warn!(reference, "No policy store registered for reference");
            return CheckOutcome::Unresolved(format!("no store registered for `{}`", reference));
        };
        match store.check(reference, artifact, target).await {
            Ok(RuleCheck::Pass) => CheckOutcome::Pass,
            Ok(RuleCheck::Fail { details }) if details.is_empty() => {
                CheckOutcome::Fail(vec![format!("`{}` failed without detail", reference)])
            }
            Ok(RuleCheck::Fail { details }) => CheckOutcome::Fail(details),
            Err(e) => {
                tracing::warn!(reference, error = %e, "Policy store check failed");
                CheckOutcome::Unresolved(format!("store error for `{}`: {}", reference, e))
            }
        }
    }
}

/// Results of every external check for one validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalChecks {
    pub regulatory: Vec<(String, CheckOutcome)>,
    pub platform: Vec<(String, CheckOutcome)>,
    pub brand_voice: Option<(String, CheckOutcome)>,
}

// ============================================================================
// Composer
// ============================================================================

/// Validation decision core
#[derive(Debug, Clone)]
pub struct PolicyComposer {
    disclosure: Regex,
    wallet_callout: Regex,
    registry: ResolverRegistry,
}

impl PolicyComposer {
    pub fn new(config: &SkillConfig, registry: ResolverRegistry) -> Result<Self> {
        let disclosure = Regex::new(&config.disclosure_pattern)
            .with_context(|| format!("Invalid disclosure pattern `{}`", config.disclosure_pattern))?;
        let wallet_callout = Regex::new(&config.wallet_callout_pattern).with_context(|| {
            format!("Invalid wallet callout pattern `{}`", config.wallet_callout_pattern)
        })?;
        Ok(Self {
            disclosure,
            wallet_callout,
            registry,
        })
    }

    /// Run every external check named by the bundle, in bundle order
    pub async fn gather(
        &self,
        bundle: &PolicyBundle,
        artifact: &Artifact,
        target: &DeliveryTarget,
    ) -> ExternalChecks {
        let mut checks = ExternalChecks::default();
        for reference in &bundle.regulatory_refs {
            let outcome = self.registry.check(reference, artifact, target).await;
            checks.regulatory.push((reference.clone(), outcome));
        }
        for rule in &bundle.platform_rules {
            let outcome = self.registry.check(rule, artifact, target).await;
            checks.platform.push((rule.clone(), outcome));
        }
        if let Some(reference) = &bundle.brand_voice_ref {
            let outcome = self.registry.check(reference, artifact, target).await;
            checks.brand_voice = Some((reference.clone(), outcome));
        }
        checks
    }

    /// Merge every dimension into a result. Pure.
    pub fn compose(
        &self,
        artifact: &Artifact,
        target: &DeliveryTarget,
        risk: &RiskToggles,
        checks: &ExternalChecks,
    ) -> ValidationResult {
        let mut findings = Vec::new();

        if risk.flag(toggles::REQUIRE_DISCLOSURE) && !self.has_disclosure(artifact, &target.geo) {
            findings.push(Finding::blocking(
                RULE_DISCLOSURE,
                format!("No disclosure marker for geo `{}`", target.geo),
            ));
        }

        for (reference, outcome) in &checks.regulatory {
            push_external(&mut findings, reference, outcome, |r, d| Finding::blocking(r, d));
        }

        if let (Some(threshold), Some(score)) =
            (risk.threshold(toggles::MAX_NEGATIVE_SENTIMENT), artifact.sentiment)
        {
            if score < -threshold {
                findings.push(Finding::advisory(
                    RULE_NEGATIVE_SENTIMENT,
                    format!("Sentiment {:.2} is below -{:.2}", score, threshold),
                ));
            }
        }

        if risk.flag(toggles::REQUIRE_WALLET_CALLOUT) && !self.has_wallet_callout(artifact) {
            findings.push(Finding::advisory(
                RULE_WALLET_CALLOUT,
                "No wallet or commerce callout present",
            ));
        }

        for (rule, outcome) in &checks.platform {
            push_external(&mut findings, rule, outcome, |r, d| Finding::blocking(r, d));
        }

        if let Some((reference, outcome)) = &checks.brand_voice {
            push_external(&mut findings, reference, outcome, |_, d| {
                Finding::advisory(RULE_BRAND_VOICE, d)
            });
        }

        let outcome = ValidationOutcome::from_findings(&findings);
        let reviewer_hint = (outcome == ValidationOutcome::NeedsReview).then(|| {
            let rules: Vec<&str> = findings.iter().map(|f| f.rule.as_str()).collect();
            format!("Review advisory findings: {}", rules.join(", "))
        });

        ValidationResult {
            artifact_id: artifact.artifact_id.clone(),
            validation_result: outcome,
            violations: findings,
            reviewer_hint,
        }
    }

    /// Gather then compose
    pub async fn validate(
        &self,
        artifact: &Artifact,
        bundle: &PolicyBundle,
        target: &DeliveryTarget,
        risk: &RiskToggles,
    ) -> ValidationResult {
        let checks = self.gather(bundle, artifact, target).await;
        let result = self.compose(artifact, target, risk, &checks);
        tracing::debug!(
            artifact_id = %result.artifact_id,
            outcome = ?result.validation_result,
            findings = result.violations.len(),
            "Composed validation result"
        );
        result
    }

    /// Geo-matched or global marker, or an inline marker in the content
    fn has_disclosure(&self, artifact: &Artifact, geo: &str) -> bool {
        artifact.disclosures.iter().any(|d| {
            !d.label.trim().is_empty()
                && (d.geo.eq_ignore_ascii_case(geo) || d.geo.eq_ignore_ascii_case(GLOBAL_GEO))
        }) || self.disclosure.is_match(&artifact.content)
    }

    /// The explicit flag wins over scanning
    fn has_wallet_callout(&self, artifact: &Artifact) -> bool {
        artifact
            .wallet_callout
            .unwrap_or_else(|| self.wallet_callout.is_match(&artifact.content))
    }
}

fn push_external(
    findings: &mut Vec<Finding>,
    reference: &str,
    outcome: &CheckOutcome,
    on_fail: impl Fn(&str, String) -> Finding,
) {
    match outcome {
        CheckOutcome::Pass => {}
        CheckOutcome::Fail(details) => {
            findings.extend(details.iter().map(|d| on_fail(reference, d.clone())))
        }
        CheckOutcome::Unresolved(detail) => {
            findings.push(Finding::advisory(reference, format!("unresolved: {}", detail)))
        }
    }
}
