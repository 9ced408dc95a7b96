//! # Collaborators
//!
//! Seams to the systems this crate does not implement: trend data
//! providers and the generative engine. Policy stores live with the
//! composer in [`crate::tools::policy::PolicyStore`].
//!
//! Implementations return `anyhow::Result`; the façades turn every error
//! into contract data, so nothing here can crash a call.

use crate::contract::artifacts::{Artifact, ArtifactPlanItem, TrendContext};
use crate::contract::trends::TrendQuery;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One provider for a signal category (news, social, commerce, ...)
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Raw, provider-shaped observations for `query`
    async fn fetch(&self, query: &TrendQuery) -> Result<Vec<Value>>;
}

/// The generative content engine
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce the artifact for one plan item
    async fn generate(
        &self,
        item: &ArtifactPlanItem,
        context: &TrendContext,
        persona_profile_ref: &str,
    ) -> Result<Artifact>;
}
