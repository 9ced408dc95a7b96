//! # Skill Configuration
//!
//! Runtime knobs shared by the three skills. Defaults are usable as-is;
//! `from_env` overlays `CHIMERA_*` environment variables.

use crate::contract::artifacts::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default per-source fetch timeout
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 5_000;

/// Default per-artifact generation timeout
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 60_000;

/// Inline disclosure markers recognised in content
pub const DEFAULT_DISCLOSURE_PATTERN: &str =
    r"(?i)(#ad\b|#sponsored\b|#paidpartnership\b|\bai[- ]generated\b|\bpaid partnership\b)";

/// Inline wallet/commerce callouts recognised in content
pub const DEFAULT_WALLET_CALLOUT_PATTERN: &str = r"(?i)(\bwallet\b|\bshop now\b|\bbuy now\b|\blink in bio\b)";

/// Provider field aliases per canonical trend field
pub type FieldAliases = BTreeMap<String, Vec<String>>;

/// Configuration for the skill façades
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillConfig {
    /// Per-source timeout before its contribution is treated as empty
    pub source_timeout_ms: u64,
    /// Per-artifact generation timeout
    pub generation_timeout_ms: u64,
    /// Regex for inline disclosure markers
    pub disclosure_pattern: String,
    /// Regex for inline wallet/commerce callouts
    pub wallet_callout_pattern: String,
    /// Capability overrides (modality name -> capability)
    pub capabilities: BTreeMap<String, Capability>,
    /// Extra provider aliases, merged ahead of the built-in ones
    pub field_aliases: FieldAliases,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
            generation_timeout_ms: DEFAULT_GENERATION_TIMEOUT_MS,
            disclosure_pattern: DEFAULT_DISCLOSURE_PATTERN.to_string(),
            wallet_callout_pattern: DEFAULT_WALLET_CALLOUT_PATTERN.to_string(),
            capabilities: BTreeMap::new(),
            field_aliases: BTreeMap::new(),
        }
    }
}

impl SkillConfig {
    /// Defaults overlaid with environment variables. Unparseable values
    /// keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse("CHIMERA_SOURCE_TIMEOUT_MS") {
            config.source_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("CHIMERA_GENERATION_TIMEOUT_MS") {
            config.generation_timeout_ms = ms;
        }
        if let Ok(pattern) = std::env::var("CHIMERA_DISCLOSURE_PATTERN") {
            config.disclosure_pattern = pattern;
        }
        if let Ok(pattern) = std::env::var("CHIMERA_WALLET_CALLOUT_PATTERN") {
            config.wallet_callout_pattern = pattern;
        }

        config
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

fn env_parse(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable config value");
            None
        }
    }
}
