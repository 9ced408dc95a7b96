//! # Chimera Core
//!
//! Contract and decision core for the Chimera content pipeline: the
//! envelope every skill answers with, trend normalization, guardrail
//! enforcement, and the policy composer behind content validation.
//!
//! ## Architecture
//!
//! - `contract/` - Wire types, envelope codec, JSON Schema exports
//! - `tools/` - Deterministic components (normalizer, guardrails, policy)
//! - `skills/` - Planner-facing façades and collaborator traits
//! - `swarm/` - Scatter/gather with timeouts and cancellation
//! - `config` - Runtime knobs with environment overrides
//! - `error` - Stable error kinds
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chimera_core::{SkillConfig, TrendFetchSkill};
//!
//! let skill = TrendFetchSkill::new(SkillConfig::from_env())
//!     .with_source("news", news_feed);
//! let envelope = skill.fetch_trends(&request).await;
//! let wire = envelope.encode()?;
//! ```

pub mod config;
pub mod contract;
pub mod error;
pub mod skills;
pub mod swarm;
pub mod tools;

pub use config::SkillConfig;
pub use contract::{decode, Envelope, Payload, Status};
pub use error::{ContractError, ContractResult, ErrorKind};
pub use skills::{
    assemble_trend_response, ContentGenerator, GenerationSkill, TrendFetchSkill, TrendSource,
    ValidationSkill,
};
