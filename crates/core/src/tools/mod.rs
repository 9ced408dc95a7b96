//! # Tools
//!
//! Deterministic components the skills delegate to. No I/O happens here
//! except through the injected policy stores.
//!
//! ## Modules
//!
//! - `normalizer` - Provider observations to canonical trend records
//! - `guardrails` - Plan conformance, banned topics, length, budget
//! - `policy` - Policy dimensions merged into a ternary verdict

pub mod guardrails;
pub mod normalizer;
pub mod policy;

pub use guardrails::GuardrailEnforcer;
pub use normalizer::{NormalizedTrends, RawObservation, TrendNormalizer};
pub use policy::{PolicyComposer, PolicyStore, ResolverRegistry, RuleCheck};
