//! # vigil-config
//!
//! Configuration system for the Vigil governance engine. Reads from `vigil.toml`
//! and environment variables, in that precedence order. Every policy knob the
//! engine uses (confidence bounds, complexity table, intervention thresholds,
//! graduation criteria, cache sizing) lives here; nothing is hard-coded in the engine.

pub mod loader;
pub mod schema;
pub mod telemetry;

pub use loader::ConfigLoader;
pub use schema::GovernanceConfig;
pub use schema::{
    CacheConfig, ComplexityRule, ConfidenceBound, ConfidenceConfig, ConfigWarning, EventsConfig,
    GraduationConfig, LoggingConfig, PermissionConfig, TierThresholds, WarningSeverity,
};
pub use telemetry::init_tracing;
