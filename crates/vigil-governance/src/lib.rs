//! # vigil-governance
//!
//! The governance engine. Validates per-tier confidence, gates actions by
//! complexity and intervention history, scores graduation readiness, and fronts
//! permission decisions with a sharded TTL + LRU cache that coalesces concurrent
//! misses and never outlives a tier change.

pub mod cache;
pub mod clock;
pub mod confidence;
pub mod graduation;
pub mod locks;
pub mod permission;
pub mod service;
mod singleflight;

pub use cache::{spawn_sweeper, CacheEntry, CacheKey, CacheStats, GovernanceCache, Lookup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use confidence::{ConfidenceCheck, ConfidenceScorer};
pub use graduation::GraduationEvaluator;
pub use locks::AgentLocks;
pub use permission::{PermissionGate, PermissionPolicy};
pub use service::{GovernanceService, GovernanceServiceBuilder};

/// Canonical form of identifiers used in cache keys, locks, and the tier ledger.
pub fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}
