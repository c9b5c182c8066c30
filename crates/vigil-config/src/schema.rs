use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_core::{Complexity, GraduationCriteria, Tier};

/// Root configuration, maps to `vigil.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub confidence: ConfidenceConfig,
    pub permission: PermissionConfig,
    pub graduation: GraduationConfig,
    pub cache: CacheConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

// ── Confidence ─────────────────────────────────────────────────

/// Closed interval `[min, max]`, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBound {
    pub min: f64,
    pub max: f64,
}

impl ConfidenceBound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-tier confidence bounds. Adjacent tiers share their boundary value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub student: ConfidenceBound,
    pub intern: ConfidenceBound,
    pub supervised: ConfidenceBound,
    pub autonomous: ConfidenceBound,
}

impl ConfidenceConfig {
    pub fn bound(&self, tier: Tier) -> ConfidenceBound {
        match tier {
            Tier::Student => self.student,
            Tier::Intern => self.intern,
            Tier::Supervised => self.supervised,
            Tier::Autonomous => self.autonomous,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            student: ConfidenceBound::new(0.0, 0.5),
            intern: ConfidenceBound::new(0.5, 0.7),
            supervised: ConfidenceBound::new(0.7, 0.9),
            autonomous: ConfidenceBound::new(0.9, 1.0),
        }
    }
}

// ── Permission ─────────────────────────────────────────────────

/// One row of the complexity → minimum tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityRule {
    pub level: u8,
    pub min_tier: Tier,
}

/// Optional per-tier upper bound. A missing entry means "no limit".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub student: Option<f64>,
    pub intern: Option<f64>,
    pub supervised: Option<f64>,
    pub autonomous: Option<f64>,
}

impl TierThresholds {
    pub fn get(&self, tier: Tier) -> Option<f64> {
        match tier {
            Tier::Student => self.student,
            Tier::Intern => self.intern,
            Tier::Supervised => self.supervised,
            Tier::Autonomous => self.autonomous,
        }
    }

    fn entries(&self) -> [(Tier, Option<f64>); 4] {
        Tier::ALL.map(|t| (t, self.get(t)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Complexity → minimum tier. Levels outside the table are unknown actions.
    pub complexity: Vec<ComplexityRule>,
    /// Maximum intervention rate allowed at each tier (exclusive: a rate equal
    /// to the limit is denied).
    pub max_intervention_rate: TierThresholds,
}

impl PermissionConfig {
    pub fn min_tier_for(&self, complexity: Complexity) -> Option<Tier> {
        self.complexity
            .iter()
            .find(|rule| rule.level == complexity.get())
            .map(|rule| rule.min_tier)
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            complexity: vec![
                ComplexityRule { level: 1, min_tier: Tier::Student },
                ComplexityRule { level: 2, min_tier: Tier::Intern },
                ComplexityRule { level: 3, min_tier: Tier::Supervised },
                ComplexityRule { level: 4, min_tier: Tier::Autonomous },
            ],
            max_intervention_rate: TierThresholds {
                student: None,
                intern: Some(0.5),
                supervised: Some(0.3),
                autonomous: Some(0.2),
            },
        }
    }
}

// ── Graduation ─────────────────────────────────────────────────

/// Criteria keyed by the tier being graduated *into*. Student is never a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraduationConfig {
    pub intern: Option<GraduationCriteria>,
    pub supervised: Option<GraduationCriteria>,
    pub autonomous: Option<GraduationCriteria>,
}

impl GraduationConfig {
    pub fn criteria_for(&self, target: Tier) -> Option<&GraduationCriteria> {
        match target {
            Tier::Student => None,
            Tier::Intern => self.intern.as_ref(),
            Tier::Supervised => self.supervised.as_ref(),
            Tier::Autonomous => self.autonomous.as_ref(),
        }
    }

    fn entries(&self) -> [(Tier, Option<&GraduationCriteria>); 3] {
        [
            (Tier::Intern, self.intern.as_ref()),
            (Tier::Supervised, self.supervised.as_ref()),
            (Tier::Autonomous, self.autonomous.as_ref()),
        ]
    }
}

impl Default for GraduationConfig {
    fn default() -> Self {
        Self {
            intern: Some(GraduationCriteria::new(10, 0.5).with_min_behavior_score(0.70)),
            supervised: Some(GraduationCriteria::new(25, 0.2).with_min_behavior_score(0.85)),
            autonomous: Some(GraduationCriteria::new(50, 0.0).with_min_behavior_score(0.95)),
        }
    }
}

// ── Cache ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached decision in seconds.
    pub ttl_secs: u64,
    /// Maximum number of cached decisions across all shards.
    pub capacity: usize,
    /// Number of independently locked shards (entries are sharded by agent).
    pub shards: usize,
    /// How long a caller waits on another caller's in-flight computation
    /// before recomputing itself.
    pub inflight_wait_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn inflight_wait(&self) -> Duration {
        Duration::from_millis(self.inflight_wait_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            capacity: 10_000,
            shards: 16,
            inflight_wait_ms: 250,
        }
    }
}

// ── Events ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Audit broadcast buffer; slow subscribers lag past this many events.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

fn is_unit(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

impl GovernanceConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Confidence bounds ───
        for tier in Tier::ALL {
            let bound = self.confidence.bound(tier);
            if !is_unit(bound.min) || !is_unit(bound.max) || bound.min > bound.max {
                warnings.push(ConfigWarning {
                    field: format!("confidence.{}", tier.as_str()),
                    message: format!("bound [{}, {}] is invalid", bound.min, bound.max),
                    severity: WarningSeverity::Error,
                    hint: Some("Bounds must satisfy 0.0 <= min <= max <= 1.0".into()),
                });
            }
        }
        for pair in Tier::ALL.windows(2) {
            let (lower, upper) = (self.confidence.bound(pair[0]), self.confidence.bound(pair[1]));
            if upper.min < lower.max {
                warnings.push(ConfigWarning {
                    field: format!("confidence.{}", pair[1].as_str()),
                    message: format!(
                        "bound overlaps {} beyond the shared boundary",
                        pair[0].as_str()
                    ),
                    severity: WarningSeverity::Warning,
                    hint: Some("Adjacent tiers normally share exactly one boundary value".into()),
                });
            }
        }

        // ── Complexity table ───
        for (i, rule) in self.permission.complexity.iter().enumerate() {
            if Complexity::new(rule.level).is_none() {
                warnings.push(ConfigWarning {
                    field: format!("permission.complexity[{}].level", i),
                    message: format!("complexity {} is out of range", rule.level),
                    severity: WarningSeverity::Error,
                    hint: Some(format!(
                        "Valid levels: {}..={}",
                        Complexity::MIN,
                        Complexity::MAX
                    )),
                });
            }
            if self.permission.complexity[..i].iter().any(|r| r.level == rule.level) {
                warnings.push(ConfigWarning {
                    field: format!("permission.complexity[{}].level", i),
                    message: format!("complexity {} is listed more than once", rule.level),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }
        for level in Complexity::MIN..=Complexity::MAX {
            if !self.permission.complexity.iter().any(|r| r.level == level) {
                warnings.push(ConfigWarning {
                    field: "permission.complexity".into(),
                    message: format!("complexity {} has no minimum tier", level),
                    severity: WarningSeverity::Info,
                    hint: Some("Actions of this complexity will be denied as unknown".into()),
                });
            }
        }

        // ── Intervention thresholds ───
        for (tier, limit) in self.permission.max_intervention_rate.entries() {
            if let Some(limit) = limit {
                if !is_unit(limit) {
                    warnings.push(ConfigWarning {
                        field: format!("permission.max_intervention_rate.{}", tier.as_str()),
                        message: format!("threshold {} is out of range", limit),
                        severity: WarningSeverity::Error,
                        hint: Some("Intervention rates are fractions in [0.0, 1.0]".into()),
                    });
                } else if limit == 0.0 {
                    warnings.push(ConfigWarning {
                        field: format!("permission.max_intervention_rate.{}", tier.as_str()),
                        message: "threshold 0.0 denies every action at this tier".into(),
                        severity: WarningSeverity::Warning,
                        hint: None,
                    });
                }
            }
        }

        // ── Graduation criteria ───
        for (tier, criteria) in self.graduation.entries() {
            let Some(criteria) = criteria else {
                warnings.push(ConfigWarning {
                    field: format!("graduation.{}", tier.as_str()),
                    message: "no criteria, agents can never graduate into this tier".into(),
                    severity: WarningSeverity::Info,
                    hint: None,
                });
                continue;
            };
            let field = format!("graduation.{}", tier.as_str());
            if !is_unit(criteria.max_intervention_rate) {
                warnings.push(ConfigWarning {
                    field: format!("{}.max_intervention_rate", field),
                    message: format!("{} is out of range", criteria.max_intervention_rate),
                    severity: WarningSeverity::Error,
                    hint: Some("Intervention rates are fractions in [0.0, 1.0]".into()),
                });
            }
            if !(0.0..=100.0).contains(&criteria.promotion_threshold) {
                warnings.push(ConfigWarning {
                    field: format!("{}.promotion_threshold", field),
                    message: format!("{} is out of range", criteria.promotion_threshold),
                    severity: WarningSeverity::Error,
                    hint: Some("Readiness scores range 0-100. 70 is typical.".into()),
                });
            }
            if let Some(min) = criteria.min_behavior_score {
                if !is_unit(min) {
                    warnings.push(ConfigWarning {
                        field: format!("{}.min_behavior_score", field),
                        message: format!("{} is out of range", min),
                        severity: WarningSeverity::Error,
                        hint: Some("Behavior scores are fractions in [0.0, 1.0]".into()),
                    });
                }
            }
            if criteria.min_episodes == 0 {
                warnings.push(ConfigWarning {
                    field: format!("{}.min_episodes", field),
                    message: "min_episodes is 0, episode history is ignored".into(),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
        }

        // ── Cache ───
        if self.cache.capacity == 0 {
            warnings.push(ConfigWarning {
                field: "cache.capacity".into(),
                message: "capacity is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10000".into()),
            });
        }
        if self.cache.shards == 0 {
            warnings.push(ConfigWarning {
                field: "cache.shards".into(),
                message: "shards is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 16".into()),
            });
        } else if self.cache.shards > self.cache.capacity {
            warnings.push(ConfigWarning {
                field: "cache.shards".into(),
                message: format!(
                    "{} shards for capacity {}, each shard holds at most one entry",
                    self.cache.shards, self.cache.capacity
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.cache.ttl_secs == 0 {
            warnings.push(ConfigWarning {
                field: "cache.ttl_secs".into(),
                message: "ttl is 0, every decision is recomputed".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Events ───
        if self.events.capacity == 0 {
            warnings.push(ConfigWarning {
                field: "events.capacity".into(),
                message: "capacity is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 4096".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
