//! # Adaptive Core - Core Library
//!
//! Threat-learning and analytics core shared by the detection layers of a
//! larger shield deployment (sentinel, wallet guard, qwg, ...).
//!
//! The core does two things:
//! - **Reinforce.** Human-classified feedback on past incidents nudges
//!   per-layer trust weights and a global alert threshold by small fixed
//!   steps, clamped to safe ranges after every batch.
//! - **Remember.** Threat reports from every layer are kept in a bounded,
//!   disk-persisted history and analysed with windowed statistics (spikes,
//!   type diversity, correlations, time trends).
//!
//! ## Design Philosophy
//! - No gradient descent, no models. Fixed steps plus clamping.
//! - Every buffer is bounded and evicts eagerly on insert.
//! - Analytics are read-only. Nothing that reads the history can change it.
//! - Single writer. Callers sharing an engine serialize access themselves.

pub mod analytics;
pub mod learning;
pub mod pattern;
pub mod store;
pub mod threat;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use analytics::trends::TrendBucket;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for the adaptive core.
#[derive(Error, Debug)]
pub enum AdaptiveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp format: {0:?}")]
    InvalidTimestamp(String),

    #[error("correlation_id must be a non-empty string when provided")]
    InvalidCorrelationId,

    #[error("severity must be an int-like value, got {0}")]
    InvalidSeverity(String),

    #[error("metadata must be a mapping when provided, got {0}")]
    InvalidMetadata(String),

    #[error("Malformed threat packet: {0}")]
    InvalidPacket(String),

    #[error("Unsupported trend bucket: {0:?} (expected \"hour\" or \"day\")")]
    InvalidBucket(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type AdaptiveResult<T> = Result<T, AdaptiveError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Top-level configuration for the adaptive core.
///
/// Loaded from `adaptive-core.toml` in the working directory or a path
/// supplied via CLI flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Persistent threat history settings.
    pub threat_memory: ThreatMemoryConfig,

    /// Rolling event/snapshot buffer capacities.
    pub store: StoreConfig,

    /// Reinforcement pass settings.
    pub learning: LearningConfig,

    /// Deep pattern engine windows.
    pub pattern: PatternConfig,

    /// Defaults for the composed immune report.
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatMemoryConfig {
    /// JSON file holding the persisted packet list.
    pub path: PathBuf,

    /// Hard cap on retained packets. Oldest are evicted first.
    /// Zero means the memory never holds anything.
    pub max_packets: usize,

    /// When false the threat memory never touches disk.
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity of the RiskEvent ring buffer.
    pub max_events: usize,

    /// Capacity of the AdaptiveState snapshot ring buffer.
    pub max_snapshots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Whether feedback deltas are applied at start-up.
    pub enabled: bool,

    /// Capture a state snapshot after every applied reinforcement pass.
    pub snapshot_every_pass: bool,

    /// Where the CLI keeps the learned AdaptiveState between runs.
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Number of most recent packets treated as "now".
    pub short_window: usize,

    /// Number of most recent packets treated as the baseline.
    pub long_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Packets below this severity are ignored by every analytic.
    pub min_severity: u8,

    /// How many of the latest packets to list in the report.
    pub last_n: usize,

    /// Recent window used for rising-pattern detection.
    pub pattern_window: usize,

    /// Time bucket for trend detection.
    pub trend_bucket: TrendBucket,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            threat_memory: ThreatMemoryConfig {
                path: PathBuf::from(threat::memory::DEFAULT_MEMORY_PATH),
                max_packets: threat::memory::DEFAULT_MAX_PACKETS,
                persist: true,
            },
            store: StoreConfig {
                max_events: store::DEFAULT_MAX_EVENTS,
                max_snapshots: store::DEFAULT_MAX_SNAPSHOTS,
            },
            learning: LearningConfig {
                enabled: true,
                snapshot_every_pass: true,
                state_file: PathBuf::from("adaptive_state.json"),
            },
            pattern: PatternConfig {
                short_window: pattern::DEFAULT_SHORT_WINDOW,
                long_window: pattern::DEFAULT_LONG_WINDOW,
            },
            report: ReportConfig {
                min_severity: 0,
                last_n: 10,
                pattern_window: 50,
                trend_bucket: TrendBucket::Day,
            },
        }
    }
}

impl AdaptiveConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> AdaptiveResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AdaptiveConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write the default configuration to a TOML file.
    pub fn write_default(path: &Path) -> AdaptiveResult<()> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| AdaptiveError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Core Types
// ---------------------------------------------------------------------------

/// Lower bound for any layer weight after a reinforcement pass.
pub const WEIGHT_MIN: f64 = 0.1;
/// Upper bound for any layer weight after a reinforcement pass.
pub const WEIGHT_MAX: f64 = 5.0;
/// Lower bound for the global threshold after a reinforcement pass.
pub const THRESHOLD_MIN: f64 = 0.1;
/// Upper bound for the global threshold after a reinforcement pass.
pub const THRESHOLD_MAX: f64 = 0.9;
/// Weight given to a layer the first time it is seen.
pub const NEUTRAL_WEIGHT: f64 = 1.0;
/// Starting global threshold.
pub const DEFAULT_GLOBAL_THRESHOLD: f64 = 0.5;

/// How an incident was classified after the fact.
///
/// This is what drives reinforcement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// Real attack, the detection was correct.
    TruePositive,

    /// Benign activity flagged as risky.
    FalsePositive,

    /// Attack confirmed but the shield did not react enough.
    MissedAttack,

    /// No clear feedback yet. Never moves anything.
    #[default]
    Unknown,
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackType::TruePositive => write!(f, "true_positive"),
            FeedbackType::FalsePositive => write!(f, "false_positive"),
            FeedbackType::MissedAttack => write!(f, "missed_attack"),
            FeedbackType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single incident observed by a shield layer.
///
/// The layer name is an open vocabulary: new detection layers show up
/// without a schema change.
///
/// Deserialized events go through the same clamp as [`RiskEvent::new`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawRiskEvent")]
pub struct RiskEvent {
    /// Identifier assigned by the reporting layer.
    pub event_id: String,

    /// Reporting layer, e.g. "sentinel", "wallet", "qwg".
    pub layer: String,

    /// Risk value in [0.0, 1.0].
    pub risk_score: f64,

    /// Free-form label such as "normal", "elevated", "critical".
    pub risk_level: String,

    /// Hash or pattern identifier, if the layer computed one.
    pub fingerprint: Option<String>,

    /// When the incident was observed.
    pub created_at: DateTime<Utc>,

    /// Post-hoc classification.
    pub feedback: FeedbackType,
}

/// Wire shape of a RiskEvent before the score is clamped.
#[derive(Deserialize)]
struct RawRiskEvent {
    event_id: String,
    layer: String,
    risk_score: f64,
    risk_level: String,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    feedback: FeedbackType,
}

impl From<RawRiskEvent> for RiskEvent {
    fn from(raw: RawRiskEvent) -> Self {
        Self {
            event_id: raw.event_id,
            layer: raw.layer,
            risk_score: raw.risk_score.clamp(0.0, 1.0),
            risk_level: raw.risk_level,
            fingerprint: raw.fingerprint,
            created_at: raw.created_at,
            feedback: raw.feedback,
        }
    }
}

impl RiskEvent {
    /// Create a new event with `Unknown` feedback, clamping the risk score
    /// to [0.0, 1.0].
    pub fn new(
        event_id: impl Into<String>,
        layer: impl Into<String>,
        risk_score: f64,
        risk_level: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            layer: layer.into(),
            risk_score: risk_score.clamp(0.0, 1.0),
            risk_level: risk_level.into(),
            fingerprint: None,
            created_at: Utc::now(),
            feedback: FeedbackType::Unknown,
        }
    }

    pub fn with_feedback(mut self, feedback: FeedbackType) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// The current adaptive parameters.
///
/// After every reinforcement pass each weight lies in
/// [`WEIGHT_MIN`, `WEIGHT_MAX`] and the threshold in
/// [`THRESHOLD_MIN`, `THRESHOLD_MAX`]. Mid-batch values may leave those
/// ranges; only the end-of-batch clamp restores them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveState {
    /// Trust weight per layer.
    pub layer_weights: BTreeMap<String, f64>,

    /// Base alert threshold in the 0-1 risk range.
    pub global_threshold: f64,

    /// When the state last went through an applied reinforcement pass.
    pub last_updated: DateTime<Utc>,
}

impl Default for AdaptiveState {
    fn default() -> Self {
        Self {
            layer_weights: BTreeMap::new(),
            global_threshold: DEFAULT_GLOBAL_THRESHOLD,
            last_updated: Utc::now(),
        }
    }
}

impl AdaptiveState {
    /// Weights divided by their sum. A zero sum divides by 1.0 instead.
    pub fn normalised_weights(&self) -> BTreeMap<String, f64> {
        let sum: f64 = self.layer_weights.values().sum();
        let total = if sum == 0.0 { 1.0 } else { sum };
        self.layer_weights
            .iter()
            .map(|(layer, w)| (layer.clone(), w / total))
            .collect()
    }

    /// Pull every weight and the threshold back into their safe ranges.
    pub fn clamp_to_bounds(&mut self) {
        for w in self.layer_weights.values_mut() {
            *w = w.clamp(WEIGHT_MIN, WEIGHT_MAX);
        }
        self.global_threshold = self.global_threshold.clamp(THRESHOLD_MIN, THRESHOLD_MAX);
    }

    /// True when every weight and the threshold are inside their ranges.
    pub fn within_bounds(&self) -> bool {
        self.layer_weights
            .values()
            .all(|w| (WEIGHT_MIN..=WEIGHT_MAX).contains(w))
            && (THRESHOLD_MIN..=THRESHOLD_MAX).contains(&self.global_threshold)
    }

    /// Save the state to a JSON file.
    pub fn save(&self, path: &Path) -> AdaptiveResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load state from a JSON file.
    pub fn load(path: &Path) -> AdaptiveResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let state: AdaptiveState = serde_json::from_str(&json)?;
        Ok(state)
    }
}

/// Net change applied to one layer over a single batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayerAdjustment {
    /// Positive means "trust this layer more".
    pub weight_delta: f64,

    /// Positive means "tighten thresholds".
    pub threshold_shift: f64,

    pub notes: Option<String>,
}

/// Outcome of one reinforcement pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveUpdateResult {
    /// Independent copy of the post-update state.
    pub state: AdaptiveState,

    /// Net adjustment for every layer known at the end of the batch.
    pub per_layer: BTreeMap<String, LayerAdjustment>,

    /// Event ids in input order.
    pub processed_events: Vec<String>,
}

/// A point-in-time copy of an AdaptiveState.
///
/// Holds its own copy, so mutating the live state never rewrites history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub taken_at: DateTime<Utc>,
    pub state: AdaptiveState,
}

impl StateSnapshot {
    pub fn capture(state: &AdaptiveState) -> Self {
        Self {
            taken_at: Utc::now(),
            state: state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalised_weights_sum_to_one() {
        let mut state = AdaptiveState::default();
        state.layer_weights.insert("sentinel".to_string(), 1.0);
        state.layer_weights.insert("wallet".to_string(), 3.0);

        let norm = state.normalised_weights();
        assert!((norm["sentinel"] - 0.25).abs() < 1e-12);
        assert!((norm["wallet"] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_normalised_weights_empty_is_empty() {
        let state = AdaptiveState::default();
        assert!(state.normalised_weights().is_empty());
    }

    #[test]
    fn test_clamp_to_bounds() {
        let mut state = AdaptiveState::default();
        state.layer_weights.insert("low".to_string(), -2.0);
        state.layer_weights.insert("high".to_string(), 9.0);
        state.global_threshold = 1.4;
        assert!(!state.within_bounds());

        state.clamp_to_bounds();
        assert_eq!(state.layer_weights["low"], WEIGHT_MIN);
        assert_eq!(state.layer_weights["high"], WEIGHT_MAX);
        assert_eq!(state.global_threshold, THRESHOLD_MAX);
        assert!(state.within_bounds());
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut state = AdaptiveState::default();
        state.layer_weights.insert("qwg".to_string(), 1.0);

        let snap = StateSnapshot::capture(&state);
        state.layer_weights.insert("qwg".to_string(), 4.0);
        state.global_threshold = 0.8;

        assert_eq!(snap.state.layer_weights["qwg"], 1.0);
        assert_eq!(snap.state.global_threshold, DEFAULT_GLOBAL_THRESHOLD);
    }

    #[test]
    fn test_risk_event_defaults_and_clamp() {
        let e = RiskEvent::new("e1", "sentinel", 1.7, "critical");
        assert_eq!(e.risk_score, 1.0);
        assert_eq!(e.feedback, FeedbackType::Unknown);
        assert!(e.fingerprint.is_none());
    }

    #[test]
    fn test_risk_event_deserialize_defaults() {
        let json = r#"{"event_id":"7","layer":"wallet","risk_score":0.4,"risk_level":"elevated"}"#;
        let e: RiskEvent = serde_json::from_str(json).unwrap();
        assert_eq!(e.feedback, FeedbackType::Unknown);

        let json = r#"{"event_id":"8","layer":"wallet","risk_score":0.4,"risk_level":"elevated","feedback":"missed_attack"}"#;
        let e: RiskEvent = serde_json::from_str(json).unwrap();
        assert_eq!(e.feedback, FeedbackType::MissedAttack);
    }

    #[test]
    fn test_risk_event_deserialize_clamps_score() {
        let json = r#"{"event_id":"9","layer":"qwg","risk_score":7.5,"risk_level":"critical"}"#;
        let e: RiskEvent = serde_json::from_str(json).unwrap();
        assert_eq!(e.risk_score, 1.0);
        let built = RiskEvent::new("9", "qwg", 7.5, "critical").at(e.created_at);
        assert_eq!(e, built);

        let json = r#"{"event_id":"10","layer":"qwg","risk_score":-0.3,"risk_level":"normal"}"#;
        let e: RiskEvent = serde_json::from_str(json).unwrap();
        assert_eq!(e.risk_score, 0.0);
    }

    #[test]
    fn test_state_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = AdaptiveState::default();
        state.layer_weights.insert("adn".to_string(), 1.35);
        state.global_threshold = 0.62;
        state.save(&path).unwrap();

        let loaded = AdaptiveState::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_default_config_toml_roundtrip() {
        let config = AdaptiveConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AdaptiveConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.threat_memory.max_packets, 10_000);
        assert_eq!(parsed.store.max_events, 5000);
        assert_eq!(parsed.store.max_snapshots, 500);
        assert_eq!(parsed.report.trend_bucket, TrendBucket::Day);
        assert_eq!(parsed.threat_memory.path, PathBuf::from("threat_memory.json"));
    }
}
