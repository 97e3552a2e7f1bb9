//! # Reinforcement Engine
//!
//! The adaptive engine owns the live [`AdaptiveState`] and turns feedback on
//! past incidents into small, bounded changes to it.
//!
//! ## Update Rules
//!
//! | Feedback         | Layer weight                       | Global threshold |
//! |------------------|------------------------------------|------------------|
//! | `TruePositive`   | +0.05 (reporting layer)            | +0.01            |
//! | `FalsePositive`  | -0.05 (reporting layer)            | -0.01            |
//! | `MissedAttack`   | +0.02 (every layer known so far)   | +0.02            |
//! | `Unknown`        | none                               | none             |
//!
//! Deltas accumulate across the whole batch and a single clamp at the end
//! brings weights back into [0.1, 5.0] and the threshold into [0.1, 0.9].
//! Values may leave those ranges mid-batch.
//!
//! The engine also owns the threat memory that every shield layer reports
//! into, and exposes the read-only analytics over it.

pub mod control;

use std::collections::BTreeMap;

use chrono::Utc;

use crate::analytics::{
    self, CorrelationReport, ImmuneReport, PatternReport, ReportOptions, ThreatAnalysis,
    TrendBucket, TrendReport,
};
use crate::pattern::{DeepPatternEngine, PatternAnalysis};
use crate::store::AdaptiveStore;
use crate::threat::memory::DEFAULT_MAX_PACKETS;
use crate::threat::{ThreatMemory, ThreatPacket};
use crate::{
    AdaptiveConfig, AdaptiveResult, AdaptiveState, AdaptiveUpdateResult, FeedbackType,
    LayerAdjustment, RiskEvent, StateSnapshot, NEUTRAL_WEIGHT,
};
use control::LearningControl;

const TRUE_POSITIVE_WEIGHT: f64 = 0.05;
const TRUE_POSITIVE_THRESHOLD: f64 = 0.01;
const FALSE_POSITIVE_WEIGHT: f64 = -0.05;
const FALSE_POSITIVE_THRESHOLD: f64 = -0.01;
const MISSED_ATTACK_WEIGHT: f64 = 0.02;
const MISSED_ATTACK_THRESHOLD: f64 = 0.02;

/// Reinforcement engine plus the threat history it learns alongside.
///
/// Single writer: callers sharing one engine must serialize access.
pub struct AdaptiveEngine {
    /// Rolling history of raw events and state snapshots.
    store: AdaptiveStore,

    /// The live adaptive parameters. Only this engine mutates them.
    state: AdaptiveState,

    /// Packets reported by the shield layers.
    threat_memory: ThreatMemory,

    /// Windowed spike/diversity scanner over `threat_memory`.
    pattern_engine: DeepPatternEngine,

    /// Defaults for `generate_immune_report`.
    report_options: ReportOptions,

    /// Runtime pause/resume for feedback deltas.
    learning_control: LearningControl,

    /// Capture a snapshot after every applied pass.
    snapshot_every_pass: bool,
}

impl AdaptiveEngine {
    /// An engine with default capacities and an in-memory threat history.
    ///
    /// Performs no disk I/O at all.
    pub fn new() -> Self {
        Self {
            store: AdaptiveStore::new(),
            state: AdaptiveState::default(),
            threat_memory: ThreatMemory::in_memory(DEFAULT_MAX_PACKETS),
            pattern_engine: DeepPatternEngine::default(),
            report_options: ReportOptions::default(),
            learning_control: LearningControl::new(),
            snapshot_every_pass: true,
        }
    }

    /// Build an engine from configuration, loading the persisted threat
    /// history when persistence is enabled. A missing or corrupt history
    /// file yields an empty memory, never an error.
    pub fn from_config(config: &AdaptiveConfig) -> Self {
        let threat_memory = if config.threat_memory.persist {
            let mut memory =
                ThreatMemory::new(&config.threat_memory.path, config.threat_memory.max_packets);
            memory.load();
            memory
        } else {
            ThreatMemory::in_memory(config.threat_memory.max_packets)
        };

        let mut learning_control = LearningControl::new();
        if !config.learning.enabled {
            learning_control.pause();
        }

        Self {
            store: AdaptiveStore::with_capacity(config.store.max_events, config.store.max_snapshots),
            state: AdaptiveState::default(),
            threat_memory,
            pattern_engine: DeepPatternEngine::new(
                config.pattern.short_window,
                config.pattern.long_window,
            ),
            report_options: ReportOptions::from(&config.report),
            learning_control,
            snapshot_every_pass: config.learning.snapshot_every_pass,
        }
    }

    /// Replace the starting state (e.g. one loaded from disk).
    pub fn with_state(mut self, state: AdaptiveState) -> Self {
        self.state = state;
        self
    }

    pub fn with_threat_memory(mut self, memory: ThreatMemory) -> Self {
        self.threat_memory = memory;
        self
    }

    pub fn with_store(mut self, store: AdaptiveStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_pattern_engine(mut self, engine: DeepPatternEngine) -> Self {
        self.pattern_engine = engine;
        self
    }

    // -----------------------------------------------------------------------
    // Reinforcement
    // -----------------------------------------------------------------------

    /// Keep events for statistics and give every unseen layer a neutral
    /// weight. Known layers are left alone.
    pub fn record_events<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = RiskEvent>,
    {
        for event in events {
            self.seed_layer(&event.layer);
            self.store.add_event(event);
        }
    }

    /// Run one reinforcement pass over `events`.
    ///
    /// Unseen layers are seeded at neutral weight first. Feedback deltas are
    /// accumulated per layer, then the state is clamped once. The returned
    /// state is a copy: later passes do not change it.
    pub fn apply_learning(&mut self, events: &[RiskEvent]) -> AdaptiveUpdateResult {
        let apply = self.learning_control.begin_pass();

        let mut per_layer: BTreeMap<String, LayerAdjustment> = self
            .state
            .layer_weights
            .keys()
            .map(|layer| (layer.clone(), LayerAdjustment::default()))
            .collect();

        for event in events {
            self.apply_single_event(event, &mut per_layer, apply);
        }

        self.state.clamp_to_bounds();

        if apply {
            self.state.last_updated = Utc::now();
            if self.snapshot_every_pass {
                self.store.save_snapshot(&self.state);
            }
        } else {
            for adj in per_layer.values_mut() {
                adj.notes = Some("learning paused".to_string());
            }
        }

        log::info!(
            "[ADAPTIVE] Pass over {} events ({}): {} layers, threshold {:.3}",
            events.len(),
            if apply { "applied" } else { "paused" },
            self.state.layer_weights.len(),
            self.state.global_threshold
        );

        AdaptiveUpdateResult {
            state: self.state.clone(),
            per_layer,
            processed_events: events.iter().map(|e| e.event_id.clone()).collect(),
        }
    }

    fn seed_layer(&mut self, layer: &str) -> bool {
        if self.state.layer_weights.contains_key(layer) {
            return false;
        }
        log::debug!("[ADAPTIVE] New layer {:?} seeded at {}", layer, NEUTRAL_WEIGHT);
        self.state
            .layer_weights
            .insert(layer.to_string(), NEUTRAL_WEIGHT);
        true
    }

    fn apply_single_event(
        &mut self,
        event: &RiskEvent,
        per_layer: &mut BTreeMap<String, LayerAdjustment>,
        apply: bool,
    ) {
        if self.seed_layer(&event.layer) {
            per_layer.insert(event.layer.clone(), LayerAdjustment::default());
        }
        if !apply {
            return;
        }

        match event.feedback {
            FeedbackType::TruePositive => {
                self.shift_layer(&event.layer, TRUE_POSITIVE_WEIGHT, per_layer);
                self.shift_threshold(&event.layer, TRUE_POSITIVE_THRESHOLD, per_layer);
            }
            FeedbackType::FalsePositive => {
                self.shift_layer(&event.layer, FALSE_POSITIVE_WEIGHT, per_layer);
                self.shift_threshold(&event.layer, FALSE_POSITIVE_THRESHOLD, per_layer);
            }
            FeedbackType::MissedAttack => {
                // Only layers known right now; later arrivals start neutral.
                let layers: Vec<String> = self.state.layer_weights.keys().cloned().collect();
                for layer in &layers {
                    self.shift_layer(layer, MISSED_ATTACK_WEIGHT, per_layer);
                }
                self.state.global_threshold += MISSED_ATTACK_THRESHOLD;
            }
            FeedbackType::Unknown => {}
        }
    }

    fn shift_layer(
        &mut self,
        layer: &str,
        delta: f64,
        per_layer: &mut BTreeMap<String, LayerAdjustment>,
    ) {
        if let Some(w) = self.state.layer_weights.get_mut(layer) {
            *w += delta;
        }
        per_layer.entry(layer.to_string()).or_default().weight_delta += delta;
    }

    fn shift_threshold(
        &mut self,
        layer: &str,
        delta: f64,
        per_layer: &mut BTreeMap<String, LayerAdjustment>,
    ) {
        self.state.global_threshold += delta;
        per_layer.entry(layer.to_string()).or_default().threshold_shift += delta;
    }

    /// Store a copy of the current state in the snapshot buffer.
    pub fn snapshot_state(&mut self) -> Option<&StateSnapshot> {
        self.store.save_snapshot(&self.state)
    }

    // -----------------------------------------------------------------------
    // Threat intake and analytics
    // -----------------------------------------------------------------------

    /// Accept a packet from any shield layer and persist the history.
    ///
    /// Every call rewrites the history file when persistence is on.
    pub fn receive_threat_packet(&mut self, packet: ThreatPacket) -> AdaptiveResult<()> {
        log::debug!(
            "[ADAPTIVE] Packet {} from {} ({} sev {})",
            packet.correlation_id(),
            packet.source_layer(),
            packet.threat_type(),
            packet.severity()
        );
        self.threat_memory.add_packet(packet);
        if let Err(e) = self.threat_memory.save() {
            log::error!("[ADAPTIVE] Failed to save threat history: {}", e);
            return Err(e);
        }
        Ok(())
    }

    pub fn summarize_threats(&self, min_severity: u8) -> BTreeMap<String, usize> {
        analytics::summarize_threats(self.threat_memory.iter(), min_severity)
    }

    pub fn analyze_threats(&self, min_severity: u8, last_n: usize) -> ThreatAnalysis {
        analytics::analyze_threats(self.threat_memory.iter(), min_severity, last_n)
    }

    pub fn detect_threat_patterns(&self, min_severity: u8, window: usize) -> PatternReport {
        analytics::detect_threat_patterns(self.threat_memory.iter(), min_severity, window)
    }

    pub fn detect_threat_correlations(&self, min_severity: u8) -> CorrelationReport {
        analytics::detect_threat_correlations(self.threat_memory.iter(), min_severity)
    }

    pub fn detect_threat_trends(&self, min_severity: u8, bucket: TrendBucket) -> TrendReport {
        analytics::detect_threat_trends(self.threat_memory.iter(), min_severity, bucket)
    }

    pub fn deep_pattern_analysis(&self, min_severity: u8) -> PatternAnalysis {
        self.pattern_engine
            .analyze(self.threat_memory.iter(), min_severity)
    }

    /// Full report with the configured options.
    pub fn generate_immune_report(&self) -> ImmuneReport {
        self.generate_immune_report_with(&self.report_options)
    }

    pub fn generate_immune_report_with(&self, options: &ReportOptions) -> ImmuneReport {
        analytics::generate_immune_report(self.threat_memory.iter(), &self.pattern_engine, options)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &AdaptiveState {
        &self.state
    }

    pub fn store(&self) -> &AdaptiveStore {
        &self.store
    }

    pub fn threat_memory(&self) -> &ThreatMemory {
        &self.threat_memory
    }

    pub fn learning_control(&self) -> &LearningControl {
        &self.learning_control
    }

    /// Used by operators to pause or resume learning at runtime.
    pub fn learning_control_mut(&mut self) -> &mut LearningControl {
        &mut self.learning_control
    }
}

impl Default for AdaptiveEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{THRESHOLD_MAX, THRESHOLD_MIN, WEIGHT_MAX, WEIGHT_MIN};

    const EPS: f64 = 1e-9;

    fn ev(id: &str, layer: &str, feedback: FeedbackType) -> RiskEvent {
        RiskEvent::new(id, layer, 0.7, "high").with_feedback(feedback)
    }

    #[test]
    fn test_record_events_seeds_new_layers_only() {
        let mut engine = AdaptiveEngine::new();
        engine.record_events(vec![
            ev("1", "sentinel", FeedbackType::Unknown),
            ev("2", "wallet", FeedbackType::TruePositive),
        ]);
        assert_eq!(engine.state().layer_weights["sentinel"], 1.0);
        assert_eq!(engine.state().layer_weights["wallet"], 1.0);
        assert_eq!(engine.store().event_count(), 2);

        engine.apply_learning(&[ev("3", "sentinel", FeedbackType::TruePositive)]);
        engine.record_events(vec![ev("4", "sentinel", FeedbackType::Unknown)]);
        assert!((engine.state().layer_weights["sentinel"] - 1.05).abs() < EPS);
    }

    #[test]
    fn test_true_positive_rule() {
        let mut engine = AdaptiveEngine::new();
        let result = engine.apply_learning(&[ev("1", "sentinel", FeedbackType::TruePositive)]);

        assert!((result.state.layer_weights["sentinel"] - 1.05).abs() < EPS);
        assert!((result.state.global_threshold - 0.51).abs() < EPS);
        let adj = &result.per_layer["sentinel"];
        assert!((adj.weight_delta - 0.05).abs() < EPS);
        assert!((adj.threshold_shift - 0.01).abs() < EPS);
    }

    #[test]
    fn test_false_positive_rule() {
        let mut engine = AdaptiveEngine::new();
        let result = engine.apply_learning(&[ev("1", "qwg", FeedbackType::FalsePositive)]);

        assert!((result.state.layer_weights["qwg"] - 0.95).abs() < EPS);
        assert!((result.state.global_threshold - 0.49).abs() < EPS);
        assert!((result.per_layer["qwg"].weight_delta + 0.05).abs() < EPS);
    }

    #[test]
    fn test_true_and_false_positive_net_to_zero() {
        let mut engine = AdaptiveEngine::new();
        engine.record_events(vec![ev("0", "adn", FeedbackType::Unknown)]);
        let before = engine.state().clone();

        let result = engine.apply_learning(&[
            ev("1", "adn", FeedbackType::TruePositive),
            ev("2", "adn", FeedbackType::FalsePositive),
        ]);

        assert!((result.state.layer_weights["adn"] - before.layer_weights["adn"]).abs() < EPS);
        assert!((result.state.global_threshold - before.global_threshold).abs() < EPS);
        assert!(result.per_layer["adn"].weight_delta.abs() < EPS);
        assert!(result.per_layer["adn"].threshold_shift.abs() < EPS);
    }

    #[test]
    fn test_missed_attack_bumps_every_known_layer() {
        let mut engine = AdaptiveEngine::new();
        engine.record_events(vec![
            ev("0", "sentinel", FeedbackType::Unknown),
            ev("1", "wallet", FeedbackType::Unknown),
        ]);

        let result = engine.apply_learning(&[
            ev("2", "qwg", FeedbackType::MissedAttack),
            ev("3", "late", FeedbackType::Unknown),
        ]);

        for layer in ["sentinel", "wallet", "qwg"] {
            assert!((result.state.layer_weights[layer] - 1.02).abs() < EPS, "{}", layer);
            assert!((result.per_layer[layer].weight_delta - 0.02).abs() < EPS);
        }
        // seeded after the missed attack, so untouched
        assert_eq!(result.state.layer_weights["late"], 1.0);
        assert_eq!(result.per_layer["late"], LayerAdjustment::default());
        assert!((result.state.global_threshold - 0.52).abs() < EPS);
    }

    #[test]
    fn test_unknown_feedback_changes_nothing() {
        let mut engine = AdaptiveEngine::new();
        let result = engine.apply_learning(&[ev("1", "sentinel", FeedbackType::Unknown)]);
        assert_eq!(result.state.layer_weights["sentinel"], 1.0);
        assert_eq!(result.state.global_threshold, 0.5);
        assert_eq!(result.per_layer["sentinel"], LayerAdjustment::default());
    }

    #[test]
    fn test_clamping_after_long_batches() {
        let mut engine = AdaptiveEngine::new();

        let down: Vec<RiskEvent> = (0..200)
            .map(|i| ev(&i.to_string(), "noisy", FeedbackType::FalsePositive))
            .collect();
        let result = engine.apply_learning(&down);
        assert_eq!(result.state.layer_weights["noisy"], WEIGHT_MIN);
        assert_eq!(result.state.global_threshold, THRESHOLD_MIN);
        // the accumulated delta reflects the unclamped batch
        assert!((result.per_layer["noisy"].weight_delta + 10.0).abs() < 1e-6);

        let up: Vec<RiskEvent> = (0..500)
            .map(|i| ev(&i.to_string(), "sharp", FeedbackType::TruePositive))
            .chain((0..50).map(|i| ev(&format!("m{}", i), "sharp", FeedbackType::MissedAttack)))
            .collect();
        let result = engine.apply_learning(&up);
        assert_eq!(result.state.layer_weights["sharp"], WEIGHT_MAX);
        assert_eq!(result.state.global_threshold, THRESHOLD_MAX);
        assert!(result.state.within_bounds());
    }

    #[test]
    fn test_processed_ids_keep_input_order() {
        let mut engine = AdaptiveEngine::new();
        let events = vec![
            ev("c", "a", FeedbackType::Unknown),
            ev("a", "b", FeedbackType::TruePositive),
            ev("b", "a", FeedbackType::MissedAttack),
        ];
        let result = engine.apply_learning(&events);
        assert_eq!(result.processed_events, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_empty_batch_reports_known_layers() {
        let mut engine = AdaptiveEngine::new();
        engine.record_events(vec![ev("0", "sentinel", FeedbackType::Unknown)]);
        let result = engine.apply_learning(&[]);
        assert!(result.processed_events.is_empty());
        assert_eq!(result.per_layer.len(), 1);
    }

    #[test]
    fn test_result_state_is_a_copy() {
        let mut engine = AdaptiveEngine::new();
        let first = engine.apply_learning(&[ev("1", "sentinel", FeedbackType::TruePositive)]);
        engine.apply_learning(&[ev("2", "sentinel", FeedbackType::TruePositive)]);

        assert!((first.state.layer_weights["sentinel"] - 1.05).abs() < EPS);
        assert!((engine.state().layer_weights["sentinel"] - 1.10).abs() < EPS);
    }

    #[test]
    fn test_snapshot_every_applied_pass() {
        let mut engine = AdaptiveEngine::new();
        engine.apply_learning(&[ev("1", "sentinel", FeedbackType::TruePositive)]);
        engine.apply_learning(&[ev("2", "sentinel", FeedbackType::TruePositive)]);

        let snaps = engine.store().list_snapshots();
        assert_eq!(snaps.len(), 2);
        assert!((snaps[0].state.layer_weights["sentinel"] - 1.05).abs() < EPS);
        assert!((snaps[1].state.layer_weights["sentinel"] - 1.10).abs() < EPS);
    }

    #[test]
    fn test_paused_learning_freezes_state_but_seeds_layers() {
        let mut engine = AdaptiveEngine::new();
        engine.learning_control_mut().pause();

        let result = engine.apply_learning(&[
            ev("1", "sentinel", FeedbackType::TruePositive),
            ev("2", "wallet", FeedbackType::MissedAttack),
        ]);
        assert_eq!(result.state.layer_weights["sentinel"], 1.0);
        assert_eq!(result.state.layer_weights["wallet"], 1.0);
        assert_eq!(result.state.global_threshold, 0.5);
        assert_eq!(result.processed_events.len(), 2);
        assert_eq!(
            result.per_layer["sentinel"].notes.as_deref(),
            Some("learning paused")
        );
        assert!(engine.store().latest_snapshot().is_none());

        engine.learning_control_mut().resume();
        let result = engine.apply_learning(&[ev("3", "sentinel", FeedbackType::TruePositive)]);
        assert!((result.state.layer_weights["sentinel"] - 1.05).abs() < EPS);
        assert_eq!(engine.learning_control().status().passes_frozen, 1);
    }

    #[test]
    fn test_explicit_snapshot_is_independent() {
        let mut engine = AdaptiveEngine::new();
        engine.record_events(vec![ev("0", "sentinel", FeedbackType::Unknown)]);
        engine.snapshot_state();
        engine.apply_learning(&[ev("1", "sentinel", FeedbackType::FalsePositive)]);

        let first = engine.store().list_snapshots()[0];
        assert_eq!(first.state.layer_weights["sentinel"], 1.0);
    }

    #[test]
    fn test_legacy_timestamp_counted_in_trends() {
        let mut engine = AdaptiveEngine::new();
        let good = crate::threat::ThreatPacketDraft::new("sentinel_ai_v2", "TEST_GOOD", 5, "ok")
            .timestamp("2026-01-01T12:00:00")
            .build()
            .unwrap();
        let mut legacy =
            crate::threat::ThreatPacketDraft::new("sentinel_ai_v2", "TEST_BAD", 5, "legacy")
                .timestamp("2026-01-01T13:00:00")
                .build()
                .unwrap();
        legacy.set_unchecked_timestamp("not-a-timestamp");
        engine.receive_threat_packet(good).unwrap();
        engine.receive_threat_packet(legacy).unwrap();

        let trends = engine.detect_threat_trends(0, TrendBucket::Day);
        assert_eq!(trends.invalid_timestamp_count, 1);
        assert_eq!(trends.points.len(), 1);
        assert_eq!(trends.trend_direction, crate::analytics::TrendDirection::Unknown);
    }

    #[test]
    fn test_receive_packet_in_memory() {
        let mut engine = AdaptiveEngine::new();
        let packet = crate::threat::ThreatPacketDraft::new("sentinel", "reorg", 6, "reorg depth 4")
            .build()
            .unwrap();
        engine.receive_threat_packet(packet).unwrap();
        assert_eq!(engine.threat_memory().len(), 1);
        assert_eq!(engine.summarize_threats(0)["reorg"], 1);
        assert!(engine.summarize_threats(7).is_empty());
    }
}
