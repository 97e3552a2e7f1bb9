//! # Bounded Event Store
//!
//! Fixed-capacity ring buffers for the raw RiskEvents fed into the
//! reinforcement engine and for AdaptiveState snapshots.
//!
//! Capacity is enforced on every insert: once a buffer is full, pushing a
//! new entry evicts the oldest one. The memory ceiling never drifts.

use std::collections::{HashMap, VecDeque};

use crate::{AdaptiveState, FeedbackType, RiskEvent, StateSnapshot};

pub const DEFAULT_MAX_EVENTS: usize = 5000;
pub const DEFAULT_MAX_SNAPSHOTS: usize = 500;

/// Append-only ring buffer with FIFO eviction.
#[derive(Debug, Clone)]
struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }
}

/// In-memory store for reinforcement inputs and state history.
#[derive(Debug, Clone)]
pub struct AdaptiveStore {
    events: Ring<RiskEvent>,
    snapshots: Ring<StateSnapshot>,
}

impl AdaptiveStore {
    /// Create a store with the default capacities (5000 events, 500 snapshots).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS, DEFAULT_MAX_SNAPSHOTS)
    }

    pub fn with_capacity(max_events: usize, max_snapshots: usize) -> Self {
        Self {
            events: Ring::new(max_events),
            snapshots: Ring::new(max_snapshots),
        }
    }

    pub fn max_events(&self) -> usize {
        self.events.capacity
    }

    pub fn max_snapshots(&self) -> usize {
        self.snapshots.capacity
    }

    // -- events -------------------------------------------------------------

    pub fn add_event(&mut self, event: RiskEvent) {
        self.events.push(event);
    }

    /// All retained events, oldest first.
    pub fn list_events(&self) -> Vec<&RiskEvent> {
        self.events.items.iter().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.items.len()
    }

    /// The `limit` most recent events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<&RiskEvent> {
        let skip = self.events.items.len().saturating_sub(limit);
        self.events.items.iter().skip(skip).collect()
    }

    pub fn events_by_layer(&self, layer: &str) -> Vec<&RiskEvent> {
        self.events
            .items
            .iter()
            .filter(|e| e.layer == layer)
            .collect()
    }

    pub fn events_by_fingerprint(&self, fingerprint: &str) -> Vec<&RiskEvent> {
        self.events
            .items
            .iter()
            .filter(|e| e.fingerprint.as_deref() == Some(fingerprint))
            .collect()
    }

    /// How many retained events carry each feedback kind.
    pub fn feedback_stats(&self) -> HashMap<FeedbackType, usize> {
        let mut counts = HashMap::new();
        for e in &self.events.items {
            *counts.entry(e.feedback).or_insert(0) += 1;
        }
        counts
    }

    /// How many retained events each layer reported.
    pub fn layer_stats(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for e in &self.events.items {
            *counts.entry(e.layer.clone()).or_insert(0) += 1;
        }
        counts
    }

    // -- snapshots ----------------------------------------------------------

    /// Record a deep copy of `state`. Returns a reference to the stored copy,
    /// or `None` when the snapshot buffer has zero capacity.
    pub fn save_snapshot(&mut self, state: &AdaptiveState) -> Option<&StateSnapshot> {
        self.snapshots.push(StateSnapshot::capture(state));
        self.snapshots.items.back()
    }

    /// All retained snapshots, oldest first.
    pub fn list_snapshots(&self) -> Vec<&StateSnapshot> {
        self.snapshots.items.iter().collect()
    }

    pub fn latest_snapshot(&self) -> Option<&StateSnapshot> {
        self.snapshots.items.back()
    }
}

impl Default for AdaptiveStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: usize, layer: &str, feedback: FeedbackType) -> RiskEvent {
        RiskEvent::new(format!("evt-{}", id), layer, 0.5, "elevated").with_feedback(feedback)
    }

    #[test]
    fn test_event_ring_evicts_oldest() {
        let mut store = AdaptiveStore::with_capacity(3, 2);
        for i in 0..5 {
            store.add_event(event(i, "sentinel", FeedbackType::Unknown));
        }

        let ids: Vec<&str> = store.list_events().into_iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["evt-2", "evt-3", "evt-4"]);
        assert_eq!(store.event_count(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut store = AdaptiveStore::with_capacity(0, 0);
        store.add_event(event(0, "qwg", FeedbackType::TruePositive));
        assert_eq!(store.event_count(), 0);
        assert!(store.save_snapshot(&AdaptiveState::default()).is_none());
        assert!(store.latest_snapshot().is_none());
    }

    #[test]
    fn test_recent_events() {
        let mut store = AdaptiveStore::new();
        for i in 0..10 {
            store.add_event(event(i, "wallet", FeedbackType::Unknown));
        }

        let recent = store.recent_events(3);
        let ids: Vec<&str> = recent.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["evt-7", "evt-8", "evt-9"]);

        assert!(store.recent_events(0).is_empty());
        assert_eq!(store.recent_events(50).len(), 10);
    }

    #[test]
    fn test_filters_and_histograms() {
        let mut store = AdaptiveStore::new();
        store.add_event(event(0, "sentinel", FeedbackType::TruePositive).with_fingerprint("fp-a"));
        store.add_event(event(1, "wallet", FeedbackType::FalsePositive));
        store.add_event(event(2, "sentinel", FeedbackType::TruePositive).with_fingerprint("fp-a"));
        store.add_event(event(3, "qwg", FeedbackType::Unknown).with_fingerprint("fp-b"));

        assert_eq!(store.events_by_layer("sentinel").len(), 2);
        assert_eq!(store.events_by_fingerprint("fp-a").len(), 2);
        assert_eq!(store.events_by_fingerprint("missing").len(), 0);

        let fb = store.feedback_stats();
        assert_eq!(fb[&FeedbackType::TruePositive], 2);
        assert_eq!(fb[&FeedbackType::FalsePositive], 1);
        assert_eq!(fb[&FeedbackType::Unknown], 1);
        assert!(!fb.contains_key(&FeedbackType::MissedAttack));

        let layers = store.layer_stats();
        assert_eq!(layers["sentinel"], 2);
        assert_eq!(layers["wallet"], 1);
        assert_eq!(layers["qwg"], 1);
    }

    #[test]
    fn test_snapshot_survives_live_mutation() {
        let mut store = AdaptiveStore::new();
        let mut state = AdaptiveState::default();
        state.layer_weights.insert("adn".to_string(), 1.0);
        store.save_snapshot(&state);

        state.layer_weights.insert("adn".to_string(), 2.5);
        state.layer_weights.insert("new".to_string(), 1.0);

        let latest = store.latest_snapshot().unwrap();
        assert_eq!(latest.state.layer_weights.len(), 1);
        assert_eq!(latest.state.layer_weights["adn"], 1.0);
    }

    #[test]
    fn test_snapshot_ring_bounded() {
        let mut store = AdaptiveStore::with_capacity(10, 2);
        let mut state = AdaptiveState::default();
        for t in [0.2, 0.3, 0.4] {
            state.global_threshold = t;
            store.save_snapshot(&state);
        }

        let thresholds: Vec<f64> = store
            .list_snapshots()
            .iter()
            .map(|s| s.state.global_threshold)
            .collect();
        assert_eq!(thresholds, vec![0.3, 0.4]);
    }
}
