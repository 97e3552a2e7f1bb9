//! # Learning Control Valve
//!
//! Runtime switch over the reinforcement engine.
//!
//! Feedback deltas live inside `AdaptiveEngine::apply_learning()`. This
//! module only decides whether a pass is allowed to move anything, so an
//! operator can freeze weights during an incident review without losing
//! the events that arrive in the meantime.

use serde::{Deserialize, Serialize};

/// Decides whether a reinforcement pass applies feedback deltas.
///
/// While paused, passes still seed unseen layers and report processed
/// event ids. They just leave weights and threshold untouched.
#[derive(Debug, Clone)]
pub struct LearningControl {
    /// Whether feedback deltas are applied.
    enabled: bool,

    /// Passes that applied deltas.
    passes_applied: u64,

    /// Passes that ran while paused.
    passes_frozen: u64,
}

/// Snapshot of learning control state for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LearningStatus {
    pub enabled: bool,
    pub passes_applied: u64,
    pub passes_frozen: u64,
}

impl LearningControl {
    /// Defaults: enabled, no passes counted.
    pub fn new() -> Self {
        Self {
            enabled: true,
            passes_applied: 0,
            passes_frozen: 0,
        }
    }

    /// Count one pass and report whether it may apply deltas.
    pub fn begin_pass(&mut self) -> bool {
        if self.enabled {
            self.passes_applied += 1;
        } else {
            self.passes_frozen += 1;
        }
        self.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Freeze weights and threshold. Events are still accepted.
    pub fn pause(&mut self) {
        if self.enabled {
            log::info!("[ADAPTIVE] Learning paused");
        }
        self.enabled = false;
    }

    pub fn resume(&mut self) {
        if !self.enabled {
            log::info!("[ADAPTIVE] Learning resumed");
        }
        self.enabled = true;
    }

    pub fn status(&self) -> LearningStatus {
        LearningStatus {
            enabled: self.enabled,
            passes_applied: self.passes_applied,
            passes_frozen: self.passes_frozen,
        }
    }
}

impl Default for LearningControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learning_control_defaults() {
        let ctrl = LearningControl::new();
        assert!(ctrl.is_enabled());
        assert_eq!(
            ctrl.status(),
            LearningStatus {
                enabled: true,
                passes_applied: 0,
                passes_frozen: 0,
            }
        );
    }

    #[test]
    fn test_pause_resume_counts_passes() {
        let mut ctrl = LearningControl::new();
        assert!(ctrl.begin_pass());

        ctrl.pause();
        assert!(!ctrl.begin_pass());
        assert!(!ctrl.begin_pass());

        ctrl.resume();
        assert!(ctrl.begin_pass());

        let status = ctrl.status();
        assert!(status.enabled);
        assert_eq!(status.passes_applied, 2);
        assert_eq!(status.passes_frozen, 2);
    }

    #[test]
    fn test_pause_is_idempotent() {
        let mut ctrl = LearningControl::new();
        ctrl.pause();
        ctrl.pause();
        assert!(!ctrl.is_enabled());
        ctrl.resume();
        ctrl.resume();
        assert!(ctrl.is_enabled());
    }
}
