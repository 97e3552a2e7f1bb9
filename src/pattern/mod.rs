//! # Deep Pattern Engine
//!
//! Compares short-term against long-term threat activity to flag bursts,
//! and measures how many different threat types make up the recent burst.
//!
//! ## Scoring Model
//!
//! Windows are counted in packets, not seconds. With `long` and `short`
//! the most recent `long_window` / `short_window` qualifying packets:
//!
//! ```text
//! long_rate   = |long|  / long_window
//! short_rate  = |short| / short_window
//! spike_ratio = short_rate / long_rate        (1.0 or 0.0 when long_rate = 0)
//! spike       = clamp(spike_ratio - 1, 0, 1)  (ratio >= 2 saturates)
//! diversity   = clamp(distinct types in short / |short|, 0, 1)
//! composite   = clamp(0.6 * spike + 0.4 * diversity, 0, 1)
//! ```
//!
//! The engine keeps no state between calls. Results depend only on the
//! packets handed in and the two window sizes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::threat::ThreatPacket;

pub const DEFAULT_SHORT_WINDOW: usize = 50;
pub const DEFAULT_LONG_WINDOW: usize = 500;

const SPIKE_WEIGHT: f64 = 0.6;
const DIVERSITY_WEIGHT: f64 = 0.4;

/// Output of one [`DeepPatternEngine::analyze`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    /// Packets at or above the severity floor.
    pub total_packets: usize,
    pub short_window: usize,
    pub long_window: usize,
    pub short_count: usize,
    pub long_count: usize,
    pub spike_ratio: f64,
    pub spike_score: f64,
    pub diversity_score: f64,
    pub composite_risk: f64,
}

impl PatternAnalysis {
    fn empty(short_window: usize, long_window: usize) -> Self {
        Self {
            total_packets: 0,
            short_window,
            long_window,
            short_count: 0,
            long_count: 0,
            spike_ratio: 0.0,
            spike_score: 0.0,
            diversity_score: 0.0,
            composite_risk: 0.0,
        }
    }
}

/// Windowed spike and diversity scanner over a packet history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepPatternEngine {
    short_window: usize,
    long_window: usize,
}

impl DeepPatternEngine {
    /// Windows are normalised so that `1 <= short_window <= long_window`.
    pub fn new(short_window: usize, long_window: usize) -> Self {
        let short_window = short_window.max(1);
        Self {
            short_window,
            long_window: long_window.max(short_window),
        }
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }

    /// Score the packets (oldest first) whose severity is at least
    /// `min_severity`.
    pub fn analyze<'a, I>(&self, packets: I, min_severity: u8) -> PatternAnalysis
    where
        I: IntoIterator<Item = &'a ThreatPacket>,
    {
        let qualifying: Vec<&ThreatPacket> = packets
            .into_iter()
            .filter(|p| p.severity() >= min_severity)
            .collect();
        let total = qualifying.len();

        if total == 0 {
            return PatternAnalysis::empty(self.short_window, self.long_window);
        }

        let long_slice = &qualifying[total.saturating_sub(self.long_window)..];
        let short_slice = &qualifying[total.saturating_sub(self.short_window)..];

        let long_rate = long_slice.len() as f64 / self.long_window as f64;
        let short_rate = short_slice.len() as f64 / self.short_window as f64;

        let spike_ratio = if long_rate == 0.0 {
            if short_rate > 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            short_rate / long_rate
        };
        let spike_score = (spike_ratio - 1.0).max(0.0).clamp(0.0, 1.0);

        let diversity_score = if short_slice.is_empty() {
            0.0
        } else {
            let distinct: HashSet<&str> =
                short_slice.iter().map(|p| p.threat_type()).collect();
            (distinct.len() as f64 / short_slice.len() as f64).clamp(0.0, 1.0)
        };

        let composite_risk =
            (SPIKE_WEIGHT * spike_score + DIVERSITY_WEIGHT * diversity_score).clamp(0.0, 1.0);

        log::debug!(
            "[PATTERN] total={} spike_ratio={:.3} spike={:.3} diversity={:.3} composite={:.3}",
            total,
            spike_ratio,
            spike_score,
            diversity_score,
            composite_risk
        );

        PatternAnalysis {
            total_packets: total,
            short_window: self.short_window,
            long_window: self.long_window,
            short_count: short_slice.len(),
            long_count: long_slice.len(),
            spike_ratio,
            spike_score,
            diversity_score,
            composite_risk,
        }
    }
}

impl Default for DeepPatternEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_WINDOW, DEFAULT_LONG_WINDOW)
    }
}
