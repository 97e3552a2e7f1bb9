//! Rising threat types and hotspot layers.
//!
//! A type is *rising* when it shows up at least twice in the recent window
//! and its share of that window beats 1.5x its share of the whole history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{qualifying, sort_by_count_desc};
use crate::threat::ThreatPacket;

const MIN_RECENT_COUNT: usize = 2;
const RISING_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RisingPattern {
    pub threat_type: String,
    pub recent_count: usize,
    pub overall_count: usize,
    pub recent_frequency: f64,
    pub overall_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerCount {
    pub source_layer: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    /// Effective window size (at least 1).
    pub window: usize,

    pub total_count: usize,

    /// Packets actually in the recent window.
    pub recent_count: usize,

    /// Most recent count first.
    pub rising_patterns: Vec<RisingPattern>,

    /// Source layers within the recent window, busiest first.
    pub hotspot_layers: Vec<LayerCount>,
}

/// Compare the last `window` qualifying packets against the full history.
pub fn detect_threat_patterns<'a, I>(packets: I, min_severity: u8, window: usize) -> PatternReport
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    let window = window.max(1);
    let packets = qualifying(packets, min_severity);
    let total = packets.len();
    let recent = &packets[total.saturating_sub(window)..];

    let mut overall: BTreeMap<&str, usize> = BTreeMap::new();
    for p in &packets {
        *overall.entry(p.threat_type()).or_insert(0) += 1;
    }

    let mut recent_types: BTreeMap<&str, usize> = BTreeMap::new();
    let mut layers: BTreeMap<&str, usize> = BTreeMap::new();
    for p in recent {
        *recent_types.entry(p.threat_type()).or_insert(0) += 1;
        *layers.entry(p.source_layer()).or_insert(0) += 1;
    }

    let mut rising: Vec<RisingPattern> = recent_types
        .iter()
        .filter_map(|(threat_type, &recent_count)| {
            let overall_count = overall.get(threat_type).copied().unwrap_or(0);
            let recent_frequency = recent_count as f64 / recent.len() as f64;
            let overall_frequency = overall_count as f64 / total as f64;
            let is_rising = recent_count >= MIN_RECENT_COUNT
                && recent_frequency > RISING_FACTOR * overall_frequency;
            is_rising.then(|| RisingPattern {
                threat_type: threat_type.to_string(),
                recent_count,
                overall_count,
                recent_frequency,
                overall_frequency,
            })
        })
        .collect();
    rising.sort_by(|a, b| {
        b.recent_count
            .cmp(&a.recent_count)
            .then_with(|| a.threat_type.cmp(&b.threat_type))
    });

    let mut layer_rows: Vec<(&str, usize)> = layers.into_iter().collect();
    sort_by_count_desc(&mut layer_rows);
    let hotspot_layers = layer_rows
        .into_iter()
        .map(|(layer, count)| LayerCount {
            source_layer: layer.to_string(),
            count,
        })
        .collect();

    PatternReport {
        window,
        total_count: total,
        recent_count: recent.len(),
        rising_patterns: rising,
        hotspot_layers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::packet;

    const TS: &str = "2026-01-01T12:00:00Z";

    #[test]
    fn test_empty_history() {
        let report = detect_threat_patterns(std::iter::empty::<&ThreatPacket>(), 0, 10);
        assert_eq!(report.total_count, 0);
        assert_eq!(report.recent_count, 0);
        assert!(report.rising_patterns.is_empty());
        assert!(report.hotspot_layers.is_empty());
    }

    #[test]
    fn test_rising_pattern_detected() {
        let mut packets = Vec::new();
        for _ in 0..16 {
            packets.push(packet("sentinel", "background", 3, TS));
        }
        for _ in 0..4 {
            packets.push(packet("wallet", "drain", 7, TS));
        }

        let report = detect_threat_patterns(&packets, 0, 5);
        assert_eq!(report.recent_count, 5);

        // drain: 4/5 recent vs 4/20 overall
        assert_eq!(report.rising_patterns.len(), 1);
        let drain = &report.rising_patterns[0];
        assert_eq!(drain.threat_type, "drain");
        assert_eq!(drain.recent_count, 4);
        assert_eq!(drain.overall_count, 4);
        assert!((drain.recent_frequency - 0.8).abs() < 1e-12);
        assert!((drain.overall_frequency - 0.2).abs() < 1e-12);

        assert_eq!(report.hotspot_layers[0].source_layer, "wallet");
        assert_eq!(report.hotspot_layers[0].count, 4);
        assert_eq!(report.hotspot_layers[1].source_layer, "sentinel");
        assert_eq!(report.hotspot_layers[1].count, 1);
    }

    #[test]
    fn test_single_recent_occurrence_is_not_rising() {
        let mut packets = Vec::new();
        for _ in 0..20 {
            packets.push(packet("sentinel", "background", 3, TS));
        }
        packets.push(packet("qwg", "pqc_risk", 9, TS));

        let report = detect_threat_patterns(&packets, 0, 5);
        assert!(report.rising_patterns.is_empty());
    }

    #[test]
    fn test_window_covering_everything_has_no_rising() {
        let packets = vec![
            packet("a", "x", 5, TS),
            packet("a", "x", 5, TS),
            packet("b", "y", 5, TS),
        ];
        let report = detect_threat_patterns(&packets, 0, 100);
        assert_eq!(report.recent_count, 3);
        assert!(report.rising_patterns.is_empty());
    }

    #[test]
    fn test_zero_window_is_treated_as_one() {
        let packets = vec![packet("a", "x", 5, TS), packet("b", "y", 5, TS)];
        let report = detect_threat_patterns(&packets, 0, 0);
        assert_eq!(report.window, 1);
        assert_eq!(report.recent_count, 1);
        assert_eq!(report.hotspot_layers[0].source_layer, "b");
    }
}
