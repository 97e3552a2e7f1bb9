//! # Immune Report
//!
//! Every analytic plus the deep pattern scan, run over the same packet
//! set and rendered as a fixed-layout text block for operators. Building a
//! report reads the history and nothing else.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::correlation::{detect_threat_correlations, CorrelationReport};
use super::patterns::{detect_threat_patterns, PatternReport};
use super::summary::{analyze_threats, summarize_threats, ThreatAnalysis};
use super::trends::{detect_threat_trends, TrendBucket, TrendReport};
use crate::pattern::{DeepPatternEngine, PatternAnalysis};
use crate::threat::ThreatPacket;
use crate::ReportConfig;

/// Knobs shared by the analytics in one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOptions {
    pub min_severity: u8,
    pub last_n: usize,
    pub pattern_window: usize,
    pub trend_bucket: TrendBucket,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            min_severity: 0,
            last_n: 10,
            pattern_window: 50,
            trend_bucket: TrendBucket::Day,
        }
    }
}

impl From<&ReportConfig> for ReportOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            min_severity: config.min_severity,
            last_n: config.last_n,
            pattern_window: config.pattern_window,
            trend_bucket: config.trend_bucket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmuneReport {
    pub options: ReportOptions,
    pub summary: BTreeMap<String, usize>,
    pub analysis: ThreatAnalysis,
    pub deep_pattern: PatternAnalysis,
    pub patterns: PatternReport,
    pub correlations: CorrelationReport,
    pub trends: TrendReport,
}

impl ImmuneReport {
    /// Multi-line text rendering. Same report, same text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

/// Run every analytic over `packets` and compose the results.
pub fn generate_immune_report<'a, I>(
    packets: I,
    engine: &DeepPatternEngine,
    options: &ReportOptions,
) -> ImmuneReport
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    let all: Vec<&ThreatPacket> = packets.into_iter().collect();
    let min = options.min_severity;

    ImmuneReport {
        options: *options,
        summary: summarize_threats(all.iter().copied(), min),
        analysis: analyze_threats(all.iter().copied(), min, options.last_n),
        deep_pattern: engine.analyze(all.iter().copied(), min),
        patterns: detect_threat_patterns(all.iter().copied(), min, options.pattern_window),
        correlations: detect_threat_correlations(all.iter().copied(), min),
        trends: detect_threat_trends(all.iter().copied(), min, options.trend_bucket),
    }
}

const NONE: &str = "  (none)";

impl fmt::Display for ImmuneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.analysis;
        writeln!(f, "=== Immune Report ===")?;
        writeln!(
            f,
            "Packets analysed: {} (min severity {})",
            a.total_count, self.options.min_severity
        )?;
        writeln!(
            f,
            "Average severity: {:.2} | Max severity: {}",
            a.average_severity, a.max_severity
        )?;
        writeln!(
            f,
            "Most common type: {}",
            a.most_common_type.as_deref().unwrap_or("-")
        )?;

        writeln!(f, "-- Threat types --")?;
        if self.summary.is_empty() {
            writeln!(f, "{}", NONE)?;
        }
        for (threat_type, count) in &self.summary {
            writeln!(f, "  {}: {}", threat_type, count)?;
        }

        let d = &self.deep_pattern;
        writeln!(
            f,
            "-- Deep pattern (short {} / long {}) --",
            d.short_window, d.long_window
        )?;
        writeln!(
            f,
            "  spike_ratio={:.3} spike={:.3} diversity={:.3} composite_risk={:.3}",
            d.spike_ratio, d.spike_score, d.diversity_score, d.composite_risk
        )?;

        writeln!(f, "-- Rising patterns (window {}) --", self.patterns.window)?;
        if self.patterns.rising_patterns.is_empty() {
            writeln!(f, "{}", NONE)?;
        }
        for r in &self.patterns.rising_patterns {
            writeln!(
                f,
                "  {}: recent {} ({:.1}%) vs overall {} ({:.1}%)",
                r.threat_type,
                r.recent_count,
                r.recent_frequency * 100.0,
                r.overall_count,
                r.overall_frequency * 100.0
            )?;
        }

        writeln!(f, "-- Hotspot layers --")?;
        if self.patterns.hotspot_layers.is_empty() {
            writeln!(f, "{}", NONE)?;
        }
        for l in &self.patterns.hotspot_layers {
            writeln!(f, "  {}: {}", l.source_layer, l.count)?;
        }

        writeln!(f, "-- Type sequences --")?;
        if self.correlations.type_pairs.is_empty() {
            writeln!(f, "{}", NONE)?;
        }
        for p in &self.correlations.type_pairs {
            writeln!(f, "  {} -> {}: {}", p.from, p.to, p.count)?;
        }

        writeln!(f, "-- Layer/type combos --")?;
        if self.correlations.layer_type_combos.is_empty() {
            writeln!(f, "{}", NONE)?;
        }
        for c in &self.correlations.layer_type_combos {
            writeln!(f, "  {} / {}: {}", c.source_layer, c.threat_type, c.count)?;
        }

        let t = &self.trends;
        writeln!(f, "-- Trend ({}) --", t.bucket)?;
        writeln!(
            f,
            "  direction: {} | invalid timestamps: {}",
            t.trend_direction, t.invalid_timestamp_count
        )?;
        for p in &t.points {
            writeln!(f, "  {}: {} (high {})", p.bucket, p.count, p.high_severity_count)?;
        }

        writeln!(f, "-- Latest {} packets --", self.options.last_n)?;
        if a.recent.is_empty() {
            writeln!(f, "{}", NONE)?;
        }
        for s in &a.recent {
            writeln!(
                f,
                "  [{}] {}/{} sev={} {}",
                s.timestamp, s.source_layer, s.threat_type, s.severity, s.description
            )?;
        }
        Ok(())
    }
}
