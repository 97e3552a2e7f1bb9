//! # Threat Analytics
//!
//! Read-only statistics over the packet history held in a
//! [`ThreatMemory`](crate::threat::ThreatMemory).
//!
//! Every analytic takes packets oldest first plus a severity floor, ignores
//! packets below the floor, and never mutates anything. Empty or too-small
//! inputs produce zeroed/empty results instead of errors.
//!
//! - [`summary`]: counts per type, totals and the latest packets
//! - [`patterns`]: rising threat types and hotspot layers
//! - [`correlation`]: adjacent type pairs and layer/type co-occurrence
//! - [`trends`]: hour/day buckets and trend direction
//! - [`report`]: all of the above composed and rendered as text

pub mod correlation;
pub mod patterns;
pub mod report;
pub mod summary;
pub mod trends;

use crate::threat::ThreatPacket;

pub use correlation::{detect_threat_correlations, CorrelationReport};
pub use patterns::{detect_threat_patterns, PatternReport};
pub use report::{generate_immune_report, ImmuneReport, ReportOptions};
pub use summary::{analyze_threats, summarize_threats, ThreatAnalysis, ThreatSummary};
pub use trends::{detect_threat_trends, TrendBucket, TrendDirection, TrendReport};

/// Packets at or above `min_severity`, in their original order.
pub(crate) fn qualifying<'a, I>(packets: I, min_severity: u8) -> Vec<&'a ThreatPacket>
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    packets
        .into_iter()
        .filter(|p| p.severity() >= min_severity)
        .collect()
}

/// Sort `(key, count)` rows by count descending, key ascending on ties.
pub(crate) fn sort_by_count_desc<K: Ord>(rows: &mut [(K, usize)]) {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}
