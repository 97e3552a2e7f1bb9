//! Per-type counts and headline numbers for the packet history.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::qualifying;
use crate::threat::ThreatPacket;

/// Compact view of one packet for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatSummary {
    pub timestamp: String,
    pub source_layer: String,
    pub threat_type: String,
    pub severity: u8,
    pub description: String,
    pub correlation_id: String,
}

impl From<&ThreatPacket> for ThreatSummary {
    fn from(p: &ThreatPacket) -> Self {
        Self {
            timestamp: p.timestamp().to_string(),
            source_layer: p.source_layer().to_string(),
            threat_type: p.threat_type().to_string(),
            severity: p.severity(),
            description: p.description().to_string(),
            correlation_id: p.correlation_id().to_string(),
        }
    }
}

/// Headline statistics over the qualifying packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAnalysis {
    pub total_count: usize,

    /// 0.0 when there are no packets.
    pub average_severity: f64,

    pub max_severity: u8,

    /// First type to reach the highest count, scanning oldest to newest.
    pub most_common_type: Option<String>,

    /// The latest `last_n` packets, oldest first.
    pub recent: Vec<ThreatSummary>,
}

/// Count qualifying packets per threat type.
pub fn summarize_threats<'a, I>(packets: I, min_severity: u8) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    let mut summary = BTreeMap::new();
    for p in qualifying(packets, min_severity) {
        *summary.entry(p.threat_type().to_string()).or_insert(0) += 1;
    }
    summary
}

/// Totals, severity statistics, dominant type and the latest `last_n` packets.
pub fn analyze_threats<'a, I>(packets: I, min_severity: u8, last_n: usize) -> ThreatAnalysis
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    let packets = qualifying(packets, min_severity);
    let total_count = packets.len();

    let severity_sum: u64 = packets.iter().map(|p| u64::from(p.severity())).sum();
    let average_severity = if total_count == 0 {
        0.0
    } else {
        severity_sum as f64 / total_count as f64
    };
    let max_severity = packets.iter().map(|p| p.severity()).max().unwrap_or(0);

    // A type only takes the lead by strictly passing the current best, so
    // ties go to whichever type got there first.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut most_common_type: Option<&str> = None;
    let mut best = 0;
    for p in &packets {
        let count = counts.entry(p.threat_type()).or_insert(0);
        *count += 1;
        if *count > best {
            best = *count;
            most_common_type = Some(p.threat_type());
        }
    }

    let recent = packets[total_count.saturating_sub(last_n)..]
        .iter()
        .map(|p| ThreatSummary::from(*p))
        .collect();

    ThreatAnalysis {
        total_count,
        average_severity,
        max_severity,
        most_common_type: most_common_type.map(str::to_string),
        recent,
    }
}
