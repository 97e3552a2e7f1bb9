//! Time-bucketed threat volume.
//!
//! Packets are grouped by their timestamp truncated to the hour or the day.
//! A packet whose timestamp no longer parses is left out of every bucket
//! and counted in `invalid_timestamp_count`, so a corrupted record shows up
//! as a data-quality number instead of an error.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::qualifying;
use crate::threat::ThreatPacket;
use crate::AdaptiveError;

/// Severity at which a packet also counts toward a bucket's high-severity tally.
pub const HIGH_SEVERITY: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendBucket {
    Hour,
    Day,
}

impl TrendBucket {
    /// Truncated key layout. Lexical order matches chronological order.
    fn key_format(self) -> &'static str {
        match self {
            TrendBucket::Hour => "%Y-%m-%dT%H:00",
            TrendBucket::Day => "%Y-%m-%d",
        }
    }
}

impl FromStr for TrendBucket {
    type Err = AdaptiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(TrendBucket::Hour),
            "day" => Ok(TrendBucket::Day),
            _ => Err(AdaptiveError::InvalidBucket(s.to_string())),
        }
    }
}

impl std::fmt::Display for TrendBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendBucket::Hour => write!(f, "hour"),
            TrendBucket::Day => write!(f, "day"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
    /// Fewer than two buckets.
    Unknown,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Flat => write!(f, "flat"),
            TrendDirection::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Truncated timestamp, e.g. "2026-01-01" or "2026-01-01T13:00".
    pub bucket: String,
    pub count: usize,
    /// Packets in this bucket with severity >= [`HIGH_SEVERITY`].
    pub high_severity_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendReport {
    pub bucket: TrendBucket,

    /// Sorted by bucket key, earliest first.
    pub points: Vec<TrendPoint>,

    /// Earliest bucket count against latest bucket count.
    pub trend_direction: TrendDirection,

    pub invalid_timestamp_count: usize,
}

/// Group qualifying packets into hour or day buckets.
pub fn detect_threat_trends<'a, I>(packets: I, min_severity: u8, bucket: TrendBucket) -> TrendReport
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    let mut buckets: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut invalid_timestamp_count = 0;

    for p in qualifying(packets, min_severity) {
        let Some(ts) = p.parsed_timestamp() else {
            invalid_timestamp_count += 1;
            continue;
        };
        let key = ts.format(bucket.key_format()).to_string();
        let entry = buckets.entry(key).or_insert((0, 0));
        entry.0 += 1;
        if p.severity() >= HIGH_SEVERITY {
            entry.1 += 1;
        }
    }

    if invalid_timestamp_count > 0 {
        log::warn!(
            "[ANALYTICS] {} packets with unparsable timestamps left out of {} trend buckets",
            invalid_timestamp_count,
            bucket
        );
    }

    let points: Vec<TrendPoint> = buckets
        .into_iter()
        .map(|(key, (count, high))| TrendPoint {
            bucket: key,
            count,
            high_severity_count: high,
        })
        .collect();

    let trend_direction = match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() >= 2 => match last.count.cmp(&first.count) {
            std::cmp::Ordering::Greater => TrendDirection::Increasing,
            std::cmp::Ordering::Less => TrendDirection::Decreasing,
            std::cmp::Ordering::Equal => TrendDirection::Flat,
        },
        _ => TrendDirection::Unknown,
    };

    TrendReport {
        bucket,
        points,
        trend_direction,
        invalid_timestamp_count,
    }
}
