//! # Threat Packet
//!
//! The unified threat message every shield layer sends to the core.
//!
//! Validation happens exactly once, when a packet is built, and fails fast:
//! - an empty timestamp is auto-filled with the current UTC time; a provided
//!   one must parse as ISO-8601 (an optional trailing `Z` is accepted)
//! - an empty correlation id is auto-generated; a provided one must not be
//!   blank and is stored trimmed
//! - severity is clamped into [0, 10], never rejected for being out of range
//! - metadata is always a mapping, empty when absent
//!
//! The same rules apply whether a packet is built from a typed
//! [`ThreatPacketDraft`] or reconstructed from an untyped JSON record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AdaptiveError, AdaptiveResult};

pub const MIN_SEVERITY: u8 = 0;
pub const MAX_SEVERITY: u8 = 10;

/// Naive layouts accepted after the optional trailing `Z` is removed.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Offset layouts beyond RFC 3339: no colon in the offset, or no seconds.
const OFFSET_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%z",
];

/// A validated threat report.
///
/// Fields are read through accessors only, so a built packet always
/// satisfies the construction rules.
///
/// `source_layer` and `threat_type` are open vocabularies. Once accepted
/// into a [`ThreatMemory`](super::memory::ThreatMemory) the packet is owned
/// by it until evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThreatPacket")]
pub struct ThreatPacket {
    /// Layer that sent the packet, e.g. "sentinel_ai_v2".
    source_layer: String,

    /// Short label such as "reorg", "pqc_risk", "wallet_anomaly".
    threat_type: String,

    /// 0 = informational, 10 = critical.
    severity: u8,

    /// Human-readable one-liner for logs.
    description: String,

    node_id: Option<String>,
    wallet_id: Option<String>,
    tx_id: Option<String>,
    block_height: Option<i64>,

    /// Layer-specific extra data.
    metadata: Map<String, Value>,

    /// Links packets that belong to the same incident.
    correlation_id: String,

    /// ISO-8601 UTC timestamp, possibly ending in `Z`.
    timestamp: String,
}

/// Typed input for [`ThreatPacket::new`].
///
/// Empty `correlation_id` / `timestamp` behave like `None` and get filled in.
#[derive(Debug, Clone, Default)]
pub struct ThreatPacketDraft {
    pub source_layer: String,
    pub threat_type: String,
    pub severity: i64,
    pub description: String,
    pub node_id: Option<String>,
    pub wallet_id: Option<String>,
    pub tx_id: Option<String>,
    pub block_height: Option<i64>,
    pub metadata: Option<Map<String, Value>>,
    pub correlation_id: Option<String>,
    pub timestamp: Option<String>,
}

impl ThreatPacketDraft {
    pub fn new(
        source_layer: impl Into<String>,
        threat_type: impl Into<String>,
        severity: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source_layer: source_layer.into(),
            threat_type: threat_type.into(),
            severity,
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn block_height(mut self, height: i64) -> Self {
        self.block_height = Some(height);
        self
    }

    /// Validate and build the packet.
    pub fn build(self) -> AdaptiveResult<ThreatPacket> {
        ThreatPacket::new(self)
    }
}

impl ThreatPacket {
    /// Validate a draft into a packet. See the module docs for the rules.
    pub fn new(draft: ThreatPacketDraft) -> AdaptiveResult<Self> {
        let timestamp = match draft.timestamp {
            Some(ts) if !ts.is_empty() => {
                if parse_timestamp(&ts).is_none() {
                    return Err(AdaptiveError::InvalidTimestamp(ts));
                }
                ts
            }
            _ => now_timestamp(),
        };

        let correlation_id = match draft.correlation_id {
            Some(cid) if !cid.is_empty() => {
                let trimmed = cid.trim();
                if trimmed.is_empty() {
                    return Err(AdaptiveError::InvalidCorrelationId);
                }
                trimmed.to_string()
            }
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let severity = draft
            .severity
            .clamp(i64::from(MIN_SEVERITY), i64::from(MAX_SEVERITY)) as u8;

        Ok(Self {
            source_layer: draft.source_layer,
            threat_type: draft.threat_type,
            severity,
            description: draft.description,
            node_id: draft.node_id,
            wallet_id: draft.wallet_id,
            tx_id: draft.tx_id,
            block_height: draft.block_height,
            metadata: draft.metadata.unwrap_or_default(),
            correlation_id,
            timestamp,
        })
    }

    /// Rebuild a packet from an untyped JSON record.
    ///
    /// Unknown fields and missing required fields are rejected. Severity is
    /// coerced from integers, floats (truncated), booleans and integer-like
    /// strings; metadata must be an object or null.
    pub fn from_value(value: Value) -> AdaptiveResult<Self> {
        if !value.is_object() {
            return Err(AdaptiveError::InvalidPacket(format!(
                "expected a JSON object, got {}",
                value_kind(&value)
            )));
        }
        let raw: RawThreatPacket = serde_json::from_value(value)
            .map_err(|e| AdaptiveError::InvalidPacket(e.to_string()))?;
        Self::try_from(raw)
    }

    /// The timestamp as a UTC naive datetime, or `None` if it no longer
    /// parses (e.g. legacy data edited after construction).
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    pub fn source_layer(&self) -> &str {
        &self.source_layer
    }

    pub fn threat_type(&self) -> &str {
        &self.threat_type
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn wallet_id(&self) -> Option<&str> {
        self.wallet_id.as_deref()
    }

    pub fn tx_id(&self) -> Option<&str> {
        self.tx_id.as_deref()
    }

    pub fn block_height(&self) -> Option<i64> {
        self.block_height
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Overwrite the timestamp without validation, to mimic records written
    /// before timestamps were checked.
    #[cfg(test)]
    pub(crate) fn set_unchecked_timestamp(&mut self, timestamp: &str) {
        self.timestamp = timestamp.to_string();
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 with an offset, an offset written without a colon
/// (`+0200`), a naive date-time with `T` or a space separator (optional
/// seconds and fraction, or hour only), or a bare date. A single trailing
/// `Z` is allowed on the naive forms.
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    for layout in OFFSET_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(input, layout) {
            return Some(dt.with_timezone(&Utc).naive_utc());
        }
    }

    let trimmed = input.strip_suffix('Z').unwrap_or(input);
    for layout in NAIVE_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Some(dt);
        }
    }

    // Hour only, e.g. "2026-01-01T12".
    if let Ok(dt) = NaiveDateTime::parse_from_str(&format!("{}:00", trimmed), "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Coerce an untyped severity into an integer the way an int() cast would.
fn coerce_severity(value: &Value) -> AdaptiveResult<i64> {
    let invalid = || AdaptiveError::InvalidSeverity(value.to_string());
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.as_u64().is_some() {
                Ok(i64::MAX)
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => Ok(f.trunc() as i64),
                    _ => Err(invalid()),
                }
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Wire shape of a packet before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThreatPacket {
    source_layer: String,
    threat_type: String,
    severity: Value,
    description: String,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    wallet_id: Option<String>,
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    block_height: Option<i64>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl TryFrom<RawThreatPacket> for ThreatPacket {
    type Error = AdaptiveError;

    fn try_from(raw: RawThreatPacket) -> Result<Self, Self::Error> {
        let severity = coerce_severity(&raw.severity)?;
        let metadata = match raw.metadata {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(AdaptiveError::InvalidMetadata(value_kind(&other).to_string()))
            }
        };

        ThreatPacket::new(ThreatPacketDraft {
            source_layer: raw.source_layer,
            threat_type: raw.threat_type,
            severity,
            description: raw.description,
            node_id: raw.node_id,
            wallet_id: raw.wallet_id,
            tx_id: raw.tx_id,
            block_height: raw.block_height,
            metadata,
            correlation_id: raw.correlation_id,
            timestamp: raw.timestamp,
        })
    }
}
