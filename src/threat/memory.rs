//! # Threat Memory
//!
//! Bounded, disk-persisted history of ThreatPackets.
//!
//! The on-disk layout is a pretty-printed JSON array of packet objects,
//! oldest first, rewritten in full on every save. Loading never fails the
//! caller: a missing, unreadable or unparsable file leaves the memory empty,
//! and individual records that fail validation are skipped. The
//! [`LoadOutcome`] says which of those happened.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::packet::ThreatPacket;
use crate::AdaptiveResult;

pub const DEFAULT_MEMORY_PATH: &str = "threat_memory.json";
pub const DEFAULT_MAX_PACKETS: usize = 10_000;

/// What happened during [`ThreatMemory::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No backing file (or no path configured). Memory is empty.
    Absent,

    /// The file exists but could not be read. Memory is empty.
    Unreadable(String),

    /// The file is not a JSON array. Memory is empty.
    ParseFailure(String),

    /// The array was read. `kept` packets are retained after the capacity
    /// was re-applied, `skipped` records failed validation.
    Loaded { kept: usize, skipped: usize },
}

/// Persistent FIFO store for ThreatPackets.
#[derive(Debug, Clone)]
pub struct ThreatMemory {
    path: Option<PathBuf>,
    packets: VecDeque<ThreatPacket>,
    max_packets: usize,
}

impl ThreatMemory {
    /// A memory backed by the JSON file at `path`. Nothing is read until
    /// [`load`](Self::load) is called.
    pub fn new(path: impl Into<PathBuf>, max_packets: usize) -> Self {
        Self {
            path: Some(path.into()),
            packets: VecDeque::new(),
            max_packets,
        }
    }

    /// A memory that never touches disk. `save` is a no-op.
    pub fn in_memory(max_packets: usize) -> Self {
        Self {
            path: None,
            packets: VecDeque::new(),
            max_packets,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max_packets(&self) -> usize {
        self.max_packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Append a packet, evicting the oldest ones beyond capacity.
    pub fn add_packet(&mut self, packet: ThreatPacket) {
        self.packets.push_back(packet);
        self.enforce_limit();
    }

    /// Stored packets, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ThreatPacket> + Clone + '_ {
        self.packets.iter()
    }

    /// Owned copy of the stored packets, oldest first.
    pub fn list_packets(&self) -> Vec<ThreatPacket> {
        self.packets.iter().cloned().collect()
    }

    /// Replace the in-memory contents with whatever the backing file holds.
    pub fn load(&mut self) -> LoadOutcome {
        self.packets.clear();

        let path = match &self.path {
            Some(p) if p.exists() => p.clone(),
            Some(p) => {
                log::info!("[THREAT-MEMORY] No history at {}, starting empty", p.display());
                return LoadOutcome::Absent;
            }
            None => return LoadOutcome::Absent,
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                log::warn!(
                    "[THREAT-MEMORY] Could not read {} ({}), starting empty",
                    path.display(),
                    e
                );
                return LoadOutcome::Unreadable(e.to_string());
            }
        };

        let records = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                log::warn!(
                    "[THREAT-MEMORY] {} is not a JSON array, starting empty",
                    path.display()
                );
                return LoadOutcome::ParseFailure("top-level value is not an array".to_string());
            }
            Err(e) => {
                log::warn!(
                    "[THREAT-MEMORY] Failed to parse {} ({}), starting empty",
                    path.display(),
                    e
                );
                return LoadOutcome::ParseFailure(e.to_string());
            }
        };

        let mut skipped = 0;
        for (index, record) in records.into_iter().enumerate() {
            match ThreatPacket::from_value(record) {
                Ok(packet) => self.packets.push_back(packet),
                Err(e) => {
                    log::debug!("[THREAT-MEMORY] Skipping record {}: {}", index, e);
                    skipped += 1;
                }
            }
        }
        self.enforce_limit();

        log::info!(
            "[THREAT-MEMORY] Loaded {} packets from {} ({} skipped)",
            self.packets.len(),
            path.display(),
            skipped
        );

        LoadOutcome::Loaded {
            kept: self.packets.len(),
            skipped,
        }
    }

    /// Overwrite the backing file with the full packet list.
    pub fn save(&self) -> AdaptiveResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.packets)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn enforce_limit(&mut self) {
        if self.max_packets == 0 {
            self.packets.clear();
            return;
        }
        while self.packets.len() > self.max_packets {
            self.packets.pop_front();
        }
    }
}

impl Default for ThreatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_PATH, DEFAULT_MAX_PACKETS)
    }
}
