//! # Threat Intake
//!
//! The unified packet every shield layer reports with, and the bounded
//! persistent memory those packets accumulate in.

pub mod memory;
pub mod packet;

pub use memory::{LoadOutcome, ThreatMemory};
pub use packet::{parse_timestamp, ThreatPacket, ThreatPacketDraft};
