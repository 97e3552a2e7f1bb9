//! Which threat types follow each other, and which layers report which types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{qualifying, sort_by_count_desc};
use crate::threat::ThreatPacket;

/// `from` was immediately followed by `to`, `count` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePair {
    pub from: String,
    pub to: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTypeCombo {
    pub source_layer: String,
    pub threat_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationReport {
    /// Adjacent packet type transitions, most frequent first.
    pub type_pairs: Vec<TypePair>,

    /// (source_layer, threat_type) occurrences, most frequent first.
    pub layer_type_combos: Vec<LayerTypeCombo>,
}

/// Count adjacent type pairs and layer/type combos.
///
/// Needs at least two qualifying packets; otherwise both lists are empty.
pub fn detect_threat_correlations<'a, I>(packets: I, min_severity: u8) -> CorrelationReport
where
    I: IntoIterator<Item = &'a ThreatPacket>,
{
    let packets = qualifying(packets, min_severity);
    if packets.len() < 2 {
        return CorrelationReport::default();
    }

    let mut pairs: HashMap<(&str, &str), usize> = HashMap::new();
    for w in packets.windows(2) {
        let key = (w[0].threat_type(), w[1].threat_type());
        *pairs.entry(key).or_insert(0) += 1;
    }

    let mut combos: HashMap<(&str, &str), usize> = HashMap::new();
    for p in &packets {
        let key = (p.source_layer(), p.threat_type());
        *combos.entry(key).or_insert(0) += 1;
    }

    let mut pair_rows: Vec<_> = pairs.into_iter().collect();
    sort_by_count_desc(&mut pair_rows);
    let mut combo_rows: Vec<_> = combos.into_iter().collect();
    sort_by_count_desc(&mut combo_rows);

    CorrelationReport {
        type_pairs: pair_rows
            .into_iter()
            .map(|((from, to), count)| TypePair {
                from: from.to_string(),
                to: to.to_string(),
                count,
            })
            .collect(),
        layer_type_combos: combo_rows
            .into_iter()
            .map(|((layer, threat_type), count)| LayerTypeCombo {
                source_layer: layer.to_string(),
                threat_type: threat_type.to_string(),
                count,
            })
            .collect(),
    }
}
