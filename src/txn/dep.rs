//! `dep_trx_map`: per-transaction HOMO/HETERO dependency bookkeeping
//! populated by C3 pre-reads (spec.md §4.3, §4.6).

use std::collections::HashSet;

use dashmap::DashMap;

use crate::ids::TrxId;
use crate::mvcc::{DepKind, DependencyRecorder};

#[derive(Debug, Default, Clone)]
pub struct DepLists {
    pub homo: HashSet<TrxId>,
    pub hetero: HashSet<TrxId>,
}

/// `trx_id → {homo_dep, hetero_dep}` (spec.md §4.6).
#[derive(Default)]
pub struct DepTrxMap {
    map: DashMap<TrxId, DepLists>,
}

impl DepTrxMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, trx_id: TrxId) -> DepLists {
        self.map.get(&trx_id).map(|e| e.clone()).unwrap_or_default()
    }

    /// Removes and returns bookkeeping for a finished transaction (called by
    /// the commit expert's "clean set", spec.md §4.13).
    pub fn take(&self, trx_id: TrxId) -> DepLists {
        self.map.remove(&trx_id).map(|(_, v)| v).unwrap_or_default()
    }
}

impl DependencyRecorder for DepTrxMap {
    fn record(&self, reader: TrxId, writer: TrxId, kind: DepKind) {
        let mut entry = self.map.entry(reader).or_default();
        match kind {
            DepKind::Homo => {
                entry.homo.insert(writer);
            }
            DepKind::Hetero => {
                entry.hetero.insert(writer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_take_round_trips() {
        let map = DepTrxMap::new();
        let reader = TrxId::new(1);
        let writer = TrxId::new(2);
        map.record(reader, writer, DepKind::Homo);
        let deps = map.get(reader);
        assert!(deps.homo.contains(&writer));
        let taken = map.take(reader);
        assert!(taken.homo.contains(&writer));
        assert!(map.get(reader).homo.is_empty());
    }
}
