//! C9 — Trx Client, plus the master-side stub it talks to.
//!
//! The cluster-wide transaction-id/timestamp master is an external
//! collaborator per spec.md §1; [`InMemoryMaster`] is the in-process stand-in
//! used by this crate and its tests, and [`TrxClient`] is the contractual
//! boundary a worker uses to reach it (spec.md §4.9, §6.2). Status
//! invalidation notifications are modeled directly over a `crossbeam`
//! channel rather than round-tripping through the `Mailbox` trait — the
//! original's `trx_table_stub` owns its own socket independent of the data
//! mailbox, and duplicating that split keeps `crate::txn` decoupled from
//! `crate::mailbox`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::ids::{Timestamp, TrxId};

/// Transaction status as tracked by the master (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxStat {
    Processing,
    Validating,
    Abort,
    Committed,
}

/// Worker-side view onto the master's transaction table.
pub trait TrxClient: Send + Sync {
    fn allocate_begin_timestamp(&self, trx_id: TrxId) -> Timestamp;
    fn allocate_commit_timestamp(&self, trx_id: TrxId) -> Timestamp;
    fn read_status(&self, trx_id: TrxId) -> TrxStat;
    fn update_status(&self, trx_id: TrxId, new: TrxStat);
    fn read_commit_time(&self, trx_id: TrxId) -> Option<Timestamp>;
    /// Transactions whose commit time falls within `(begin, end)` — the
    /// candidate writer set the validation expert intersects against the
    /// RCT (spec.md §4.13 step 2).
    fn get_recent_writers(&self, begin: Timestamp, end: Timestamp) -> Vec<TrxId>;
    fn subscribe(&self) -> Receiver<(TrxId, TrxStat)>;
}

struct TrxEntry {
    status: TrxStat,
    commit_time: Option<Timestamp>,
}

/// In-memory master stub: monotone id/timestamp allocation, a transaction
/// status table, and an index from commit timestamp to transaction id so
/// `get_recent_writers` can answer range queries.
pub struct InMemoryMaster {
    next_timestamp: AtomicU64,
    trx_table: DashMap<TrxId, TrxEntry>,
    commit_index: Mutex<BTreeMap<Timestamp, TrxId>>,
    subscribers: Mutex<Vec<Sender<(TrxId, TrxStat)>>>,
}

impl Default for InMemoryMaster {
    fn default() -> Self {
        InMemoryMaster {
            next_timestamp: AtomicU64::new(1),
            trx_table: DashMap::new(),
            commit_index: Mutex::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryMaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_ts(&self) -> Timestamp {
        let raw = self.next_timestamp.fetch_add(1, Ordering::SeqCst);
        Timestamp::new(raw)
    }

    fn notify(&self, trx_id: TrxId, status: TrxStat) {
        let subs = self.subscribers.lock();
        for s in subs.iter() {
            let _ = s.send((trx_id, status));
        }
    }
}

impl TrxClient for InMemoryMaster {
    fn allocate_begin_timestamp(&self, trx_id: TrxId) -> Timestamp {
        let ts = self.next_ts();
        self.trx_table.insert(trx_id, TrxEntry { status: TrxStat::Processing, commit_time: None });
        ts
    }

    fn allocate_commit_timestamp(&self, trx_id: TrxId) -> Timestamp {
        let ts = self.next_ts();
        if let Some(mut entry) = self.trx_table.get_mut(&trx_id) {
            entry.commit_time = Some(ts);
        }
        self.commit_index.lock().insert(ts, trx_id);
        ts
    }

    fn read_status(&self, trx_id: TrxId) -> TrxStat {
        self.trx_table.get(&trx_id).map(|e| e.status).unwrap_or(TrxStat::Processing)
    }

    fn update_status(&self, trx_id: TrxId, new: TrxStat) {
        let mut entry = self.trx_table.entry(trx_id).or_insert(TrxEntry { status: TrxStat::Processing, commit_time: None });
        // Monotone: PROCESSING -> VALIDATING -> {ABORT, COMMITTED} (spec.md §4.9).
        let allowed = matches!(
            (entry.status, new),
            (TrxStat::Processing, TrxStat::Validating)
                | (TrxStat::Processing, TrxStat::Abort)
                | (TrxStat::Processing, TrxStat::Committed)
                | (TrxStat::Validating, TrxStat::Abort)
                | (TrxStat::Validating, TrxStat::Committed)
                | (_, same) if same as u8 == entry.status as u8
        );
        if allowed || matches!(new, TrxStat::Abort) {
            entry.status = new;
        }
        drop(entry);
        self.notify(trx_id, new);
    }

    fn read_commit_time(&self, trx_id: TrxId) -> Option<Timestamp> {
        self.trx_table.get(&trx_id).and_then(|e| e.commit_time)
    }

    fn get_recent_writers(&self, begin: Timestamp, end: Timestamp) -> Vec<TrxId> {
        self.commit_index
            .lock()
            .range(begin..end)
            .map(|(_, trx)| *trx)
            .collect()
    }

    fn subscribe(&self) -> Receiver<(TrxId, TrxStat)> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_and_commit_time() {
        let master = InMemoryMaster::new();
        let trx = TrxId::new(1);
        master.allocate_begin_timestamp(trx);
        assert_eq!(master.read_status(trx), TrxStat::Processing);
        master.update_status(trx, TrxStat::Validating);
        assert_eq!(master.read_status(trx), TrxStat::Validating);
        let ct = master.allocate_commit_timestamp(trx);
        master.update_status(trx, TrxStat::Committed);
        assert_eq!(master.read_commit_time(trx), Some(ct));
    }

    #[test]
    fn recent_writers_range_query() {
        let master = InMemoryMaster::new();
        let t1 = TrxId::new(1);
        let t2 = TrxId::new(2);
        master.allocate_begin_timestamp(t1);
        master.allocate_begin_timestamp(t2);
        let c1 = master.allocate_commit_timestamp(t1);
        let c2 = master.allocate_commit_timestamp(t2);
        let writers = master.get_recent_writers(Timestamp::new(0), Timestamp::new(c2.raw() + 1));
        assert!(writers.contains(&t1));
        assert!(writers.contains(&t2));
        let _ = c1;
    }

    #[test]
    fn subscribers_receive_status_updates() {
        let master = InMemoryMaster::new();
        let rx = master.subscribe();
        let trx = TrxId::new(9);
        master.allocate_begin_timestamp(trx);
        master.update_status(trx, TrxStat::Abort);
        let (got_trx, got_status) = rx.recv().unwrap();
        assert_eq!(got_trx, trx);
        assert_eq!(got_status, TrxStat::Abort);
    }
}
