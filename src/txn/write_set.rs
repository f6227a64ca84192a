//! Per-transaction write set: every `MvccList` (and value-store allocation)
//! a transaction has appended an uncommitted version to, so the commit/abort
//! experts can finalize all of them without `storage` needing to hand back a
//! concrete enum of "everything a transaction might have touched" (spec.md
//! §4.10/§4.11).

use parking_lot::Mutex;

use crate::ids::{Timestamp, TrxId};

/// One write's commit/abort continuation, captured as closures so
/// `WriteSet` stays agnostic to whether the underlying chain holds a
/// vertex, an edge, or a property version.
pub struct WriteHandle {
    commit: Box<dyn Fn(Timestamp) + Send + Sync>,
    abort: Box<dyn Fn() + Send + Sync>,
}

impl WriteHandle {
    pub fn new<C, A>(commit: C, abort: A) -> Self
    where
        C: Fn(Timestamp) + Send + Sync + 'static,
        A: Fn() + Send + Sync + 'static,
    {
        WriteHandle { commit: Box::new(commit), abort: Box::new(abort) }
    }
}

/// Accumulates a transaction's write handles; `commit_all`/`abort_all`
/// finalize every chain the transaction touched in one pass.
#[derive(Default)]
pub struct WriteSet {
    handles: Mutex<Vec<WriteHandle>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handle: WriteHandle) {
        self.handles.lock().push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Commits every tracked write at `commit_time`, draining the set.
    pub fn commit_all(&self, commit_time: Timestamp) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for h in handles {
            (h.commit)(commit_time);
        }
    }

    /// Aborts every tracked write, draining the set.
    pub fn abort_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for h in handles {
            (h.abort)();
        }
    }
}

/// `trx_id → write set`, the per-transaction registry the write experts
/// populate and the commit/terminate experts consume.
#[derive(Default)]
pub struct WriteSetTable {
    sets: dashmap::DashMap<TrxId, std::sync::Arc<WriteSet>>,
}

impl WriteSetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, trx_id: TrxId) -> std::sync::Arc<WriteSet> {
        self.sets.entry(trx_id).or_insert_with(|| std::sync::Arc::new(WriteSet::new())).clone()
    }

    pub fn take(&self, trx_id: TrxId) -> Option<std::sync::Arc<WriteSet>> {
        self.sets.remove(&trx_id).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn commit_all_invokes_every_handle_with_commit_time() {
        let set = WriteSet::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        set.push(WriteHandle::new(
            move |ts| seen2.store(ts.raw(), Ordering::SeqCst),
            || {},
        ));
        set.commit_all(Timestamp::new(7));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(set.is_empty());
    }

    #[test]
    fn abort_all_invokes_every_handle() {
        let set = WriteSet::new();
        let flag = Arc::new(AtomicBool::new(false));
        let flag2 = flag.clone();
        set.push(WriteHandle::new(|_| {}, move || flag2.store(true, Ordering::SeqCst)));
        set.abort_all();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn write_set_table_round_trips() {
        let table = WriteSetTable::new();
        let trx = TrxId::new(1);
        let set = table.get_or_create(trx);
        set.push(WriteHandle::new(|_| {}, || {}));
        let taken = table.take(trx).unwrap();
        assert_eq!(taken.len(), 1);
        assert!(table.take(trx).is_none());
    }
}
