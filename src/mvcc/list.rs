//! C3 — MVCC List.
//!
//! A singly-linked version chain per logical item (spec.md §3.2, §4.3).
//! Represented here as a lock-guarded `Vec` in commit order rather than a
//! pointer chain over the cell allocator — the per-chain allocation pattern
//! (a handful of live versions before GC trims it) doesn't need slab-level
//! cell reuse the way high-cardinality property/topology rows do; see
//! DESIGN.md.

use parking_lot::Mutex;

use crate::config::IsoLevel;
use crate::ids::{Timestamp, TrxId};
use crate::mvcc::item::ValueGc;

/// Whether a reader is read-only (affects pre-read dependency kind, spec.md
/// §4.3).
pub type ReadOnly = bool;

/// The commit/visibility state of one item in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionState {
    /// Committed and visible in `[begin, end)`.
    Committed { begin: Timestamp, end: Timestamp },
    /// The tail, written by `trx` but not yet committed. `pre_read_time`
    /// carries the writer's own begin timestamp, used only so a pre-reader
    /// can decide whether it started after the writer (spec.md §4.3).
    Uncommitted { trx: TrxId, pre_read_time: Timestamp },
}

struct MvccItem<T> {
    state: VersionState,
    value: T,
}

/// Outcome of a dependency-kind lookup a caller's `DependencyRecorder`
/// performs so the MVCC list never needs to know about transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    /// Self commits only if the other transaction also commits.
    Homo,
    /// Self commits only if the other transaction aborts.
    Hetero,
}

/// Hook the caller supplies so `get_visible_version` can record a pre-read
/// dependency without `crate::mvcc` depending on the transaction-bookkeeping
/// module (spec.md §4.6 `dep_trx_map`).
pub trait DependencyRecorder {
    fn record(&self, reader: TrxId, writer: TrxId, kind: DepKind);
}

/// `(ok, visible, value)` as named in spec.md §4.3. `ok = false` means the
/// reader must abort.
pub struct VisibleVersion<T> {
    pub ok: bool,
    pub value: Option<T>,
}

impl<T> VisibleVersion<T> {
    fn abort() -> Self {
        VisibleVersion { ok: false, value: None }
    }
    fn none() -> Self {
        VisibleVersion { ok: true, value: None }
    }
    fn some(value: T) -> Self {
        VisibleVersion { ok: true, value: Some(value) }
    }
}

/// Result of [`MvccList::append_version`].
pub enum AppendOutcome<T> {
    /// The current tail is uncommitted by a different transaction: a
    /// write-write conflict the caller must treat as an abort.
    Conflict,
    /// Append succeeded. `old_value` is whatever this append discarded: the
    /// previously committed tail on a fresh append, or — when the same
    /// transaction rewrites its own uncommitted tail again before committing
    /// — that discarded uncommitted value itself, so the caller can free it.
    Appended { old_value: Option<T> },
}

pub struct MvccList<T> {
    items: Mutex<Vec<MvccItem<T>>>,
}

impl<T: Clone + Default + ValueGc> Default for MvccList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Default + ValueGc> MvccList<T> {
    pub fn new() -> Self {
        MvccList { items: Mutex::new(Vec::new()) }
    }

    /// Load-time only: creates a single committed item spanning `[MIN, MAX)`.
    pub fn append_initial_version(&self, value: T) {
        let mut items = self.items.lock();
        assert!(items.is_empty(), "append_initial_version on a non-empty chain");
        items.push(MvccItem {
            state: VersionState::Committed { begin: Timestamp::MIN, end: Timestamp::MAX },
            value,
        });
    }

    /// Appends a new uncommitted tail for `trx_id`, unless the current tail
    /// is uncommitted by a different transaction (write-write conflict).
    pub fn append_version(&self, trx_id: TrxId, begin_time: Timestamp, new_value: T) -> AppendOutcome<T> {
        let mut items = self.items.lock();
        if let Some(tail) = items.last() {
            if let VersionState::Uncommitted { trx, .. } = tail.state {
                if trx != trx_id {
                    return AppendOutcome::Conflict;
                }
                // Same transaction re-writing before commit: replace the tail in
                // place and hand back the discarded uncommitted value itself
                // (not the prior committed value, which is still visible to
                // everyone else and was never discarded) so the caller can free it.
                let last = items.last_mut().unwrap();
                let discarded = std::mem::replace(&mut last.value, new_value);
                return AppendOutcome::Appended { old_value: Some(discarded) };
            }
        }
        let old_value = items.last().map(|item| item.value.clone());
        items.push(MvccItem {
            state: VersionState::Uncommitted { trx: trx_id, pre_read_time: begin_time },
            value: new_value,
        });
        AppendOutcome::Appended { old_value }
    }

    /// Promotes the uncommitted tail. Idempotent for the same
    /// `(trx_id, commit_time)`.
    pub fn commit_version(&self, trx_id: TrxId, commit_time: Timestamp) {
        let mut items = self.items.lock();
        let len = items.len();
        if len == 0 {
            return;
        }
        {
            let tail = &items[len - 1];
            match tail.state {
                VersionState::Committed { end, .. } if end == commit_time => return, // idempotent
                VersionState::Uncommitted { trx, .. } if trx == trx_id => {}
                _ => return,
            }
        }
        if len >= 2 {
            if let VersionState::Committed { begin, .. } = items[len - 2].state {
                items[len - 2].state = VersionState::Committed { begin, end: commit_time };
            }
        }
        items[len - 1].state = VersionState::Committed { begin: commit_time, end: Timestamp::MAX };
    }

    /// Detaches the uncommitted tail belonging to `trx_id`, runs its
    /// value-level GC, and restores the prior item's `end := MAX`.
    pub fn abort_version(&self, trx_id: TrxId, store: &crate::alloc::ValueStore, tid: usize) {
        let mut items = self.items.lock();
        let len = items.len();
        if len == 0 {
            return;
        }
        let is_mine = matches!(items[len - 1].state, VersionState::Uncommitted { trx, .. } if trx == trx_id);
        if !is_mine {
            return;
        }
        let removed = items.pop().unwrap();
        removed.value.value_gc(store, tid);
        if let Some(prev) = items.last_mut() {
            if let VersionState::Committed { begin, .. } = prev.state {
                prev.state = VersionState::Committed { begin, end: Timestamp::MAX };
            }
        }
    }

    /// `get_visible_version` dispatching on isolation level (spec.md §4.3).
    pub fn get_visible_version(
        &self,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: ReadOnly,
        iso: IsoLevel,
        opt_preread: bool,
        dep: &dyn DependencyRecorder,
    ) -> VisibleVersion<T> {
        match iso {
            IsoLevel::Snapshot => self.snapshot_visible(begin_time),
            IsoLevel::Serializable => {
                self.serializable_visible(trx_id, begin_time, read_only, opt_preread, dep)
            }
        }
    }

    fn committed_visible_at(items: &[MvccItem<T>], begin_time: Timestamp) -> Option<T> {
        for item in items.iter().rev() {
            if let VersionState::Committed { begin, end } = item.state {
                if begin <= begin_time && begin_time < end {
                    return Some(item.value.clone());
                }
            }
        }
        None
    }

    fn last_committed(items: &[MvccItem<T>]) -> Option<T> {
        let committed_len = match items.last() {
            Some(item) if matches!(item.state, VersionState::Uncommitted { .. }) => items.len() - 1,
            _ => items.len(),
        };
        items[..committed_len]
            .iter()
            .rev()
            .find_map(|item| match item.state {
                VersionState::Committed { .. } => Some(item.value.clone()),
                VersionState::Uncommitted { .. } => None,
            })
    }

    fn snapshot_visible(&self, begin_time: Timestamp) -> VisibleVersion<T> {
        let items = self.items.lock();
        match Self::committed_visible_at(&items, begin_time) {
            Some(v) => VisibleVersion::some(v),
            None => VisibleVersion::none(),
        }
    }

    fn serializable_visible(
        &self,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: ReadOnly,
        opt_preread: bool,
        dep: &dyn DependencyRecorder,
    ) -> VisibleVersion<T> {
        let items = self.items.lock();
        if let Some(tail) = items.last() {
            if let VersionState::Uncommitted { trx, pre_read_time } = tail.state {
                if trx == trx_id {
                    return VisibleVersion::some(tail.value.clone());
                }
                if opt_preread && pre_read_time < begin_time {
                    if read_only {
                        dep.record(trx_id, trx, DepKind::Hetero);
                        return match Self::last_committed(&items) {
                            Some(v) => VisibleVersion::some(v),
                            None => VisibleVersion::none(),
                        };
                    }
                    dep.record(trx_id, trx, DepKind::Homo);
                    return VisibleVersion::some(tail.value.clone());
                }
                // Writer started after us and hasn't committed: nothing newer is visible.
                return match Self::committed_visible_at(&items, begin_time) {
                    Some(v) => VisibleVersion::some(v),
                    None => VisibleVersion::none(),
                };
            }
        }
        match Self::committed_visible_at(&items, begin_time) {
            Some(v) => VisibleVersion::some(v),
            None => VisibleVersion::none(),
        }
    }

    /// Frees every item's value then drops the chain.
    pub fn self_garbage_collect(&self, store: &crate::alloc::ValueStore, tid: usize) {
        let mut items = self.items.lock();
        for item in items.drain(..) {
            item.value.value_gc(store, tid);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

// `get_visible_version`'s abort path is reserved for read kinds that cannot
// be represented by the payload alone (e.g. a caller-side filter deciding an
// already-aborted reader must stop). The storage layer (`crate::storage`)
// is responsible for translating that into `VisibleVersion::abort()`-style
// behaviour by checking transaction status before calling in; kept as an
// associated function so experts can construct it directly.
impl<T> VisibleVersion<T> {
    pub fn forced_abort() -> Self {
        VisibleVersion::abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::ValueStore;
    use crate::mvcc::item::VertexExistence;

    struct NoopDep;
    impl DependencyRecorder for NoopDep {
        fn record(&self, _reader: TrxId, _writer: TrxId, _kind: DepKind) {}
    }

    fn store() -> ValueStore {
        ValueStore::new(8, 64, 1, 8)
    }

    #[test]
    fn initial_version_is_visible_everywhere() {
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let r = list.get_visible_version(
            TrxId::new(1),
            Timestamp::new(0),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert!(r.ok);
        assert_eq!(r.value, Some(VertexExistence(true)));
    }

    #[test]
    fn append_then_abort_restores_prior_state() {
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let trx = TrxId::new(2);
        match list.append_version(trx, Timestamp::new(5), VertexExistence(false)) {
            AppendOutcome::Appended { old_value } => assert_eq!(old_value, Some(VertexExistence(true))),
            AppendOutcome::Conflict => panic!("unexpected conflict"),
        }
        assert_eq!(list.len(), 2);
        let store = store();
        list.abort_version(trx, &store, 0);
        assert_eq!(list.len(), 1);
        let r = list.get_visible_version(
            TrxId::new(3),
            Timestamp::new(10),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert_eq!(r.value, Some(VertexExistence(true)));
    }

    #[test]
    fn second_writer_conflicts_before_commit() {
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let t1 = TrxId::new(1);
        let t2 = TrxId::new(2);
        list.append_version(t1, Timestamp::new(1), VertexExistence(false));
        match list.append_version(t2, Timestamp::new(2), VertexExistence(false)) {
            AppendOutcome::Conflict => {}
            AppendOutcome::Appended { .. } => panic!("expected conflict"),
        }
    }

    #[test]
    fn same_trx_rewrite_returns_the_discarded_uncommitted_value() {
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let trx = TrxId::new(1);
        list.append_version(trx, Timestamp::new(1), VertexExistence(false));
        match list.append_version(trx, Timestamp::new(1), VertexExistence(true)) {
            AppendOutcome::Appended { old_value } => assert_eq!(old_value, Some(VertexExistence(false))),
            AppendOutcome::Conflict => panic!("same transaction should never conflict with itself"),
        }
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn commit_then_later_reader_sees_new_value() {
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let t1 = TrxId::new(1);
        list.append_version(t1, Timestamp::new(1), VertexExistence(false));
        list.commit_version(t1, Timestamp::new(10));

        let before = list.get_visible_version(
            TrxId::new(2),
            Timestamp::new(5),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert_eq!(before.value, Some(VertexExistence(true)));

        let after = list.get_visible_version(
            TrxId::new(3),
            Timestamp::new(11),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert_eq!(after.value, Some(VertexExistence(false)));
    }

    #[test]
    fn preread_registers_homo_dependency_for_writer() {
        struct Rec(Mutex<Vec<(TrxId, TrxId, DepKind)>>);
        impl DependencyRecorder for Rec {
            fn record(&self, reader: TrxId, writer: TrxId, kind: DepKind) {
                self.0.lock().push((reader, writer, kind));
            }
        }
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let writer = TrxId::new(1);
        list.append_version(writer, Timestamp::new(1), VertexExistence(false));

        let rec = Rec(Mutex::new(Vec::new()));
        let reader = TrxId::new(2);
        let r = list.get_visible_version(
            reader,
            Timestamp::new(5),
            false,
            IsoLevel::Serializable,
            true,
            &rec,
        );
        assert_eq!(r.value, Some(VertexExistence(false)));
        let recorded = rec.0.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], (reader, writer, DepKind::Homo));
    }

    #[test]
    fn readonly_preread_registers_hetero_and_returns_last_committed() {
        struct Rec(Mutex<Vec<(TrxId, TrxId, DepKind)>>);
        impl DependencyRecorder for Rec {
            fn record(&self, reader: TrxId, writer: TrxId, kind: DepKind) {
                self.0.lock().push((reader, writer, kind));
            }
        }
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let writer = TrxId::new(1);
        list.append_version(writer, Timestamp::new(1), VertexExistence(false));

        let rec = Rec(Mutex::new(Vec::new()));
        let reader = TrxId::new(2);
        let r = list.get_visible_version(
            reader,
            Timestamp::new(5),
            true,
            IsoLevel::Serializable,
            true,
            &rec,
        );
        assert_eq!(r.value, Some(VertexExistence(true)));
        assert_eq!(rec.0.lock()[0].2, DepKind::Hetero);
    }

    #[test]
    fn snapshot_isolation_never_prereads() {
        let list = MvccList::<VertexExistence>::new();
        list.append_initial_version(VertexExistence(true));
        let writer = TrxId::new(1);
        list.append_version(writer, Timestamp::new(1), VertexExistence(false));

        let r = list.get_visible_version(
            TrxId::new(2),
            Timestamp::new(5),
            false,
            IsoLevel::Snapshot,
            true,
            &NoopDep,
        );
        assert_eq!(r.value, Some(VertexExistence(true)));
    }
}
