//! C4 — Property Row List.
//!
//! An unbounded ordered list of `(pid, MvccList<PropertyVersion>)` cells,
//! logically grouped into fixed-capacity rows chained by `next`
//! (spec.md §4.4). This crate flattens the row-chain into a single
//! `Vec<PropertyCell>` guarded by one lock rather than reproducing the
//! C++ original's physical row/slab layout — see DESIGN.md. A hash index
//! (`cell_map`) is built once the cell count exceeds one row's capacity, to
//! avoid a linear scan on the hot path.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::alloc::ValueStore;
use crate::config::IsoLevel;
use crate::ids::{Pid, Timestamp, TrxId};
use crate::mvcc::{AppendOutcome, DependencyRecorder, MvccList, PropertyVersion, ValueHeader};

/// Outcome of a property read (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStat {
    Success(ValueHeader),
    NotFound,
    Abort,
}

/// Outcome of a property write. `None` signals a write-write conflict the
/// caller must treat as an abort (spec.md §4.4 `process_modify_property`).
pub struct ModifyOutcome {
    pub is_modify: bool,
    pub old_value: Option<ValueHeader>,
}

struct PropertyCell {
    pid: Pid,
    mvcc: MvccList<PropertyVersion>,
}

struct Inner {
    cells: Vec<PropertyCell>,
    cell_map: Option<HashMap<Pid, usize>>,
    row_capacity: usize,
}

impl Inner {
    fn find(&self, pid: Pid) -> Option<usize> {
        if let Some(map) = &self.cell_map {
            return map.get(&pid).copied();
        }
        self.cells.iter().position(|c| c.pid == pid)
    }

    fn maybe_build_index(&mut self) {
        if self.cell_map.is_none() && self.cells.len() > self.row_capacity {
            let map = self.cells.iter().enumerate().map(|(i, c)| (c.pid, i)).collect();
            self.cell_map = Some(map);
        }
    }
}

/// Reader-priority rwlock in the original guards `{head, tail,
/// property_count, cell_map}`; `gc_rwlock_` is writer-preferred and held by
/// GC/defragment. Both are modeled here with `parking_lot::RwLock` — see
/// DESIGN.md for why bit-for-bit fairness isn't reproduced.
pub struct PropertyRowList {
    inner: RwLock<Inner>,
    gc_lock: RwLock<()>,
}

impl PropertyRowList {
    pub fn new(row_capacity: usize) -> Self {
        PropertyRowList {
            inner: RwLock::new(Inner {
                cells: Vec::new(),
                cell_map: None,
                row_capacity,
            }),
            gc_lock: RwLock::new(()),
        }
    }

    pub fn property_count(&self) -> usize {
        self.inner.read().cells.len()
    }

    /// Load-time only: no MVCC history, a single initial version.
    pub fn insert_initial_cell(&self, pid: Pid, value: ValueHeader) {
        let mut inner = self.inner.write();
        let mvcc = MvccList::new();
        mvcc.append_initial_version(PropertyVersion { header: value });
        inner.cells.push(PropertyCell { pid, mvcc });
        inner.maybe_build_index();
    }

    pub fn read_property(
        &self,
        pid: Pid,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        iso: IsoLevel,
        opt_preread: bool,
        dep: &dyn DependencyRecorder,
    ) -> ReadStat {
        let inner = self.inner.read();
        let Some(idx) = inner.find(pid) else {
            return ReadStat::NotFound;
        };
        let visible = inner.cells[idx]
            .mvcc
            .get_visible_version(trx_id, begin_time, read_only, iso, opt_preread, dep);
        if !visible.ok {
            return ReadStat::Abort;
        }
        match visible.value {
            Some(v) if !v.is_empty() => ReadStat::Success(v.header),
            _ => ReadStat::NotFound,
        }
    }

    /// Batched read over an explicit key list (spec.md
    /// `read_property_by_key_list`).
    pub fn read_property_by_key_list(
        &self,
        pids: &[Pid],
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        iso: IsoLevel,
        opt_preread: bool,
        dep: &dyn DependencyRecorder,
    ) -> Vec<(Pid, ReadStat)> {
        pids.iter()
            .map(|&pid| (pid, self.read_property(pid, trx_id, begin_time, read_only, iso, opt_preread, dep)))
            .collect()
    }

    /// All properties visible to the reader (spec.md `read_all_property`).
    pub fn read_all_property(
        &self,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        iso: IsoLevel,
        opt_preread: bool,
        dep: &dyn DependencyRecorder,
    ) -> Result<Vec<(Pid, ValueHeader)>, ()> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for cell in &inner.cells {
            let visible = cell.mvcc.get_visible_version(trx_id, begin_time, read_only, iso, opt_preread, dep);
            if !visible.ok {
                return Err(());
            }
            if let Some(v) = visible.value {
                if !v.is_empty() {
                    out.push((cell.pid, v.header));
                }
            }
        }
        Ok(out)
    }

    /// Just the pid list currently tracked (spec.md `read_pid_list`); does
    /// not filter by visibility, matching the "keys()" step's use as a
    /// coarse catalog operation.
    pub fn read_pid_list(&self) -> Vec<Pid> {
        self.inner.read().cells.iter().map(|c| c.pid).collect()
    }

    /// Appends a new version on the cell's chain, allocating the cell first
    /// if it doesn't exist yet (write-lock scope for the allocation only).
    pub fn process_modify_property(
        &self,
        pid: Pid,
        value: ValueHeader,
        trx_id: TrxId,
        begin_time: Timestamp,
    ) -> Option<ModifyOutcome> {
        let idx = {
            let inner = self.inner.read();
            inner.find(pid)
        };
        let idx = match idx {
            Some(i) => i,
            None => {
                let mut inner = self.inner.write();
                // Re-check under the write lock: someone may have raced us.
                if let Some(i) = inner.find(pid) {
                    i
                } else {
                    let mvcc = MvccList::new();
                    mvcc.append_initial_version(PropertyVersion::empty());
                    inner.cells.push(PropertyCell { pid, mvcc });
                    inner.maybe_build_index();
                    inner.cells.len() - 1
                }
            }
        };
        let inner = self.inner.read();
        match inner.cells[idx].mvcc.append_version(trx_id, begin_time, PropertyVersion { header: value }) {
            AppendOutcome::Conflict => None,
            AppendOutcome::Appended { old_value } => Some(ModifyOutcome {
                is_modify: old_value.is_some(),
                old_value: old_value.and_then(|v| if v.is_empty() { None } else { Some(v.header) }),
            }),
        }
    }

    /// Appends an "empty" version, representing a drop.
    pub fn process_drop_property(&self, pid: Pid, trx_id: TrxId, begin_time: Timestamp) -> Option<Option<ValueHeader>> {
        let inner = self.inner.read();
        let idx = inner.find(pid)?;
        match inner.cells[idx].mvcc.append_version(trx_id, begin_time, PropertyVersion::empty()) {
            AppendOutcome::Conflict => None,
            AppendOutcome::Appended { old_value } => {
                Some(old_value.and_then(|v| if v.is_empty() { None } else { Some(v.header) }))
            }
        }
    }

    /// Commits the named cell's uncommitted tail. Used by the commit expert
    /// via a [`crate::txn::write_set::WriteHandle`] captured at write time.
    pub fn commit_cell(&self, pid: Pid, trx_id: TrxId, commit_time: Timestamp) {
        let inner = self.inner.read();
        if let Some(idx) = inner.find(pid) {
            inner.cells[idx].mvcc.commit_version(trx_id, commit_time);
        }
    }

    /// Aborts the named cell's uncommitted tail.
    pub fn abort_cell(&self, pid: Pid, trx_id: TrxId, store: &ValueStore, tid: usize) {
        let inner = self.inner.read();
        if let Some(idx) = inner.find(pid) {
            inner.cells[idx].mvcc.abort_version(trx_id, store, tid);
        }
    }

    /// Frees every cell's entire MVCC chain. Called when the owning
    /// element's row list is being torn down.
    pub fn self_garbage_collect(&self, store: &ValueStore, tid: usize) {
        let _guard = self.gc_lock.write();
        let inner = self.inner.read();
        for cell in &inner.cells {
            cell.mvcc.self_garbage_collect(store, tid);
        }
    }

    /// Compacts out cells whose chain has already been fully collected.
    pub fn self_defragment(&self) {
        let _guard = self.gc_lock.write();
        let mut inner = self.inner.write();
        inner.cells.retain(|_c| true); // placeholder for slab-level compaction; see DESIGN.md
        inner.cell_map = None;
        inner.maybe_build_index();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDep;
    impl DependencyRecorder for NoopDep {
        fn record(&self, _r: TrxId, _w: TrxId, _k: crate::mvcc::DepKind) {}
    }

    #[test]
    fn insert_initial_then_read_under_zero_zero() {
        let rows = PropertyRowList::new(4);
        let header = ValueHeader { head_offset: 0, byte_count: 3 };
        rows.insert_initial_cell(Pid::new(1), header);
        let stat = rows.read_property(
            Pid::new(1),
            TrxId::new(0),
            Timestamp::new(0),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert_eq!(stat, ReadStat::Success(header));
    }

    #[test]
    fn unknown_pid_is_not_found() {
        let rows = PropertyRowList::new(4);
        let stat = rows.read_property(
            Pid::new(9),
            TrxId::new(0),
            Timestamp::new(0),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert_eq!(stat, ReadStat::NotFound);
    }

    #[test]
    fn modify_then_drop_then_read_not_found() {
        let rows = PropertyRowList::new(4);
        let trx = TrxId::new(1);
        let header = ValueHeader { head_offset: 0, byte_count: 4 };
        let outcome = rows.process_modify_property(Pid::new(2), header, trx, Timestamp::new(1));
        assert!(outcome.is_some());
        rows.process_modify_property(Pid::new(2), header, trx, Timestamp::new(1));
        // still uncommitted under same trx — commit then drop:
        {
            let inner = rows.inner.read();
            let idx = inner.find(Pid::new(2)).unwrap();
            inner.cells[idx].mvcc.commit_version(trx, Timestamp::new(5));
        }
        let drop_trx = TrxId::new(2);
        let dropped = rows.process_drop_property(Pid::new(2), drop_trx, Timestamp::new(6));
        assert!(dropped.is_some());
        {
            let inner = rows.inner.read();
            let idx = inner.find(Pid::new(2)).unwrap();
            inner.cells[idx].mvcc.commit_version(drop_trx, Timestamp::new(7));
        }
        let stat = rows.read_property(
            Pid::new(2),
            TrxId::new(3),
            Timestamp::new(8),
            true,
            IsoLevel::Serializable,
            true,
            &NoopDep,
        );
        assert_eq!(stat, ReadStat::NotFound);
    }

    #[test]
    fn cell_map_builds_once_over_capacity() {
        let rows = PropertyRowList::new(2);
        for i in 0..5u16 {
            rows.insert_initial_cell(Pid::new(i), ValueHeader { head_offset: 0, byte_count: 1 });
        }
        assert!(rows.inner.read().cell_map.is_some());
    }
}
