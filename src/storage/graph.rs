//! C6 — Data Storage: the graph façade composing C3–C5 into a CRUD/read API.
//!
//! `out_edge_map`/`in_edge_map` (spec.md §4.6) are not separate global maps
//! here — per [`crate::storage::topology_row`], each vertex's own
//! [`TopologyRowList`] realizes both sides. The edge property row list lives
//! only on the out-side `EdgeVersion`, per spec.md §3.3.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::alloc::{ValueHeader, ValueStore};
use crate::config::IsoLevel;
use crate::id_mapper::IdMapper;
use crate::ids::{Eid, ElementKind, Pid, Timestamp, TrxId, Vid};
use crate::mvcc::{AppendOutcome, DependencyRecorder, EdgeVersion, MvccList, VertexExistence};
use crate::storage::property_row::PropertyRowList;
use crate::storage::topology_row::{Direction, TopologyRowList};
use crate::txn::rct::{Primitive, RecentActionTable, WriteRecord};
use crate::txn::write_set::{WriteHandle, WriteSet};

/// Outcome of a graph-level read. Mirrors C4's `READ_STAT` but generic over
/// the payload, so vertex-label and property reads share one shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStat<T> {
    Success(T),
    NotFound,
    Abort,
}

/// Outcome of a graph-level write. `Abort` carries the primitive so the
/// caller (the validation/diagnostic path) knows which write category
/// failed, per spec.md §7 "`PROCESS_STAT::ABORT_*`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStat<T> {
    Success(T),
    Abort(Primitive),
}

impl<T> ProcessStat<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessStat::Success(_))
    }
}

/// `{ label, topology_row_list, property_row_list, existence_mvcc_list }`
/// (spec.md §3.3). Heap-allocated and owned by the vertex map; reclaimed via
/// GC once removed and no longer referenced.
pub struct Vertex {
    pub label: u32,
    pub topology: TopologyRowList<PropertyRowList>,
    pub properties: PropertyRowList,
    pub existence: MvccList<VertexExistence>,
}

type EdgeChain = Arc<MvccList<EdgeVersion<PropertyRowList>>>;

/// Owns the vertex map and the two value stores; composes C3–C5 behind a
/// single CRUD/read surface (spec.md §4.6).
pub struct Graph {
    vertices: DashMap<Vid, Arc<Vertex>>,
    next_vid: AtomicU32,
    vertex_values: Arc<ValueStore>,
    edge_values: Arc<ValueStore>,
    rct: Arc<RecentActionTable>,
    id_mapper: Arc<dyn IdMapper>,
    row_capacity: usize,
    iso_level: IsoLevel,
    opt_preread: bool,
}

impl Graph {
    pub fn new(
        vertex_values: Arc<ValueStore>,
        edge_values: Arc<ValueStore>,
        rct: Arc<RecentActionTable>,
        id_mapper: Arc<dyn IdMapper>,
        row_capacity: usize,
        iso_level: IsoLevel,
        opt_preread: bool,
    ) -> Self {
        Graph {
            vertices: DashMap::new(),
            next_vid: AtomicU32::new(1),
            vertex_values,
            edge_values,
            rct,
            id_mapper,
            row_capacity,
            iso_level,
            opt_preread,
        }
    }

    fn allocate_vid(&self) -> Vid {
        Vid::new(self.next_vid.fetch_add(1, Ordering::Relaxed))
    }

    fn vertex(&self, vid: Vid) -> Option<Arc<Vertex>> {
        if !self.id_mapper.is_local(vid) {
            return None;
        }
        self.vertices.get(&vid).map(|e| e.clone())
    }

    fn visible_existence(
        &self,
        vertex: &Vertex,
        trx_id: TrxId,
        begin_time: Timestamp,
        dep: &dyn DependencyRecorder,
    ) -> ReadStat<()> {
        let r = vertex
            .existence
            .get_visible_version(trx_id, begin_time, false, self.iso_level, self.opt_preread, dep);
        if !r.ok {
            return ReadStat::Abort;
        }
        match r.value {
            Some(VertexExistence(true)) => ReadStat::Success(()),
            _ => ReadStat::NotFound,
        }
    }

    // ---- load-time construction -------------------------------------

    /// Inserts a vertex with no MVCC history, for bulk loading.
    pub fn insert_initial_vertex(&self, vid: Vid, label: u32) -> Arc<Vertex> {
        let vertex = Arc::new(Vertex {
            label,
            topology: TopologyRowList::new(self.row_capacity),
            properties: PropertyRowList::new(self.row_capacity),
            existence: MvccList::new(),
        });
        vertex.existence.append_initial_version(VertexExistence(true));
        self.vertices.insert(vid, vertex.clone());
        vertex
    }

    // ---- reads ---------------------------------------------------------

    pub fn read_vertex_label(
        &self,
        vid: Vid,
        trx_id: TrxId,
        begin_time: Timestamp,
        dep: &dyn DependencyRecorder,
    ) -> ReadStat<u32> {
        let Some(vertex) = self.vertex(vid) else {
            return ReadStat::NotFound;
        };
        match self.visible_existence(&vertex, trx_id, begin_time, dep) {
            ReadStat::Success(()) => ReadStat::Success(vertex.label),
            ReadStat::NotFound => ReadStat::NotFound,
            ReadStat::Abort => ReadStat::Abort,
        }
    }

    pub fn read_connected_vertex(
        &self,
        vid: Vid,
        direction: Direction,
        label_filter: Option<u32>,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        dep: &dyn DependencyRecorder,
    ) -> Result<Vec<Vid>, ()> {
        let Some(vertex) = self.vertex(vid) else {
            return Ok(Vec::new());
        };
        vertex.topology.read_connected_vertex(
            direction,
            label_filter,
            trx_id,
            begin_time,
            read_only,
            self.iso_level,
            self.opt_preread,
            dep,
        )
    }

    pub fn read_connected_edges(
        &self,
        vid: Vid,
        direction: Direction,
        label_filter: Option<u32>,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        dep: &dyn DependencyRecorder,
    ) -> Result<Vec<(Vid, EdgeChain)>, ()> {
        let Some(vertex) = self.vertex(vid) else {
            return Ok(Vec::new());
        };
        vertex.topology.read_connected_edges(
            direction,
            label_filter,
            trx_id,
            begin_time,
            read_only,
            self.iso_level,
            self.opt_preread,
            dep,
        )
    }

    pub fn read_vertex_property(
        &self,
        vid: Vid,
        pid: Pid,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        dep: &dyn DependencyRecorder,
    ) -> ReadStat<(u8, Vec<u8>)> {
        let Some(vertex) = self.vertex(vid) else {
            return ReadStat::NotFound;
        };
        self.read_property_header(&vertex.properties, &self.vertex_values, pid, trx_id, begin_time, read_only, dep)
    }

    pub fn read_edge_property(
        &self,
        chain: &EdgeChain,
        pid: Pid,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        dep: &dyn DependencyRecorder,
    ) -> ReadStat<(u8, Vec<u8>)> {
        let visible = chain.get_visible_version(trx_id, begin_time, read_only, self.iso_level, self.opt_preread, dep);
        if !visible.ok {
            return ReadStat::Abort;
        }
        let Some(v) = visible.value else { return ReadStat::NotFound };
        if v.is_deleted() {
            return ReadStat::NotFound;
        }
        let Some(props) = v.prop_row_list else { return ReadStat::NotFound };
        self.read_property_header(&props, &self.edge_values, pid, trx_id, begin_time, read_only, dep)
    }

    /// Looks up the out-side MVCC chain for `src -> dst`, if present. Lets
    /// experts that only have a `(src, dst)` pair (e.g. from an `Eid`) reach
    /// edge property writes without re-deriving it from scratch.
    pub fn edge_chain(&self, src: Vid, dst: Vid) -> Option<EdgeChain> {
        self.vertex(src)?.topology.find_chain(true, dst)
    }

    fn read_property_header(
        &self,
        props: &PropertyRowList,
        store: &ValueStore,
        pid: Pid,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        dep: &dyn DependencyRecorder,
    ) -> ReadStat<(u8, Vec<u8>)> {
        use crate::storage::property_row::ReadStat as PropReadStat;
        match props.read_property(pid, trx_id, begin_time, read_only, self.iso_level, self.opt_preread, dep) {
            PropReadStat::Success(header) => ReadStat::Success(store.read(header)),
            PropReadStat::NotFound => ReadStat::NotFound,
            PropReadStat::Abort => ReadStat::Abort,
        }
    }

    // ---- writes ----------------------------------------------------------

    pub fn process_add_vertex(
        &self,
        label: u32,
        trx_id: TrxId,
        begin_time: Timestamp,
        writes: &WriteSet,
    ) -> ProcessStat<Vid> {
        let vid = self.allocate_vid();
        let vertex = Arc::new(Vertex {
            label,
            topology: TopologyRowList::new(self.row_capacity),
            properties: PropertyRowList::new(self.row_capacity),
            existence: MvccList::new(),
        });
        match vertex.existence.append_version(trx_id, begin_time, VertexExistence(true)) {
            AppendOutcome::Appended { .. } => {}
            AppendOutcome::Conflict => unreachable!("fresh vertex cannot conflict"),
        }
        self.vertices.insert(vid, vertex.clone());
        self.rct.record(
            Primitive::Iv,
            trx_id,
            WriteRecord { item_id: vid.raw() as u64, pid: Pid::new(0), element_kind: ElementKind::Vertex },
        );
        let commit_vertex = vertex.clone();
        let abort_vertex = vertex;
        let vertex_values = self.vertex_values.clone();
        writes.push(WriteHandle::new(
            move |ts| commit_vertex.existence.commit_version(trx_id, ts),
            move || abort_vertex.existence.abort_version(trx_id, &vertex_values, 0),
        ));
        ProcessStat::Success(vid)
    }

    pub fn process_drop_vertex(
        &self,
        vid: Vid,
        trx_id: TrxId,
        begin_time: Timestamp,
        dep: &dyn DependencyRecorder,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let Some(vertex) = self.vertex(vid) else {
            return ProcessStat::Abort(Primitive::Dv);
        };
        if !matches!(self.visible_existence(&vertex, trx_id, begin_time, dep), ReadStat::Success(())) {
            return ProcessStat::Abort(Primitive::Dv);
        }
        match vertex.existence.append_version(trx_id, begin_time, VertexExistence(false)) {
            AppendOutcome::Conflict => return ProcessStat::Abort(Primitive::Dv),
            AppendOutcome::Appended { .. } => {}
        }
        self.rct.record(
            Primitive::Dv,
            trx_id,
            WriteRecord { item_id: vid.raw() as u64, pid: Pid::new(0), element_kind: ElementKind::Vertex },
        );
        let commit_vertex = vertex.clone();
        let abort_vertex = vertex;
        let vertex_values = self.vertex_values.clone();
        writes.push(WriteHandle::new(
            move |ts| commit_vertex.existence.commit_version(trx_id, ts),
            move || abort_vertex.existence.abort_version(trx_id, &vertex_values, 0),
        ));
        ProcessStat::Success(())
    }

    pub fn process_add_edge(
        &self,
        src: Vid,
        dst: Vid,
        label: u32,
        trx_id: TrxId,
        begin_time: Timestamp,
        dep: &dyn DependencyRecorder,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let Some(src_v) = self.vertex(src) else { return ProcessStat::Abort(Primitive::Ie) };
        let Some(dst_v) = self.vertex(dst) else { return ProcessStat::Abort(Primitive::Ie) };
        if !matches!(self.visible_existence(&src_v, trx_id, begin_time, dep), ReadStat::Success(()))
            || !matches!(self.visible_existence(&dst_v, trx_id, begin_time, dep), ReadStat::Success(()))
        {
            return ProcessStat::Abort(Primitive::Ie);
        }
        if src_v.topology.find_chain(true, dst).is_some() {
            return ProcessStat::Abort(Primitive::Ie);
        }
        let ep_row_list = Arc::new(PropertyRowList::new(self.row_capacity));
        let out_chain = src_v.topology.process_add_edge(true, dst, label, Some(ep_row_list), trx_id, begin_time);
        let in_chain = dst_v.topology.process_add_edge(false, src, label, None, trx_id, begin_time);

        self.rct.record(
            Primitive::Ie,
            trx_id,
            WriteRecord { item_id: Eid::new(src, dst).pack(), pid: Pid::new(0), element_kind: ElementKind::OutEdge },
        );

        let commit_out = out_chain.clone();
        let commit_in = in_chain.clone();
        let edge_values = self.edge_values.clone();
        writes.push(WriteHandle::new(
            move |ts| {
                commit_out.commit_version(trx_id, ts);
                commit_in.commit_version(trx_id, ts);
            },
            move || {
                out_chain.abort_version(trx_id, &edge_values, 0);
                in_chain.abort_version(trx_id, &edge_values, 0);
            },
        ));
        ProcessStat::Success(())
    }

    pub fn process_drop_edge(
        &self,
        src: Vid,
        dst: Vid,
        trx_id: TrxId,
        begin_time: Timestamp,
        read_only: bool,
        dep: &dyn DependencyRecorder,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let Some(src_v) = self.vertex(src) else { return ProcessStat::Abort(Primitive::De) };
        let Some(dst_v) = self.vertex(dst) else { return ProcessStat::Abort(Primitive::De) };
        let Some(out_chain) = src_v.topology.find_chain(true, dst) else {
            return ProcessStat::Abort(Primitive::De);
        };
        let Some(in_chain) = dst_v.topology.find_chain(false, src) else {
            return ProcessStat::Abort(Primitive::De);
        };
        let visible = out_chain.get_visible_version(trx_id, begin_time, read_only, self.iso_level, self.opt_preread, dep);
        if !visible.ok {
            return ProcessStat::Abort(Primitive::De);
        }
        match visible.value {
            Some(v) if !v.is_deleted() => {}
            _ => return ProcessStat::Abort(Primitive::De),
        }
        match out_chain.append_version(trx_id, begin_time, EdgeVersion::deleted()) {
            AppendOutcome::Conflict => return ProcessStat::Abort(Primitive::De),
            AppendOutcome::Appended { .. } => {}
        }
        match in_chain.append_version(trx_id, begin_time, EdgeVersion::deleted()) {
            AppendOutcome::Conflict => return ProcessStat::Abort(Primitive::De),
            AppendOutcome::Appended { .. } => {}
        }
        self.rct.record(
            Primitive::De,
            trx_id,
            WriteRecord { item_id: Eid::new(src, dst).pack(), pid: Pid::new(0), element_kind: ElementKind::OutEdge },
        );
        let commit_out = out_chain.clone();
        let commit_in = in_chain.clone();
        let edge_values = self.edge_values.clone();
        writes.push(WriteHandle::new(
            move |ts| {
                commit_out.commit_version(trx_id, ts);
                commit_in.commit_version(trx_id, ts);
            },
            move || {
                out_chain.abort_version(trx_id, &edge_values, 0);
                in_chain.abort_version(trx_id, &edge_values, 0);
            },
        ));
        ProcessStat::Success(())
    }

    pub fn process_modify_vp(
        &self,
        vid: Vid,
        pid: Pid,
        tag: u8,
        payload: &[u8],
        trx_id: TrxId,
        begin_time: Timestamp,
        tid: usize,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let Some(vertex) = self.vertex(vid) else { return ProcessStat::Abort(Primitive::Mvp) };
        let header = self.vertex_values.insert(tag, payload, tid);
        let Some(_outcome) = vertex.properties.process_modify_property(pid, header, trx_id, begin_time) else {
            self.vertex_values.free(header, tid);
            return ProcessStat::Abort(Primitive::Mvp);
        };
        self.rct.record(
            Primitive::Mvp,
            trx_id,
            WriteRecord { item_id: vid.raw() as u64, pid, element_kind: ElementKind::Vertex },
        );
        self.push_property_handle(vertex.clone(), self.vertex_values.clone(), pid, trx_id, writes, true);
        ProcessStat::Success(())
    }

    pub fn process_drop_vp(
        &self,
        vid: Vid,
        pid: Pid,
        trx_id: TrxId,
        begin_time: Timestamp,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let Some(vertex) = self.vertex(vid) else { return ProcessStat::Abort(Primitive::Dvp) };
        let Some(_old) = vertex.properties.process_drop_property(pid, trx_id, begin_time) else {
            return ProcessStat::Abort(Primitive::Dvp);
        };
        self.rct.record(
            Primitive::Dvp,
            trx_id,
            WriteRecord { item_id: vid.raw() as u64, pid, element_kind: ElementKind::Vertex },
        );
        self.push_property_handle(vertex.clone(), self.vertex_values.clone(), pid, trx_id, writes, true);
        ProcessStat::Success(())
    }

    pub fn process_modify_ep(
        &self,
        chain: &EdgeChain,
        item_id: u64,
        pid: Pid,
        tag: u8,
        payload: &[u8],
        trx_id: TrxId,
        begin_time: Timestamp,
        tid: usize,
        dep: &dyn DependencyRecorder,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let visible = chain.get_visible_version(trx_id, begin_time, false, self.iso_level, self.opt_preread, dep);
        if !visible.ok {
            return ProcessStat::Abort(Primitive::Mep);
        }
        let Some(v) = visible.value else { return ProcessStat::Abort(Primitive::Mep) };
        if v.is_deleted() {
            return ProcessStat::Abort(Primitive::Mep);
        }
        let Some(props) = v.prop_row_list else { return ProcessStat::Abort(Primitive::Mep) };
        let header = self.edge_values.insert(tag, payload, tid);
        let Some(_outcome) = props.process_modify_property(pid, header, trx_id, begin_time) else {
            self.edge_values.free(header, tid);
            return ProcessStat::Abort(Primitive::Mep);
        };
        self.rct.record(Primitive::Mep, trx_id, WriteRecord { item_id, pid, element_kind: ElementKind::OutEdge });
        self.push_edge_property_handle(props, self.edge_values.clone(), pid, trx_id, writes);
        ProcessStat::Success(())
    }

    pub fn process_drop_ep(
        &self,
        chain: &EdgeChain,
        item_id: u64,
        pid: Pid,
        trx_id: TrxId,
        begin_time: Timestamp,
        dep: &dyn DependencyRecorder,
        writes: &WriteSet,
    ) -> ProcessStat<()> {
        let visible = chain.get_visible_version(trx_id, begin_time, false, self.iso_level, self.opt_preread, dep);
        if !visible.ok {
            return ProcessStat::Abort(Primitive::Dep);
        }
        let Some(v) = visible.value else { return ProcessStat::Abort(Primitive::Dep) };
        if v.is_deleted() {
            return ProcessStat::Abort(Primitive::Dep);
        }
        let Some(props) = v.prop_row_list else { return ProcessStat::Abort(Primitive::Dep) };
        let Some(_old) = props.process_drop_property(pid, trx_id, begin_time) else {
            return ProcessStat::Abort(Primitive::Dep);
        };
        self.rct.record(Primitive::Dep, trx_id, WriteRecord { item_id, pid, element_kind: ElementKind::OutEdge });
        self.push_edge_property_handle(props, self.edge_values.clone(), pid, trx_id, writes);
        ProcessStat::Success(())
    }

    fn push_property_handle(
        &self,
        vertex: Arc<Vertex>,
        store: Arc<ValueStore>,
        pid: Pid,
        trx_id: TrxId,
        writes: &WriteSet,
        _is_vertex: bool,
    ) {
        let commit_vertex = vertex.clone();
        writes.push(WriteHandle::new(
            move |ts| commit_vertex.properties.commit_cell(pid, trx_id, ts),
            move || vertex.properties.abort_cell(pid, trx_id, &store, 0),
        ));
    }

    fn push_edge_property_handle(&self, props: Arc<PropertyRowList>, store: Arc<ValueStore>, pid: Pid, trx_id: TrxId, writes: &WriteSet) {
        let commit_props = props.clone();
        writes.push(WriteHandle::new(
            move |ts| commit_props.commit_cell(pid, trx_id, ts),
            move || props.abort_cell(pid, trx_id, &store, 0),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_mapper::ModuloIdMapper;

    struct NoopDep;
    impl DependencyRecorder for NoopDep {
        fn record(&self, _r: TrxId, _w: TrxId, _k: crate::mvcc::DepKind) {}
    }

    fn graph() -> Graph {
        Graph::new(
            Arc::new(ValueStore::new(64, 1024, 2, 16)),
            Arc::new(ValueStore::new(64, 1024, 2, 16)),
            Arc::new(RecentActionTable::new()),
            Arc::new(ModuloIdMapper::single_node()),
            4,
            IsoLevel::Serializable,
            true,
        )
    }

    #[test]
    fn add_vertex_then_read_label_is_visible_after_commit() {
        let g = graph();
        let writes = WriteSet::new();
        let trx = TrxId::new(1);
        let stat = g.process_add_vertex(7, trx, Timestamp::new(1), &writes);
        let ProcessStat::Success(vid) = stat else { panic!("expected success") };
        writes.commit_all(Timestamp::new(2));
        let r = g.read_vertex_label(vid, TrxId::new(2), Timestamp::new(3), &NoopDep);
        assert_eq!(r, ReadStat::Success(7));
    }

    #[test]
    fn add_edge_then_traverse_out() {
        let g = graph();
        let writes = WriteSet::new();
        let trx = TrxId::new(1);
        let ProcessStat::Success(v1) = g.process_add_vertex(1, trx, Timestamp::new(1), &writes) else { panic!() };
        let ProcessStat::Success(v2) = g.process_add_vertex(1, trx, Timestamp::new(1), &writes) else { panic!() };
        writes.commit_all(Timestamp::new(2));

        let writes2 = WriteSet::new();
        let trx2 = TrxId::new(2);
        let begin2 = Timestamp::new(3);
        let stat = g.process_add_edge(v1, v2, 9, trx2, begin2, &NoopDep, &writes2);
        assert!(stat.is_success());
        writes2.commit_all(Timestamp::new(4));

        let out = g
            .read_connected_vertex(v1, Direction::Out, None, TrxId::new(3), Timestamp::new(5), true, &NoopDep)
            .unwrap();
        assert_eq!(out, vec![v2]);
    }

    #[test]
    fn drop_vertex_makes_it_invisible() {
        let g = graph();
        let writes = WriteSet::new();
        let trx = TrxId::new(1);
        let ProcessStat::Success(vid) = g.process_add_vertex(1, trx, Timestamp::new(1), &writes) else { panic!() };
        writes.commit_all(Timestamp::new(2));

        let writes2 = WriteSet::new();
        let trx2 = TrxId::new(2);
        let stat = g.process_drop_vertex(vid, trx2, Timestamp::new(3), &NoopDep, &writes2);
        assert!(stat.is_success());
        writes2.commit_all(Timestamp::new(4));

        let r = g.read_vertex_label(vid, TrxId::new(3), Timestamp::new(5), &NoopDep);
        assert_eq!(r, ReadStat::NotFound);
    }

    #[test]
    fn modify_vertex_property_roundtrips() {
        let g = graph();
        let writes = WriteSet::new();
        let trx = TrxId::new(1);
        let ProcessStat::Success(vid) = g.process_add_vertex(1, trx, Timestamp::new(1), &writes) else { panic!() };
        writes.commit_all(Timestamp::new(2));

        let writes2 = WriteSet::new();
        let trx2 = TrxId::new(2);
        let stat = g.process_modify_vp(vid, Pid::new(1), 1, b"bob", trx2, Timestamp::new(3), 0, &writes2);
        assert!(stat.is_success());
        writes2.commit_all(Timestamp::new(4));

        let r = g.read_vertex_property(vid, Pid::new(1), TrxId::new(3), Timestamp::new(5), true, &NoopDep);
        assert_eq!(r, ReadStat::Success((1, b"bob".to_vec())));
    }
}
