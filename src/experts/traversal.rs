//! `traversal` (spec.md §6.1): one-hop vertex traversal along `out`/`in`/
//! `both`, with an optional edge-label filter.

use crate::error::EngineError;
use crate::experts::{map_rows, read_abort_err, ExecCtx, Row};
use crate::plan::Value;
use crate::storage::Direction;

fn direction_from(v: Option<&Value>) -> Direction {
    match v {
        Some(Value::UInt(0)) => Direction::Out,
        Some(Value::UInt(1)) => Direction::In,
        _ => Direction::Both,
    }
}

fn label_from(v: Option<&Value>) -> Option<u32> {
    match v {
        Some(Value::UInt(l)) => Some(*l as u32),
        _ => None,
    }
}

pub fn traversal(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let direction = direction_from(params.first());
    let label_filter = label_from(params.get(1));
    map_rows(rows, |_history, v| {
        let Value::Vid(vid) = v else { return Ok(Vec::new()) };
        let neighbors = ctx
            .graph
            .read_connected_vertex(*vid, direction, label_filter, ctx.trx_id, ctx.begin_time, ctx.read_only, ctx.dep)
            .map_err(|_| read_abort_err(ctx.trx_id))?;
        Ok(neighbors.into_iter().map(Value::Vid).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::ValueStore;
    use crate::config::IsoLevel;
    use crate::id_mapper::ModuloIdMapper;
    use crate::ids::{Timestamp, TrxId};
    use crate::storage::{Graph, ProcessStat};
    use crate::txn::dep::DepTrxMap;
    use crate::txn::rct::RecentActionTable;
    use crate::txn::trx_client::InMemoryMaster;
    use crate::txn::write_set::WriteSet;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        graph: Graph,
        dep_map: DepTrxMap,
        rct: RecentActionTable,
        trx_client: Arc<InMemoryMaster>,
        writes: WriteSet,
        rng: ChaCha8Rng,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                graph: Graph::new(
                    Arc::new(ValueStore::new(64, 1024, 1, 16)),
                    Arc::new(ValueStore::new(64, 1024, 1, 16)),
                    Arc::new(RecentActionTable::new()),
                    Arc::new(ModuloIdMapper::single_node()),
                    4,
                    IsoLevel::Serializable,
                    true,
                ),
                dep_map: DepTrxMap::new(),
                rct: RecentActionTable::new(),
                trx_client: InMemoryMaster::new(),
                writes: WriteSet::new(),
                rng: ChaCha8Rng::seed_from_u64(0),
            }
        }

        fn ctx(&mut self, trx_id: TrxId, begin_time: Timestamp) -> ExecCtx<'_> {
            ExecCtx {
                graph: &self.graph,
                trx_id,
                begin_time,
                read_only: true,
                dep: &self.dep_map,
                writes: &self.writes,
                rct: &self.rct,
                rng: &mut self.rng,
                tid: 0,
                trx_client: self.trx_client.as_ref(),
                dep_map: &self.dep_map,
                validation_poll_interval: Duration::from_millis(1),
                validation_poll_retries: 10,
            }
        }
    }

    #[test]
    fn traversal_follows_out_edges() {
        let mut f = Fixture::new();
        let trx1 = TrxId::new(1);
        let begin1 = f.trx_client.allocate_begin_timestamp(trx1);
        let ProcessStat::Success(v1) = f.graph.process_add_vertex(1, trx1, begin1, &f.writes) else { panic!() };
        let ProcessStat::Success(v2) = f.graph.process_add_vertex(1, trx1, begin1, &f.writes) else { panic!() };
        f.writes.commit_all(Timestamp::new(2));

        let trx2 = TrxId::new(2);
        let begin2 = f.trx_client.allocate_begin_timestamp(trx2);
        let stat = f.graph.process_add_edge(v1, v2, 5, trx2, begin2, &f.dep_map, &f.writes);
        assert!(stat.is_success());
        f.writes.commit_all(Timestamp::new(3));

        let trx3 = TrxId::new(3);
        let begin3 = f.trx_client.allocate_begin_timestamp(trx3);
        let mut ctx = f.ctx(trx3, begin3);
        let rows = vec![(Vec::new(), vec![Value::Vid(v1)])];
        let out = traversal(&mut ctx, &[Value::UInt(0)], rows).unwrap();
        assert_eq!(out[0].1, vec![Value::Vid(v2)]);
    }

    #[test]
    fn traversal_from_a_vertex_with_no_edges_is_empty() {
        let mut f = Fixture::new();
        let trx1 = TrxId::new(1);
        let begin1 = f.trx_client.allocate_begin_timestamp(trx1);
        let ProcessStat::Success(v1) = f.graph.process_add_vertex(1, trx1, begin1, &f.writes) else { panic!() };
        f.writes.commit_all(Timestamp::new(2));

        let trx2 = TrxId::new(2);
        let begin2 = f.trx_client.allocate_begin_timestamp(trx2);
        let mut ctx = f.ctx(trx2, begin2);
        let rows = vec![(Vec::new(), vec![Value::Vid(v1)])];
        let out = traversal(&mut ctx, &[Value::UInt(0)], rows).unwrap();
        assert!(out[0].1.is_empty());
    }
}
