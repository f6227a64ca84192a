//! C13 — the execution engine: a fixed thread pool driving `sweep ->
//! try_recv -> execute` over the mailbox, per-transaction locking, cooperative
//! work stealing, and barrier fan-in keyed by `msg_path` (spec.md §5).
//!
//! Cross-machine transport, cluster timestamp allocation, and plan
//! compilation stay behind their respective traits (`Mailbox`, `TrxClient`,
//! the prebuilt `Plan` itself) exactly as spec.md §1 scopes them; this module
//! only drives what arrives at one worker's mailbox slots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::config::Config;
use crate::experts::{self, ExecCtx, Row};
use crate::gc::{GCProducer, RetireHint};
use crate::id_mapper::IdMapper;
use crate::mailbox::Mailbox;
use crate::plan::{create_abort_msg, create_broadcast_msg, Expert, ExpertType, Message, Meta, MsgType, Plan, TrxType};
use crate::storage::Graph;
use crate::txn::dep::DepTrxMap;
use crate::txn::rct::RecentActionTable;
use crate::txn::trx_client::{TrxClient, TrxStat};
use crate::txn::write_set::WriteSetTable;

/// Accumulates a barrier-shaped expert's siblings until `msg_path`'s
/// trailing fan-out count is satisfied (spec.md §3.5, §4.10).
struct BarrierState {
    expected: u32,
    arrived: u32,
    rows: Vec<Row>,
}

fn is_barrier_expert(kind: ExpertType) -> bool {
    matches!(
        kind,
        ExpertType::Aggregate | ExpertType::Cap | ExpertType::Group | ExpertType::Order | ExpertType::Range | ExpertType::Coin
    )
}

struct Shared {
    graph: Arc<Graph>,
    mailbox: Arc<dyn Mailbox>,
    trx_client: Arc<dyn TrxClient>,
    id_mapper: Arc<dyn IdMapper>,
    gc: Arc<dyn GCProducer>,
    write_sets: WriteSetTable,
    rct: Arc<RecentActionTable>,
    dep_map: DepTrxMap,
    config: Config,
    msg_locks: Vec<RwLock<()>>,
    plans: DashMap<u64, Arc<Plan>>,
    barriers: DashMap<String, BarrierState>,
    thread_count: usize,
    last_active: Vec<AtomicU64>,
    start: Instant,
    rngs: Vec<Mutex<ChaCha8Rng>>,
}

impl Shared {
    fn lock_index(&self, trx_id: crate::ids::TrxId) -> usize {
        (trx_id.raw() as usize) % self.msg_locks.len()
    }

    fn mark_active(&self, tid: usize) {
        let millis = self.start.elapsed().as_millis() as u64;
        self.last_active[tid].store(millis, Ordering::Relaxed);
    }

    fn idle_for(&self, tid: usize) -> Duration {
        let millis = self.last_active[tid].load(Ordering::Relaxed);
        self.start.elapsed().saturating_sub(Duration::from_millis(millis))
    }
}

/// Owns the worker thread pool. Dropping it stops every worker and joins
/// its thread.
pub struct Engine {
    shared: Arc<Shared>,
    threads: Vec<std::thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        config: Config,
        graph: Arc<Graph>,
        mailbox: Arc<dyn Mailbox>,
        trx_client: Arc<dyn TrxClient>,
        id_mapper: Arc<dyn IdMapper>,
        gc: Arc<dyn GCProducer>,
        rct: Arc<RecentActionTable>,
    ) -> Arc<Engine> {
        let thread_count = config.num_threads;
        let msg_locks = (0..config.msg_lock_num).map(|_| RwLock::new(())).collect();
        let last_active = (0..thread_count).map(|_| AtomicU64::new(0)).collect();
        let rngs = (0..thread_count).map(|_| Mutex::new(ChaCha8Rng::from_entropy())).collect();
        let shared = Arc::new(Shared {
            graph,
            mailbox,
            trx_client,
            id_mapper,
            gc,
            write_sets: WriteSetTable::new(),
            rct,
            dep_map: DepTrxMap::new(),
            config,
            msg_locks,
            plans: DashMap::new(),
            barriers: DashMap::new(),
            thread_count,
            last_active,
            start: Instant::now(),
            rngs,
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let threads = (0..thread_count)
            .map(|tid| {
                let shared = shared.clone();
                let shutdown = shutdown.clone();
                std::thread::Builder::new()
                    .name(format!("trx-worker-{tid}"))
                    .spawn(move || worker_loop(shared, tid, shutdown))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Arc::new(Engine { shared, threads, shutdown })
    }

    pub fn mailbox(&self) -> &Arc<dyn Mailbox> {
        &self.shared.mailbox
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.shared.graph
    }

    pub fn trx_client(&self) -> &Arc<dyn TrxClient> {
        &self.shared.trx_client
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
    }
}

/// Ingress loop: `sweep -> try_recv -> execute` (spec.md §5), falling back to
/// a bounded steal from an idle peer's queue when this thread's own queue is
/// empty. There is no dedicated blocking-receive thread here since
/// cross-machine transport sits outside this crate's scope (spec.md §1); an
/// empty tick backs off with a short sleep instead.
fn worker_loop(shared: Arc<Shared>, tid: usize, shutdown: Arc<AtomicBool>) {
    loop {
        shared.mailbox.sweep(tid);
        while let Some(note) = shared.mailbox.recv_notification(tid) {
            debug!(?note, tid, "dropping notification (out of scope for this worker)");
        }

        match next_message(&shared, tid) {
            Some(msg) => {
                shared.mark_active(tid);
                handle_message(&shared, tid, msg);
            }
            None => {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(Duration::from_micros(200));
            }
        }
    }
}

fn next_message(shared: &Shared, tid: usize) -> Option<Message> {
    if let Some(msg) = shared.mailbox.try_recv(tid) {
        return Some(msg);
    }
    if !shared.config.stealing {
        return None;
    }
    for offset in 1..shared.thread_count {
        let peer = (tid + offset) % shared.thread_count;
        if shared.idle_for(peer) >= shared.config.stealing_staleness {
            if let Some(msg) = shared.mailbox.try_steal(peer) {
                return Some(msg);
            }
        }
    }
    None
}

fn handle_message(shared: &Shared, tid: usize, msg: Message) {
    match msg.meta.msg_type {
        MsgType::Exit => {
            shared.plans.remove(&msg.meta.qid);
        }
        MsgType::Terminate => handle_terminate(shared, msg),
        MsgType::Abort => {
            // The aborting worker already ran `clean_and_abort`; this message
            // only needs to reach the plan's owner so local bookkeeping is
            // dropped once the transaction is known dead.
            shared.plans.remove(&msg.meta.qid);
        }
        _ => handle_step(shared, tid, msg),
    }
}

fn handle_terminate(shared: &Shared, msg: Message) {
    let Some(plan) = shared.plans.get(&msg.meta.qid).map(|p| p.clone()) else {
        return;
    };
    let guard = shared.msg_locks[shared.lock_index(plan.trx_id)].write();
    let mut retries = shared.config.validation_poll_retries;
    while shared.trx_client.read_status(plan.trx_id) != TrxStat::Abort && retries > 0 {
        retries -= 1;
        std::thread::sleep(shared.config.validation_poll_interval);
    }
    if shared.trx_client.read_status(plan.trx_id) != TrxStat::Abort {
        warn!(trx = %plan.trx_id, "terminate ran out of retries without observing ABORT");
    }
    drop(guard);
    cleanup_transaction(shared, msg.meta.qid, plan.trx_id);
}

fn cleanup_transaction(shared: &Shared, qid: u64, trx_id: crate::ids::TrxId) {
    shared.plans.remove(&qid);
    if let Some(set) = shared.write_sets.take(trx_id) {
        set.abort_all();
    }
    shared.dep_map.take(trx_id);
    let commit_time = shared.trx_client.read_commit_time(trx_id).unwrap_or(crate::ids::Timestamp::MIN);
    shared.gc.retire(RetireHint { chain_id: trx_id.raw(), floor: commit_time });
}

fn handle_step(shared: &Shared, tid: usize, msg: Message) {
    let plan = if msg.meta.msg_type == MsgType::Init {
        let Some(plan) = msg.meta.plan.clone() else {
            warn!(qid = msg.meta.qid, "INIT message carried no plan");
            return;
        };
        shared.plans.insert(msg.meta.qid, plan.clone());
        plan
    } else {
        match shared.plans.get(&msg.meta.qid) {
            Some(p) => p.clone(),
            None => {
                warn!(qid = msg.meta.qid, "no plan registered for this query");
                return;
            }
        }
    };

    let Some(expert) = plan.expert_at(msg.meta.step) else {
        warn!(qid = msg.meta.qid, step = msg.meta.step, "no expert at this step");
        return;
    };

    let _reader = shared.msg_locks[shared.lock_index(plan.trx_id)].read();

    if plan.trx_type == TrxType::Update && shared.trx_client.read_status(plan.trx_id) == TrxStat::Abort {
        let mut terminate_meta = msg.meta.clone();
        terminate_meta.msg_type = MsgType::Terminate;
        terminate_meta.recver_nid = msg.meta.parent_nid;
        terminate_meta.recver_tid = msg.meta.parent_tid;
        let terminate = Message::new(terminate_meta, shared.config.data_size);
        shared.mailbox.send(tid, msg.meta.parent_tid.max(0) as usize, terminate);
        return;
    }

    let rows = if is_barrier_expert(expert.kind) {
        match accumulate_for_barrier(shared, &msg, expert) {
            Some(rows) => rows,
            None => return,
        }
    } else {
        msg.data.clone()
    };

    let write_set = shared.write_sets.get_or_create(plan.trx_id);
    let mut rng_guard = shared.rngs[tid].lock();
    let mut ctx = ExecCtx {
        graph: &*shared.graph,
        trx_id: plan.trx_id,
        begin_time: plan.begin_timestamp,
        read_only: plan.trx_type == TrxType::ReadOnly,
        dep: &shared.dep_map,
        writes: &*write_set,
        rct: &*shared.rct,
        rng: &mut *rng_guard,
        tid,
        trx_client: &*shared.trx_client,
        dep_map: &shared.dep_map,
        validation_poll_interval: shared.config.validation_poll_interval,
        validation_poll_retries: shared.config.validation_poll_retries,
    };

    match experts::execute(&mut ctx, expert.kind, &expert.params, rows) {
        Ok(out_rows) => advance(shared, tid, &msg.meta, &*plan, expert, out_rows),
        Err(err) => {
            debug!(trx = %plan.trx_id, %err, "expert raised an error, routing ABORT to parent");
            let abort = create_abort_msg(&msg.meta);
            shared.mailbox.send(tid, msg.meta.parent_tid.max(0) as usize, abort);
        }
    }
}

fn accumulate_for_barrier(shared: &Shared, msg: &Message, expert: &Expert) -> Option<Vec<Row>> {
    let mut path = msg.meta.msg_path.clone();
    let Some(expected) = path.pop_satisfied() else {
        // No recorded fan-out: this barrier has exactly one upstream message.
        return Some(msg.data.clone());
    };
    let key = format!("{}:{}:{}:{}", msg.meta.qid, msg.meta.step, expert.index, path.encode());
    let mut done = None;
    {
        let mut entry = shared.barriers.entry(key.clone()).or_insert_with(|| BarrierState { expected, arrived: 0, rows: Vec::new() });
        entry.rows.extend(msg.data.iter().cloned());
        entry.arrived += 1;
        if entry.arrived >= entry.expected {
            done = Some(std::mem::take(&mut entry.rows));
        }
    }
    if done.is_some() {
        shared.barriers.remove(&key);
    }
    done
}

/// Routes a step's output onward: one more step on the same thread, or —
/// once the plan's trailing `Terminate` expert is reached — the final
/// `EXIT`/`ABORT` broadcast (spec.md §4.13).
fn advance(shared: &Shared, tid: usize, meta: &Meta, plan: &Plan, expert: &Expert, rows: Vec<Row>) {
    if expert.next_step < 0 {
        if expert.kind == ExpertType::Terminate {
            match shared.trx_client.read_status(plan.trx_id) {
                TrxStat::Committed => {
                    let mut out = Vec::new();
                    create_broadcast_msg(meta, MsgType::Exit, shared.id_mapper.node_count(), &mut out);
                    for exit in out {
                        shared.mailbox.send(tid, tid, exit);
                    }
                }
                TrxStat::Abort => {
                    let abort = create_abort_msg(meta);
                    shared.mailbox.send(tid, meta.parent_tid.max(0) as usize, abort);
                }
                _ => {}
            }
            cleanup_transaction(shared, meta.qid, plan.trx_id);
        }
        return;
    }

    let mut next_meta = meta.clone();
    next_meta.step = expert.next_step;
    next_meta.plan = None;
    let mut next_msg = Message::new(next_meta, shared.config.data_size);
    for (history, values) in rows {
        next_msg.insert_data(history, values);
    }
    shared.mailbox.send(tid, tid, next_msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::ValueStore;
    use crate::config::IsoLevel;
    use crate::gc::NoopGc;
    use crate::id_mapper::ModuloIdMapper;
    use crate::ids::{TrxId, Vid};
    use crate::mailbox::LocalMailbox;
    use crate::plan::{create_init_messages, Plan, Value};
    use crate::txn::trx_client::InMemoryMaster;

    fn wait_for<F: Fn() -> bool>(pred: F, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if pred() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        pred()
    }

    #[test]
    fn add_vertex_plan_runs_to_commit() {
        let mut config = Config::default();
        config.num_threads = 1;
        config.msg_lock_num = 4;
        config.validation_poll_retries = 50;
        config.validation_poll_interval = Duration::from_millis(1);

        let id_mapper = Arc::new(ModuloIdMapper::single_node());
        let rct = Arc::new(RecentActionTable::new());
        let graph = Arc::new(Graph::new(
            Arc::new(ValueStore::new(64, 1024, 1, 16)),
            Arc::new(ValueStore::new(64, 1024, 1, 16)),
            rct.clone(),
            id_mapper.clone(),
            4,
            IsoLevel::Serializable,
            true,
        ));
        let mailbox: Arc<dyn Mailbox> = Arc::new(LocalMailbox::new(1));
        let trx_client = InMemoryMaster::new();
        let gc: Arc<dyn GCProducer> = Arc::new(NoopGc);

        let trx_id = TrxId::new(1);
        let begin = trx_client.allocate_begin_timestamp(trx_id);

        let plan = Arc::new(Plan {
            trx_id,
            begin_timestamp: begin,
            trx_type: TrxType::Update,
            query_count_in_trx: 1,
            experts: vec![
                Expert::new(ExpertType::Init, 0, vec![], 1),
                Expert::new(ExpertType::AddV, 1, vec![Value::UInt(5)], 2),
                Expert::new(ExpertType::Validation, 2, vec![], 3),
                Expert::new(ExpertType::Commit, 3, vec![], 4),
                Expert::new(ExpertType::Terminate, 4, vec![], -1),
            ],
        });

        let engine = Engine::new(config, graph, mailbox.clone(), trx_client.clone(), id_mapper, gc, rct);

        let msgs = create_init_messages(1, 1, (0, 0), 1, 0, plan, &ModuloIdMapper::single_node(), 64 * 1024);
        for m in msgs {
            mailbox.send(0, 0, m);
        }
        mailbox.sweep(0);

        let committed = wait_for(|| trx_client.read_status(trx_id) == TrxStat::Committed, Duration::from_millis(500));
        assert!(committed, "transaction never reached COMMITTED");

        let vid = Vid::new(1);
        let r = engine.graph().read_vertex_label(vid, TrxId::new(99), trx_client.allocate_begin_timestamp(TrxId::new(99)), &NoopReaderDep);
        assert_eq!(r, crate::storage::ReadStat::Success(5));
    }

    struct NoopReaderDep;
    impl crate::mvcc::DependencyRecorder for NoopReaderDep {
        fn record(&self, _reader: TrxId, _writer: TrxId, _kind: crate::mvcc::DepKind) {}
    }
}
