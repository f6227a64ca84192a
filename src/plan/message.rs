//! C10 — Message model and dispatch helpers (spec.md §3.4, §3.5, §4.10).

use std::sync::Arc;

use crate::id_mapper::IdMapper;
use crate::plan::plan::{Expert, Plan, Value};

/// `msg_path` as a list of per-dispatch child counts (spec.md §3.5). Each
/// expert that fans out appends its child count; each barrier strips the
/// trailing component once satisfied. Encoded on the wire as a tab-joined
/// string of integers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgPath(pub Vec<u32>);

impl MsgPath {
    pub fn push_fanout(&mut self, child_count: u32) {
        self.0.push(child_count);
    }

    pub fn pop_satisfied(&mut self) -> Option<u32> {
        self.0.pop()
    }

    pub fn encode(&self) -> String {
        self.0.iter().map(u32::to_string).collect::<Vec<_>>().join("\t")
    }

    pub fn decode(s: &str) -> Self {
        if s.is_empty() {
            return MsgPath(Vec::new());
        }
        MsgPath(s.split('\t').filter_map(|p| p.parse().ok()).collect())
    }
}

/// One entry of `Meta.branch_infos` (spec.md §3.4, §6.3).
#[derive(Debug, Clone, PartialEq)]
pub struct BranchInfo {
    pub node: i32,
    pub thread: i32,
    pub index: u32,
    pub key: String,
    pub msg_id: u64,
    pub msg_path: MsgPath,
}

/// Message kind (spec.md §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Init,
    Spawn,
    Feed,
    Reply,
    Barrier,
    Branch,
    Exit,
    Validation,
    Commit,
    Abort,
    Terminate,
}

/// Routing and dispatch metadata carried alongside a message's data
/// (spec.md §3.4). `plan` is populated only for `INIT` (spec.md §6.3).
#[derive(Debug, Clone)]
pub struct Meta {
    pub qid: u64,
    pub step: i32,
    pub query_count_in_trx: u8,
    pub recver_nid: i32,
    pub recver_tid: i32,
    pub parent_nid: i32,
    pub parent_tid: i32,
    pub msg_type: MsgType,
    pub msg_path: MsgPath,
    pub branch_infos: Vec<BranchInfo>,
    pub plan: Option<Arc<Plan>>,
}

impl Meta {
    pub fn for_next_step(&self) -> Meta {
        Meta { step: self.step + 1, plan: None, ..self.clone() }
    }
}

/// One `(step_label → value)` history binding accumulated by `as`/`select`
/// (spec.md §3.4).
pub type History = Vec<(String, Value)>;

/// `{ meta, data, current_bytes, max_bytes }` (spec.md §3.4). `data` is an
/// ordered sequence of `(history, value_list)` pairs; a history's value list
/// may be split across messages but a single history entry never is.
#[derive(Debug, Clone)]
pub struct Message {
    pub meta: Meta,
    pub data: Vec<(History, Vec<Value>)>,
    pub current_bytes: usize,
    pub max_bytes: usize,
}

impl Message {
    pub fn new(meta: Meta, max_bytes: usize) -> Self {
        Message { meta, data: Vec::new(), current_bytes: 0, max_bytes }
    }

    /// Appends as much of `(history, values)` as fits under `max_bytes`,
    /// splitting at value boundaries. Returns `true` if everything was
    /// absorbed into this message (spec.md §4.10 `insert`).
    pub fn insert_data(&mut self, history: History, values: Vec<Value>) -> bool {
        let mut remaining = values;
        let mut taken = Vec::new();
        let mut fully_absorbed = true;
        let mut i = 0;
        while i < remaining.len() {
            let size = remaining[i].approx_bytes();
            if self.current_bytes + size > self.max_bytes && !taken.is_empty() {
                fully_absorbed = false;
                break;
            }
            self.current_bytes += size;
            taken.push(remaining[i].clone());
            i += 1;
        }
        if i < remaining.len() {
            fully_absorbed = false;
        }
        remaining.drain(..i);
        if !taken.is_empty() {
            self.data.push((history, taken));
        }
        fully_absorbed && remaining.is_empty()
    }
}

/// Creates one message per destination node for an `INIT` dispatch,
/// partitioning `experts[0]`'s inline vertex params by locality so each
/// message carries only elements local to its destination (spec.md §4.10).
pub fn create_init_messages(
    qid: u64,
    query_count: u8,
    parent: (i32, i32),
    node_count: usize,
    recv_tid: i32,
    plan: Arc<Plan>,
    id_mapper: &dyn IdMapper,
    max_bytes: usize,
) -> Vec<Message> {
    let inline_vids: Vec<crate::ids::Vid> = plan
        .experts
        .first()
        .map(|e| e.params.iter().filter_map(|p| if let Value::Vid(v) = p { Some(*v) } else { None }).collect())
        .unwrap_or_default();

    (0..node_count)
        .map(|node| {
            let meta = Meta {
                qid,
                step: 0,
                query_count_in_trx: query_count,
                recver_nid: node as i32,
                recver_tid: recv_tid,
                parent_nid: parent.0,
                parent_tid: parent.1,
                msg_type: MsgType::Init,
                msg_path: MsgPath::default(),
                branch_infos: Vec::new(),
                plan: Some(plan.clone()),
            };
            let mut msg = Message::new(meta, max_bytes);
            let local: Vec<Value> = inline_vids
                .iter()
                .filter(|v| id_mapper.owner(**v) == node)
                .map(|v| Value::Vid(*v))
                .collect();
            if !local.is_empty() {
                msg.insert_data(Vec::new(), local);
            }
            msg
        })
        .collect()
}

/// Advances `data` to the next step, appending the resulting messages to
/// `out` (spec.md §4.10). One message per distinct `(recver_nid,
/// recver_tid)` implied by `core_affinity`.
pub fn create_next_msg(
    experts: &[Expert],
    meta: &Meta,
    data: Vec<(History, Vec<Value>)>,
    thread_count: usize,
    core_affinity: impl Fn(usize) -> usize,
    out: &mut Vec<Message>,
) {
    let _ = experts;
    let next_meta = meta.for_next_step();
    let tid = core_affinity(thread_count) as i32;
    let mut msg = Message::new(Meta { recver_tid: tid, ..next_meta }, meta_max_bytes(meta));
    for (history, values) in data {
        msg.insert_data(history, values);
    }
    out.push(msg);
}

fn meta_max_bytes(_meta: &Meta) -> usize {
    // `Meta` carries no size budget of its own; callers pass `max_bytes`
    // explicitly where it matters. Kept as a named seam so a future wire
    // format embedding per-message limits has one place to plug into.
    64 * 1024
}

/// One message per branch, each tagged with the branch's `msg_path`
/// extension (spec.md §4.10 `create_branched_msg`).
pub fn create_branched_msg(meta: &Meta, branches: Vec<(Vec<(History, Vec<Value>)>, u32)>, max_bytes: usize) -> Vec<Message> {
    let child_count = branches.len() as u32;
    branches
        .into_iter()
        .map(|(data, branch_index)| {
            let mut path = meta.msg_path.clone();
            path.push_fanout(child_count);
            let mut m = Meta { msg_path: path, ..meta.clone() };
            m.branch_infos.push(BranchInfo {
                node: meta.recver_nid,
                thread: meta.recver_tid,
                index: branch_index,
                key: String::new(),
                msg_id: 0,
                msg_path: m.msg_path.clone(),
            });
            let mut msg = Message::new(m, max_bytes);
            for (history, values) in data {
                msg.insert_data(history, values);
            }
            msg
        })
        .collect()
}

/// As [`create_branched_msg`] but stamps a history label naming the branch
/// (spec.md `create_branched_msg_with_history_label`).
pub fn create_branched_msg_with_history_label(
    meta: &Meta,
    branches: Vec<(String, Vec<(History, Vec<Value>)>)>,
    max_bytes: usize,
) -> Vec<Message> {
    let child_count = branches.len() as u32;
    branches
        .into_iter()
        .enumerate()
        .map(|(branch_index, (label, data))| {
            let mut path = meta.msg_path.clone();
            path.push_fanout(child_count);
            let m = Meta { msg_path: path, ..meta.clone() };
            let mut msg = Message::new(m, max_bytes);
            for (mut history, values) in data {
                history.push((label.clone(), Value::UInt(branch_index as u64)));
                msg.insert_data(history, values);
            }
            msg
        })
        .collect()
}

/// Broadcasts a control message (`EXIT`, `TERMINATE`) to every node
/// (spec.md `create_broadcast_msg`).
pub fn create_broadcast_msg(meta: &Meta, msg_type: MsgType, node_count: usize, out: &mut Vec<Message>) {
    for node in 0..node_count {
        let m = Meta { recver_nid: node as i32, msg_type, ..meta.clone() };
        out.push(Message::new(m, 64 * 1024));
    }
}

/// Builds an `ABORT` message back toward `meta.parent_nid/tid` (spec.md
/// `create_abort_msg`).
pub fn create_abort_msg(meta: &Meta) -> Message {
    let m = Meta {
        recver_nid: meta.parent_nid,
        recver_tid: meta.parent_tid,
        msg_type: MsgType::Abort,
        ..meta.clone()
    };
    Message::new(m, 64 * 1024)
}

/// Feeds data to a set of destination `(node, thread)` pairs keyed by
/// `key` (spec.md `create_feed_msg`), e.g. delivering a `group`'s finished
/// side-effect to the requesting barrier.
pub fn create_feed_msg(meta: &Meta, key: &str, nodes: &[(i32, i32)], data: Vec<Value>, out: &mut Vec<Message>) {
    for &(nid, tid) in nodes {
        let m = Meta { recver_nid: nid, recver_tid: tid, msg_type: MsgType::Feed, ..meta.clone() };
        let mut msg = Message::new(m, 64 * 1024);
        msg.insert_data(vec![(key.to_string(), Value::Bool(true))], data.clone());
        out.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Vid;

    fn meta() -> Meta {
        Meta {
            qid: 1,
            step: 0,
            query_count_in_trx: 1,
            recver_nid: 0,
            recver_tid: 0,
            parent_nid: 0,
            parent_tid: 0,
            msg_type: MsgType::Spawn,
            msg_path: MsgPath::default(),
            branch_infos: Vec::new(),
            plan: None,
        }
    }

    #[test]
    fn msg_path_encode_decode_roundtrip() {
        let mut p = MsgPath::default();
        p.push_fanout(4);
        p.push_fanout(2);
        let encoded = p.encode();
        assert_eq!(encoded, "4\t2");
        assert_eq!(MsgPath::decode(&encoded), p);
    }

    #[test]
    fn msg_path_pop_strips_trailing_component() {
        let mut p = MsgPath(vec![4, 2]);
        assert_eq!(p.pop_satisfied(), Some(2));
        assert_eq!(p.0, vec![4]);
    }

    #[test]
    fn insert_data_fits_within_budget() {
        let mut msg = Message::new(meta(), 1024);
        let absorbed = msg.insert_data(Vec::new(), vec![Value::Int(1), Value::Int(2)]);
        assert!(absorbed);
        assert_eq!(msg.data.len(), 1);
    }

    #[test]
    fn insert_data_refuses_when_over_budget_and_nonempty() {
        let mut msg = Message::new(meta(), 10);
        msg.current_bytes = 8;
        let absorbed = msg.insert_data(Vec::new(), vec![Value::Int(1)]);
        assert!(!absorbed);
    }

    #[test]
    fn init_messages_partition_by_locality() {
        use crate::id_mapper::ModuloIdMapper;
        use crate::ids::{Timestamp, TrxId};
        use crate::plan::plan::{Expert, ExpertType, Plan, TrxType};

        let mapper = ModuloIdMapper::new(2, 0);
        let plan = Arc::new(Plan {
            trx_id: TrxId::new(1),
            begin_timestamp: Timestamp::new(0),
            trx_type: TrxType::ReadOnly,
            query_count_in_trx: 1,
            experts: vec![Expert::new(ExpertType::Init, 0, vec![Value::Vid(Vid::new(2)), Value::Vid(Vid::new(3))], 1)],
        });
        let msgs = create_init_messages(1, 1, (0, 0), 2, 0, plan, &mapper, 64 * 1024);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].data[0].1, vec![Value::Vid(Vid::new(2))]);
        assert_eq!(msgs[1].data[0].1, vec![Value::Vid(Vid::new(3))]);
    }
}
