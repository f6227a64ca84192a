//! C10 — wire codec (spec.md §6.3). Pure encode/decode over `Vec<u8>`; not
//! wired to any socket (cross-machine transport is out of scope, spec.md
//! §1). Big-endian, length-prefixed strings, `plan` carried only for
//! `INIT` messages.

use crate::ids::{Eid, Vid};
use crate::plan::message::{BranchInfo, History, Message, Meta, MsgPath, MsgType};
use crate::plan::plan::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of buffer")]
    Truncated,
    #[error("unknown msg_type tag {0}")]
    UnknownMsgType(u8),
    #[error("unknown value tag {0}")]
    UnknownValueTag(u8),
}

struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn f64(&mut self, v: f64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.0.extend_from_slice(b);
    }
    fn string(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.pos + n > self.buf.len() {
            return Err(WireError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }
    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
    fn string(&mut self) -> Result<String, WireError> {
        let b = self.bytes()?;
        Ok(String::from_utf8_lossy(&b).into_owned())
    }
}

fn msg_type_tag(t: MsgType) -> u8 {
    match t {
        MsgType::Init => 0,
        MsgType::Spawn => 1,
        MsgType::Feed => 2,
        MsgType::Reply => 3,
        MsgType::Barrier => 4,
        MsgType::Branch => 5,
        MsgType::Exit => 6,
        MsgType::Validation => 7,
        MsgType::Commit => 8,
        MsgType::Abort => 9,
        MsgType::Terminate => 10,
    }
}

fn msg_type_from_tag(tag: u8) -> Result<MsgType, WireError> {
    Ok(match tag {
        0 => MsgType::Init,
        1 => MsgType::Spawn,
        2 => MsgType::Feed,
        3 => MsgType::Reply,
        4 => MsgType::Barrier,
        5 => MsgType::Branch,
        6 => MsgType::Exit,
        7 => MsgType::Validation,
        8 => MsgType::Commit,
        9 => MsgType::Abort,
        10 => MsgType::Terminate,
        other => return Err(WireError::UnknownMsgType(other)),
    })
}

fn value_tag(v: &Value) -> u8 {
    match v {
        Value::Int(_) => 0,
        Value::UInt(_) => 1,
        Value::Float(_) => 2,
        Value::Bool(_) => 3,
        Value::Str(_) => 4,
        Value::Vid(_) => 5,
        Value::Eid(_) => 6,
        Value::List(_) => 7,
    }
}

fn write_value_body(w: &mut Writer, v: &Value) {
    match v {
        Value::Int(n) => w.u64(*n as u64),
        Value::UInt(n) => w.u64(*n),
        Value::Float(f) => w.f64(*f),
        Value::Bool(b) => w.u8(*b as u8),
        Value::Str(s) => w.string(s),
        Value::Vid(vid) => w.u32(vid.raw()),
        Value::Eid(eid) => w.u64(eid.pack()),
        Value::List(items) => {
            w.u32(items.len() as u32);
            for item in items {
                write_value(w, item);
            }
        }
    }
}

fn write_value(w: &mut Writer, v: &Value) {
    w.u8(value_tag(v));
    write_value_body(w, v);
}

fn read_value_body(r: &mut Reader, tag: u8) -> Result<Value, WireError> {
    Ok(match tag {
        0 => Value::Int(r.u64()? as i64),
        1 => Value::UInt(r.u64()?),
        2 => Value::Float(r.f64()?),
        3 => Value::Bool(r.u8()? != 0),
        4 => Value::Str(r.string()?),
        5 => Value::Vid(Vid::new(r.u32()?)),
        6 => Value::Eid(Eid::unpack(r.u64()?)),
        7 => {
            let n = r.u32()? as usize;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(read_value(r)?);
            }
            Value::List(items)
        }
        other => return Err(WireError::UnknownValueTag(other)),
    })
}

fn read_value(r: &mut Reader) -> Result<Value, WireError> {
    let tag = r.u8()?;
    read_value_body(r, tag)
}

/// Encodes a single value for property-cell storage, splitting the type tag
/// (kept alongside the cell so `Graph` reads don't need a wire `Reader` just
/// to discover a value's shape) from its body bytes.
pub fn value_to_tag_and_bytes(v: &Value) -> (u8, Vec<u8>) {
    let mut w = Writer(Vec::new());
    write_value_body(&mut w, v);
    (value_tag(v), w.0)
}

/// Inverse of [`value_to_tag_and_bytes`].
pub fn tag_and_bytes_to_value(tag: u8, bytes: &[u8]) -> Result<Value, WireError> {
    let mut r = Reader::new(bytes);
    read_value_body(&mut r, tag)
}

fn write_history(w: &mut Writer, history: &History) {
    w.u32(history.len() as u32);
    for (label, value) in history {
        w.string(label);
        write_value(w, value);
    }
}

fn read_history(r: &mut Reader) -> Result<History, WireError> {
    let n = r.u32()? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let label = r.string()?;
        let value = read_value(r)?;
        out.push((label, value));
    }
    Ok(out)
}

fn write_branch_info(w: &mut Writer, b: &BranchInfo) {
    w.i32(b.node);
    w.i32(b.thread);
    w.u32(b.index);
    w.string(&b.key);
    w.u64(b.msg_id);
    w.string(&b.msg_path.encode());
}

fn read_branch_info(r: &mut Reader) -> Result<BranchInfo, WireError> {
    Ok(BranchInfo {
        node: r.i32()?,
        thread: r.i32()?,
        index: r.u32()?,
        key: r.string()?,
        msg_id: r.u64()?,
        msg_path: MsgPath::decode(&r.string()?),
    })
}

/// Encodes `Meta` then the `(history, values)* ` data sequence, omitting
/// `plan` for any message type other than `INIT` (spec.md §6.3). `plan`
/// itself is never put on the wire here — it travels in-process as an
/// `Arc<Plan>` (see [`super::message::Meta::plan`]); encoding it is left to
/// a future cluster-transport layer, out of scope per spec.md §1.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut w = Writer(Vec::new());
    w.u64(msg.meta.qid);
    w.i32(msg.meta.step);
    w.u8(msg.meta.query_count_in_trx);
    w.i32(msg.meta.recver_nid);
    w.i32(msg.meta.recver_tid);
    w.i32(msg.meta.parent_nid);
    w.i32(msg.meta.parent_tid);
    w.u8(msg_type_tag(msg.meta.msg_type));
    w.string(&msg.meta.msg_path.encode());
    w.u32(msg.meta.branch_infos.len() as u32);
    for b in &msg.meta.branch_infos {
        write_branch_info(&mut w, b);
    }
    w.u8(if matches!(msg.meta.msg_type, MsgType::Init) { 1 } else { 0 });

    w.u32(msg.data.len() as u32);
    for (history, values) in &msg.data {
        write_history(&mut w, history);
        w.u32(values.len() as u32);
        for v in values {
            write_value(&mut w, v);
        }
    }
    w.u64(msg.current_bytes as u64);
    w.u64(msg.max_bytes as u64);
    w.0
}

/// Decodes a message encoded by [`encode_message`]. `meta.plan` is always
/// `None` on the decoded result — the wire format never carries it (see
/// note on [`encode_message`]); callers that need the plan must look it up
/// by `qid` from the worker's plan table instead.
pub fn decode_message(buf: &[u8]) -> Result<Message, WireError> {
    let mut r = Reader::new(buf);
    let qid = r.u64()?;
    let step = r.i32()?;
    let query_count_in_trx = r.u8()?;
    let recver_nid = r.i32()?;
    let recver_tid = r.i32()?;
    let parent_nid = r.i32()?;
    let parent_tid = r.i32()?;
    let msg_type = msg_type_from_tag(r.u8()?)?;
    let msg_path = MsgPath::decode(&r.string()?);
    let branch_count = r.u32()? as usize;
    let mut branch_infos = Vec::with_capacity(branch_count);
    for _ in 0..branch_count {
        branch_infos.push(read_branch_info(&mut r)?);
    }
    let _has_plan = r.u8()? != 0;

    let data_count = r.u32()? as usize;
    let mut data = Vec::with_capacity(data_count);
    for _ in 0..data_count {
        let history = read_history(&mut r)?;
        let value_count = r.u32()? as usize;
        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            values.push(read_value(&mut r)?);
        }
        data.push((history, values));
    }
    let current_bytes = r.u64()? as usize;
    let max_bytes = r.u64()? as usize;

    Ok(Message {
        meta: Meta {
            qid,
            step,
            query_count_in_trx,
            recver_nid,
            recver_tid,
            parent_nid,
            parent_tid,
            msg_type,
            msg_path,
            branch_infos,
            plan: None,
        },
        data,
        current_bytes,
        max_bytes,
    })
}
