//! `add_v`, `add_e`, `drop`, `property` (spec.md §6.1): the write-path
//! kernels. Every graph mutation goes through [`crate::storage::Graph`]'s
//! `process_*` methods, which append uncommitted MVCC versions and push
//! [`crate::txn::write_set::WriteHandle`]s into `ctx.writes` for the commit
//! expert to finalize later (spec.md §4.13).

use crate::error::EngineError;
use crate::experts::{abort_err, map_rows, ExecCtx, Row};
use crate::ids::{Eid, Pid};
use crate::plan::{value_to_tag_and_bytes, Value};
use crate::storage::ProcessStat;

fn label_param(params: &[Value]) -> u32 {
    match params.first() {
        Some(Value::UInt(l)) => *l as u32,
        _ => 0,
    }
}

/// `add_v(label)`: creates one new vertex per current traverser (or one, if
/// the batch has no traversers yet — the common `g.addV()` start step).
pub fn add_v(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let label = label_param(params);
    let mut out = Vec::with_capacity(rows.len().max(1));
    if rows.is_empty() {
        match ctx.graph.process_add_vertex(label, ctx.trx_id, ctx.begin_time, ctx.writes) {
            ProcessStat::Success(vid) => out.push((Vec::new(), vec![Value::Vid(vid)])),
            ProcessStat::Abort(p) => return Err(abort_err(ctx.trx_id, p)),
        }
        return Ok(out);
    }
    for (history, values) in rows {
        let count = values.len().max(1);
        let mut new_values = Vec::with_capacity(count);
        for _ in 0..count {
            match ctx.graph.process_add_vertex(label, ctx.trx_id, ctx.begin_time, ctx.writes) {
                ProcessStat::Success(vid) => new_values.push(Value::Vid(vid)),
                ProcessStat::Abort(p) => return Err(abort_err(ctx.trx_id, p)),
            }
        }
        out.push((history, new_values));
    }
    Ok(out)
}

/// `add_e(label, to_label)`: adds an edge from the current traverser to
/// whatever vertex is bound under `to_label` in history (the `addE(...).
/// to(select(to_label))` pattern).
pub fn add_e(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let label = label_param(params);
    let Some(Value::Str(to_label)) = params.get(1).cloned() else {
        return Err(EngineError::InvalidArgument("add_e requires a target history label".into()));
    };
    map_rows(rows, |history, v| {
        let Value::Vid(src) = v else { return Ok(Vec::new()) };
        let dst = history.iter().rev().find(|(k, _)| *k == to_label).and_then(|(_, val)| match val {
            Value::Vid(d) => Some(*d),
            _ => None,
        });
        let Some(dst) = dst else {
            return Err(EngineError::InvalidArgument(format!("no vertex bound under '{to_label}'")));
        };
        match ctx.graph.process_add_edge(*src, dst, label, ctx.trx_id, ctx.begin_time, ctx.dep, ctx.writes) {
            ProcessStat::Success(()) => Ok(vec![Value::Eid(Eid::new(*src, dst))]),
            ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
        }
    })
}

/// `drop("vertex" | "edge")`: removes the current traverser.
pub fn drop_element(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let kind = match params.first() {
        Some(Value::Str(s)) => s.clone(),
        _ => "vertex".to_string(),
    };
    map_rows(rows, |_history, v| match (kind.as_str(), v) {
        ("vertex", Value::Vid(vid)) => match ctx.graph.process_drop_vertex(*vid, ctx.trx_id, ctx.begin_time, ctx.dep, ctx.writes) {
            ProcessStat::Success(()) => Ok(Vec::new()),
            ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
        },
        ("edge", Value::Eid(eid)) => {
            match ctx.graph.process_drop_edge(eid.src, eid.dst, ctx.trx_id, ctx.begin_time, ctx.read_only, ctx.dep, ctx.writes) {
                ProcessStat::Success(()) => Ok(Vec::new()),
                ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
            }
        }
        _ => Ok(Vec::new()),
    })
}

/// `property(pid, value)`: writes (or, with a `Value::Bool(false)` payload,
/// drops) a property on the current traverser — a vertex or an edge.
pub fn property(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let pid = match params.first() {
        Some(Value::UInt(p)) => Pid::new(*p as u16),
        _ => return Err(EngineError::InvalidArgument("property requires a pid".into())),
    };
    let drop_requested = matches!(params.get(1), None | Some(Value::Bool(false)));
    let payload = params.get(1).cloned();

    map_rows(rows, |_history, v| {
        match v {
            Value::Vid(vid) => {
                if drop_requested {
                    match ctx.graph.process_drop_vp(*vid, pid, ctx.trx_id, ctx.begin_time, ctx.writes) {
                        ProcessStat::Success(()) => Ok(vec![v.clone()]),
                        ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
                    }
                } else {
                    let (tag, bytes) = value_to_tag_and_bytes(payload.as_ref().unwrap());
                    match ctx.graph.process_modify_vp(*vid, pid, tag, &bytes, ctx.trx_id, ctx.begin_time, ctx.tid, ctx.writes) {
                        ProcessStat::Success(()) => Ok(vec![v.clone()]),
                        ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
                    }
                }
            }
            Value::Eid(eid) => {
                let Some(chain) = ctx.graph.edge_chain(eid.src, eid.dst) else {
                    return Ok(Vec::new());
                };
                if drop_requested {
                    match ctx.graph.process_drop_ep(&chain, eid.pack(), pid, ctx.trx_id, ctx.begin_time, ctx.dep, ctx.writes) {
                        ProcessStat::Success(()) => Ok(vec![v.clone()]),
                        ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
                    }
                } else {
                    let (tag, bytes) = value_to_tag_and_bytes(payload.as_ref().unwrap());
                    match ctx.graph.process_modify_ep(
                        &chain,
                        eid.pack(),
                        pid,
                        tag,
                        &bytes,
                        ctx.trx_id,
                        ctx.begin_time,
                        ctx.tid,
                        ctx.dep,
                        ctx.writes,
                    ) {
                        ProcessStat::Success(()) => Ok(vec![v.clone()]),
                        ProcessStat::Abort(p) => Err(abort_err(ctx.trx_id, p)),
                    }
                }
            }
            _ => Ok(Vec::new()),
        }
    })
}
