//! `has`, `has_label`, `values`, `properties`, `project`, `index` (spec.md
//! §6.1). Property reads go through [`crate::storage::Graph`]'s vertex
//! property path; `pid == 0` is the reserved "label" key (spec.md §3.1), so
//! `values`/`has` with that pid read the vertex label instead of a cell.

use crate::error::EngineError;
use crate::experts::{map_rows, CmpOp, ExecCtx, Row};
use crate::ids::Pid;
use crate::plan::{tag_and_bytes_to_value, Value};
use crate::storage::ReadStat;

fn pid_from(v: Option<&Value>) -> Pid {
    match v {
        Some(Value::UInt(p)) => Pid::new(*p as u16),
        _ => Pid::new(0),
    }
}

fn read_vertex_value(ctx: &ExecCtx<'_>, vid: crate::ids::Vid, pid: Pid) -> Option<Value> {
    if pid.is_label() {
        match ctx.graph.read_vertex_label(vid, ctx.trx_id, ctx.begin_time, ctx.dep) {
            ReadStat::Success(label) => Some(Value::UInt(label as u64)),
            _ => None,
        }
    } else {
        match ctx.graph.read_vertex_property(vid, pid, ctx.trx_id, ctx.begin_time, ctx.read_only, ctx.dep) {
            ReadStat::Success((tag, bytes)) => tag_and_bytes_to_value(tag, &bytes).ok(),
            _ => None,
        }
    }
}

pub fn values(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let pid = pid_from(params.first());
    map_rows(rows, |_h, v| {
        let Value::Vid(vid) = v else { return Ok(Vec::new()) };
        Ok(read_vertex_value(ctx, *vid, pid).into_iter().collect())
    })
}

pub fn properties(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let pid = pid_from(params.first());
    map_rows(rows, |_h, v| {
        let Value::Vid(vid) = v else { return Ok(Vec::new()) };
        Ok(read_vertex_value(ctx, *vid, pid)
            .into_iter()
            .map(|val| Value::List(vec![Value::UInt(pid.raw() as u64), val]))
            .collect())
    })
}

/// `kind` selects how the one-or-more `(pid, pred_type, pred_vals)` tuples
/// that follow are composed (spec.md §6.1): `UInt(1)` is OR, anything else
/// (including absent) is AND.
pub fn has(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let or_kind = matches!(params.first(), Some(Value::UInt(1)));
    let predicates: Vec<(Pid, CmpOp, Option<Value>)> = params[1.min(params.len())..]
        .chunks(3)
        .map(|chunk| (pid_from(chunk.first()), CmpOp::from_param(chunk.get(1)), chunk.get(2).cloned()))
        .collect();
    map_rows(rows, |_h, v| {
        let Value::Vid(vid) = v else { return Ok(Vec::new()) };
        let mut keep = !or_kind;
        for (pid, op, target) in &predicates {
            let matched = match read_vertex_value(ctx, *vid, *pid) {
                Some(val) => target.as_ref().map(|t| op.apply(&val, t)).unwrap_or(true),
                None => false,
            };
            keep = if or_kind { keep || matched } else { keep && matched };
        }
        Ok(if keep { vec![v.clone()] } else { Vec::new() })
    })
}

pub fn has_label(ctx: &mut ExecCtx<'_>, params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let Some(Value::UInt(want)) = params.first() else { return Ok(rows) };
    let want = *want as u32;
    map_rows(rows, |_h, v| {
        let Value::Vid(vid) = v else { return Ok(Vec::new()) };
        match ctx.graph.read_vertex_label(*vid, ctx.trx_id, ctx.begin_time, ctx.dep) {
            ReadStat::Success(label) if label == want => Ok(vec![v.clone()]),
            _ => Ok(Vec::new()),
        }
    })
}

/// Pulls a set of history labels into a single projected `Value::List` per
/// row (spec.md §6.1 `project`). Missing labels project as `Value::Bool(false)`.
pub fn project(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let names: Vec<&str> = params.iter().filter_map(|v| if let Value::Str(s) = v { Some(s.as_str()) } else { None }).collect();
    rows.into_iter()
        .map(|(history, _values)| {
            let projected: Vec<Value> = names
                .iter()
                .map(|name| history.iter().rev().find(|(k, _)| k == name).map(|(_, v)| v.clone()).unwrap_or(Value::Bool(false)))
                .collect();
            (history, vec![Value::List(projected)])
        })
        .collect()
}

/// `index` (spec.md §4.7/§6.1): a hook for consulting a prebuilt
/// `PropertyIndex` before falling back to `has`. `Graph` does not currently
/// own a `PropertyIndex` instance (see DESIGN.md), so this is a documented
/// pass-through rather than a real shortcut; it exists so a plan containing
/// an `Index` expert still executes correctly end-to-end.
pub fn index_scan(_ctx: &mut ExecCtx<'_>, _params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    Ok(rows)
}
