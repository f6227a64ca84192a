//! C12 — Expert kernels: the per-step functions a worker invokes as it walks
//! a [`crate::plan::Plan`] (spec.md §4.12). Each kernel consumes the current
//! batch of `(history, values)` rows carried by a [`crate::plan::Message`]
//! and produces the next batch; barrier-shaped kernels (aggregate, cap,
//! group, order, range, coin) instead consume the whole step's accumulated
//! batch at once, since they only make sense once every upstream traverser
//! has arrived (spec.md §4.10 "barrier aggregation").

pub mod barrier;
pub mod filter;
pub mod history;
pub mod init;
pub mod mutate;
pub mod traversal;
pub mod txn_experts;

use std::time::Duration;

use rand::RngCore;

use crate::error::EngineError;
use crate::ids::Timestamp;
use crate::ids::TrxId;
use crate::mvcc::DependencyRecorder;
use crate::plan::{ExpertType, History, Value};
use crate::storage::Graph;
use crate::txn::dep::DepTrxMap;
use crate::txn::rct::{Primitive, RecentActionTable};
use crate::txn::trx_client::TrxClient;
use crate::txn::write_set::WriteSet;

/// One `(history, values)` pair as carried in [`crate::plan::Message::data`].
pub type Row = (History, Vec<Value>);

/// Everything a kernel needs to touch storage and transaction bookkeeping.
/// Borrowed for the duration of one expert's invocation.
pub struct ExecCtx<'a> {
    pub graph: &'a Graph,
    pub trx_id: TrxId,
    pub begin_time: Timestamp,
    pub read_only: bool,
    pub dep: &'a dyn DependencyRecorder,
    pub writes: &'a WriteSet,
    pub rct: &'a RecentActionTable,
    pub rng: &'a mut dyn RngCore,
    pub tid: usize,
    pub trx_client: &'a dyn TrxClient,
    pub dep_map: &'a DepTrxMap,
    pub validation_poll_interval: Duration,
    pub validation_poll_retries: u32,
}

/// Builds the `ValidationConflict` error a write kernel raises when
/// `Graph` reports a write-write conflict (spec.md §7).
pub fn abort_err(trx_id: TrxId, primitive: Primitive) -> EngineError {
    EngineError::ValidationConflict { trx: trx_id.to_string(), reason: format!("{primitive:?} conflict") }
}

/// Builds the error a read kernel raises when `get_visible_version`
/// reports a pre-read conflict (spec.md §4.3), distinct from a write-write
/// conflict since no `Primitive` write category is involved.
pub fn read_abort_err(trx_id: TrxId) -> EngineError {
    EngineError::ValidationConflict { trx: trx_id.to_string(), reason: "read visibility conflict".into() }
}

/// Runs `f` over every value in every row, threading `history` through so
/// kernels that need history context (e.g. `add_e`'s `.to(select(...))`)
/// can see it. A row whose values all map to nothing is dropped.
pub(crate) fn map_rows<F>(rows: Vec<Row>, mut f: F) -> Result<Vec<Row>, EngineError>
where
    F: FnMut(&History, &Value) -> Result<Vec<Value>, EngineError>,
{
    let mut out = Vec::with_capacity(rows.len());
    for (history, values) in rows {
        let mut new_values = Vec::new();
        for v in &values {
            new_values.extend(f(&history, v)?);
        }
        out.push((history, new_values));
    }
    Ok(out)
}

/// Dispatches one step of a plan to its kernel (spec.md §4.12). Barrier-
/// shaped experts (`Aggregate`, `Cap`, `Group`, `Order`, `Range`, `Coin`) are
/// expected to have already been handed a fully-collected batch by the
/// engine's barrier-wait logic; this function itself does no buffering.
pub fn execute(
    ctx: &mut ExecCtx<'_>,
    kind: ExpertType,
    params: &[Value],
    rows: Vec<Row>,
) -> Result<Vec<Row>, EngineError> {
    match kind {
        ExpertType::Init => init::init(rows),
        ExpertType::Traversal => traversal::traversal(ctx, params, rows),
        ExpertType::Has => filter::has(ctx, params, rows),
        ExpertType::HasLabel => filter::has_label(ctx, params, rows),
        ExpertType::Values => filter::values(ctx, params, rows),
        ExpertType::Properties => filter::properties(ctx, params, rows),
        ExpertType::Project => Ok(filter::project(params, rows)),
        ExpertType::Select => Ok(history::select(params, rows)),
        ExpertType::As => Ok(history::as_step(params, rows)),
        ExpertType::Is => history::is(params, rows),
        ExpertType::Aggregate => Ok(barrier::aggregate(params, rows)),
        ExpertType::Cap => Ok(barrier::cap(params, rows)),
        ExpertType::Group => Ok(barrier::group(params, rows)),
        ExpertType::Order => Ok(barrier::order(params, rows)),
        ExpertType::Range => Ok(barrier::range(params, rows)),
        ExpertType::Coin => Ok(barrier::coin(params, rows, &mut *ctx.rng)),
        ExpertType::Math => barrier::math(params, rows),
        ExpertType::Index => filter::index_scan(ctx, params, rows),
        ExpertType::Config => Ok(rows),
        ExpertType::Status => Ok(rows),
        ExpertType::AddV => mutate::add_v(ctx, params, rows),
        ExpertType::AddE => mutate::add_e(ctx, params, rows),
        ExpertType::Drop => mutate::drop_element(ctx, params, rows),
        ExpertType::Property => mutate::property(ctx, params, rows),
        ExpertType::Validation => txn_experts::validation(ctx, rows),
        ExpertType::Commit => txn_experts::commit(ctx, rows),
        ExpertType::Terminate => txn_experts::terminate(ctx, rows),
        ExpertType::PostValidation => Ok(rows),
    }
}

/// Numeric/lexicographic comparison over the subset of [`Value`] variants
/// that support it; variants with no sensible order compare as `Equal` so
/// `order`/`has` degrade to "unchanged" rather than panicking.
pub(crate) fn value_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::UInt(x), Value::UInt(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Vid(x), Value::Vid(y)) => x.raw().cmp(&y.raw()),
        _ => Ordering::Equal,
    }
}

/// The six comparison operators `has`/`is` support, encoded as
/// `Value::UInt` in expert params (spec.md §6.1 `has` predicate table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    pub(crate) fn from_param(v: Option<&Value>) -> CmpOp {
        match v {
            Some(Value::UInt(1)) => CmpOp::Ne,
            Some(Value::UInt(2)) => CmpOp::Lt,
            Some(Value::UInt(3)) => CmpOp::Lte,
            Some(Value::UInt(4)) => CmpOp::Gt,
            Some(Value::UInt(5)) => CmpOp::Gte,
            _ => CmpOp::Eq,
        }
    }

    pub(crate) fn apply(self, a: &Value, b: &Value) -> bool {
        use std::cmp::Ordering::*;
        let ord = value_cmp(a, b);
        match self {
            CmpOp::Eq => ord == Equal,
            CmpOp::Ne => ord != Equal,
            CmpOp::Lt => ord == Less,
            CmpOp::Lte => ord != Greater,
            CmpOp::Gt => ord == Greater,
            CmpOp::Gte => ord != Less,
        }
    }
}
