//! `validation`, `commit`, `terminate` (spec.md §4.13): the system-inserted
//! experts appended to every transaction's plan that run the optimistic
//! concurrency control protocol. `post_validation` has no kernel of its own
//! — it is a barrier marker the engine uses to know every branch has
//! reached validation before running it once per transaction (handled in
//! [`crate::experts::execute`] as a pass-through).

use crate::error::EngineError;
use crate::experts::{abort_err, ExecCtx, Row};
use crate::ids::Timestamp;
use crate::txn::rct::Primitive;
use crate::txn::trx_client::TrxStat;

/// Validates this transaction's pending writes against everything committed
/// since its begin timestamp (spec.md §4.8, §4.13). A transaction with no
/// pending writes (read-only, or an update that happened to touch nothing)
/// validates trivially. On conflict, every pending write is aborted and the
/// transaction's bookkeeping is cleaned before the error propagates.
pub fn validation(ctx: &mut ExecCtx<'_>, rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    ctx.trx_client.update_status(ctx.trx_id, TrxStat::Validating);
    if ctx.writes.is_empty() {
        return Ok(rows);
    }

    let candidates = ctx.trx_client.get_recent_writers(ctx.begin_time, Timestamp::MAX);
    if candidates.is_empty() {
        return Ok(rows);
    }

    let mut retries_left = ctx.validation_poll_retries;
    loop {
        let mut conflict = false;
        for primitive in Primitive::ALL {
            let mine = ctx.rct.pending_for(primitive, ctx.trx_id);
            if mine.is_empty() {
                continue;
            }
            let committed = ctx.rct.records_for_writers(primitive, &candidates);
            if mine.iter().any(|m| committed.iter().any(|c| c.item_id == m.item_id && c.pid == m.pid)) {
                conflict = true;
                break;
            }
        }
        if conflict {
            clean_and_abort(ctx);
            return Err(abort_err(ctx.trx_id, Primitive::Mvp));
        }

        let anyone_still_validating = candidates.iter().any(|&w| ctx.trx_client.read_status(w) == TrxStat::Validating);
        if !anyone_still_validating || retries_left == 0 {
            break;
        }
        retries_left -= 1;
        std::thread::sleep(ctx.validation_poll_interval);
    }
    Ok(rows)
}

fn clean_and_abort(ctx: &mut ExecCtx<'_>) {
    ctx.writes.abort_all();
    for primitive in Primitive::ALL {
        ctx.rct.discard(primitive, ctx.trx_id);
    }
    ctx.dep_map.take(ctx.trx_id);
    ctx.trx_client.update_status(ctx.trx_id, TrxStat::Abort);
}

/// Finalizes every tracked write at a freshly allocated commit timestamp and
/// copies this transaction's RCT records into the commit-time-keyed shard
/// (spec.md §4.6's "clean set").
pub fn commit(ctx: &mut ExecCtx<'_>, rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let commit_time = ctx.trx_client.allocate_commit_timestamp(ctx.trx_id);
    ctx.writes.commit_all(commit_time);
    for primitive in Primitive::ALL {
        ctx.rct.commit(primitive, ctx.trx_id, commit_time);
    }
    ctx.dep_map.take(ctx.trx_id);
    ctx.trx_client.update_status(ctx.trx_id, TrxStat::Committed);
    Ok(rows)
}

/// Last expert of every plan. A read-only transaction that never reached
/// `validation` is marked committed here instead.
pub fn terminate(ctx: &mut ExecCtx<'_>, rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    if ctx.trx_client.read_status(ctx.trx_id) == TrxStat::Processing {
        ctx.trx_client.update_status(ctx.trx_id, TrxStat::Committed);
    }
    Ok(rows)
}
