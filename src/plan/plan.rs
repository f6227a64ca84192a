//! C10 — Plan model: the immutable, prebuilt plan a worker receives inside
//! an `INIT` message (spec.md §3.4). Plan compilation itself is out of
//! scope (spec.md §1); this crate only needs to carry and interpret one.

use crate::ids::{Eid, Vid};

/// A scalar or compound value carried in expert params and message data
/// (spec.md §3.4, §6.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Vid(Vid),
    Eid(Eid),
    List(Vec<Value>),
}

impl Value {
    /// Rough serialized size in bytes, used by [`super::message::Message`]
    /// to decide when a value list must be split (spec.md §4.10).
    pub fn approx_bytes(&self) -> usize {
        match self {
            Value::Int(_) | Value::UInt(_) | Value::Float(_) => 8,
            Value::Bool(_) => 1,
            Value::Str(s) => s.len() + 4,
            Value::Vid(_) => 4,
            Value::Eid(_) => 8,
            Value::List(items) => items.iter().map(Value::approx_bytes).sum::<usize>() + 4,
        }
    }
}

/// The canonical expert types named in spec.md §6.1's table, plus the four
/// system-inserted ones from §4.13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertType {
    Init,
    Traversal,
    Has,
    HasLabel,
    Values,
    Properties,
    Project,
    Select,
    As,
    Is,
    Aggregate,
    Cap,
    Group,
    Order,
    Range,
    Coin,
    Math,
    Index,
    Config,
    Status,
    AddV,
    AddE,
    Drop,
    Property,
    Validation,
    Commit,
    Terminate,
    PostValidation,
}

/// `{ type, index, params, next_step, send_remote }` (spec.md §3.4).
#[derive(Debug, Clone)]
pub struct Expert {
    pub kind: ExpertType,
    pub index: usize,
    pub params: Vec<Value>,
    pub next_step: i32,
    pub send_remote: bool,
}

impl Expert {
    pub fn new(kind: ExpertType, index: usize, params: Vec<Value>, next_step: i32) -> Self {
        Expert { kind, index, params, next_step, send_remote: false }
    }
}

/// Whether a plan's transaction may mutate the graph (spec.md §3.4
/// `trx_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxType {
    ReadOnly,
    Update,
}

/// `{ trx_id, begin_timestamp, trx_type, query_count_in_trx, experts }`
/// (spec.md §3.4). Immutable once built — a worker only ever reads it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub trx_id: crate::ids::TrxId,
    pub begin_timestamp: crate::ids::Timestamp,
    pub trx_type: TrxType,
    pub query_count_in_trx: u32,
    pub experts: Vec<Expert>,
}

impl Plan {
    pub fn expert_at(&self, step: i32) -> Option<&Expert> {
        if step < 0 {
            return None;
        }
        self.experts.get(step as usize)
    }

    pub fn is_last_query(&self, query_index: u32) -> bool {
        query_index + 1 >= self.query_count_in_trx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Timestamp, TrxId};

    #[test]
    fn expert_at_indexes_into_the_plan() {
        let plan = Plan {
            trx_id: TrxId::new(1),
            begin_timestamp: Timestamp::new(0),
            trx_type: TrxType::ReadOnly,
            query_count_in_trx: 1,
            experts: vec![Expert::new(ExpertType::Init, 0, vec![], 1), Expert::new(ExpertType::Has, 1, vec![], -1)],
        };
        assert!(matches!(plan.expert_at(0).unwrap().kind, ExpertType::Init));
        assert!(plan.expert_at(2).is_none());
        assert!(plan.expert_at(-1).is_none());
    }

    #[test]
    fn is_last_query_checks_the_zero_based_index() {
        let plan = Plan {
            trx_id: TrxId::new(1),
            begin_timestamp: Timestamp::new(0),
            trx_type: TrxType::Update,
            query_count_in_trx: 2,
            experts: vec![],
        };
        assert!(!plan.is_last_query(0));
        assert!(plan.is_last_query(1));
    }
}
