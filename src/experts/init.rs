//! `init` (spec.md §4.10, §4.12): the first expert of every plan. Seed
//! traversers already live in the `INIT` message's `data` (placed there by
//! [`crate::plan::create_init_messages`] from the plan's locality-partitioned
//! inline params, or — for a non-seeded query like `g.V()` — left empty for
//! a later full-scan expert to populate). `init` itself is a pass-through.

use crate::error::EngineError;
use crate::experts::Row;

pub fn init(rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Value;

    #[test]
    fn passes_rows_through_unchanged() {
        let rows = vec![(Vec::new(), vec![Value::Int(1)])];
        let out = init(rows.clone()).unwrap();
        assert_eq!(out, rows);
    }

    #[test]
    fn empty_seed_stays_empty() {
        assert!(init(Vec::new()).unwrap().is_empty());
    }
}
