//! `as`, `select`, `is` (spec.md §6.1): history bindings and predicate
//! filtering over the *current* traverser value (as opposed to `has`, which
//! reads a stored property).

use crate::error::EngineError;
use crate::experts::{map_rows, CmpOp, Row};
use crate::plan::Value;

/// Binds the current value under `label` in each row's history, keeping the
/// traverser unchanged (spec.md `as`).
pub fn as_step(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let Some(Value::Str(label)) = params.first().cloned() else { return rows };
    rows.into_iter()
        .map(|(mut history, values)| {
            if let Some(first) = values.first() {
                history.push((label.clone(), first.clone()));
            }
            (history, values)
        })
        .collect()
}

/// Replaces the traverser with whatever was bound under `label` (spec.md
/// `select`). A row with no such binding drops out.
pub fn select(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let Some(Value::Str(label)) = params.first().cloned() else { return rows };
    rows.into_iter()
        .filter_map(|(history, _values)| {
            let found = history.iter().rev().find(|(k, _)| *k == label).map(|(_, v)| v.clone())?;
            Some((history, vec![found]))
        })
        .collect()
}

/// Filters on the current value directly, rather than a stored property
/// (spec.md `is`).
pub fn is(params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let op = CmpOp::from_param(params.first());
    let target = params.get(1).cloned();
    map_rows(rows, |_history, v| {
        let keep = target.as_ref().map(|t| op.apply(v, t)).unwrap_or(true);
        Ok(if keep { vec![v.clone()] } else { Vec::new() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_step_binds_current_value_under_label() {
        let rows = vec![(Vec::new(), vec![Value::Int(5)])];
        let out = as_step(&[Value::Str("x".into())], rows);
        assert_eq!(out[0].0, vec![("x".to_string(), Value::Int(5))]);
        assert_eq!(out[0].1, vec![Value::Int(5)]);
    }

    #[test]
    fn as_step_with_no_current_value_leaves_history_untouched() {
        let rows = vec![(Vec::new(), Vec::new())];
        let out = as_step(&[Value::Str("x".into())], rows);
        assert!(out[0].0.is_empty());
    }

    #[test]
    fn select_replaces_traverser_with_bound_value() {
        let history = vec![("x".to_string(), Value::Int(9))];
        let rows = vec![(history.clone(), vec![Value::Int(1)])];
        let out = select(&[Value::Str("x".into())], rows);
        assert_eq!(out, vec![(history, vec![Value::Int(9)])]);
    }

    #[test]
    fn select_drops_rows_with_no_such_binding() {
        let rows = vec![(Vec::new(), vec![Value::Int(1)])];
        let out = select(&[Value::Str("missing".into())], rows);
        assert!(out.is_empty());
    }

    #[test]
    fn is_filters_on_current_value() {
        let rows = vec![(Vec::new(), vec![Value::Int(1), Value::Int(2), Value::Int(3)])];
        let out = is(&[Value::UInt(4), Value::Int(1)], rows).unwrap();
        assert_eq!(out[0].1, vec![Value::Int(2), Value::Int(3)]);
    }
}
