//! `aggregate`, `cap`, `group`, `order`, `range`, `coin`, `math` (spec.md
//! §6.1). These are the barrier-shaped kernels: the engine collects a whole
//! step's traversers before calling them (spec.md §4.10), so unlike
//! [`crate::experts::map_rows`] consumers, these see and return the full
//! batch at once.

use rand::{Rng, RngCore};

use crate::error::EngineError;
use crate::experts::{value_cmp, Row};
use crate::plan::{History, Value};

/// `aggregate(name[, "count"])`: folds every current value across the batch
/// into one history binding named `name`, either as a `Value::List` or — in
/// `"count"` mode — as a single `Value::UInt`.
pub fn aggregate(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let Some(Value::Str(name)) = params.first().cloned() else { return rows };
    let counting = matches!(params.get(1), Some(Value::Str(m)) if m == "count");
    let mut bag = Vec::new();
    let mut base_history: History = Vec::new();
    for (history, values) in rows {
        if base_history.is_empty() {
            base_history = history;
        }
        bag.extend(values);
    }
    let agg_value = if counting { Value::UInt(bag.len() as u64) } else { Value::List(bag) };
    base_history.push((name, agg_value));
    vec![(base_history, Vec::new())]
}

/// `cap(name, ...)`: reads back one or more `aggregate`d bindings as the
/// step's output values.
pub fn cap(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let names: Vec<String> = params.iter().filter_map(|v| if let Value::Str(s) = v { Some(s.clone()) } else { None }).collect();
    rows.into_iter()
        .map(|(history, _values)| {
            let values = names
                .iter()
                .filter_map(|n| history.iter().rev().find(|(k, _)| k == n).map(|(_, v)| v.clone()))
                .collect();
            (history, values)
        })
        .collect()
}

/// `group(key_label)`: groups the batch's current values by whatever value
/// is bound to `key_label` in each row's history, emitting one
/// `[key, [values...]]` pair per group.
pub fn group(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let Some(Value::Str(key_label)) = params.first().cloned() else { return rows };
    let mut groups: std::collections::BTreeMap<String, (Value, Vec<Value>)> = std::collections::BTreeMap::new();
    for (history, values) in rows {
        let Some(key) = history.iter().rev().find(|(k, _)| *k == key_label).map(|(_, v)| v.clone()) else { continue };
        let bucket_key = format!("{key:?}");
        groups.entry(bucket_key).or_insert_with(|| (key, Vec::new())).1.extend(values);
    }
    let list: Vec<Value> = groups.into_values().map(|(key, values)| Value::List(vec![key, Value::List(values)])).collect();
    vec![(Vec::new(), vec![Value::List(list)])]
}

/// `order([, "desc"])`: sorts the batch's current values. Stable, so rows
/// with equal keys keep their relative order.
pub fn order(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let desc = matches!(params.first(), Some(Value::Str(s)) if s == "desc");
    let mut flat: Vec<(History, Value)> = rows.into_iter().flat_map(|(h, vs)| vs.into_iter().map(move |v| (h.clone(), v))).collect();
    flat.sort_by(|a, b| value_cmp(&a.1, &b.1));
    if desc {
        flat.reverse();
    }
    flat.into_iter().map(|(h, v)| (h, vec![v])).collect()
}

/// `range(start, end)`: keeps the half-open slice `[start, end)` of the
/// batch's flattened current values, in arrival order; `end == -1` means
/// unbounded (spec.md §8 boundary behavior).
pub fn range(params: &[Value], rows: Vec<Row>) -> Vec<Row> {
    let start = match params.first() {
        Some(Value::Int(n)) => (*n).max(0) as usize,
        _ => 0,
    };
    let end = match params.get(1) {
        Some(Value::Int(n)) if *n >= 0 => Some(*n as usize),
        _ => None,
    };
    let mut idx = 0usize;
    let mut out = Vec::new();
    for (history, values) in rows {
        let mut kept = Vec::new();
        for v in values {
            let include = idx >= start && end.map(|e| idx < e).unwrap_or(true);
            if include {
                kept.push(v);
            }
            idx += 1;
        }
        if !kept.is_empty() {
            out.push((history, kept));
        }
    }
    out
}

/// `coin(p)`: keeps each traverser independently with probability `p`
/// (spec.md §8 "coin's empirical proportion test").
pub fn coin(params: &[Value], rows: Vec<Row>, rng: &mut dyn RngCore) -> Vec<Row> {
    let p = match params.first() {
        Some(Value::Float(f)) => *f,
        _ => 1.0,
    };
    rows.into_iter()
        .filter_map(|(history, values)| {
            let kept: Vec<Value> = values.into_iter().filter(|_| rng.gen::<f64>() < p).collect();
            if kept.is_empty() {
                None
            } else {
                Some((history, kept))
            }
        })
        .collect()
}

/// `math(op, operand)`: applies `+ - * /` to each numeric current value.
pub fn math(params: &[Value], rows: Vec<Row>) -> Result<Vec<Row>, EngineError> {
    let Some(Value::Str(op)) = params.first() else {
        return Err(EngineError::InvalidArgument("math requires an operator".into()));
    };
    let operand = params.get(1).cloned().unwrap_or(Value::Float(0.0));
    let operand = as_f64(&operand).ok_or_else(|| EngineError::InvalidArgument("math operand must be numeric".into()))?;
    let out = rows
        .into_iter()
        .map(|(history, values)| {
            let mapped = values
                .into_iter()
                .map(|v| {
                    let x = as_f64(&v).unwrap_or(0.0);
                    let result = match op.as_str() {
                        "add" => x + operand,
                        "sub" => x - operand,
                        "mul" => x * operand,
                        "div" => x / operand,
                        _ => x,
                    };
                    Value::Float(result)
                })
                .collect();
            (history, mapped)
        })
        .collect();
    Ok(out)
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::UInt(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn aggregate_bags_every_current_value() {
        let rows = vec![(Vec::new(), vec![Value::Int(1), Value::Int(2)]), (Vec::new(), vec![Value::Int(3)])];
        let out = aggregate(&[Value::Str("bag".into())], rows);
        assert_eq!(out[0].0, vec![("bag".to_string(), Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))]);
    }

    #[test]
    fn aggregate_count_mode_counts_values() {
        let rows = vec![(Vec::new(), vec![Value::Int(1), Value::Int(2), Value::Int(3)])];
        let out = aggregate(&[Value::Str("n".into()), Value::Str("count".into())], rows);
        assert_eq!(out[0].0, vec![("n".to_string(), Value::UInt(3))]);
    }

    #[test]
    fn cap_reads_back_an_aggregated_binding() {
        let history = vec![("total".to_string(), Value::UInt(5))];
        let rows = vec![(history, Vec::new())];
        let out = cap(&[Value::Str("total".into())], rows);
        assert_eq!(out[0].1, vec![Value::UInt(5)]);
    }

    #[test]
    fn group_buckets_by_history_key() {
        let rows = vec![
            (vec![("k".to_string(), Value::Str("a".into()))], vec![Value::Int(1)]),
            (vec![("k".to_string(), Value::Str("a".into()))], vec![Value::Int(2)]),
            (vec![("k".to_string(), Value::Str("b".into()))], vec![Value::Int(3)]),
        ];
        let out = group(&[Value::Str("k".into())], rows);
        let Value::List(groups) = &out[0].1[0] else { panic!("expected a list") };
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn order_sorts_ascending_by_default_and_descending_on_request() {
        let rows = vec![(Vec::new(), vec![Value::Int(3), Value::Int(1), Value::Int(2)])];
        let asc = order(&[], rows.clone());
        let values: Vec<Value> = asc.into_iter().map(|(_, mut v)| v.remove(0)).collect();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let desc = order(&[Value::Str("desc".into())], rows);
        let values: Vec<Value> = desc.into_iter().map(|(_, mut v)| v.remove(0)).collect();
        assert_eq!(values, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn range_keeps_the_half_open_slice() {
        let rows = vec![(Vec::new(), vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])];
        let out = range(&[Value::Int(1), Value::Int(3)], rows);
        assert_eq!(out[0].1, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn range_with_unbounded_end_keeps_everything_from_start() {
        let rows = vec![(Vec::new(), vec![Value::Int(0), Value::Int(1), Value::Int(2)])];
        let out = range(&[Value::Int(1), Value::Int(-1)], rows);
        assert_eq!(out[0].1, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn coin_with_probability_one_keeps_every_traverser() {
        let rows = vec![(Vec::new(), vec![Value::Int(1), Value::Int(2)])];
        let mut rng = StepRng::new(0, 1);
        let out = coin(&[Value::Float(1.0)], rows, &mut rng);
        assert_eq!(out[0].1, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn coin_with_probability_zero_drops_every_traverser() {
        let rows = vec![(Vec::new(), vec![Value::Int(1), Value::Int(2)])];
        let mut rng = StepRng::new(0, 1);
        let out = coin(&[Value::Float(0.0)], rows, &mut rng);
        assert!(out.is_empty());
    }

    #[test]
    fn math_add_applies_to_every_value() {
        let rows = vec![(Vec::new(), vec![Value::Int(1), Value::Int(2)])];
        let out = math(&[Value::Str("add".into()), Value::Float(10.0)], rows).unwrap();
        assert_eq!(out[0].1, vec![Value::Float(11.0), Value::Float(12.0)]);
    }

    #[test]
    fn math_without_an_operator_is_an_error() {
        let rows = vec![(Vec::new(), vec![Value::Int(1)])];
        assert!(math(&[], rows).is_err());
    }
}
