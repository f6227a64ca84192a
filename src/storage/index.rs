//! C7 — Property Index.
//!
//! A sorted map from property value to a sorted set of element ids, per
//! `(element_kind, pid)`, plus the set of elements missing that key
//! (spec.md §4.7). Values are indexed as their raw decoded bytes
//! (`IndexKey`), so range predicates are lexicographic rather than
//! numeric/typed — documented as a simplification in DESIGN.md; callers that
//! need numeric ordering must encode values big-endian before indexing
//! (`i64`/`f64` both admit an order-preserving big-endian encoding).

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::ids::{ElementKind, Pid};

/// An indexed property value, compared lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(pub Vec<u8>);

/// A single predicate against one property key (spec.md §6.1 `has`).
#[derive(Debug, Clone)]
pub enum Pred {
    Eq(IndexKey),
    Lt(IndexKey),
    Lte(IndexKey),
    Gt(IndexKey),
    Gte(IndexKey),
    Between(IndexKey, IndexKey),
}

struct IndexEntry {
    by_value: BTreeMap<IndexKey, BTreeSet<u64>>,
    no_key: BTreeSet<u64>,
    enabled: bool,
}

impl IndexEntry {
    fn new() -> Self {
        IndexEntry { by_value: BTreeMap::new(), no_key: BTreeSet::new(), enabled: false }
    }

    fn matches(&self, pred: &Pred) -> Vec<u64> {
        let range: Box<dyn Iterator<Item = &BTreeSet<u64>>> = match pred {
            Pred::Eq(k) => Box::new(self.by_value.get(k).into_iter()),
            Pred::Lt(k) => Box::new(self.by_value.range(..k.clone()).map(|(_, v)| v)),
            Pred::Lte(k) => {
                let upper = k.clone();
                Box::new(self.by_value.range(..=upper).map(|(_, v)| v))
            }
            Pred::Gt(k) => {
                use std::ops::Bound::{Excluded, Unbounded};
                Box::new(self.by_value.range((Excluded(k.clone()), Unbounded)).map(|(_, v)| v))
            }
            Pred::Gte(k) => Box::new(self.by_value.range(k.clone()..).map(|(_, v)| v)),
            Pred::Between(lo, hi) => Box::new(self.by_value.range(lo.clone()..hi.clone()).map(|(_, v)| v)),
        };
        let mut out = BTreeSet::new();
        for set in range {
            out.extend(set.iter().copied());
        }
        out.into_iter().collect()
    }
}

/// Per `(element_kind, pid)` index, keyed with enable/disable (spec.md
/// `set_enable`). Queries against a disabled index return empty rather than
/// falling back to a scan — callers (the `index` expert) are expected to
/// check `is_enabled` first and fall back to a full-scan `has` filter
/// themselves.
pub struct PropertyIndex {
    entries: DashMap<(ElementKind, Pid), Mutex<IndexEntry>>,
}

impl Default for PropertyIndex {
    fn default() -> Self {
        PropertyIndex { entries: DashMap::new() }
    }
}

impl PropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, kind: ElementKind, pid: Pid) -> dashmap::mapref::one::RefMut<'_, (ElementKind, Pid), Mutex<IndexEntry>> {
        self.entries.entry((kind, pid)).or_insert_with(|| Mutex::new(IndexEntry::new()))
    }

    /// Rebuilds the index for `(kind, pid)` from a caller-supplied scan —
    /// `(item_id, Some(key))` for elements carrying the property, `(item_id,
    /// None)` for elements of that kind lacking it.
    pub fn build_index<I: IntoIterator<Item = (u64, Option<IndexKey>)>>(&self, kind: ElementKind, pid: Pid, scan: I) {
        let entry = self.entry(kind, pid);
        let mut e = entry.lock();
        e.by_value.clear();
        e.no_key.clear();
        for (id, key) in scan {
            match key {
                Some(k) => e.by_value.entry(k).or_default().insert(id),
                None => e.no_key.insert(id),
            };
        }
        e.enabled = true;
    }

    pub fn set_enable(&self, kind: ElementKind, pid: Pid, enabled: bool) {
        let entry = self.entry(kind, pid);
        entry.lock().enabled = enabled;
    }

    pub fn is_enabled(&self, kind: ElementKind, pid: Pid) -> bool {
        self.entries.get(&(kind, pid)).map(|e| e.lock().enabled).unwrap_or(false)
    }

    /// Intersects the sorted id lists satisfying each predicate in the
    /// chain, preserving sortedness via linear merge (spec.md §4.7).
    pub fn get_elements(&self, kind: ElementKind, pred_chain: &[(Pid, Pred)]) -> Vec<u64> {
        let mut acc: Option<Vec<u64>> = None;
        for (pid, pred) in pred_chain {
            let Some(entry) = self.entries.get(&(kind, *pid)) else { return Vec::new() };
            let matched = entry.lock().matches(pred);
            acc = Some(match acc {
                None => matched,
                Some(prev) => intersect_sorted(&prev, &matched),
            });
        }
        acc.unwrap_or_default()
    }
}

fn intersect_sorted(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: i64) -> IndexKey {
        IndexKey(n.to_be_bytes().to_vec())
    }

    #[test]
    fn eq_predicate_finds_matching_ids() {
        let idx = PropertyIndex::new();
        idx.build_index(
            ElementKind::Vertex,
            Pid::new(1),
            vec![(1, Some(key(30))), (2, Some(key(40))), (3, None)],
        );
        let found = idx.get_elements(ElementKind::Vertex, &[(Pid::new(1), Pred::Eq(key(30)))]);
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn between_predicate_matches_half_open_range() {
        let idx = PropertyIndex::new();
        idx.build_index(
            ElementKind::Vertex,
            Pid::new(1),
            vec![(1, Some(key(18))), (2, Some(key(40))), (3, Some(key(65)))],
        );
        let found = idx.get_elements(ElementKind::Vertex, &[(Pid::new(1), Pred::Between(key(18), key(65)))]);
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn intersection_across_two_predicates() {
        let idx = PropertyIndex::new();
        idx.build_index(ElementKind::Vertex, Pid::new(1), vec![(1, Some(key(1))), (2, Some(key(1))), (3, Some(key(2)))]);
        idx.build_index(ElementKind::Vertex, Pid::new(2), vec![(2, Some(key(9))), (3, Some(key(9)))]);
        let found = idx.get_elements(
            ElementKind::Vertex,
            &[(Pid::new(1), Pred::Eq(key(1))), (Pid::new(2), Pred::Eq(key(9)))],
        );
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn disabled_index_can_be_queried_via_is_enabled_before_use() {
        let idx = PropertyIndex::new();
        idx.build_index(ElementKind::Vertex, Pid::new(1), vec![(1, Some(key(1)))]);
        assert!(idx.is_enabled(ElementKind::Vertex, Pid::new(1)));
        idx.set_enable(ElementKind::Vertex, Pid::new(1), false);
        assert!(!idx.is_enabled(ElementKind::Vertex, Pid::new(1)));
    }
}
