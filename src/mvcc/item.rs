//! MVCC item payload variants (spec.md §3.2).
//!
//! Four payload shapes are named in the spec: vertex existence, edge
//! version, vertex-property header, edge-property header. The last two are
//! structurally identical (a [`crate::alloc::ValueHeader`] into the value
//! store) so this crate represents them with one `PropertyVersion` type used
//! for both vertex and edge property cells — noted as a simplification in
//! DESIGN.md.

use std::sync::Arc;

use crate::alloc::vstore::{ValueHeader, ValueStore};

/// Vertex existence: `true` while live, `false` for a deleted vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexExistence(pub bool);

/// One version of an edge. Generic over the property-row-list handle type so
/// `crate::mvcc` does not depend on `crate::storage` (which itself builds on
/// `crate::mvcc::MvccList`). `label == 0` denotes a deleted edge version.
#[derive(Debug, Clone)]
pub struct EdgeVersion<P> {
    pub label: u32,
    pub prop_row_list: Option<Arc<P>>,
}

impl<P> Default for EdgeVersion<P> {
    fn default() -> Self {
        EdgeVersion {
            label: 0,
            prop_row_list: None,
        }
    }
}

impl<P> EdgeVersion<P> {
    pub fn deleted() -> Self {
        Self::default()
    }

    pub fn is_deleted(&self) -> bool {
        self.label == 0
    }
}

/// A property version: either a value header (live) or a tombstone header
/// (dropped), shared between vertex- and edge-property chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyVersion {
    pub header: ValueHeader,
}

impl PropertyVersion {
    pub fn empty() -> Self {
        PropertyVersion {
            header: ValueHeader::TOMBSTONE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_tombstone()
    }
}

/// Frees any value-store-backed resources owned by a payload when its MVCC
/// item is retired (aborted or garbage collected). Vertex existence and
/// edge-version payloads own nothing extra (an `Arc<P>` drops on its own).
pub trait ValueGc {
    fn value_gc(&self, store: &ValueStore, tid: usize);
}

impl ValueGc for VertexExistence {
    fn value_gc(&self, _store: &ValueStore, _tid: usize) {}
}

impl<P> ValueGc for EdgeVersion<P> {
    fn value_gc(&self, _store: &ValueStore, _tid: usize) {}
}

impl ValueGc for PropertyVersion {
    fn value_gc(&self, store: &ValueStore, tid: usize) {
        if !self.header.is_tombstone() {
            store.free(self.header, tid);
        }
    }
}
