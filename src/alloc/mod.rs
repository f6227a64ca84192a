//! Slab allocators backing the MVCC storage layer (spec.md §4.1–§4.2).

pub mod cell;
pub mod vstore;

pub use cell::CellAllocator;
pub use vstore::{ValueHeader, ValueStore};
