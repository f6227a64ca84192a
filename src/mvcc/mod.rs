//! C3 — MVCC List and the payload variants it carries (spec.md §3.2, §4.3).

pub mod item;
pub mod list;

pub use item::{EdgeVersion, PropertyVersion, ValueGc, VertexExistence};
pub use list::{AppendOutcome, DepKind, DependencyRecorder, MvccList, VisibleVersion};
