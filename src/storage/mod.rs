//! The graph storage layer: property and topology row lists (C4/C5), the
//! data storage façade (C6), and the property index (C7).

pub mod graph;
pub mod index;
pub mod property_row;
pub mod topology_row;

pub use graph::{Graph, ProcessStat, ReadStat, Vertex};
pub use index::{IndexKey, Pred, PropertyIndex};
pub use property_row::PropertyRowList;
pub use topology_row::{Direction, TopologyRowList};
