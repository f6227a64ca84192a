//! `IdMapper`: cluster topology / worker discovery, out of scope per spec.md
//! §1. Storage consults it only to decide whether an element is local before
//! touching any MVCC structure.

use crate::ids::Vid;

/// Maps vertex ids to owning worker nodes. The real implementation is a
/// cluster-wide partition table served by the master; this crate only needs
/// "is this element mine" and "which node owns it" at the boundary.
pub trait IdMapper: Send + Sync {
    fn node_count(&self) -> usize;
    fn local_node(&self) -> usize;
    fn owner(&self, vid: Vid) -> usize;
    fn is_local(&self, vid: Vid) -> bool {
        self.owner(vid) == self.local_node()
    }
}

/// `vid % node_count` partitioning, the simplest scheme that exercises the
/// locality-filtering contract without needing a real partition table.
pub struct ModuloIdMapper {
    node_count: usize,
    local_node: usize,
}

impl ModuloIdMapper {
    pub fn new(node_count: usize, local_node: usize) -> Self {
        assert!(node_count > 0, "cluster must have at least one node");
        assert!(local_node < node_count, "local_node out of range");
        ModuloIdMapper { node_count, local_node }
    }

    /// A single-node deployment: every element is local.
    pub fn single_node() -> Self {
        ModuloIdMapper { node_count: 1, local_node: 0 }
    }
}

impl IdMapper for ModuloIdMapper {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn local_node(&self) -> usize {
        self.local_node
    }

    fn owner(&self, vid: Vid) -> usize {
        vid.raw() as usize % self.node_count
    }
}
