//! Bit-packed identifier types shared across storage, plans, and messages.
//!
//! Layouts follow the wire contract exactly: a `Vid` is 26 bits, an `Eid`
//! packs `(dst_vid, src_vid)` into 52 bits, and `Vpid`/`Epid` append a 12-bit
//! property id with `pid == 0` reserved to mean "label". `TrxId` carries the
//! top bit set so it is never confused with a `Timestamp`, whose top bit is
//! always clear.

use std::fmt;

/// Mask for the 26-bit vertex id space.
pub const VID_BITS: u32 = 26;
const VID_MASK: u64 = (1 << VID_BITS) - 1;
/// Mask for the 12-bit property id space. `0` means "label".
pub const PID_BITS: u32 = 12;
const PID_MASK: u64 = (1 << PID_BITS) - 1;
/// `pid` value reserved to mean "the element's label".
pub const LABEL_PID: u16 = 0;

/// A 26-bit vertex identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vid(u32);

impl Vid {
    pub const MAX: Vid = Vid(VID_MASK as u32);

    pub fn new(raw: u32) -> Self {
        debug_assert!(raw as u64 <= VID_MASK, "vid exceeds 26 bits");
        Vid(raw & VID_MASK as u32)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Vid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A directed edge id: `src -> dst`, packed as `(dst_vid, src_vid)` into 52 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eid {
    pub src: Vid,
    pub dst: Vid,
}

impl Eid {
    pub fn new(src: Vid, dst: Vid) -> Self {
        Eid { src, dst }
    }

    /// Packs into the 52-bit `(dst, src)` wire layout documented in spec.md §3.1.
    pub fn pack(self) -> u64 {
        ((self.dst.raw() as u64) << VID_BITS) | self.src.raw() as u64
    }

    pub fn unpack(raw: u64) -> Self {
        let src = Vid::new((raw & VID_MASK) as u32);
        let dst = Vid::new(((raw >> VID_BITS) & VID_MASK) as u32);
        Eid { src, dst }
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// A 12-bit property id. `0` is reserved to mean "label".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u16);

impl Pid {
    pub fn new(raw: u16) -> Self {
        debug_assert!(raw as u64 <= PID_MASK, "pid exceeds 12 bits");
        Pid(raw & PID_MASK as u16)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn is_label(self) -> bool {
        self.0 == LABEL_PID
    }
}

/// A vertex-property key: `(vid, pid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vpid {
    pub vid: Vid,
    pub pid: Pid,
}

/// An edge-property key: `(eid, pid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epid {
    pub eid: Eid,
    pub pid: Pid,
}

/// A transaction identifier. The top bit is always set, distinguishing it
/// from a [`Timestamp`] in any context where the two are interchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrxId(u64);

const TOP_BIT: u64 = 1 << 63;

impl TrxId {
    pub fn new(raw: u64) -> Self {
        TrxId(raw | TOP_BIT)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trx#{:x}", self.0)
    }
}

/// A commit/begin timestamp. The top bit is always clear; ordered, with `0`
/// the minimum and `2^63 - 1` the maximum per spec.md §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(TOP_BIT - 1);

    pub fn new(raw: u64) -> Self {
        debug_assert!(raw < TOP_BIT, "timestamp top bit must be clear");
        Timestamp(raw & (TOP_BIT - 1))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The kind of graph element a primitive write or index entry concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Vertex,
    OutEdge,
    InEdge,
}
