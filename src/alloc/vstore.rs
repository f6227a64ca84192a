//! C2 — Value Store.
//!
//! Variable-length value blobs laid out over the same free-list mechanism as
//! [`crate::alloc::cell::CellAllocator`], but over byte-cells of a
//! configurable size (divisible by 8). A [`ValueHeader`] is `(head_offset,
//! byte_count)`; `byte_count == 0` marks a tombstoned property. The first
//! cell holds a one-byte type tag followed by payload bytes; remaining
//! cells hold raw payload bytes. Reads reassemble by cell-walking.

use parking_lot::RwLock;

use crate::alloc::cell::{CellAllocator, NONE};

/// Address of a value blob: where it starts and how many payload bytes
/// (excluding the type tag) it holds. `byte_count == 0` is a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueHeader {
    pub head_offset: u32,
    pub byte_count: u32,
}

impl ValueHeader {
    pub const TOMBSTONE: ValueHeader = ValueHeader {
        head_offset: NONE,
        byte_count: 0,
    };

    pub fn is_tombstone(&self) -> bool {
        self.byte_count == 0
    }
}

pub struct ValueStore {
    cell_size: usize,
    alloc: CellAllocator,
    cells: Vec<RwLock<Vec<u8>>>,
}

impl ValueStore {
    pub fn new(cell_size: usize, total_cells: usize, thread_count: usize, block_size: usize) -> Self {
        assert!(cell_size % 8 == 0, "value cell size must be divisible by 8");
        let cells = (0..total_cells)
            .map(|_| RwLock::new(vec![0u8; cell_size]))
            .collect();
        ValueStore {
            cell_size,
            alloc: CellAllocator::new(total_cells, thread_count, block_size),
            cells,
        }
    }

    fn cells_needed(&self, payload_len: usize) -> usize {
        let total = payload_len + 1; // 1-byte type tag prefix
        (total + self.cell_size - 1) / self.cell_size
    }

    /// Writes `tag` + `payload` across a freshly allocated cell run.
    pub fn insert(&self, tag: u8, payload: &[u8], tid: usize) -> ValueHeader {
        if payload.is_empty() && tag == 0 {
            return ValueHeader::TOMBSTONE;
        }
        let count = self.cells_needed(payload.len());
        let head = self.alloc.get(count, tid);

        let mut remaining: Vec<u8> = Vec::with_capacity(payload.len() + 1);
        remaining.push(tag);
        remaining.extend_from_slice(payload);

        let mut cursor = head;
        loop {
            let take = remaining.len().min(self.cell_size);
            let (chunk, rest) = remaining.split_at(take);
            let mut cell = self.cells[cursor as usize].write();
            cell[..take].copy_from_slice(chunk);
            for b in cell[take..].iter_mut() {
                *b = 0;
            }
            drop(cell);
            remaining = rest.to_vec();
            if remaining.is_empty() {
                break;
            }
            cursor = self
                .alloc
                .next(cursor)
                .expect("value store run shorter than required");
        }

        ValueHeader {
            head_offset: head,
            byte_count: payload.len() as u32,
        }
    }

    /// Reassembles `(tag, payload)` for a header produced by [`insert`].
    pub fn read(&self, header: ValueHeader) -> (u8, Vec<u8>) {
        if header.is_tombstone() {
            return (0, Vec::new());
        }
        let total_len = header.byte_count as usize + 1;
        let mut out = Vec::with_capacity(total_len);
        let mut cursor = Some(header.head_offset);
        while let Some(offset) = cursor {
            let cell = self.cells[offset as usize].read();
            let want = total_len - out.len();
            let take = want.min(self.cell_size);
            out.extend_from_slice(&cell[..take]);
            drop(cell);
            if out.len() >= total_len {
                break;
            }
            cursor = self.alloc.next(offset);
        }
        let tag = out[0];
        (tag, out[1..].to_vec())
    }

    /// Frees every cell of the chain addressed by `header`.
    pub fn free(&self, header: ValueHeader, tid: usize) {
        if header.is_tombstone() {
            return;
        }
        let count = self.cells_needed(header.byte_count as usize);
        self.alloc.free(header.head_offset, count, tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_read_roundtrip_short_value() {
        let store = ValueStore::new(8, 256, 2, 16);
        let header = store.insert(1, b"hi", 0);
        let (tag, payload) = store.read(header);
        assert_eq!(tag, 1);
        assert_eq!(payload, b"hi");
    }

    #[test]
    fn insert_read_roundtrip_spans_many_cells() {
        let store = ValueStore::new(8, 256, 2, 16);
        let payload = b"this value is longer than a single byte cell for sure";
        let header = store.insert(2, payload, 0);
        let (tag, out) = store.read(header);
        assert_eq!(tag, 2);
        assert_eq!(out, payload);
        store.free(header, 0);
    }

    #[test]
    fn tombstone_has_zero_byte_count() {
        let store = ValueStore::new(8, 64, 1, 8);
        let header = ValueHeader::TOMBSTONE;
        assert!(header.is_tombstone());
        let (_tag, payload) = store.read(header);
        assert!(payload.is_empty());
    }
}
