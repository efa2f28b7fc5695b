//! Fixed-size byte pages with bump allocation.
//!
//! A [`Page`] is one contiguous, zero-initialised `Vec<u8>` with a cursor
//! that advances on each allocation. Tables grow by appending pages of the
//! same size; a record never spans two pages.

/// A single contiguous byte block with bump allocation.
///
/// Pages are never freed or compacted individually. They live until the
/// owning context is dropped.
#[derive(Debug)]
pub struct Page {
    /// Backing storage. Allocated to full capacity at creation.
    data: Vec<u8>,
    /// Bump pointer: next free byte.
    cursor: usize,
}

impl Page {
    /// Create a zeroed page of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            cursor: 0,
        }
    }

    /// Wrap bytes loaded from a stream as a completely used page.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let cursor = data.len();
        Self { data, cursor }
    }

    /// Bump-allocate `len` bytes.
    ///
    /// Returns the in-page offset of the reserved range, or `None` if the
    /// remaining space is too small.
    pub fn alloc(&mut self, len: usize) -> Option<usize> {
        let new_cursor = self.cursor.checked_add(len)?;
        if new_cursor > self.data.len() {
            return None;
        }
        let offset = self.cursor;
        self.cursor = new_cursor;
        Some(offset)
    }

    /// Shared view of an allocated range, or `None` if it is not allocated.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.cursor {
            return None;
        }
        Some(&self.data[offset..end])
    }

    /// Mutable view of an allocated range, or `None` if it is not allocated.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.cursor {
            return None;
        }
        Some(&mut self.data[offset..end])
    }

    /// The whole backing block, including the unused tail.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Bytes up to the bump pointer.
    pub fn used_bytes(&self) -> &[u8] {
        &self.data[..self.cursor]
    }

    /// Number of bytes currently allocated.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Remaining free capacity in bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }
}
