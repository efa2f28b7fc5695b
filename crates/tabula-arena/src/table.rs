//! Per-type record tables.
//!
//! A [`Table`] owns every record of one type. Records are bump-allocated
//! into fixed-size pages and addressed by a logical byte offset: the
//! position in the concatenation of all pages,
//! `page_index * page_bytes + in_page_offset`. The table also keeps the
//! ordered list of record-start offsets, which is what maps a record index
//! to its offset and what lets a [`Ref`] be checked on resolution.
//!
//! A table read from a stream holds all of its bytes in a single page of
//! exactly the stored length. Because unused page tails are written as
//! zeros, every offset addresses the same record after loading. Loaded
//! tables are read-only: allocation fails, field writes do not.

use std::io::{Read, Write};

use tracing::{trace, warn};

use crate::codec::{read_exact_vec, read_i32_le, read_len_i32, write_i32_le, write_len_i32};
use crate::config::TableConfig;
use crate::error::ArenaError;
use crate::hash::Fnv1a;
use crate::layout::{decode_plain, encode_plain, write_i32_at, Plain, TypeLayout};
use crate::page::Page;
use crate::ptr::Ref;

/// Upper bound on record offsets reserved before any has been read.
const OFFSET_PREALLOC: usize = 4096;

/// All records of one type, packed into byte pages.
#[derive(Debug)]
pub struct Table {
    descriptor: TypeLayout,
    pages: Vec<Page>,
    page_bytes: usize,
    offsets: Vec<i32>,
    read_only: bool,
}

impl Table {
    /// Create an empty, writable table with one pre-allocated page.
    pub fn new(descriptor: TypeLayout, config: TableConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let page_bytes = config.page_bytes(descriptor.layout.nominal_size());
        if page_bytes > i32::MAX as usize {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "page of {page_bytes} bytes for '{}' exceeds the i32 offset range",
                    descriptor.type_name
                ),
            });
        }
        Ok(Self {
            descriptor,
            pages: vec![Page::new(page_bytes)],
            page_bytes,
            offsets: Vec::new(),
            read_only: false,
        })
    }

    /// The cached layout descriptor of this table's record type.
    pub fn descriptor(&self) -> &TypeLayout {
        &self.descriptor
    }

    /// Container-format identifier of this table's record type.
    pub fn type_name(&self) -> &str {
        &self.descriptor.type_name
    }

    /// Size of each page in bytes.
    pub fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Whether this table was loaded from a stream.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of pages currently backing the table.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of records allocated.
    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    /// Record-start offsets in allocation order.
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    /// Offset of the `index`-th record.
    pub fn offset_of(&self, index: usize) -> Result<i32, ArenaError> {
        self.offsets
            .get(index)
            .copied()
            .ok_or(ArenaError::IndexOutOfRange {
                index,
                len: self.offsets.len(),
            })
    }

    /// Logical bytes allocated: everything up to the last used byte.
    pub fn allocated_bytes(&self) -> usize {
        match self.pages.last() {
            Some(last) => (self.pages.len() - 1) * self.page_bytes + last.used(),
            None => 0,
        }
    }

    /// Memory held by the backing pages in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.pages.iter().map(Page::capacity).sum()
    }

    /// Largest single allocation the table accepts.
    pub fn max_record_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Reserve `len` zeroed bytes and return their offset.
    ///
    /// Used directly when a collection computes a block size before any
    /// value exists; `len` must cover at least the type's header.
    pub fn allocate_bytes(&mut self, len: usize) -> Result<i32, ArenaError> {
        self.allocate_with(len, |_| {})
    }

    /// Reserve `len` bytes, let `init` fill them, then patch the
    /// self-offset field if the layout declares one.
    ///
    /// The patch runs after `init`, so the initial contents cannot
    /// overwrite the record's own offset.
    pub fn allocate_with(
        &mut self,
        len: usize,
        init: impl FnOnce(&mut [u8]),
    ) -> Result<i32, ArenaError> {
        if self.read_only {
            return Err(ArenaError::ReadOnlyTable {
                type_name: self.descriptor.type_name.clone(),
            });
        }
        let header = self.descriptor.layout.header_size();
        if len < header {
            return Err(ArenaError::InvalidLayout {
                type_name: self.descriptor.type_name.clone(),
                reason: format!("allocation of {len} bytes is smaller than the {header}-byte header"),
            });
        }
        if len > self.page_bytes {
            return Err(ArenaError::CapacityExceeded {
                type_name: self.descriptor.type_name.clone(),
                requested: len,
                page_bytes: self.page_bytes,
            });
        }

        let (page_index, local) = self.reserve(len)?;
        let offset = page_index * self.page_bytes + local;
        let offset = i32::try_from(offset).map_err(|_| ArenaError::CapacityExceeded {
            type_name: self.descriptor.type_name.clone(),
            requested: len,
            page_bytes: self.page_bytes,
        })?;

        let self_offset = self.descriptor.layout.self_offset;
        let bytes = self.pages[page_index]
            .bytes_mut(local, len)
            .ok_or_else(|| ArenaError::OutOfRange {
                type_name: self.descriptor.type_name.clone(),
                offset: offset as i64,
                len,
                allocated: 0,
            })?;
        init(bytes);
        if let Some(pos) = self_offset {
            write_i32_at(bytes, pos, offset);
        }
        self.offsets.push(offset);
        Ok(offset)
    }

    fn reserve(&mut self, len: usize) -> Result<(usize, usize), ArenaError> {
        let current = self.pages.len() - 1;
        if let Some(local) = self.pages[current].alloc(len) {
            return Ok((current, local));
        }
        if (self.pages.len() + 1) * self.page_bytes > i32::MAX as usize + 1 {
            return Err(ArenaError::CapacityExceeded {
                type_name: self.descriptor.type_name.clone(),
                requested: len,
                page_bytes: self.page_bytes,
            });
        }
        let mut page = Page::new(self.page_bytes);
        let local = page.alloc(len).ok_or_else(|| ArenaError::CapacityExceeded {
            type_name: self.descriptor.type_name.clone(),
            requested: len,
            page_bytes: self.page_bytes,
        })?;
        self.pages.push(page);
        trace!(
            table = %self.descriptor.type_name,
            pages = self.pages.len(),
            "table grew by one page"
        );
        Ok((self.pages.len() - 1, local))
    }

    /// Allocate a fixed-size record holding `value`.
    pub fn allocate<T: Plain>(&mut self, value: &T) -> Result<Ref<T>, ArenaError> {
        let mut encoded = vec![0u8; T::SIZE];
        encode_plain(value, &mut encoded)?;
        let offset = self.allocate_with(T::SIZE, |bytes| bytes.copy_from_slice(&encoded))?;
        Ok(Ref::from_offset(offset))
    }

    fn locate(&self, offset: i32, len: usize) -> Result<(usize, usize), ArenaError> {
        let out_of_range = || ArenaError::OutOfRange {
            type_name: self.descriptor.type_name.clone(),
            offset: offset as i64,
            len,
            allocated: self.allocated_bytes(),
        };
        let offset = usize::try_from(offset).map_err(|_| out_of_range())?;
        if self.page_bytes == 0 {
            return Err(out_of_range());
        }
        let page_index = offset / self.page_bytes;
        let local = offset % self.page_bytes;
        match self.pages.get(page_index) {
            Some(page) if page.bytes(local, len).is_some() => Ok((page_index, local)),
            _ => Err(out_of_range()),
        }
    }

    /// Shared view of an allocated byte range.
    pub fn bytes(&self, offset: i32, len: usize) -> Result<&[u8], ArenaError> {
        let (page, local) = self.locate(offset, len)?;
        self.pages[page]
            .bytes(local, len)
            .ok_or_else(|| ArenaError::corrupt("page range vanished"))
    }

    /// Mutable view of an allocated byte range.
    pub fn bytes_mut(&mut self, offset: i32, len: usize) -> Result<&mut [u8], ArenaError> {
        let (page, local) = self.locate(offset, len)?;
        self.pages[page]
            .bytes_mut(local, len)
            .ok_or_else(|| ArenaError::corrupt("page range vanished"))
    }

    /// Decode a `V` stored at `offset`.
    pub fn read<V: Plain>(&self, offset: i32) -> Result<V, ArenaError> {
        decode_plain(self.bytes(offset, V::SIZE)?)
    }

    /// Encode `value` at `offset`, over bytes that are already allocated.
    pub fn write<V: Plain>(&mut self, offset: i32, value: &V) -> Result<(), ArenaError> {
        encode_plain(value, self.bytes_mut(offset, V::SIZE)?)
    }

    /// Read an `i32` field at `offset`.
    pub(crate) fn read_i32(&self, offset: i32) -> Result<i32, ArenaError> {
        self.read::<i32>(offset)
    }

    /// Write an `i32` field at `offset`.
    pub(crate) fn write_i32(&mut self, offset: i32, value: i32) -> Result<(), ArenaError> {
        self.write::<i32>(offset, &value)
    }

    /// Check that `offset` is the start of a record in this table.
    pub fn check_record_start(&self, offset: i32) -> Result<(), ArenaError> {
        if offset < 0 {
            return Err(ArenaError::NullRef {
                type_name: self.descriptor.type_name.clone(),
            });
        }
        self.offsets
            .binary_search(&offset)
            .map(|_| ())
            .map_err(|_| ArenaError::InvalidRef {
                type_name: self.descriptor.type_name.clone(),
                offset,
            })
    }

    /// Stored length of the record starting at `offset`.
    pub fn record_len(&self, offset: i32) -> Result<usize, ArenaError> {
        let layout = self.descriptor.layout;
        let header = self.bytes(offset, layout.header_size())?;
        layout.stored_len(header).ok_or_else(|| {
            ArenaError::corrupt(format!(
                "record at {offset} in '{}' has a negative element count",
                self.descriptor.type_name
            ))
        })
    }

    /// All bytes of the record starting at `offset`.
    pub fn record_bytes(&self, offset: i32) -> Result<&[u8], ArenaError> {
        self.check_record_start(offset)?;
        let len = self.record_len(offset)?;
        self.bytes(offset, len)
    }

    /// Checksum over the table's logical bytes, exactly as they are written.
    pub fn checksum(&self) -> u64 {
        let mut h = Fnv1a::new();
        self.for_each_written_chunk(|chunk| h.update(chunk));
        h.finish()
    }

    /// Recompute the checksum and compare it with `expected`.
    ///
    /// A mismatch is logged, not raised: the checksum is a diagnostic.
    pub fn verify_checksum(&self, expected: u64) -> bool {
        let actual = self.checksum();
        if actual != expected {
            warn!(
                table = %self.descriptor.type_name,
                expected = format_args!("{expected:#018x}"),
                actual = format_args!("{actual:#018x}"),
                "table checksum mismatch"
            );
            return false;
        }
        true
    }

    fn for_each_written_chunk(&self, mut f: impl FnMut(&[u8])) {
        let last = self.pages.len().saturating_sub(1);
        for (i, page) in self.pages.iter().enumerate() {
            if i == last {
                f(page.used_bytes());
            } else {
                f(page.raw());
            }
        }
    }

    /// Serialize the table sub-format.
    pub fn write_to(&self, w: &mut dyn Write) -> Result<(), ArenaError> {
        write_len_i32(w, self.allocated_bytes(), "total_allocated_bytes")?;
        write_len_i32(w, self.descriptor.layout.nominal_size(), "record size")?;
        write_len_i32(w, self.offsets.len(), "record_count")?;
        for &offset in &self.offsets {
            write_i32_le(w, offset)?;
        }
        let mut result = Ok(());
        self.for_each_written_chunk(|chunk| {
            if result.is_ok() {
                result = w.write_all(chunk);
            }
        });
        result?;
        Ok(())
    }

    /// Rebuild a table from its sub-format as one read-only page.
    pub fn read_from(r: &mut dyn Read, descriptor: TypeLayout) -> Result<Self, ArenaError> {
        let name = descriptor.type_name.clone();
        let total = read_len_i32(r, "total_allocated_bytes")?;
        let stored_size = read_i32_le(r, "record size")?;
        let expected = descriptor.layout.nominal_size();
        if stored_size < 0 {
            return Err(ArenaError::corrupt(format!(
                "negative record size {stored_size} for '{name}'"
            )));
        }
        if stored_size as usize != expected {
            return Err(ArenaError::LayoutMismatch {
                type_name: name,
                stored: stored_size,
                expected,
            });
        }
        let count = read_len_i32(r, "record_count")?;
        // Every record occupies at least its header.
        let header = descriptor.layout.header_size().max(1);
        if count > total / header {
            return Err(ArenaError::corrupt(format!(
                "'{name}' declares {count} records in {total} bytes"
            )));
        }

        // Counts come from the stream; grow as offsets actually arrive.
        let mut offsets = Vec::with_capacity(count.min(OFFSET_PREALLOC));
        for _ in 0..count {
            let offset = read_i32_le(r, "record_offsets")?;
            let valid = offset >= 0
                && (offset as usize) < total
                && offsets.last().is_none_or(|&prev| offset > prev);
            if !valid {
                return Err(ArenaError::corrupt(format!(
                    "record offset {offset} in '{name}' is out of order or beyond {total} bytes"
                )));
            }
            offsets.push(offset);
        }

        let raw = read_exact_vec(r, total, "raw_bytes")?;
        let table = Self {
            descriptor,
            pages: vec![Page::from_bytes(raw)],
            page_bytes: total,
            offsets,
            read_only: true,
        };
        table.validate_records()?;
        Ok(table)
    }

    fn validate_records(&self) -> Result<(), ArenaError> {
        for &offset in &self.offsets {
            let len = self.record_len(offset).map_err(|_| {
                ArenaError::corrupt(format!(
                    "record at {offset} in '{}' has an unreadable header",
                    self.descriptor.type_name
                ))
            })?;
            if self.bytes(offset, len).is_err() {
                return Err(ArenaError::corrupt(format!(
                    "record at {offset} in '{}' claims {len} bytes past the end of the table",
                    self.descriptor.type_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{RecordLayout, SizeClass};
    use std::any::TypeId;

    fn fixed(size: usize) -> TypeLayout {
        TypeLayout {
            type_id: TypeId::of::<u64>(),
            type_name: "Fixed".into(),
            layout: RecordLayout::fixed(size),
        }
    }

    #[test]
    fn records_are_packed_within_a_page() {
        let mut table = Table::new(fixed(8), TableConfig::new(4)).unwrap();
        for i in 0..4u64 {
            let r = table.allocate(&i).unwrap();
            assert_eq!(r.offset(), i as i32 * 8);
        }
        assert_eq!(table.page_count(), 1);
        assert_eq!(table.allocated_bytes(), 32);
    }

    #[test]
    fn grows_by_whole_pages() {
        let mut table = Table::new(fixed(8), TableConfig::new(3)).unwrap();
        for i in 0..7u64 {
            table.allocate(&i).unwrap();
        }
        assert_eq!(table.page_count(), 3);
        assert_eq!(table.record_count(), 7);
        assert_eq!(table.offsets(), &[0, 8, 16, 24, 32, 40, 48]);
        assert_eq!(table.read::<u64>(40).unwrap(), 5);
    }

    #[test]
    fn record_never_spans_pages() {
        let layout = TypeLayout {
            type_id: TypeId::of::<u8>(),
            type_name: "Var".into(),
            layout: RecordLayout::variable(4, 1, 0),
        };
        let mut table = Table::new(layout, TableConfig::new(4)).unwrap();
        // page = 4 * 5 = 20 bytes
        assert_eq!(table.allocate_bytes(12).unwrap(), 0);
        // 8 bytes left in page 0; 10 does not fit and starts page 1
        assert_eq!(table.allocate_bytes(10).unwrap(), 20);
        assert_eq!(table.allocated_bytes(), 30);
        // the tail gap of page 0 is not addressable
        assert!(table.bytes(12, 4).is_err());
    }

    #[test]
    fn oversize_allocation_fails() {
        let mut table = Table::new(fixed(8), TableConfig::new(2)).unwrap();
        let err = table.allocate_bytes(17).unwrap_err();
        assert!(matches!(err, ArenaError::CapacityExceeded { .. }));
    }

    #[test]
    fn reads_past_allocation_fail() {
        let mut table = Table::new(fixed(8), TableConfig::new(4)).unwrap();
        table.allocate(&1u64).unwrap();
        assert!(matches!(
            table.read::<u64>(8),
            Err(ArenaError::OutOfRange { .. })
        ));
        assert!(table.read::<u64>(-8).is_err());
    }

    #[test]
    fn self_offset_patched_after_init() {
        let layout = TypeLayout {
            type_id: TypeId::of::<u8>(),
            type_name: "Linked".into(),
            layout: RecordLayout::fixed(8).with_self_offset(Some(4)),
        };
        let mut table = Table::new(layout, TableConfig::new(4)).unwrap();
        table.allocate_bytes(8).unwrap();
        let off = table
            .allocate_with(8, |bytes| bytes.copy_from_slice(&[9; 8]))
            .unwrap();
        assert_eq!(off, 8);
        assert_eq!(table.read_i32(off).unwrap(), i32::from_le_bytes([9; 4]));
        assert_eq!(table.read_i32(off + 4).unwrap(), 8);
    }

    #[test]
    fn ref_check_requires_record_start() {
        let mut table = Table::new(fixed(8), TableConfig::new(4)).unwrap();
        table.allocate(&1u64).unwrap();
        table.allocate(&2u64).unwrap();
        assert!(table.check_record_start(8).is_ok());
        assert!(matches!(
            table.check_record_start(4),
            Err(ArenaError::InvalidRef { .. })
        ));
        assert!(matches!(
            table.check_record_start(-1),
            Err(ArenaError::NullRef { .. })
        ));
    }

    #[test]
    fn round_trip_is_one_read_only_page() {
        let mut table = Table::new(fixed(8), TableConfig::new(2)).unwrap();
        for i in 0..5u64 {
            table.allocate(&(i * 100)).unwrap();
        }
        let checksum = table.checksum();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();

        let loaded = Table::read_from(&mut buf.as_slice(), fixed(8)).unwrap();
        assert!(loaded.is_read_only());
        assert_eq!(loaded.page_count(), 1);
        assert_eq!(loaded.offsets(), table.offsets());
        assert_eq!(loaded.read::<u64>(32).unwrap(), 400);
        assert!(loaded.verify_checksum(checksum));
        assert!(!loaded.verify_checksum(checksum ^ 1));
    }

    #[test]
    fn loaded_table_rejects_allocation_but_allows_writes() {
        let mut table = Table::new(fixed(8), TableConfig::new(2)).unwrap();
        table.allocate(&7u64).unwrap();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let mut loaded = Table::read_from(&mut buf.as_slice(), fixed(8)).unwrap();
        assert!(matches!(
            loaded.allocate(&1u64),
            Err(ArenaError::ReadOnlyTable { .. })
        ));
        loaded.write(0, &9u64).unwrap();
        assert_eq!(loaded.read::<u64>(0).unwrap(), 9);
    }

    #[test]
    fn layout_mismatch_detected() {
        let mut table = Table::new(fixed(8), TableConfig::new(2)).unwrap();
        table.allocate(&7u64).unwrap();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let err = Table::read_from(&mut buf.as_slice(), fixed(4)).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::LayoutMismatch {
                stored: 8,
                expected: 4,
                ..
            }
        ));
    }

    #[test]
    fn truncated_table_fails() {
        let mut table = Table::new(fixed(8), TableConfig::new(2)).unwrap();
        table.allocate(&7u64).unwrap();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = Table::read_from(&mut buf.as_slice(), fixed(8)).unwrap_err();
        assert!(matches!(err, ArenaError::Truncated { .. }));
    }

    #[test]
    fn unordered_offsets_are_corrupt() {
        let mut buf = Vec::new();
        for v in [16, 8, 2, 8, 0] {
            write_i32_le(&mut buf, v).unwrap();
        }
        buf.extend_from_slice(&[0; 16]);
        let err = Table::read_from(&mut buf.as_slice(), fixed(8)).unwrap_err();
        assert!(matches!(err, ArenaError::Corrupt { .. }));
    }

    #[test]
    fn huge_declared_count_is_rejected_before_reading_offsets() {
        let mut buf = Vec::new();
        for v in [i32::MAX, 8, i32::MAX] {
            write_i32_le(&mut buf, v).unwrap();
        }
        let err = Table::read_from(&mut buf.as_slice(), fixed(8)).unwrap_err();
        assert!(matches!(err, ArenaError::Corrupt { .. }));
    }

    #[test]
    fn plausible_count_with_missing_offsets_is_truncated() {
        let mut buf = Vec::new();
        for v in [i32::MAX, 8, i32::MAX / 8] {
            write_i32_le(&mut buf, v).unwrap();
        }
        write_i32_le(&mut buf, 0).unwrap();
        let err = Table::read_from(&mut buf.as_slice(), fixed(8)).unwrap_err();
        assert!(matches!(err, ArenaError::Truncated { .. }));
    }

    #[test]
    fn variable_record_len_uses_count_field() {
        let layout = TypeLayout {
            type_id: TypeId::of::<u8>(),
            type_name: "Var".into(),
            layout: RecordLayout::variable(4, 2, 0),
        };
        assert!(matches!(
            layout.layout.class,
            SizeClass::Variable { element: 2, .. }
        ));
        let mut table = Table::new(layout, TableConfig::new(8)).unwrap();
        let off = table
            .allocate_with(10, |b| b[..4].copy_from_slice(&3i32.to_le_bytes()))
            .unwrap();
        assert_eq!(table.record_len(off).unwrap(), 10);
        assert_eq!(table.record_bytes(off).unwrap().len(), 10);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn page_growth_law(capacity in 1u32..16, n in 0usize..100) {
                let mut table = Table::new(fixed(12), TableConfig::new(capacity)).unwrap();
                for i in 0..n {
                    table.allocate_bytes(12).unwrap();
                    prop_assert_eq!(table.record_count(), i + 1);
                }
                let cap = capacity as usize;
                let expected_pages = if n == 0 { 1 } else { n.div_ceil(cap) };
                prop_assert_eq!(table.page_count(), expected_pages);
                for (i, &off) in table.offsets().iter().enumerate() {
                    let page = i / cap;
                    let slot = i % cap;
                    prop_assert_eq!(off as usize, page * cap * 12 + slot * 12);
                }
            }
        }
    }
}
