//! Growable vectors stored as chains of blocks.
//!
//! A vector is a linked list of blocks in the `Vector<T>` table. Every
//! block has the same 28-byte header followed by `capacity` inline
//! elements:
//!
//! ```text
//!  0  element_size   i32
//!  4  count          i32   total elements; maintained on the head only
//!  8  capacity       i32   element slots in this block
//! 12  populated      i32   used slots in this block
//! 16  next           Ref   following block, or null
//! 20  tail           Ref   last block; maintained on the head only
//! 24  self           i32   this block's own offset
//! 28  elements       capacity * element_size bytes
//! ```
//!
//! Blocks are never moved or freed, so a [`Cursor`] to an element stays
//! valid for the life of the context. Pushing into a full tail allocates a
//! block of twice the capacity, capped at what one page can hold.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use smallvec::SmallVec;
use tracing::trace;

use crate::context::ContextData;
use crate::error::ArenaError;
use crate::layout::{write_i32_at, ByteReader, ByteWriter, Plain, Record, RecordLayout};
use crate::ptr::{Cursor, Ref, NULL_OFFSET};
use crate::scope::Scope;
use crate::table::Table;

const ELEMENT_SIZE_AT: i32 = 0;
const COUNT_AT: i32 = 4;
const CAPACITY_AT: i32 = 8;
const POPULATED_AT: i32 = 12;
const NEXT_AT: i32 = 16;
const TAIL_AT: i32 = 20;
const SELF_AT: usize = 24;

/// Header bytes of every vector block.
pub const BLOCK_HEADER: usize = 28;

/// Record type of vector blocks holding `T` elements.
///
/// Never constructed; it names the table and describes the block layout.
pub struct VectorBlock<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Plain> Record for VectorBlock<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Vector<{}>", T::type_name()))
    }

    fn layout() -> RecordLayout {
        RecordLayout::variable(BLOCK_HEADER, T::SIZE, CAPACITY_AT as usize)
            .with_self_offset(Some(SELF_AT))
    }
}

/// Handle to a vector: a reference to its head block.
///
/// Handles are [`Plain`], so records, vectors and maps can hold them.
#[must_use]
pub struct Vector<T> {
    head: Ref<VectorBlock<T>>,
}

impl<T> Clone for Vector<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Vector<T> {}

impl<T> PartialEq for Vector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
    }
}

impl<T> Eq for Vector<T> {}

impl<T: Plain> fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector<{}>({})", T::type_name(), self.head.offset())
    }
}

impl<T: Plain> Plain for Vector<T> {
    const SIZE: usize = 4;

    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("VectorRef<{}>", T::type_name()))
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put(&self.head);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self { head: r.get() }
    }
}

impl<T> Vector<T> {
    /// A handle that refers to no vector.
    pub const fn null() -> Self {
        Self { head: Ref::null() }
    }

    /// Wrap a head-block reference.
    pub const fn from_head(head: Ref<VectorBlock<T>>) -> Self {
        Self { head }
    }

    /// The head-block reference.
    pub fn head(self) -> Ref<VectorBlock<T>> {
        self.head
    }

    /// Whether this handle refers to no vector.
    pub fn is_null(self) -> bool {
        self.head.is_null()
    }
}

impl<T> Default for Vector<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Plain> Vector<T> {
    /// Create an empty vector in the current scope's context.
    pub fn new(min_capacity: usize) -> Result<Self, ArenaError> {
        Scope::with_current_mut(|data| data.new_vector(min_capacity))
    }

    /// Append `value`, returning its index.
    pub fn push(self, value: T) -> Result<usize, ArenaError> {
        Scope::with_current_mut(|data| data.vector_mut(self)?.push(value))
    }

    /// The element at `index`.
    pub fn get(self, index: usize) -> Result<T, ArenaError> {
        Scope::with_current(|data| data.vector(self)?.get(index))
    }

    /// Overwrite the element at `index`.
    pub fn set(self, index: usize, value: T) -> Result<(), ArenaError> {
        Scope::with_current_mut(|data| data.vector_mut(self)?.set(index, value))
    }

    /// Number of elements.
    pub fn len(self) -> Result<usize, ArenaError> {
        Scope::with_current(|data| Ok(data.vector(self)?.len()))
    }

    /// Whether the vector has no elements.
    pub fn is_empty(self) -> Result<bool, ArenaError> {
        Ok(self.len()? == 0)
    }

    /// All elements in index order.
    pub fn to_vec(self) -> Result<Vec<T>, ArenaError> {
        Scope::with_current(|data| data.vector(self)?.to_vec())
    }

    /// A stable cursor to the element at `index`.
    pub fn cursor(self, index: usize) -> Result<Cursor<T>, ArenaError> {
        Scope::with_current(|data| data.vector(self)?.cursor(index))
    }
}

fn field(block: i32, at: i32) -> i32 {
    block + at
}

fn count_of(table: &Table, block: i32, at: i32) -> Result<usize, ArenaError> {
    let v = table.read_i32(field(block, at))?;
    usize::try_from(v).map_err(|_| {
        ArenaError::corrupt(format!("vector block at {block} has a negative field: {v}"))
    })
}

fn element_pos(block: i32, slot: usize, element: usize) -> Result<i32, ArenaError> {
    let pos = block as i64 + BLOCK_HEADER as i64 + (slot as i64) * (element as i64);
    i32::try_from(pos).map_err(|_| ArenaError::corrupt(format!("element offset {pos} exceeds i32")))
}

fn to_i32(v: usize) -> Result<i32, ArenaError> {
    i32::try_from(v).map_err(|_| ArenaError::corrupt(format!("value {v} exceeds i32")))
}

/// Largest block capacity one page of `table` can hold.
fn max_capacity(table: &Table, element: usize) -> usize {
    table.page_bytes().saturating_sub(BLOCK_HEADER) / element
}

fn allocate_block(table: &mut Table, element: usize, capacity: usize) -> Result<i32, ArenaError> {
    let element_i32 = to_i32(element)?;
    let capacity_i32 = to_i32(capacity)?;
    let size = BLOCK_HEADER + capacity * element;
    table.allocate_with(size, |b| {
        write_i32_at(b, ELEMENT_SIZE_AT as usize, element_i32);
        write_i32_at(b, COUNT_AT as usize, 0);
        write_i32_at(b, CAPACITY_AT as usize, capacity_i32);
        write_i32_at(b, POPULATED_AT as usize, 0);
        write_i32_at(b, NEXT_AT as usize, NULL_OFFSET);
        write_i32_at(b, TAIL_AT as usize, NULL_OFFSET);
    })
}

/// The block after `block`, counting it in `visited`.
///
/// A chain can never hold more blocks than the table has records, so a
/// walk that exceeds that has met a cycle.
fn next_block(table: &Table, block: i32, visited: &mut usize) -> Result<i32, ArenaError> {
    *visited += 1;
    if *visited > table.record_count() {
        return Err(ArenaError::corrupt(format!(
            "vector block chain loops back through block {block}"
        )));
    }
    table.read_i32(field(block, NEXT_AT))
}

/// Walk the chain to the slot holding `index`.
fn locate(table: &Table, head: i32, index: usize, element: usize) -> Result<i32, ArenaError> {
    let mut block = head;
    let mut remaining = index;
    let mut visited = 0;
    loop {
        let populated = count_of(table, block, POPULATED_AT)?;
        if remaining < populated {
            return element_pos(block, remaining, element);
        }
        remaining -= populated;
        block = next_block(table, block, &mut visited)?;
        if block < 0 {
            return Err(ArenaError::corrupt(format!(
                "vector at {head} ends before its recorded count"
            )));
        }
    }
}

impl ContextData {
    /// Create an empty vector whose first block holds at least `min_capacity`
    /// elements (and at least one).
    pub fn new_vector<T: Plain>(&mut self, min_capacity: usize) -> Result<Vector<T>, ArenaError> {
        let table = self.table_mut::<VectorBlock<T>>()?;
        let capacity = min_capacity.max(1);
        if capacity > max_capacity(table, T::SIZE) {
            return Err(ArenaError::CapacityExceeded {
                type_name: table.type_name().to_string(),
                requested: BLOCK_HEADER + capacity * T::SIZE,
                page_bytes: table.page_bytes(),
            });
        }
        let head = allocate_block(table, T::SIZE, capacity)?;
        table.write_i32(field(head, TAIL_AT), head)?;
        Ok(Vector::from_head(Ref::from_offset(head)))
    }

    /// Read access to a vector.
    pub fn vector<T: Plain>(&self, vector: Vector<T>) -> Result<VectorView<'_, T>, ArenaError> {
        VectorView::open(self.table::<VectorBlock<T>>()?, vector.head.offset())
    }

    /// Write access to a vector.
    pub fn vector_mut<T: Plain>(
        &mut self,
        vector: Vector<T>,
    ) -> Result<VectorViewMut<'_, T>, ArenaError> {
        let table = self.table_mut::<VectorBlock<T>>()?;
        VectorView::<T>::open(table, vector.head.offset())?;
        Ok(VectorViewMut {
            table,
            head: vector.head.offset(),
            _marker: PhantomData,
        })
    }
}

/// Read access to one vector.
pub struct VectorView<'a, T> {
    table: &'a Table,
    head: i32,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Plain> VectorView<'a, T> {
    fn open(table: &'a Table, head: i32) -> Result<Self, ArenaError> {
        table.check_record_start(head)?;
        let element = table.read_i32(field(head, ELEMENT_SIZE_AT))?;
        if usize::try_from(element).ok() != Some(T::SIZE) {
            return Err(ArenaError::corrupt(format!(
                "vector at {head} stores {element}-byte elements, expected {}",
                T::SIZE
            )));
        }
        let len = count_of(table, head, COUNT_AT)?;
        Ok(Self {
            table,
            head,
            len,
            _marker: PhantomData,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_index(&self, index: usize) -> Result<(), ArenaError> {
        if index >= self.len {
            return Err(ArenaError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Result<T, ArenaError> {
        self.check_index(index)?;
        let pos = locate(self.table, self.head, index, T::SIZE)?;
        self.table.read(pos)
    }

    /// A cursor to the element at `index`, stable for the life of the context.
    pub fn cursor(&self, index: usize) -> Result<Cursor<T>, ArenaError> {
        self.check_index(index)?;
        let pos = locate(self.table, self.head, index, T::SIZE)?;
        Ok(Cursor::new::<VectorBlock<T>>(pos))
    }

    /// First element, if any.
    pub fn first(&self) -> Result<Option<T>, ArenaError> {
        if self.is_empty() {
            return Ok(None);
        }
        self.get(0).map(Some)
    }

    /// Last element, if any.
    pub fn last(&self) -> Result<Option<T>, ArenaError> {
        let Some(index) = self.len.checked_sub(1) else {
            return Ok(None);
        };
        let tail = self.table.read_i32(field(self.head, TAIL_AT))?;
        let populated = count_of(self.table, tail, POPULATED_AT)?;
        let slot = populated.checked_sub(1).ok_or_else(|| {
            ArenaError::corrupt(format!(
                "vector at {} holds {} elements but its tail block is empty",
                self.head,
                index + 1
            ))
        })?;
        self.table.read(element_pos(tail, slot, T::SIZE)?).map(Some)
    }

    /// Iterate elements in index order.
    pub fn iter(&self) -> VectorIter<'a, T> {
        VectorIter {
            table: self.table,
            next_block: self.head,
            block: NULL_OFFSET,
            slot: 0,
            populated: 0,
            remaining: self.len,
            visited: 0,
            _marker: PhantomData,
        }
    }

    /// All elements in index order.
    pub fn to_vec(&self) -> Result<Vec<T>, ArenaError> {
        self.iter().collect()
    }

    /// Index of the first element matching `pred`.
    pub fn position(&self, mut pred: impl FnMut(&T) -> bool) -> Result<Option<usize>, ArenaError> {
        for (i, item) in self.iter().enumerate() {
            if pred(&item?) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Whether any element equals `value`.
    pub fn contains(&self, value: &T) -> Result<bool, ArenaError>
    where
        T: PartialEq,
    {
        Ok(self.position(|item| item == value)?.is_some())
    }

    /// Capacity of each block in chain order.
    pub fn block_capacities(&self) -> Result<SmallVec<[usize; 8]>, ArenaError> {
        let mut out = SmallVec::new();
        let mut block = self.head;
        let mut visited = 0;
        while block >= 0 {
            out.push(count_of(self.table, block, CAPACITY_AT)?);
            block = next_block(self.table, block, &mut visited)?;
        }
        Ok(out)
    }
}

/// Iterator over a vector's elements.
pub struct VectorIter<'a, T> {
    table: &'a Table,
    next_block: i32,
    block: i32,
    slot: usize,
    populated: usize,
    remaining: usize,
    visited: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Plain> VectorIter<'_, T> {
    fn advance(&mut self) -> Result<T, ArenaError> {
        while self.slot == self.populated {
            if self.next_block < 0 {
                return Err(ArenaError::corrupt(format!(
                    "vector block chain ends with {} elements unread",
                    self.remaining
                )));
            }
            self.block = self.next_block;
            self.populated = count_of(self.table, self.block, POPULATED_AT)?;
            self.next_block = next_block(self.table, self.block, &mut self.visited)?;
            self.slot = 0;
        }
        let value = self.table.read(element_pos(self.block, self.slot, T::SIZE)?)?;
        self.slot += 1;
        Ok(value)
    }
}

impl<T: Plain> Iterator for VectorIter<'_, T> {
    type Item = Result<T, ArenaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.advance();
        // Stop after a structural error instead of repeating it.
        self.remaining = if item.is_ok() { self.remaining - 1 } else { 0 };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Write access to one vector.
pub struct VectorViewMut<'a, T> {
    table: &'a mut Table,
    head: i32,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Plain> VectorViewMut<'_, T> {
    /// Read access through this view.
    pub fn view(&self) -> Result<VectorView<'_, T>, ArenaError> {
        VectorView::open(self.table, self.head)
    }

    /// Number of elements.
    pub fn len(&self) -> Result<usize, ArenaError> {
        count_of(self.table, self.head, COUNT_AT)
    }

    /// Whether the vector has no elements.
    pub fn is_empty(&self) -> Result<bool, ArenaError> {
        Ok(self.len()? == 0)
    }

    /// Append `value`, returning its index.
    ///
    /// Fails with [`ArenaError::ReadOnlyTable`] whenever the table was
    /// loaded from a stream, even if the tail block has free slots.
    pub fn push(&mut self, value: T) -> Result<usize, ArenaError> {
        if self.table.is_read_only() {
            return Err(ArenaError::ReadOnlyTable {
                type_name: self.table.type_name().to_string(),
            });
        }
        let head = self.head;
        let count = count_of(self.table, head, COUNT_AT)?;
        let new_count = to_i32(count + 1).map_err(|_| ArenaError::CapacityExceeded {
            type_name: self.table.type_name().to_string(),
            requested: count + 1,
            page_bytes: self.table.page_bytes(),
        })?;

        let mut tail = self.table.read_i32(field(head, TAIL_AT))?;
        let capacity = count_of(self.table, tail, CAPACITY_AT)?;
        let mut populated = count_of(self.table, tail, POPULATED_AT)?;
        if populated == capacity {
            let grown = capacity
                .saturating_mul(2)
                .min(max_capacity(self.table, T::SIZE));
            let block = allocate_block(self.table, T::SIZE, grown.max(1))?;
            self.table.write_i32(field(tail, NEXT_AT), block)?;
            self.table.write_i32(field(head, TAIL_AT), block)?;
            trace!(head, block, capacity = grown, "vector grew by one block");
            tail = block;
            populated = 0;
        }

        self.table.write(element_pos(tail, populated, T::SIZE)?, &value)?;
        self.table
            .write_i32(field(tail, POPULATED_AT), to_i32(populated + 1)?)?;
        self.table.write_i32(field(head, COUNT_AT), new_count)?;
        Ok(count)
    }

    /// Append every value in order.
    pub fn extend(&mut self, values: impl IntoIterator<Item = T>) -> Result<(), ArenaError> {
        for v in values {
            self.push(v)?;
        }
        Ok(())
    }

    /// Overwrite the element at `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), ArenaError> {
        let len = self.len()?;
        if index >= len {
            return Err(ArenaError::IndexOutOfRange { index, len });
        }
        let pos = locate(self.table, self.head, index, T::SIZE)?;
        self.table.write(pos, &value)
    }
}
