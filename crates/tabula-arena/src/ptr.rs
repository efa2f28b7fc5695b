//! Typed record references and sub-record cursors.
//!
//! A [`Ref<T>`] is a byte offset into `T`'s table, never a native address,
//! so it survives a write/read cycle unchanged. It carries no context of its
//! own: the ambient accessors resolve it against the current [`Scope`], and
//! the explicit accessors on [`ContextData`] take the context as a parameter.
//!
//! [`Scope`]: crate::scope::Scope
//! [`ContextData`]: crate::context::ContextData

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::ArenaError;
use crate::layout::{ByteReader, ByteWriter, Plain, Record};
use crate::scope::Scope;

/// Offset value used for null references.
pub const NULL_OFFSET: i32 = -1;

/// A typed, arena-relative reference to a record of type `T`.
///
/// Equality and hashing use the offset alone. Any negative offset is null.
#[must_use]
pub struct Ref<T> {
    offset: i32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    /// The null reference.
    pub const fn null() -> Self {
        Self::from_offset(NULL_OFFSET)
    }

    /// Wrap a raw table offset.
    pub const fn from_offset(offset: i32) -> Self {
        Self {
            offset,
            _marker: PhantomData,
        }
    }

    /// The raw table offset.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Whether this is the null reference.
    pub fn is_null(&self) -> bool {
        self.offset < 0
    }

    /// `None` for null, otherwise `Some(self)`.
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.offset.hash(state);
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Record> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ref<{}>(null)", T::type_name())
        } else {
            write!(f, "Ref<{}>({})", T::type_name(), self.offset)
        }
    }
}

impl<T: Record> Plain for Ref<T> {
    const SIZE: usize = 4;

    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Ref<{}>", T::type_name()))
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_i32(self.offset);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self::from_offset(r.get_i32())
    }
}

impl<T: Plain> Ref<T> {
    /// Allocate `value` in the current scope's context.
    pub fn new(value: T) -> Result<Self, ArenaError> {
        Scope::with_current_mut(|data| data.allocate(value))
    }

    /// Read the record through the current scope's context.
    pub fn get(self) -> Result<T, ArenaError> {
        Scope::with_current(|data| data.get(self))
    }

    /// Overwrite the record through the current scope's context.
    pub fn set(self, value: T) -> Result<(), ArenaError> {
        Scope::with_current_mut(|data| data.set(self, value))
    }

    /// Read, modify in place and write back the record.
    ///
    /// The closure runs without the context locked, so it may resolve
    /// other references.
    pub fn update<R>(self, f: impl FnOnce(&mut T) -> R) -> Result<R, ArenaError> {
        let mut value = self.get()?;
        let out = f(&mut value);
        self.set(value)?;
        Ok(out)
    }
}

/// Identifies the table a cursor addresses, with the record type erased.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub(crate) type_id: TypeId,
}

impl TableKey {
    /// The key of `T`'s table.
    pub fn of<T: Record>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
        }
    }
}

/// A byte address inside some table, with the addressed value's type erased.
///
/// Cursors reach sub-fields and trailing-array elements of variable-size
/// records, which a [`Ref`] (always a record start) cannot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawCursor {
    /// The table the address belongs to.
    pub table: TableKey,
    /// Byte offset within that table.
    pub offset: i32,
}

impl RawCursor {
    /// Reinterpret the addressed bytes as a `V`.
    pub fn typed<V: Plain>(self) -> Cursor<V> {
        Cursor {
            raw: self,
            _marker: PhantomData,
        }
    }

    /// A cursor `delta` bytes further on.
    pub fn advance(self, delta: i32) -> Self {
        Self {
            table: self.table,
            offset: self.offset + delta,
        }
    }
}

/// A typed byte address of a `V` stored inside a record of some table.
#[must_use]
pub struct Cursor<V> {
    raw: RawCursor,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Cursor<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Cursor<V> {}

impl<V> PartialEq for Cursor<V> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<V> Eq for Cursor<V> {}

impl<V> fmt::Debug for Cursor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({:?}, {})", self.raw.table, self.raw.offset)
    }
}

impl<V: Plain> Cursor<V> {
    /// Address a `V` at `offset` within `H`'s table.
    pub fn new<H: Record>(offset: i32) -> Self {
        RawCursor {
            table: TableKey::of::<H>(),
            offset,
        }
        .typed()
    }

    /// Drop the value type.
    pub fn erase(self) -> RawCursor {
        self.raw
    }

    /// Byte offset within the addressed table.
    pub fn offset(&self) -> i32 {
        self.raw.offset
    }

    /// Read the addressed value through the current scope's context.
    pub fn get(self) -> Result<V, ArenaError> {
        Scope::with_current(|data| data.read_at(self))
    }

    /// Overwrite the addressed value through the current scope's context.
    pub fn set(self, value: V) -> Result<(), ArenaError> {
        Scope::with_current_mut(|data| data.write_at(self, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{decode_plain, encode_plain};

    #[test]
    fn null_is_negative() {
        let r: Ref<i32> = Ref::null();
        assert!(r.is_null());
        assert!(Ref::<i32>::from_offset(-7).is_null());
        assert!(!Ref::<i32>::from_offset(0).is_null());
        assert_eq!(Ref::<i32>::default(), r);
        assert!(r.non_null().is_none());
    }

    #[test]
    fn equality_is_by_offset() {
        assert_eq!(Ref::<u64>::from_offset(16), Ref::<u64>::from_offset(16));
        assert_ne!(Ref::<u64>::from_offset(16), Ref::<u64>::from_offset(24));
    }

    #[test]
    fn ref_is_four_byte_plain() {
        let mut buf = [0u8; 4];
        encode_plain(&Ref::<f32>::from_offset(260), &mut buf).unwrap();
        assert_eq!(buf, 260i32.to_le_bytes());
        let back: Ref<f32> = decode_plain(&buf).unwrap();
        assert_eq!(back.offset(), 260);
    }

    #[test]
    fn debug_names_target_type() {
        assert_eq!(format!("{:?}", Ref::<i32>::from_offset(8)), "Ref<i32>(8)");
        assert_eq!(format!("{:?}", Ref::<i32>::null()), "Ref<i32>(null)");
    }

    #[test]
    fn cursor_erase_and_retype() {
        let c = Cursor::<i32>::new::<u64>(12);
        let raw = c.erase();
        assert_eq!(raw.table, TableKey::of::<u64>());
        let moved = raw.advance(4).typed::<i32>();
        assert_eq!(moved.offset(), 16);
    }
}
