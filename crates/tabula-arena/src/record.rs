//! Variable-size records declared outside the engine.
//!
//! A type whose [`Record::layout`] is a [`RecordLayout::variable`] layout is
//! stored as a fixed header followed by a trailing array of equally sized
//! elements, with the element count in an `i32` header field. Strings use
//! the same path.
//!
//! Trailing elements are reached through cursors checked against the
//! record's own count field, so an index past the populated length is an
//! error rather than a read into the next record.
//!
//! [`RecordLayout::variable`]: crate::layout::RecordLayout::variable

use crate::context::ContextData;
use crate::error::ArenaError;
use crate::layout::{write_i32_at, ByteWriter, Plain, Record, SizeClass};
use crate::ptr::{Cursor, Ref};
use crate::scope::Scope;
use crate::table::Table;

fn no_trailing(table: &Table) -> ArenaError {
    ArenaError::InvalidLayout {
        type_name: table.type_name().to_string(),
        reason: "fixed-size records have no trailing elements".into(),
    }
}

/// Header size and element size of a variable layout.
fn trailing(table: &Table) -> Result<(usize, usize), ArenaError> {
    match table.descriptor().layout.class {
        SizeClass::Variable {
            header, element, ..
        } => Ok((header, element)),
        SizeClass::Fixed { .. } => Err(no_trailing(table)),
    }
}

impl ContextData {
    /// Allocate a `T` record with room for `count` trailing elements.
    ///
    /// `init` writes the record from its first byte: header fields, then
    /// elements. Bytes it does not write stay zero. Afterwards the count
    /// field is set to `count` and the self-offset field, if any, is
    /// patched. An initializer that writes past the record is rejected
    /// before anything is allocated.
    ///
    /// Fixed-size types are accepted with a `count` of zero.
    pub fn allocate_record<T: Record>(
        &mut self,
        count: usize,
        init: impl FnOnce(&mut ByteWriter<'_>),
    ) -> Result<Ref<T>, ArenaError> {
        let table = self.table_mut::<T>()?;
        let (len, count_field) = match table.descriptor().layout.class {
            SizeClass::Fixed { size } => {
                if count > 0 {
                    return Err(no_trailing(table));
                }
                (size, None)
            }
            SizeClass::Variable {
                header,
                element,
                count_at,
            } => {
                let len = count.saturating_mul(element).saturating_add(header);
                let stored = i32::try_from(count).map_err(|_| ArenaError::CapacityExceeded {
                    type_name: table.type_name().to_string(),
                    requested: len,
                    page_bytes: table.page_bytes(),
                })?;
                (len, Some((count_at, stored)))
            }
        };
        if len > table.max_record_bytes() {
            return Err(ArenaError::CapacityExceeded {
                type_name: table.type_name().to_string(),
                requested: len,
                page_bytes: table.page_bytes(),
            });
        }

        let mut encoded = vec![0u8; len];
        let mut w = ByteWriter::new(&mut encoded);
        init(&mut w);
        if w.overflowed() {
            return Err(ArenaError::InvalidLayout {
                type_name: table.type_name().to_string(),
                reason: format!("initializer wrote past the {len}-byte record"),
            });
        }
        if let Some((at, stored)) = count_field {
            write_i32_at(&mut encoded, at, stored);
        }
        let offset = table.allocate_with(len, |bytes| bytes.copy_from_slice(&encoded))?;
        Ok(Ref::from_offset(offset))
    }

    /// All bytes of the record behind `r`, header included.
    pub fn record_bytes<T: Record>(&self, r: Ref<T>) -> Result<&[u8], ArenaError> {
        self.table::<T>()?.record_bytes(r.offset())
    }

    /// Number of trailing elements in the record behind `r`.
    pub fn element_count<T: Record>(&self, r: Ref<T>) -> Result<usize, ArenaError> {
        let table = self.table::<T>()?;
        let (header, element) = trailing(table)?;
        table.check_record_start(r.offset())?;
        Ok((table.record_len(r.offset())? - header) / element)
    }

    /// A cursor to the `index`-th trailing element of the record behind `r`.
    ///
    /// `E` must have the element size the layout declares.
    pub fn element_cursor<T: Record, E: Plain>(
        &self,
        r: Ref<T>,
        index: usize,
    ) -> Result<Cursor<E>, ArenaError> {
        let table = self.table::<T>()?;
        let (header, element) = trailing(table)?;
        if E::SIZE != element {
            return Err(ArenaError::InvalidLayout {
                type_name: table.type_name().to_string(),
                reason: format!(
                    "element type '{}' is {} bytes, the layout declares {element}",
                    <E as Plain>::type_name(),
                    E::SIZE
                ),
            });
        }
        let len = self.element_count(r)?;
        if index >= len {
            return Err(ArenaError::IndexOutOfRange { index, len });
        }
        let pos = r.offset() as i64 + (header + index * element) as i64;
        let pos = i32::try_from(pos)
            .map_err(|_| ArenaError::corrupt(format!("element offset {pos} exceeds i32")))?;
        Ok(Cursor::new::<T>(pos))
    }

    /// A cursor to the header field at byte `at` of the record behind `r`.
    pub fn header_cursor<T: Record, F: Plain>(
        &self,
        r: Ref<T>,
        at: usize,
    ) -> Result<Cursor<F>, ArenaError> {
        let table = self.table::<T>()?;
        let header = table.descriptor().layout.header_size();
        if at + F::SIZE > header {
            return Err(ArenaError::InvalidLayout {
                type_name: table.type_name().to_string(),
                reason: format!(
                    "field of {} bytes at {at} lies outside the {header}-byte header",
                    F::SIZE
                ),
            });
        }
        table.check_record_start(r.offset())?;
        Ok(Cursor::new::<T>(r.offset() + at as i32))
    }

    /// Decode every trailing element of the record behind `r`.
    pub fn elements<T: Record, E: Plain>(&self, r: Ref<T>) -> Result<Vec<E>, ArenaError> {
        (0..self.element_count(r)?)
            .map(|i| self.read_at(self.element_cursor::<T, E>(r, i)?))
            .collect()
    }
}

impl<T: Record> Ref<T> {
    /// Allocate a `T` with `count` trailing elements in the current scope's
    /// context. See [`ContextData::allocate_record`].
    pub fn new_record(
        count: usize,
        init: impl FnOnce(&mut ByteWriter<'_>),
    ) -> Result<Self, ArenaError> {
        Scope::with_current_mut(|data| data.allocate_record(count, init))
    }

    /// Number of trailing elements.
    pub fn element_count(self) -> Result<usize, ArenaError> {
        Scope::with_current(|data| data.element_count(self))
    }

    /// The `index`-th trailing element.
    pub fn element<E: Plain>(self, index: usize) -> Result<E, ArenaError> {
        Scope::with_current(|data| data.read_at(data.element_cursor::<T, E>(self, index)?))
    }

    /// All trailing elements in order.
    pub fn elements<E: Plain>(self) -> Result<Vec<E>, ArenaError> {
        Scope::with_current(|data| data.elements::<T, E>(self))
    }

    /// A cursor to the `index`-th trailing element.
    pub fn element_cursor<E: Plain>(self, index: usize) -> Result<Cursor<E>, ArenaError> {
        Scope::with_current(|data| data.element_cursor::<T, E>(self, index))
    }

    /// A cursor to the header field at byte `at`.
    pub fn header_cursor<F: Plain>(self, at: usize) -> Result<Cursor<F>, ArenaError> {
        Scope::with_current(|data| data.header_cursor::<T, F>(self, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextBuilder};
    use crate::layout::RecordLayout;
    use std::borrow::Cow;

    /// `[count i32][channel i32]` then `count` i16 samples.
    struct Trace;

    impl Record for Trace {
        fn type_name() -> Cow<'static, str> {
            "Trace".into()
        }

        fn layout() -> RecordLayout {
            RecordLayout::variable(8, 2, 0)
        }
    }

    fn ctx() -> Context {
        ContextBuilder::new()
            .with_type::<Trace>()
            .with_type::<u32>()
            .with_capacity::<Trace>(8)
            .build()
            .unwrap()
    }

    fn trace(d: &mut ContextData, channel: i32, samples: &[i16]) -> Result<Ref<Trace>, ArenaError> {
        d.allocate_record::<Trace>(samples.len(), |w| {
            w.put_i32(0);
            w.put_i32(channel);
            for &s in samples {
                w.put_i16(s);
            }
        })
    }

    #[test]
    fn elements_and_header_fields_resolve() {
        let c = ctx();
        c.write(|d| {
            let r = trace(d, 3, &[10, -20, 30]).unwrap();
            assert_eq!(d.element_count(r).unwrap(), 3);
            assert_eq!(d.elements::<Trace, i16>(r).unwrap(), [10, -20, 30]);
            assert_eq!(d.record_bytes(r).unwrap().len(), 14);
            let channel = d.header_cursor::<Trace, i32>(r, 4).unwrap();
            assert_eq!(d.read_at(channel).unwrap(), 3);

            let second = d.element_cursor::<Trace, i16>(r, 1).unwrap();
            d.write_at(second, 99).unwrap();
            assert_eq!(d.elements::<Trace, i16>(r).unwrap(), [10, 99, 30]);
        });
    }

    #[test]
    fn count_field_follows_requested_count() {
        let c = ctx();
        c.write(|d| {
            let r = d
                .allocate_record::<Trace>(2, |w| {
                    w.put_i32(50);
                    w.put_i32(1);
                })
                .unwrap();
            assert_eq!(d.element_count(r).unwrap(), 2);
            assert_eq!(d.elements::<Trace, i16>(r).unwrap(), [0, 0]);
        });
    }

    #[test]
    fn index_stops_at_own_count() {
        let c = ctx();
        c.write(|d| {
            let first = trace(d, 1, &[1, 2]).unwrap();
            trace(d, 2, &[3, 4]).unwrap();
            assert!(matches!(
                d.element_cursor::<Trace, i16>(first, 2),
                Err(ArenaError::IndexOutOfRange { index: 2, len: 2 })
            ));
            assert!(matches!(
                d.element_cursor::<Trace, i32>(first, 0),
                Err(ArenaError::InvalidLayout { .. })
            ));
            assert!(d.header_cursor::<Trace, i64>(first, 4).is_err());
            assert!(matches!(
                d.element_count(Ref::<Trace>::from_offset(2)),
                Err(ArenaError::InvalidRef { .. })
            ));
        });
    }

    #[test]
    fn overlong_initializer_allocates_nothing() {
        let c = ctx();
        c.write(|d| {
            let err = d
                .allocate_record::<Trace>(1, |w| {
                    w.put_i32(1);
                    w.put_i32(0);
                    w.put_i32(7);
                })
                .unwrap_err();
            assert!(matches!(err, ArenaError::InvalidLayout { .. }));
            assert_eq!(d.table::<Trace>().unwrap().record_count(), 0);
        });
    }

    #[test]
    fn oversize_record_is_capacity_error() {
        // page = 8 * 10 = 80 bytes
        let c = ctx();
        let err = c
            .write(|d| d.allocate_record::<Trace>(40, |_| {}))
            .unwrap_err();
        assert!(matches!(err, ArenaError::CapacityExceeded { .. }));
    }

    #[test]
    fn fixed_records_have_no_elements() {
        let c = ctx();
        c.write(|d| {
            let r = d
                .allocate_record::<u32>(0, |w| w.put_u32(0xfeed))
                .unwrap();
            assert_eq!(d.get(r).unwrap(), 0xfeed);
            assert!(matches!(
                d.allocate_record::<u32>(1, |_| {}),
                Err(ArenaError::InvalidLayout { .. })
            ));
            assert!(matches!(
                d.element_count(r),
                Err(ArenaError::InvalidLayout { .. })
            ));
        });
    }

    #[test]
    fn ambient_accessors() {
        let c = ctx();
        let _s = c.enter();
        let r = Ref::<Trace>::new_record(2, |w| {
            w.put_i32(0);
            w.put_i32(9);
            w.put_i16(5);
            w.put_i16(6);
        })
        .unwrap();
        assert_eq!(r.element_count().unwrap(), 2);
        assert_eq!(r.element::<i16>(1).unwrap(), 6);
        r.element_cursor::<i16>(0).unwrap().set(4).unwrap();
        assert_eq!(r.elements::<i16>().unwrap(), [4, 6]);
        assert_eq!(r.header_cursor::<i32>(4).unwrap().get().unwrap(), 9);
    }
}
