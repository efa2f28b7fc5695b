//! Interned UTF-8 strings.
//!
//! A string is a variable-size record: an `i32` byte length followed by
//! that many UTF-8 bytes. Equal strings allocated through
//! [`ContextData::allocate_string`] share one record. The interning index
//! lives beside the tables and is rebuilt from the string table when a
//! context is loaded; it is never serialized.
//!
//! Decoded values are cached per offset. Byte edits made through a
//! [`Cursor`](crate::ptr::Cursor) are not seen by the cache;
//! [`ContextData::string_uncached`] re-decodes and drops the cached entry.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::ContextData;
use crate::error::ArenaError;
use crate::layout::{Record, RecordLayout};
use crate::ptr::Ref;
use crate::scope::Scope;
use crate::table::Table;

/// Marker type for string records. Handles are `Ref<StringRecord>`.
pub struct StringRecord {
    _private: (),
}

impl StringRecord {
    /// Size of the length header.
    pub const HEADER: usize = 4;

    /// Intern `value` in the current scope's context.
    pub fn intern(value: &str) -> Result<Ref<StringRecord>, ArenaError> {
        Scope::with_current_mut(|data| data.allocate_string(value))
    }

    /// Look up an already interned string in the current scope's context.
    pub fn find(value: &str) -> Result<Option<Ref<StringRecord>>, ArenaError> {
        Scope::with_current(|data| Ok(data.find_string(value)))
    }
}

impl Record for StringRecord {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("String")
    }

    fn layout() -> RecordLayout {
        RecordLayout::variable(Self::HEADER, 1, 0)
    }
}

/// Interning index and decode cache of one context.
#[derive(Default)]
pub(crate) struct StringIndex {
    by_value: HashMap<String, Ref<StringRecord>>,
    cache: Mutex<HashMap<i32, Arc<str>>>,
}

impl StringIndex {
    fn forget(&mut self, value: &str) {
        self.by_value.remove(value);
    }
}

fn decode(table: &Table, offset: i32) -> Result<String, ArenaError> {
    let bytes = table.record_bytes(offset)?;
    let text = &bytes[StringRecord::HEADER..];
    String::from_utf8(text.to_vec()).map_err(|e| {
        ArenaError::corrupt(format!("string at {offset} is not valid UTF-8: {e}"))
    })
}

impl ContextData {
    /// Intern `value`, returning the existing record for an equal string.
    ///
    /// A stale index entry (one whose record no longer holds `value`) is
    /// logged and replaced by a fresh allocation.
    pub fn allocate_string(&mut self, value: &str) -> Result<Ref<StringRecord>, ArenaError> {
        if let Some(&existing) = self.strings.by_value.get(value) {
            let table = self.table::<StringRecord>()?;
            match decode(table, existing.offset()) {
                Ok(stored) if stored == value => return Ok(existing),
                Ok(_) | Err(_) => {
                    warn!(
                        offset = existing.offset(),
                        "stale interning entry; allocating a fresh string"
                    );
                    self.strings.forget(value);
                }
            }
        }

        let r = self.allocate_record::<StringRecord>(value.len(), |w| {
            w.put_i32(0);
            w.put_bytes(value.as_bytes());
        })?;
        self.strings.by_value.insert(value.to_string(), r);
        Ok(r)
    }

    /// The interned record for `value`, without allocating.
    pub fn find_string(&self, value: &str) -> Option<Ref<StringRecord>> {
        self.strings.by_value.get(value).copied()
    }

    /// Number of distinct strings in the interning index.
    pub fn interned_count(&self) -> usize {
        self.strings.by_value.len()
    }

    /// Decode the string behind `r`, caching the result.
    pub fn string(&self, r: Ref<StringRecord>) -> Result<Arc<str>, ArenaError> {
        if let Some(hit) = self.strings.cache.lock().get(&r.offset()) {
            return Ok(Arc::clone(hit));
        }
        let value: Arc<str> = decode(self.table::<StringRecord>()?, r.offset())?.into();
        self.strings
            .cache
            .lock()
            .insert(r.offset(), Arc::clone(&value));
        Ok(value)
    }

    /// Decode the string behind `r` from its bytes, bypassing the cache.
    pub fn string_uncached(&self, r: Ref<StringRecord>) -> Result<String, ArenaError> {
        self.strings.cache.lock().remove(&r.offset());
        decode(self.table::<StringRecord>()?, r.offset())
    }

    /// Byte length of the string behind `r`.
    pub fn string_len(&self, r: Ref<StringRecord>) -> Result<usize, ArenaError> {
        self.element_count(r)
    }

    /// Rebuild the interning index by scanning the string table.
    ///
    /// Undecodable records are logged and skipped. When two records hold
    /// the same text the first one wins.
    pub(crate) fn rebuild_string_index(&mut self) {
        let mut by_value = HashMap::new();
        if let Ok(table) = self.table::<StringRecord>() {
            for &offset in table.offsets() {
                match decode(table, offset) {
                    Ok(value) => {
                        by_value.entry(value).or_insert(Ref::from_offset(offset));
                    }
                    Err(e) => {
                        warn!(offset, error = %e, "skipping undecodable string record");
                    }
                }
            }
            debug!(strings = by_value.len(), "string index rebuilt");
        }
        self.strings.by_value = by_value;
        self.strings.cache.get_mut().clear();
    }
}

impl Ref<StringRecord> {
    /// Decode the string through the current scope's context.
    pub fn value(self) -> Result<Arc<str>, ArenaError> {
        Scope::with_current(|data| data.string(self))
    }

    /// Re-decode the string from its bytes through the current scope's context.
    pub fn value_uncached(self) -> Result<String, ArenaError> {
        Scope::with_current(|data| data.string_uncached(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextBuilder};
    use crate::ptr::Cursor;

    fn ctx() -> Context {
        ContextBuilder::new()
            .with_strings()
            .with_capacity::<StringRecord>(16)
            .build()
            .unwrap()
    }

    #[test]
    fn equal_strings_share_a_record() {
        let c = ctx();
        let a = c.allocate_string("KSEA").unwrap();
        let b = c.allocate_string("KSEA").unwrap();
        let other = c.allocate_string("KPDX").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
        c.read(|d| {
            assert_eq!(d.interned_count(), 2);
            assert_eq!(d.table::<StringRecord>().unwrap().record_count(), 2);
            assert_eq!(&*d.string(a).unwrap(), "KSEA");
            assert_eq!(d.string_len(other).unwrap(), 4);
        });
    }

    #[test]
    fn empty_string_is_header_only() {
        let c = ctx();
        let r = c.allocate_string("").unwrap();
        c.read(|d| {
            assert_eq!(&*d.string(r).unwrap(), "");
            assert_eq!(d.table::<StringRecord>().unwrap().record_len(r.offset()).unwrap(), 4);
        });
    }

    #[test]
    fn length_is_in_bytes() {
        let c = ctx();
        let r = c.allocate_string("Zürich").unwrap();
        c.read(|d| assert_eq!(d.string_len(r).unwrap(), 7));
    }

    #[test]
    fn find_does_not_allocate() {
        let c = ctx();
        c.read(|d| assert!(d.find_string("missing").is_none()));
        let r = c.allocate_string("present").unwrap();
        c.read(|d| {
            assert_eq!(d.find_string("present"), Some(r));
            assert_eq!(d.table::<StringRecord>().unwrap().record_count(), 1);
        });
    }

    #[test]
    fn uncached_read_sees_byte_edits() {
        let c = ctx();
        let r = c.allocate_string("abc").unwrap();
        let _s = c.enter();
        assert_eq!(&*r.value().unwrap(), "abc");
        Cursor::<u8>::new::<StringRecord>(r.offset() + 4)
            .set(b'x')
            .unwrap();
        assert_eq!(&*r.value().unwrap(), "abc");
        assert_eq!(r.value_uncached().unwrap(), "xbc");
        assert_eq!(&*r.value().unwrap(), "xbc");
    }

    #[test]
    fn stale_entry_falls_back_to_fresh_allocation() {
        let c = ctx();
        let r = c.allocate_string("abc").unwrap();
        c.write(|d| {
            d.table_mut::<StringRecord>()
                .unwrap()
                .write(r.offset() + 4, &b'z')
                .unwrap()
        });
        let fresh = c.allocate_string("abc").unwrap();
        assert_ne!(fresh, r);
        c.read(|d| assert_eq!(d.find_string("abc"), Some(fresh)));
    }

    #[test]
    fn oversized_string_fails() {
        let c = ctx();
        // page = 16 * 5 bytes
        let long = "x".repeat(100);
        let err = c.allocate_string(&long).unwrap_err();
        assert!(matches!(err, ArenaError::CapacityExceeded { .. }));
    }

    #[test]
    fn index_rebuilt_after_load() {
        let c = ctx();
        let names = ["alpha", "beta", "gamma"];
        let refs: Vec<_> = names.iter().map(|n| c.allocate_string(n).unwrap()).collect();
        let mut buf = Vec::new();
        c.write_to(&mut buf).unwrap();
        let loaded = ContextBuilder::new()
            .with_strings()
            .read_from(&mut buf.as_slice())
            .unwrap();
        loaded.read(|d| {
            assert_eq!(d.interned_count(), 3);
            for (name, r) in names.iter().zip(&refs) {
                assert_eq!(d.find_string(name), Some(*r));
                assert_eq!(&*d.string(*r).unwrap(), *name);
            }
        });
        // already interned: no allocation, so the read-only table is fine
        assert_eq!(loaded.allocate_string("beta").unwrap(), refs[1]);
        assert!(matches!(
            loaded.allocate_string("delta"),
            Err(ArenaError::ReadOnlyTable { .. })
        ));
    }
}
