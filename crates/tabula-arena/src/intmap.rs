//! Integer-keyed hash maps built on vectors.
//!
//! A map head is a variable-size record: a 12-byte header followed by one
//! bucket reference per bucket.
//!
//! ```text
//!  0  count          i32   live entries
//!  4  bucket_count   i32   fixed at creation
//!  8  self           i32   the head's own offset
//! 12  buckets        Ref<Vector<MapEntry<V>>> * bucket_count
//! ```
//!
//! A key lives in bucket `key.rem_euclid(bucket_count)`. Buckets start
//! null and get their vector on first insert. There is no rehash and no
//! removal, so the bucket count should be sized for the expected load.
//!
//! String-keyed operations intern the key and use the string record's
//! offset as the integer key, so equal strings always map to the same
//! entry within one context.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use crate::context::ContextData;
use crate::error::ArenaError;
use crate::layout::{write_i32_at, ByteReader, ByteWriter, Plain, Record, RecordLayout};
use crate::ptr::{Ref, NULL_OFFSET};
use crate::scope::Scope;
use crate::vector::{Vector, VectorBlock};

const COUNT_AT: i32 = 0;
const BUCKET_COUNT_AT: i32 = 4;
const SELF_AT: usize = 8;

/// Header bytes of a map head.
pub const MAP_HEADER: usize = 12;

/// One key/value pair stored in a bucket vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapEntry<V> {
    /// The key.
    pub key: i32,
    /// The value.
    pub value: V,
}

impl<V: Plain> Plain for MapEntry<V> {
    const SIZE: usize = 4 + V::SIZE;

    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("MapEntry<{}>", V::type_name()))
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_i32(self.key);
        w.put(&self.value);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self {
            key: r.get_i32(),
            value: r.get(),
        }
    }
}

/// Record type of map heads for values of type `V`.
///
/// Never constructed; it names the table and describes the head layout.
pub struct MapHead<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V: Plain> Record for MapHead<V> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("IntMap<{}>", V::type_name()))
    }

    fn layout() -> RecordLayout {
        RecordLayout::variable(MAP_HEADER, 4, BUCKET_COUNT_AT as usize)
            .with_self_offset(Some(SELF_AT))
    }
}

/// Handle to a map: a reference to its head.
#[must_use]
pub struct IntMap<V> {
    head: Ref<MapHead<V>>,
}

impl<V> Clone for IntMap<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for IntMap<V> {}

impl<V> PartialEq for IntMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
    }
}

impl<V> Eq for IntMap<V> {}

impl<V: Plain> fmt::Debug for IntMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntMap<{}>({})", V::type_name(), self.head.offset())
    }
}

impl<V: Plain> Plain for IntMap<V> {
    const SIZE: usize = 4;

    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("IntMapRef<{}>", V::type_name()))
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put(&self.head);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self { head: r.get() }
    }
}

impl<V> IntMap<V> {
    /// A handle that refers to no map.
    pub const fn null() -> Self {
        Self { head: Ref::null() }
    }

    /// Wrap a head reference.
    pub const fn from_head(head: Ref<MapHead<V>>) -> Self {
        Self { head }
    }

    /// The head reference.
    pub fn head(self) -> Ref<MapHead<V>> {
        self.head
    }

    /// Whether this handle refers to no map.
    pub fn is_null(self) -> bool {
        self.head.is_null()
    }
}

impl<V> Default for IntMap<V> {
    fn default() -> Self {
        Self::null()
    }
}

/// How an insert treats an existing key.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OnExisting {
    Fail,
    Overwrite,
    Keep,
}

impl ContextData {
    /// Create an empty map with `bucket_count` buckets.
    pub fn new_map<V: Plain>(&mut self, bucket_count: usize) -> Result<IntMap<V>, ArenaError> {
        // Fail early if bucket vectors cannot be stored.
        self.table::<VectorBlock<MapEntry<V>>>()?;
        let table = self.table_mut::<MapHead<V>>()?;
        let buckets = i32::try_from(bucket_count)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| ArenaError::InvalidConfig {
                reason: format!("bucket count must be in 1..={}, got {bucket_count}", i32::MAX),
            })?;
        let len = MAP_HEADER + bucket_count * 4;
        let offset = table.allocate_with(len, |b| {
            write_i32_at(b, COUNT_AT as usize, 0);
            write_i32_at(b, BUCKET_COUNT_AT as usize, buckets);
            for i in 0..bucket_count {
                write_i32_at(b, MAP_HEADER + i * 4, NULL_OFFSET);
            }
        })?;
        Ok(IntMap::from_head(Ref::from_offset(offset)))
    }

    /// Create an empty map with the configured default bucket count.
    pub fn new_map_default<V: Plain>(&mut self) -> Result<IntMap<V>, ArenaError> {
        let buckets = self.config().map_bucket_count as usize;
        self.new_map(buckets)
    }

    /// Read access to a map.
    pub fn map<V: Plain>(&self, map: IntMap<V>) -> Result<MapView<'_, V>, ArenaError> {
        MapView::open(self, map)
    }

    /// Write access to a map.
    pub fn map_mut<V: Plain>(&mut self, map: IntMap<V>) -> Result<MapViewMut<'_, V>, ArenaError> {
        MapView::open(self, map)?;
        Ok(MapViewMut { data: self, map })
    }
}

fn bucket_slot(head: i32, bucket: usize) -> i32 {
    head + (MAP_HEADER + bucket * 4) as i32
}

/// Read access to one map.
pub struct MapView<'a, V> {
    data: &'a ContextData,
    head: i32,
    bucket_count: usize,
    _marker: PhantomData<fn() -> V>,
}

impl<'a, V: Plain> MapView<'a, V> {
    fn open(data: &'a ContextData, map: IntMap<V>) -> Result<Self, ArenaError> {
        let table = data.table::<MapHead<V>>()?;
        let head = map.head.offset();
        table.check_record_start(head)?;
        let buckets = table.read_i32(head + BUCKET_COUNT_AT)?;
        let bucket_count = usize::try_from(buckets)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                ArenaError::corrupt(format!("map at {head} has bucket count {buckets}"))
            })?;
        Ok(Self {
            data,
            head,
            bucket_count,
            _marker: PhantomData,
        })
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize, ArenaError> {
        let count = self.data.table::<MapHead<V>>()?.read_i32(self.head + COUNT_AT)?;
        usize::try_from(count)
            .map_err(|_| ArenaError::corrupt(format!("map at {} has count {count}", self.head)))
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> Result<bool, ArenaError> {
        Ok(self.len()? == 0)
    }

    /// Number of buckets, fixed at creation.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    fn bucket_of(&self, key: i32) -> usize {
        key.rem_euclid(self.bucket_count as i32) as usize
    }

    fn bucket_vector(&self, bucket: usize) -> Result<Option<Vector<MapEntry<V>>>, ArenaError> {
        let table = self.data.table::<MapHead<V>>()?;
        let r: Ref<VectorBlock<MapEntry<V>>> = table.read(bucket_slot(self.head, bucket))?;
        Ok(r.non_null().map(Vector::from_head))
    }

    /// Entries in bucket `bucket`; zero for a bucket never written.
    pub fn bucket_len(&self, bucket: usize) -> Result<usize, ArenaError> {
        if bucket >= self.bucket_count {
            return Err(ArenaError::IndexOutOfRange {
                index: bucket,
                len: self.bucket_count,
            });
        }
        match self.bucket_vector(bucket)? {
            Some(v) => Ok(self.data.vector(v)?.len()),
            None => Ok(0),
        }
    }

    fn find(&self, key: i32) -> Result<Option<(Vector<MapEntry<V>>, usize, V)>, ArenaError> {
        let Some(bucket) = self.bucket_vector(self.bucket_of(key))? else {
            return Ok(None);
        };
        for (i, entry) in self.data.vector(bucket)?.iter().enumerate() {
            let entry = entry?;
            if entry.key == key {
                return Ok(Some((bucket, i, entry.value)));
            }
        }
        Ok(None)
    }

    /// The value stored under `key`.
    pub fn get(&self, key: i32) -> Result<V, ArenaError> {
        self.try_get(key)?.ok_or(ArenaError::KeyNotFound { key })
    }

    /// The value stored under `key`, or `None`.
    pub fn try_get(&self, key: i32) -> Result<Option<V>, ArenaError> {
        Ok(self.find(key)?.map(|(_, _, v)| v))
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: i32) -> Result<bool, ArenaError> {
        Ok(self.find(key)?.is_some())
    }

    /// The value stored under an interned string key.
    ///
    /// A string that was never interned cannot be a key, so this never
    /// allocates.
    pub fn try_get_str(&self, key: &str) -> Result<Option<V>, ArenaError> {
        match self.data.find_string(key) {
            Some(r) => self.try_get(r.offset()),
            None => Ok(None),
        }
    }

    /// Whether an interned string key is present.
    pub fn contains_str(&self, key: &str) -> Result<bool, ArenaError> {
        Ok(self.try_get_str(key)?.is_some())
    }

    /// All entries, bucket by bucket, each bucket in insertion order.
    pub fn entries(&self) -> Result<Vec<(i32, V)>, ArenaError> {
        let mut out = Vec::new();
        for bucket in 0..self.bucket_count {
            if let Some(v) = self.bucket_vector(bucket)? {
                for entry in self.data.vector(v)?.iter() {
                    let entry = entry?;
                    out.push((entry.key, entry.value));
                }
            }
        }
        Ok(out)
    }

    /// All keys, in [`entries`](Self::entries) order.
    pub fn keys(&self) -> Result<Vec<i32>, ArenaError> {
        Ok(self.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    /// All values, in [`entries`](Self::entries) order.
    pub fn values(&self) -> Result<Vec<V>, ArenaError> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }
}

/// Write access to one map.
pub struct MapViewMut<'a, V> {
    data: &'a mut ContextData,
    map: IntMap<V>,
}

impl<V: Plain> MapViewMut<'_, V> {
    /// Read access through this view.
    pub fn view(&self) -> Result<MapView<'_, V>, ArenaError> {
        MapView::open(self.data, self.map)
    }

    fn insert(&mut self, key: i32, value: V, on_existing: OnExisting) -> Result<bool, ArenaError> {
        let (bucket, existing, head) = {
            let view = self.view()?;
            let bucket = view.bucket_of(key);
            match view.find(key)? {
                Some((vector, index, _)) => (bucket, Some((vector, index)), view.head),
                None => (bucket, None, view.head),
            }
        };

        if let Some((vector, index)) = existing {
            return match on_existing {
                OnExisting::Fail => Err(ArenaError::DuplicateKey { key }),
                OnExisting::Keep => Ok(false),
                OnExisting::Overwrite => {
                    self.data
                        .vector_mut(vector)?
                        .set(index, MapEntry { key, value })?;
                    Ok(false)
                }
            };
        }

        // A new key changes the count; loaded maps only take overwrites.
        let heads = self.data.table::<MapHead<V>>()?;
        if heads.is_read_only() {
            return Err(ArenaError::ReadOnlyTable {
                type_name: heads.type_name().to_string(),
            });
        }
        let slot = bucket_slot(head, bucket);
        let current: Ref<VectorBlock<MapEntry<V>>> = heads.read(slot)?;
        let vector = match current.non_null() {
            Some(r) => Vector::from_head(r),
            None => {
                let min = self.data.config().vector_min_capacity as usize;
                let created = self.data.new_vector::<MapEntry<V>>(min)?;
                self.data
                    .table_mut::<MapHead<V>>()?
                    .write(slot, &created.head())?;
                created
            }
        };
        self.data.vector_mut(vector)?.push(MapEntry { key, value })?;

        let heads = self.data.table_mut::<MapHead<V>>()?;
        let count = heads.read_i32(head + COUNT_AT)?;
        heads.write_i32(head + COUNT_AT, count + 1)?;
        Ok(true)
    }

    /// Insert a new key. Fails with [`ArenaError::DuplicateKey`] if the key
    /// is present, leaving the map unchanged.
    pub fn add(&mut self, key: i32, value: V) -> Result<(), ArenaError> {
        self.insert(key, value, OnExisting::Fail).map(|_| ())
    }

    /// Insert or overwrite. Returns `true` if the key was new.
    pub fn set(&mut self, key: i32, value: V) -> Result<bool, ArenaError> {
        self.insert(key, value, OnExisting::Overwrite)
    }

    /// Insert only if absent. Returns `true` if the key was new.
    pub fn try_add(&mut self, key: i32, value: V) -> Result<bool, ArenaError> {
        self.insert(key, value, OnExisting::Keep)
    }

    /// [`add`](Self::add) keyed by an interned string.
    pub fn add_str(&mut self, key: &str, value: V) -> Result<(), ArenaError> {
        let key = self.data.allocate_string(key)?.offset();
        self.add(key, value)
    }

    /// [`set`](Self::set) keyed by an interned string.
    pub fn set_str(&mut self, key: &str, value: V) -> Result<bool, ArenaError> {
        let key = self.data.allocate_string(key)?.offset();
        self.set(key, value)
    }
}

impl<V: Plain> IntMap<V> {
    /// Create an empty map in the current scope's context.
    pub fn new(bucket_count: usize) -> Result<Self, ArenaError> {
        Scope::with_current_mut(|data| data.new_map(bucket_count))
    }

    /// Insert a new key; see [`MapViewMut::add`].
    pub fn add(self, key: i32, value: V) -> Result<(), ArenaError> {
        Scope::with_current_mut(|data| data.map_mut(self)?.add(key, value))
    }

    /// Insert or overwrite; see [`MapViewMut::set`].
    pub fn set(self, key: i32, value: V) -> Result<bool, ArenaError> {
        Scope::with_current_mut(|data| data.map_mut(self)?.set(key, value))
    }

    /// Insert only if absent; see [`MapViewMut::try_add`].
    pub fn try_add(self, key: i32, value: V) -> Result<bool, ArenaError> {
        Scope::with_current_mut(|data| data.map_mut(self)?.try_add(key, value))
    }

    /// The value stored under `key`.
    pub fn get(self, key: i32) -> Result<V, ArenaError> {
        Scope::with_current(|data| data.map(self)?.get(key))
    }

    /// The value stored under `key`, or `None`.
    pub fn try_get(self, key: i32) -> Result<Option<V>, ArenaError> {
        Scope::with_current(|data| data.map(self)?.try_get(key))
    }

    /// Whether `key` is present.
    pub fn contains_key(self, key: i32) -> Result<bool, ArenaError> {
        Scope::with_current(|data| data.map(self)?.contains_key(key))
    }

    /// Number of entries.
    pub fn len(self) -> Result<usize, ArenaError> {
        Scope::with_current(|data| data.map(self)?.len())
    }

    /// Whether the map has no entries.
    pub fn is_empty(self) -> Result<bool, ArenaError> {
        Ok(self.len()? == 0)
    }

    /// All entries in bucket order.
    pub fn entries(self) -> Result<Vec<(i32, V)>, ArenaError> {
        Scope::with_current(|data| data.map(self)?.entries())
    }

    /// Insert a new string key.
    pub fn add_str(self, key: &str, value: V) -> Result<(), ArenaError> {
        Scope::with_current_mut(|data| data.map_mut(self)?.add_str(key, value))
    }

    /// Insert or overwrite a string key.
    pub fn set_str(self, key: &str, value: V) -> Result<bool, ArenaError> {
        Scope::with_current_mut(|data| data.map_mut(self)?.set_str(key, value))
    }

    /// The value stored under a string key, or `None`.
    pub fn try_get_str(self, key: &str) -> Result<Option<V>, ArenaError> {
        Scope::with_current(|data| data.map(self)?.try_get_str(key))
    }

    /// Whether a string key is present.
    pub fn contains_str(self, key: &str) -> Result<bool, ArenaError> {
        Scope::with_current(|data| data.map(self)?.contains_str(key))
    }
}
