//! Contexts: the registry of tables for a declared set of record types.
//!
//! A [`ContextBuilder`] declares record types up front; building it yields
//! a [`Context`], a cheap clonable handle to the shared [`ContextData`].
//! `ContextData` carries the explicit-context API (every operation takes
//! the context as `&self`/`&mut self`); the ambient accessors on [`Ref`],
//! [`Vector`] and [`IntMap`] resolve the same operations through the
//! current [`Scope`].
//!
//! [`Vector`]: crate::vector::Vector
//! [`IntMap`]: crate::intmap::IntMap

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::codec::{read_len_i32, read_length_prefixed_str, write_len_i32, write_length_prefixed_str};
use crate::config::{ContextConfig, TableConfig};
use crate::error::ArenaError;
use crate::intmap::{MapEntry, MapHead};
use crate::layout::{Plain, Record, TypeLayout};
use crate::ptr::{Cursor, Ref, TableKey};
use crate::scope::Scope;
use crate::string::{StringIndex, StringRecord};
use crate::table::Table;
use crate::vector::VectorBlock;

/// Counter for unique [`ContextId`] allocation.
static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a context.
///
/// Two contexts never share an ID within one process, including a context
/// and the one read back from its serialized form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declares the record types of a context, then builds or loads it.
///
/// ```
/// use tabula_arena::{ContextBuilder, IntMap, Scope, Vector};
///
/// let ctx = ContextBuilder::new()
///     .with_type::<u64>()
///     .with_vector::<i32>()
///     .with_map::<f64>()
///     .with_strings()
///     .build()
///     .unwrap();
///
/// let _scope = Scope::enter(&ctx);
/// let v = Vector::<i32>::new(4).unwrap();
/// v.push(7).unwrap();
/// assert_eq!(v.get(0).unwrap(), 7);
/// let m = IntMap::<f64>::new(16).unwrap();
/// m.add(3, 0.5).unwrap();
/// assert_eq!(m.get(3).unwrap(), 0.5);
/// ```
pub struct ContextBuilder {
    config: ContextConfig,
    types: Vec<TypeLayout>,
    overrides: HashMap<TypeId, TableConfig>,
    error: Option<ArenaError>,
}

impl ContextBuilder {
    /// Start an empty declaration with default configuration.
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            types: Vec::new(),
            overrides: HashMap::new(),
            error: None,
        }
    }

    /// Replace the context-wide configuration.
    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare a record type.
    pub fn with_type<T: Record>(mut self) -> Self {
        match TypeLayout::of::<T>() {
            Ok(descriptor) => self.types.push(descriptor),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Declare vectors of `T`.
    pub fn with_vector<T: Plain>(self) -> Self {
        self.with_type::<VectorBlock<T>>()
    }

    /// Declare integer-keyed maps to `V`, including their bucket vectors.
    pub fn with_map<V: Plain>(self) -> Self {
        self.with_type::<MapHead<V>>().with_vector::<MapEntry<V>>()
    }

    /// Declare interned string support.
    pub fn with_strings(self) -> Self {
        self.with_type::<StringRecord>()
    }

    /// Override the table sizing of one record type.
    pub fn with_capacity<T: Record>(mut self, initial_capacity: u32) -> Self {
        self.overrides
            .insert(TypeId::of::<T>(), TableConfig::new(initial_capacity));
        self
    }

    fn validate(&self) -> Result<(), ArenaError> {
        self.config.validate()?;
        for (i, desc) in self.types.iter().enumerate() {
            let duplicate = self.types[..i]
                .iter()
                .any(|prev| prev.type_id == desc.type_id || prev.type_name == desc.type_name);
            if duplicate {
                return Err(ArenaError::DuplicateType {
                    type_name: desc.type_name.clone(),
                });
            }
        }
        for config in self.overrides.values() {
            config.validate()?;
        }
        Ok(())
    }

    fn table_config(&self, desc: &TypeLayout) -> TableConfig {
        self.overrides
            .get(&desc.type_id)
            .copied()
            .unwrap_or(self.config.table)
    }

    /// Create an empty context holding one table per declared type.
    pub fn build(mut self) -> Result<Context, ArenaError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.validate()?;
        let mut tables = IndexMap::with_capacity(self.types.len());
        for desc in &self.types {
            let table = Table::new(desc.clone(), self.table_config(desc))?;
            tables.insert(desc.type_id, table);
        }
        let data = ContextData::from_parts(self.config, tables);
        debug!(context = %data.id, tables = data.tables.len(), "context created");
        Ok(Context::from_data(data))
    }

    /// Reconstruct a context from a container stream.
    ///
    /// Every table in the stream must name a declared type. Declared types
    /// absent from the stream start empty and writable. On error the
    /// partially read stream is abandoned; nothing is returned.
    pub fn read_from(mut self, r: &mut dyn Read) -> Result<Context, ArenaError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.validate()?;

        let table_count = read_len_i32(r, "table_count")?;
        let mut loaded: IndexMap<TypeId, Table> = IndexMap::with_capacity(self.types.len());
        for _ in 0..table_count {
            let name = read_length_prefixed_str(r, "record_type_id")?;
            let desc = self
                .types
                .iter()
                .find(|d| d.type_name == name)
                .ok_or_else(|| ArenaError::UnknownTypeId {
                    type_name: name.clone(),
                })?;
            if loaded.contains_key(&desc.type_id) {
                return Err(ArenaError::corrupt(format!(
                    "table '{name}' appears twice in the stream"
                )));
            }
            let table = Table::read_from(r, desc.clone())?;
            loaded.insert(desc.type_id, table);
        }

        // Keep declaration order so a re-save is byte-identical.
        let mut tables = IndexMap::with_capacity(self.types.len());
        for desc in &self.types {
            let table = match loaded.swap_remove(&desc.type_id) {
                Some(table) => table,
                None => Table::new(desc.clone(), self.table_config(desc))?,
            };
            tables.insert(desc.type_id, table);
        }

        let mut data = ContextData::from_parts(self.config, tables);
        data.rebuild_string_index();
        debug!(
            context = %data.id,
            tables = table_count,
            bytes = data.allocated_bytes(),
            "context loaded"
        );
        Ok(Context::from_data(data))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The tables and string index of one context.
pub struct ContextData {
    id: ContextId,
    config: ContextConfig,
    tables: IndexMap<TypeId, Table>,
    pub(crate) strings: StringIndex,
}

impl ContextData {
    fn from_parts(config: ContextConfig, tables: IndexMap<TypeId, Table>) -> Self {
        Self {
            id: ContextId::next(),
            config,
            tables,
            strings: StringIndex::default(),
        }
    }

    /// This context's unique ID.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Context-wide configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The table of `T`.
    pub fn table<T: Record>(&self) -> Result<&Table, ArenaError> {
        self.tables
            .get(&TypeId::of::<T>())
            .ok_or_else(|| ArenaError::UnregisteredType {
                type_name: T::type_name().into_owned(),
            })
    }

    /// The table of `T`, mutably.
    pub fn table_mut<T: Record>(&mut self) -> Result<&mut Table, ArenaError> {
        self.tables
            .get_mut(&TypeId::of::<T>())
            .ok_or_else(|| ArenaError::UnregisteredType {
                type_name: T::type_name().into_owned(),
            })
    }

    fn table_by_key(&self, key: TableKey) -> Result<&Table, ArenaError> {
        self.tables
            .get(&key.type_id)
            .ok_or_else(|| ArenaError::UnregisteredType {
                type_name: format!("{:?}", key.type_id),
            })
    }

    fn table_by_key_mut(&mut self, key: TableKey) -> Result<&mut Table, ArenaError> {
        self.tables
            .get_mut(&key.type_id)
            .ok_or_else(|| ArenaError::UnregisteredType {
                type_name: format!("{:?}", key.type_id),
            })
    }

    /// Whether `T` is declared in this context.
    pub fn is_registered<T: Record>(&self) -> bool {
        self.tables.contains_key(&TypeId::of::<T>())
    }

    /// All tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Allocate a fixed-size record.
    pub fn allocate<T: Plain>(&mut self, value: T) -> Result<Ref<T>, ArenaError> {
        self.table_mut::<T>()?.allocate(&value)
    }

    /// Read the record behind `r`.
    pub fn get<T: Plain>(&self, r: Ref<T>) -> Result<T, ArenaError> {
        let table = self.table::<T>()?;
        table.check_record_start(r.offset())?;
        table.read(r.offset())
    }

    /// Overwrite the record behind `r`.
    pub fn set<T: Plain>(&mut self, r: Ref<T>, value: T) -> Result<(), ArenaError> {
        let table = self.table_mut::<T>()?;
        table.check_record_start(r.offset())?;
        table.write(r.offset(), &value)
    }

    /// Read the value a cursor addresses.
    pub fn read_at<V: Plain>(&self, cursor: Cursor<V>) -> Result<V, ArenaError> {
        self.table_by_key(cursor.erase().table)?
            .read(cursor.offset())
    }

    /// Overwrite the value a cursor addresses.
    pub fn write_at<V: Plain>(&mut self, cursor: Cursor<V>, value: V) -> Result<(), ArenaError> {
        self.table_by_key_mut(cursor.erase().table)?
            .write(cursor.offset(), &value)
    }

    /// Logical bytes allocated across all tables.
    pub fn allocated_bytes(&self) -> usize {
        self.tables.values().map(Table::allocated_bytes).sum()
    }

    /// Memory held by all table pages in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.tables.values().map(Table::memory_bytes).sum()
    }

    /// Per-table checksums, keyed by type identifier, in declaration order.
    pub fn checksums(&self) -> IndexMap<String, u64> {
        self.tables
            .values()
            .map(|t| (t.type_name().to_string(), t.checksum()))
            .collect()
    }

    /// Serialize every table in declaration order.
    pub fn write_to(&self, w: &mut dyn Write) -> Result<(), ArenaError> {
        write_len_i32(w, self.tables.len(), "table_count")?;
        for table in self.tables.values() {
            write_length_prefixed_str(w, table.type_name())?;
            table.write_to(w)?;
        }
        Ok(())
    }
}

/// Shared handle to a context.
///
/// Cloning is cheap and yields a handle to the same tables. The data is
/// guarded by a reader-writer lock: concurrent readers are fine, writers
/// are exclusive. Do not call ambient accessors (e.g. [`Ref::get`]) from
/// inside [`Context::read`] or [`Context::write`] closures on the same
/// context: the lock is not re-entrant.
#[derive(Clone)]
pub struct Context {
    id: ContextId,
    data: Arc<RwLock<ContextData>>,
}

impl Context {
    /// Start declaring a new context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    fn from_data(data: ContextData) -> Self {
        Self {
            id: data.id,
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// This context's unique ID.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Whether two handles refer to the same context.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Run `f` with shared access to the context data.
    pub fn read<R>(&self, f: impl FnOnce(&ContextData) -> R) -> R {
        f(&self.data.read())
    }

    /// Run `f` with exclusive access to the context data.
    pub fn write<R>(&self, f: impl FnOnce(&mut ContextData) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Make this the current context until the returned scope is dropped.
    pub fn enter(&self) -> Scope {
        Scope::enter(self)
    }

    /// Allocate a fixed-size record.
    pub fn allocate<T: Plain>(&self, value: T) -> Result<Ref<T>, ArenaError> {
        self.write(|data| data.allocate(value))
    }

    /// Read the record behind `r`.
    pub fn get<T: Plain>(&self, r: Ref<T>) -> Result<T, ArenaError> {
        self.read(|data| data.get(r))
    }

    /// Overwrite the record behind `r`.
    pub fn set<T: Plain>(&self, r: Ref<T>, value: T) -> Result<(), ArenaError> {
        self.write(|data| data.set(r, value))
    }

    /// Intern a string.
    pub fn allocate_string(&self, value: &str) -> Result<Ref<StringRecord>, ArenaError> {
        self.write(|data| data.allocate_string(value))
    }

    /// Serialize the whole context.
    pub fn write_to(&self, w: &mut dyn Write) -> Result<(), ArenaError> {
        self.read(|data| data.write_to(w))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ByteReader, ByteWriter};
    use std::borrow::Cow;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Node {
        weight: i32,
        next: Ref<Node>,
    }

    impl Plain for Node {
        const SIZE: usize = 8;

        fn type_name() -> Cow<'static, str> {
            "Node".into()
        }

        fn encode(&self, w: &mut ByteWriter<'_>) {
            w.put_i32(self.weight);
            w.put(&self.next);
        }

        fn decode(r: &mut ByteReader<'_>) -> Self {
            Node {
                weight: r.get_i32(),
                next: r.get(),
            }
        }
    }

    fn node_context() -> Context {
        ContextBuilder::new()
            .with_type::<Node>()
            .with_capacity::<Node>(4)
            .build()
            .unwrap()
    }

    #[test]
    fn unregistered_type_is_configuration_error() {
        let ctx = node_context();
        let err = ctx.allocate(5u64).unwrap_err();
        assert!(matches!(err, ArenaError::UnregisteredType { .. }));
    }

    #[test]
    fn duplicate_type_rejected() {
        let err = ContextBuilder::new()
            .with_type::<Node>()
            .with_type::<Node>()
            .build()
            .unwrap_err();
        assert!(matches!(err, ArenaError::DuplicateType { .. }));
    }

    #[test]
    fn duplicate_map_declaration_rejected() {
        let err = ContextBuilder::new()
            .with_map::<i32>()
            .with_vector::<MapEntry<i32>>()
            .build()
            .unwrap_err();
        assert!(matches!(err, ArenaError::DuplicateType { .. }));
    }

    #[test]
    fn linked_records_resolve_explicitly() {
        let ctx = node_context();
        let tail = ctx
            .allocate(Node {
                weight: 2,
                next: Ref::null(),
            })
            .unwrap();
        let head = ctx.allocate(Node { weight: 1, next: tail }).unwrap();
        let first = ctx.get(head).unwrap();
        assert_eq!(first.weight, 1);
        let second = ctx.get(first.next).unwrap();
        assert_eq!(second.weight, 2);
        assert!(matches!(
            ctx.get(second.next),
            Err(ArenaError::NullRef { .. })
        ));
    }

    #[test]
    fn misaligned_ref_is_rejected() {
        let ctx = node_context();
        ctx.allocate(Node {
            weight: 1,
            next: Ref::null(),
        })
        .unwrap();
        let bogus = Ref::<Node>::from_offset(4);
        assert!(matches!(ctx.get(bogus), Err(ArenaError::InvalidRef { .. })));
    }

    #[test]
    fn offsets_survive_round_trip() {
        let ctx = node_context();
        let mut refs = Vec::new();
        for i in 0..10 {
            let prev = refs.last().copied().unwrap_or_else(Ref::null);
            refs.push(ctx.allocate(Node { weight: i, next: prev }).unwrap());
        }
        let mut buf = Vec::new();
        ctx.write_to(&mut buf).unwrap();

        let loaded = ContextBuilder::new()
            .with_type::<Node>()
            .read_from(&mut buf.as_slice())
            .unwrap();
        assert_ne!(loaded.id(), ctx.id());
        for (i, r) in refs.iter().enumerate() {
            let node = loaded.get(*r).unwrap();
            assert_eq!(node.weight, i as i32);
        }
        let last = loaded.get(refs[9]).unwrap();
        assert_eq!(loaded.get(last.next).unwrap().weight, 8);
        let err = loaded
            .allocate(Node {
                weight: 0,
                next: Ref::null(),
            })
            .unwrap_err();
        assert!(matches!(err, ArenaError::ReadOnlyTable { .. }));
    }

    #[test]
    fn unknown_type_in_stream() {
        let ctx = node_context();
        let mut buf = Vec::new();
        ctx.write_to(&mut buf).unwrap();
        let err = ContextBuilder::new()
            .with_type::<u32>()
            .read_from(&mut buf.as_slice())
            .unwrap_err();
        assert!(matches!(err, ArenaError::UnknownTypeId { .. }));
    }

    #[test]
    fn resave_is_byte_identical() {
        let ctx = node_context();
        for i in 0..6 {
            ctx.allocate(Node {
                weight: i,
                next: Ref::null(),
            })
            .unwrap();
        }
        let mut first = Vec::new();
        ctx.write_to(&mut first).unwrap();
        let loaded = ContextBuilder::new()
            .with_type::<Node>()
            .read_from(&mut first.as_slice())
            .unwrap();
        let mut second = Vec::new();
        loaded.write_to(&mut second).unwrap();
        assert_eq!(first, second);
        let before = ctx.read(|d| d.checksums());
        let after = loaded.read(|d| d.checksums());
        assert_eq!(before, after);
    }

    #[test]
    fn handles_share_data() {
        let ctx = node_context();
        let other = ctx.clone();
        assert!(ctx.same_as(&other));
        let r = other
            .allocate(Node {
                weight: 3,
                next: Ref::null(),
            })
            .unwrap();
        assert_eq!(ctx.get(r).unwrap().weight, 3);
        assert!(!ctx.same_as(&node_context()));
    }
}
