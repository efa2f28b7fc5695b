//! Byte-arena record storage with offset references.
//!
//! Every record type gets its own [`Table`]: a list of fixed-size pages into
//! which records are bump-allocated. Records refer to each other with
//! [`Ref<T>`], a byte offset into the target's table rather than a native
//! address, so a whole [`Context`] can be written to a stream and read back
//! with every reference intact.
//!
//! # Architecture
//!
//! ```text
//! Context (Arc<RwLock<ContextData>>, cheap to clone)
//! └── ContextData
//!     ├── Table × N (one per declared record type, declaration order)
//!     │   ├── TypeLayout (validated once at declaration)
//!     │   ├── Page[] (fixed byte size; records never span pages)
//!     │   └── record-start offsets (allocation order)
//!     └── StringIndex (interning map + decode cache, rebuilt on load)
//!
//! Scope (guard) ── makes a Context current for the ambient accessors
//! ```
//!
//! Client record types are either [`Plain`] (fixed size) or declare a
//! header plus trailing-element layout directly through [`Record`]; the
//! latter are allocated with [`ContextData::allocate_record`] and their
//! elements reached through bounds-checked cursors.
//!
//! On top of tables sit three engine-defined record kinds: interned
//! strings ([`StringRecord`]), block-chained vectors ([`Vector`]) and
//! integer-keyed hash maps ([`IntMap`]).
//!
//! # Two access styles
//!
//! - **Explicit:** methods on [`ContextData`] take the context as a
//!   parameter, reached through [`Context::read`] / [`Context::write`].
//! - **Ambient:** methods on [`Ref`], [`Vector`], [`IntMap`] and
//!   [`Cursor`] resolve against the context made current by the innermost
//!   live [`Scope`].
//!
//! No `unsafe`: records are encoded and decoded field by field through the
//! [`Plain`] codec.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod hash;
pub mod intmap;
pub mod layout;
pub mod page;
pub mod ptr;
pub mod record;
pub mod scope;
pub mod string;
pub mod table;
pub mod vector;
pub mod walker;

// Public re-exports for the primary API surface.
pub use config::{ContextConfig, TableConfig};
pub use context::{Context, ContextBuilder, ContextData, ContextId};
pub use error::{ArenaError, ErrorKind};
pub use intmap::{IntMap, MapEntry, MapHead, MapView, MapViewMut};
pub use layout::{ByteReader, ByteWriter, Plain, Record, RecordLayout, SizeClass, TypeLayout};
pub use ptr::{Cursor, RawCursor, Ref, TableKey};
pub use scope::{Scope, ScopePolicy};
pub use string::StringRecord;
pub use table::Table;
pub use vector::{Vector, VectorBlock, VectorIter, VectorView, VectorViewMut};
pub use walker::{dump, RecordInfo, RecordWalker};
