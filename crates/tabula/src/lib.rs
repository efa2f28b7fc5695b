//! Tabula: an in-memory binary record engine with bulk-copy persistence.
//!
//! This is the top-level facade crate that re-exports the public API of the
//! Tabula sub-crates. For most users, adding `tabula` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::borrow::Cow;
//! use tabula::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Station {
//!     name: Ref<StringRecord>,
//!     altitude_m: i32,
//!     readings: Vector<f32>,
//! }
//!
//! impl Plain for Station {
//!     const SIZE: usize = 12;
//!     fn type_name() -> Cow<'static, str> { "Station".into() }
//!     fn encode(&self, w: &mut ByteWriter<'_>) {
//!         w.put(&self.name);
//!         w.put_i32(self.altitude_m);
//!         w.put(&self.readings);
//!     }
//!     fn decode(r: &mut ByteReader<'_>) -> Self {
//!         Station { name: r.get(), altitude_m: r.get_i32(), readings: r.get() }
//!     }
//! }
//!
//! let declare = || {
//!     Context::builder()
//!         .with_type::<Station>()
//!         .with_vector::<f32>()
//!         .with_strings()
//! };
//!
//! let ctx = declare().build().unwrap();
//! let station = {
//!     let _scope = ctx.enter();
//!     let readings = Vector::<f32>::new(8).unwrap();
//!     readings.push(12.5).unwrap();
//!     readings.push(13.0).unwrap();
//!     let name = StringRecord::intern("Paradise").unwrap();
//!     Ref::new(Station { name, altitude_m: 1647, readings }).unwrap()
//! };
//!
//! // One bulk copy per table.
//! let mut bytes = Vec::new();
//! ctx.write_to(&mut bytes).unwrap();
//!
//! // Offsets taken before the save resolve in the reloaded context.
//! let loaded = declare().read_from(&mut bytes.as_slice()).unwrap();
//! let _scope = loaded.enter();
//! let s = station.get().unwrap();
//! assert_eq!(&*s.name.value().unwrap(), "Paradise");
//! assert_eq!(s.readings.to_vec().unwrap(), [12.5, 13.0]);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `tabula-arena` | Tables, references, contexts, scopes, collections, codec |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Record tables, references and collections (`tabula-arena`).
///
/// Most users only need the types in the [`prelude`]; reach into this
/// module for table internals, the container codec and the walker.
pub use tabula_arena as arena;

/// Common imports for typical Tabula usage.
///
/// ```rust
/// use tabula::prelude::*;
/// ```
pub mod prelude {
    // Contexts and scopes
    pub use tabula_arena::{
        Context, ContextBuilder, ContextConfig, ContextData, Scope, ScopePolicy, TableConfig,
    };

    // Records and references
    pub use tabula_arena::{ByteReader, ByteWriter, Cursor, Plain, Record, Ref};

    // Collections and strings
    pub use tabula_arena::{IntMap, MapEntry, StringRecord, Vector};

    // Errors
    pub use tabula_arena::{ArenaError, ErrorKind};
}
