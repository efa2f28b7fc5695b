//! Record layouts and the fixed-size field codec.
//!
//! Records live in tables as raw little-endian bytes. A type describes how
//! it maps onto those bytes in two ways:
//!
//! - [`Plain`]: a fixed-size value with an explicit encoder/decoder. Every
//!   `Plain` type is automatically a fixed-size [`Record`], and `Plain`
//!   values are what vectors and maps store inline.
//! - [`Record`]: anything that can own a table. Variable-size records
//!   (strings, vector blocks, map heads) describe a fixed header followed by
//!   a trailing element array whose populated length is read from the header.
//!
//! The [`TypeLayout`] descriptor is computed and validated once per type
//! when the type is registered with a context, then cached by its table.

use std::any::TypeId;
use std::borrow::Cow;

use crate::error::ArenaError;

/// Sequential little-endian writer over a record's byte slice.
///
/// Writes past the end of the slice are dropped and remembered; the table
/// reports them as [`ArenaError::InvalidLayout`] after encoding.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflow: bool,
}

impl<'a> ByteWriter<'a> {
    /// Create a writer positioned at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: false,
        }
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            self.overflow = true;
            return;
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    /// Append a byte.
    pub fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    /// Append a little-endian i16.
    pub fn put_i16(&mut self, v: i16) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian u16.
    pub fn put_u16(&mut self, v: u16) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian i32.
    pub fn put_i32(&mut self, v: i32) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian u32.
    pub fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian i64.
    pub fn put_i64(&mut self, v: i64) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian u64.
    pub fn put_u64(&mut self, v: u64) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian f32.
    pub fn put_f32(&mut self, v: f32) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a little-endian f64.
    pub fn put_f64(&mut self, v: f64) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// Append a nested [`Plain`] value occupying exactly `T::SIZE` bytes.
    pub fn put<T: Plain>(&mut self, value: &T) {
        let end = self.pos + T::SIZE;
        if end > self.buf.len() {
            self.overflow = true;
            return;
        }
        let mut nested = ByteWriter::new(&mut self.buf[self.pos..end]);
        value.encode(&mut nested);
        if nested.overflow || nested.pos != T::SIZE {
            self.overflow = true;
        }
        self.pos = end;
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the slice was filled exactly, with no dropped writes.
    pub fn is_exact(&self) -> bool {
        !self.overflow && self.pos == self.buf.len()
    }

    /// Whether any write ran past the end of the slice and was dropped.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }
}

/// Sequential little-endian reader over a record's byte slice.
///
/// Reads past the end yield zero and are remembered, mirroring [`ByteWriter`].
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    overflow: bool,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: false,
        }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let end = self.pos + N;
        if end > self.buf.len() {
            self.overflow = true;
            return out;
        }
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        out
    }

    /// Read a byte.
    pub fn get_u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    /// Read a little-endian i16.
    pub fn get_i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    /// Read a little-endian u16.
    pub fn get_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    /// Read a little-endian i32.
    pub fn get_i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    /// Read a little-endian u32.
    pub fn get_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    /// Read a little-endian i64.
    pub fn get_i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }

    /// Read a little-endian u64.
    pub fn get_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    /// Read a little-endian f32.
    pub fn get_f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    /// Read a little-endian f64.
    pub fn get_f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take())
    }

    /// Read a nested [`Plain`] value occupying exactly `T::SIZE` bytes.
    pub fn get<T: Plain>(&mut self) -> T {
        let end = self.pos + T::SIZE;
        if end > self.buf.len() {
            self.overflow = true;
            let zeroed = vec![0u8; T::SIZE];
            return T::decode(&mut ByteReader::new(&zeroed));
        }
        let mut nested = ByteReader::new(&self.buf[self.pos..end]);
        let value = T::decode(&mut nested);
        if nested.overflow || nested.pos != T::SIZE {
            self.overflow = true;
        }
        self.pos = end;
        value
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the slice was consumed exactly, with no short reads.
    pub fn is_exact(&self) -> bool {
        !self.overflow && self.pos == self.buf.len()
    }
}

/// A fixed-size value with an explicit little-endian byte layout.
///
/// Implementors write exactly [`Plain::SIZE`] bytes in `encode` and read
/// the same bytes back in `decode`. A codec that disagrees with its size is
/// rejected with [`ArenaError::InvalidLayout`] the first time it is used.
///
/// ```
/// use std::borrow::Cow;
/// use tabula_arena::{ByteReader, ByteWriter, Plain};
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// struct Point { x: i32, y: i32 }
///
/// impl Plain for Point {
///     const SIZE: usize = 8;
///     fn type_name() -> Cow<'static, str> { "Point".into() }
///     fn encode(&self, w: &mut ByteWriter<'_>) { w.put_i32(self.x); w.put_i32(self.y); }
///     fn decode(r: &mut ByteReader<'_>) -> Self { Point { x: r.get_i32(), y: r.get_i32() } }
/// }
/// ```
pub trait Plain: Copy + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Byte position of an `i32` field that receives the record's own
    /// offset right after allocation, when the value is stored as a record.
    const SELF_OFFSET: Option<usize> = None;

    /// Stable identifier used in the container format.
    fn type_name() -> Cow<'static, str>;

    /// Write the value's fields.
    fn encode(&self, w: &mut ByteWriter<'_>);

    /// Read the value's fields.
    fn decode(r: &mut ByteReader<'_>) -> Self;
}

macro_rules! impl_plain_primitive {
    ($ty:ty, $name:literal, $put:ident, $get:ident) => {
        impl Plain for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn type_name() -> Cow<'static, str> {
                Cow::Borrowed($name)
            }

            fn encode(&self, w: &mut ByteWriter<'_>) {
                w.$put(*self);
            }

            fn decode(r: &mut ByteReader<'_>) -> Self {
                r.$get()
            }
        }
    };
}

impl_plain_primitive!(u8, "u8", put_u8, get_u8);
impl_plain_primitive!(i16, "i16", put_i16, get_i16);
impl_plain_primitive!(u16, "u16", put_u16, get_u16);
impl_plain_primitive!(i32, "i32", put_i32, get_i32);
impl_plain_primitive!(u32, "u32", put_u32, get_u32);
impl_plain_primitive!(i64, "i64", put_i64, get_i64);
impl_plain_primitive!(u64, "u64", put_u64, get_u64);
impl_plain_primitive!(f32, "f32", put_f32, get_f32);
impl_plain_primitive!(f64, "f64", put_f64, get_f64);

impl Plain for bool {
    const SIZE: usize = 1;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("bool")
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_u8(u8::from(*self));
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        r.get_u8() != 0
    }
}

/// Encode `value` into `out`, which must be exactly `T::SIZE` bytes.
pub(crate) fn encode_plain<T: Plain>(value: &T, out: &mut [u8]) -> Result<(), ArenaError> {
    let mut w = ByteWriter::new(out);
    value.encode(&mut w);
    if !w.is_exact() {
        return Err(ArenaError::InvalidLayout {
            type_name: T::type_name().into_owned(),
            reason: format!(
                "encoder wrote {} bytes, declared size is {}",
                w.position(),
                T::SIZE
            ),
        });
    }
    Ok(())
}

/// Decode a `T` from `bytes`, which must be exactly `T::SIZE` bytes.
pub(crate) fn decode_plain<T: Plain>(bytes: &[u8]) -> Result<T, ArenaError> {
    let mut r = ByteReader::new(bytes);
    let value = T::decode(&mut r);
    if !r.is_exact() {
        return Err(ArenaError::InvalidLayout {
            type_name: T::type_name().into_owned(),
            reason: format!(
                "decoder read {} bytes, declared size is {}",
                r.position(),
                T::SIZE
            ),
        });
    }
    Ok(value)
}

/// Read a little-endian i32 at `pos` within a record's bytes.
pub(crate) fn read_i32_at(bytes: &[u8], pos: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[pos..pos + 4]);
    i32::from_le_bytes(raw)
}

/// Write a little-endian i32 at `pos` within a record's bytes.
pub(crate) fn write_i32_at(bytes: &mut [u8], pos: usize, v: i32) {
    bytes[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

/// How many bytes one record of a type occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeClass {
    /// Every record has the same length.
    Fixed {
        /// Record length in bytes.
        size: usize,
    },
    /// A fixed header followed by a trailing element array.
    Variable {
        /// Header length in bytes.
        header: usize,
        /// Length of one trailing element in bytes.
        element: usize,
        /// Position of the `i32` header field holding the element count.
        count_at: usize,
    },
}

/// Byte layout of a record type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    /// Fixed or variable sizing.
    pub class: SizeClass,
    /// Position of the `i32` field patched with the record's own offset.
    pub self_offset: Option<usize>,
}

impl RecordLayout {
    /// A fixed-size layout with no self-offset field.
    pub const fn fixed(size: usize) -> Self {
        Self {
            class: SizeClass::Fixed { size },
            self_offset: None,
        }
    }

    /// A header plus trailing-array layout.
    pub const fn variable(header: usize, element: usize, count_at: usize) -> Self {
        Self {
            class: SizeClass::Variable {
                header,
                element,
                count_at,
            },
            self_offset: None,
        }
    }

    /// Designate the field that receives the record's own offset.
    pub const fn with_self_offset(mut self, position: Option<usize>) -> Self {
        self.self_offset = position;
        self
    }

    /// Whether record lengths depend on their contents.
    pub fn is_variable(&self) -> bool {
        matches!(self.class, SizeClass::Variable { .. })
    }

    /// The size recorded in the container format and used to size pages.
    ///
    /// For variable layouts this is the header plus a single element.
    pub fn nominal_size(&self) -> usize {
        match self.class {
            SizeClass::Fixed { size } => size,
            SizeClass::Variable {
                header, element, ..
            } => header + element,
        }
    }

    /// Length of the fixed part every record carries.
    pub fn header_size(&self) -> usize {
        match self.class {
            SizeClass::Fixed { size } => size,
            SizeClass::Variable { header, .. } => header,
        }
    }

    /// Stored length of a record whose bytes start with `header`.
    ///
    /// Returns `None` when the header is shorter than the layout requires
    /// or its count field is negative.
    pub fn stored_len(&self, header: &[u8]) -> Option<usize> {
        match self.class {
            SizeClass::Fixed { size } => Some(size),
            SizeClass::Variable {
                header: header_len,
                element,
                count_at,
            } => {
                if header.len() < header_len {
                    return None;
                }
                let count = usize::try_from(read_i32_at(header, count_at)).ok()?;
                count.checked_mul(element)?.checked_add(header_len)
            }
        }
    }

    /// Bytes required for a variable record holding `count` elements.
    pub fn size_for(&self, count: usize) -> usize {
        match self.class {
            SizeClass::Fixed { size } => size,
            SizeClass::Variable {
                header, element, ..
            } => header + count * element,
        }
    }

    fn validate(&self, type_name: &str) -> Result<(), ArenaError> {
        let invalid = |reason: String| ArenaError::InvalidLayout {
            type_name: type_name.to_string(),
            reason,
        };
        let header = match self.class {
            SizeClass::Fixed { size } => {
                if size == 0 {
                    return Err(invalid("fixed record size is zero".into()));
                }
                size
            }
            SizeClass::Variable {
                header,
                element,
                count_at,
            } => {
                if element == 0 {
                    return Err(invalid("trailing element size is zero".into()));
                }
                if count_at + 4 > header {
                    return Err(invalid(format!(
                        "count field at {count_at} lies outside the {header}-byte header"
                    )));
                }
                header
            }
        };
        if self.nominal_size() > i32::MAX as usize {
            return Err(invalid("record size does not fit in i32".into()));
        }
        if let Some(pos) = self.self_offset {
            if pos + 4 > header {
                return Err(invalid(format!(
                    "self-offset field at {pos} lies outside the {header}-byte header"
                )));
            }
        }
        Ok(())
    }
}

/// A type that can own a table in a context.
///
/// Implemented automatically for every [`Plain`] type; the engine's own
/// variable-size records (strings, vector blocks, map heads) implement it
/// directly.
pub trait Record: 'static {
    /// Stable identifier used in the container format.
    fn type_name() -> Cow<'static, str>;

    /// Byte layout of every record of this type.
    fn layout() -> RecordLayout;
}

impl<T: Plain> Record for T {
    fn type_name() -> Cow<'static, str> {
        <T as Plain>::type_name()
    }

    fn layout() -> RecordLayout {
        RecordLayout::fixed(T::SIZE).with_self_offset(T::SELF_OFFSET)
    }
}

/// Cached, validated layout descriptor for one record type.
#[derive(Clone, Debug)]
pub struct TypeLayout {
    /// Rust type identity, used to find the type's table.
    pub type_id: TypeId,
    /// Container-format identifier.
    pub type_name: String,
    /// Validated byte layout.
    pub layout: RecordLayout,
}

impl TypeLayout {
    /// Compute and validate the descriptor for `T`.
    pub fn of<T: Record>() -> Result<Self, ArenaError> {
        let type_name = T::type_name().into_owned();
        let layout = T::layout();
        layout.validate(&type_name)?;
        Ok(Self {
            type_id: TypeId::of::<T>(),
            type_name,
            layout,
        })
    }
}
