//! Little-endian primitives for the container format.
//!
//! All integers are little-endian. Strings are UTF-8 prefixed with a `u32`
//! byte length. There is no magic, version byte or padding: a container is
//! a table count followed by each table's type identifier and sub-format.
//!
//! ```text
//! table_count            : i32
//! repeat table_count times:
//!   record_type_id       : u32 length + UTF-8 bytes
//!   total_allocated_bytes: i32
//!   fixed_or_nominal_size: i32
//!   record_count         : i32
//!   record_offsets       : i32 * record_count
//!   raw_bytes            : total_allocated_bytes bytes
//! ```

use std::io::{Read, Write};

use crate::error::ArenaError;

/// Longest type identifier accepted when reading.
pub const MAX_TYPE_NAME_LEN: usize = 4096;

/// Write a little-endian i32.
pub fn write_i32_le(w: &mut dyn Write, v: i32) -> Result<(), ArenaError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a `usize` as a little-endian i32, rejecting values that do not fit.
pub fn write_len_i32(w: &mut dyn Write, v: usize, what: &str) -> Result<(), ArenaError> {
    let v = i32::try_from(v).map_err(|_| ArenaError::corrupt(format!("{what} {v} exceeds i32")))?;
    write_i32_le(w, v)
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), ArenaError> {
    let len = u32::try_from(s.len())
        .map_err(|_| ArenaError::corrupt("string longer than u32::MAX bytes"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Read a little-endian i32. `what` names the field for truncation errors.
pub fn read_i32_le(r: &mut dyn Read, what: &str) -> Result<i32, ArenaError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|e| ArenaError::from_read(e, what))?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian i32 that must not be negative.
pub fn read_len_i32(r: &mut dyn Read, what: &str) -> Result<usize, ArenaError> {
    let v = read_i32_le(r, what)?;
    usize::try_from(v).map_err(|_| ArenaError::corrupt(format!("negative {what}: {v}")))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read, what: &str) -> Result<String, ArenaError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)
        .map_err(|e| ArenaError::from_read(e, what))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_TYPE_NAME_LEN {
        return Err(ArenaError::corrupt(format!(
            "{what} length {len} exceeds {MAX_TYPE_NAME_LEN}"
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|e| ArenaError::from_read(e, what))?;
    String::from_utf8(buf)
        .map_err(|e| ArenaError::corrupt(format!("invalid UTF-8 in {what}: {e}")))
}

/// Read exactly `len` bytes without pre-allocating from an untrusted length.
pub fn read_exact_vec(r: &mut dyn Read, len: usize, what: &str) -> Result<Vec<u8>, ArenaError> {
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(ArenaError::Truncated {
            detail: format!("{what}: expected {len} bytes, got {}", buf.len()),
        });
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_is_little_endian() {
        let mut buf = Vec::new();
        write_i32_le(&mut buf, 0x0102_0304).unwrap();
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(read_i32_le(&mut buf.as_slice(), "x").unwrap(), 0x0102_0304);
    }

    #[test]
    fn negative_length_is_corrupt() {
        let mut buf = Vec::new();
        write_i32_le(&mut buf, -5).unwrap();
        let err = read_len_i32(&mut buf.as_slice(), "record_count").unwrap_err();
        assert!(matches!(err, ArenaError::Corrupt { .. }));
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_length_prefixed_str(&mut buf, "Vector<i32>").unwrap();
        assert_eq!(&buf[..4], &11u32.to_le_bytes());
        let s = read_length_prefixed_str(&mut buf.as_slice(), "type id").unwrap();
        assert_eq!(s, "Vector<i32>");
    }

    #[test]
    fn short_string_is_truncated() {
        let mut buf = Vec::new();
        write_length_prefixed_str(&mut buf, "Airport").unwrap();
        buf.truncate(6);
        let err = read_length_prefixed_str(&mut buf.as_slice(), "type id").unwrap_err();
        assert!(matches!(err, ArenaError::Truncated { .. }));
    }

    #[test]
    fn read_exact_vec_reports_short_stream() {
        let data = [1u8, 2, 3];
        let err = read_exact_vec(&mut data.as_slice(), 8, "raw bytes").unwrap_err();
        assert!(matches!(err, ArenaError::Truncated { .. }));
        let ok = read_exact_vec(&mut data.as_slice(), 2, "raw bytes").unwrap();
        assert_eq!(ok, [1, 2]);
    }
}
