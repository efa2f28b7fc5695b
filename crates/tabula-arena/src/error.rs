//! Arena-specific error types.
//!
//! Every failure in the engine is an [`ArenaError`]. Variants are grouped
//! by [`ErrorKind`] so callers can react to a class of failure (e.g. discard
//! a context after any `Data` error) without matching every variant.

use std::error::Error;
use std::fmt;
use std::io;

/// Broad classification of an [`ArenaError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A type or policy was declared incorrectly.
    Configuration,
    /// A single allocation can never fit in a page.
    Capacity,
    /// An index, offset or reference lies outside the populated region.
    Bounds,
    /// The operation is not permitted in the current state.
    State,
    /// A serialized stream is malformed, truncated or incompatible.
    Data,
    /// A collection-level contract was violated.
    Collection,
}

/// Errors that can occur during arena operations.
#[derive(Debug)]
pub enum ArenaError {
    /// A record type was used that the context does not declare.
    UnregisteredType {
        /// Name of the missing record type.
        type_name: String,
    },
    /// The same record type was declared twice on one context.
    DuplicateType {
        /// Name of the duplicated record type.
        type_name: String,
    },
    /// A record type's layout is unusable (zero size, a codec that
    /// disagrees with its declared size, a misplaced self-offset field).
    InvalidLayout {
        /// Name of the offending record type.
        type_name: String,
        /// Human-readable description of the problem.
        reason: String,
    },
    /// A configuration value is out of range.
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The scope policy was already fixed to a different value.
    ScopePolicyLocked {
        /// The policy in force.
        current: &'static str,
        /// The policy that was requested.
        requested: &'static str,
    },
    /// A single allocation is larger than the table's page.
    CapacityExceeded {
        /// Name of the table's record type.
        type_name: String,
        /// Number of bytes requested.
        requested: usize,
        /// Page size of the table in bytes.
        page_bytes: usize,
    },
    /// A byte range lies outside the table's allocated region.
    OutOfRange {
        /// Name of the table's record type.
        type_name: String,
        /// Start of the requested range.
        offset: i64,
        /// Length of the requested range.
        len: usize,
        /// Bytes allocated in the table so far.
        allocated: usize,
    },
    /// An element index is past the populated count of a collection.
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The populated count.
        len: usize,
    },
    /// A null reference was dereferenced.
    NullRef {
        /// Name of the referenced record type.
        type_name: String,
    },
    /// A reference does not point at the start of a record in its table.
    InvalidRef {
        /// Name of the referenced record type.
        type_name: String,
        /// The offending offset.
        offset: i32,
    },
    /// Allocation was attempted on a table loaded from a stream.
    ReadOnlyTable {
        /// Name of the table's record type.
        type_name: String,
    },
    /// A reference was resolved with no scope entered.
    NoCurrentContext,
    /// The stream contains inconsistent or impossible values.
    Corrupt {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The stream ended before its declared contents were read.
    Truncated {
        /// Human-readable description of what was being read.
        detail: String,
    },
    /// The stream names a record type the reading context does not declare.
    UnknownTypeId {
        /// The unresolvable type identifier.
        type_name: String,
    },
    /// A stored table was written with a different record layout.
    LayoutMismatch {
        /// Name of the table's record type.
        type_name: String,
        /// Record size found in the stream.
        stored: i32,
        /// Record size of the declared type.
        expected: usize,
    },
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// `add` found the key already present in the map.
    DuplicateKey {
        /// The duplicated key.
        key: i32,
    },
    /// The map has no entry for the key.
    KeyNotFound {
        /// The missing key.
        key: i32,
    },
}

impl ArenaError {
    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnregisteredType { .. }
            | Self::DuplicateType { .. }
            | Self::InvalidLayout { .. }
            | Self::InvalidConfig { .. }
            | Self::ScopePolicyLocked { .. } => ErrorKind::Configuration,
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
            Self::OutOfRange { .. }
            | Self::IndexOutOfRange { .. }
            | Self::NullRef { .. }
            | Self::InvalidRef { .. } => ErrorKind::Bounds,
            Self::ReadOnlyTable { .. } | Self::NoCurrentContext => ErrorKind::State,
            Self::Corrupt { .. }
            | Self::Truncated { .. }
            | Self::UnknownTypeId { .. }
            | Self::LayoutMismatch { .. }
            | Self::Io(_) => ErrorKind::Data,
            Self::DuplicateKey { .. } | Self::KeyNotFound { .. } => ErrorKind::Collection,
        }
    }

    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Map a read failure, turning a premature EOF into [`ArenaError::Truncated`].
    pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated {
                detail: format!("stream ended while reading {what}"),
            }
        } else {
            Self::Io(err)
        }
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredType { type_name } => {
                write!(f, "record type '{type_name}' is not registered in this context")
            }
            Self::DuplicateType { type_name } => {
                write!(f, "record type '{type_name}' is registered twice")
            }
            Self::InvalidLayout { type_name, reason } => {
                write!(f, "invalid layout for record type '{type_name}': {reason}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
            Self::ScopePolicyLocked { current, requested } => {
                write!(
                    f,
                    "scope policy already fixed to {current}, cannot switch to {requested}"
                )
            }
            Self::CapacityExceeded {
                type_name,
                requested,
                page_bytes,
            } => {
                write!(
                    f,
                    "allocation of {requested} bytes exceeds the {page_bytes}-byte page of table '{type_name}'"
                )
            }
            Self::OutOfRange {
                type_name,
                offset,
                len,
                allocated,
            } => {
                write!(
                    f,
                    "range {offset}..+{len} is outside the {allocated} allocated bytes of table '{type_name}'"
                )
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::NullRef { type_name } => write!(f, "null reference to '{type_name}'"),
            Self::InvalidRef { type_name, offset } => {
                write!(f, "offset {offset} is not a record start in table '{type_name}'")
            }
            Self::ReadOnlyTable { type_name } => {
                write!(f, "table '{type_name}' is read-only")
            }
            Self::NoCurrentContext => write!(f, "no context scope is active"),
            Self::Corrupt { detail } => write!(f, "corrupt stream: {detail}"),
            Self::Truncated { detail } => write!(f, "truncated stream: {detail}"),
            Self::UnknownTypeId { type_name } => {
                write!(f, "stream contains unknown record type '{type_name}'")
            }
            Self::LayoutMismatch {
                type_name,
                stored,
                expected,
            } => {
                write!(
                    f,
                    "layout mismatch for '{type_name}': stored record size {stored}, declared {expected}"
                )
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DuplicateKey { key } => write!(f, "duplicate key {key}"),
            Self::KeyNotFound { key } => write!(f, "key {key} not found"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ArenaError {
    fn from(e: io::Error) -> Self {
        Self::from_read(e, "stream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ArenaError::DuplicateKey { key: 3 }.kind(),
            ErrorKind::Collection
        );
        assert_eq!(ArenaError::NoCurrentContext.kind(), ErrorKind::State);
        assert_eq!(
            ArenaError::IndexOutOfRange { index: 4, len: 2 }.kind(),
            ErrorKind::Bounds
        );
        assert_eq!(ArenaError::corrupt("x").kind(), ErrorKind::Data);
    }

    #[test]
    fn eof_becomes_truncated() {
        let err = ArenaError::from_read(io::Error::from(io::ErrorKind::UnexpectedEof), "offsets");
        assert!(matches!(err, ArenaError::Truncated { .. }));
        let err = ArenaError::from_read(io::Error::from(io::ErrorKind::PermissionDenied), "x");
        assert!(matches!(err, ArenaError::Io(_)));
    }

    #[test]
    fn question_mark_on_eof_is_truncated() {
        fn read() -> Result<(), ArenaError> {
            Err(io::Error::from(io::ErrorKind::UnexpectedEof))?
        }
        assert!(matches!(read(), Err(ArenaError::Truncated { .. })));
        let err: ArenaError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, ArenaError::Io(_)));
    }

    #[test]
    fn display_mentions_type_name() {
        let err = ArenaError::ReadOnlyTable {
            type_name: "Airport".into(),
        };
        assert_eq!(err.to_string(), "table 'Airport' is read-only");
    }
}
