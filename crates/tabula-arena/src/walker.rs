//! Record enumeration and diagnostic dumps.
//!
//! [`RecordWalker`] visits every record of every table in declaration order,
//! then allocation order. [`dump`] renders the same walk as text, one line
//! per record with a hex preview of its leading bytes.

use std::fmt;

use crate::context::ContextData;
use crate::table::Table;

/// Leading bytes shown per record in a [`dump`].
pub const PREVIEW_BYTES: usize = 16;

/// One record found by a [`RecordWalker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordInfo<'a> {
    /// Type identifier of the record's table.
    pub type_name: &'a str,
    /// Position in allocation order within its table.
    pub index: usize,
    /// Logical offset within its table.
    pub offset: i32,
    /// Stored length in bytes, or `None` if the header is unreadable.
    pub len: Option<usize>,
}

/// Iterator over every record in a context.
pub struct RecordWalker<'a> {
    tables: Box<dyn Iterator<Item = &'a Table> + 'a>,
    current: Option<&'a Table>,
    index: usize,
}

impl<'a> RecordWalker<'a> {
    /// Walk `data`.
    pub fn new(data: &'a ContextData) -> Self {
        Self {
            tables: Box::new(data.tables()),
            current: None,
            index: 0,
        }
    }
}

impl<'a> Iterator for RecordWalker<'a> {
    type Item = RecordInfo<'a>;

    fn next(&mut self) -> Option<RecordInfo<'a>> {
        loop {
            if let Some(table) = self.current {
                if let Some(&offset) = table.offsets().get(self.index) {
                    let index = self.index;
                    self.index += 1;
                    return Some(RecordInfo {
                        type_name: table.type_name(),
                        index,
                        offset,
                        len: table.record_len(offset).ok(),
                    });
                }
            }
            self.current = Some(self.tables.next()?);
            self.index = 0;
        }
    }
}

impl ContextData {
    /// Walk every record of every table.
    pub fn walk(&self) -> RecordWalker<'_> {
        RecordWalker::new(self)
    }
}

/// Write a per-table, per-record summary of `data` to `out`.
pub fn dump(data: &ContextData, out: &mut impl fmt::Write) -> fmt::Result {
    writeln!(out, "context {}", data.id())?;
    for table in data.tables() {
        writeln!(
            out,
            "table {}: {} records, {} bytes in {} page(s) of {}{}",
            table.type_name(),
            table.record_count(),
            table.allocated_bytes(),
            table.page_count(),
            table.page_bytes(),
            if table.is_read_only() { ", read-only" } else { "" },
        )?;
        for (index, &offset) in table.offsets().iter().enumerate() {
            match table.record_len(offset) {
                Ok(len) => {
                    write!(out, "  #{index} @{offset} len={len}")?;
                    if let Ok(bytes) = table.bytes(offset, len.min(PREVIEW_BYTES)) {
                        write!(out, " ")?;
                        for b in bytes {
                            write!(out, "{b:02x}")?;
                        }
                        if len > PREVIEW_BYTES {
                            write!(out, "..")?;
                        }
                    }
                    writeln!(out)?;
                }
                Err(e) => writeln!(out, "  #{index} @{offset} unreadable: {e}")?,
            }
        }
    }
    Ok(())
}
