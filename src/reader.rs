//! Row cursor contract shared by every decoder
//!
//! All readers expose the same cursor: pick a sheet, then pull rows one at a
//! time. Rows are returned as display strings. `Some(&[])` is an empty row,
//! `None` means the sheet has no more rows.
//!
//! ```no_run
//! use sheetstream::reader::SpreadsheetReader;
//! use sheetstream::xlsx::XlsxReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reader = XlsxReader::open("data.xlsx")?;
//! reader.change_sheet(1)?;
//! for row in reader.rows()? {
//!     let row = row?;
//!     println!("Row {}: {:?}", row.index, row.cells);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SheetError};
use crate::types::Row;

/// Uniform row cursor over one sheet of a workbook
///
/// `key()` is a zero-based counter of `next()` calls since the last rewind. A
/// fresh cursor has decoded nothing: `current()` decodes the first row without
/// moving the key, `next()` decodes the row after the last one decoded. The
/// usual loop (`rewind`, then `current` and `next` in turn) sees row `i` at
/// key `i`; calling `next()` `k` times straight after a rewind lands on row
/// `k - 1` with key `k`.
pub trait SpreadsheetReader {
    /// Sheet names in workbook order
    fn sheets(&self) -> &[String];

    /// Select sheet `index` and rewind to its first row
    fn change_sheet(&mut self, index: usize) -> Result<()>;

    /// Reset the cursor to the first row of the current sheet
    fn rewind(&mut self) -> Result<()>;

    /// Decode the next row and bump the key
    fn next(&mut self) -> Result<Option<&[String]>>;

    /// Row under the cursor; on a fresh cursor this decodes the first row
    fn current(&mut self) -> Result<Option<&[String]>>;

    fn key(&self) -> usize;

    /// False once a decode attempt ran past the last row
    fn valid(&self) -> bool;

    /// Row count as the format knows it
    ///
    /// Binary workbooks report the declared sheet extent; XML packages only
    /// know how far they have been read (`key() + 1`).
    fn count(&self) -> usize;

    /// Move the cursor to key `position`
    ///
    /// Lands on the row `next()` would reach `position` times after a rewind.
    /// Positions behind the cursor rewind and replay forward. So does any seek
    /// from key 0, where `current()` may already have consumed a row.
    fn seek(&mut self, position: usize) -> Result<()> {
        if position < self.key() || position == 0 || self.key() == 0 {
            self.rewind()?;
        }

        while self.valid() && self.key() < position {
            self.next()?;
        }

        if self.key() == position && self.current()?.is_some() {
            Ok(())
        } else {
            Err(SheetError::SeekOutOfRange { position })
        }
    }

    /// Iterate the current sheet from its first row
    fn rows(&mut self) -> Result<Rows<'_, Self>>
    where
        Self: Sized,
    {
        self.rewind()?;
        Ok(Rows {
            reader: self,
            started: false,
            done: false,
        })
    }
}

/// Iterator returning [`Row`] structs from any [`SpreadsheetReader`]
pub struct Rows<'a, R: SpreadsheetReader> {
    reader: &'a mut R,
    started: bool,
    done: bool,
}

impl<'a, R: SpreadsheetReader> Iterator for Rows<'a, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = if self.started {
            self.reader.next()
        } else {
            self.started = true;
            self.reader.current()
        };

        let cells = match result {
            Ok(Some(cells)) => cells.to_vec(),
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        Some(Ok(Row::new(self.reader.key(), cells)))
    }
}

/// Cursor state shared by the decoders
///
/// `pull` closures decode the next row from the underlying stream and return
/// `None` at the end of the sheet.
#[derive(Debug)]
pub(crate) struct StreamCursor {
    key: usize,
    row: Option<Vec<String>>,
    valid: bool,
}

impl StreamCursor {
    pub(crate) fn new() -> Self {
        StreamCursor {
            key: 0,
            row: None,
            valid: true,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = StreamCursor::new();
    }

    pub(crate) fn key(&self) -> usize {
        self.key
    }

    pub(crate) fn valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn current<F>(&mut self, pull: F) -> Result<Option<&[String]>>
    where
        F: FnOnce() -> Result<Option<Vec<String>>>,
    {
        if self.row.is_none() && self.valid {
            self.row = pull()?;
            self.valid = self.row.is_some();
        }
        Ok(self.row.as_deref())
    }

    pub(crate) fn next<F>(&mut self, pull: F) -> Result<Option<&[String]>>
    where
        F: FnOnce() -> Result<Option<Vec<String>>>,
    {
        self.key += 1;
        self.row = None;
        if self.valid {
            self.row = pull()?;
            self.valid = self.row.is_some();
        }
        Ok(self.row.as_deref())
    }
}
