//! Legacy binary workbooks (`.xls`, BIFF7 and BIFF8)
//!
//! The workbook stream is pulled out of the compound file, decoded in one pass
//! into [`Workbook`], and then served row by row through
//! [`SpreadsheetReader`].

pub mod format;
pub mod records;
pub mod sheet;
pub mod strings;
pub mod style;
pub mod workbook;

pub use sheet::{ColumnInfo, Hyperlink, MergedRange, RowInfo, Sheet};
pub use workbook::{BoundSheet, Globals, Workbook};

use crate::config::ReaderConfig;
use crate::error::{Result, SheetError};
use crate::ole::CompoundFile;
use crate::reader::{SpreadsheetReader, StreamCursor};
use std::path::Path;

/// BIFF revision announced by the globals BOF record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiffVersion {
    /// Excel 5.0 / 95, codepage strings
    Biff7,
    /// Excel 97 and later, unicode strings and the SST
    Biff8,
}

/// Row cursor over a decoded `.xls` workbook
///
/// # Examples
///
/// ```no_run
/// use sheetstream::reader::SpreadsheetReader;
/// use sheetstream::xls::XlsReader;
///
/// let mut reader = XlsReader::open("legacy.xls")?;
/// println!("Sheets: {:?}", reader.sheets());
/// while let Some(row) = reader.next()? {
///     println!("{:?}", row);
/// }
/// # Ok::<(), sheetstream::SheetError>(())
/// ```
#[derive(Debug)]
pub struct XlsReader {
    workbook: Workbook,
    sheet: usize,
    /// Next row handed to the cursor
    next_row: usize,
    cursor: StreamCursor,
}

impl XlsReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        let compound = CompoundFile::open_path(path)?;
        let stream = compound.workbook_stream()?;
        Self::from_workbook_stream(&stream, &config)
    }

    /// Decode a BIFF stream that was already extracted from its container
    pub fn from_workbook_stream(stream: &[u8], config: &ReaderConfig) -> Result<Self> {
        Ok(XlsReader {
            workbook: Workbook::parse(stream, config)?,
            sheet: 0,
            next_row: 0,
            cursor: StreamCursor::new(),
        })
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// The sheet the cursor is on
    pub fn active_sheet(&self) -> Option<&Sheet> {
        self.workbook.sheet(self.sheet)
    }

    fn sheet_not_found(&self, index: usize) -> SheetError {
        SheetError::SheetNotFound {
            index,
            available: self.workbook.sheets().len(),
        }
    }
}

/// Pull the next row of `sheet`, `None` past its row count
fn pull_row(sheet: &Sheet, next_row: &mut usize) -> Option<Vec<String>> {
    if *next_row >= sheet.row_count() {
        return None;
    }
    let row = sheet.row_values(*next_row);
    *next_row += 1;
    Some(row)
}

impl SpreadsheetReader for XlsReader {
    fn sheets(&self) -> &[String] {
        self.workbook.sheet_names()
    }

    fn change_sheet(&mut self, index: usize) -> Result<()> {
        if self.workbook.sheet(index).is_none() {
            return Err(self.sheet_not_found(index));
        }
        self.sheet = index;
        self.rewind()
    }

    fn rewind(&mut self) -> Result<()> {
        self.next_row = 0;
        self.cursor.reset();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<&[String]>> {
        let sheet = match self.workbook.sheet(self.sheet) {
            Some(sheet) => sheet,
            None => return Err(self.sheet_not_found(self.sheet)),
        };
        let next_row = &mut self.next_row;
        self.cursor.next(|| Ok(pull_row(sheet, next_row)))
    }

    fn current(&mut self) -> Result<Option<&[String]>> {
        let sheet = match self.workbook.sheet(self.sheet) {
            Some(sheet) => sheet,
            None => return Err(self.sheet_not_found(self.sheet)),
        };
        let next_row = &mut self.next_row;
        self.cursor.current(|| Ok(pull_row(sheet, next_row)))
    }

    fn key(&self) -> usize {
        self.cursor.key()
    }

    fn valid(&self) -> bool {
        self.cursor.valid()
    }

    fn count(&self) -> usize {
        self.active_sheet().map_or(0, Sheet::row_count)
    }
}
