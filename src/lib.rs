//! # sheetstream
//!
//! Row-at-a-time readers for spreadsheet files behind one cursor API.
//!
//! ## Features
//!
//! - **Legacy Excel**: `.xls` BIFF7/BIFF8 workbooks inside OLE compound files
//! - **OOXML**: `.xlsx` packages, with lazy shared strings for huge tables
//! - **OpenDocument**: `.ods` packages
//! - **Bounded Memory**: XML parts are pulled from disk one row at a time
//! - **Uniform Cursor**: `sheets`, `change_sheet`, `rewind`, `next`, `current`,
//!   `key`, `valid`, `count` and `seek` behave the same for every format
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetstream::reader::SpreadsheetReader;
//! use sheetstream::XlsxReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reader = XlsxReader::open("data.xlsx")?;
//! println!("Sheets: {:?}", reader.sheets());
//!
//! for row_result in reader.rows()? {
//!     let row = row_result?;
//!     println!("Row {}: {:?}", row.index, row.cells);
//! }
//!
//! // the row three `next()` calls after a rewind would reach
//! reader.seek(3)?;
//! println!("{:?}", reader.current()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Binary workbooks
//!
//! ```rust,no_run
//! use sheetstream::{ReaderConfig, XlsReader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = XlsReader::open_with_config("legacy.xls", ReaderConfig::from_env())?;
//! if let Some(sheet) = reader.active_sheet() {
//!     // 1-based coordinates by default
//!     println!("A1 = {}", sheet.value(1, 1));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ods;
pub mod ole;
pub mod package;
pub mod reader;
pub mod types;
pub mod xls;
pub mod xlsx;

pub use config::ReaderConfig;
pub use error::{ErrorKind, Result, SheetError};
pub use ods::OdsReader;
pub use reader::{Rows, SpreadsheetReader};
pub use types::{Cell, CellKind, Row};
pub use xls::XlsReader;
pub use xlsx::XlsxReader;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_imports() {
        // Test that all public types are accessible
        let _ = std::marker::PhantomData::<SheetError>;
        let _ = std::marker::PhantomData::<XlsReader>;
        let _ = std::marker::PhantomData::<XlsxReader>;
        let _ = std::marker::PhantomData::<OdsReader>;
    }
}
