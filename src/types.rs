//! Type definitions shared by the decoders

#[cfg(feature = "serde")]
use serde::Serialize;

/// Decoded type of a binary workbook cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CellKind {
    /// Literal or shared string
    Text,
    /// Number rendered through a numeric format
    Number,
    /// Number rendered through a date format
    Date,
    /// Boolean from BOOLERR or a formula result
    Boolean,
    /// Error code from BOOLERR or a formula result
    Error,
    /// Formatted but empty cell (MULBLANK)
    Blank,
    /// Number whose format is neither date nor numeric
    Other,
}

/// A decoded cell of a binary workbook
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Cell {
    /// Display string
    pub value: String,
    /// Raw numeric value, when the record carried one
    pub raw: Option<f64>,
    /// Decoded type
    pub kind: CellKind,
    /// Owning XF record
    pub xf_index: Option<u16>,
    /// Color prefix of the number format section that produced `value`
    pub format_color: Option<String>,
}

impl Cell {
    /// Create a text cell
    pub fn text(value: String, xf_index: Option<u16>) -> Self {
        Cell {
            value,
            raw: None,
            kind: CellKind::Text,
            xf_index,
            format_color: None,
        }
    }

    /// Check if cell has no display text
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Represents a row yielded by [`crate::reader::Rows`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Row {
    /// Row index (0-based)
    pub index: usize,
    /// Cell display strings
    pub cells: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(index: usize, cells: Vec<String>) -> Self {
        Row { index, cells }
    }

    /// Get cell at column index
    pub fn get(&self, col: usize) -> Option<&str> {
        self.cells.get(col).map(String::as_str)
    }

    /// Get number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(String::is_empty)
    }
}

/// Widest row any reader will materialize (column XFD)
pub const MAX_COLUMNS: usize = 16_384;

/// Column index of a cell reference, zero-based ("A1" -> 0, "AA7" -> 26)
///
/// Only the leading letters count. A reference without letters yields `None`.
/// Over-long references saturate at `usize::MAX - 1`; callers compare the
/// result against [`MAX_COLUMNS`].
pub fn column_index(cell_ref: &str) -> Option<usize> {
    let mut col_idx = 0usize;
    let mut seen = false;
    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            let digit = ch.to_ascii_uppercase() as usize - 'A' as usize + 1;
            col_idx = col_idx.saturating_mul(26).saturating_add(digit);
            seen = true;
        } else {
            break;
        }
    }
    if seen {
        Some(col_idx - 1)
    } else {
        None
    }
}
