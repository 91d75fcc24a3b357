//! Worksheet substreams

use super::format::decode_rk;
use super::records::{self, Record, RecordIter};
use super::strings::{decode_utf16, read_byte_string, read_unicode_string, CountWidth};
use super::workbook::{read_bof, BoundSheet, Globals};
use super::BiffVersion;
use crate::config::ReaderConfig;
use crate::error::{Result, SheetError};
use crate::types::{Cell, CellKind};
use std::collections::BTreeMap;

/// A MERGEDCELLS range, zero-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRange {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u16,
    pub last_col: u16,
}

impl MergedRange {
    pub fn rowspan(&self) -> u32 {
        self.last_row.saturating_sub(self.first_row) + 1
    }

    pub fn colspan(&self) -> u32 {
        u32::from(self.last_col.saturating_sub(self.first_col)) + 1
    }

    fn contains(&self, row: u32, col: u16) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }
}

/// A HYPERLINK record attached to a cell range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    pub range: MergedRange,
    pub url: String,
    /// Display text, the URL when the record has none
    pub description: String,
}

/// ROW record metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowInfo {
    /// Height in points, `None` for the default height
    pub height: Option<f64>,
    pub hidden: bool,
}

/// COLINFO record metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub first_col: u16,
    pub last_col: u16,
    /// Width in 1/256 of a character
    pub width: u16,
    pub xf_index: u16,
    pub hidden: bool,
    pub collapsed: bool,
}

const ERROR_CODES: &[(u8, &str)] = &[
    (0x00, "#NULL!"),
    (0x07, "#DIV/0!"),
    (0x0F, "#VALUE!"),
    (0x17, "#REF!"),
    (0x1D, "#NAME?"),
    (0x24, "#NUM!"),
    (0x2A, "#N/A"),
];

fn error_cell(code: u8, xf: u16) -> Cell {
    let text = ERROR_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, t)| t.to_string())
        .unwrap_or_else(|| format!("#ERR{}", code));
    Cell {
        value: text,
        raw: None,
        kind: CellKind::Error,
        xf_index: Some(xf),
        format_color: None,
    }
}

fn bool_cell(value: bool, xf: u16) -> Cell {
    Cell {
        value: if value { "TRUE" } else { "FALSE" }.to_string(),
        raw: Some(if value { 1.0 } else { 0.0 }),
        kind: CellKind::Boolean,
        xf_index: Some(xf),
        format_color: None,
    }
}

/// One decoded worksheet
///
/// Cells are kept sparse and zero-based. Accessors taking `row, col` work in
/// the configured offset coordinates (1-based by default).
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<u32, BTreeMap<u16, Cell>>,
    declared_rows: u32,
    declared_cols: u16,
    /// Highest row and column holding a cell, zero-based
    observed: Option<(u32, u16)>,
    merges: Vec<MergedRange>,
    hyperlinks: Vec<Hyperlink>,
    row_info: BTreeMap<u32, RowInfo>,
    column_info: Vec<ColumnInfo>,
    default_column_width: Option<u16>,
    standard_width: Option<u16>,
    row_offset: u32,
    column_offset: u32,
}

impl Sheet {
    /// Decode the substream of `bound`; `None` when it is not a worksheet
    pub(crate) fn parse(
        stream: &[u8],
        bound: &BoundSheet,
        globals: &Globals,
        config: &ReaderConfig,
    ) -> Result<Option<Sheet>> {
        let mut iter = RecordIter::new(stream, bound.offset as usize);
        let bof = iter.expect_next("worksheet")?;
        let (_, substream) = read_bof(&bof)?;
        if substream != records::SUBSTREAM_WORKSHEET {
            log::debug!(
                "Skipping sheet '{}' with substream type 0x{:04X}",
                bound.name,
                substream
            );
            return Ok(None);
        }

        let mut sheet = Sheet {
            name: bound.name.clone(),
            cells: BTreeMap::new(),
            declared_rows: 0,
            declared_cols: 0,
            observed: None,
            merges: Vec::new(),
            hyperlinks: Vec::new(),
            row_info: BTreeMap::new(),
            column_info: Vec::new(),
            default_column_width: None,
            standard_width: None,
            row_offset: config.row_offset,
            column_offset: config.column_offset,
        };

        let mut decoder = SheetDecoder {
            globals,
            extended: config.store_extended_info,
            seen_dimension: false,
            pending_string: None,
        };

        loop {
            let record = iter.expect_next("worksheet")?;
            if record.code == records::EOF {
                break;
            }
            decoder.apply(&mut sheet, &record)?;
        }

        log::debug!(
            "Sheet '{}': {} rows x {} columns",
            sheet.name,
            sheet.row_count(),
            sheet.column_count()
        );
        Ok(Some(sheet))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row count: the DIMENSION extent, widened to cover every cell
    pub fn row_count(&self) -> usize {
        let observed = self.observed.map_or(0, |(r, _)| r as usize + 1);
        observed.max(self.declared_rows as usize)
    }

    /// Column count: the DIMENSION extent, widened to cover every cell
    pub fn column_count(&self) -> usize {
        let observed = self.observed.map_or(0, |(_, c)| c as usize + 1);
        observed.max(self.declared_cols as usize)
    }

    /// Rows declared by the DIMENSION record
    pub fn declared_rows(&self) -> u32 {
        self.declared_rows
    }

    pub fn declared_columns(&self) -> u16 {
        self.declared_cols
    }

    /// Highest row holding a cell, in offset coordinates
    pub fn max_row(&self) -> Option<u32> {
        self.observed.map(|(r, _)| r + self.row_offset)
    }

    /// Highest column holding a cell, in offset coordinates
    pub fn max_col(&self) -> Option<u32> {
        self.observed.map(|(_, c)| u32::from(c) + self.column_offset)
    }

    fn to_zero_based(&self, row: u32, col: u32) -> Option<(u32, u16)> {
        let r = row.checked_sub(self.row_offset)?;
        let c = col.checked_sub(self.column_offset)?;
        Some((r, u16::try_from(c).ok()?))
    }

    /// Cell at zero-based coordinates
    pub fn cell(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&row)?.get(&col)
    }

    /// Display value in offset coordinates, empty when the cell is absent
    pub fn value(&self, row: u32, col: u32) -> &str {
        self.to_zero_based(row, col)
            .and_then(|(r, c)| self.cell(r, c))
            .map_or("", |cell| cell.value.as_str())
    }

    /// Raw number in offset coordinates
    pub fn raw(&self, row: u32, col: u32) -> Option<f64> {
        self.to_zero_based(row, col)
            .and_then(|(r, c)| self.cell(r, c))
            .and_then(|cell| cell.raw)
    }

    /// Display strings of zero-based row `row`, padded to the column count
    pub fn row_values(&self, row: usize) -> Vec<String> {
        let mut values = vec![String::new(); self.column_count()];
        let cells = match u32::try_from(row).ok().and_then(|r| self.cells.get(&r)) {
            Some(cells) => cells,
            None => return values,
        };
        for (&col, cell) in cells {
            let col = col as usize;
            if col >= values.len() {
                values.resize(col + 1, String::new());
            }
            values[col] = cell.value.clone();
        }
        values
    }

    fn merge_at(&self, row: u32, col: u32) -> Option<&MergedRange> {
        let (r, c) = self.to_zero_based(row, col)?;
        self.merges
            .iter()
            .find(|m| m.first_row == r && m.first_col == c)
    }

    /// Rows covered by a merge anchored at this cell, 1 otherwise
    pub fn rowspan(&self, row: u32, col: u32) -> u32 {
        self.merge_at(row, col).map_or(1, MergedRange::rowspan)
    }

    /// Columns covered by a merge anchored at this cell, 1 otherwise
    pub fn colspan(&self, row: u32, col: u32) -> u32 {
        self.merge_at(row, col).map_or(1, MergedRange::colspan)
    }

    pub fn merged_ranges(&self) -> &[MergedRange] {
        &self.merges
    }

    /// Hyperlink covering the cell, in offset coordinates
    pub fn hyperlink(&self, row: u32, col: u32) -> Option<&Hyperlink> {
        let (r, c) = self.to_zero_based(row, col)?;
        self.hyperlinks.iter().find(|h| h.range.contains(r, c))
    }

    /// ROW metadata, in offset coordinates
    pub fn row_info(&self, row: u32) -> Option<&RowInfo> {
        self.row_info.get(&row.checked_sub(self.row_offset)?)
    }

    /// COLINFO metadata covering the column, in offset coordinates
    pub fn column_info(&self, col: u32) -> Option<&ColumnInfo> {
        let c = u16::try_from(col.checked_sub(self.column_offset)?).ok()?;
        self.column_info
            .iter()
            .find(|info| (info.first_col..=info.last_col).contains(&c))
    }

    /// DEFCOLWIDTH value, in characters
    pub fn default_column_width(&self) -> Option<u16> {
        self.default_column_width
    }

    /// STANDARDWIDTH value, in 1/256 of a character
    pub fn standard_width(&self) -> Option<u16> {
        self.standard_width
    }

    fn insert(&mut self, row: u32, col: u16, cell: Cell) {
        self.observed = Some(match self.observed {
            Some((r, c)) => (r.max(row), c.max(col)),
            None => (row, col),
        });
        self.cells.entry(row).or_default().insert(col, cell);
    }
}

/// Per-substream decoding state
struct SheetDecoder<'a> {
    globals: &'a Globals,
    extended: bool,
    seen_dimension: bool,
    /// Cell of a FORMULA whose string result follows in a STRING record
    pending_string: Option<(u32, u16, u16)>,
}

impl<'a> SheetDecoder<'a> {
    fn version(&self) -> BiffVersion {
        self.globals.version
    }

    fn number(&self, value: f64, xf: u16) -> Cell {
        self.globals.numeric_cell(value, xf, self.extended)
    }

    fn apply(&mut self, sheet: &mut Sheet, record: &Record<'_>) -> Result<()> {
        match record.code {
            records::FILEPASS => {
                return Err(SheetError::NotSupported(
                    "Workbook is password protected".to_string(),
                ))
            }
            records::DIMENSION if !self.seen_dimension => {
                self.seen_dimension = true;
                if record.len() == 10 || self.version() == BiffVersion::Biff7 {
                    sheet.declared_rows = u32::from(record.u16(2)?);
                    sheet.declared_cols = record.u16(6)?;
                } else {
                    sheet.declared_rows = record.u32(4)?;
                    sheet.declared_cols = record.u16(10)?;
                }
            }
            records::ROW if self.extended => {
                let row = u32::from(record.u16(0)?);
                let height = record.u16(6)?;
                let info = RowInfo {
                    height: if height & 0x8000 != 0 {
                        None
                    } else {
                        Some(f64::from(height & 0x7FFF) / 20.0)
                    },
                    hidden: record.u8(12)? & 0x20 != 0,
                };
                sheet.row_info.insert(row, info);
            }
            records::MERGEDCELLS if self.extended => {
                let count = record.u16(0)? as usize;
                for i in 0..count {
                    let pos = 2 + i * 8;
                    sheet.merges.push(MergedRange {
                        first_row: u32::from(record.u16(pos)?),
                        last_row: u32::from(record.u16(pos + 2)?),
                        first_col: record.u16(pos + 4)?,
                        last_col: record.u16(pos + 6)?,
                    });
                }
            }
            records::RK | records::RK2 => {
                let (row, col, xf) = cell_header(record)?;
                let value = decode_rk(record.u32(6)?);
                sheet.insert(row, col, self.number(value, xf));
            }
            records::MULRK => {
                let row = u32::from(record.u16(0)?);
                let first = record.u16(2)?;
                let last = record.u16(record.len().saturating_sub(2))?;
                for (i, col) in (first..=last).enumerate() {
                    let pos = 4 + i * 6;
                    let xf = record.u16(pos)?;
                    let value = decode_rk(record.u32(pos + 2)?);
                    sheet.insert(row, col, self.number(value, xf));
                }
            }
            records::NUMBER => {
                let (row, col, xf) = cell_header(record)?;
                let value = record.f64(6)?;
                sheet.insert(row, col, self.number(value, xf));
            }
            records::FORMULA | records::FORMULA2 => {
                let (row, col, xf) = cell_header(record)?;
                if record.u8(12)? == 0xFF && record.u8(13)? == 0xFF {
                    match record.u8(6)? {
                        0 => self.pending_string = Some((row, col, xf)),
                        1 => sheet.insert(row, col, bool_cell(record.u8(8)? != 0, xf)),
                        2 => sheet.insert(row, col, error_cell(record.u8(8)?, xf)),
                        3 => sheet.insert(row, col, Cell::text(String::new(), Some(xf))),
                        _ => {}
                    }
                } else {
                    let value = record.f64(6)?;
                    sheet.insert(row, col, self.number(value, xf));
                }
            }
            records::STRING => {
                if let Some((row, col, xf)) = self.pending_string.take() {
                    let (text, _) = match self.version() {
                        BiffVersion::Biff8 => read_unicode_string(record, 0, CountWidth::U16)?,
                        BiffVersion::Biff7 => read_byte_string(record, 0, CountWidth::U16)?,
                    };
                    sheet.insert(row, col, Cell::text(text, Some(xf)));
                }
            }
            records::BOOLERR => {
                let (row, col, xf) = cell_header(record)?;
                let value = record.u8(6)?;
                let cell = if record.u8(7)? != 0 {
                    error_cell(value, xf)
                } else {
                    bool_cell(value != 0, xf)
                };
                sheet.insert(row, col, cell);
            }
            records::LABEL => {
                let (row, col, xf) = cell_header(record)?;
                let (text, _) = match self.version() {
                    BiffVersion::Biff8 => read_unicode_string(record, 6, CountWidth::U16)?,
                    BiffVersion::Biff7 => read_byte_string(record, 6, CountWidth::U16)?,
                };
                sheet.insert(row, col, Cell::text(text, Some(xf)));
            }
            records::LABELSST => {
                let (row, col, xf) = cell_header(record)?;
                let index = record.u32(6)? as usize;
                let text = self.globals.shared_strings.get(index).ok_or_else(|| {
                    SheetError::InvalidFormat(format!(
                        "LABELSST refers to shared string {} of {}",
                        index,
                        self.globals.shared_strings.len()
                    ))
                })?;
                sheet.insert(row, col, Cell::text(text.clone(), Some(xf)));
            }
            records::MULBLANK => {
                let row = u32::from(record.u16(0)?);
                let first = record.u16(2)?;
                let count = (record.len() / 2).saturating_sub(3);
                for i in 0..count {
                    let xf = record.u16(4 + i * 2)?;
                    let col = first.saturating_add(i as u16);
                    sheet.insert(
                        row,
                        col,
                        Cell {
                            value: String::new(),
                            raw: None,
                            kind: CellKind::Blank,
                            xf_index: Some(xf),
                            format_color: None,
                        },
                    );
                }
            }
            records::HYPERLINK if self.extended => {
                sheet.hyperlinks.push(parse_hyperlink(record)?);
            }
            records::COLINFO if self.extended => {
                let options = record.u16(8)?;
                sheet.column_info.push(ColumnInfo {
                    first_col: record.u16(0)?,
                    last_col: record.u16(2)?,
                    width: record.u16(4)?,
                    xf_index: record.u16(6)?,
                    hidden: options & 0x0001 != 0,
                    collapsed: options & 0x1000 != 0,
                });
            }
            records::DEFCOLWIDTH => sheet.default_column_width = Some(record.u16(0)?),
            records::STANDARDWIDTH => sheet.standard_width = Some(record.u16(0)?),
            _ => {}
        }
        Ok(())
    }
}

/// Row, column and XF index shared by all cell records
fn cell_header(record: &Record<'_>) -> Result<(u32, u16, u16)> {
    Ok((
        u32::from(record.u16(0)?),
        record.u16(2)?,
        record.u16(4)?,
    ))
}

fn parse_hyperlink(record: &Record<'_>) -> Result<Hyperlink> {
    let range = MergedRange {
        first_row: u32::from(record.u16(0)?),
        last_row: u32::from(record.u16(2)?),
        first_col: record.u16(4)?,
        last_col: record.u16(6)?,
    };
    let flags = record.u32(28)?;
    let mut pos = 32;

    let mut description = String::new();
    if flags & 0x14 == 0x14 {
        let chars = record.u32(pos)? as usize;
        let raw = record.bytes(pos + 4, chars * 2)?;
        description = decode_utf16(raw).trim_end_matches('\0').to_string();
        pos += 4 + chars * 2;
    }

    let mut url = String::new();
    if flags & 0x01 != 0 {
        // moniker CLSID, then the byte length of the UTF-16 target
        let len = record.u32(pos + 16)? as usize;
        let raw = record.bytes(pos + 20, len)?;
        url = decode_utf16(raw).trim_end_matches('\0').to_string();
    }

    if description.is_empty() {
        description = url.clone();
    }

    Ok(Hyperlink {
        range,
        url,
        description,
    })
}
