//! Workbook globals substream and per-sheet decoding

use super::format::{format_date, format_number, general_number, FormatKind};
use super::records::{self, Record, RecordIter};
use super::sheet::Sheet;
use super::strings::{parse_sst, read_byte_string, read_unicode_string, CountWidth};
use super::style::{ExtendedFormat, Font, Palette};
use super::BiffVersion;
use crate::config::ReaderConfig;
use crate::error::{Result, SheetError};
use crate::types::{Cell, CellKind};
use indexmap::IndexMap;

/// A BOUNDSHEET entry: sheet name and the stream offset of its BOF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSheet {
    pub name: String,
    pub offset: u32,
    pub visibility: u8,
    /// 0 worksheet, 2 chart, 6 VB module
    pub sheet_type: u8,
}

/// Records of the globals substream that sheet decoding refers back to
#[derive(Debug, Clone)]
pub struct Globals {
    pub version: BiffVersion,
    pub shared_strings: Vec<String>,
    pub formats: IndexMap<u16, String>,
    pub fonts: Vec<Font>,
    pub xfs: Vec<ExtendedFormat>,
    pub palette: Palette,
    pub is_1904: bool,
    pub bound_sheets: Vec<BoundSheet>,
}

impl Globals {
    /// Build the cell for a numeric value owned by XF `xf`
    ///
    /// The format color is kept only when `keep_color` is set.
    pub fn numeric_cell(&self, value: f64, xf: u16, keep_color: bool) -> Cell {
        let (text, kind, color) = match self.xfs.get(xf as usize) {
            Some(ext) => match ext.format.kind {
                FormatKind::Date => (
                    format_date(value, self.is_1904, &ext.format.pattern),
                    CellKind::Date,
                    None,
                ),
                FormatKind::Number => {
                    let (text, color) = format_number(&ext.format.pattern, value, ext.format.index);
                    (text, CellKind::Number, color)
                }
                FormatKind::Other if ext.format.index == 0 => {
                    (general_number(value), CellKind::Number, None)
                }
                FormatKind::Other => (general_number(value), CellKind::Other, None),
            },
            None => (general_number(value), CellKind::Number, None),
        };

        Cell {
            value: text,
            raw: Some(value),
            kind,
            xf_index: Some(xf),
            format_color: if keep_color { color } else { None },
        }
    }

    pub fn font(&self, index: usize) -> Option<&Font> {
        self.fonts.get(index)
    }

    /// Display color of a palette index
    pub fn color(&self, index: u16) -> Option<&str> {
        self.palette.get(index)
    }
}

/// Read a BOF record and return its version and substream type
pub(crate) fn read_bof(record: &Record<'_>) -> Result<(BiffVersion, u16)> {
    if record.code != records::BOF {
        return Err(SheetError::InvalidFormat(format!(
            "Expected BOF at offset {}, found record 0x{:04X}",
            record.offset, record.code
        )));
    }
    let version = match record.u16(0)? {
        0x600 => BiffVersion::Biff8,
        0x500 => BiffVersion::Biff7,
        other => {
            return Err(SheetError::InvalidFormat(format!(
                "Unsupported BIFF version 0x{:04X}",
                other
            )))
        }
    };
    Ok((version, record.u16(2)?))
}

/// Fully decoded BIFF workbook
///
/// BIFF records point backwards (XF into FORMAT, LABELSST into SST), so the
/// whole stream is decoded at open time and sheets are served from memory.
#[derive(Debug, Clone)]
pub struct Workbook {
    globals: Globals,
    sheets: Vec<Sheet>,
    names: Vec<String>,
}

impl Workbook {
    /// Decode a workbook stream extracted from a compound file
    pub fn parse(stream: &[u8], config: &ReaderConfig) -> Result<Self> {
        let globals = parse_globals(stream)?;

        let mut sheets = Vec::with_capacity(globals.bound_sheets.len());
        for bound in &globals.bound_sheets {
            if bound.sheet_type != 0 {
                log::debug!(
                    "Skipping sheet '{}' of type {}",
                    bound.name,
                    bound.sheet_type
                );
                continue;
            }
            if let Some(sheet) = Sheet::parse(stream, bound, &globals, config)? {
                sheets.push(sheet);
            }
        }

        if sheets.is_empty() {
            return Err(SheetError::InvalidFormat(
                "Workbook contains no worksheets".to_string(),
            ));
        }

        let names = sheets.iter().map(|s| s.name().to_string()).collect();
        log::debug!(
            "Decoded {:?} workbook with {} worksheets",
            globals.version,
            sheets.len()
        );

        Ok(Workbook {
            globals,
            sheets,
            names,
        })
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn version(&self) -> BiffVersion {
        self.globals.version
    }

    pub fn is_1904(&self) -> bool {
        self.globals.is_1904
    }

    pub fn shared_strings(&self) -> &[String] {
        &self.globals.shared_strings
    }

    /// Worksheet names, chart and macro sheets excluded
    pub fn sheet_names(&self) -> &[String] {
        &self.names
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }
}

fn parse_globals(stream: &[u8]) -> Result<Globals> {
    let mut iter = RecordIter::new(stream, 0);
    let bof = iter.expect_next("workbook globals")?;
    let (version, substream) = read_bof(&bof)?;
    if substream != records::SUBSTREAM_GLOBALS {
        return Err(SheetError::InvalidFormat(format!(
            "First substream has type 0x{:04X}, expected workbook globals",
            substream
        )));
    }

    let mut globals = Globals {
        version,
        shared_strings: Vec::new(),
        formats: IndexMap::new(),
        fonts: Vec::new(),
        xfs: Vec::new(),
        palette: Palette::default(),
        is_1904: false,
        bound_sheets: Vec::new(),
    };

    loop {
        let record = iter.expect_next("workbook globals")?;
        match record.code {
            records::EOF => break,
            records::FILEPASS => {
                return Err(SheetError::NotSupported(
                    "Workbook is password protected".to_string(),
                ))
            }
            records::SST => {
                let mut fragments = vec![record.data];
                while iter.peek_code() == Some(records::CONTINUE) {
                    fragments.push(iter.expect_next("SST")?.data);
                }
                globals.shared_strings = parse_sst(&fragments)?;
            }
            records::FORMAT => {
                let index = record.u16(0)?;
                let (pattern, _) = match version {
                    BiffVersion::Biff8 => read_unicode_string(&record, 2, CountWidth::U16)?,
                    BiffVersion::Biff7 => read_byte_string(&record, 2, CountWidth::U8)?,
                };
                globals.formats.insert(index, pattern);
            }
            records::FONT => globals.fonts.push(Font::parse(&record, version)?),
            records::XF => {
                let xf = ExtendedFormat::parse(&record, version, &globals.formats)?;
                globals.xfs.push(xf);
            }
            records::PALETTE => globals.palette.apply_record(&record)?,
            records::NINETEENFOUR => globals.is_1904 = record.u16(0)? == 1,
            records::BOUNDSHEET => {
                let (name, _) = match version {
                    BiffVersion::Biff8 => read_unicode_string(&record, 6, CountWidth::U8)?,
                    BiffVersion::Biff7 => read_byte_string(&record, 6, CountWidth::U8)?,
                };
                globals.bound_sheets.push(BoundSheet {
                    name,
                    offset: record.u32(0)?,
                    visibility: record.u8(4)?,
                    sheet_type: record.u8(5)?,
                });
            }
            _ => {}
        }
    }

    log::debug!(
        "Workbook globals: {} shared strings, {} formats, {} XF records, {} bound sheets",
        globals.shared_strings.len(),
        globals.formats.len(),
        globals.xfs.len(),
        globals.bound_sheets.len()
    );
    Ok(globals)
}
