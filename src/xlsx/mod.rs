//! OOXML workbooks (`.xlsx`)
//!
//! Worksheet parts and the shared string table are extracted into a scratch
//! directory at open time. Rows are then pulled from the worksheet XML one
//! `<row>` at a time; switching sheets or rewinding reopens the extracted
//! file from the start.

pub mod shared_strings;
pub mod workbook;

pub use shared_strings::SharedStrings;
pub use workbook::SheetEntry;

use crate::config::ReaderConfig;
use crate::error::{Result, SheetError};
use crate::package::xml::{attribute, open_part, text_content, PartReader};
use crate::package::{PackageArchive, ScratchDir};
use crate::reader::{SpreadsheetReader, StreamCursor};
use crate::types::{column_index, MAX_COLUMNS};
use quick_xml::events::{BytesStart, Event};
use shared_strings::SHARED_STRINGS_PART;
use std::path::Path;
use workbook::{read_sheet_list, WORKBOOK_PART, WORKBOOK_RELS_PART};

/// Row cursor over an `.xlsx` package
///
/// # Examples
///
/// ```no_run
/// use sheetstream::reader::SpreadsheetReader;
/// use sheetstream::xlsx::XlsxReader;
///
/// let mut reader = XlsxReader::open("report.xlsx")?;
/// reader.change_sheet(0)?;
/// while let Some(row) = reader.next()?.map(<[String]>::to_vec) {
///     println!("{}: {:?}", reader.key(), row);
/// }
/// # Ok::<(), sheetstream::SheetError>(())
/// ```
#[derive(Debug)]
pub struct XlsxReader {
    sheets: Vec<SheetEntry>,
    names: Vec<String>,
    shared_strings: SharedStrings,
    sheet: usize,
    stream: Option<RowStream>,
    cursor: StreamCursor,
    // dropped last, after every open handle into it
    scratch: ScratchDir,
}

impl XlsxReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        let mut archive = PackageArchive::open(path)?;

        let workbook_xml = archive.read_part(WORKBOOK_PART)?;
        let rels_xml = if archive.contains(WORKBOOK_RELS_PART) {
            Some(archive.read_part(WORKBOOK_RELS_PART)?)
        } else {
            None
        };
        let sheets = read_sheet_list(&workbook_xml, rels_xml.as_deref())?;
        if sheets.is_empty() {
            return Err(SheetError::InvalidFormat(
                "Workbook lists no sheets".to_string(),
            ));
        }

        let scratch = ScratchDir::create(&config)?;
        for (i, sheet) in sheets.iter().enumerate() {
            archive.extract_part(&sheet.part, &scratch.file(&sheet_file(i)))?;
        }

        let sst_path = scratch.file("sharedStrings.xml");
        archive.extract_part(SHARED_STRINGS_PART, &sst_path)?;
        let shared_strings = SharedStrings::open(&sst_path, config.shared_string_cache_limit)?;

        log::debug!("Opened workbook with {} sheets", sheets.len());

        let names = sheets.iter().map(|s| s.name.clone()).collect();
        Ok(XlsxReader {
            sheets,
            names,
            shared_strings,
            sheet: 0,
            stream: None,
            cursor: StreamCursor::new(),
            scratch,
        })
    }

    /// Sheet entries with their archive parts
    pub fn sheet_entries(&self) -> &[SheetEntry] {
        &self.sheets
    }

    /// Whether shared strings are resolved lazily
    pub fn lazy_shared_strings(&self) -> bool {
        self.shared_strings.is_lazy()
    }

    fn open_stream(&mut self) -> Result<()> {
        let part = match self.sheets.get(self.sheet) {
            Some(entry) => entry.part.clone(),
            None => {
                return Err(SheetError::SheetNotFound {
                    index: self.sheet,
                    available: self.sheets.len(),
                })
            }
        };
        let reader = open_part(&self.scratch.file(&sheet_file(self.sheet)))?;
        self.stream = Some(RowStream::new(reader, part));
        Ok(())
    }

    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.open_stream()?;
        }
        Ok(())
    }
}

fn sheet_file(index: usize) -> String {
    format!("sheet{}.xml", index)
}

impl SpreadsheetReader for XlsxReader {
    fn sheets(&self) -> &[String] {
        &self.names
    }

    fn change_sheet(&mut self, index: usize) -> Result<()> {
        if index >= self.sheets.len() {
            return Err(SheetError::SheetNotFound {
                index,
                available: self.sheets.len(),
            });
        }
        self.sheet = index;
        self.rewind()
    }

    fn rewind(&mut self) -> Result<()> {
        log::trace!("Rewinding sheet {}", self.sheet);
        self.stream = None;
        self.cursor.reset();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<&[String]>> {
        self.ensure_stream()?;
        let stream = &mut self.stream;
        let strings = &mut self.shared_strings;
        self.cursor.next(|| match stream.as_mut() {
            Some(stream) => stream.pull_row(strings),
            None => Ok(None),
        })
    }

    fn current(&mut self) -> Result<Option<&[String]>> {
        self.ensure_stream()?;
        let stream = &mut self.stream;
        let strings = &mut self.shared_strings;
        self.cursor.current(|| match stream.as_mut() {
            Some(stream) => stream.pull_row(strings),
            None => Ok(None),
        })
    }

    fn key(&self) -> usize {
        self.cursor.key()
    }

    fn valid(&self) -> bool {
        self.cursor.valid()
    }

    fn count(&self) -> usize {
        self.cursor.key() + 1
    }
}

/// Cell being read inside an open row
#[derive(Debug)]
struct PendingCell {
    col: usize,
    kind: CellType,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    SharedString,
    InlineString,
    Other,
}

/// Pull parser positioned inside one worksheet part
#[derive(Debug)]
struct RowStream {
    reader: PartReader,
    buf: Vec<u8>,
    part: String,
    finished: bool,
}

impl RowStream {
    fn new(reader: PartReader, part: String) -> Self {
        RowStream {
            reader,
            buf: Vec::new(),
            part,
            finished: false,
        }
    }

    /// Decode the next `<row>`, `None` once `</sheetData>` or the end is reached
    fn pull_row(&mut self, strings: &mut SharedStrings) -> Result<Option<Vec<String>>> {
        if self.finished {
            return Ok(None);
        }

        let mut row: Option<Vec<String>> = None;
        let mut next_col = 0usize;
        let mut cell: Option<PendingCell> = None;
        let mut in_value = false;
        let mut phonetic_depth = 0usize;

        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| SheetError::xml(&self.part, e))?;

            match &event {
                Event::Start(e) => match (e.local_name().as_ref(), row.is_some()) {
                    (b"row", false) => row = Some(vec![String::new(); spans_width(e, &self.part)?]),
                    (b"c", true) => {
                        cell = Some(start_cell(e, next_col, &self.part)?);
                    }
                    (b"v", true) | (b"t", true) => in_value = cell.is_some(),
                    (b"rPh", true) => phonetic_depth += 1,
                    _ => {}
                },
                Event::Empty(e) => match (e.local_name().as_ref(), row.as_mut()) {
                    (b"row", None) => {
                        return Ok(Some(vec![String::new(); spans_width(e, &self.part)?]));
                    }
                    (b"c", Some(values)) => {
                        let empty = start_cell(e, next_col, &self.part)?;
                        place(values, empty.col, String::new());
                        next_col = empty.col + 1;
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" | b"t" => in_value = false,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"c" => {
                        if let (Some(done), Some(values)) = (cell.take(), row.as_mut()) {
                            let text = match done.kind {
                                CellType::SharedString => {
                                    let index = done.value.trim().parse::<usize>().map_err(|_| {
                                        SheetError::InvalidFormat(format!(
                                            "Shared string index '{}' in {}",
                                            done.value, self.part
                                        ))
                                    })?;
                                    strings.get(index)?
                                }
                                CellType::InlineString | CellType::Other => done.value,
                            };
                            place(values, done.col, text);
                            next_col = done.col + 1;
                        }
                    }
                    b"row" => {
                        if let Some(values) = row.take() {
                            return Ok(Some(values));
                        }
                    }
                    b"sheetData" => {
                        self.finished = true;
                        return Ok(None);
                    }
                    _ => {}
                },
                Event::Eof => {
                    self.finished = true;
                    return Ok(None);
                }
                _ => {
                    if in_value && phonetic_depth == 0 {
                        if let (Some(pending), Some(text)) =
                            (cell.as_mut(), text_content(&event, &self.part)?)
                        {
                            pending.value.push_str(&text);
                        }
                    }
                }
            }
        }
    }
}

/// Store `value` at `col`, backfilling skipped columns with empty strings
fn place(values: &mut Vec<String>, col: usize, value: String) {
    if col >= values.len() {
        values.resize(col + 1, String::new());
    }
    values[col] = value;
}

fn start_cell(e: &BytesStart<'_>, next_col: usize, part: &str) -> Result<PendingCell> {
    let col = attribute(e, b"r", part)?
        .and_then(|r| column_index(&r))
        .unwrap_or(next_col);
    if col >= MAX_COLUMNS {
        return Err(SheetError::InvalidFormat(format!(
            "Cell column beyond {} in {}",
            MAX_COLUMNS, part
        )));
    }
    let kind = match attribute(e, b"t", part)?.as_deref() {
        Some("s") => CellType::SharedString,
        Some("inlineStr") => CellType::InlineString,
        _ => CellType::Other,
    };
    Ok(PendingCell {
        col,
        kind,
        value: String::new(),
    })
}

/// Width announced by a `spans="1:5"` attribute (several ranges may be listed)
fn spans_width(e: &BytesStart<'_>, part: &str) -> Result<usize> {
    let spans = match attribute(e, b"spans", part)? {
        Some(spans) => spans,
        None => return Ok(0),
    };
    let width = spans
        .split_whitespace()
        .filter_map(|range| range.rsplit(':').next())
        .filter_map(|end| end.trim().parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    if width > MAX_COLUMNS {
        return Err(SheetError::InvalidFormat(format!(
            "Row spans '{}' wider than {} columns in {}",
            spans, MAX_COLUMNS, part
        )));
    }
    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;
    use std::io::BufReader;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1" spans="1:4"><c r="A1" t="s"><v>1</v></c><c r="C1"><v>3.5</v></c></row>
    <row r="2" spans="1:2"/>
    <row r="3"><c r="B3" t="inlineStr"><is><t>in</t><rPh><t>x</t></rPh><t>line</t></is></c><c><v>7</v></c><c r="E3"/></row>
  </sheetData>
</worksheet>"#;

    fn stream() -> RowStream {
        stream_of(SHEET)
    }

    fn stream_of(content: &str) -> RowStream {
        let reader = Reader::from_reader(BufReader::new(tempfile_with(content)));
        RowStream::new(reader, "sheet".to_string())
    }

    fn tempfile_with(content: &str) -> std::fs::File {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    fn strings() -> (tempfile::NamedTempFile, SharedStrings) {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"<sst uniqueCount="2"><si><t>zero</t></si><si><t>one</t></si></sst>"#,
        )
        .unwrap();
        let sst = SharedStrings::open(file.path(), 10).unwrap();
        (file, sst)
    }

    #[test]
    fn test_pull_rows() {
        let (_file, mut sst) = strings();
        let mut rows = stream();

        assert_eq!(
            rows.pull_row(&mut sst).unwrap().unwrap(),
            vec!["one", "", "3.5", ""]
        );
        assert_eq!(rows.pull_row(&mut sst).unwrap().unwrap(), vec!["", ""]);
        assert_eq!(
            rows.pull_row(&mut sst).unwrap().unwrap(),
            vec!["", "inline", "7", "", ""]
        );
        assert!(rows.pull_row(&mut sst).unwrap().is_none());
        assert!(rows.pull_row(&mut sst).unwrap().is_none());
    }

    #[test]
    fn test_spans_width() {
        let mut reader = Reader::from_reader(&br#"<row spans="1:3 5:9"/>"#[..]);
        let mut buf = Vec::new();
        match reader.read_event_into(&mut buf).unwrap() {
            Event::Empty(e) => assert_eq!(spans_width(&e, "t").unwrap(), 9),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_far_column_rejected() {
        let (_file, mut sst) = strings();
        let mut rows = stream_of(
            r#"<worksheet><sheetData><row><c r="ZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#,
        );
        let err = rows.pull_row(&mut sst).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);

        let mut rows = stream_of(
            r#"<worksheet><sheetData><row><c r="AAAAAAAAAAAAAAAAAAAAAAAA1"/></row></sheetData></worksheet>"#,
        );
        assert!(rows.pull_row(&mut sst).is_err());
    }

    #[test]
    fn test_last_column_accepted() {
        let (_file, mut sst) = strings();
        let mut rows = stream_of(
            r#"<worksheet><sheetData><row><c r="XFD1"><v>end</v></c></row></sheetData></worksheet>"#,
        );
        let row = rows.pull_row(&mut sst).unwrap().unwrap();
        assert_eq!(row.len(), MAX_COLUMNS);
        assert_eq!(row[MAX_COLUMNS - 1], "end");
    }

    #[test]
    fn test_oversized_spans_rejected() {
        let (_file, mut sst) = strings();
        let mut rows = stream_of(
            r#"<worksheet><sheetData><row spans="1:4000000000"><c r="A1"><v>1</v></c></row></sheetData></worksheet>"#,
        );
        let err = rows.pull_row(&mut sst).unwrap_err();
        assert!(matches!(err, SheetError::InvalidFormat(_)));

        let mut rows =
            stream_of(r#"<worksheet><sheetData><row spans="1:4000000000"/></sheetData></worksheet>"#);
        assert!(matches!(
            rows.pull_row(&mut sst),
            Err(SheetError::InvalidFormat(_))
        ));
    }
}
