//! OpenDocument spreadsheets (`.ods`)
//!
//! `content.xml` is extracted into a scratch directory and pulled one
//! `<table:table-row>` at a time. Every sheet lives in the same part, so
//! selecting a sheet means skipping the tables in front of it.

use crate::config::ReaderConfig;
use crate::error::{Result, SheetError};
use crate::package::xml::{attribute, open_part, text_content, PartReader};
use crate::package::{PackageArchive, ScratchDir};
use crate::reader::{SpreadsheetReader, StreamCursor};
use crate::types::MAX_COLUMNS;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use std::path::{Path, PathBuf};

pub const CONTENT_PART: &str = "content.xml";

const TABLE: &[u8] = b"table:table";
const TABLE_ROW: &[u8] = b"table:table-row";
const TABLE_CELL: &[u8] = b"table:table-cell";
const COVERED_CELL: &[u8] = b"table:covered-table-cell";
const PARAGRAPH: &[u8] = b"text:p";
const COLUMNS_REPEATED: &[u8] = b"table:number-columns-repeated";

/// Row cursor over an `.ods` package
///
/// # Examples
///
/// ```no_run
/// use sheetstream::ods::OdsReader;
/// use sheetstream::reader::SpreadsheetReader;
///
/// let mut reader = OdsReader::open("budget.ods")?;
/// for row in reader.rows()? {
///     println!("{:?}", row?.cells);
/// }
/// # Ok::<(), sheetstream::SheetError>(())
/// ```
#[derive(Debug)]
pub struct OdsReader {
    content: PathBuf,
    sheets: Vec<String>,
    sheet: usize,
    stream: Option<RowStream>,
    cursor: StreamCursor,
    // dropped last, after every open handle into it
    scratch: ScratchDir,
}

impl OdsReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        let mut archive = PackageArchive::open(path)?;
        let scratch = ScratchDir::create(&config)?;
        let content = scratch.file(CONTENT_PART);
        archive.extract_part(CONTENT_PART, &content)?;

        let sheets = read_sheet_names(&content)?;
        if sheets.is_empty() {
            return Err(SheetError::InvalidFormat(
                "content.xml holds no tables".to_string(),
            ));
        }
        log::debug!("Opened spreadsheet with {} tables", sheets.len());

        Ok(OdsReader {
            content,
            sheets,
            sheet: 0,
            stream: None,
            cursor: StreamCursor::new(),
            scratch,
        })
    }

    /// Directory holding the extracted `content.xml`
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.stream = Some(RowStream {
                reader: open_part(&self.content)?,
                buf: Vec::new(),
                sheet: self.sheet,
                table_open: false,
                finished: false,
            });
        }
        Ok(())
    }
}

/// Collect the `table:name` of every top-level table
fn read_sheet_names(content: &Path) -> Result<Vec<String>> {
    let mut reader = open_part(content)?;
    let mut buf = Vec::new();
    let mut names = Vec::new();

    loop {
        buf.clear();
        let skip = match reader
            .read_event_into(&mut buf)
            .map_err(|e| SheetError::xml(CONTENT_PART, e))?
        {
            Event::Start(e) if e.name().as_ref() == TABLE => {
                names.push(attribute(&e, b"table:name", CONTENT_PART)?.unwrap_or_default());
                true
            }
            Event::Empty(e) if e.name().as_ref() == TABLE => {
                names.push(attribute(&e, b"table:name", CONTENT_PART)?.unwrap_or_default());
                false
            }
            Event::Eof => break,
            _ => false,
        };

        if skip {
            buf.clear();
            reader
                .read_to_end_into(QName(TABLE), &mut buf)
                .map_err(|e| SheetError::xml(CONTENT_PART, e))?;
        }
    }

    Ok(names)
}

impl SpreadsheetReader for OdsReader {
    fn sheets(&self) -> &[String] {
        &self.sheets
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
        log::trace!("Rewinding table {}", self.sheet);
        self.stream = None;
        self.cursor.reset();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<&[String]>> {
        self.ensure_stream()?;
        let stream = &mut self.stream;
        self.cursor.next(|| match stream.as_mut() {
            Some(stream) => stream.pull_row(),
            None => Ok(None),
        })
    }

    fn current(&mut self) -> Result<Option<&[String]>> {
        self.ensure_stream()?;
        let stream = &mut self.stream;
        self.cursor.current(|| match stream.as_mut() {
            Some(stream) => stream.pull_row(),
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

/// Pull parser over `content.xml` for one table
#[derive(Debug)]
struct RowStream {
    reader: PartReader,
    buf: Vec<u8>,
    sheet: usize,
    table_open: bool,
    finished: bool,
}

/// Cell being read inside an open row
#[derive(Debug, Default)]
struct PendingCell {
    repeat: usize,
    paragraphs: Vec<String>,
    paragraph: Option<String>,
}

impl RowStream {
    fn read_event(&mut self) -> Result<Event<'_>> {
        self.buf.clear();
        self.reader
            .read_event_into(&mut self.buf)
            .map_err(|e| SheetError::xml(CONTENT_PART, e))
    }

    fn skip_element(&mut self, name: &[u8]) -> Result<()> {
        self.buf.clear();
        self.reader
            .read_to_end_into(QName(name), &mut self.buf)
            .map_err(|e| SheetError::xml(CONTENT_PART, e))?;
        Ok(())
    }

    /// Move past the tables in front of the selected one
    fn open_table(&mut self) -> Result<bool> {
        let mut seen = 0usize;
        loop {
            let (is_table, has_body) = match self.read_event()? {
                Event::Start(e) => (e.name().as_ref() == TABLE, true),
                Event::Empty(e) => (e.name().as_ref() == TABLE, false),
                Event::Eof => return Ok(false),
                _ => continue,
            };
            if !is_table {
                continue;
            }
            if seen == self.sheet {
                // a self-closing table has no rows
                return Ok(has_body);
            }
            seen += 1;
            if has_body {
                self.skip_element(TABLE)?;
            }
        }
    }

    fn pull_row(&mut self) -> Result<Option<Vec<String>>> {
        if self.finished {
            return Ok(None);
        }
        if !self.table_open {
            if !self.open_table()? {
                self.finished = true;
                return Ok(None);
            }
            self.table_open = true;
        }

        // no row open: find the next row start inside the table
        loop {
            let opens_row = match self.read_event()? {
                Event::Start(e) if e.name().as_ref() == TABLE_ROW => true,
                Event::Empty(e) if e.name().as_ref() == TABLE_ROW => return Ok(Some(Vec::new())),
                Event::End(e) if e.name().as_ref() == TABLE => false,
                Event::Eof => false,
                _ => continue,
            };
            if !opens_row {
                self.finished = true;
                return Ok(None);
            }
            break;
        }

        // row open: read cells until the row closes
        let mut row = Vec::new();
        let mut blanks = 0usize;
        let mut cell: Option<PendingCell> = None;
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| SheetError::xml(CONTENT_PART, e))?;

            let mut skip: Option<Vec<u8>> = None;
            match &event {
                Event::Start(e) => match e.name().as_ref() {
                    TABLE_CELL | COVERED_CELL => {
                        cell = Some(PendingCell {
                            repeat: repeat_count(e)?,
                            ..PendingCell::default()
                        });
                    }
                    PARAGRAPH => {
                        if let Some(pending) = cell.as_mut() {
                            pending.paragraph = Some(String::new());
                        }
                    }
                    b"office:annotation" => skip = Some(e.name().as_ref().to_vec()),
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    TABLE_CELL | COVERED_CELL => {
                        blanks = blanks.saturating_add(repeat_count(e)?);
                    }
                    PARAGRAPH => {
                        if let Some(pending) = cell.as_mut() {
                            pending.paragraphs.push(String::new());
                        }
                    }
                    b"text:s" => {
                        let count = attribute(e, b"text:c", CONTENT_PART)?
                            .and_then(|c| c.trim().parse::<usize>().ok())
                            .unwrap_or(1);
                        push_text(&mut cell, &" ".repeat(count));
                    }
                    b"text:tab" => push_text(&mut cell, "\t"),
                    b"text:line-break" => push_text(&mut cell, "\n"),
                    _ => {}
                },
                Event::End(e) => match e.name().as_ref() {
                    PARAGRAPH => {
                        if let Some(pending) = cell.as_mut() {
                            if let Some(text) = pending.paragraph.take() {
                                pending.paragraphs.push(text);
                            }
                        }
                    }
                    TABLE_CELL | COVERED_CELL => {
                        if let Some(done) = cell.take() {
                            let value = done.paragraphs.join("\n");
                            if value.is_empty() {
                                blanks = blanks.saturating_add(done.repeat);
                            } else {
                                extend_row(&mut row, String::new(), blanks)?;
                                blanks = 0;
                                extend_row(&mut row, value, done.repeat)?;
                            }
                        }
                    }
                    TABLE_ROW => {
                        // trailing filler up to the sheet edge is kept, anything wider dropped
                        if row.len().saturating_add(blanks) <= MAX_COLUMNS {
                            row.resize(row.len() + blanks, String::new());
                        } else {
                            log::debug!(
                                "Dropping {} trailing empty cells in {}",
                                blanks,
                                CONTENT_PART
                            );
                        }
                        return Ok(Some(row));
                    }
                    _ => {}
                },
                Event::Eof => {
                    self.finished = true;
                    return Err(SheetError::InvalidFormat(
                        "content.xml ends inside a table row".to_string(),
                    ));
                }
                _ => {
                    if let Some(text) = text_content(&event, CONTENT_PART)? {
                        push_text(&mut cell, &text);
                    }
                }
            }

            if let Some(name) = skip {
                self.skip_element(&name)?;
            }
        }
    }
}

/// Append to the open paragraph of the open cell, if any
fn push_text(cell: &mut Option<PendingCell>, text: &str) {
    if let Some(paragraph) = cell.as_mut().and_then(|c| c.paragraph.as_mut()) {
        paragraph.push_str(text);
    }
}

/// Append `count` copies of `value`, refusing rows wider than [`MAX_COLUMNS`]
fn extend_row(row: &mut Vec<String>, value: String, count: usize) -> Result<()> {
    if row.len().saturating_add(count) > MAX_COLUMNS {
        return Err(SheetError::InvalidFormat(format!(
            "Table row wider than {} columns in {}",
            MAX_COLUMNS, CONTENT_PART
        )));
    }
    row.resize(row.len() + count, value);
    Ok(())
}

fn repeat_count(e: &BytesStart<'_>) -> Result<usize> {
    Ok(attribute(e, COLUMNS_REPEATED, CONTENT_PART)?
        .and_then(|n| n.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1))
}
