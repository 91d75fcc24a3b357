//! Shared string table (`xl/sharedStrings.xml`)
//!
//! Small tables are read once into memory. Tables whose declared unique count
//! exceeds the configured limit are resolved lazily: the reader keeps its
//! position in the XML and only moves forward, reopening the part when an
//! earlier index is requested.

use crate::error::{Result, SheetError};
use crate::package::xml::{attribute, open_part, text_content, PartReader};
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::path::{Path, PathBuf};

pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Shared string lookup in one of two modes
#[derive(Debug)]
pub enum SharedStrings {
    Cached(Vec<String>),
    Lazy(LazyStrings),
}

impl SharedStrings {
    /// Open an extracted `sharedStrings.xml`
    pub fn open(path: &Path, cache_limit: usize) -> Result<Self> {
        let mut reader = open_part(path)?;
        let mut buf = Vec::new();
        let unique = read_unique_count(&mut reader, &mut buf)?;

        match unique {
            Some(count) if count > cache_limit => {
                log::debug!(
                    "Resolving {} shared strings lazily (cache limit {})",
                    count,
                    cache_limit
                );
                Ok(SharedStrings::Lazy(LazyStrings {
                    path: path.to_path_buf(),
                    reader: None,
                    buf: Vec::new(),
                    next_index: 0,
                    last: None,
                }))
            }
            _ => {
                let strings = read_all(&mut reader, &mut buf)?;
                log::debug!("Cached {} shared strings", strings.len());
                Ok(SharedStrings::Cached(strings))
            }
        }
    }

    /// Text of shared string `index`
    pub fn get(&mut self, index: usize) -> Result<String> {
        let found = match self {
            SharedStrings::Cached(strings) => strings.get(index).cloned(),
            SharedStrings::Lazy(lazy) => lazy.get(index)?,
        };
        found.ok_or_else(|| {
            SheetError::InvalidFormat(format!("Shared string index {} out of range", index))
        })
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, SharedStrings::Lazy(_))
    }
}

/// Forward-only resolver over the `<si>` list
#[derive(Debug)]
pub struct LazyStrings {
    path: PathBuf,
    reader: Option<PartReader>,
    buf: Vec<u8>,
    /// Index of the next `<si>` the reader will meet
    next_index: usize,
    last: Option<(usize, String)>,
}

impl LazyStrings {
    fn get(&mut self, index: usize) -> Result<Option<String>> {
        if let Some((last_index, value)) = &self.last {
            if *last_index == index {
                return Ok(Some(value.clone()));
            }
        }

        if self.reader.is_none() || index < self.next_index {
            log::trace!("Reopening shared strings for index {}", index);
            self.reader = Some(open_part(&self.path)?);
            self.next_index = 0;
        }
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };

        loop {
            self.buf.clear();
            let event = reader
                .read_event_into(&mut self.buf)
                .map_err(|e| SheetError::xml(SHARED_STRINGS_PART, e))?;
            let (is_empty, name) = match event {
                Event::Start(e) if e.local_name().as_ref() == b"si" => (false, e.name().as_ref().to_vec()),
                Event::Empty(e) if e.local_name().as_ref() == b"si" => (true, Vec::new()),
                Event::Eof => return Ok(None),
                _ => continue,
            };

            let current = self.next_index;
            self.next_index += 1;

            if current == index {
                let text = if is_empty {
                    String::new()
                } else {
                    read_si_text(reader, &mut self.buf)?
                };
                self.last = Some((index, text.clone()));
                return Ok(Some(text));
            }

            if !is_empty {
                self.buf.clear();
                reader
                    .read_to_end_into(QName(&name), &mut self.buf)
                    .map_err(|e| SheetError::xml(SHARED_STRINGS_PART, e))?;
            }
        }
    }
}

/// Read up to the `<sst>` element and return its `uniqueCount`
fn read_unique_count(reader: &mut PartReader, buf: &mut Vec<u8>) -> Result<Option<usize>> {
    loop {
        buf.clear();
        match reader
            .read_event_into(buf)
            .map_err(|e| SheetError::xml(SHARED_STRINGS_PART, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sst" => {
                let count = attribute(&e, b"uniqueCount", SHARED_STRINGS_PART)?
                    .and_then(|v| v.trim().parse().ok());
                return Ok(count);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn read_all(reader: &mut PartReader, buf: &mut Vec<u8>) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    loop {
        buf.clear();
        match reader
            .read_event_into(buf)
            .map_err(|e| SheetError::xml(SHARED_STRINGS_PART, e))?
        {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                strings.push(read_si_text(reader, buf)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// Concatenate the `<t>` runs of an `<si>` whose start tag was just read
///
/// Phonetic runs (`<rPh>`) hold reading hints, not cell text.
fn read_si_text(reader: &mut PartReader, buf: &mut Vec<u8>) -> Result<String> {
    let mut text = String::new();
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(buf)
            .map_err(|e| SheetError::xml(SHARED_STRINGS_PART, e))?;
        match &event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"si" => break,
                _ => {}
            },
            Event::Eof => {
                return Err(SheetError::InvalidFormat(
                    "sharedStrings.xml ends inside <si>".to_string(),
                ))
            }
            _ => {
                if in_text && phonetic_depth == 0 {
                    if let Some(chunk) = text_content(&event, SHARED_STRINGS_PART)? {
                        text.push_str(&chunk);
                    }
                }
            }
        }
    }

    Ok(text)
}
