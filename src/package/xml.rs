//! quick-xml helpers shared by the XLSX and ODS decoders

use crate::error::{Result, SheetError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Pull parser over an extracted part
pub type PartReader = Reader<BufReader<File>>;

/// Open an extracted part for pull parsing
pub fn open_part(path: &Path) -> Result<PartReader> {
    let file = File::open(path)?;
    Ok(Reader::from_reader(BufReader::new(file)))
}

/// Unescaped value of the attribute with qualified name `name`
pub fn attribute(element: &BytesStart<'_>, name: &[u8], part: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| SheetError::xml(part, e))?;
        if attr.key.as_ref() == name {
            let value = attr.unescape_value().map_err(|e| SheetError::xml(part, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Character data carried by a text or CDATA event
pub fn text_content(event: &Event<'_>, part: &str) -> Result<Option<String>> {
    match event {
        Event::Text(text) => {
            let value = text.unescape().map_err(|e| SheetError::xml(part, e))?;
            Ok(Some(value.into_owned()))
        }
        Event::CData(data) => Ok(Some(String::from_utf8_lossy(data).into_owned())),
        _ => Ok(None),
    }
}
