//! Sheet list of an OOXML workbook

use crate::error::{Result, SheetError};
use crate::package::xml::attribute;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// A `<sheet>` of `xl/workbook.xml` with its resolved worksheet part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    /// Archive path of the worksheet part
    pub part: String,
}

/// Read the sheets of `workbook.xml`, ordered by `sheetId`
///
/// Parts come from the workbook relationships when present. Sheets without a
/// relationship fall back to `xl/worksheets/sheet{sheetId}.xml`.
pub fn read_sheet_list(workbook_xml: &[u8], rels_xml: Option<&[u8]>) -> Result<Vec<SheetEntry>> {
    let targets = match rels_xml {
        Some(xml) => read_relationships(xml)?,
        None => HashMap::new(),
    };

    let mut reader = Reader::from_reader(workbook_xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        buf.clear();
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| SheetError::xml(WORKBOOK_PART, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name", WORKBOOK_PART)?.unwrap_or_default();
                let sheet_id = attribute(&e, b"sheetId", WORKBOOK_PART)?
                    .and_then(|id| id.trim().parse::<u32>().ok())
                    .unwrap_or(sheets.len() as u32 + 1);

                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| SheetError::xml(WORKBOOK_PART, err))?;
                    // r:id, whatever prefix the relationships namespace got
                    if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                        let value = attr
                            .unescape_value()
                            .map_err(|err| SheetError::xml(WORKBOOK_PART, err))?;
                        rel_id = Some(value.into_owned());
                    }
                }

                let part = rel_id
                    .and_then(|id| targets.get(&id))
                    .map(|target| resolve_target(target))
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", sheet_id));

                sheets.push(SheetEntry {
                    name,
                    sheet_id,
                    part,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    sheets.sort_by_key(|s| s.sheet_id);
    Ok(sheets)
}

/// Map relationship ids onto their targets
fn read_relationships(xml: &[u8]) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        buf.clear();
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| SheetError::xml(WORKBOOK_RELS_PART, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id", WORKBOOK_RELS_PART)?;
                let target = attribute(&e, b"Target", WORKBOOK_RELS_PART)?;
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(targets)
}

/// Relationship targets are relative to `xl/` unless they start with `/`
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Second" sheetId="2" r:id="rId7"/>
    <sheet name="First &amp; Only" sheetId="1" r:id="rId1"/>
    <sheet name="Third" sheetId="3" r:id="rId9"/>
  </sheets>
</workbook>"#;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="worksheet" Target="worksheets/data.xml"/>
  <Relationship Id="rId7" Type="worksheet" Target="/xl/worksheets/other.xml"/>
</Relationships>"#;

    #[test]
    fn test_sheet_list_with_rels() {
        let sheets = read_sheet_list(WORKBOOK.as_bytes(), Some(RELS.as_bytes())).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["First & Only", "Second", "Third"]);
        assert_eq!(sheets[0].part, "xl/worksheets/data.xml");
        assert_eq!(sheets[1].part, "xl/worksheets/other.xml");
        // no relationship for rId9
        assert_eq!(sheets[2].part, "xl/worksheets/sheet3.xml");
    }

    #[test]
    fn test_sheet_list_without_rels() {
        let sheets = read_sheet_list(WORKBOOK.as_bytes(), None).unwrap();
        assert_eq!(sheets[0].part, "xl/worksheets/sheet1.xml");
        assert_eq!(sheets[1].sheet_id, 2);
    }

    #[test]
    fn test_malformed_workbook() {
        let err = read_sheet_list(b"<workbook><sheets></workbook>", None).unwrap_err();
        assert!(matches!(err, SheetError::Xml { .. }));
    }
}
