//! Fixture builders shared by the integration tests
#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;

pub type SheetData<'a> = (&'a str, &'a [&'a [&'a str]]);

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_letter(mut col: usize) -> String {
    let mut out = String::new();
    col += 1;
    while col > 0 {
        col -= 1;
        out.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }
    out
}

pub fn write_zip(parts: &[(String, String)]) -> NamedTempFile {
    let temp = NamedTempFile::new().unwrap();
    let file = std::fs::File::create(temp.path()).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in parts {
        zip.start_file(name.as_str(), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    temp
}

/// Build an `.xlsx` package; numeric-looking cells become `<v>` numbers,
/// everything else goes through the shared string table, empty cells are left out
pub fn write_xlsx(sheets: &[SheetData<'_>]) -> NamedTempFile {
    write_xlsx_parts(sheets, true)
}

pub fn write_xlsx_parts(sheets: &[SheetData<'_>], with_shared_strings: bool) -> NamedTempFile {
    let mut strings: Vec<String> = Vec::new();
    let mut parts = Vec::new();

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (i, (name, rows)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(name),
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));

        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}" spans="1:{}">"#, r + 1, row.len()));
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let reference = format!("{}{}", column_letter(c), r + 1);
                if value.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value));
                } else {
                    let index = match strings.iter().position(|s| s == value) {
                        Some(index) => index,
                        None => {
                            strings.push(value.to_string());
                            strings.len() - 1
                        }
                    };
                    sheet.push_str(&format!(
                        r#"<c r="{}" t="s"><v>{}</v></c>"#,
                        reference, index
                    ));
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet));
    }

    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let mut sst = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
        strings.len(),
        strings.len()
    );
    for s in &strings {
        sst.push_str(&format!("<si><t>{}</t></si>", escape(s)));
    }
    sst.push_str("</sst>");

    parts.push(("xl/workbook.xml".to_string(), workbook));
    parts.push(("xl/_rels/workbook.xml.rels".to_string(), rels));
    if with_shared_strings {
        parts.push(("xl/sharedStrings.xml".to_string(), sst));
    }
    write_zip(&parts)
}

/// Build an `.ods` package, one paragraph per non-empty cell
pub fn write_ods(sheets: &[SheetData<'_>]) -> NamedTempFile {
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2"><office:body><office:spreadsheet>"#,
    );
    for (name, rows) in sheets {
        content.push_str(&format!(r#"<table:table table:name="{}">"#, escape(name)));
        for row in rows.iter() {
            content.push_str("<table:table-row>");
            for value in row.iter() {
                if value.is_empty() {
                    content.push_str("<table:table-cell/>");
                } else {
                    content.push_str(&format!(
                        r#"<table:table-cell office:value-type="string"><text:p>{}</text:p></table:table-cell>"#,
                        escape(value)
                    ));
                }
            }
            content.push_str("</table:table-row>");
        }
        content.push_str("</table:table>");
    }
    content.push_str("</office:spreadsheet></office:body></office:document-content>");

    write_zip(&[
        (
            "mimetype".to_string(),
            "application/vnd.oasis.opendocument.spreadsheet".to_string(),
        ),
        ("content.xml".to_string(), content),
    ])
}

/// A BIFF record: code, length, data
pub fn record(code: u16, data: &[u8]) -> Vec<u8> {
    let mut out = code.to_le_bytes().to_vec();
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// BIFF8 BOF record for a substream type
pub fn bof(substream: u16) -> Vec<u8> {
    let mut data = 0x0600u16.to_le_bytes().to_vec();
    data.extend_from_slice(&substream.to_le_bytes());
    data.extend_from_slice(&[0; 12]);
    record(0x0809, &data)
}

enum XlsSheet {
    Work { name: String, rows: Vec<Vec<String>> },
    Chart { name: String },
}

/// Builder for BIFF8 workbook streams
#[derive(Default)]
pub struct XlsFixture {
    sheets: Vec<XlsSheet>,
    encrypted: bool,
}

impl XlsFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric-looking cells become NUMBER records, the rest LABELSST
    pub fn sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        self.sheets.push(XlsSheet::Work {
            name: name.to_string(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        });
        self
    }

    pub fn sheet_owned(mut self, name: &str, rows: Vec<Vec<String>>) -> Self {
        self.sheets.push(XlsSheet::Work {
            name: name.to_string(),
            rows,
        });
        self
    }

    /// A chart substream listed as a regular sheet
    pub fn chart(mut self, name: &str) -> Self {
        self.sheets.push(XlsSheet::Chart {
            name: name.to_string(),
        });
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn stream(&self) -> Vec<u8> {
        let mut strings: Vec<String> = Vec::new();
        for sheet in &self.sheets {
            if let XlsSheet::Work { rows, .. } = sheet {
                for value in rows.iter().flatten() {
                    if !value.is_empty() && value.parse::<f64>().is_err() && !strings.contains(value)
                    {
                        strings.push(value.clone());
                    }
                }
            }
        }

        let mut globals = bof(0x0005);
        if self.encrypted {
            globals.extend(record(0x002F, &[0; 6]));
        }
        globals.extend(sst_records(&strings));
        globals.extend(record(0x00E0, &[0; 20]));

        let mut offset_fields = Vec::new();
        for sheet in &self.sheets {
            let name = match sheet {
                XlsSheet::Work { name, .. } | XlsSheet::Chart { name } => name,
            };
            offset_fields.push(globals.len() + 4);
            let mut data = vec![0u8; 6];
            data.push(name.len() as u8);
            data.push(0);
            data.extend_from_slice(name.as_bytes());
            globals.extend(record(0x0085, &data));
        }
        globals.extend(record(0x000A, &[]));

        let mut substreams = Vec::new();
        for sheet in &self.sheets {
            let mut sub = Vec::new();
            match sheet {
                XlsSheet::Chart { .. } => {
                    sub.extend(bof(0x0020));
                }
                XlsSheet::Work { rows, .. } => {
                    sub.extend(bof(0x0010));
                    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
                    let mut dimension = vec![0u8; 14];
                    dimension[4..8].copy_from_slice(&(rows.len() as u32).to_le_bytes());
                    dimension[10..12].copy_from_slice(&(cols as u16).to_le_bytes());
                    sub.extend(record(0x0200, &dimension));

                    for (r, row) in rows.iter().enumerate() {
                        for (c, value) in row.iter().enumerate() {
                            if value.is_empty() {
                                continue;
                            }
                            let mut data = (r as u16).to_le_bytes().to_vec();
                            data.extend_from_slice(&(c as u16).to_le_bytes());
                            data.extend_from_slice(&0u16.to_le_bytes());
                            match value.parse::<f64>() {
                                Ok(number) => {
                                    data.extend_from_slice(&number.to_le_bytes());
                                    sub.extend(record(0x0203, &data));
                                }
                                Err(_) => {
                                    let index = strings.iter().position(|s| s == value).unwrap();
                                    data.extend_from_slice(&(index as u32).to_le_bytes());
                                    sub.extend(record(0x00FD, &data));
                                }
                            }
                        }
                    }
                }
            }
            sub.extend(record(0x000A, &[]));
            substreams.push(sub);
        }

        let mut offset = globals.len();
        for (field, sub) in offset_fields.iter().zip(&substreams) {
            globals[*field..*field + 4].copy_from_slice(&(offset as u32).to_le_bytes());
            offset += sub.len();
        }

        let mut stream = globals;
        for sub in substreams {
            stream.extend(sub);
        }
        stream
    }

    /// Write the stream as "Workbook" inside a version 3 compound file
    pub fn write(&self) -> NamedTempFile {
        write_compound_file(&self.stream())
    }
}

/// SST plus CONTINUE records, split on string boundaries
fn sst_records(strings: &[String]) -> Vec<u8> {
    let mut fragments: Vec<Vec<u8>> = Vec::new();
    let mut current = Vec::new();
    current.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    current.extend_from_slice(&(strings.len() as u32).to_le_bytes());

    for s in strings {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut entry = (units.len() as u16).to_le_bytes().to_vec();
        if s.is_ascii() {
            entry.push(0);
            entry.extend_from_slice(s.as_bytes());
        } else {
            entry.push(1);
            for unit in units {
                entry.extend_from_slice(&unit.to_le_bytes());
            }
        }
        if current.len() + entry.len() > 8000 {
            fragments.push(std::mem::take(&mut current));
        }
        current.extend(entry);
    }
    fragments.push(current);

    let mut out = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        let code = if i == 0 { 0x00FC } else { 0x003C };
        out.extend(record(code, fragment));
    }
    out
}

pub fn write_compound_file(workbook: &[u8]) -> NamedTempFile {
    let temp = NamedTempFile::new().unwrap();
    let file = std::fs::File::create(temp.path()).unwrap();
    let mut compound = cfb::CompoundFile::create_with_version(cfb::Version::V3, file).unwrap();
    {
        let mut stream = compound.create_stream("/Workbook").unwrap();
        stream.write_all(workbook).unwrap();
        stream.flush().unwrap();
    }
    compound.flush().unwrap();
    temp
}
