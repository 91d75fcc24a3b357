mod common;

use common::{record, write_compound_file, XlsFixture};
use sheetstream::ole::CompoundFile;
use sheetstream::xls::BiffVersion;
use sheetstream::{ErrorKind, ReaderConfig, SheetError, SpreadsheetReader, XlsReader};
use std::io::Write;

const LEDGER: &[&[&str]] = &[
    &["Item", "Amount"],
    &["Grüße", "12.5"],
    &["rent", "-800"],
];

#[test]
fn test_read_small_workbook() {
    let file = XlsFixture::new().sheet("Ledger", LEDGER).write();
    let mut reader = XlsReader::open(file.path()).unwrap();

    assert_eq!(reader.workbook().version(), BiffVersion::Biff8);
    assert!(!reader.workbook().is_1904());
    assert_eq!(reader.sheets(), &["Ledger".to_string()]);

    let rows: Vec<Vec<String>> = reader.rows().unwrap().map(|r| r.unwrap().cells).collect();
    assert_eq!(
        rows,
        vec![
            vec!["Item".to_string(), "Amount".to_string()],
            vec!["Grüße".to_string(), "12.5".to_string()],
            vec!["rent".to_string(), "-800".to_string()],
        ]
    );

    let sheet = reader.active_sheet().unwrap();
    assert_eq!(sheet.row_count(), 3);
    assert_eq!(sheet.column_count(), 2);
    assert_eq!(sheet.declared_rows(), 3);
    assert_eq!(sheet.declared_columns(), 2);
    assert!(sheet.merged_ranges().is_empty());
    // default offsets are 1-based
    assert_eq!(sheet.value(2, 1), "Grüße");
    assert_eq!(sheet.raw(2, 2), Some(12.5));
    assert_eq!(sheet.value(9, 9), "");
}

#[test]
fn test_zero_based_offsets() {
    let file = XlsFixture::new().sheet("Ledger", LEDGER).write();
    let config = ReaderConfig::default().with_offsets(0, 0);
    let reader = XlsReader::open_with_config(file.path(), config).unwrap();

    let sheet = reader.active_sheet().unwrap();
    assert_eq!(sheet.value(0, 0), "Item");
    assert_eq!(sheet.value(2, 1), "-800");
}

#[test]
fn test_large_stream_uses_big_blocks() {
    let rows: Vec<Vec<String>> = (0..600)
        .map(|r| {
            vec![
                format!("label-row-{:04}", r),
                (r * 3).to_string(),
                format!("{}.25", r),
            ]
        })
        .collect();
    let fixture = XlsFixture::new().sheet_owned("Big", rows);
    let stream = fixture.stream();
    assert!(stream.len() > 8000);

    let file = fixture.write();
    let compound = CompoundFile::open_path(file.path()).unwrap();
    let first = compound.workbook_stream().unwrap();
    let second = compound.workbook_stream().unwrap();
    assert_eq!(first, stream);
    assert_eq!(first, second);

    let mut reader = XlsReader::open(file.path()).unwrap();
    assert_eq!(reader.count(), 600);
    reader.seek(600).unwrap();
    let last = reader.current().unwrap().map(|r| r.to_vec());
    assert_eq!(
        last,
        Some(vec![
            "label-row-0599".to_string(),
            "1797".to_string(),
            "599.25".to_string()
        ])
    );
    // shared strings spilled into CONTINUE records
    assert_eq!(reader.workbook().shared_strings().len(), 600);
}

#[test]
fn test_small_stream_matches_fixture() {
    let fixture = XlsFixture::new().sheet("Ledger", LEDGER);
    let stream = fixture.stream();
    assert!(stream.len() < 4096);

    let file = fixture.write();
    let compound = CompoundFile::open_path(file.path()).unwrap();
    assert_eq!(compound.workbook_stream().unwrap(), stream);
    assert!(compound.entries().iter().any(|e| e.name == "Workbook"));
}

#[test]
fn test_from_workbook_stream() {
    let stream = XlsFixture::new().sheet("Ledger", LEDGER).stream();
    let mut reader = XlsReader::from_workbook_stream(&stream, &ReaderConfig::default()).unwrap();
    let first = reader.current().unwrap().map(|r| r.to_vec());
    assert_eq!(first, Some(vec!["Item".to_string(), "Amount".to_string()]));
}

#[test]
fn test_chart_sheet_is_skipped() {
    let file = XlsFixture::new()
        .sheet("Data", LEDGER)
        .chart("Chart1")
        .sheet("More", &[&["tail"]])
        .write();
    let mut reader = XlsReader::open(file.path()).unwrap();

    assert_eq!(reader.sheets(), &["Data".to_string(), "More".to_string()]);
    reader.change_sheet(1).unwrap();
    let row = reader.current().unwrap().map(|r| r.to_vec());
    assert_eq!(row, Some(vec!["tail".to_string()]));
}

#[test]
fn test_encrypted_workbook_rejected() {
    let file = XlsFixture::new().sheet("Data", LEDGER).encrypted().write();
    let err = XlsReader::open(file.path()).unwrap_err();
    assert!(matches!(err, SheetError::NotSupported(_)));
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn test_bad_signature() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0x50, 0x4B, 0x03, 0x04]).unwrap();
    file.write_all(&[0u8; 1024]).unwrap();
    file.flush().unwrap();

    let err = XlsReader::open(file.path()).unwrap_err();
    assert!(matches!(err, SheetError::InvalidFormat(_)));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = XlsReader::open(dir.path().join("absent.xls")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_truncated_workbook_stream() {
    // globals BOF only, no EOF and no sheets
    let mut stream = common::bof(0x0005);
    stream.extend(record(0x0042, &1200u16.to_le_bytes()));
    let file = write_compound_file(&stream);

    let err = XlsReader::open(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_workbook_without_worksheets() {
    let file = XlsFixture::new().chart("Only chart").write();
    let err = XlsReader::open(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}
