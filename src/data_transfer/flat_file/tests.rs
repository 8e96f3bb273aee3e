use super::*;
use crate::data_transfer::frame::CellValue;
use crate::data_transfer::mapper::ColumnDomain;
use crate::error::ErrorKind;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_parse_delimiter() {
    assert_eq!(parse_delimiter(",").unwrap(), b',');
    assert_eq!(parse_delimiter("|").unwrap(), b'|');
    assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
    assert_eq!(parse_delimiter("tab").unwrap(), b'\t');

    for bad in ["", ",,", "é", "\""] {
        let err = parse_delimiter(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError, "delimiter {:?}", bad);
    }
}

#[test]
fn test_dedupe_header() {
    let names = vec!["a", "b", "a", "", "a"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(
        dedupe_header(names),
        vec!["a", "b", "a.1", "column_4", "a.2"]
    );
}

#[test]
fn test_read_header_ignores_data_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "h.csv", "\u{feff}id,name\n1,x,extra\n");

    assert_eq!(read_header(&path, b',').unwrap(), vec!["id", "name"]);
}

#[test]
fn test_read_frame_with_header_infers_domains() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "events.csv",
        "id|score|active|ts|label\n1|1.5|true|2024-01-01 10:00:00|a\n2|2|false|2024-01-02 11:00:00|\n",
    );

    let frame = read_frame(&path, b'|', true).unwrap();
    assert!(frame.header_derived());
    assert_eq!(frame.row_count(), 2);
    assert_eq!(
        frame.schema().columns,
        vec![
            ("id".to_string(), ColumnDomain::Integer),
            ("score".to_string(), ColumnDomain::Float),
            ("active".to_string(), ColumnDomain::Boolean),
            ("ts".to_string(), ColumnDomain::Timestamp),
            ("label".to_string(), ColumnDomain::Text),
        ]
    );
    assert_eq!(frame.columns()[4].values[1], CellValue::Null);
}

#[test]
fn test_read_frame_headerless_uses_positional_names() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "raw.tsv", "1\tx\n2\ty\tz\n");

    let frame = read_frame(&path, b'\t', false).unwrap();
    assert!(!frame.header_derived());
    assert_eq!(frame.column_names(), vec!["column_1", "column_2", "column_3"]);
    assert_eq!(frame.columns()[2].values[0], CellValue::Null);
}

#[test]
fn test_read_frame_rejects_rows_wider_than_header() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "wide.csv", "a,b\n1,2\n3,4,5\n");

    let err = read_frame(&path, b',', true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(err.to_string().contains("Line 3"));
}

#[test]
fn test_read_frame_empty_and_header_only_files() {
    let dir = TempDir::new().unwrap();

    let empty = write_file(&dir, "empty.csv", "");
    let frame = read_frame(&empty, b',', true).unwrap();
    assert_eq!(frame.column_count(), 0);
    assert_eq!(frame.row_count(), 0);

    let header_only = write_file(&dir, "header.csv", "a,b\n");
    let frame = read_frame(&header_only, b',', true).unwrap();
    assert_eq!(frame.column_names(), vec!["a", "b"]);
    assert_eq!(frame.row_count(), 0);
}

#[test]
fn test_read_frame_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = read_frame(&dir.path().join("nope.csv"), b',', true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_sample_frame_is_bounded() {
    let dir = TempDir::new().unwrap();
    let mut contents = String::from("n\n");
    for i in 0..250 {
        contents.push_str(&format!("{}\n", i));
    }
    let path = write_file(&dir, "many.csv", &contents);

    let frame = sample_frame(&path, b',', SAMPLE_ROWS).unwrap();
    assert_eq!(frame.row_count(), SAMPLE_ROWS);
    assert_eq!(frame.columns()[0].domain, ColumnDomain::Integer);
}

#[test]
fn test_write_frame_minimal_quoting() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "in.csv", "id,note\n1,\"hello, world\"\n2,\n");
    let frame = read_frame(&source, b',', true).unwrap();

    let target = dir.path().join("nested/out.csv");
    let written = write_frame(&frame, &target, b',', true, QuoteMode::Minimal).unwrap();

    assert_eq!(written, 2);
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "id,note\n1,\"hello, world\"\n2,\n"
    );
}

#[test]
fn test_write_frame_without_header_and_quote_all() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "in.csv", "id,flag\n1,true\n");
    let frame = read_frame(&source, b',', true).unwrap();

    let target = dir.path().join("out.psv");
    write_frame(&frame, &target, b'|', false, QuoteMode::All).unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "\"1\"|\"true\"\n");
}

#[test]
fn test_write_frame_into_directory_is_write_error() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "in.csv", "id\n1\n");
    let frame = read_frame(&source, b',', true).unwrap();

    let err = write_frame(&frame, dir.path(), b',', true, QuoteMode::Minimal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteError);
}
