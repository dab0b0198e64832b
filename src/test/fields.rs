/*
    deb-pool - Rust library for reading and writing Deb packages
    Copyright (C) 2023  NotSludgeBomb

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use super::init;
use crate::control::{field_spec, FieldKind, FIELDS};
use crate::textproto::{normalize_key, Reader, Writer};
use crate::*;

fn fields(input: &str) -> Result<Vec<(String, String)>> {
    Reader::new(input.as_bytes()).collect()
}

#[test]
fn folded_values_join_with_newlines() -> Result<()> {
    init();
    let got = fields("Package: foo\nDescription: short\n long line\n  more\nVersion: 1\n")?;
    assert_eq!(
        got,
        vec![
            ("Package".to_string(), "foo".to_string()),
            ("Description".to_string(), "short\nlong line\nmore".to_string()),
            ("Version".to_string(), "1".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn keys_are_normalized() -> Result<()> {
    let got = fields("package: a\nPRE-DEPENDS: b\nx-long-KEY: c\n")?;
    let keys: Vec<&str> = got.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["Package", "Pre-Depends", "X-Long-Key"]);
    assert_eq!(normalize_key("LONG-KEY"), "Long-Key");
    assert_eq!(normalize_key("built-using"), "Built-Using");
    Ok(())
}

#[test]
fn fields_keep_input_order() -> Result<()> {
    let got = fields("Package: foo\nFoo: 1\nVersion: 1.0\nBar: 2\n")?;
    let keys: Vec<&str> = got.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["Package", "Foo", "Version", "Bar"]);
    Ok(())
}

#[test]
fn empty_values_and_line_endings() -> Result<()> {
    let got = fields("Package: a\r\nDepends:\nVersion: 1\n\n\n")?;
    assert_eq!(
        got,
        vec![
            ("Package".to_string(), "a".to_string()),
            ("Depends".to_string(), String::new()),
            ("Version".to_string(), "1".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn folded_value_without_final_newline() -> Result<()> {
    assert_eq!(
        fields("Key: a\n b\n c")?,
        vec![("Key".to_string(), "a\nb\nc".to_string())]
    );
    Ok(())
}

#[test]
fn space_inside_key_is_rejected() {
    let err = fields("Bad Key: v\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(matches!(err, Error::Parse { offset: 3, .. }));
}

#[test]
fn empty_input_has_no_fields() -> Result<()> {
    assert!(fields("")?.is_empty());
    Ok(())
}

#[test]
fn whitespace_in_key_is_rejected() {
    let err = fields("Package: a\nbad key: x\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    match err {
        Error::Parse { offset, message } => {
            assert_eq!(offset, 14);
            assert!(message.contains("unexpected character in key"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn truncated_key_is_rejected() {
    let err = fields("Package: a\nVersi").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn reader_stops_after_error() {
    let mut reader = Reader::new("bad key: x\nPackage: a\n".as_bytes());
    assert!(reader.next_field().is_err());
    assert!(matches!(reader.next_field(), Ok(None)));
}

#[test]
fn oversized_record_is_refused() {
    init();
    let input = format!("Description: {}\n", "x".repeat(1000));
    let mut reader = Reader::with_limit(input.as_bytes(), 64);
    let err = reader.next_field().unwrap_err();
    assert!(matches!(err, Error::RecordTooLarge { limit: 64 }));
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn record_at_the_limit_is_accepted() -> Result<()> {
    let record = format!("Description: {}\n", "x".repeat(50));
    assert_eq!(record.len(), 64);

    let mut reader = Reader::with_limit(record.as_bytes(), 64);
    let (key, value) = reader.next_field()?.unwrap();
    assert_eq!(key, "Description");
    assert_eq!(value, "x".repeat(50));
    assert!(reader.next_field()?.is_none());

    let input = format!("{}Package: a\n", record);
    let mut reader = Reader::with_limit(input.as_bytes(), 64);
    assert_eq!(reader.next_field()?.unwrap().1, "x".repeat(50));
    assert_eq!(reader.next_field()?.unwrap(), ("Package".to_string(), "a".to_string()));

    let longer = format!("Description: {}\n", "x".repeat(51));
    let err = Reader::with_limit(longer.as_bytes(), 64).next_field().unwrap_err();
    assert!(matches!(err, Error::RecordTooLarge { limit: 64 }));
    Ok(())
}

#[test]
fn small_buffer_reads_many_records() -> Result<()> {
    let input: String = (0..200).map(|i| format!("Field-{}: value {}\n", i, i)).collect();
    let mut reader = Reader::with_limit(input.as_bytes(), 64);
    let mut count = 0;
    while let Some((key, value)) = reader.next_field()? {
        assert_eq!(key, format!("Field-{}", count));
        assert_eq!(value, format!("value {}", count));
        count += 1;
    }
    assert_eq!(count, 200);
    assert!(reader.buffer_size() <= 65);
    Ok(())
}

#[test]
fn long_folded_value_grows_buffer() -> Result<()> {
    let lines: Vec<String> = (0..500).map(|i| format!("line {}", i)).collect();
    let input = format!("Description: {}\n", lines.join("\n "));
    let mut reader = Reader::new(input.as_bytes());
    let (_, value) = reader.next_field()?.unwrap();
    assert_eq!(value, lines.join("\n"));
    assert!(reader.buffer_size() >= input.len());
    Ok(())
}

#[test]
fn writer_folds_values() -> Result<()> {
    let mut writer = Writer::new(Vec::new());
    writer.write_field("description", "a\nb\nc")?;
    writer.write_field("Package", "foo\n")?;
    assert_eq!(writer.written(), 34);
    assert_eq!(writer.into_inner(), b"Description: a\n b\n c\nPackage: foo\n");
    Ok(())
}

#[test]
fn writer_rejects_bad_keys() {
    let mut writer = Writer::new(Vec::new());
    assert_eq!(writer.write_field("", "x").unwrap_err().kind(), ErrorKind::Parse);
    assert_eq!(writer.write_field("bad key", "x").unwrap_err().kind(), ErrorKind::Parse);
    assert_eq!(writer.write_field("Key:", "x").unwrap_err().kind(), ErrorKind::Parse);
    assert!(writer.into_inner().is_empty());
}

#[test]
fn field_table_lookup() {
    assert_eq!(FIELDS.len(), 22);
    assert_eq!(FIELDS[0].name, "Package");
    assert_eq!(field_spec("Installed-Size").map(|s| s.kind), Some(FieldKind::Integer));
    assert_eq!(field_spec("Depends").map(|s| s.kind), Some(FieldKind::List));
    assert!(field_spec("X-Custom").is_none());
}

#[test]
fn control_round_trip() -> Result<()> {
    init();
    let mut control = DebControl::new();
    control.package = "hello".to_string();
    control.version = "1.0-1".to_string();
    control.architecture = "amd64".to_string();
    control.installed_size = 42;
    control.depends = vec!["libc6 (>= 2.34)".to_string(), "bash | zsh".to_string()];
    control.description = "short\nlong text\n.\nmore".to_string();
    control.extra.insert("x-custom", "yes");

    let bytes = control.to_bytes()?;
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.starts_with("Package: hello\nVersion: 1.0-1\nArchitecture: amd64\nInstalled-Size: 42\n"));
    assert!(text.contains("Depends: libc6 (>= 2.34), bash | zsh\n"));
    assert!(text.ends_with("X-Custom: yes\n"));
    assert!(!text.contains("Homepage"));

    let parsed = DebControl::read_from(bytes.as_slice(), 1024)?;
    assert_eq!(parsed, control);
    Ok(())
}

#[test]
fn unknown_fields_follow_known_ones() -> Result<()> {
    let control = DebControl::read_from(
        "Package: foo\nFoo: 1\nVersion: 1.0\nBar: 2\n".as_bytes(),
        1024,
    )?;
    assert_eq!(control.extra.keys().collect::<Vec<_>>(), ["Foo", "Bar"]);
    assert_eq!(control.field("foo").as_deref(), Some("1"));

    let text = String::from_utf8(control.to_bytes()?).unwrap();
    assert_eq!(
        text,
        "Package: foo\nVersion: 1.0\nArchitecture: \nInstalled-Size: 0\nFoo: 1\nBar: 2\n"
    );
    Ok(())
}

#[test]
fn set_field_routes_by_kind() -> Result<()> {
    let mut control = DebControl::new();
    control.set_field("depends", "a, b ,c")?;
    control.set_field("installed-size", " 7 ")?;
    control.set_field("Recommends", "")?;
    control.set_field("X-Thing", "1")?;
    control.set_field("x-thing", "2")?;

    assert_eq!(control.depends, ["a", "b", "c"]);
    assert_eq!(control.installed_size, 7);
    assert!(control.recommends.is_empty());
    assert_eq!(control.field("Recommends"), None);
    assert_eq!(control.field("Depends").as_deref(), Some("a, b, c"));
    assert_eq!(control.extra.len(), 1);
    assert_eq!(control.extra.get("X-THING"), Some("2"));
    Ok(())
}

#[test]
fn bad_integer_reports_record_offset() {
    let err = DebControl::read_from("Package: a\nInstalled-Size: lots\n".as_bytes(), 1024)
        .unwrap_err();
    match err {
        Error::Parse { offset, message } => {
            assert_eq!(offset, 11);
            assert!(message.contains("Installed-Size"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
