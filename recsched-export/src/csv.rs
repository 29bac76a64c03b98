//! Deterministic CSV writer.
//!
//! The dialect is RFC 4180 with CRLF row endings and one extra quoting rule:
//! a field whose first rune is Unicode whitespace is quoted, as is the
//! PostgreSQL end-of-data marker `\.`. List-valued columns are written as a
//! single quoted field with comma-joined elements; an element containing a
//! comma cannot be represented and is an error.

use crate::error::{Error, Result};
use crate::table::{Table, Value};

const COMMA: u8 = b',';

/// Write one table: a header row, then one row per entry.
pub fn write_table(out: &mut Vec<u8>, table: &dyn Table) -> Result<()> {
    let columns = table.columns();
    for (i, col) in columns.iter().enumerate() {
        if i != 0 {
            out.push(COMMA);
        }
        write_string(out, col.csv_name);
    }
    out.extend_from_slice(b"\r\n");

    for row in 0..table.len() {
        for (i, col) in columns.iter().enumerate() {
            if i != 0 {
                out.push(COMMA);
            }
            let value = table.value(row, i);
            if col.omit_zero && value.is_zero() {
                continue;
            }
            write_value(out, col.csv_name, value)?;
        }
        out.extend_from_slice(b"\r\n");
    }
    Ok(())
}

/// Render every table of `data` in wire order.
pub fn tables(data: &crate::Dataset) -> Result<Vec<(&'static str, Vec<u8>)>> {
    let mut out = Vec::new();
    for table in data.tables() {
        let mut buf = Vec::new();
        write_table(&mut buf, table)?;
        out.push((table.name(), buf));
    }
    Ok(out)
}

/// The `schema.csv` document: `table,column,description`, one row per
/// column of every table.
pub fn schema() -> Vec<u8> {
    let shape = crate::Dataset::default();
    let mut out = Vec::new();
    out.extend_from_slice(b"table,column,description\r\n");
    for table in shape.tables() {
        for col in table.columns() {
            write_string(&mut out, table.name());
            out.push(COMMA);
            write_string(&mut out, col.csv_name);
            out.push(COMMA);
            write_string(&mut out, col.doc);
            out.extend_from_slice(b"\r\n");
        }
    }
    out
}

fn write_value(out: &mut Vec<u8>, column: &'static str, value: Value<'_>) -> Result<()> {
    match value {
        Value::Str(s) => write_string(out, s),
        Value::Bool(v) => out.push(if v { b'1' } else { b'0' }),
        Value::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
        Value::Float(v) => out.extend_from_slice(v.to_string().as_bytes()),
        Value::List(items) => {
            if items.is_empty() {
                return Ok(());
            }
            out.push(b'"');
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    out.push(COMMA);
                }
                if item.contains(',') {
                    return Err(Error::InvalidListItem {
                        column,
                        value: item.clone(),
                    });
                }
                write_quoted(out, item);
            }
            out.push(b'"');
        }
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, field: &str) {
    if !needs_quotes(field) {
        out.extend_from_slice(field.as_bytes());
        return;
    }
    out.push(b'"');
    write_quoted(out, field);
    out.push(b'"');
}

/// Write the inside of a quoted field: quotes doubled, bare LF normalized
/// to CRLF.
fn write_quoted(out: &mut Vec<u8>, field: &str) {
    for b in field.bytes() {
        match b {
            b'"' => out.extend_from_slice(b"\"\""),
            b'\n' => out.extend_from_slice(b"\r\n"),
            b'\r' => out.push(b'\r'),
            _ => out.push(b),
        }
    }
}

fn needs_quotes(field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    if field == "\\." {
        return true;
    }
    if field
        .bytes()
        .any(|b| b == b'\n' || b == b'\r' || b == b'"' || b == COMMA)
    {
        return true;
    }
    field.chars().next().is_some_and(|c| c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(s: &str) -> String {
        let mut out = Vec::new();
        write_string(&mut out, s);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_fields_unquoted() {
        assert_eq!(field("hello"), "hello");
        assert_eq!(field(""), "");
        assert_eq!(field("with space inside"), "with space inside");
        assert_eq!(field("trailing "), "trailing ");
    }

    #[test]
    fn test_special_fields_quoted() {
        assert_eq!(field("a,b"), "\"a,b\"");
        assert_eq!(field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(field("line\nbreak"), "\"line\r\nbreak\"");
        assert_eq!(field("cr\rhere"), "\"cr\rhere\"");
    }

    #[test]
    fn test_leading_whitespace_quoted() {
        assert_eq!(field(" leading"), "\" leading\"");
        assert_eq!(field("\tleading"), "\"\tleading\"");
        // non-breaking space counts as whitespace too
        assert_eq!(field("\u{a0}x"), "\"\u{a0}x\"");
    }

    #[test]
    fn test_end_of_data_marker_quoted() {
        assert_eq!(field("\\."), "\"\\.\"");
        assert_eq!(field("\\.more"), "\\.more");
    }

    #[test]
    fn test_list_rejects_embedded_comma() {
        let items = vec!["ok".to_string(), "not,ok".to_string()];
        let mut out = Vec::new();
        let err = write_value(&mut out, "links", Value::List(&items)).unwrap_err();
        assert!(matches!(err, Error::InvalidListItem { column: "links", .. }));
    }

    #[test]
    fn test_list_written_as_single_quoted_field() {
        let items = vec!["a".to_string(), "b".to_string()];
        let mut out = Vec::new();
        write_value(&mut out, "links", Value::List(&items)).unwrap();
        assert_eq!(out, b"\"a,b\"");
    }

    #[test]
    fn test_schema_has_one_row_per_column() {
        let schema = String::from_utf8(schema()).unwrap();
        let shape = crate::Dataset::default();
        let expected: usize = shape.tables().iter().map(|t| t.columns().len()).sum();
        // header plus one line per column, CRLF-terminated
        assert_eq!(schema.matches("\r\n").count(), expected + 1);
        assert!(schema.starts_with("table,column,description\r\n"));
        assert!(schema.contains("facility,facility_url,"));
        assert!(schema.contains("activity,activity_reservation_links,"));
    }
}
