//! Deterministic JSON writer and JSON-Schema emitter.
//!
//! Output is a single object: `$schema` first when configured, then one key
//! per table in wire order, each an array of row objects. The string escaper
//! follows the conservative JSON rules: control characters, `"` and `\`
//! escaped, U+2028/U+2029 escaped unconditionally (they break JSONP), and
//! everything else passed through as UTF-8. Identical inputs always produce
//! identical bytes.

use crate::table::{ColumnKind, ColumnSpec, Table, Value};

/// Render the dataset as one JSON document.
pub fn write(data: &crate::Dataset, schema_url: Option<&str>) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(b'{');
    let mut first = true;
    if let Some(url) = schema_url {
        write_key(&mut out, &mut first, "$schema");
        write_str(&mut out, url);
    }
    for table in data.tables() {
        write_key(&mut out, &mut first, table.name());
        out.push(b'[');
        for row in 0..table.len() {
            if row != 0 {
                out.push(b',');
            }
            write_row(&mut out, table, row);
        }
        out.push(b']');
    }
    out.push(b'}');
    out
}

fn write_row(out: &mut Vec<u8>, table: &dyn Table, row: usize) {
    out.push(b'{');
    let mut first = true;
    for (i, col) in table.columns().iter().enumerate() {
        write_key(out, &mut first, col.json_name);
        let value = table.value(row, i);
        if col.omit_zero && value.is_zero() {
            out.extend_from_slice(b"null");
            continue;
        }
        write_value(out, value);
    }
    out.push(b'}');
}

fn write_value(out: &mut Vec<u8>, value: Value<'_>) {
    match value {
        Value::Str(s) => write_str(out, s),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
        Value::Float(v) => out.extend_from_slice(v.to_string().as_bytes()),
        Value::List(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    out.push(b',');
                }
                write_str(out, item);
            }
            out.push(b']');
        }
    }
}

/// The JSON-Schema document describing [`write`]'s output.
pub fn schema(schema_url: Option<&str>) -> Vec<u8> {
    let shape = crate::Dataset::default();
    let mut out = Vec::new();
    out.push(b'{');
    let mut first = true;
    write_key(&mut out, &mut first, "$schema");
    write_str(&mut out, "https://json-schema.org/draft/2020-12/schema");
    if let Some(url) = schema_url {
        write_key(&mut out, &mut first, "$id");
        write_str(&mut out, url);
    }
    write_key(&mut out, &mut first, "title");
    write_str(&mut out, "Recreation Schedules");
    write_key(&mut out, &mut first, "description");
    write_str(&mut out, "Simplified dataset of recreation schedules");
    write_key(&mut out, &mut first, "type");
    write_str(&mut out, "object");
    write_key(&mut out, &mut first, "properties");
    out.push(b'{');
    let mut first_table = true;
    for table in shape.tables() {
        write_key(&mut out, &mut first_table, table.name());
        write_table_schema(&mut out, table);
    }
    out.push(b'}');
    out.push(b'}');
    out
}

fn write_table_schema(out: &mut Vec<u8>, table: &dyn Table) {
    out.push(b'{');
    let mut first = true;
    write_key(out, &mut first, "type");
    write_str(out, "array");
    write_key(out, &mut first, "description");
    write_str(out, table.doc());
    write_key(out, &mut first, "items");
    out.push(b'{');
    let mut first_item = true;
    write_key(out, &mut first_item, "type");
    write_str(out, "object");
    write_key(out, &mut first_item, "properties");
    out.push(b'{');
    let mut first_col = true;
    for col in table.columns() {
        write_key(out, &mut first_col, col.json_name);
        write_column_schema(out, col);
    }
    out.push(b'}');
    out.push(b'}');
    out.push(b'}');
}

fn write_column_schema(out: &mut Vec<u8>, col: &ColumnSpec) {
    out.push(b'{');
    let mut first = true;
    write_key(out, &mut first, "description");
    write_str(out, col.doc);
    match col.kind {
        ColumnKind::StrList => {
            write_key(out, &mut first, "type");
            write_str(out, "array");
            write_key(out, &mut first, "items");
            out.push(b'{');
            let mut first_item = true;
            write_key(out, &mut first_item, "type");
            write_type(out, "string", col.omit_zero);
            if let Some(pattern) = col.pattern {
                write_key(out, &mut first_item, "pattern");
                write_str(out, pattern);
            }
            out.push(b'}');
        }
        scalar => {
            write_key(out, &mut first, "type");
            let ty = match scalar {
                ColumnKind::Str => "string",
                ColumnKind::Int => "integer",
                ColumnKind::Float => "number",
                ColumnKind::Bool => "boolean",
                ColumnKind::StrList => unreachable!("handled above"),
            };
            write_type(out, ty, col.omit_zero);
            if let Some(pattern) = col.pattern {
                write_key(out, &mut first, "pattern");
                write_str(out, pattern);
            }
        }
    }
    out.push(b'}');
}

fn write_type(out: &mut Vec<u8>, ty: &'static str, nullable: bool) {
    if nullable {
        out.push(b'[');
        write_str(out, ty);
        out.push(b',');
        write_str(out, "null");
        out.push(b']');
    } else {
        write_str(out, ty);
    }
}

fn write_key(out: &mut Vec<u8>, first: &mut bool, key: &str) {
    if !*first {
        out.push(b',');
    }
    *first = false;
    write_str(out, key);
    out.push(b':');
}

/// Append `s` as a JSON string literal.
pub(crate) fn write_str(out: &mut Vec<u8>, s: &str) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.push(b'"');
    let mut buf = [0u8; 4];
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{8}' => out.extend_from_slice(b"\\b"),
            '\u{c}' => out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                let b = c as u32;
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(b >> 4) as usize]);
                out.push(HEX[(b & 0xf) as usize]);
            }
            '\u{2028}' => out.extend_from_slice(b"\\u2028"),
            '\u{2029}' => out.extend_from_slice(b"\\u2029"),
            c => out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quoted(s: &str) -> String {
        let mut out = Vec::new();
        write_str(&mut out, s);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_escaping() {
        assert_eq!(quoted("plain"), r#""plain""#);
        assert_eq!(quoted("say \"hi\""), r#""say \"hi\"""#);
        assert_eq!(quoted("back\\slash"), r#""back\\slash""#);
        assert_eq!(quoted("a\nb\rc\td"), r#""a\nb\rc\td""#);
        assert_eq!(quoted("\u{8}"), r#""\b""#);
        assert_eq!(quoted("\u{0b}\u{0c}"), r#""\u000b\f""#);
        assert_eq!(quoted("\u{2028}\u{2029}"), r#""\u2028\u2029""#);
        // non-breaking space and the replacement character pass through
        assert_eq!(quoted("\u{a0}"), "\"\u{a0}\"");
        assert_eq!(quoted("\u{fffd}"), "\"\u{fffd}\"");
    }
}
