//! Streaming CSV parsing and serialization.
//!
//! A single left-to-right scan with an `in_quotes` flag handles quoted
//! fields, escaped quotes (`""`), embedded delimiters, and multi-line
//! fields. The writer applies RFC4180-style quoting so parse and write
//! round-trip. Binary spreadsheet containers are rejected up front with a
//! remediation message rather than decoded.

use crate::error::InputError;

/// ZIP local-file magic: XLSX and friends are ZIP containers.
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
/// OLE2 compound-file magic: legacy XLS.
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
/// UTF-8 byte-order mark.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parse raw uploaded bytes into rows.
///
/// Rejects binary spreadsheet containers, strips a BOM, and requires at
/// least a header plus one data row.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<Vec<String>>, InputError> {
    if bytes.is_empty() {
        return Err(InputError::Empty);
    }
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE2_MAGIC) {
        return Err(InputError::ConversionRequired);
    }

    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    let rows = parse_rows(&text);

    if rows.len() < 2 {
        return Err(InputError::TooFewRows);
    }
    Ok(rows)
}

/// Parse CSV text into rows of trimmed fields.
///
/// A double quote toggles quoted mode unless doubled (`""` emits one
/// literal quote). Commas and line terminators inside quotes are content;
/// `\r\n` collapses to a single terminator. Rows whose fields are all
/// empty are discarded.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    row.push(field.trim().to_string());
                    field.clear();
                }
                '\n' | '\r' => {
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    row.push(field.trim().to_string());
                    field.clear();
                    if row.iter().any(|f| !f.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    } else {
                        row.clear();
                    }
                }
                _ => field.push(c),
            }
        }
    }

    // Final row without a trailing terminator.
    if !field.trim().is_empty() || !row.is_empty() {
        row.push(field.trim().to_string());
        if row.iter().any(|f| !f.is_empty()) {
            rows.push(row);
        }
    }

    rows
}

/// Escape a single field for CSV output.
///
/// Wraps in quotes (doubling internal quotes) when the field contains a
/// comma, quote, newline, or leading/trailing whitespace. A no-op for
/// already-safe values.
pub fn escape_field(field: &str) -> String {
    let needs_quoting = field.contains(',')
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r')
        || field != field.trim();

    if needs_quoting {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Serialize rows to CSV text. No trailing newline; the parser accepts a
/// final row without a terminator.
pub fn write_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|f| escape_field(f))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
