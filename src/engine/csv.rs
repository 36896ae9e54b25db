//! Minimal comma-separated codec for table files (RFC 4180 quoting).

/// Parse CSV text into a header and records of raw fields.
///
/// # Errors
///
/// Returns a message when a quoted field is not terminated or a record's field count
/// differs from the header's.
pub fn read(text: &str) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_records(text)?;
    if records.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let header = records.remove(0);
    for (i, record) in records.iter().enumerate() {
        if record.len() != header.len() {
            return Err(format!(
                "record {} has {} fields, header has {}",
                i + 2,
                record.len(),
                header.len()
            ));
        }
    }
    Ok((header, records))
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut line_has_content = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                line_has_content = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                line_has_content = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if line_has_content || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                line_has_content = false;
            }
            _ => {
                field.push(c);
                line_has_content = true;
            }
        }
    }
    if in_quotes {
        return Err("quoted field is not terminated".to_string());
    }
    if line_has_content || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

/// Encode a header and records as CSV text with `\n` line endings.
#[must_use]
pub fn write(header: &[String], records: &[Vec<String>]) -> String {
    let mut out = String::new();
    write_record(&mut out, header);
    for record in records {
        write_record(&mut out, record);
    }
    out
}

fn write_record(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // a lone empty field would otherwise be an empty line, which reads as no record
        let needs_quotes = field.contains([',', '"', '\n', '\r'])
            || (fields.len() == 1 && field.is_empty())
            || field.starts_with(' ')
            || field.ends_with(' ');
        if needs_quotes {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quoted_fields_and_crlf() {
        let (header, records) = read("a,b\r\n1,\"x, \"\"y\"\"\"\r\n2,\"multi\nline\"\r\n").unwrap();
        assert_eq!(header, vec!["a", "b"]);
        assert_eq!(records[0], vec!["1", "x, \"y\""]);
        assert_eq!(records[1], vec!["2", "multi\nline"]);
    }

    #[test]
    fn rejects_ragged_records() {
        let err = read("a,b\n1\n").unwrap_err();
        assert_eq!(err, "record 2 has 1 fields, header has 2");
    }

    #[test]
    fn written_text_reads_back() {
        let header = vec!["col1".to_string(), "col2".to_string()];
        let records = vec![vec!["1".to_string(), "a,\"b\"".to_string()]];
        let text = write(&header, &records);
        assert_eq!(text, "col1,col2\n1,\"a,\"\"b\"\"\"\n");
        assert_eq!(read(&text).unwrap(), (header, records));
    }

    #[test]
    fn empty_quoted_field_is_kept() {
        let (_, records) = read("a\n\"\"\n").unwrap();
        assert_eq!(records, vec![vec![String::new()]]);
        assert_eq!(write(&["a".to_string()], &records), "a\n\"\"\n");
    }
}
