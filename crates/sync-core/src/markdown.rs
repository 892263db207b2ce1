//! Note header parsing and editing.
//!
//! A note header is a YAML block delimited by `---` lines at the very start of
//! the file:
//! ```markdown
//! ---
//! TodoistId: 2203306141
//! ---
//! [Home](https://todoist.com/app/project/2203306141)
//! ```
//!
//! Edits never re-serialize the whole header: existing lines are kept verbatim
//! and new keys are spliced in, so user formatting and key order survive.

use std::collections::HashMap;

/// Marker line that opens and closes the header block.
pub const HEADER_DELIMITER: &str = "---";

/// Header key linking a note to its remote project.
pub const TODOIST_ID_KEY: &str = "TodoistId";

/// Header key recording a project's name when its note is archived.
pub const PROJECT_NAME_KEY: &str = "projectName";

/// Parsed header as key-value pairs.
pub type Header = HashMap<String, serde_yaml::Value>;

/// A note split into header and body. The body borrows from the raw content.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote<'a> {
    /// Header key-value pairs (None if absent, empty or not valid YAML)
    pub header: Option<Header>,
    /// Everything after the closing delimiter line
    pub body: &'a str,
}

/// Split raw note content into the header YAML and the body, without parsing
/// the YAML.
pub fn split_header(raw: &str) -> (Option<&str>, &str) {
    let Some(after_opening) = raw.strip_prefix(HEADER_DELIMITER) else {
        return (None, raw);
    };

    let inner = if let Some(rest) = after_opening.strip_prefix('\n') {
        rest
    } else if let Some(rest) = after_opening.strip_prefix("\r\n") {
        rest
    } else {
        // `----` or `--- title` is not a header
        return (None, raw);
    };

    match find_closing_delimiter(inner) {
        Some(close_pos) => {
            let yaml = &inner[..close_pos];
            let after_close = &inner[close_pos + HEADER_DELIMITER.len()..];
            let body = after_close
                .strip_prefix("\r\n")
                .or_else(|| after_close.strip_prefix('\n'))
                .unwrap_or(after_close);
            (Some(yaml), body)
        }
        None => (None, raw),
    }
}

/// Byte offset of the closing `---` line within the header interior.
fn find_closing_delimiter(s: &str) -> Option<usize> {
    let mut pos = 0;
    for line in s.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == HEADER_DELIMITER {
            return Some(pos);
        }
        pos += line.len();
    }
    None
}

/// Parse raw note content into header and body.
pub fn parse(raw: &str) -> ParsedNote<'_> {
    let (yaml, body) = split_header(raw);

    let header = yaml.and_then(|yaml| {
        match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
            Ok(serde_yaml::Value::Mapping(map)) => {
                let header: Header = map
                    .into_iter()
                    .filter_map(|(k, v)| match k {
                        serde_yaml::Value::String(key) => Some((key, v)),
                        _ => None,
                    })
                    .collect();
                (!header.is_empty()).then_some(header)
            }
            // Empty or scalar headers, or invalid YAML: treat as no header
            _ => None,
        }
    });

    ParsedNote { header, body }
}

/// Read a header field as a string.
///
/// Ids written without quotes come back from YAML as numbers; they are
/// normalized to their decimal string form. Empty strings count as absent.
pub fn header_string(header: &Header, key: &str) -> Option<String> {
    header.get(key).and_then(scalar_string)
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    let value = match value {
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Tagged(tagged) => return scalar_string(&tagged.value),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

/// Format a string as a YAML scalar, quoting only when the plain form would
/// not read back as the same string.
pub fn yaml_scalar(value: &str) -> String {
    let plain_round_trips = match serde_yaml::from_str::<serde_yaml::Value>(value) {
        Ok(serde_yaml::Value::String(s)) => s == value && !value.contains('\n'),
        Ok(serde_yaml::Value::Number(_)) => is_plain_integer(value),
        _ => false,
    };
    if plain_round_trips {
        return value.to_string();
    }

    serde_yaml::to_string(&serde_yaml::Value::String(value.to_string()))
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

/// Decimal digits without a leading zero; reads back identically once normalized.
fn is_plain_integer(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| b.is_ascii_digit())
        && (value == "0" || !value.starts_with('0'))
}

/// Build note content with a header holding `fields` in order, followed by `body`.
pub fn render_note(fields: &[(&str, &str)], body: &str) -> String {
    let mut out = String::new();
    out.push_str(HEADER_DELIMITER);
    out.push('\n');
    for (key, value) in fields {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&yaml_scalar(value));
        out.push('\n');
    }
    out.push_str(HEADER_DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

/// Insert `key: value` as the first header line.
///
/// If the note has no header block, one is prepended. The rest of the content
/// is returned byte-for-byte unchanged.
pub fn insert_field(raw: &str, key: &str, value: &str) -> String {
    let line = format!("{}: {}", key, yaml_scalar(value));

    if split_header(raw).0.is_some() {
        let newline = if raw[HEADER_DELIMITER.len()..].starts_with("\r\n") {
            "\r\n"
        } else {
            "\n"
        };
        let split_at = HEADER_DELIMITER.len() + newline.len();
        format!("{}{}{}{}", &raw[..split_at], line, newline, &raw[split_at..])
    } else {
        format!(
            "{delim}\n{line}\n{delim}\n{raw}",
            delim = HEADER_DELIMITER,
            line = line,
            raw = raw
        )
    }
}
