//! Metadata sidecar codec
//!
//! Each data file `<path>` has a sibling `<path>.metadata` holding
//! `content-type`, `etag`, `last-modified`, and the `size` and `data-id` of
//! the data file it was written with, in the flat `key=value`
//! properties format: one entry per line, `#`/`!` comments, `=`, `:` or
//! whitespace separators, backslash escapes and `\uXXXX` for non-ASCII.

use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::types::ContentType;
use chrono::{DateTime, SecondsFormat, Utc};

const CONTENT_TYPE: &str = "content-type";
const ETAG: &str = "etag";
const LAST_MODIFIED: &str = "last-modified";
const SIZE: &str = "size";
const DATA_ID: &str = "data-id";

/// Suffix appended to a data file name to locate its sidecar
pub const SIDECAR_SUFFIX: &str = ".metadata";

/// Stored metadata of one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    pub content_type: ContentType,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Length of the data file committed with this sidecar
    pub size: Option<u64>,
    /// Identity of the data file committed with this sidecar
    pub data_id: Option<String>,
}

impl Sidecar {
    /// Render as properties text
    pub fn encode(&self) -> String {
        let content_type = self.content_type.to_string();
        let last_modified = self
            .last_modified
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        let size = self.size.map(|size| size.to_string());

        let mut entries = vec![(CONTENT_TYPE, content_type.as_str())];
        if let Some(etag) = &self.etag {
            entries.push((ETAG, etag.as_str()));
        }
        if let Some(last_modified) = &last_modified {
            entries.push((LAST_MODIFIED, last_modified.as_str()));
        }
        if let Some(size) = &size {
            entries.push((SIZE, size.as_str()));
        }
        if let Some(data_id) = &self.data_id {
            entries.push((DATA_ID, data_id.as_str()));
        }
        encode_properties(&entries)
    }

    /// Parse properties text; a missing content type means octet-stream
    pub fn decode(text: &str) -> BlobResult<Self> {
        let mut sidecar = Sidecar {
            content_type: ContentType::octet_stream(),
            etag: None,
            last_modified: None,
            size: None,
            data_id: None,
        };

        for (key, value) in decode_properties(text) {
            match key.as_str() {
                CONTENT_TYPE => {
                    sidecar.content_type = ContentType::parse(&value).map_err(|e| {
                        BlobError::general("Malformed content-type in blob metadata", e)
                    })?;
                },
                ETAG => sidecar.etag = Some(value),
                LAST_MODIFIED => {
                    let parsed = DateTime::parse_from_rfc3339(&value).map_err(|e| {
                        BlobError::general("Malformed last-modified in blob metadata", e)
                    })?;
                    sidecar.last_modified = Some(parsed.with_timezone(&Utc));
                },
                SIZE => {
                    let size = value
                        .parse()
                        .map_err(|e| BlobError::general("Malformed size in blob metadata", e))?;
                    sidecar.size = Some(size);
                },
                DATA_ID => sidecar.data_id = Some(value),
                _ => {},
            }
        }

        Ok(sidecar)
    }

    /// Whether this sidecar was committed together with a data file of the
    /// given size and identity. Sidecars without these fields match any file.
    pub fn describes(&self, size: u64, data_id: &str) -> bool {
        self.size.map_or(true, |expected| expected == size)
            && self.data_id.as_deref().map_or(true, |expected| expected == data_id)
    }
}

/// Encode key/value pairs, one per line
pub fn encode_properties(entries: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        escape_into(&mut out, key, true);
        out.push('=');
        escape_into(&mut out, value, false);
        out.push('\n');
    }
    out
}

fn escape_into(out: &mut String, text: &str, is_key: bool) {
    for (i, c) in text.chars().enumerate() {
        match c {
            ' ' if i == 0 || is_key => out.push_str("\\ "),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            },
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04X}", unit));
                }
            },
            c => out.push(c),
        }
    }
}

/// Decode properties text into key/value pairs, in order of appearance
pub fn decode_properties(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for line in logical_lines(text) {
        let (key, value) = split_entry(&line);
        entries.push((unescape(key), unescape(value)));
    }
    entries
}

/// Join continuation lines and drop blanks and comments
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let trimmed = trim_blank(raw);
        let line = match current.take() {
            Some(mut pending) => {
                pending.push_str(trimmed);
                pending
            },
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                trimmed.to_string()
            },
        };

        if ends_with_continuation(&line) {
            let mut line = line;
            line.pop();
            current = Some(line);
        } else {
            lines.push(line);
        }
    }

    if let Some(pending) = current {
        lines.push(pending);
    }
    lines
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split a logical line at the first unescaped separator
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                let key = &line[..i];
                let mut rest = trim_blank(&line[i + c.len_utf8()..]);
                // "key : value" uses the whitespace and the separator
                if c != '=' && c != ':' {
                    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
                        rest = trim_blank(stripped);
                    }
                }
                return (key, rest);
            },
            _ => {},
        }
    }
    (line, "")
}

fn trim_blank(text: &str) -> &str {
    text.trim_start_matches([' ', '\t', '\x0c'])
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut units: Vec<u16> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'u') {
            chars.next();
            let hex: String = chars.by_ref().take(4).collect();
            if let Ok(unit) = u16::from_str_radix(&hex, 16) {
                units.push(unit);
                continue;
            }
            flush_units(&mut out, &mut units);
            out.push_str(&hex);
            continue;
        }

        flush_units(&mut out, &mut units);
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some(other) => out.push(other),
            None => {},
        }
    }

    flush_units(&mut out, &mut units);
    out
}

fn flush_units(out: &mut String, units: &mut Vec<u16>) {
    if !units.is_empty() {
        out.extend(char::decode_utf16(units.drain(..)).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)));
    }
}
