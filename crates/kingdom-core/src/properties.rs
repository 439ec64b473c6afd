//! Line-oriented `key=value` attribute sets, in the format player save files
//! and remote player records are written in.
//!
//! Comments start with `#` or `!`. A key ends at the first unescaped `=`,
//! `:` or whitespace. A line ending in an odd number of backslashes
//! continues on the next line.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::str::Chars;

use crate::time::timestamp_now;

/// An ordered attribute set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse text into an attribute set. Malformed lines are tolerated the
    /// same way a lenient reader would: whatever precedes the separator is
    /// the key, the rest is the value.
    pub fn parse(text: &str) -> Self {
        let mut props = Self::new();
        for line in logical_lines(text) {
            let (key, value) = split_entry(&line);
            props.entries.insert(unescape(key), unescape(value));
        }
        props
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set `key` to `value`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse raw file or record bytes. Valid UTF-8 is read as such; anything
    /// else is read as ISO-8859-1, so every byte sequence loads.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::parse(&decode_text(bytes))
    }

    /// Serialize with a `#comment` line and a `#timestamp` line on top.
    /// Characters outside printable ASCII are written as `\uXXXX`, so the
    /// output is plain ASCII.
    pub fn store(&self, comment: &str) -> String {
        let mut out = String::new();
        for line in comment.lines() {
            out.push('#');
            out.push_str(line);
            out.push('\n');
        }
        out.push('#');
        out.push_str(&timestamp_now());
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str(&escape(key, true));
            out.push('=');
            out.push_str(&escape(value, false));
            out.push('\n');
        }
        out
    }
}

/// Decode bytes as UTF-8, falling back to ISO-8859-1.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Join continuation lines and drop blanks and comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let trimmed = raw.trim_start_matches([' ', '\t', '\u{c}']);
        let mut buf = match current.take() {
            Some(buf) => buf,
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                String::new()
            },
        };

        let trailing = trimmed.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            buf.push_str(&trimmed[..trimmed.len() - 1]);
            current = Some(buf);
        } else {
            buf.push_str(trimmed);
            lines.push(buf);
        }
    }
    if let Some(buf) = current {
        lines.push(buf);
    }
    lines
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\u{c}' => {
                key_end = i;
                break;
            },
            _ => {},
        }
    }

    let key = &line[..key_end];
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\u{c}']);
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .map_or(rest, |r| r.trim_start_matches([' ', '\t', '\u{c}']));
    (key, rest)
}

const HIGH_SURROGATES: std::ops::Range<u32> = 0xD800..0xDC00;
const LOW_SURROGATES: std::ops::Range<u32> = 0xDC00..0xE000;

/// Decode the `\uXXXX` low half following a high surrogate `high`.
fn low_surrogate(high: u32, mut ahead: Chars<'_>) -> Option<(char, Chars<'_>)> {
    if ahead.next() != Some('\\') || ahead.next() != Some('u') {
        return None;
    }
    let hex: String = ahead.by_ref().take(4).collect();
    let low = u32::from_str_radix(&hex, 16).ok()?;
    if !LOW_SURROGATES.contains(&low) {
        return None;
    }
    let decoded = char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))?;
    Some((decoded, ahead))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let Ok(unit) = u32::from_str_radix(&hex, 16) else {
                    out.push('u');
                    out.push_str(&hex);
                    continue;
                };
                if HIGH_SURROGATES.contains(&unit)
                    && let Some((decoded, rest)) = low_surrogate(unit, chars.clone())
                {
                    out.push(decoded);
                    chars = rest;
                    continue;
                }
                out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
            },
            Some(other) => out.push(other),
            None => {},
        }
    }
    out
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            },
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            c if !(' '..='~').contains(&c) => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04X}");
                }
            },
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_entries_and_skips_comments() {
        let text = concat!(
            "#Character data\n#1700000000Z\nloggedin=true\n",
            "! bang comment\n\ngold = 500\nname:Bob\n",
        );
        let props = Properties::parse(text);
        assert_eq!(props.len(), 3);
        assert_eq!(props.get("loggedin"), Some("true"));
        assert_eq!(props.get("gold"), Some("500"));
        assert_eq!(props.get("name"), Some("Bob"));
        assert_eq!(props.get("missing"), None);
    }

    #[test]
    fn whitespace_separates_key_from_value() {
        let props = Properties::parse("skill   99 maxed");
        assert_eq!(props.get("skill"), Some("99 maxed"));
    }

    #[test]
    fn key_without_value_is_empty() {
        let props = Properties::parse("flag\n");
        assert_eq!(props.get("flag"), Some(""));
    }

    #[test]
    fn continuation_lines_are_joined() {
        let props = Properties::parse("motd=hello \\\n    world\n");
        assert_eq!(props.get("motd"), Some("hello world"));
    }

    #[test]
    fn escaped_backslash_does_not_continue() {
        let props = Properties::parse("path=c:\\\\\nnext=1\n");
        assert_eq!(props.get("path"), Some("c:\\"));
        assert_eq!(props.get("next"), Some("1"));
    }

    #[test]
    fn unicode_escape_decodes() {
        let props = Properties::parse("sym=\\u00e9t\\u00e9");
        assert_eq!(props.get("sym"), Some("été"));
    }

    #[test]
    fn store_writes_header_and_escapes() {
        let mut props = Properties::new();
        props.set("a key", "x=y");
        props.set("loggedin", "false");
        let text = props.store("Player save");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("#Player save"));
        assert!(lines.next().is_some_and(|l| l.starts_with('#') && l.ends_with('Z')));
        assert_eq!(lines.next(), Some("a\\ key=x\\=y"));
        assert_eq!(lines.next(), Some("loggedin=false"));
    }

    #[test]
    fn stored_text_reads_back() {
        let mut props = Properties::new();
        props.set("title", " leading space and tab\t");
        props.set("multi", "line1\nline2");
        props.set("k:colon", "#not a comment");
        let reread = Properties::parse(&props.store("Character data"));
        assert_eq!(reread, props);
    }

    #[test]
    fn non_ascii_is_stored_escaped() {
        let mut props = Properties::new();
        props.set("name", "José");
        props.set("crest", "🛡");
        let text = props.store("Character data");
        assert!(text.is_ascii());
        assert!(text.contains("name=Jos\\u00E9"));
        assert!(text.contains("crest=\\uD83D\\uDEE1"));
        assert_eq!(Properties::parse(&text), props);
    }

    #[test]
    fn lone_surrogate_becomes_replacement() {
        let props = Properties::parse("bad=\\uD83Dx");
        assert_eq!(props.get("bad"), Some("\u{fffd}x"));
    }

    #[test]
    fn latin1_bytes_load() {
        let props = Properties::from_bytes(b"loggedin=true\nname=Jos\xe9\n");
        assert_eq!(props.get("name"), Some("José"));
        assert_eq!(props.get("loggedin"), Some("true"));
        assert_eq!(decode_text("été".as_bytes()), "été");
    }

    #[test]
    fn set_replaces_and_returns_previous() {
        let mut props = Properties::parse("gold=1");
        assert_eq!(props.set("gold", "2"), Some("1".to_string()));
        assert_eq!(props.get("gold"), Some("2"));
    }
}
