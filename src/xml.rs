//! Small XML helpers shared by registry metadata and package manifests

use crate::error::{Error, Result};

/// Escape text for use in XML attribute values and element content.
/// Whitespace other than a plain space is written as a character reference
/// so attribute normalization keeps it.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

/// Fail on characters an XML 1.0 document cannot hold, even escaped
pub(crate) fn check_chars(text: &str) -> Result<()> {
    let invalid = text.chars().find(|&c| {
        (c < ' ' && !matches!(c, '\t' | '\n' | '\r')) || matches!(c, '\u{FFFE}' | '\u{FFFF}')
    });
    match invalid {
        Some(c) => Err(Error::Metadata(format!(
            "character U+{:04X} cannot be stored in XML",
            c as u32
        ))),
        None => Ok(()),
    }
}

/// Parse a document, allowing a DOCTYPE declaration (Java properties files
/// carry one)
pub(crate) fn parse(text: &str) -> Result<roxmltree::Document<'_>> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    roxmltree::Document::parse_with_options(text, options).map_err(|e| Error::Metadata(e.to_string()))
}
