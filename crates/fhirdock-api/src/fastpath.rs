//! Streamed byte-concatenation assembly of `searchset` Bundles: the
//! fastpath writes the fixed Bundle prefix/suffix and splices each raw,
//! already-validated resource JSON string in between without parsing it.
//!
//! [`bundle_from_search_raw`](crate::bundle_from_search_raw) achieves the
//! same zero-reparse property through `serde_json`'s `RawValue`; this
//! module goes one step further and never builds a `Bundle` value at all
//! -- it writes the output bytes directly.

use std::fmt::Write as _;

use crate::RawJson;

/// One entry destined for the assembled Bundle: a raw resource body plus
/// the `fullUrl` and `search.mode` wrapped around it.
pub struct FastpathEntry {
    pub full_url: String,
    pub resource: RawJson,
    pub mode: SearchEntryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEntryMode {
    Match,
    Include,
}

impl SearchEntryMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Include => "include",
        }
    }
}

/// A query is only eligible for the fastpath when every parameter on it
/// is a plain search parameter -- `_summary`, `_elements`, and chained
/// parameters (`patient.name=Smith`) all need the parsed assembly path
/// the search engine's own fallback contract describes.
pub fn requires_parsed_assembly(query: &str) -> bool {
    query.split('&').any(|pair| {
        let name = pair.split('=').next().unwrap_or("");
        name == "_summary" || name == "_elements" || name.contains('.')
    })
}

/// Escapes a string for embedding inside a JSON string literal, used for
/// `fullUrl` values built from caller-controlled base URLs and resource
/// ids. `resource` bytes are never escaped here -- they are written
/// through verbatim because they are already-validated JSON, which is
/// the whole point of the fastpath.
fn escape_json_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Assembles a `searchset` Bundle by streaming bytes: the fixed prefix,
/// one `{"fullUrl":...,"resource":<raw>,"search":{"mode":...}}` object
/// per entry separated by commas, then the fixed suffix, then the link
/// array. No entry's resource body is parsed or re-serialized.
#[allow(clippy::too_many_arguments)]
pub fn assemble_searchset(
    total: u64,
    entries: &[FastpathEntry],
    self_link: &str,
    next_link: Option<&str>,
) -> String {
    let mut out = String::with_capacity(256 + entries.iter().map(|e| e.resource.as_str().len() + 128).sum::<usize>());

    out.push_str(r#"{"resourceType":"Bundle","type":"searchset","total":"#);
    let _ = write!(out, "{total}");
    out.push_str(r#","link":[{"relation":"self","url":"#);
    escape_json_string(&mut out, self_link);
    out.push('}');
    if let Some(next) = next_link {
        out.push_str(r#",{"relation":"next","url":"#);
        escape_json_string(&mut out, next);
        out.push('}');
    }
    out.push_str(r#"],"entry":["#);

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(r#"{"fullUrl":"#);
        escape_json_string(&mut out, &entry.full_url);
        out.push_str(r#","resource":"#);
        out.push_str(entry.resource.as_str());
        out.push_str(r#","search":{"mode":""#);
        out.push_str(entry.mode.as_str());
        out.push_str(r#""}}"#);
    }

    out.push_str("]}");
    out
}
