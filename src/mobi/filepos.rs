//! `filepos` links in Mobipocket markup.
//!
//! Links name byte offsets into the decompressed text (`<a filepos=1234>`).
//! Before formatting, an `<a id="filepos1234"></a>` anchor is inserted at every
//! targeted offset and the attribute becomes `href="#filepos1234"`.
//! `recindex` image references become `src="recindex:N"` so the image hook
//! can find the record.

use std::collections::BTreeSet;

const FILEPOS_ATTR: &[u8] = b"filepos=";
const RECINDEX_ATTR: &[u8] = b"recindex=";

/// Prefix of the names of inserted anchors.
pub const ANCHOR_PREFIX: &str = "filepos";

/// Prefix of rewritten image sources.
pub const RECINDEX_PREFIX: &str = "recindex:";

/// A parsed attribute value; `end` is past the closing quote, if any.
struct NumericAttr {
    value: Option<usize>,
    end: usize,
}

/// Read an optionally quoted decimal attribute value starting at `pos`.
fn numeric_attr(html: &[u8], pos: usize) -> NumericAttr {
    let mut i = pos;
    let quote = match html.get(i) {
        Some(&q @ (b'"' | b'\'')) => {
            i += 1;
            Some(q)
        }
        _ => None,
    };
    let digits_start = i;
    while html.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let value = std::str::from_utf8(&html[digits_start..i])
        .ok()
        .and_then(|digits| digits.parse().ok());
    if let Some(q) = quote {
        // skip anything up to the closing quote
        while let Some(&b) = html.get(i) {
            i += 1;
            if b == q {
                break;
            }
        }
    }
    NumericAttr { value, end: i }
}

fn is_attr_start(html: &[u8], pos: usize) -> bool {
    pos > 0 && html[pos - 1].is_ascii_whitespace()
}

/// All offsets targeted by `filepos=` attributes.
pub fn collect_filepos_targets(html: &[u8]) -> BTreeSet<usize> {
    memchr::memmem::find_iter(html, FILEPOS_ATTR)
        .filter(|&pos| is_attr_start(html, pos))
        .filter_map(|pos| numeric_attr(html, pos + FILEPOS_ATTR.len()).value)
        .collect()
}

/// Insert anchors for all `targets` and rewrite `filepos`/`recindex`
/// attributes.
pub fn rewrite_links(html: &[u8], targets: &BTreeSet<usize>) -> Vec<u8> {
    let mut with_anchors = Vec::with_capacity(html.len() + targets.len() * 32);
    let mut last = 0;
    for &target in targets.range(..=html.len()) {
        with_anchors.extend_from_slice(&html[last..target]);
        with_anchors.extend_from_slice(format!("<a id=\"{ANCHOR_PREFIX}{target}\"></a>").as_bytes());
        last = target;
    }
    with_anchors.extend_from_slice(&html[last..]);

    let html = with_anchors;
    let mut out = Vec::with_capacity(html.len());
    let mut pos = 0;
    while pos < html.len() {
        let rest = &html[pos..];
        if rest.starts_with(FILEPOS_ATTR) && is_attr_start(&html, pos) {
            let attr = numeric_attr(&html, pos + FILEPOS_ATTR.len());
            // a value-less attribute is dropped
            if let Some(value) = attr.value {
                out.extend_from_slice(format!("href=\"#{ANCHOR_PREFIX}{value}\"").as_bytes());
            }
            pos = attr.end;
            continue;
        }
        if rest.starts_with(RECINDEX_ATTR) && is_attr_start(&html, pos) {
            let attr = numeric_attr(&html, pos + RECINDEX_ATTR.len());
            if let Some(value) = attr.value {
                out.extend_from_slice(format!("src=\"{RECINDEX_PREFIX}{value}\"").as_bytes());
                pos = attr.end;
                continue;
            }
        }
        out.push(html[pos]);
        pos += 1;
    }
    out
}

/// Parse an image reference produced by [`rewrite_links`] into its 1-based
/// record index.
pub fn parse_recindex(src: &str) -> Option<usize> {
    src.strip_prefix(RECINDEX_PREFIX)?.parse().ok()
}

/// Parse `fileposN`, `#fileposN` or a bare number into an offset.
pub fn parse_filepos(name: &str) -> Option<usize> {
    let name = name.strip_prefix('#').unwrap_or(name);
    let digits = name.strip_prefix(ANCHOR_PREFIX).unwrap_or(name);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
