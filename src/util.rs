//! Text, markup and URL helpers shared by the container readers.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// 1. Tries UTF-8 (BOM handled by encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract the encoding name from an XML declaration in the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let prefix = &bytes[..bytes.len().min(100)];
    let xml_start = memchr::memmem::find(prefix, b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];
    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve XML entity references (predefined and numeric).
pub fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

/// Escape text for inclusion in generated HTML.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Elements whose content the HTML tokenizer consumes up to the matching
/// end tag.
const RAW_TEXT_ELEMENTS: [&str; 9] = [
    "title", "textarea", "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// Terminate a comment, raw-text element or start tag left open at the end
/// of one page's markup, so that whatever is appended next parses as markup.
/// XHTML-style empty raw-text elements (`<title/>`, `<script src=".."/>`)
/// get their end tag inserted in place.
pub fn close_open_markup(markup: &mut String) {
    let lower = markup.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut inserts: Vec<(usize, &str)> = Vec::new();
    let mut tail = String::new();
    let mut pos = 0;
    while let Some(offset) = memchr::memchr(b'<', &bytes[pos..]) {
        let start = pos + offset;
        let rest = &bytes[start + 1..];

        if rest.starts_with(b"!--") {
            match memchr::memmem::find(&rest[3..], b"-->") {
                Some(end) => pos = start + 4 + end + 3,
                None => {
                    tail.push_str("-->");
                    break;
                }
            }
            continue;
        }

        let raw = RAW_TEXT_ELEMENTS.iter().find(|name| {
            rest.starts_with(name.as_bytes())
                && rest
                    .get(name.len())
                    .is_none_or(|&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())
        });
        let Some(gt) = memchr::memchr(b'>', rest) else {
            if !rest.first().is_some_and(u8::is_ascii_alphabetic) {
                pos = start + 1;
                continue;
            }
            tail.push('>');
            if let Some(name) = raw {
                tail.push_str(&format!("</{name}>"));
            }
            break;
        };
        let Some(name) = raw else {
            pos = start + 1;
            continue;
        };
        let tag_end = start + 1 + gt + 1;
        if bytes[tag_end - 2] == b'/' {
            inserts.push((tag_end, *name));
            pos = tag_end;
            continue;
        }
        let end_tag = format!("</{name}");
        match memchr::memmem::find(&bytes[tag_end..], end_tag.as_bytes()) {
            Some(end) => pos = tag_end + end + end_tag.len(),
            None => {
                tail.push_str(&end_tag);
                tail.push('>');
                break;
            }
        }
    }

    for (at, name) in inserts.into_iter().rev() {
        markup.insert_str(at, &format!("</{name}>"));
    }
    markup.push_str(&tail);
}

// ============================================================================
// URLs
// ============================================================================

/// A URL is absolute when it has a scheme: a colon that comes before any
/// fragment marker. `ms-its:` and `mk:@MSITStore:` links count as absolute.
pub fn is_absolute_url(url: &str) -> bool {
    match (url.find(':'), url.find('#')) {
        (Some(colon), Some(hash)) => colon < hash,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Strip the fragment from a URL.
pub fn url_without_fragment(url: &str) -> &str {
    url.split_once('#').map(|(path, _)| path).unwrap_or(url)
}

/// Percent-decode a URL, replacing invalid UTF-8 sequences.
pub fn percent_decode(url: &str) -> Cow<'_, str> {
    percent_encoding::percent_decode_str(url).decode_utf8_lossy()
}

/// Resolve `url` relative to the document `base`.
///
/// Absolute URLs and slash-rooted paths are returned unchanged. A bare
/// fragment keeps the base path. `.` and `..` segments are collapsed.
pub fn normalize_url(url: &str, base: &str) -> String {
    if url.starts_with('/') || is_absolute_url(url) {
        return url.to_string();
    }

    let base_path = url_without_fragment(base);
    let joined = if url.starts_with('#') {
        format!("{base_path}{url}")
    } else {
        let dir = base_path
            .rfind('/')
            .map(|i| &base_path[..=i])
            .unwrap_or("");
        format!("{dir}{url}")
    };

    let (path, fragment) = match joined.split_once('#') {
        Some((p, f)) => (p.to_string(), Some(f.to_string())),
        None => (joined, None),
    };

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    let parts: Vec<&str> = path.split('/').collect();
    let last = parts.len().saturating_sub(1);
    for (i, seg) in parts.iter().enumerate() {
        match *seg {
            "." => {}
            ".." => {
                segments.pop();
            }
            "" if i != last => {}
            s => segments.push(s),
        }
    }

    let mut out = segments.join("/");
    if rooted {
        out.insert(0, '/');
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(&fragment);
    }
    out
}

// ============================================================================
// Images
// ============================================================================

/// Pixel size of a PNG, GIF, BMP or JPEG image, read from its header.
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.starts_with(b"\x89PNG") && data.len() >= 24 {
        let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        return Some((width, height));
    }
    if data.starts_with(b"GIF8") && data.len() >= 10 {
        let width = u16::from_le_bytes([data[6], data[7]]) as u32;
        let height = u16::from_le_bytes([data[8], data[9]]) as u32;
        return Some((width, height));
    }
    if data.starts_with(b"BM") && data.len() >= 26 {
        let width = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
        let height = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        return Some((width.unsigned_abs(), height.unsigned_abs()));
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(data);
    }
    None
}

/// Walk JPEG segments up to the first start-of-frame marker.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 4 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof && i + 9 < data.len() {
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
            return Some((width, height));
        }
        let length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        i += 2 + length;
    }
    None
}
