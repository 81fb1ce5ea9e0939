//! Windows codepages: locale mapping, charset sniffing and conversion to UTF-8.
//!
//! Compiled help files carry text in the codepage of the locale they were
//! built for. Codepages are kept as Windows numeric identifiers and mapped to
//! `encoding_rs` encodings only at conversion time.

use std::borrow::Cow;

use encoding_rs::Encoding;

use crate::dom;

pub const CP_UTF8: u32 = 65001;
pub const CP_WINDOWS_1252: u32 = 1252;

/// Locale identifiers whose ANSI codepage differs from Windows-1252.
const LCID_CODEPAGES: [(u32, u32); 15] = [
    (1025, 1256),
    (2052, 936),
    (1028, 950),
    (1029, 1250),
    (1032, 1253),
    (1037, 1255),
    (1038, 1250),
    (1041, 932),
    (1042, 949),
    (1045, 1250),
    (1049, 1251),
    (1051, 1250),
    (1060, 1250),
    (1055, 1254),
    (1026, 1251),
];

/// `charset=` values recognized in `<meta http-equiv="Content-Type">`.
const CHARSET_CODEPAGES: [(&str, u32); 15] = [
    ("ISO-8859-1", 1252),
    ("Latin1", 1252),
    ("CP1252", 1252),
    ("Windows-1252", 1252),
    ("ISO-8859-2", 28592),
    ("Latin2", 28592),
    ("CP1251", 1251),
    ("Windows-1251", 1251),
    ("KOI8-R", 20866),
    ("shift-jis", 932),
    ("x-euc", 932),
    ("euc-kr", 949),
    ("Big5", 950),
    ("GB2312", 936),
    ("UTF-8", CP_UTF8),
];

/// Only the start of a page is scanned for a charset declaration.
const CHARSET_SCAN_LEN: usize = 1024;

/// Map a Windows locale identifier to its ANSI codepage (1252 if unknown).
pub fn lcid_to_codepage(lcid: u32) -> u32 {
    LCID_CODEPAGES
        .iter()
        .find(|(id, _)| *id == lcid)
        .map(|(_, cp)| *cp)
        .unwrap_or(CP_WINDOWS_1252)
}

/// Map a charset alias (case-insensitive) to a codepage.
pub fn charset_to_codepage(charset: &str) -> Option<u32> {
    CHARSET_CODEPAGES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(charset))
        .map(|(_, cp)| *cp)
}

/// The `encoding_rs` encoding for a Windows codepage.
pub fn encoding_for_codepage(codepage: u32) -> Option<&'static Encoding> {
    let encoding = match codepage {
        CP_UTF8 => encoding_rs::UTF_8,
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1252 | 28591 => encoding_rs::WINDOWS_1252,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        20866 => encoding_rs::KOI8_R,
        21866 => encoding_rs::KOI8_U,
        28592 => encoding_rs::ISO_8859_2,
        28593 => encoding_rs::ISO_8859_3,
        28594 => encoding_rs::ISO_8859_4,
        28595 => encoding_rs::ISO_8859_5,
        28596 => encoding_rs::ISO_8859_6,
        28597 => encoding_rs::ISO_8859_7,
        28598 => encoding_rs::ISO_8859_8,
        28603 => encoding_rs::ISO_8859_13,
        28605 => encoding_rs::ISO_8859_15,
        54936 => encoding_rs::GB18030,
        _ => return None,
    };
    Some(encoding)
}

/// Decode bytes in `codepage`. Unknown codepages decode as Windows-1252.
pub fn decode(bytes: &[u8], codepage: u32) -> Cow<'_, str> {
    let encoding = encoding_for_codepage(codepage).unwrap_or(encoding_rs::WINDOWS_1252);
    encoding.decode_without_bom_handling(bytes).0
}

/// Convert document text to UTF-8.
///
/// A UTF-8 BOM always wins. Otherwise a non-zero `override_codepage` is used,
/// falling back to the document codepage.
pub fn to_utf8(bytes: &[u8], codepage: u32, override_codepage: u32) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    let cp = if override_codepage != 0 {
        override_codepage
    } else {
        codepage
    };
    decode(bytes, cp).into_owned()
}

/// Reinterpret text that was decoded as Windows-1252 in another codepage.
///
/// Sitemap files are parsed as Windows-1252 first; parameter values are then
/// re-decoded with the document codepage.
pub fn redecode_from_1252(text: &str, codepage: u32) -> String {
    if codepage == CP_WINDOWS_1252 {
        return text.to_string();
    }
    let (raw, _, unmappable) = encoding_rs::WINDOWS_1252.encode(text);
    if unmappable {
        return text.to_string();
    }
    decode(&raw, codepage).into_owned()
}

/// Find a `<meta http-equiv="Content-Type" content="...; charset=X">`
/// declaration in the first KiB of a page and map it to a codepage.
///
/// The first parseable declaration decides; an unknown alias yields `None`.
pub fn extract_http_charset(html: &[u8]) -> Option<u32> {
    memchr::memmem::find(html, b"charset=")?;

    let prefix = &html[..html.len().min(CHARSET_SCAN_LEN)];
    let text = decode(prefix, CP_WINDOWS_1252);
    let dom = dom::parse_html(&text);

    for id in dom.descendants(dom.document()) {
        if !dom.is_tag(id, "meta") {
            continue;
        }
        let is_content_type = dom
            .get_attr(id, "http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("Content-Type"));
        if !is_content_type {
            continue;
        }
        let Some(charset) = dom.get_attr(id, "content").and_then(parse_content_charset) else {
            continue;
        };
        return charset_to_codepage(charset);
    }
    None
}

/// Parse `mimetype; charset=X` into `X`.
fn parse_content_charset(content: &str) -> Option<&str> {
    let (_mime, rest) = content.split_once(';')?;
    let rest = rest.trim_start();
    let key = rest.get(..8)?;
    if !key.eq_ignore_ascii_case("charset=") {
        return None;
    }
    let value = rest[8..].trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcid_table() {
        assert_eq!(lcid_to_codepage(1049), 1251);
        assert_eq!(lcid_to_codepage(2052), 936);
        assert_eq!(lcid_to_codepage(1033), 1252);
        assert_eq!(lcid_to_codepage(0), 1252);
    }

    #[test]
    fn test_charset_aliases_case_insensitive() {
        assert_eq!(charset_to_codepage("utf-8"), Some(CP_UTF8));
        assert_eq!(charset_to_codepage("LATIN2"), Some(28592));
        assert_eq!(charset_to_codepage("x-unknown"), None);
    }

    #[test]
    fn test_to_utf8_bom_wins() {
        let bytes = [0xEF, 0xBB, 0xBF, b'h', 0xC3, 0xA9];
        assert_eq!(to_utf8(&bytes, 1251, 1252), "hé");
        assert_eq!(to_utf8(&[0xE9], 1252, 0), "é");
        assert_eq!(to_utf8(&[0xE9], 1252, 1251), "й");
    }

    #[test]
    fn test_redecode_from_1252() {
        // "Привет" in windows-1251, as a 1252 decoder sees it
        let raw = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        let as_1252 = decode(&raw, 1252);
        assert_eq!(redecode_from_1252(&as_1252, 1251), "Привет");
        assert_eq!(redecode_from_1252("abc", 1252), "abc");
    }

    #[test]
    fn test_extract_http_charset() {
        let html = br#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=Windows-1251"></head>"#;
        assert_eq!(extract_http_charset(html), Some(1251));

        let unknown = br#"<meta http-equiv="content-type" content="text/html; charset=x-klingon">"#;
        assert_eq!(extract_http_charset(unknown), None);

        assert_eq!(extract_http_charset(b"<p>no declaration</p>"), None);
    }

    #[test]
    fn test_charset_beyond_scan_window_ignored() {
        let mut html = vec![b' '; 2000];
        html.extend_from_slice(
            br#"<meta http-equiv="Content-Type" content="text/html; charset=KOI8-R">"#,
        );
        assert_eq!(extract_http_charset(&html), None);
    }
}
