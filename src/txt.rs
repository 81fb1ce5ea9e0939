//! Plain text files, including TCR-compressed text and IETF RFCs.

use std::path::Path;
use std::sync::Arc;

use crate::config::PageGeometry;
use crate::container::{Format, TCR_MAGIC};
use crate::document::{Document, DocumentProperty, PageLayout, ResourceProvider, TocVisitor};
use crate::error::{Error, Result};
use crate::util::{decode_text, html_escape, normalize_whitespace};

/// Expand TCR text: a 256-entry phrase table of length-prefixed strings,
/// then one table index per byte.
pub fn decompress_tcr(data: &[u8]) -> Result<Vec<u8>> {
    let mut rest = data
        .strip_prefix(TCR_MAGIC)
        .ok_or_else(|| Error::bad_format("missing TCR signature"))?;

    let mut phrases: Vec<&[u8]> = Vec::with_capacity(256);
    for _ in 0..256 {
        let (&len, tail) = rest
            .split_first()
            .ok_or_else(|| Error::bad_format("truncated TCR dictionary"))?;
        let len = len as usize;
        if tail.len() < len {
            return Err(Error::bad_format("truncated TCR dictionary"));
        }
        phrases.push(&tail[..len]);
        rest = &tail[len..];
    }

    let mut out = Vec::with_capacity(rest.len() * 4);
    for &b in rest {
        out.extend_from_slice(phrases[b as usize]);
    }
    Ok(out)
}

/// Decode text, honoring UTF-8 and UTF-16 byte order marks.
fn decode(data: &[u8]) -> String {
    if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(data) {
        let (text, _) = encoding.decode_without_bom_handling(&data[bom_len..]);
        return text.into_owned();
    }
    decode_text(data, None).into_owned()
}

/// `rfc1234.txt`, in any case.
fn is_rfc_file_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.strip_prefix("rfc")
        .and_then(|rest| rest.strip_suffix(".txt"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// An RFC section heading: `1.2.  Title` at the start of a line. Returns
/// the section number and title.
fn rfc_heading(line: &str) -> Option<(&str, &str)> {
    let number_len = line
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(line.len());
    let number = line[..number_len].trim_end_matches('.');
    if number.is_empty() || !number.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let title = line[number_len..].strip_prefix(' ')?.trim();
    // headings are short and do not end like sentences
    if title.is_empty() || title.len() > 80 || title.ends_with('.') {
        return None;
    }
    Some((number, title))
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    title: String,
    anchor: String,
    level: usize,
}

/// Escape `text` into a `<pre>` block. Form feeds become page breaks and,
/// for RFCs, section headings get anchors.
fn text_to_html(text: &str, is_rfc: bool) -> (String, Vec<Section>) {
    let mut html = String::with_capacity(text.len() + text.len() / 8);
    let mut sections = Vec::new();
    html.push_str("<pre>");
    let mut previous_blank = true;
    for line in text.split_inclusive('\n') {
        let mut content = line.trim_end_matches(['\r', '\n']);
        while let Some(rest) = content.strip_prefix('\x0c') {
            html.push_str("</pre><pagebreak /><pre>");
            content = rest;
        }
        if is_rfc
            && previous_blank
            && let Some((number, title)) = rfc_heading(content)
        {
            let anchor = format!("section-{number}");
            html.push_str(&format!("<a id=\"{anchor}\"></a>"));
            sections.push(Section {
                title: normalize_whitespace(&format!("{number}. {title}")),
                anchor,
                level: number.split('.').count(),
            });
        }
        html.push_str(&html_escape(&content.replace('\x0c', "")));
        if line.ends_with('\n') {
            html.push('\n');
        }
        previous_blank = content.trim().is_empty();
    }
    html.push_str("</pre>");
    (html, sections)
}

pub struct TxtDoc {
    html: String,
    sections: Vec<Section>,
    is_rfc: bool,
    file_ext: String,
}

impl TxtDoc {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let data = if data.starts_with(TCR_MAGIC) {
            decompress_tcr(&data)?
        } else {
            data
        };
        let text = decode(&data);
        let is_rfc = is_rfc_file_name(path);
        let (html, sections) = text_to_html(&text, is_rfc);
        log::debug!(
            "opened text file {}: {} bytes, rfc: {is_rfc}, {} sections",
            path.display(),
            text.len(),
            sections.len()
        );
        let file_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_else(|| Format::Txt.default_extension().to_string());
        Ok(Self {
            html,
            sections,
            is_rfc,
            file_ext,
        })
    }

    pub fn is_rfc(&self) -> bool {
        self.is_rfc
    }
}

impl ResourceProvider for TxtDoc {
    fn image_data(&self, _src: &str, _page_path: Option<&str>) -> Option<Arc<[u8]>> {
        None
    }
}

impl Document for TxtDoc {
    fn format(&self) -> Format {
        Format::Txt
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, _prop: DocumentProperty) -> Option<String> {
        None
    }

    fn has_toc(&self) -> bool {
        !self.sections.is_empty()
    }

    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        for section in &self.sections {
            visitor.visit(&section.title, Some(&format!("#{}", section.anchor)), section.level);
        }
    }

    fn page_geometry(&self) -> PageGeometry {
        if self.is_rfc {
            PageGeometry::letter()
        } else {
            PageGeometry::a4()
        }
    }

    fn preferred_layout(&self) -> PageLayout {
        PageLayout::Single
    }

    fn default_file_ext(&self) -> String {
        self.file_ext.clone()
    }
}
