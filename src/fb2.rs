//! FictionBook2 books, plain (`.fb2`) or zipped (`.fb2z`, `.fb2.zip`).
//!
//! The XML is streamed through quick-xml and rewritten into HTML: sections
//! become `<div>`s, titles become headings carrying generated anchor ids
//! for the TOC, and `<binary>` elements are decoded into the image table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::archive::ZipContainer;
use crate::container::{Container, Format};
use crate::document::{Document, DocumentProperty, ResourceProvider, TocVisitor};
use crate::error::{Error, Result};
use crate::util::{
    decode_text, extract_xml_encoding, html_escape, local_name, normalize_whitespace,
    resolve_entity, strip_bom,
};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Prefix of the anchor ids given to section titles.
const TITLE_ANCHOR_PREFIX: &str = "fb2_title_";

/// FB2 element -> HTML tag for elements that map one to one.
fn html_tag(element: &[u8]) -> Option<&'static str> {
    Some(match element {
        b"p" | b"v" | b"text-author" => "p",
        b"section" | b"poem" | b"stanza" | b"annotation" => "div",
        b"subtitle" => "h5",
        b"epigraph" | b"cite" => "blockquote",
        b"emphasis" => "em",
        b"strong" => "strong",
        b"strikethrough" => "s",
        b"sub" => "sub",
        b"sup" => "sup",
        b"code" => "code",
        b"table" => "table",
        b"tr" => "tr",
        b"td" => "td",
        b"th" => "th",
        _ => return None,
    })
}

fn holds_text(element: &[u8]) -> bool {
    matches!(
        element,
        b"p" | b"v"
            | b"subtitle"
            | b"text-author"
            | b"emphasis"
            | b"strong"
            | b"strikethrough"
            | b"sub"
            | b"sup"
            | b"code"
            | b"a"
            | b"td"
            | b"th"
    )
}

#[derive(Debug, Clone, PartialEq)]
struct TocEntry {
    title: String,
    anchor: String,
    level: usize,
}

#[derive(Debug, Default)]
struct Metadata {
    title: Option<String>,
    authors: Vec<String>,
    date: Option<String>,
    cover: Option<String>,
}

/// Streaming FB2 to HTML conversion.
#[derive(Default)]
struct Converter {
    html: String,
    toc: Vec<TocEntry>,
    meta: Metadata,
    binaries: HashMap<String, Arc<[u8]>>,
    /// Local names of the open elements.
    path: Vec<Vec<u8>>,
    bodies: usize,
    section_depth: usize,
    /// Text of the title being read, with its anchor and level.
    title: Option<(String, String, usize)>,
    title_count: usize,
    author: Vec<String>,
    binary: Option<(String, String)>,
}

impl Converter {
    fn inside(&self, element: &[u8]) -> bool {
        self.path.iter().any(|e| e == element)
    }

    fn in_body(&self) -> bool {
        self.inside(b"body")
    }

    fn open_tag(&mut self, tag: &str, e: &BytesStart<'_>) {
        self.html.push('<');
        self.html.push_str(tag);
        if let Some(id) = attr(e, b"id") {
            self.html.push_str(&format!(" id=\"{}\"", html_escape(&id)));
        }
        self.html.push('>');
    }

    fn image(&mut self, e: &BytesStart<'_>) {
        if let Some(href) = attr(e, b"href") {
            if self.in_body() {
                self.html
                    .push_str(&format!("<img src=\"{}\" />", html_escape(&href)));
            } else if self.inside(b"coverpage") {
                self.meta.cover.get_or_insert(href);
            }
        }
    }

    fn start(&mut self, e: &BytesStart<'_>) {
        let name = e.name();
        let local = local_name(name.as_ref()).to_vec();
        match local.as_slice() {
            b"body" => {
                if self.bodies == 0
                    && let Some(cover) = self.meta.cover.clone()
                {
                    self.html.push_str(&format!(
                        "<p><img src=\"{}\" /></p><pagebreak />",
                        html_escape(&cover)
                    ));
                } else if self.bodies > 0 {
                    // footnote bodies start on a new page
                    self.html.push_str("<pagebreak />");
                }
                self.bodies += 1;
            }
            b"section" if self.in_body() => {
                self.section_depth += 1;
                self.open_tag("div", e);
            }
            b"title" if self.in_body() => {
                self.title_count += 1;
                let anchor = format!("{TITLE_ANCHOR_PREFIX}{}", self.title_count);
                let level = self.section_depth.clamp(1, 6);
                self.html.push_str(&format!("<h{level} id=\"{anchor}\">"));
                self.title = Some((String::new(), anchor, self.section_depth));
            }
            b"a" if self.in_body() => {
                let href = attr(e, b"href").unwrap_or_default();
                self.html
                    .push_str(&format!("<a href=\"{}\">", html_escape(&href)));
            }
            b"image" => self.image(e),
            b"author" if self.inside(b"title-info") => self.author.clear(),
            b"binary" => {
                if let Some(id) = attr(e, b"id") {
                    self.binary = Some((id, String::new()));
                }
            }
            b"date" if self.inside(b"title-info") => {
                if let Some(value) = attr(e, b"value") {
                    self.meta.date.get_or_insert(value);
                }
            }
            other if self.in_body() => {
                if let Some(tag) = html_tag(other) {
                    self.open_tag(tag, e);
                }
            }
            _ => {}
        }
        self.path.push(local);
    }

    fn end(&mut self, local: &[u8]) {
        self.path.pop();
        match local {
            b"section" if self.in_body() => {
                self.section_depth = self.section_depth.saturating_sub(1);
                self.html.push_str("</div>");
            }
            b"title" if self.in_body() => {
                if let Some((text, anchor, depth)) = self.title.take() {
                    let level = depth.clamp(1, 6);
                    self.html.push_str(&format!("</h{level}>"));
                    let title = normalize_whitespace(&text);
                    // the body title names the book, not a section
                    if depth > 0 && !title.is_empty() {
                        self.toc.push(TocEntry {
                            title,
                            anchor,
                            level: depth,
                        });
                    }
                }
            }
            b"p" if self.title.is_some() => {
                self.html.push_str("</p>");
                if let Some((text, _, _)) = &mut self.title {
                    text.push(' ');
                }
            }
            b"a" if self.in_body() => self.html.push_str("</a>"),
            b"author" if self.inside(b"title-info") => {
                let name = normalize_whitespace(&self.author.join(" "));
                if !name.is_empty() {
                    self.meta.authors.push(name);
                }
            }
            b"binary" => {
                if let Some((id, data)) = self.binary.take() {
                    let cleaned: String = data.split_ascii_whitespace().collect();
                    match STANDARD.decode(cleaned.as_bytes()) {
                        Ok(bytes) => {
                            self.binaries.insert(id, bytes.into());
                        }
                        Err(e) => log::warn!("skipping FB2 binary {id}: {e}"),
                    }
                }
            }
            other if self.in_body() => {
                if let Some(tag) = html_tag(other) {
                    self.html.push_str(&format!("</{tag}>"));
                }
            }
            _ => {}
        }
    }

    fn empty(&mut self, e: &BytesStart<'_>) {
        let name = e.name();
        match local_name(name.as_ref()) {
            b"image" => self.image(e),
            b"empty-line" if self.in_body() => self.html.push_str("<p>&nbsp;</p>"),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, data)) = &mut self.binary {
            data.push_str(text);
            return;
        }
        let Some(current) = self.path.last() else {
            return;
        };
        if self.in_body() {
            // indentation between block elements
            if text.trim().is_empty() && !holds_text(current) {
                return;
            }
            self.html.push_str(&html_escape(text));
            if let Some((title, _, _)) = &mut self.title {
                title.push_str(text);
            }
            return;
        }
        if !self.inside(b"title-info") {
            return;
        }
        match current.as_slice() {
            b"book-title" => {
                let title = self.meta.title.get_or_insert_with(String::new);
                title.push_str(text);
            }
            b"first-name" | b"middle-name" | b"last-name" | b"nickname"
                if self.inside(b"author") =>
            {
                self.author.push(text.to_string());
            }
            b"date" => {
                self.meta.date.get_or_insert_with(|| text.trim().to_string());
            }
            _ => {}
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    let attr = e
        .attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == name)?;
    Some(String::from_utf8_lossy(&attr.value).into_owned())
}

fn convert(xml: &str) -> Result<Converter> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut conv = Converter::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => conv.start(&e),
            Event::End(e) => conv.end(local_name(e.name().as_ref())),
            Event::Empty(e) => conv.empty(&e),
            Event::Text(e) => conv.text(&String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => conv.text(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    conv.text(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if conv.bodies == 0 {
        return Err(Error::bad_format("FictionBook without <body>"));
    }
    Ok(conv)
}

/// A FictionBook2 document.
pub struct Fb2Doc {
    html: String,
    toc: Vec<TocEntry>,
    meta: Metadata,
    images: HashMap<String, Arc<[u8]>>,
    zipped: bool,
}

impl Fb2Doc {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        if data.starts_with(ZIP_MAGIC) {
            let zip = ZipContainer::open(path)?;
            let entry = zip
                .enumerate_entries()
                .into_iter()
                .find(|name| name.to_ascii_lowercase().ends_with(".fb2"))
                .ok_or_else(|| Error::not_found("*.fb2 in archive"))?;
            log::debug!("reading {entry} from zipped FictionBook");
            let mut doc = Self::from_bytes(zip.get_entry(&entry)?.as_bytes())?;
            doc.zipped = true;
            return Ok(doc);
        }
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let data = strip_bom(data);
        let xml = decode_text(data, extract_xml_encoding(data));
        let conv = convert(&xml)?;
        if conv.html.is_empty() {
            return Err(Error::EmptyDocument);
        }
        log::debug!(
            "opened FictionBook {:?}: {} TOC entries, {} binaries",
            conv.meta.title,
            conv.toc.len(),
            conv.binaries.len()
        );
        Ok(Self {
            html: conv.html,
            toc: conv.toc,
            meta: conv.meta,
            images: conv.binaries,
            zipped: false,
        })
    }
}

impl ResourceProvider for Fb2Doc {
    /// Images are referenced as `#id` of a `<binary>` element.
    fn image_data(&self, src: &str, _page_path: Option<&str>) -> Option<Arc<[u8]>> {
        let id = src.strip_prefix('#').unwrap_or(src);
        self.images.get(id).cloned()
    }
}

impl Document for Fb2Doc {
    fn format(&self) -> Format {
        Format::Fb2
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, prop: DocumentProperty) -> Option<String> {
        match prop {
            DocumentProperty::Title => self
                .meta
                .title
                .as_deref()
                .map(normalize_whitespace)
                .filter(|t| !t.is_empty()),
            DocumentProperty::Author => {
                (!self.meta.authors.is_empty()).then(|| self.meta.authors.join(", "))
            }
            DocumentProperty::CreationDate => self.meta.date.clone().filter(|d| !d.is_empty()),
            _ => None,
        }
    }

    fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        for entry in &self.toc {
            visitor.visit(&entry.title, Some(&format!("#{}", entry.anchor)), entry.level);
        }
    }

    fn default_file_ext(&self) -> String {
        if self.zipped { ".fb2z" } else { ".fb2" }.to_string()
    }
}
