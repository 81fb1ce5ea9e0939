//! EPUB package files: `META-INF/container.xml` and the OPF package
//! document.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::{decode_text, extract_xml_encoding, local_name, resolve_entity, strip_bom};

/// Decode an XML file, honoring its declared encoding.
pub(crate) fn xml_text(bytes: &[u8]) -> String {
    let bytes = strip_bom(bytes);
    decode_text(bytes, extract_xml_encoding(bytes)).into_owned()
}

/// Attribute value with entity references resolved.
pub(crate) fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    let attr = e
        .attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == name)?;
    let raw = String::from_utf8_lossy(&attr.value).into_owned();
    Some(
        quick_xml::escape::unescape(&raw)
            .map(|v| v.into_owned())
            .unwrap_or(raw),
    )
}

/// Find the OPF path in `META-INF/container.xml`.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = xml_text(bytes);
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attr_value(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(Error::bad_format("no rootfile in container.xml"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_ascii_whitespace().any(|p| p == name))
    }

    pub fn is_html(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "application/x-dtbook+xml"
        )
    }
}

/// What the reader needs from the package document.
#[derive(Debug, Default)]
pub struct Package {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub rights: Option<String>,
    pub manifest: HashMap<String, ManifestItem>,
    /// Manifest ids in reading order.
    pub spine: Vec<String>,
    /// Manifest id of the NCX named by `<spine toc="...">`.
    pub toc_id: Option<String>,
    /// `page-progression-direction="rtl"` on the spine.
    pub rtl: bool,
}

impl Package {
    /// Href of the NCX table of contents, relative to the OPF.
    pub fn ncx_href(&self) -> Option<&str> {
        self.toc_id
            .as_ref()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| {
                self.manifest
                    .values()
                    .find(|item| item.media_type == "application/x-dtbncx+xml")
            })
            .map(|item| item.href.as_str())
    }

    /// Href of the EPUB 3 navigation document, relative to the OPF.
    pub fn nav_href(&self) -> Option<&str> {
        self.manifest
            .values()
            .find(|item| item.has_property("nav"))
            .map(|item| item.href.as_str())
    }

    fn add_item(&mut self, e: &BytesStart<'_>) {
        let (Some(id), Some(href)) = (attr_value(e, b"id"), attr_value(e, b"href")) else {
            return;
        };
        self.manifest.insert(
            id,
            ManifestItem {
                href,
                media_type: attr_value(e, b"media-type").unwrap_or_default(),
                properties: attr_value(e, b"properties"),
            },
        );
    }

    fn set_field(&mut self, element: &[u8], value: String) {
        let value = crate::util::normalize_whitespace(&value);
        if value.is_empty() {
            return;
        }
        match element {
            b"title" => {
                self.title.get_or_insert(value);
            }
            b"creator" => self.creators.push(value),
            b"publisher" => {
                self.publisher.get_or_insert(value);
            }
            b"description" => {
                self.description.get_or_insert(value);
            }
            b"date" => {
                self.date.get_or_insert(value);
            }
            b"rights" => {
                self.rights.get_or_insert(value);
            }
            _ => {}
        }
    }
}

const METADATA_FIELDS: &[&[u8]] = &[
    b"title",
    b"creator",
    b"publisher",
    b"description",
    b"date",
    b"rights",
];

/// Parse the OPF package document.
pub fn parse_opf(content: &str) -> Result<Package> {
    let mut reader = Reader::from_str(content);
    // text arrives split at entity references; whitespace is folded per field
    reader.config_mut().trim_text(false);

    let mut package = Package::default();
    let mut in_metadata = false;
    let mut current: Option<Vec<u8>> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"metadata" => in_metadata = true,
                    b"spine" => {
                        package.toc_id = attr_value(&e, b"toc");
                        package.rtl = attr_value(&e, b"page-progression-direction")
                            .is_some_and(|d| d.eq_ignore_ascii_case("rtl"));
                    }
                    b"item" => package.add_item(&e),
                    b"itemref" => package.spine.extend(attr_value(&e, b"idref")),
                    _ if in_metadata && METADATA_FIELDS.contains(&local) => {
                        current = Some(local.to_vec());
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => package.add_item(&e),
                    b"itemref" => package.spine.extend(attr_value(&e, b"idref")),
                    b"spine" => {
                        package.toc_id = attr_value(&e, b"toc");
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current.is_some()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    text.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"metadata" {
                    in_metadata = false;
                }
                if current.as_deref() == Some(local) {
                    package.set_field(local, std::mem::take(&mut text));
                    current = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}
