//! Tables of contents: the EPUB 2 NCX and the EPUB 3 navigation document.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::opf::attr_value;
use crate::dom;
use crate::error::Result;
use crate::util::{local_name, normalize_whitespace, resolve_entity};

/// One TOC entry in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct NavEntry {
    pub title: String,
    /// Link target relative to the file the entry was read from.
    pub src: Option<String>,
    /// 1 for top-level entries.
    pub level: usize,
}

/// Parse the `navMap` of an NCX file.
///
/// Entries come out in pre-order; a `navPoint` without a label is dropped
/// but its children keep their nesting level.
pub fn parse_ncx(content: &str) -> Result<Vec<NavEntry>> {
    let mut reader = Reader::from_str(content);
    // text arrives split at entity references; whitespace is folded per field
    reader.config_mut().trim_text(false);

    let mut entries: Vec<NavEntry> = Vec::new();
    // indices into `entries` of the open navPoints
    let mut stack: Vec<usize> = Vec::new();
    let mut in_text = false;
    let mut in_nav_map = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => {
                    stack.push(entries.len());
                    entries.push(NavEntry {
                        title: String::new(),
                        src: None,
                        level: stack.len(),
                    });
                }
                b"text" => in_text = true,
                b"content" => {
                    if let Some(&i) = stack.last() {
                        entries[i].src = attr_value(&e, b"src");
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"content"
                    && let Some(&i) = stack.last()
                {
                    entries[i].src = attr_value(&e, b"src");
                }
            }
            Event::Text(e) => {
                if in_text && let Some(&i) = stack.last() {
                    entries[i].title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_text
                    && let Some(&i) = stack.last()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    entries[i].title.push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" => {
                    stack.pop();
                }
                b"navMap" => in_nav_map = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(collapse_unlabeled(entries))
}

/// Drop entries without a title, pulling their descendants up a level.
fn collapse_unlabeled(entries: Vec<NavEntry>) -> Vec<NavEntry> {
    let mut out = Vec::with_capacity(entries.len());
    // levels of dropped ancestors of the current position
    let mut dropped: Vec<usize> = Vec::new();
    for mut entry in entries {
        entry.title = normalize_whitespace(&entry.title);
        while dropped.last().is_some_and(|&l| l >= entry.level) {
            dropped.pop();
        }
        if entry.title.is_empty() {
            dropped.push(entry.level);
            continue;
        }
        entry.level -= dropped.len();
        out.push(entry);
    }
    out
}

/// Parse the `<nav epub:type="toc">` element of an EPUB 3 navigation
/// document. Levels follow `<ol>` nesting.
pub fn parse_nav_document(html: &str) -> Vec<NavEntry> {
    let dom = dom::parse_html(html);
    let Some(nav) = dom.descendants(dom.document()).find(|&id| {
        dom.is_tag(id, "nav")
            && dom
                .get_attr(id, "epub:type")
                .is_some_and(|t| t.split_ascii_whitespace().any(|t| t == "toc"))
    }) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for id in dom.descendants(nav) {
        if !(dom.is_tag(id, "a") || dom.is_tag(id, "span")) {
            continue;
        }
        // only the label of a list item, not links nested in other markup
        if !dom.parent(id).is_some_and(|p| dom.is_tag(p, "li")) {
            continue;
        }
        let title: String = dom
            .descendants(id)
            .filter_map(|node| dom.text(node))
            .collect();
        let title = normalize_whitespace(&title);
        if title.is_empty() {
            continue;
        }
        let mut level = 0;
        let mut parent = dom.parent(id);
        while let Some(p) = parent
            && p != nav
        {
            if dom.is_tag(p, "ol") || dom.is_tag(p, "ul") {
                level += 1;
            }
            parent = dom.parent(p);
        }
        entries.push(NavEntry {
            title,
            src: dom.get_attr(id, "href").map(str::to_string),
            level: level.max(1),
        });
    }
    entries
}
