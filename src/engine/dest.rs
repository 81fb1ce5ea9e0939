//! Destinations and named-destination resolution.
//!
//! Names come in a few shapes:
//! - `chapter.htm#section`: jump to the sub-document first, then the id
//! - `#section` or `section`: the first anchor with that id anywhere
//! - `chapter.htm`: the sub-document's own page-marker anchor
//!
//! Lookups are case-insensitive. A name that matches nothing is not an
//! error; callers get `None`.

use super::anchors::{AnchorIndex, anchor_name};
use crate::config::PageGeometry;
use crate::layout::{Page, RectF};

/// Height of the highlight rectangle of a scroll target.
const DEST_HEIGHT: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestKind {
    /// A position inside this document.
    ScrollTo,
    /// An external URL, opened by the host.
    LaunchUrl,
    /// A file stored inside the container; `value` is its entry path.
    LaunchEmbedded,
    /// A file next to the document on disk; `value` is the relative path
    /// and `name` the `#fragment`, if any.
    LaunchFile,
}

/// Where a link or TOC entry leads.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub kind: DestKind,
    /// 1-based page number; 0 when the destination has no page.
    pub page: usize,
    pub rect: Option<RectF>,
    pub value: Option<String>,
    pub name: Option<String>,
}

impl Destination {
    pub fn scroll_to(page: usize, rect: RectF) -> Self {
        Self {
            kind: DestKind::ScrollTo,
            page,
            rect: Some(rect),
            value: None,
            name: None,
        }
    }

    pub fn launch_url(url: impl Into<String>) -> Self {
        Self {
            kind: DestKind::LaunchUrl,
            page: 0,
            rect: None,
            value: Some(url.into()),
            name: None,
        }
    }

    pub fn launch_embedded(path: impl Into<String>) -> Self {
        let path = path.into();
        let file_name = path.rsplit('/').next().map(str::to_string);
        Self {
            kind: DestKind::LaunchEmbedded,
            page: 0,
            rect: None,
            value: Some(path),
            name: file_name,
        }
    }

    pub fn launch_file(path: impl Into<String>, fragment: Option<String>) -> Self {
        Self {
            kind: DestKind::LaunchFile,
            page: 0,
            rect: None,
            value: Some(path.into()),
            name: fragment,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind == DestKind::ScrollTo
    }
}

/// Split a name on its last `#` into an optional base path and an id.
///
/// Without a `#` the whole name is the id. A leading `/` on the path is
/// dropped, since page markers are named by root-relative paths.
pub fn split_name(name: &str) -> (Option<&str>, &str) {
    let (base, id) = match name.rfind('#') {
        Some(i) => (Some(&name[..i]), &name[i + 1..]),
        None => (None, name.strip_prefix('/').unwrap_or(name)),
    };
    let base = base
        .map(|b| b.strip_prefix('/').unwrap_or(b))
        .filter(|b| !b.is_empty());
    (base, id)
}

fn strip_root(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Resolve a name against laid-out pages.
pub fn resolve_named_dest(
    pages: &[Page],
    index: &AnchorIndex,
    geometry: &PageGeometry,
    name: &str,
) -> Option<Destination> {
    let (base_path, id) = split_name(name);
    let width = geometry.width - 2.0 * geometry.border;

    let mut base_page = None;
    let mut cursor = None;
    if let Some(base_path) = base_path {
        for (i, base) in index.base_anchors().iter().enumerate() {
            if let Some(base) = *base
                && let Some(text) = anchor_name(pages, base)
                && strip_root(text).eq_ignore_ascii_case(base_path)
            {
                base_page = Some(i + 1);
                cursor = Some(base);
                break;
            }
        }
    }

    for &anchor in index.anchors() {
        // everything up to and including the base anchor is skipped
        if let Some(base) = cursor {
            if anchor == base {
                cursor = None;
            }
            continue;
        }
        let Some(text) = anchor_name(pages, anchor) else {
            continue;
        };
        if !id.is_empty() && strip_root(text).eq_ignore_ascii_case(id) {
            let y = pages[anchor.page - 1].instructions[anchor.instr].bbox.y;
            let rect = RectF::new(geometry.border, y + geometry.border, width, DEST_HEIGHT);
            return Some(Destination::scroll_to(anchor.page, rect));
        }
    }

    base_page.map(|page| {
        let rect = RectF::new(geometry.border, geometry.border, width, DEST_HEIGHT);
        Destination::scroll_to(page, rect)
    })
}
