//! Walking `.hhc` (TOC) and `.hhk` (index) sitemap markup.
//!
//! ```html
//! <ul>
//!   <li><object type="text/sitemap">
//!         <param name="Name" value="Main Page">
//!         <param name="Local" value="main.html">
//!       </object>
//!       <ul> ... children ... </ul>
//!   <li> ... siblings ...
//! </ul>
//! ```

use crate::codepage::{self, CP_WINDOWS_1252};
use crate::document::TocVisitor;
use crate::dom::{ArenaDom, ArenaNodeId};

/// Nesting beyond this is ignored rather than recursed into.
const MAX_DEPTH: usize = 256;

struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// `<param name= value=>` children of an object, values re-decoded from
    /// Windows-1252 into the document codepage.
    fn collect(dom: &ArenaDom, object: ArenaNodeId, codepage: u32) -> Self {
        let pairs = dom
            .children(object)
            .filter(|&c| dom.is_tag(c, "param"))
            .filter_map(|c| {
                let name = dom.get_attr(c, "name")?;
                let value = dom.get_attr(c, "value")?;
                let value = if codepage != CP_WINDOWS_1252 {
                    codepage::redecode_from_1252(value, codepage)
                } else {
                    value.to_string()
                };
                Some((name.to_string(), value))
            })
            .collect();
        Self { pairs }
    }
}

/// Drop an `ms-its:file.chm::/` style prefix.
fn strip_its_prefix(url: String) -> String {
    match url.find("::/") {
        Some(i) => url[i + 3..].to_string(),
        None => url,
    }
}

fn visit_toc_item(
    dom: &ArenaDom,
    object: ArenaNodeId,
    codepage: u32,
    level: usize,
    visitor: &mut dyn TocVisitor,
) -> bool {
    let mut name = None;
    let mut local = None;
    for (key, value) in Params::collect(dom, object, codepage).pairs {
        if key.eq_ignore_ascii_case("Name") {
            name = Some(value);
        } else if key.eq_ignore_ascii_case("Local") {
            local = Some(strip_its_prefix(value));
        }
    }
    let Some(name) = name else {
        return false;
    };
    visitor.visit(&name, local.as_deref(), level);
    true
}

/// Index objects carry a `Keyword` and one or more `Name`/`Local` pairs.
fn visit_index_item(
    dom: &ArenaDom,
    object: ArenaNodeId,
    codepage: u32,
    level: usize,
    visitor: &mut dyn TocVisitor,
) -> bool {
    let mut keyword: Option<String> = None;
    let mut name: Option<String> = None;
    let mut references: Vec<(String, String)> = Vec::new();
    for (key, value) in Params::collect(dom, object, codepage).pairs {
        if key.eq_ignore_ascii_case("Keyword") {
            keyword = Some(value);
        } else if key.eq_ignore_ascii_case("Name") {
            // a lone Name stands in for the keyword
            if keyword.is_none() {
                keyword = Some(value.clone());
            }
            name = Some(value);
        } else if key.eq_ignore_ascii_case("Local")
            && let Some(n) = name.take()
        {
            references.push((n, strip_its_prefix(value)));
        }
    }
    let Some(keyword) = keyword else {
        return false;
    };

    if let [(_, url)] = references.as_slice() {
        visitor.visit(&keyword, Some(url), level);
        return true;
    }
    visitor.visit(&keyword, None, level);
    for (name, url) in &references {
        visitor.visit(name, Some(url), level + 1);
    }
    true
}

fn visit_item(
    dom: &ArenaDom,
    object: ArenaNodeId,
    codepage: u32,
    is_index: bool,
    level: usize,
    visitor: &mut dyn TocVisitor,
) -> bool {
    if is_index {
        visit_index_item(dom, object, codepage, level, visitor)
    } else {
        visit_toc_item(dom, object, codepage, level, visitor)
    }
}

fn child_by_tag(dom: &ArenaDom, parent: ArenaNodeId, tag: &str) -> Option<ArenaNodeId> {
    dom.children(parent).find(|&c| dom.is_tag(c, tag))
}

/// Walk a `<ul>` list and any `<ul>` siblings right after it; some broken
/// files wrap every `<li>` in its own list.
fn walk_list(
    dom: &ArenaDom,
    list: ArenaNodeId,
    codepage: u32,
    is_index: bool,
    level: usize,
    visitor: &mut dyn TocVisitor,
) {
    if level > MAX_DEPTH {
        return;
    }
    let mut current = Some(list);
    while let Some(ul) = current
        && dom.is_tag(ul, "ul")
    {
        for li in dom.children(ul) {
            if !dom.is_tag(li, "li") {
                continue;
            }
            let valid = child_by_tag(dom, li, "object")
                .is_some_and(|obj| visit_item(dom, obj, codepage, is_index, level, visitor));
            if !valid {
                // incomplete entries are skipped with their children
                continue;
            }

            // the nested list may also directly follow the <li>
            let nested = child_by_tag(dom, li, "ul").or_else(|| {
                dom.next_element_sibling(li)
                    .filter(|&next| dom.is_tag(next, "ul"))
            });
            if let Some(nested) = nested {
                walk_list(dom, nested, codepage, is_index, level + 1, visitor);
            }
        }
        current = dom.next_element_sibling(ul);
    }
}

fn body_or_document(dom: &ArenaDom) -> ArenaNodeId {
    dom.find_by_tag("body").unwrap_or_else(|| dom.document())
}

/// Structured walk over the first `<ul>` of the body. Returns `false`
/// when the markup has no list at all.
pub fn walk_structured(
    dom: &ArenaDom,
    codepage: u32,
    is_index: bool,
    visitor: &mut dyn TocVisitor,
) -> bool {
    let Some(list) = dom.find_descendant(body_or_document(dom), "ul") else {
        return false;
    };
    walk_list(dom, list, codepage, is_index, 1, visitor);
    true
}

/// Flat walk ignoring list structure: every `<object type="text/sitemap">`
/// becomes a level-1 entry. Returns whether any entry was visited.
pub fn walk_flat(
    dom: &ArenaDom,
    codepage: u32,
    is_index: bool,
    visitor: &mut dyn TocVisitor,
) -> bool {
    let mut had_one = false;
    for id in dom.descendants(body_or_document(dom)) {
        if !dom.is_tag(id, "object") {
            continue;
        }
        let is_sitemap = dom
            .get_attr(id, "type")
            .is_some_and(|t| t.eq_ignore_ascii_case("text/sitemap"));
        if is_sitemap {
            had_one |= visit_item(dom, id, codepage, is_index, 1, visitor);
        }
    }
    had_one
}

/// Structured walk, falling back to the flat walk when there is no list.
pub fn walk(dom: &ArenaDom, codepage: u32, is_index: bool, visitor: &mut dyn TocVisitor) -> bool {
    walk_structured(dom, codepage, is_index, visitor) || walk_flat(dom, codepage, is_index, visitor)
}
