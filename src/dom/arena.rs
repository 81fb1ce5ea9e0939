//! Index-linked DOM for parsed markup.
//!
//! All nodes live in one vector and refer to each other by [`ArenaNodeId`].
//! Nodes are never freed; the tree builder only relinks them.

use html5ever::{LocalName, QualName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaNodeId(u32);

impl ArenaNodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub enum ArenaNodeData {
    Document,
    Element { name: QualName, attrs: Vec<Attribute> },
    Text(String),
    /// Comments and processing instructions.
    Comment(String),
}

/// An attribute, keyed by its local name.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: LocalName,
    pub value: String,
}

#[derive(Debug)]
struct Links {
    parent: Option<ArenaNodeId>,
    first_child: Option<ArenaNodeId>,
    last_child: Option<ArenaNodeId>,
    prev: Option<ArenaNodeId>,
    next: Option<ArenaNodeId>,
}

#[derive(Debug)]
struct Node {
    data: ArenaNodeData,
    links: Links,
}

#[derive(Debug)]
pub struct ArenaDom {
    nodes: Vec<Node>,
}

impl Default for ArenaDom {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaDom {
    /// A tree holding only the document node.
    pub fn new() -> Self {
        let mut dom = Self { nodes: Vec::new() };
        dom.push(ArenaNodeData::Document);
        dom
    }

    fn push(&mut self, data: ArenaNodeData) -> ArenaNodeId {
        let id = ArenaNodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            links: Links {
                parent: None,
                first_child: None,
                last_child: None,
                prev: None,
                next: None,
            },
        });
        id
    }

    fn links(&self, id: ArenaNodeId) -> Option<&Links> {
        self.nodes.get(id.index()).map(|n| &n.links)
    }

    fn links_mut(&mut self, id: ArenaNodeId) -> Option<&mut Links> {
        self.nodes.get_mut(id.index()).map(|n| &mut n.links)
    }

    pub fn document(&self) -> ArenaNodeId {
        ArenaNodeId(0)
    }

    pub fn data(&self, id: ArenaNodeId) -> Option<&ArenaNodeData> {
        self.nodes.get(id.index()).map(|n| &n.data)
    }

    pub(crate) fn data_mut(&mut self, id: ArenaNodeId) -> Option<&mut ArenaNodeData> {
        self.nodes.get_mut(id.index()).map(|n| &mut n.data)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> ArenaNodeId {
        self.push(ArenaNodeData::Element { name, attrs })
    }

    pub fn create_text(&mut self, text: String) -> ArenaNodeId {
        self.push(ArenaNodeData::Text(text))
    }

    pub fn create_comment(&mut self, text: String) -> ArenaNodeId {
        self.push(ArenaNodeData::Comment(text))
    }

    /// Make `child` the last child of `parent`. `child` must be detached.
    pub fn append(&mut self, parent: ArenaNodeId, child: ArenaNodeId) {
        let Some(prev) = self.links(parent).map(|l| l.last_child) else {
            return;
        };
        if let Some(links) = self.links_mut(child) {
            links.parent = Some(parent);
            links.prev = prev;
            links.next = None;
        }
        match prev {
            Some(prev) => {
                if let Some(links) = self.links_mut(prev) {
                    links.next = Some(child);
                }
            }
            None => {
                if let Some(links) = self.links_mut(parent) {
                    links.first_child = Some(child);
                }
            }
        }
        if let Some(links) = self.links_mut(parent) {
            links.last_child = Some(child);
        }
    }

    /// Link the detached `node` in front of `sibling`.
    pub fn insert_before(&mut self, sibling: ArenaNodeId, node: ArenaNodeId) {
        let Some((parent, prev)) = self.links(sibling).map(|l| (l.parent, l.prev)) else {
            return;
        };
        if let Some(links) = self.links_mut(node) {
            links.parent = parent;
            links.prev = prev;
            links.next = Some(sibling);
        }
        if let Some(links) = self.links_mut(sibling) {
            links.prev = Some(node);
        }
        let before = match prev {
            Some(prev) => self.links_mut(prev).map(|l| &mut l.next),
            None => parent
                .and_then(|p| self.links_mut(p))
                .map(|l| &mut l.first_child),
        };
        if let Some(slot) = before {
            *slot = Some(node);
        }
    }

    /// Unlink `id` from its parent and siblings; its subtree stays intact.
    pub fn detach(&mut self, id: ArenaNodeId) {
        let Some((parent, prev, next)) = self.links(id).map(|l| (l.parent, l.prev, l.next)) else {
            return;
        };
        match prev {
            Some(prev) => {
                if let Some(links) = self.links_mut(prev) {
                    links.next = next;
                }
            }
            None => {
                if let Some(links) = parent.and_then(|p| self.links_mut(p)) {
                    links.first_child = next;
                }
            }
        }
        match next {
            Some(next) => {
                if let Some(links) = self.links_mut(next) {
                    links.prev = prev;
                }
            }
            None => {
                if let Some(links) = parent.and_then(|p| self.links_mut(p)) {
                    links.last_child = prev;
                }
            }
        }
        if let Some(links) = self.links_mut(id) {
            links.parent = None;
            links.prev = None;
            links.next = None;
        }
    }

    /// Append text under `parent`, merging into a trailing text node.
    pub fn append_text(&mut self, parent: ArenaNodeId, text: &str) {
        let last = self.links(parent).and_then(|l| l.last_child);
        if let Some(ArenaNodeData::Text(existing)) = last.and_then(|id| self.data_mut(id)) {
            existing.push_str(text);
            return;
        }
        let node = self.create_text(text.to_string());
        self.append(parent, node);
    }

    /// Insert text before `sibling`, merging into a preceding text node.
    pub fn insert_text_before(&mut self, sibling: ArenaNodeId, text: &str) {
        let prev = self.links(sibling).and_then(|l| l.prev);
        if let Some(ArenaNodeData::Text(existing)) = prev.and_then(|id| self.data_mut(id)) {
            existing.push_str(text);
            return;
        }
        let node = self.create_text(text.to_string());
        self.insert_before(sibling, node);
    }

    pub fn parent(&self, id: ArenaNodeId) -> Option<ArenaNodeId> {
        self.links(id)?.parent
    }

    pub fn children(&self, id: ArenaNodeId) -> impl Iterator<Item = ArenaNodeId> + '_ {
        let first = self.links(id).and_then(|l| l.first_child);
        std::iter::successors(first, |&c| self.links(c).and_then(|l| l.next))
    }

    /// Everything below `root` in document order, without recursion.
    pub fn descendants(&self, root: ArenaNodeId) -> Descendants<'_> {
        Descendants {
            dom: self,
            root,
            next: self.links(root).and_then(|l| l.first_child),
        }
    }

    pub fn element_name(&self, id: ArenaNodeId) -> Option<&LocalName> {
        match self.data(id)? {
            ArenaNodeData::Element { name, .. } => Some(&name.local),
            _ => None,
        }
    }

    pub fn is_element(&self, id: ArenaNodeId) -> bool {
        matches!(self.data(id), Some(ArenaNodeData::Element { .. }))
    }

    /// Element check with an ASCII case-insensitive tag name.
    pub fn is_tag(&self, id: ArenaNodeId, tag: &str) -> bool {
        self.element_name(id)
            .is_some_and(|name| name.as_ref().eq_ignore_ascii_case(tag))
    }

    /// Attribute value; names compare ASCII case-insensitively.
    pub fn get_attr(&self, id: ArenaNodeId, name: &str) -> Option<&str> {
        match self.data(id)? {
            ArenaNodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.as_ref().eq_ignore_ascii_case(name))
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    pub fn has_attr(&self, id: ArenaNodeId, name: &str) -> bool {
        self.get_attr(id, name).is_some()
    }

    pub fn text(&self, id: ArenaNodeId) -> Option<&str> {
        match self.data(id)? {
            ArenaNodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<ArenaNodeId> {
        self.find_descendant(self.document(), tag)
    }

    pub fn find_descendant(&self, root: ArenaNodeId, tag: &str) -> Option<ArenaNodeId> {
        self.descendants(root).find(|&id| self.is_tag(id, tag))
    }

    /// The following sibling element, skipping text and comments.
    pub fn next_element_sibling(&self, id: ArenaNodeId) -> Option<ArenaNodeId> {
        let next = self.links(id)?.next;
        std::iter::successors(next, |&s| self.links(s).and_then(|l| l.next))
            .find(|&s| self.is_element(s))
    }
}

/// Pre-order iterator returned by [`ArenaDom::descendants`].
pub struct Descendants<'a> {
    dom: &'a ArenaDom,
    root: ArenaNodeId,
    next: Option<ArenaNodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = ArenaNodeId;

    fn next(&mut self) -> Option<ArenaNodeId> {
        let current = self.next?;
        let links = self.dom.links(current)?;
        self.next = links.first_child.or_else(|| {
            // climb until a node with a following sibling, stopping at root
            let mut cursor = current;
            loop {
                if cursor == self.root {
                    return None;
                }
                let links = self.dom.links(cursor)?;
                if links.next.is_some() {
                    return links.next;
                }
                cursor = links.parent?;
            }
        });
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use html5ever::ns;

    fn elem(dom: &mut ArenaDom, tag: &str) -> ArenaNodeId {
        dom.create_element(QualName::new(None, ns!(html), LocalName::from(tag)), Vec::new())
    }

    #[test]
    fn test_descendants_preorder() {
        let mut dom = ArenaDom::new();
        let doc = dom.document();
        let ul = elem(&mut dom, "ul");
        let li1 = elem(&mut dom, "li");
        let li2 = elem(&mut dom, "li");
        let p = elem(&mut dom, "p");
        dom.append(doc, ul);
        dom.append(ul, li1);
        dom.append(li1, p);
        dom.append(ul, li2);

        assert_eq!(dom.descendants(doc).collect::<Vec<_>>(), vec![ul, li1, p, li2]);
        assert_eq!(dom.descendants(li1).collect::<Vec<_>>(), vec![p]);
        assert_eq!(dom.descendants(p).count(), 0);
        assert_eq!(dom.parent(p), Some(li1));
        assert_eq!(dom.parent(doc), None);
    }

    #[test]
    fn test_element_siblings_skip_text() {
        let mut dom = ArenaDom::new();
        let doc = dom.document();
        let li = elem(&mut dom, "li");
        dom.append(doc, li);
        dom.append_text(doc, "\n  ");
        dom.append_text(doc, "more");
        let ul = elem(&mut dom, "ul");
        dom.append(doc, ul);

        assert_eq!(dom.children(doc).count(), 3);
        assert_eq!(dom.next_element_sibling(li), Some(ul));
        assert_eq!(dom.next_element_sibling(ul), None);
        assert!(dom.is_tag(ul, "UL"));
    }

    #[test]
    fn test_detach_and_insert_before() {
        let mut dom = ArenaDom::new();
        let doc = dom.document();
        let a = elem(&mut dom, "a");
        let b = elem(&mut dom, "b");
        let i = elem(&mut dom, "i");
        dom.append(doc, a);
        dom.append(doc, b);
        dom.insert_before(a, i);
        assert_eq!(dom.children(doc).collect::<Vec<_>>(), vec![i, a, b]);

        dom.detach(b);
        assert_eq!(dom.children(doc).collect::<Vec<_>>(), vec![i, a]);
        dom.detach(i);
        assert_eq!(dom.children(doc).collect::<Vec<_>>(), vec![a]);

        dom.insert_text_before(a, "x");
        dom.insert_text_before(a, "y");
        let first = dom.children(doc).next().unwrap();
        assert_eq!(dom.text(first), Some("xy"));
    }

    #[test]
    fn test_attributes_ignore_case() {
        let mut dom = ArenaDom::new();
        let attrs = vec![Attribute {
            name: LocalName::from("HREF"),
            value: "a.htm".into(),
        }];
        let a = dom.create_element(QualName::new(None, ns!(html), LocalName::from("a")), attrs);
        assert_eq!(dom.get_attr(a, "href"), Some("a.htm"));
        assert!(!dom.has_attr(a, "name"));
        assert_eq!(dom.get_attr(dom.document(), "href"), None);
    }
}
