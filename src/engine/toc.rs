//! Table-of-contents tree assembled from `(title, target, level)` visits.

use super::dest::Destination;
use crate::document::TocVisitor;
use crate::util::{is_absolute_url, percent_decode};

/// One entry of the TOC tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TocNode {
    pub title: String,
    pub dest: Option<Destination>,
    /// Page number shown next to the entry; 0 for none.
    pub page: usize,
    /// Sequential id, starting at 1, in visit order.
    pub id: usize,
    /// Whether the entry starts expanded.
    pub open: bool,
    pub children: Vec<TocNode>,
}

impl TocNode {
    pub fn new(title: impl Into<String>, dest: Option<Destination>) -> Self {
        let page = dest.as_ref().map(|d| d.page).unwrap_or(0);
        Self {
            title: title.into(),
            dest,
            page,
            id: 0,
            open: false,
            children: Vec::new(),
        }
    }

    /// Depth-first iteration over this node and its descendants.
    pub fn iter(&self) -> impl Iterator<Item = &TocNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Top-level TOC entries in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TocTree {
    pub roots: Vec<TocNode>,
}

impl TocTree {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Attach `item` at `level` (1 = top level).
    ///
    /// Descends through the last entry of each level; when a level has no
    /// children yet the item becomes the first child there, otherwise it is
    /// appended as the last sibling. Skipped levels therefore nest under the
    /// deepest existing entry instead of failing.
    pub fn append(&mut self, item: TocNode, level: usize) {
        let mut list = &mut self.roots;
        let mut depth = level;
        while depth > 1 && !list.is_empty() {
            let last = list.len() - 1;
            if list[last].children.is_empty() {
                list[last].children.push(item);
                return;
            }
            list = &mut list[last].children;
            depth -= 1;
        }
        list.push(item);
    }

    /// Depth-first iteration over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = &TocNode> {
        self.roots.iter().flat_map(TocNode::iter)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }
}

/// Builds a [`TocTree`], resolving each target through `resolve`.
pub struct TocBuilder<F> {
    resolve: F,
    tree: TocTree,
    is_index: bool,
    next_id: usize,
}

impl<F> TocBuilder<F>
where
    F: Fn(&str) -> Option<Destination>,
{
    pub fn new(resolve: F) -> Self {
        Self {
            resolve,
            tree: TocTree::default(),
            is_index: false,
            next_id: 0,
        }
    }

    fn destination(&self, url: &str) -> Option<Destination> {
        if is_absolute_url(url) {
            return Some(Destination::launch_url(url));
        }
        (self.resolve)(url).or_else(|| {
            // some TOCs escape names that the markup stores unescaped
            url.contains('%')
                .then(|| percent_decode(url))
                .and_then(|decoded| (self.resolve)(&decoded))
        })
    }

    /// The finished tree. A lone top-level entry starts expanded.
    pub fn finish(mut self) -> TocTree {
        if let [single] = self.tree.roots.as_mut_slice() {
            single.open = true;
        }
        self.tree
    }
}

impl<F> TocVisitor for TocBuilder<F>
where
    F: Fn(&str) -> Option<Destination>,
{
    fn visit(&mut self, name: &str, url: Option<&str>, level: usize) {
        let dest = url.and_then(|u| self.destination(u));
        let mut item = TocNode::new(name, dest);
        self.next_id += 1;
        item.id = self.next_id;

        let mut level = level;
        if self.is_index {
            item.page = 0;
            level += 1;
        }
        self.tree.append(item, level);
    }

    fn set_is_index(&mut self, is_index: bool) {
        self.is_index = is_index;
    }
}
