//! html5ever tree builder target.

use std::borrow::Cow;
use std::cell::RefCell;

use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{QualName, local_name, ns};

use super::arena::{ArenaDom, ArenaNodeData, ArenaNodeId, Attribute};

/// Name reported for handles that are not elements.
static NO_NAME: QualName = QualName {
    prefix: None,
    ns: ns!(),
    local: local_name!(""),
};

/// Tree builder handle. Elements carry their name so the builder can
/// inspect it without borrowing the arena.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    id: ArenaNodeId,
    name: Option<QualName>,
}

impl SinkHandle {
    fn node(id: ArenaNodeId) -> Self {
        Self { id, name: None }
    }
}

fn convert_attrs(attrs: Vec<html5ever::Attribute>) -> Vec<Attribute> {
    attrs
        .into_iter()
        .map(|a| Attribute {
            name: a.name.local,
            value: a.value.to_string(),
        })
        .collect()
}

/// Builds an [`ArenaDom`]. The tree builder only hands out `&self`, hence
/// the `RefCell`.
#[derive(Default)]
pub struct ArenaSink {
    dom: RefCell<ArenaDom>,
}

impl ArenaSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_dom(self) -> ArenaDom {
        self.dom.into_inner()
    }
}

impl TreeSink for ArenaSink {
    type Handle = SinkHandle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self {
        self
    }

    // markup in help files and ebooks is rarely valid
    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> SinkHandle {
        SinkHandle::node(self.dom.borrow().document())
    }

    fn elem_name<'a>(&'a self, target: &'a SinkHandle) -> &'a QualName {
        target.name.as_ref().unwrap_or(&NO_NAME)
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<html5ever::Attribute>,
        _flags: ElementFlags,
    ) -> SinkHandle {
        let id = self
            .dom
            .borrow_mut()
            .create_element(name.clone(), convert_attrs(attrs));
        SinkHandle { id, name: Some(name) }
    }

    fn create_comment(&self, text: StrTendril) -> SinkHandle {
        SinkHandle::node(self.dom.borrow_mut().create_comment(text.to_string()))
    }

    fn create_pi(&self, _target: StrTendril, data: StrTendril) -> SinkHandle {
        self.create_comment(data)
    }

    fn append(&self, parent: &SinkHandle, child: NodeOrText<SinkHandle>) {
        let mut dom = self.dom.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => dom.append(parent.id, node.id),
            NodeOrText::AppendText(text) => dom.append_text(parent.id, &text),
        }
    }

    fn append_before_sibling(&self, sibling: &SinkHandle, child: NodeOrText<SinkHandle>) {
        let mut dom = self.dom.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => {
                dom.detach(node.id);
                dom.insert_before(sibling.id, node.id);
            }
            NodeOrText::AppendText(text) => dom.insert_text_before(sibling.id, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &SinkHandle,
        prev_element: &SinkHandle,
        child: NodeOrText<SinkHandle>,
    ) {
        let has_parent = self.dom.borrow().parent(element.id).is_some();
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    // doctypes carry nothing the formatter uses
    fn append_doctype_to_document(&self, _name: StrTendril, _public: StrTendril, _system: StrTendril) {}

    fn get_template_contents(&self, target: &SinkHandle) -> SinkHandle {
        target.clone()
    }

    fn same_node(&self, x: &SinkHandle, y: &SinkHandle) -> bool {
        x.id == y.id
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn add_attrs_if_missing(&self, target: &SinkHandle, attrs: Vec<html5ever::Attribute>) {
        let mut dom = self.dom.borrow_mut();
        if let Some(ArenaNodeData::Element { attrs: existing, .. }) = dom.data_mut(target.id) {
            for attr in convert_attrs(attrs) {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &SinkHandle) {
        self.dom.borrow_mut().detach(target.id);
    }

    fn reparent_children(&self, node: &SinkHandle, new_parent: &SinkHandle) {
        let mut dom = self.dom.borrow_mut();
        let children: Vec<_> = dom.children(node.id).collect();
        for child in children {
            dom.detach(child);
            dom.append(new_parent.id, child);
        }
    }
}
