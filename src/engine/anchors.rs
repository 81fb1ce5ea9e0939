//! Flat anchor list and per-page sub-document boundaries.

use crate::error::{Error, Result};
use crate::layout::Page;

/// An anchor instruction, addressed by 1-based page number and its index
/// within that page's instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorRef {
    pub page: usize,
    pub instr: usize,
}

/// Anchors are only treated as a page's base anchor when they are among
/// its first instructions.
const BASE_ANCHOR_WINDOW: usize = 2;

/// Every anchor in reading order, plus for each page the page-marker anchor
/// of the sub-document it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorIndex {
    anchors: Vec<AnchorRef>,
    base_anchors: Vec<Option<AnchorRef>>,
}

impl AnchorIndex {
    /// One pass over all pages. Fails on an empty page list.
    pub fn build(pages: &[Page]) -> Result<Self> {
        if pages.is_empty() {
            return Err(Error::EmptyDocument);
        }

        let mut anchors = Vec::new();
        let mut base_anchors = Vec::with_capacity(pages.len());
        let mut base = None;
        for (i, page) in pages.iter().enumerate() {
            for (k, instr) in page.instructions.iter().enumerate() {
                if instr.anchor_name().is_none() {
                    continue;
                }
                let anchor = AnchorRef { page: i + 1, instr: k };
                anchors.push(anchor);
                if k < BASE_ANCHOR_WINDOW && instr.is_page_marker() {
                    base = Some(anchor);
                }
            }
            base_anchors.push(base);
        }

        if base_anchors.len() != pages.len() {
            return Err(Error::Inconsistent(format!(
                "{} base anchors for {} pages",
                base_anchors.len(),
                pages.len()
            )));
        }
        log::debug!(
            "indexed {} anchors over {} pages",
            anchors.len(),
            pages.len()
        );
        Ok(Self {
            anchors,
            base_anchors,
        })
    }

    pub fn anchors(&self) -> &[AnchorRef] {
        &self.anchors
    }

    /// Anchors on a single page, in order.
    pub fn page_anchors(&self, page: usize) -> impl Iterator<Item = AnchorRef> + '_ {
        self.anchors.iter().copied().filter(move |a| a.page == page)
    }

    /// Base anchor of a 1-based page.
    pub fn base_anchor(&self, page: usize) -> Option<AnchorRef> {
        page.checked_sub(1)
            .and_then(|i| self.base_anchors.get(i))
            .copied()
            .flatten()
    }

    pub fn base_anchors(&self) -> &[Option<AnchorRef>] {
        &self.base_anchors
    }
}

/// Name of the anchor instruction `anchor` points at.
pub fn anchor_name(pages: &[Page], anchor: AnchorRef) -> Option<&str> {
    pages
        .get(anchor.page.checked_sub(1)?)?
        .instructions
        .get(anchor.instr)?
        .anchor_name()
}
