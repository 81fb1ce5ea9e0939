//! Paginated layout: geometry, draw instructions and the formatter seam.
//!
//! A formatter turns flowed markup into an ordered list of [`Page`]s, each
//! an ordered list of [`DrawInstr`]s positioned relative to the page's
//! content box (the page minus its border).

mod flow;
mod style;

pub use flow::FlowFormatter;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::document::ResourceProvider;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle as origin plus extent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

impl RectF {
    pub fn new(x: f32, y: f32, dx: f32, dy: f32) -> Self {
        Self { x, y, dx, dy }
    }

    pub fn right(&self) -> f32 {
        self.x + self.dx
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.dy
    }

    pub fn is_empty(&self) -> bool {
        self.dx <= 0.0 || self.dy <= 0.0
    }

    /// Inclusive of the top-left edges, exclusive of the bottom-right ones.
    pub fn contains(&self, pt: PointF) -> bool {
        pt.x >= self.x && pt.x < self.right() && pt.y >= self.y && pt.y < self.bottom()
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.dx, self.dy)
    }

    /// Grow by `dx`/`dy` on every side; negative values shrink.
    pub fn inflate(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x - dx, self.y - dy, self.dx + 2.0 * dx, self.dy + 2.0 * dy)
    }
}

/// Font selection carried by [`InstrKind::SetFont`].
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub name: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

/// What a draw instruction does.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// A run of glyphs without whitespace.
    Text(String),
    /// A run of right-to-left glyphs, stored in logical order.
    RtlText(String),
    /// Inter-word gap.
    Space,
    /// Horizontal rule.
    Line,
    SetFont(FontSpec),
    Image(Arc<[u8]>),
    /// Start of a link; the bbox covers the link's first line.
    LinkStart(String),
    LinkEnd,
    /// A named position. `page_marker` anchors start a sub-document and
    /// are named after its path.
    Anchor { name: String, page_marker: bool },
}

/// One positioned instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawInstr {
    pub kind: InstrKind,
    pub bbox: RectF,
}

impl DrawInstr {
    pub fn new(kind: InstrKind, bbox: RectF) -> Self {
        Self { kind, bbox }
    }

    pub fn anchor_name(&self) -> Option<&str> {
        match &self.kind {
            InstrKind::Anchor { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_page_marker(&self) -> bool {
        matches!(self.kind, InstrKind::Anchor { page_marker: true, .. })
    }
}

/// One laid-out page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub instructions: Vec<DrawInstr>,
}

/// Shared cancellation flag, checked cooperatively by long-running work.
#[derive(Debug, Clone, Default)]
pub struct AbortCookie(Arc<AtomicBool>);

impl AbortCookie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Inputs shared by every formatter run.
pub struct FormatterArgs<'a> {
    pub html: &'a str,
    pub page_width: f32,
    pub page_height: f32,
    pub font_name: &'a str,
    pub font_size: f32,
    pub resources: &'a dyn ResourceProvider,
    pub abort: Option<AbortCookie>,
}

/// Turns markup into pages.
pub trait Formatter {
    /// Lay out the whole document. Fails with [`crate::Error::Aborted`]
    /// when the abort cookie fires.
    fn format_all_pages(&mut self) -> Result<Vec<Page>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_and_inflate() {
        let r = RectF::new(10.0, 10.0, 20.0, 5.0);
        assert!(r.contains(PointF::new(10.0, 10.0)));
        assert!(!r.contains(PointF::new(30.0, 12.0)));
        let shrunk = r.inflate(-2.0, -1.0);
        assert_eq!(shrunk, RectF::new(12.0, 11.0, 16.0, 3.0));
        assert!(RectF::new(0.0, 0.0, 0.0, 3.0).is_empty());
    }

    #[test]
    fn test_abort_cookie_shared() {
        let cookie = AbortCookie::new();
        let clone = cookie.clone();
        clone.abort();
        assert!(cookie.is_aborted());
    }
}
