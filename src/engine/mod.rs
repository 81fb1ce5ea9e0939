//! Loaded, paginated documents.
//!
//! [`Engine::load`] picks a format, lets the document produce its flowed
//! markup, runs the formatter and indexes anchors. Everything afterwards is
//! read-only except user annotations; pages, anchors and annotations sit
//! behind one mutex.

mod anchors;
mod dest;
mod text;
mod toc;

pub use anchors::{AnchorIndex, AnchorRef, anchor_name};
pub use dest::{DestKind, Destination, resolve_named_dest, split_name};
pub use text::{PageText, extract_page_text};
pub use toc::{TocBuilder, TocNode, TocTree};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::chm::ChmDoc;
use crate::config::{EbookConfig, PageGeometry};
use crate::container::Format;
use crate::document::{Document, DocumentProperty, PageLayout};
use crate::epub::EpubDoc;
use crate::error::{Error, Result};
use crate::fb2::Fb2Doc;
use crate::html::HtmlDoc;
use crate::io::{ByteSource, FileSource};
use crate::layout::{
    AbortCookie, DrawInstr, FlowFormatter, Formatter, FormatterArgs, InstrKind, Page, PointF, RectF,
};
use crate::mobi::{MobiDoc, PalmDoc};
use crate::txt::TxtDoc;
use crate::util::{is_absolute_url, normalize_url};

/// Annotation kinds a user can add to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Highlight,
    Underline,
    StrikeOut,
    Squiggly,
}

/// A user annotation in page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub page: usize,
    pub rect: RectF,
    /// 0xRRGGBB
    pub color: u32,
}

/// Something clickable or inspectable on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Image,
    Link(Option<Destination>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    pub kind: ElementKind,
    pub page: usize,
    /// Page-relative rectangle.
    pub rect: RectF,
}

impl PageElement {
    pub fn dest(&self) -> Option<&Destination> {
        match &self.kind {
            ElementKind::Link(dest) => dest.as_ref(),
            ElementKind::Image => None,
        }
    }
}

struct EngineState {
    pages: Vec<Page>,
    anchors: AnchorIndex,
    annotations: Vec<Annotation>,
}

/// A document laid out into pages.
pub struct Engine {
    doc: Box<dyn Document>,
    geometry: PageGeometry,
    file_name: Option<PathBuf>,
    state: Mutex<EngineState>,
}

/// Open the document at `path` as `format`.
pub fn open_document(path: &Path, format: Format) -> Result<Box<dyn Document>> {
    let source = || -> Result<Arc<dyn ByteSource>> { Ok(Arc::new(FileSource::open(path)?)) };
    let doc: Box<dyn Document> = match format {
        Format::Chm => Box::new(ChmDoc::open(source()?)?),
        Format::Mobi => Box::new(MobiDoc::open(source()?)?),
        Format::PalmDoc => Box::new(PalmDoc::open(source()?)?),
        Format::Epub => Box::new(EpubDoc::open_path(path)?),
        Format::Fb2 => Box::new(Fb2Doc::open(path)?),
        Format::Html => Box::new(HtmlDoc::open(path)?),
        Format::Txt => Box::new(TxtDoc::open(path)?),
    };
    Ok(doc)
}

impl Engine {
    /// Detect the format of `path`, open and paginate it.
    pub fn load(path: impl AsRef<Path>, config: &EbookConfig) -> Result<Self> {
        Self::load_with_abort(path, config, None)
    }

    pub fn load_with_abort(
        path: impl AsRef<Path>,
        config: &EbookConfig,
        abort: Option<AbortCookie>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::detect(path)
            .ok_or_else(|| Error::Unsupported(path.display().to_string()))?;
        let doc = open_document(path, format)?;
        let mut engine = Self::from_document(doc, config, abort)?;
        engine.file_name = Some(path.to_path_buf());
        Ok(engine)
    }

    /// Paginate an already opened document.
    pub fn from_document(
        doc: Box<dyn Document>,
        config: &EbookConfig,
        abort: Option<AbortCookie>,
    ) -> Result<Self> {
        let geometry = config.page.unwrap_or_else(|| doc.page_geometry());
        let args = FormatterArgs {
            html: doc.html(),
            page_width: geometry.content_width(),
            page_height: geometry.content_height(),
            font_name: &config.font_name,
            font_size: config.font_size,
            resources: doc.as_ref(),
            abort,
        };
        let pages = FlowFormatter::new(args).format_all_pages()?;
        Self::from_pages(doc, geometry, pages)
    }

    /// Wrap pages produced by any formatter.
    pub fn from_pages(doc: Box<dyn Document>, geometry: PageGeometry, pages: Vec<Page>) -> Result<Self> {
        let anchors = AnchorIndex::build(&pages)?;
        log::debug!(
            "loaded {:?} document: {} pages",
            doc.format(),
            pages.len()
        );
        Ok(Self {
            doc,
            geometry,
            file_name: None,
            state: Mutex::new(EngineState {
                pages,
                anchors,
                annotations: Vec::new(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        // a panic while holding the lock leaves the state readable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn document(&self) -> &dyn Document {
        self.doc.as_ref()
    }

    pub fn format(&self) -> Format {
        self.doc.format()
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn page_count(&self) -> usize {
        self.state().pages.len()
    }

    fn check_page(&self, page: usize, count: usize) -> Option<usize> {
        (1..=count).contains(&page).then(|| page - 1)
    }

    /// Full page rectangle.
    pub fn page_mediabox(&self, _page: usize) -> RectF {
        RectF::new(0.0, 0.0, self.geometry.width, self.geometry.height)
    }

    /// Page rectangle minus the border.
    pub fn page_content_box(&self, page: usize) -> RectF {
        self.page_mediabox(page)
            .inflate(-self.geometry.border, -self.geometry.border)
    }

    pub fn page_geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Instructions of a 1-based page, relative to the content box.
    pub fn page_instructions(&self, page: usize) -> Option<Vec<DrawInstr>> {
        let state = self.state();
        let idx = self.check_page(page, state.pages.len())?;
        Some(state.pages[idx].instructions.clone())
    }

    /// All anchors as `(name, page)` in reading order.
    pub fn anchors(&self) -> Vec<(String, usize)> {
        let state = self.state();
        state
            .anchors
            .anchors()
            .iter()
            .filter_map(|&a| anchor_name(&state.pages, a).map(|n| (n.to_string(), a.page)))
            .collect()
    }

    /// Name of the sub-document a page belongs to.
    pub fn base_anchor(&self, page: usize) -> Option<String> {
        let state = self.state();
        let anchor = state.anchors.base_anchor(page)?;
        anchor_name(&state.pages, anchor).map(str::to_string)
    }

    /// Resolve a destination name: `path#id`, `#id`, `id`, or a
    /// format-specific alias such as a CHM topic id.
    pub fn named_dest(&self, name: &str) -> Option<Destination> {
        let state = self.state();
        self.named_dest_locked(&state, name)
    }

    fn named_dest_locked(&self, state: &EngineState, name: &str) -> Option<Destination> {
        resolve_named_dest(&state.pages, &state.anchors, &self.geometry, name).or_else(|| {
            let alias = self.doc.resolve_alias(name)?;
            resolve_named_dest(&state.pages, &state.anchors, &self.geometry, &alias)
        })
    }

    /// Destination of a link on `page`. Relative URLs are resolved against
    /// the page's sub-document.
    pub fn page_link(&self, url: &str, page: usize) -> Option<Destination> {
        let state = self.state();
        self.page_link_locked(&state, url, page)
    }

    fn page_link_locked(&self, state: &EngineState, url: &str, page: usize) -> Option<Destination> {
        if url.is_empty() {
            return None;
        }
        if let Some(dest) = self.doc.link_override(url) {
            return Some(dest);
        }
        if is_absolute_url(url) {
            return Some(Destination::launch_url(url));
        }

        let base = state
            .anchors
            .base_anchor(page)
            .and_then(|a| anchor_name(&state.pages, a));
        let target = match base {
            Some(base) => normalize_url(url, base),
            None => url.to_string(),
        };
        self.named_dest_locked(state, &target)
            .or_else(|| self.doc.link_fallback(url, base))
    }

    pub fn has_toc(&self) -> bool {
        self.doc.has_toc()
    }

    pub fn toc_tree(&self) -> Option<TocTree> {
        if !self.doc.has_toc() {
            return None;
        }
        let state = self.state();
        let mut builder = TocBuilder::new(|url: &str| self.named_dest_locked(&state, url));
        self.doc.visit_toc(&mut builder);
        let tree = builder.finish();
        (!tree.is_empty()).then_some(tree)
    }

    pub fn property(&self, prop: DocumentProperty) -> Option<String> {
        match prop {
            DocumentProperty::FontList => self.font_list(),
            _ => self.doc.property(prop),
        }
    }

    /// Sorted, de-duplicated (case-insensitively) fonts used by all pages.
    fn font_list(&self) -> Option<String> {
        let state = self.state();
        let mut fonts: BTreeMap<String, String> = BTreeMap::new();
        for instr in state.pages.iter().flat_map(|p| &p.instructions) {
            if let InstrKind::SetFont(font) = &instr.kind {
                fonts
                    .entry(font.name.to_lowercase())
                    .or_insert_with(|| font.name.clone());
            }
        }
        if fonts.is_empty() {
            return None;
        }
        Some(fonts.into_values().collect::<Vec<_>>().join("\n"))
    }

    pub fn extract_page_text(&self, page: usize, line_sep: &str) -> Option<PageText> {
        let state = self.state();
        let idx = self.check_page(page, state.pages.len())?;
        Some(extract_page_text(
            &state.pages[idx].instructions,
            self.geometry.border,
            line_sep,
        ))
    }

    /// Images and links (with a non-empty box) on a page.
    pub fn elements(&self, page: usize) -> Vec<PageElement> {
        let state = self.state();
        let Some(idx) = self.check_page(page, state.pages.len()) else {
            return Vec::new();
        };
        let border = self.geometry.border;
        state.pages[idx]
            .instructions
            .iter()
            .filter_map(|instr| {
                let rect = instr.bbox.offset(border, border);
                let kind = match &instr.kind {
                    InstrKind::Image(_) => ElementKind::Image,
                    InstrKind::LinkStart(url) if !instr.bbox.is_empty() => {
                        ElementKind::Link(self.page_link_locked(&state, url, page))
                    }
                    _ => return None,
                };
                Some(PageElement { kind, page, rect })
            })
            .collect()
    }

    /// First element whose box contains `pt`.
    pub fn element_at(&self, page: usize, pt: PointF) -> Option<PageElement> {
        self.elements(page).into_iter().find(|e| e.rect.contains(pt))
    }

    /// Replace the user annotations, or clear them with `None`.
    pub fn update_user_annotations(&self, annotations: Option<&[Annotation]>) {
        let mut state = self.state();
        state.annotations = annotations.map(<[Annotation]>::to_vec).unwrap_or_default();
    }

    pub fn user_annotations(&self) -> Vec<Annotation> {
        self.state().annotations.clone()
    }

    pub fn preferred_layout(&self) -> PageLayout {
        self.doc.preferred_layout()
    }

    pub fn default_file_ext(&self) -> String {
        self.doc.default_file_ext()
    }

    /// Bytes of an embedded file a [`DestKind::LaunchEmbedded`] link names.
    pub fn embedded_data(&self, path: &str) -> Option<Vec<u8>> {
        self.doc.embedded_data(path)
    }
}
