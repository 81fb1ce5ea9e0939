//! The interface every container format implements for the engine.

use std::sync::Arc;

use crate::config::PageGeometry;
use crate::container::Format;
use crate::engine::Destination;

/// Document metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentProperty {
    Title,
    Author,
    Copyright,
    Subject,
    Publisher,
    CreationDate,
    ModificationDate,
    CreatorApp,
    /// Newline-separated sorted list of fonts used by the laid-out pages.
    FontList,
}

/// How pages are best shown side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLayout {
    Single,
    Book,
    /// Book layout for right-to-left reading order.
    BookRtl,
}

/// Receives table-of-contents entries in document order.
pub trait TocVisitor {
    /// One entry. `level` starts at 1 for top-level entries.
    fn visit(&mut self, name: &str, url: Option<&str>, level: usize);

    /// Following entries belong to the keyword index rather than the TOC.
    fn set_is_index(&mut self, _is_index: bool) {}
}

/// Callbacks the formatter uses to pull external resources.
///
/// Paths are relative to `page_path`, the sub-document currently being
/// laid out (or the document root when there is none).
pub trait ResourceProvider {
    fn image_data(&self, src: &str, page_path: Option<&str>) -> Option<Arc<[u8]>>;

    fn stylesheet_data(&self, _href: &str, _page_path: Option<&str>) -> Option<Vec<u8>> {
        None
    }
}

/// A loaded document: flowed markup plus metadata.
pub trait Document: ResourceProvider + Send + Sync {
    fn format(&self) -> Format;

    /// The markup handed to the formatter.
    fn html(&self) -> &str;

    fn property(&self, prop: DocumentProperty) -> Option<String>;

    fn has_toc(&self) -> bool {
        false
    }

    fn visit_toc(&self, _visitor: &mut dyn TocVisitor) {}

    /// Alternative name to try when a destination name does not resolve
    /// directly (topic ids, file positions).
    fn resolve_alias(&self, _name: &str) -> Option<String> {
        None
    }

    /// Destination for a link that bypasses named-anchor resolution.
    fn link_override(&self, _url: &str) -> Option<Destination> {
        None
    }

    /// Destination for a link whose target is not a laid-out anchor.
    fn link_fallback(&self, _url: &str, _base_path: Option<&str>) -> Option<Destination> {
        None
    }

    /// Raw bytes of an embedded file that a link points to.
    fn embedded_data(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }

    fn is_rtl(&self) -> bool {
        false
    }

    fn page_geometry(&self) -> PageGeometry {
        PageGeometry::paperback()
    }

    fn preferred_layout(&self) -> PageLayout {
        if self.is_rtl() {
            PageLayout::BookRtl
        } else {
            PageLayout::Book
        }
    }

    fn default_file_ext(&self) -> String {
        self.format().default_extension().to_string()
    }
}
