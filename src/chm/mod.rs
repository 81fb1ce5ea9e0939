//! Microsoft Compiled HTML Help (CHM) support.
//!
//! A CHM is an ITSF archive: a directory of named entries stored either
//! uncompressed (section 0) or LZX-compressed (section 1). Metadata lives
//! in system entries (`#SYSTEM`, `#WINDOWS`, `#STRINGS`, `#IVB`); the TOC
//! and keyword index are HTML sitemaps.

mod archive;
mod collect;
mod directory;
mod doc;
mod lzx;
mod section;
mod sitemap;

pub use archive::ChmArchive;
pub use directory::{DirEntry, Directory, ItsfHeader};
pub use doc::{ChmFile, RawMetadata, lookup_topic_id, parse_system_data, parse_windows_data};
pub use sitemap::{walk as walk_sitemap, walk_flat, walk_structured};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::PageGeometry;
use crate::container::{Container, Format};
use crate::document::{Document, DocumentProperty, PageLayout, ResourceProvider, TocVisitor};
use crate::engine::Destination;
use crate::error::Result;
use crate::io::ByteSource;
use crate::util::{normalize_url, url_without_fragment};

/// A CHM flattened into one markup stream.
pub struct ChmDoc {
    file: ChmFile,
    html: String,
    images: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl ChmDoc {
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let file = ChmFile::open(source)?;
        let html = collect::HtmlCollector::new(&file).collect();
        Ok(Self {
            file,
            html,
            images: Mutex::new(HashMap::new()),
        })
    }

    pub fn file(&self) -> &ChmFile {
        &self.file
    }

    fn entry_path(url: &str, page_path: Option<&str>) -> String {
        let url = url_without_fragment(url);
        match page_path {
            Some(base) => normalize_url(url, base),
            None => url.to_string(),
        }
    }
}

impl ResourceProvider for ChmDoc {
    fn image_data(&self, src: &str, page_path: Option<&str>) -> Option<Arc<[u8]>> {
        let path = Self::entry_path(src, page_path);
        let key = path.to_lowercase();
        if let Ok(cache) = self.images.lock()
            && let Some(data) = cache.get(&key)
        {
            return Some(Arc::clone(data));
        }

        let data: Arc<[u8]> = self.file.archive().get_entry(&path).ok()?.into_vec().into();
        if let Ok(mut cache) = self.images.lock() {
            cache.insert(key, Arc::clone(&data));
        }
        Some(data)
    }

    fn stylesheet_data(&self, href: &str, page_path: Option<&str>) -> Option<Vec<u8>> {
        let path = Self::entry_path(href, page_path);
        self.file.archive().get_entry(&path).ok().map(|d| d.into_vec())
    }
}

impl Document for ChmDoc {
    fn format(&self) -> Format {
        Format::Chm
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, prop: DocumentProperty) -> Option<String> {
        match prop {
            DocumentProperty::Title => self.file.title(),
            DocumentProperty::CreatorApp => self.file.creator(),
            _ => None,
        }
    }

    fn has_toc(&self) -> bool {
        self.file.has_toc() || self.file.has_index()
    }

    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        self.file.parse_toc(visitor);
        if self.file.has_index() {
            visitor.visit("Index", None, 1);
            visitor.set_is_index(true);
            self.file.parse_index(visitor);
        }
    }

    /// Numeric names are help topic ids.
    fn resolve_alias(&self, name: &str) -> Option<String> {
        let id = name.parse::<u32>().ok()?;
        self.file.resolve_topic_id(id)
    }

    fn link_fallback(&self, url: &str, base_path: Option<&str>) -> Option<Destination> {
        let path = Self::entry_path(url, base_path);
        self.file
            .archive()
            .has_entry(&path)
            .then(|| Destination::launch_embedded(path))
    }

    fn embedded_data(&self, path: &str) -> Option<Vec<u8>> {
        self.file.archive().get_entry(path).ok().map(|d| d.into_vec())
    }

    fn page_geometry(&self) -> PageGeometry {
        PageGeometry::a4()
    }

    fn preferred_layout(&self) -> PageLayout {
        PageLayout::Single
    }
}
