//! Stand-alone HTML files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::codepage;
use crate::config::PageGeometry;
use crate::container::{Format, MAX_ENTRY_SIZE};
use crate::document::{Document, DocumentProperty, PageLayout, ResourceProvider};
use crate::dom;
use crate::engine::Destination;
use crate::error::{Error, Result};
use crate::util::{decode_text, is_absolute_url, normalize_whitespace, percent_decode};

/// An HTML page laid out on its own. Resources are read from the file's
/// directory.
pub struct HtmlDoc {
    path: PathBuf,
    html: String,
    title: Option<String>,
    author: Option<String>,
    images: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
}

impl HtmlDoc {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let html = match codepage::extract_http_charset(&data) {
            Some(cp) => codepage::to_utf8(&data, cp, 0),
            None => decode_text(&data, None).into_owned(),
        };
        if html.trim().is_empty() {
            return Err(Error::EmptyDocument);
        }

        let dom = dom::parse_html(&html);
        let title = dom
            .find_by_tag("title")
            .map(|id| {
                dom.descendants(id)
                    .filter_map(|node| dom.text(node))
                    .collect::<String>()
            })
            .map(|t| normalize_whitespace(&t))
            .filter(|t| !t.is_empty());
        let author = dom
            .descendants(dom.document())
            .filter(|&id| dom.is_tag(id, "meta"))
            .find(|&id| {
                dom.get_attr(id, "name")
                    .is_some_and(|n| n.eq_ignore_ascii_case("author"))
            })
            .and_then(|id| dom.get_attr(id, "content"))
            .map(normalize_whitespace)
            .filter(|a| !a.is_empty());

        log::debug!("opened HTML file {}: {} bytes", path.display(), html.len());
        Ok(Self {
            path: path.to_path_buf(),
            html,
            title,
            author,
            images: Mutex::new(HashMap::new()),
        })
    }

    /// File next to the document that `url` names, if it is a relative
    /// reference.
    fn local_file(&self, url: &str) -> Option<PathBuf> {
        if url.is_empty() || url.starts_with('#') || is_absolute_url(url) {
            return None;
        }
        let url = url.split(['#', '?']).next().unwrap_or(url);
        let relative = percent_decode(url);
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        Some(dir.join(relative.trim_start_matches('/')))
    }

    fn read_local(&self, url: &str) -> Option<Vec<u8>> {
        let file = self.local_file(url)?;
        let size = std::fs::metadata(&file).ok()?.len();
        if size > MAX_ENTRY_SIZE {
            log::warn!("skipping {}: {size} bytes", file.display());
            return None;
        }
        std::fs::read(file).ok()
    }
}

impl ResourceProvider for HtmlDoc {
    fn image_data(&self, src: &str, _page_path: Option<&str>) -> Option<Arc<[u8]>> {
        let file = self.local_file(src)?;
        let mut cache = self.images.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = cache.get(&file) {
            return Some(Arc::clone(data));
        }
        let data: Arc<[u8]> = self.read_local(src)?.into();
        cache.insert(file, Arc::clone(&data));
        Some(data)
    }

    fn stylesheet_data(&self, href: &str, _page_path: Option<&str>) -> Option<Vec<u8>> {
        self.read_local(href)
    }
}

impl Document for HtmlDoc {
    fn format(&self) -> Format {
        Format::Html
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, prop: DocumentProperty) -> Option<String> {
        match prop {
            DocumentProperty::Title => self.title.clone(),
            DocumentProperty::Author => self.author.clone(),
            _ => None,
        }
    }

    /// Relative links leave the document: they open the named file.
    fn link_override(&self, url: &str) -> Option<Destination> {
        if url.starts_with('#') || is_absolute_url(url) {
            return None;
        }
        let (path, fragment) = match url.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment.to_string())),
            None => (url, None),
        };
        Some(Destination::launch_file(percent_decode(path), fragment))
    }

    fn page_geometry(&self) -> PageGeometry {
        PageGeometry::a4()
    }

    fn preferred_layout(&self) -> PageLayout {
        PageLayout::Single
    }
}
