//! EPUB books, zipped or unpacked into a directory.
//!
//! The spine documents are concatenated into one markup stream, each one
//! introduced by a `<pagebreak page_path=... page_marker />` marker naming
//! its path relative to the container root, so links between documents
//! resolve like CHM page links.

mod nav;
mod opf;

pub use nav::{NavEntry, parse_nav_document, parse_ncx};
pub use opf::{ManifestItem, Package, parse_container_xml, parse_opf};

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::archive::{DirContainer, ZipContainer};
use crate::container::{Container, Format};
use crate::document::{Document, DocumentProperty, ResourceProvider, TocVisitor};
use crate::error::{Error, Result};
use crate::util::{
    close_open_markup, html_escape, normalize_url, percent_decode, url_without_fragment,
};

const CONTAINER_XML: &str = "META-INF/container.xml";
const EPUB_MIMETYPE: &str = "application/epub+zip";

/// Container-root path of `href` as written in `base`, without the
/// leading slash and percent-decoded.
fn entry_path(href: &str, base: &str) -> String {
    let resolved = normalize_url(href, base);
    let resolved = resolved.strip_prefix('/').unwrap_or(&resolved);
    percent_decode(resolved).into_owned()
}

pub struct EpubDoc {
    container: Box<dyn Container>,
    package: Package,
    html: String,
    toc: Vec<NavEntry>,
    images: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl EpubDoc {
    /// Open a `.epub` file or a directory holding an unpacked book.
    pub fn open_path(path: &Path) -> Result<Self> {
        let container: Box<dyn Container> = if path.is_dir() {
            Box::new(DirContainer::new(path))
        } else {
            Box::new(ZipContainer::open(path)?)
        };
        Self::from_container(container)
    }

    pub fn from_container(container: Box<dyn Container>) -> Result<Self> {
        match container.get_entry("mimetype") {
            Ok(data) => {
                let mimetype = String::from_utf8_lossy(data.as_bytes());
                if mimetype.trim() != EPUB_MIMETYPE {
                    log::warn!("unexpected EPUB mimetype {:?}", mimetype.trim());
                }
            }
            Err(_) => log::debug!("EPUB without mimetype entry"),
        }

        let opf_path = parse_container_xml(container.get_entry(CONTAINER_XML)?.as_bytes())?;
        let opf_path = opf_path.trim_start_matches('/').to_string();
        let opf = container.get_entry(&opf_path)?;
        let package = parse_opf(&opf::xml_text(opf.as_bytes()))?;

        let html = Self::collect_spine(container.as_ref(), &package, &opf_path);
        if html.is_empty() {
            return Err(Error::EmptyDocument);
        }
        let toc = Self::load_toc(container.as_ref(), &package, &opf_path);

        log::debug!(
            "opened EPUB {:?}: {} spine items, {} TOC entries",
            package.title,
            package.spine.len(),
            toc.len()
        );
        Ok(Self {
            container,
            package,
            html,
            toc,
            images: Mutex::new(HashMap::new()),
        })
    }

    fn collect_spine(container: &dyn Container, package: &Package, opf_path: &str) -> String {
        let mut html = String::new();
        for idref in &package.spine {
            let Some(item) = package.manifest.get(idref) else {
                log::debug!("spine item {idref} is not in the manifest");
                continue;
            };
            if !item.is_html() {
                continue;
            }
            let path = entry_path(&item.href, opf_path);
            let data = match container.get_entry(&path) {
                Ok(data) => data,
                Err(e) => {
                    log::debug!("skipping spine item {path}: {e}");
                    continue;
                }
            };
            html.push_str(&format!(
                "<pagebreak page_path=\"{}\" page_marker />",
                html_escape(&path)
            ));
            let mut page = opf::xml_text(data.as_bytes());
            close_open_markup(&mut page);
            html.push_str(&page);
        }
        html
    }

    /// The NCX when present, else the EPUB 3 navigation document. Targets
    /// are rewritten to container-root paths.
    fn load_toc(container: &dyn Container, package: &Package, opf_path: &str) -> Vec<NavEntry> {
        let read = |href: &str| -> Option<(String, String)> {
            let path = entry_path(href, opf_path);
            let data = container.get_entry(&path).ok()?;
            Some((path, opf::xml_text(data.as_bytes())))
        };

        let mut found = None;
        if let Some((path, ncx)) = package.ncx_href().and_then(&read) {
            match parse_ncx(&ncx) {
                Ok(entries) if !entries.is_empty() => found = Some((path, entries)),
                Ok(_) => {}
                Err(e) => log::warn!("ignoring unreadable NCX {path}: {e}"),
            }
        }
        if found.is_none()
            && let Some((path, nav)) = package.nav_href().and_then(&read)
        {
            found = Some((path, parse_nav_document(&nav)));
        }

        let Some((base, entries)) = found else {
            return Vec::new();
        };
        entries
            .into_iter()
            .map(|mut entry| {
                entry.src = entry.src.map(|src| {
                    let fragment = src.find('#').map(|i| &src[i..]).unwrap_or("");
                    let path = match url_without_fragment(&src) {
                        "" => base.clone(),
                        path => entry_path(path, &base),
                    };
                    format!("{path}{fragment}")
                });
                entry
            })
            .collect()
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    fn read_resource(&self, src: &str, page_path: Option<&str>) -> Option<Vec<u8>> {
        let src = url_without_fragment(src);
        let path = match page_path {
            Some(base) => entry_path(src, base),
            None => percent_decode(src.trim_start_matches('/')).into_owned(),
        };
        self.container.get_entry(&path).ok().map(|d| d.into_vec())
    }
}

impl ResourceProvider for EpubDoc {
    fn image_data(&self, src: &str, page_path: Option<&str>) -> Option<Arc<[u8]>> {
        let key = format!("{}\0{src}", page_path.unwrap_or(""));
        let mut cache = self.images.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = cache.get(&key) {
            return Some(Arc::clone(data));
        }
        let data: Arc<[u8]> = self.read_resource(src, page_path)?.into();
        cache.insert(key, Arc::clone(&data));
        Some(data)
    }

    fn stylesheet_data(&self, href: &str, page_path: Option<&str>) -> Option<Vec<u8>> {
        self.read_resource(href, page_path)
    }
}

impl Document for EpubDoc {
    fn format(&self) -> Format {
        Format::Epub
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, prop: DocumentProperty) -> Option<String> {
        let package = &self.package;
        match prop {
            DocumentProperty::Title => package.title.clone(),
            DocumentProperty::Author => {
                (!package.creators.is_empty()).then(|| package.creators.join(", "))
            }
            DocumentProperty::Copyright => package.rights.clone(),
            DocumentProperty::Subject => package.description.clone(),
            DocumentProperty::Publisher => package.publisher.clone(),
            DocumentProperty::CreationDate => package.date.clone(),
            _ => None,
        }
    }

    fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        for entry in &self.toc {
            visitor.visit(&entry.title, entry.src.as_deref(), entry.level);
        }
    }

    /// In-book links keep their percent-escapes while page paths are
    /// decoded.
    fn resolve_alias(&self, name: &str) -> Option<String> {
        name.contains('%').then(|| percent_decode(name).into_owned())
    }

    fn is_rtl(&self) -> bool {
        self.package.rtl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_path() {
        assert_eq!(entry_path("Text/ch%201.xhtml", "OEBPS/content.opf"), "OEBPS/Text/ch 1.xhtml");
        assert_eq!(entry_path("../Images/a.png", "OEBPS/Text/ch1.xhtml"), "OEBPS/Images/a.png");
        assert_eq!(entry_path("ch1.xhtml", "content.opf"), "ch1.xhtml");
        assert_eq!(entry_path("/abs/x.png", "OEBPS/a.xhtml"), "abs/x.png");
    }

    #[test]
    fn test_open_unpacked_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("META-INF")).unwrap();
        std::fs::create_dir_all(root.join("OEBPS/Text")).unwrap();
        std::fs::write(root.join("mimetype"), EPUB_MIMETYPE).unwrap();
        std::fs::write(
            root.join(CONTAINER_XML),
            r#"<container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        std::fs::write(
            root.join("OEBPS/content.opf"),
            r#"<package><metadata><dc:title>Unpacked</dc:title></metadata>
<manifest><item id="c1" href="Text/one.xhtml" media-type="application/xhtml+xml"/></manifest>
<spine><itemref idref="c1"/></spine></package>"#,
        )
        .unwrap();
        std::fs::write(root.join("OEBPS/Text/one.xhtml"), "<html><body><p>Hi</p></body></html>")
            .unwrap();

        let doc = EpubDoc::open_path(root).unwrap();
        assert_eq!(doc.property(DocumentProperty::Title).as_deref(), Some("Unpacked"));
        assert!(
            doc.html()
                .starts_with("<pagebreak page_path=\"OEBPS/Text/one.xhtml\" page_marker />")
        );
        assert!(!doc.has_toc());
        assert!(!doc.is_rtl());
    }
}
