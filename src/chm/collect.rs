//! Flattening a CHM into one markup stream: the home page, then pages in
//! TOC order, then every remaining HTML entry.

use std::collections::HashSet;

use super::doc::ChmFile;
use crate::codepage;
use crate::container::Container;
use crate::document::TocVisitor;
use crate::util::{
    close_open_markup, html_escape, is_absolute_url, normalize_url, url_without_fragment,
};

/// Accumulates pages, each preceded by a page-break marker naming its path.
pub struct HtmlCollector<'a> {
    file: &'a ChmFile,
    added: HashSet<String>,
    html: String,
}

impl<'a> HtmlCollector<'a> {
    pub fn new(file: &'a ChmFile) -> Self {
        Self {
            file,
            added: HashSet::new(),
            html: String::new(),
        }
    }

    /// Run all three passes and return the markup.
    pub fn collect(mut self) -> String {
        let home = self.file.home_path().to_string();
        self.add_page(&home);

        let file = self.file;
        file.parse_toc(&mut self);

        for path in file.archive().enumerate_entries() {
            let lower = path.to_ascii_lowercase();
            if lower.ends_with(".htm") || lower.ends_with(".html") {
                self.add_page(&path);
            }
        }
        log::debug!("collected {} CHM pages", self.added.len());
        self.html
    }

    fn add_page(&mut self, url: &str) {
        if is_absolute_url(url) {
            return;
        }
        let plain = url_without_fragment(url);
        let plain = normalize_url(plain.trim_start_matches('/'), "");
        let plain = plain.as_str();
        if plain.is_empty() {
            return;
        }
        let key = plain.to_lowercase();
        if self.added.contains(&key) {
            return;
        }
        let data = match self.file.archive().get_entry(plain) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("skipping CHM page {plain}: {e}");
                return;
            }
        };

        let bytes = data.as_bytes();
        let charset = codepage::extract_http_charset(bytes).unwrap_or(0);
        self.html.push_str(&format!(
            "<pagebreak page_path=\"{}\" page_marker />",
            html_escape(plain)
        ));
        let mut page = self.file.to_utf8(bytes, charset);
        close_open_markup(&mut page);
        self.html.push_str(&page);
        self.added.insert(key);
    }
}

impl TocVisitor for HtmlCollector<'_> {
    fn visit(&mut self, _name: &str, url: Option<&str>, _level: usize) {
        if let Some(url) = url {
            self.add_page(url);
        }
    }
}
