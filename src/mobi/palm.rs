//! Plain-text PalmDoc and TealDoc books.

use std::sync::Arc;

use super::doc::load_text;
use super::headers::MobiHeader;
use super::pdb::{PdbKind, PdbReader};
use crate::codepage::{self, CP_WINDOWS_1252};
use crate::container::Format;
use crate::document::{Document, DocumentProperty, ResourceProvider, TocVisitor};
use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::util::{html_escape, normalize_whitespace};

/// Size of a bookmark record: a NUL-padded 16-byte name and a text offset.
const BOOKMARK_RECORD_LEN: u64 = 20;

#[derive(Debug, Clone, PartialEq)]
struct Bookmark {
    name: String,
    offset: usize,
}

fn bookmark_anchor(index: usize) -> String {
    format!("bookmark{index}")
}

/// Convert text to markup: lines become `<br>`-separated, blank lines
/// start a new paragraph, and bookmark anchors are inserted at their
/// offsets.
fn text_to_html(text: &str, bookmarks: &[Bookmark]) -> String {
    let mut html = String::with_capacity(text.len() + text.len() / 8);
    html.push_str("<p>");

    let mut marks = bookmarks.iter().enumerate().peekable();
    let mut line_start = true;
    let mut blank_run = 0;
    for (pos, ch) in text.char_indices() {
        while let Some((i, _)) = marks.next_if(|(_, m)| m.offset <= pos) {
            html.push_str(&format!("<a id=\"{}\"></a>", bookmark_anchor(i)));
        }
        match ch {
            '\r' => {}
            '\n' => {
                if line_start {
                    blank_run += 1;
                    if blank_run == 1 {
                        html.push_str("</p><p>");
                    }
                } else {
                    html.push_str("<br>");
                }
                line_start = true;
            }
            _ => {
                line_start = false;
                blank_run = 0;
                html.push_str(&html_escape(ch.encode_utf8(&mut [0; 4])));
            }
        }
    }
    for (i, _) in marks {
        html.push_str(&format!("<a id=\"{}\"></a>", bookmark_anchor(i)));
    }
    html.push_str("</p>");
    html
}

/// A PalmDoc (`TEXtREAd`) or TealDoc (`TEXtTlDc`) text book.
pub struct PalmDoc {
    title: String,
    html: String,
    bookmarks: Vec<Bookmark>,
}

impl PalmDoc {
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let pdb = PdbReader::open(source)?;
        if pdb.kind() == PdbKind::Mobipocket {
            return Err(Error::Unsupported("Mobipocket book opened as PalmDoc".into()));
        }
        let header = MobiHeader::parse(&pdb.record(0)?)?;
        let raw = load_text(&pdb, &header)?;
        let text = codepage::decode(&raw, CP_WINDOWS_1252);

        // bookmark records follow the text records
        let first_bookmark = header.text_record_count as usize + 1;
        let mut bookmarks: Vec<Bookmark> = (first_bookmark..pdb.record_count())
            .filter(|&i| pdb.record_size(i) == Some(BOOKMARK_RECORD_LEN))
            .filter_map(|i| pdb.record(i).ok())
            .filter_map(|record| {
                let name_end = memchr::memchr(0, &record[..16]).unwrap_or(16);
                let name =
                    normalize_whitespace(&codepage::decode(&record[..name_end], CP_WINDOWS_1252));
                let raw_offset =
                    u32::from_be_bytes([record[16], record[17], record[18], record[19]]) as usize;
                // offsets count raw bytes; map them into the decoded text
                let offset = raw
                    .get(..raw_offset.min(raw.len()))
                    .map(|prefix| codepage::decode(prefix, CP_WINDOWS_1252).len())?;
                (!name.is_empty()).then_some(Bookmark { name, offset })
            })
            .collect();
        bookmarks.sort_by_key(|b| b.offset);

        let html = text_to_html(&text, &bookmarks);
        log::debug!(
            "opened {:?} {:?}: {} bytes of text, {} bookmarks",
            pdb.kind(),
            pdb.name(),
            raw.len(),
            bookmarks.len()
        );
        Ok(Self {
            title: pdb.name().to_string(),
            html,
            bookmarks,
        })
    }
}

impl ResourceProvider for PalmDoc {
    fn image_data(&self, _src: &str, _page_path: Option<&str>) -> Option<Arc<[u8]>> {
        None
    }
}

impl Document for PalmDoc {
    fn format(&self) -> Format {
        Format::PalmDoc
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, prop: DocumentProperty) -> Option<String> {
        match prop {
            DocumentProperty::Title if !self.title.is_empty() => Some(self.title.clone()),
            _ => None,
        }
    }

    fn has_toc(&self) -> bool {
        !self.bookmarks.is_empty()
    }

    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        for (i, bookmark) in self.bookmarks.iter().enumerate() {
            visitor.visit(&bookmark.name, Some(&bookmark_anchor(i)), 1);
        }
    }
}
