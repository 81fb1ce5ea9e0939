//! # ebook-flow
//!
//! Reflowable ebook and compiled help reader: opens CHM, Mobipocket,
//! PalmDoc, EPUB, FictionBook2, HTML and plain text files, flattens each
//! into one markup stream and lays it out into fixed-size pages.
//!
//! ## Features
//!
//! - CHM archives (ITSF directory, LZX sections, sitemap TOC and index)
//! - Mobipocket/PalmDoc records with PalmDoc LZ77 and HUFF/CDIC text
//! - EPUB 2/3 from zip files or unpacked directories
//! - Anchors, named destinations and a table-of-contents tree per document
//! - Per-character text extraction with line separators
//!
//! ## Quick Start
//!
//! ```no_run
//! use ebook_flow::{DocumentProperty, EbookConfig, Engine};
//!
//! let engine = Engine::load("manual.chm", &EbookConfig::default()).unwrap();
//! println!("{} pages", engine.page_count());
//! println!("{:?}", engine.property(DocumentProperty::Title));
//!
//! if let Some(dest) = engine.named_dest("intro.htm#setup") {
//!     println!("setup is on page {}", dest.page);
//! }
//! ```
//!
//! ## Table of Contents
//!
//! ```no_run
//! use ebook_flow::{EbookConfig, Engine, TocNode};
//!
//! fn print(node: &TocNode, depth: usize) {
//!     println!("{}{} -> page {}", "  ".repeat(depth), node.title, node.page);
//!     for child in &node.children {
//!         print(child, depth + 1);
//!     }
//! }
//!
//! let engine = Engine::load("book.epub", &EbookConfig::default()).unwrap();
//! if let Some(tree) = engine.toc_tree() {
//!     for node in &tree.roots {
//!         print(node, 0);
//!     }
//! }
//! ```

pub mod archive;
pub mod chm;
pub mod codepage;
pub mod config;
pub mod container;
pub mod document;
pub mod dom;
pub mod engine;
pub mod epub;
pub mod error;
pub mod fb2;
pub mod html;
pub mod io;
pub mod layout;
pub mod mobi;
pub mod txt;
pub(crate) mod util;

pub use config::{EbookConfig, PageGeometry};
pub use container::{Container, Format, MAX_ENTRY_SIZE};
pub use document::{Document, DocumentProperty, PageLayout, ResourceProvider, TocVisitor};
pub use engine::{
    Annotation, AnnotationKind, DestKind, Destination, ElementKind, Engine, PageElement, PageText,
    TocNode, TocTree, open_document,
};
pub use error::{Error, Result};
pub use layout::{AbortCookie, DrawInstr, InstrKind, Page, PointF, RectF};
