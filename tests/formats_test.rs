//! FictionBook, HTML and text files through the engine, plus the
//! format-independent engine surface.

mod common;

use common::write_file;
use ebook_flow::{
    AbortCookie, Annotation, AnnotationKind, DestKind, DocumentProperty, EbookConfig, Engine,
    Error, Format, PageGeometry, PageLayout, RectF,
};

const FB2_BOOK: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description>
    <title-info>
      <author><first-name>Anna</first-name><last-name>Writer</last-name></author>
      <book-title>Short Stories</book-title>
      <date value="2001-02-03">2001</date>
    </title-info>
  </description>
  <body>
    <section>
      <title><p>First Story</p></title>
      <p>Once upon a time<a l:href="#n1">1</a>.</p>
      <section>
        <title><p>Part</p><p>Two</p></title>
        <p>The end.</p>
      </section>
    </section>
  </body>
  <body name="notes">
    <section id="n1"><p>A footnote.</p></section>
  </body>
</FictionBook>"##;

fn load(name: &str, data: &[u8]) -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), name, data);
    let engine = Engine::load(&path, &EbookConfig::default()).unwrap();
    (dir, engine)
}

fn page_of(engine: &Engine, needle: &str) -> Option<usize> {
    (1..=engine.page_count()).find(|&page| {
        engine
            .extract_page_text(page, " ")
            .is_some_and(|t| t.text.contains(needle))
    })
}

#[test]
fn test_fb2_book() {
    let (_dir, engine) = load("stories.fb2", FB2_BOOK.as_bytes());
    assert_eq!(engine.format(), Format::Fb2);
    assert_eq!(engine.property(DocumentProperty::Title).as_deref(), Some("Short Stories"));
    assert_eq!(engine.property(DocumentProperty::Author).as_deref(), Some("Anna Writer"));
    assert_eq!(
        engine.property(DocumentProperty::CreationDate).as_deref(),
        Some("2001-02-03")
    );
    assert_eq!(engine.default_file_ext(), ".fb2");

    let story = page_of(&engine, "Once upon a time").unwrap();
    let note = page_of(&engine, "A footnote.").unwrap();
    assert!(note > story, "notes start on their own page");

    let dest = engine.page_link("#n1", story).unwrap();
    assert_eq!(dest.kind, DestKind::ScrollTo);
    assert_eq!(dest.page, note);
}

#[test]
fn test_fb2_toc() {
    let (_dir, engine) = load("stories.fb2", FB2_BOOK.as_bytes());
    let tree = engine.toc_tree().unwrap();
    assert_eq!(tree.roots.len(), 1);
    assert_eq!(tree.roots[0].title, "First Story");
    assert_eq!(tree.roots[0].children[0].title, "Part Two");
    let story = page_of(&engine, "Once upon a time").unwrap();
    assert_eq!(tree.roots[0].page, story);
}

#[test]
fn test_zipped_fb2() {
    let zip = common::build_zip(&[("stories.fb2", FB2_BOOK.as_bytes().to_vec())]);
    let (_dir, engine) = load("stories.fb2.zip", &zip);
    assert_eq!(engine.format(), Format::Fb2);
    assert_eq!(engine.property(DocumentProperty::Title).as_deref(), Some("Short Stories"));
    assert_eq!(engine.default_file_ext(), ".fb2z");
}

#[test]
fn test_html_file() {
    let page = b"<!DOCTYPE html><html><head><title>Notes</title></head><body>\
        <h1 id=\"top\">Notes</h1><p>See <a href=\"other.html#part\">the other file</a> \
        or <a href=\"#top\">the top</a>.</p></body></html>";
    let (_dir, engine) = load("notes.html", page);
    assert_eq!(engine.format(), Format::Html);
    assert_eq!(engine.property(DocumentProperty::Title).as_deref(), Some("Notes"));
    assert_eq!(engine.page_geometry(), PageGeometry::a4());

    let other = engine.page_link("other.html#part", 1).unwrap();
    assert_eq!(other.kind, DestKind::LaunchFile);
    assert_eq!(other.value.as_deref(), Some("other.html"));
    assert_eq!(other.name.as_deref(), Some("part"));

    let top = engine.page_link("#top", 1).unwrap();
    assert_eq!(top.kind, DestKind::ScrollTo);
    assert_eq!(top.page, 1);
    assert!(!engine.has_toc());
    assert!(engine.toc_tree().is_none());
}

#[test]
fn test_rfc_text() {
    let text = "Network Working Group\n\nAbstract\n\n   Some words.\n\n1.  Introduction\n\n   Body.\n\x0c\n2.  Terms\n\n2.1.  Words\n";
    let (_dir, engine) = load("rfc9999.txt", text.as_bytes());
    assert_eq!(engine.format(), Format::Txt);
    assert_eq!(engine.page_geometry(), PageGeometry::letter());
    assert_eq!(engine.preferred_layout(), PageLayout::Single);
    assert_eq!(engine.page_count(), 2);

    let tree = engine.toc_tree().unwrap();
    let titles: Vec<_> = tree.roots.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, ["1. Introduction", "2. Terms"]);
    assert_eq!(tree.roots[1].children[0].title, "2.1. Words");
    assert_eq!(tree.roots[0].page, 1);
    assert_eq!(tree.roots[1].page, 2);
}

#[test]
fn test_plain_text_keeps_layout() {
    let (_dir, engine) = load("notes.txt", b"col1    col2\nnext <line>\n");
    assert!(!engine.has_toc());
    assert_eq!(engine.page_geometry(), PageGeometry::a4());
    let text = engine.extract_page_text(1, "\n").unwrap();
    assert!(text.text.contains("next <line>"));
    assert_eq!(text.text.chars().count(), text.coords.len());
}

#[test]
fn test_font_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "page.html", b"<html><body><p>Some text.</p></body></html>");
    let config = EbookConfig::with_font("Georgia", 14.0);
    let engine = Engine::load(&path, &config).unwrap();
    let fonts = engine.property(DocumentProperty::FontList).unwrap();
    assert!(fonts.lines().any(|f| f == "Georgia"), "{fonts}");
}

#[test]
fn test_user_annotations() {
    let (_dir, engine) = load("notes.txt", b"Some text.\n");
    assert!(engine.user_annotations().is_empty());

    let highlight = Annotation {
        kind: AnnotationKind::Highlight,
        page: 1,
        rect: RectF::new(10.0, 10.0, 50.0, 12.0),
        color: 0xFFFF00,
    };
    engine.update_user_annotations(Some(&[highlight.clone()]));
    assert_eq!(engine.user_annotations(), vec![highlight]);

    engine.update_user_annotations(None);
    assert!(engine.user_annotations().is_empty());
}

#[test]
fn test_abort_before_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.txt", b"Some text.\n");
    let cookie = AbortCookie::new();
    cookie.abort();
    let result = Engine::load_with_abort(&path, &EbookConfig::default(), Some(cookie));
    assert!(matches!(result, Err(Error::Aborted)));
}

#[test]
fn test_unknown_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "image.png", b"\x89PNG\r\n\x1a\n");
    assert!(matches!(
        Engine::load(&path, &EbookConfig::default()),
        Err(Error::Unsupported(_))
    ));
    assert!(Engine::load(dir.path().join("missing.chm"), &EbookConfig::default()).is_err());
}

#[test]
fn test_out_of_range_pages() {
    let (_dir, engine) = load("notes.txt", b"Some text.\n");
    assert_eq!(engine.page_count(), 1);
    assert!(engine.extract_page_text(0, "\n").is_none());
    assert!(engine.extract_page_text(2, "\n").is_none());
    assert!(engine.page_instructions(2).is_none());
    assert!(engine.base_anchor(0).is_none());
}
