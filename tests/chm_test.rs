//! End-to-end tests over a generated help file.

mod common;

use common::{build_chm, chm_system, sample_chm, sitemap_item, write_file};
use ebook_flow::{
    DestKind, DocumentProperty, EbookConfig, ElementKind, Engine, Error, Format, PageLayout,
};

fn load_sample() -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "sample.chm", &sample_chm());
    let engine = Engine::load(&path, &EbookConfig::default()).unwrap();
    (dir, engine)
}

fn load_chm(data: &[u8]) -> Result<(tempfile::TempDir, Engine), Error> {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "help.chm", data);
    let engine = Engine::load(&path, &EbookConfig::default())?;
    Ok((dir, engine))
}

fn page_of(engine: &Engine, needle: &str) -> Option<usize> {
    (1..=engine.page_count()).find(|&page| {
        engine
            .extract_page_text(page, " ")
            .is_some_and(|t| t.text.contains(needle))
    })
}

#[test]
fn test_detect_and_load() {
    let (dir, engine) = load_sample();
    assert_eq!(engine.format(), Format::Chm);
    assert_eq!(engine.file_name(), Some(dir.path().join("sample.chm").as_path()));
    assert_eq!(engine.preferred_layout(), PageLayout::Single);
    assert_eq!(engine.default_file_ext(), ".chm");
}

#[test]
fn test_properties() {
    let (_dir, engine) = load_sample();
    assert_eq!(engine.property(DocumentProperty::Title).as_deref(), Some("Sample Help"));
    assert_eq!(
        engine.property(DocumentProperty::CreatorApp).as_deref(),
        Some("HHA Version 4.74.8702")
    );
    assert!(engine.property(DocumentProperty::Publisher).is_none());
    assert!(engine.property(DocumentProperty::FontList).is_some());
}

#[test]
fn test_pages_in_home_then_toc_order() {
    let (_dir, engine) = load_sample();
    // home, TOC-only page, then the page nothing references
    assert_eq!(engine.page_count(), 3);
    assert_eq!(engine.base_anchor(1).as_deref(), Some("intro.htm"));
    assert_eq!(engine.base_anchor(2).as_deref(), Some("usage.htm"));
    assert_eq!(engine.base_anchor(3).as_deref(), Some("extra.html"));
    assert!(engine.base_anchor(4).is_none());

    let text = engine.extract_page_text(3, "\n").unwrap();
    assert!(text.text.contains("Extra page"));
}

#[test]
fn test_named_destinations() {
    let (_dir, engine) = load_sample();

    let setup = engine.named_dest("intro.htm#setup").unwrap();
    assert_eq!(setup.kind, DestKind::ScrollTo);
    assert_eq!(setup.page, 1);
    assert!(setup.rect.is_some_and(|r| r.y > 0.0));

    let usage = engine.named_dest("usage.htm").unwrap();
    assert_eq!(usage.page, 2);
    assert_eq!(engine.named_dest("/usage.htm").map(|d| d.page), Some(2));
    assert_eq!(engine.named_dest("USAGE.HTM").map(|d| d.page), Some(2));

    assert!(engine.named_dest("missing.htm").is_none());
    // an unknown id still lands on its sub-document
    assert_eq!(engine.named_dest("usage.htm#nowhere").map(|d| d.page), Some(2));
}

#[test]
fn test_page_links() {
    let (_dir, engine) = load_sample();

    let usage = engine.page_link("usage.htm", 1).unwrap();
    assert_eq!(usage.kind, DestKind::ScrollTo);
    assert_eq!(usage.page, 2);

    let manual = engine.page_link("manual.pdf", 1).unwrap();
    assert_eq!(manual.kind, DestKind::LaunchEmbedded);
    assert_eq!(manual.value.as_deref(), Some("manual.pdf"));
    assert_eq!(
        engine.embedded_data("manual.pdf").as_deref(),
        Some(b"%PDF-1.4 fake".as_slice())
    );

    let web = engine.page_link("https://example.com/", 1).unwrap();
    assert_eq!(web.kind, DestKind::LaunchUrl);
    assert!(engine.page_link("", 1).is_none());
    assert!(engine.page_link("nothing.htm", 1).is_none());
}

#[test]
fn test_link_elements() {
    let (_dir, engine) = load_sample();
    let links: Vec<_> = engine
        .elements(1)
        .into_iter()
        .filter(|e| matches!(e.kind, ElementKind::Link(_)))
        .collect();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].dest().map(|d| d.page), Some(2));
    assert_eq!(links[1].dest().map(|d| d.kind), Some(DestKind::LaunchEmbedded));

    let center = links[0].rect;
    let pt = ebook_flow::PointF::new(center.x + center.dx / 2.0, center.y + center.dy / 2.0);
    assert_eq!(engine.element_at(1, pt), Some(links[0].clone()));
    assert!(engine.elements(99).is_empty());
}

#[test]
fn test_toc_and_index() {
    let (_dir, engine) = load_sample();
    assert!(engine.has_toc());
    let tree = engine.toc_tree().unwrap();
    let titles: Vec<_> = tree.roots.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, ["Introduction", "Usage", "Index"]);

    let intro = &tree.roots[0];
    assert_eq!(intro.page, 1);
    assert_eq!(intro.children.len(), 1);
    assert_eq!(intro.children[0].title, "Setup");
    assert_eq!(intro.children[0].page, 1);
    assert_eq!(tree.roots[1].page, 2);

    // index entries keep their destination but not a page number
    let index = &tree.roots[2];
    assert!(index.dest.is_none());
    let keyword = &index.children[0];
    assert_eq!(keyword.title, "install");
    assert!(keyword.dest.is_none());
    let targets: Vec<_> = keyword.children.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(targets, ["Intro", "Usage"]);
    assert_eq!(keyword.children[1].page, 0);
    assert_eq!(keyword.children[1].dest.as_ref().map(|d| d.page), Some(2));

    let ids: Vec<_> = tree.iter().map(|n| n.id).collect();
    assert_eq!(ids, (1..=ids.len()).collect::<Vec<_>>());
}

#[test]
fn test_anchors_cover_every_page() {
    let (_dir, engine) = load_sample();
    let anchors = engine.anchors();
    assert!(anchors.iter().any(|(name, page)| name == "setup" && *page == 1));
    for page in 1..=engine.page_count() {
        assert!(engine.base_anchor(page).is_some(), "page {page} has no base anchor");
    }
}

#[test]
fn test_custom_page_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "sample.chm", &sample_chm());
    let config = EbookConfig::default().with_page(ebook_flow::PageGeometry::paperback());
    let engine = Engine::load(&path, &config).unwrap();
    assert_eq!(engine.page_geometry(), ebook_flow::PageGeometry::paperback());
    let media = engine.page_mediabox(1);
    let content = engine.page_content_box(1);
    assert!(content.dx < media.dx && content.dy < media.dy);
}

#[test]
fn test_missing_home_falls_back_to_index_page() {
    let system = chm_system(&[(2, b"missing.htm\0"), (4, &1033u32.to_le_bytes())]);
    let data = build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            ("/index.html", b"<html><body><p>Start here.</p></body></html>"),
        ],
    );
    let (_dir, engine) = load_chm(&data).unwrap();
    assert_eq!(engine.page_count(), 1);
    assert_eq!(engine.base_anchor(1).as_deref(), Some("index.html"));
}

#[test]
fn test_no_home_candidate_is_an_error() {
    let system = chm_system(&[(3, b"No Home\0"), (4, &1033u32.to_le_bytes())]);
    let data = build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            ("/page.htm", b"<html><body><p>Orphan.</p></body></html>"),
        ],
    );
    assert!(matches!(load_chm(&data), Err(Error::NotFound(_))));
}

#[test]
fn test_paths_adopt_the_file_header_codepage() {
    // #SYSTEM claims English, but names and text are Cyrillic (cp1251)
    let system = chm_system(&[
        (2, b"\xCF.htm\0"),
        (3, b"\xCA\xED\xE8\xE3\xE0\0"),
        (4, &1033u32.to_le_bytes()),
    ]);
    let data = build_chm(
        1049,
        &[
            ("/#SYSTEM", &system),
            ("/\u{41f}.htm", b"<html><body><p>\xCF\xF0\xE8</p></body></html>"),
        ],
    );
    let (_dir, engine) = load_chm(&data).unwrap();
    assert_eq!(engine.base_anchor(1).as_deref(), Some("\u{41f}.htm"));
    assert_eq!(
        engine.property(DocumentProperty::Title).as_deref(),
        Some("\u{41a}\u{43d}\u{438}\u{433}\u{430}")
    );
    assert_eq!(page_of(&engine, "\u{41f}\u{440}\u{438}"), Some(1));
}

#[test]
fn test_page_charset_overrides_document_codepage() {
    let system = chm_system(&[(2, b"ru.htm\0"), (4, &1033u32.to_le_bytes())]);
    let data = build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            (
                "/ru.htm",
                b"<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1251\"></head>\
                  <body><p>\xCF\xF0\xE8</p></body></html>",
            ),
            ("/fr.htm", b"<html><body><p>caf\xE9</p></body></html>"),
        ],
    );
    let (_dir, engine) = load_chm(&data).unwrap();
    assert_eq!(engine.page_count(), 2);
    assert_eq!(page_of(&engine, "\u{41f}\u{440}\u{438}"), Some(1));
    assert!(page_of(&engine, "caf\u{e9}").is_some());
}

#[test]
fn test_subdirectory_destinations() {
    let system = chm_system(&[(2, b"page1.html\0"), (4, &1033u32.to_le_bytes())]);
    let data = build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            (
                "/page1.html",
                b"<html><body><p><a href=\"sub/page2.html#sec1\">Next</a></p></body></html>",
            ),
            (
                "/sub/page2.html",
                b"<html><body><p>Intro.</p><h2 id=\"sec1\">Section</h2><p><a href=\"../page1.html\">Back</a></p></body></html>",
            ),
        ],
    );
    let (_dir, engine) = load_chm(&data).unwrap();
    assert_eq!(engine.base_anchor(2).as_deref(), Some("sub/page2.html"));

    let sec = engine.named_dest("sub/page2.html#sec1").unwrap();
    assert_eq!(sec.page, 2);
    assert_eq!(engine.named_dest("sub/page2.html#doesnotexist").map(|d| d.page), Some(2));
    assert_eq!(engine.page_link("sub/page2.html#sec1", 1).map(|d| d.page), Some(2));
    assert_eq!(engine.page_link("../page1.html", 2).map(|d| d.page), Some(1));
}

#[test]
fn test_broken_page_keeps_later_pages() {
    let system = chm_system(&[(2, b"a.htm\0"), (4, &1033u32.to_le_bytes())]);
    let data = build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            ("/a.htm", b"<html><head><title>Oops</head><body><p>First.</p>"),
            ("/b.htm", b"<html><body><p id=\"s\">Second.</p></body></html>"),
            ("/c.htm", b"<html><body><p>Third.</p><!-- unterminated"),
            ("/d.htm", b"<html><body><p>Fourth.</p></body></html>"),
        ],
    );
    let (_dir, engine) = load_chm(&data).unwrap();
    assert_eq!(engine.page_count(), 4);
    assert_eq!(engine.named_dest("b.htm#s").map(|d| d.page), page_of(&engine, "Second."));
    assert!(page_of(&engine, "Fourth.").is_some());
    for page in 1..=engine.page_count() {
        assert!(engine.base_anchor(page).is_some());
    }
}

#[test]
fn test_toc_paths_with_dot_segments() {
    let system = chm_system(&[
        (0, b"toc.hhc\0"),
        (2, b"a.htm\0"),
        (4, &1033u32.to_le_bytes()),
    ]);
    let toc = format!(
        "<HTML><BODY><UL>\n{}{}</UL></BODY></HTML>",
        sitemap_item("Third", "sub/../c.htm"),
        sitemap_item("Second", "b.htm"),
    );
    let data = build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            ("/a.htm", b"<html><body><p>Home.</p></body></html>"),
            ("/b.htm", b"<html><body><p>Bee.</p></body></html>"),
            ("/c.htm", b"<html><body><p>Sea.</p></body></html>"),
            ("/toc.hhc", toc.as_bytes()),
        ],
    );
    let (_dir, engine) = load_chm(&data).unwrap();
    assert_eq!(engine.page_count(), 3);
    let anchors: Vec<_> = (1..=3).filter_map(|p| engine.base_anchor(p)).collect();
    assert_eq!(anchors, ["a.htm", "c.htm", "b.htm"]);
}
