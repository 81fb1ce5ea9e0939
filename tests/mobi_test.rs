mod common;

use common::{build_mobi, build_pdb, write_file};
use ebook_flow::{DestKind, DocumentProperty, EbookConfig, Engine, Format};

/// A book with a guide-referenced TOC page and two chapters. Placeholders
/// are as wide as the 10-digit offsets that replace them, so positions
/// found in the template stay valid.
fn sample_text() -> String {
    let template = concat!(
        "<html><head><guide><reference type=\"toc\" title=\"Contents\" filepos=TOC_OFFSET /></guide></head><body>",
        "<div id=\"contents\"><p><a filepos=CH1_OFFSET>Chapter One</a></p>",
        "<blockquote><a filepos=CH2_OFFSET>Part Two</a></blockquote></div>",
        "<mbp:pagebreak /><h1>Chapter One</h1><p>Hello from the first chapter.</p>",
        "<mbp:pagebreak /><h2>Part Two</h2><p>And the second.</p></body></html>",
    );
    let toc = template.find("<div id=\"contents\">").unwrap();
    let ch1 = template.find("<h1>").unwrap();
    let ch2 = template.find("<h2>").unwrap();
    template
        .replace("TOC_OFFSET", &format!("{toc:010}"))
        .replace("CH1_OFFSET", &format!("{ch1:010}"))
        .replace("CH2_OFFSET", &format!("{ch2:010}"))
}

fn load_sample() -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let data = build_mobi("Sample Mobi", "Ann Author", sample_text().as_bytes());
    let path = write_file(dir.path(), "sample.mobi", &data);
    let engine = Engine::load(&path, &EbookConfig::default()).unwrap();
    (dir, engine)
}

#[test]
fn test_properties() {
    let (_dir, engine) = load_sample();
    assert_eq!(engine.format(), Format::Mobi);
    assert_eq!(engine.property(DocumentProperty::Title).as_deref(), Some("Sample Mobi"));
    assert_eq!(engine.property(DocumentProperty::Author).as_deref(), Some("Ann Author"));
    assert!(engine.property(DocumentProperty::Copyright).is_none());
}

#[test]
fn test_page_breaks_split_pages() {
    let (_dir, engine) = load_sample();
    assert_eq!(engine.page_count(), 3);
    let text = engine.extract_page_text(2, "\n").unwrap();
    assert!(text.text.contains("Hello from the first chapter."));
    assert!(!text.text.contains("And the second."));
}

#[test]
fn test_guide_toc() {
    let (_dir, engine) = load_sample();
    assert!(engine.has_toc());
    let tree = engine.toc_tree().unwrap();
    assert_eq!(tree.roots.len(), 1);
    let chapter = &tree.roots[0];
    assert_eq!(chapter.title, "Chapter One");
    assert_eq!(chapter.page, 2);
    assert_eq!(chapter.children[0].title, "Part Two");
    assert_eq!(chapter.children[0].page, 3);
    // a single top-level entry starts expanded
    assert!(chapter.open);
}

#[test]
fn test_filepos_links() {
    let (_dir, engine) = load_sample();
    let text = sample_text();
    let ch2 = text.find("<h2>").unwrap();

    let dest = engine.named_dest(&format!("filepos{ch2}")).unwrap();
    assert_eq!(dest.kind, DestKind::ScrollTo);
    assert_eq!(dest.page, 3);

    // positions between targets fall back to the preceding one
    assert_eq!(engine.named_dest(&(ch2 + 3).to_string()).map(|d| d.page), Some(3));

    let links: Vec<_> = engine.elements(1).into_iter().filter_map(|e| e.dest().cloned()).collect();
    assert_eq!(links.iter().map(|d| d.page).collect::<Vec<_>>(), [2, 3]);
}

#[test]
fn test_palmdoc_text() {
    let text = b"Plain PalmDoc text.\nSecond line.";
    let mut record0 = vec![0u8; 16];
    record0[0..2].copy_from_slice(&1u16.to_be_bytes());
    record0[4..8].copy_from_slice(&(text.len() as u32).to_be_bytes());
    record0[8..10].copy_from_slice(&1u16.to_be_bytes());
    record0[10..12].copy_from_slice(&4096u16.to_be_bytes());
    let mut bookmark = b"Second\0\0\0\0\0\0\0\0\0\0".to_vec();
    bookmark.extend_from_slice(&20u32.to_be_bytes());
    let data = build_pdb("Palm Book", b"TEXtREAd", &[record0, text.to_vec(), bookmark]);

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "palm.pdb", &data);
    let engine = Engine::load(&path, &EbookConfig::default()).unwrap();
    assert_eq!(engine.format(), Format::PalmDoc);
    assert_eq!(engine.property(DocumentProperty::Title).as_deref(), Some("Palm Book"));
    let page = engine.extract_page_text(1, "\n").unwrap();
    assert!(page.text.contains("Plain PalmDoc text."));
    assert!(page.text.contains("Second line."));

    let tree = engine.toc_tree().unwrap();
    assert_eq!(tree.roots[0].title, "Second");
    assert_eq!(tree.roots[0].page, 1);
}
