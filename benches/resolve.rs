//! Benchmarks for pagination and destination lookup.
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use ebook_flow::{
    Document, DocumentProperty, EbookConfig, Engine, Format, ResourceProvider, TocVisitor,
};

const CHAPTERS: usize = 200;

/// A help-file-like document: one sub-document per chapter, each with a
/// few sections, linking to the next chapter.
struct Generated {
    html: String,
}

impl Generated {
    fn new() -> Self {
        let mut html = String::new();
        for ch in 0..CHAPTERS {
            html.push_str(&format!(
                "<pagebreak page_path=\"topics/ch{ch}.htm\" page_marker /><h1>Chapter {ch}</h1>"
            ));
            for sec in 0..5 {
                html.push_str(&format!(
                    "<h2 id=\"s{sec}\">Section {sec}</h2><p>Some words about section {sec} of \
                     chapter {ch}, long enough to wrap at least once on a paperback page. \
                     <a href=\"ch{next}.htm#s{sec}\">Next</a></p>",
                    next = (ch + 1) % CHAPTERS
                ));
            }
        }
        Self { html }
    }
}

impl ResourceProvider for Generated {
    fn image_data(&self, _src: &str, _page_path: Option<&str>) -> Option<Arc<[u8]>> {
        None
    }
}

impl Document for Generated {
    fn format(&self) -> Format {
        Format::Html
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, _prop: DocumentProperty) -> Option<String> {
        None
    }

    fn has_toc(&self) -> bool {
        true
    }

    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        for ch in 0..CHAPTERS {
            visitor.visit(&format!("Chapter {ch}"), Some(&format!("topics/ch{ch}.htm")), 1);
            for sec in 0..5 {
                visitor.visit(
                    &format!("Section {sec}"),
                    Some(&format!("topics/ch{ch}.htm#s{sec}")),
                    2,
                );
            }
        }
    }
}

fn engine() -> Engine {
    Engine::from_document(Box::new(Generated::new()), &EbookConfig::default(), None).unwrap()
}

fn bench_layout(c: &mut Criterion) {
    c.bench_function("layout_generated", |b| {
        b.iter(|| black_box(engine().page_count()));
    });
}

fn bench_named_dest(c: &mut Criterion) {
    let engine = engine();
    c.bench_function("named_dest_late_chapter", |b| {
        b.iter(|| engine.named_dest(black_box("topics/ch190.htm#s4")));
    });
    c.bench_function("named_dest_bare_id", |b| {
        b.iter(|| engine.named_dest(black_box("#s4")));
    });
}

fn bench_page_link(c: &mut Criterion) {
    let engine = engine();
    let page = engine.page_count() / 2;
    c.bench_function("page_link_relative", |b| {
        b.iter(|| engine.page_link(black_box("ch150.htm#s2"), page));
    });
}

fn bench_toc_tree(c: &mut Criterion) {
    let engine = engine();
    c.bench_function("toc_tree", |b| {
        b.iter(|| black_box(engine.toc_tree()));
    });
}

criterion_group!(
    benches,
    bench_layout,
    bench_named_dest,
    bench_page_link,
    bench_toc_tree
);
criterion_main!(benches);
