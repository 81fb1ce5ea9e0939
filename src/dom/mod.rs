//! Lenient HTML parsing into an arena DOM.

mod arena;
mod sink;

pub use arena::{ArenaDom, ArenaNodeData, ArenaNodeId, Attribute};
pub use sink::ArenaSink;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;

/// Parse an HTML string with html5ever's tree builder.
pub fn parse_html(html: &str) -> ArenaDom {
    let sink = ArenaSink::new();
    parse_document(sink, ParseOpts::default())
        .from_utf8()
        .one(html.as_bytes())
        .into_dom()
}
