//! Reference formatter: greedy line filling with approximate font metrics.
//!
//! Good enough to paginate, place anchors and links, and extract text; it
//! makes no attempt at real shaping or CSS box layout.

use std::borrow::Cow;

use super::style::{ElementStyle, FontSize, StyleRules};
use super::{DrawInstr, FontSpec, Formatter, FormatterArgs, InstrKind, Page, RectF};
use crate::config::UNITS_PER_INCH;
use crate::dom::{self, ArenaDom, ArenaNodeId};
use crate::error::{Error, Result};
use crate::util::{image_dimensions, percent_decode};

const MONOSPACE_FONT: &str = "Courier New";
const LINE_SPACING: f32 = 1.2;
const HEADING_SCALES: [f32; 6] = [2.0, 1.5, 1.17, 1.0, 0.83, 0.67];
/// Layout size of an image whose dimensions are unknown.
const DEFAULT_IMAGE_SIZE: f32 = 96.0;

/// Font state inherited down the element tree.
#[derive(Debug, Clone, PartialEq)]
struct FontState {
    name: String,
    /// Size in points.
    size: f32,
    bold: bool,
    italic: bool,
    mono: bool,
    rtl: bool,
}

impl FontState {
    fn spec(&self) -> FontSpec {
        FontSpec {
            name: if self.mono {
                MONOSPACE_FONT.to_string()
            } else {
                self.name.clone()
            },
            size: self.size,
            bold: self.bold,
            italic: self.italic,
        }
    }

    fn size_units(&self) -> f32 {
        self.size * UNITS_PER_INCH / 72.0
    }

    fn line_height(&self) -> f32 {
        self.size_units() * LINE_SPACING
    }

    fn char_width(&self, c: char) -> f32 {
        let em = self.size_units();
        if is_wide(c) {
            return em;
        }
        if self.mono {
            return em * 0.6;
        }
        let factor = match c {
            'i' | 'l' | 'j' | 't' | 'f' | 'r' | 'I' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' => {
                0.3
            }
            'm' | 'w' | 'M' | 'W' => 0.8,
            ' ' => 0.28,
            c if c.is_uppercase() => 0.65,
            _ => 0.5,
        };
        let width = em * factor;
        if self.bold { width * 1.08 } else { width }
    }

    fn measure(&self, text: &str) -> f32 {
        text.chars().map(|c| self.char_width(c)).sum()
    }

    fn apply(&mut self, style: &ElementStyle) {
        if let Some(family) = &style.font_family {
            self.name.clone_from(family);
            self.mono = family.eq_ignore_ascii_case("monospace");
        }
        match style.font_size {
            Some(FontSize::Scale(s)) => self.size *= s,
            Some(FontSize::Points(p)) => self.size = p,
            None => {}
        }
        if let Some(bold) = style.bold {
            self.bold = bold;
        }
        if let Some(italic) = style.italic {
            self.italic = italic;
        }
        if let Some(rtl) = style.rtl {
            self.rtl = rtl;
        }
    }
}

fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60)
}

fn is_strong_rtl(c: char) -> bool {
    matches!(c as u32,
        0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF)
}

/// Tags whose content is never laid out.
fn is_skipped(tag: &str) -> bool {
    matches!(
        tag,
        "title" | "script" | "noscript" | "template" | "object" | "select" | "button"
    )
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "li"
            | "ul"
            | "ol"
            | "dl"
            | "dt"
            | "dd"
            | "blockquote"
            | "pre"
            | "table"
            | "tr"
            | "center"
            | "address"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "nav"
            | "aside"
            | "figure"
            | "figcaption"
            | "body"
    )
}

fn is_indented(tag: &str) -> bool {
    matches!(tag, "ul" | "ol" | "dd" | "blockquote")
}

fn heading_level(tag: &str) -> Option<usize> {
    let rest = tag.strip_prefix('h')?;
    let level: usize = rest.parse().ok()?;
    (1..=6).contains(&level).then_some(level)
}

/// Defaults a browser's user-agent stylesheet would apply.
fn tag_style(tag: &str) -> ElementStyle {
    let mut style = ElementStyle::default();
    match tag {
        "b" | "strong" | "th" | "dt" => style.bold = Some(true),
        "i" | "em" | "cite" | "var" | "dfn" | "address" => style.italic = Some(true),
        "small" => style.font_size = Some(FontSize::Scale(0.83)),
        "big" => style.font_size = Some(FontSize::Scale(1.2)),
        "sup" | "sub" => style.font_size = Some(FontSize::Scale(0.75)),
        "tt" | "code" | "pre" | "kbd" | "samp" => {
            style.font_family = Some("monospace".to_string());
        }
        _ => {
            if let Some(level) = heading_level(tag) {
                style.bold = Some(true);
                style.font_size = Some(FontSize::Scale(HEADING_SCALES[level - 1]));
            }
        }
    }
    style
}

/// `<font face= size=>` from legacy markup.
fn font_tag_style(dom: &ArenaDom, id: ArenaNodeId) -> ElementStyle {
    let mut style = ElementStyle::default();
    if let Some(face) = dom.get_attr(id, "face") {
        let first = face.split(',').next().unwrap_or(face).trim();
        if !first.is_empty() {
            style.font_family = Some(first.to_string());
        }
    }
    if let Some(size) = dom.get_attr(id, "size")
        && let Ok(n) = size.trim().trim_start_matches('+').parse::<i32>()
    {
        let absolute = if size.trim().starts_with(['+', '-']) { 3 + n } else { n };
        let scale = match absolute.clamp(1, 7) {
            1 => 0.63,
            2 => 0.82,
            3 => 1.0,
            4 => 1.13,
            5 => 1.5,
            6 => 2.0,
            _ => 3.0,
        };
        style.font_size = Some(FontSize::Scale(scale));
    }
    style
}

/// Markers like `<pagebreak ... />` are not void elements, so html5ever
/// would nest the rest of the document inside them. Close them explicitly.
fn close_marker_tags(html: &str) -> Cow<'_, str> {
    const MARKERS: [&str; 2] = ["<pagebreak", "<mbp:pagebreak"];
    if !MARKERS.iter().any(|m| html.contains(m)) {
        return Cow::Borrowed(html);
    }

    let mut out = String::with_capacity(html.len() + 64);
    let mut rest = html;
    while let Some((start, marker)) = MARKERS
        .iter()
        .filter_map(|m| rest.find(m).map(|i| (i, *m)))
        .min_by_key(|(i, _)| *i)
    {
        let after = &rest[start + marker.len()..];
        let Some(end) = after.find('>') else {
            break;
        };
        let tag = &after[..end];
        out.push_str(&rest[..start]);
        out.push_str(marker);
        match tag.strip_suffix('/') {
            Some(attrs) => {
                out.push_str(attrs);
                out.push_str("></");
                out.push_str(&marker[1..]);
                out.push('>');
            }
            None => {
                out.push_str(tag);
                out.push('>');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Walk position: entering a node, or leaving an element after its children.
enum Step {
    Enter(ArenaNodeId),
    Leave(Frame),
}

/// What to undo when leaving an element.
#[derive(Default)]
struct Frame {
    font_pushed: bool,
    block: bool,
    indent: f32,
    link: bool,
    gap_after: bool,
    break_after: bool,
    pre: bool,
}

/// Lays markup out into pages of fixed size.
pub struct FlowFormatter<'a> {
    args: FormatterArgs<'a>,
    rules: StyleRules,
    fonts: Vec<FontState>,
    pages: Vec<Page>,
    current: Page,
    x: f32,
    y: f32,
    line_height: f32,
    indent: f32,
    pending_space: bool,
    pre_depth: usize,
    emitted_font: Option<FontSpec>,
    open_link: Option<String>,
    page_path: Option<String>,
}

impl<'a> FlowFormatter<'a> {
    pub fn new(args: FormatterArgs<'a>) -> Self {
        let base = FontState {
            name: args.font_name.to_string(),
            size: args.font_size,
            bold: false,
            italic: false,
            mono: false,
            rtl: false,
        };
        Self {
            args,
            rules: StyleRules::default(),
            fonts: vec![base],
            pages: Vec::new(),
            current: Page::default(),
            x: 0.0,
            y: 0.0,
            line_height: 0.0,
            indent: 0.0,
            pending_space: false,
            pre_depth: 0,
            emitted_font: None,
            open_link: None,
            page_path: None,
        }
    }

    fn font(&self) -> &FontState {
        // the base font is never popped
        &self.fonts[self.fonts.len() - 1]
    }

    fn width(&self) -> f32 {
        self.args.page_width
    }

    fn ensure_font(&mut self) {
        let spec = self.font().spec();
        if self.emitted_font.as_ref() != Some(&spec) {
            self.current
                .instructions
                .push(DrawInstr::new(InstrKind::SetFont(spec.clone()), RectF::default()));
            self.emitted_font = Some(spec);
        }
    }

    fn push(&mut self, kind: InstrKind, bbox: RectF) {
        self.current.instructions.push(DrawInstr::new(kind, bbox));
    }

    fn line_is_empty(&self) -> bool {
        self.x <= self.indent
    }

    /// Whether the page holds anything beyond its leading font setup.
    fn page_has_content(&self) -> bool {
        self.current
            .instructions
            .iter()
            .any(|i| !matches!(i.kind, InstrKind::SetFont(_)))
    }

    fn new_line(&mut self) {
        let advance = if self.line_height > 0.0 {
            self.line_height
        } else {
            self.font().line_height()
        };
        self.y += advance;
        self.x = self.indent;
        self.line_height = 0.0;
        self.pending_space = false;
        if self.y + self.font().line_height() > self.args.page_height {
            self.new_page();
        }
    }

    fn block_break(&mut self) {
        if !self.line_is_empty() {
            self.new_line();
        }
        self.pending_space = false;
    }

    fn paragraph_gap(&mut self) {
        if self.y > 0.0 {
            self.y += self.font().line_height() * 0.5;
            if self.y + self.font().line_height() > self.args.page_height {
                self.new_page();
            }
        }
    }

    fn new_page(&mut self) {
        let mut page = std::mem::take(&mut self.current);
        update_link_bboxes(&mut page);
        self.pages.push(page);

        self.x = self.indent;
        self.y = 0.0;
        self.line_height = 0.0;
        self.pending_space = false;
        // every page starts self-contained
        self.emitted_font = None;
        self.ensure_font();
        if let Some(url) = self.open_link.clone() {
            self.push(InstrKind::LinkStart(url), RectF::default());
        }
    }

    fn force_new_page(&mut self) {
        if self.page_has_content() {
            self.new_page();
        } else {
            self.x = self.indent;
            self.y = 0.0;
            self.line_height = 0.0;
        }
    }

    fn add_anchor(&mut self, name: &str, page_marker: bool) {
        let bbox = RectF::new(0.0, self.y, self.width(), 0.0);
        self.push(
            InstrKind::Anchor {
                name: name.to_string(),
                page_marker,
            },
            bbox,
        );
    }

    fn add_word(&mut self, word: &str) {
        let font = self.font().clone();
        let mut word_width = font.measure(word);

        if self.pending_space && !self.line_is_empty() {
            let space = font.char_width(' ');
            if self.x + space + word_width > self.width() {
                self.new_line();
            } else {
                self.push(
                    InstrKind::Space,
                    RectF::new(self.x, self.y, space, font.line_height()),
                );
                self.x += space;
            }
        } else if self.x + word_width > self.width() && !self.line_is_empty() {
            self.new_line();
        }
        self.pending_space = false;

        // hard-split words wider than a full line
        let mut rest = word;
        while word_width > self.width() - self.x && rest.chars().count() > 1 {
            let available = self.width() - self.x;
            let mut taken = 0.0;
            let mut split = 0;
            for (i, c) in rest.char_indices() {
                let w = font.char_width(c);
                if taken + w > available && i > 0 {
                    break;
                }
                taken += w;
                split = i + c.len_utf8();
            }
            let (head, tail) = rest.split_at(split);
            self.place_run(head, taken, &font);
            self.new_line();
            rest = tail;
            word_width = font.measure(rest);
        }
        if !rest.is_empty() {
            self.place_run(rest, word_width, &font);
        }
    }

    fn place_run(&mut self, text: &str, width: f32, font: &FontState) {
        self.ensure_font();
        let height = font.line_height();
        let bbox = RectF::new(self.x, self.y, width, height);
        let kind = if font.rtl || text.chars().any(is_strong_rtl) {
            InstrKind::RtlText(text.to_string())
        } else {
            InstrKind::Text(text.to_string())
        };
        self.push(kind, bbox);
        self.x += width;
        self.line_height = self.line_height.max(height);
    }

    fn add_text(&mut self, text: &str) {
        if self.pre_depth > 0 {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    self.new_line();
                }
                let mut words = line.split(' ').peekable();
                while let Some(word) = words.next() {
                    if !word.is_empty() {
                        self.add_word(word.trim_end_matches('\r'));
                    }
                    if words.peek().is_some() {
                        self.pending_space = true;
                    }
                }
            }
            return;
        }

        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        let mut words = text.split_whitespace().peekable();
        while let Some(word) = words.next() {
            self.add_word(word);
            if words.peek().is_some() {
                self.pending_space = true;
            }
        }
        if text.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn add_image(&mut self, dom: &ArenaDom, id: ArenaNodeId) {
        let Some(src) = dom.get_attr(id, "src") else {
            return;
        };
        let src = percent_decode(src);
        let Some(data) = self
            .args
            .resources
            .image_data(&src, self.page_path.as_deref())
        else {
            if let Some(alt) = dom.get_attr(id, "alt") {
                let alt = alt.to_string();
                self.add_text(&alt);
            }
            return;
        };

        let attr = |name: &str| {
            dom.get_attr(id, name)
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f32>().ok())
        };
        let (mut w, mut h) = match (attr("width"), attr("height")) {
            (Some(w), Some(h)) => (w, h),
            _ => image_dimensions(&data)
                .map(|(w, h)| (w as f32, h as f32))
                .unwrap_or((DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_SIZE)),
        };
        let max_w = self.width() - self.indent;
        let max_h = self.args.page_height;
        if w > max_w && w > 0.0 {
            h *= max_w / w;
            w = max_w;
        }
        if h > max_h && h > 0.0 {
            w *= max_h / h;
            h = max_h;
        }

        if self.pending_space && !self.line_is_empty() {
            self.x += self.font().char_width(' ');
        }
        self.pending_space = false;
        if self.x + w > self.width() && !self.line_is_empty() {
            self.new_line();
        }
        if self.y + h > self.args.page_height && self.page_has_content() {
            self.new_page();
        }
        self.ensure_font();
        self.push(InstrKind::Image(data), RectF::new(self.x, self.y, w, h));
        self.x += w;
        self.line_height = self.line_height.max(h);
    }

    fn add_rule(&mut self) {
        self.block_break();
        let h = self.font().line_height();
        let bbox = RectF::new(self.indent, self.y + h / 2.0, self.width() - self.indent, 1.0);
        self.push(InstrKind::Line, bbox);
        self.y += h;
        if self.y + h > self.args.page_height {
            self.new_page();
        }
    }

    fn handle_pagebreak(&mut self, dom: &ArenaDom, id: ArenaNodeId) {
        let path = dom.get_attr(id, "page_path").map(str::to_string);
        if path.is_none() || self.page_path.is_some() {
            self.block_break();
            self.force_new_page();
        }
        if let Some(path) = path {
            let marker = dom.has_attr(id, "page_marker");
            self.ensure_font();
            self.add_anchor(&path, marker);
            self.page_path = Some(path);
            // each sub-document brings its own stylesheets
            self.rules.reset();
        }
    }

    fn load_stylesheet(&mut self, dom: &ArenaDom, id: ArenaNodeId) {
        let is_stylesheet = dom
            .get_attr(id, "rel")
            .is_some_and(|r| r.eq_ignore_ascii_case("stylesheet"));
        let is_css = dom
            .get_attr(id, "type")
            .is_none_or(|t| t.eq_ignore_ascii_case("text/css"));
        if !is_stylesheet || !is_css {
            return;
        }
        let Some(href) = dom.get_attr(id, "href") else {
            return;
        };
        let href = percent_decode(href);
        if let Some(css) = self
            .args
            .resources
            .stylesheet_data(&href, self.page_path.as_deref())
        {
            self.rules.add_stylesheet(&String::from_utf8_lossy(&css));
        }
    }

    fn element_style(&self, dom: &ArenaDom, id: ArenaNodeId, tag: &str) -> ElementStyle {
        let mut style = tag_style(tag);
        if tag == "font" {
            style.merge(&font_tag_style(dom, id));
        }
        if dom
            .get_attr(id, "dir")
            .is_some_and(|d| d.eq_ignore_ascii_case("rtl"))
        {
            style.rtl = Some(true);
        }
        if !self.rules.is_empty() {
            style.merge(&self.rules.style_for(
                tag,
                dom.get_attr(id, "class"),
                dom.get_attr(id, "id"),
            ));
        }
        if let Some(inline) = dom.get_attr(id, "style") {
            style.merge(&ElementStyle::parse_inline(inline));
        }
        style
    }

    /// Handle an element start. Returns `None` when its subtree is skipped.
    fn enter_element(&mut self, dom: &ArenaDom, id: ArenaNodeId, tag: &str) -> Option<Frame> {
        match tag {
            "pagebreak" => {
                self.handle_pagebreak(dom, id);
                return Some(Frame::default());
            }
            "mbp:pagebreak" => {
                self.block_break();
                self.force_new_page();
                return Some(Frame::default());
            }
            "style" => {
                let css: String = dom.children(id).filter_map(|c| dom.text(c)).collect();
                self.rules.add_stylesheet(&css);
                return None;
            }
            "link" => {
                self.load_stylesheet(dom, id);
                return None;
            }
            "br" => {
                self.new_line();
                return None;
            }
            "hr" => {
                self.add_rule();
                return None;
            }
            "img" => {
                self.add_image(dom, id);
                return None;
            }
            t if is_skipped(t) => return None,
            _ => {}
        }

        let style = self.element_style(dom, id, tag);
        if style.hidden {
            return None;
        }

        let mut frame = Frame::default();
        if style.page_break_before {
            self.block_break();
            self.force_new_page();
        }
        if is_block(tag) {
            self.block_break();
            frame.block = true;
            if matches!(tag, "p" | "pre" | "blockquote") || heading_level(tag).is_some() {
                self.paragraph_gap();
                frame.gap_after = true;
            }
        }
        if is_indented(tag) {
            frame.indent = self.font().size_units() * 2.0;
            self.indent += frame.indent;
            if self.line_is_empty() {
                self.x = self.indent;
            }
        }
        if tag == "pre" {
            self.pre_depth += 1;
            frame.pre = true;
        }
        frame.break_after = style.page_break_after;

        let mut font = self.font().clone();
        font.apply(&style);
        if font != *self.font() {
            self.fonts.push(font);
            frame.font_pushed = true;
        }

        // ids and legacy <a name=> are link targets
        if let Some(name) = dom.get_attr(id, "id").filter(|s| !s.is_empty()) {
            self.add_anchor(name, false);
        }
        if tag == "a" {
            if let Some(name) = dom.get_attr(id, "name").filter(|s| !s.is_empty()) {
                self.add_anchor(name, false);
            }
            if let Some(href) = dom.get_attr(id, "href") {
                if self.open_link.is_some() {
                    self.push(InstrKind::LinkEnd, RectF::default());
                }
                self.push(InstrKind::LinkStart(href.to_string()), RectF::default());
                self.open_link = Some(href.to_string());
                frame.link = true;
            }
        }
        Some(frame)
    }

    fn leave_element(&mut self, frame: Frame) {
        if frame.link && self.open_link.take().is_some() {
            self.push(InstrKind::LinkEnd, RectF::default());
        }
        if frame.font_pushed && self.fonts.len() > 1 {
            self.fonts.pop();
        }
        if frame.pre {
            self.pre_depth = self.pre_depth.saturating_sub(1);
        }
        if frame.block {
            self.block_break();
        }
        if frame.indent > 0.0 {
            self.indent = (self.indent - frame.indent).max(0.0);
            if self.line_is_empty() {
                self.x = self.indent;
            }
        }
        if frame.gap_after {
            self.paragraph_gap();
        }
        if frame.break_after {
            self.force_new_page();
        }
    }

    fn check_abort(&self) -> Result<()> {
        match &self.args.abort {
            Some(cookie) if cookie.is_aborted() => Err(Error::Aborted),
            _ => Ok(()),
        }
    }

    fn layout(&mut self, dom: &ArenaDom) -> Result<()> {
        self.ensure_font();
        let mut stack = vec![Step::Enter(dom.document())];
        while let Some(step) = stack.pop() {
            self.check_abort()?;
            match step {
                Step::Enter(id) => {
                    if let Some(text) = dom.text(id) {
                        self.add_text(text);
                        continue;
                    }
                    let frame = match dom.element_name(id) {
                        Some(name) => {
                            let tag = name.as_ref().to_ascii_lowercase();
                            match self.enter_element(dom, id, &tag) {
                                Some(frame) => frame,
                                None => continue,
                            }
                        }
                        None => Frame::default(),
                    };
                    stack.push(Step::Leave(frame));
                    let children: Vec<_> = dom.children(id).collect();
                    stack.extend(children.into_iter().rev().map(Step::Enter));
                }
                Step::Leave(frame) => self.leave_element(frame),
            }
        }

        if self.open_link.take().is_some() {
            self.push(InstrKind::LinkEnd, RectF::default());
        }
        if self.page_has_content() || self.pages.is_empty() {
            let mut page = std::mem::take(&mut self.current);
            update_link_bboxes(&mut page);
            self.pages.push(page);
        }
        Ok(())
    }
}

impl Formatter for FlowFormatter<'_> {
    fn format_all_pages(&mut self) -> Result<Vec<Page>> {
        let html = close_marker_tags(self.args.html);
        let dom = dom::parse_html(&html);
        self.layout(&dom)?;
        log::debug!("formatted {} pages", self.pages.len());
        Ok(std::mem::take(&mut self.pages))
    }
}

/// Give every link start the box of the link's content on its first line.
fn update_link_bboxes(page: &mut Page) {
    let instrs = &mut page.instructions;
    for i in 0..instrs.len() {
        if !matches!(instrs[i].kind, InstrKind::LinkStart(_)) {
            continue;
        }
        let mut bbox: Option<RectF> = None;
        for instr in &instrs[i + 1..] {
            let b = instr.bbox;
            match (&instr.kind, bbox) {
                (InstrKind::LinkEnd | InstrKind::LinkStart(_), _) => break,
                (InstrKind::Text(_) | InstrKind::RtlText(_) | InstrKind::Image(_), None) => {
                    bbox = Some(b);
                }
                (InstrKind::Text(_) | InstrKind::RtlText(_) | InstrKind::Image(_) | InstrKind::Space, Some(acc)) => {
                    if (acc.y - b.y).abs() > f32::EPSILON {
                        break;
                    }
                    let x = acc.x.min(b.x);
                    let right = acc.right().max(b.right());
                    bbox = Some(RectF::new(x, acc.y, right - x, acc.dy.max(b.dy)));
                }
                _ => {}
            }
        }
        instrs[i].bbox = bbox.unwrap_or_default();
    }
}
