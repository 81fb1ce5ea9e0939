//! Page text with one bounding box per character.

use crate::layout::{DrawInstr, InstrKind, RectF};

/// A new line starts when a run begins left of the previous run's end or
/// below 80% of its height.
const LINE_WRAP_FACTOR: f32 = 0.8;

/// Text of one page and a box per `char` of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub text: String,
    pub coords: Vec<RectF>,
}

impl PageText {
    fn push_blanks(&mut self, s: &str) {
        self.text.push_str(s);
        self.coords
            .extend(std::iter::repeat_n(RectF::default(), s.chars().count()));
    }
}

/// Concatenate the text runs of a page.
///
/// `border` is added to every box so coordinates are page-relative.
/// Separators get empty boxes; runs on the same line separated by a space
/// instruction get a synthesized space spanning the gap.
pub fn extract_page_text(instrs: &[DrawInstr], border: f32, line_sep: &str) -> PageText {
    let mut out = PageText::default();
    let mut insert_space = false;
    // box of the last real character, for line-wrap detection
    let mut last: Option<RectF> = None;

    for instr in instrs {
        let bbox = instr.bbox.offset(border, border);
        let (text, rtl) = match &instr.kind {
            InstrKind::Text(s) => (s.as_str(), false),
            InstrKind::RtlText(s) => (s.as_str(), true),
            InstrKind::Space => {
                insert_space = true;
                continue;
            }
            _ => continue,
        };

        if let Some(prev) = last {
            let wrapped = if rtl {
                bbox.right() > prev.x
            } else {
                bbox.x < prev.right()
            } || bbox.y > prev.y + prev.dy * LINE_WRAP_FACTOR;

            if wrapped {
                out.push_blanks(line_sep);
            } else if insert_space {
                let gap = if rtl {
                    prev.x - bbox.right()
                } else {
                    bbox.x - prev.right()
                };
                if gap > 0.0 {
                    let x = if rtl { bbox.right() } else { bbox.x - gap };
                    out.text.push(' ');
                    out.coords.push(RectF::new(x, bbox.y, gap, bbox.dy));
                }
            }
        }
        insert_space = false;

        let len = text.chars().count();
        if len == 0 {
            continue;
        }
        let cwidth = bbox.dx / len as f32;
        out.text.push_str(text);
        for k in 0..len {
            let x = if rtl {
                bbox.x + (len - k - 1) as f32 * cwidth
            } else {
                bbox.x + k as f32 * cwidth
            };
            out.coords.push(RectF::new(x, bbox.y, cwidth, bbox.dy));
        }
        last = Some(bbox);
    }

    if !out.text.is_empty() && !out.text.ends_with(line_sep) {
        out.push_blanks(line_sep);
    }
    out
}
