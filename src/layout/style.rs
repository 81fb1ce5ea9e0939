//! The small CSS subset the flow formatter honors.
//!
//! Selectors are limited to `tag`, `.class`, `#id` and `tag.class`;
//! anything more complex is skipped. Only font, direction, visibility and
//! page-break properties are read.

use cssparser::{
    AtRuleParser, CowRcStr, DeclarationParser, ParseError, Parser, ParserInput, ParserState,
    QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser, StyleSheetParser, Token,
};

/// Font size relative to the inherited one, or absolute in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FontSize {
    Scale(f32),
    Points(f32),
}

/// Declarations that apply to one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementStyle {
    pub font_family: Option<String>,
    pub font_size: Option<FontSize>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub rtl: Option<bool>,
    pub hidden: bool,
    pub page_break_before: bool,
    pub page_break_after: bool,
}

impl ElementStyle {
    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: &ElementStyle) {
        if other.font_family.is_some() {
            self.font_family.clone_from(&other.font_family);
        }
        if other.font_size.is_some() {
            self.font_size = other.font_size;
        }
        if other.bold.is_some() {
            self.bold = other.bold;
        }
        if other.italic.is_some() {
            self.italic = other.italic;
        }
        if other.rtl.is_some() {
            self.rtl = other.rtl;
        }
        self.hidden |= other.hidden;
        self.page_break_before |= other.page_break_before;
        self.page_break_after |= other.page_break_after;
    }

    /// Parse a `style="..."` attribute.
    pub fn parse_inline(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut decls = DeclarationCollector {
            style: ElementStyle::default(),
        };
        for result in RuleBodyParser::new(&mut parser, &mut decls) {
            // lenient: unknown or broken declarations are dropped
            let _ = result;
        }
        decls.style
    }

    fn apply(&mut self, property: &str, values: &[Token]) {
        match property {
            "font-family" => self.font_family = parse_font_family(values),
            "font-size" => self.font_size = values.iter().find_map(parse_font_size),
            "font-weight" => self.bold = parse_font_weight(values),
            "font-style" => {
                self.italic = first_ident(values).map(|s| s == "italic" || s == "oblique");
            }
            "direction" => self.rtl = first_ident(values).map(|s| s == "rtl"),
            "display" => self.hidden = first_ident(values).is_some_and(|s| s == "none"),
            "page-break-before" | "break-before" => {
                self.page_break_before = first_ident(values).is_some_and(is_forced_break);
            }
            "page-break-after" | "break-after" => {
                self.page_break_after = first_ident(values).is_some_and(is_forced_break);
            }
            _ => {}
        }
    }
}

fn is_forced_break(value: String) -> bool {
    matches!(value.as_str(), "always" | "page" | "left" | "right")
}

fn first_ident(values: &[Token]) -> Option<String> {
    values.iter().find_map(|t| match t {
        Token::Ident(name) => Some(name.to_ascii_lowercase()),
        _ => None,
    })
}

fn parse_font_family(values: &[Token]) -> Option<String> {
    // the first family wins; multi-word names arrive as several idents
    let mut name = String::new();
    for token in values {
        match token {
            Token::QuotedString(s) if name.is_empty() => return Some(s.to_string()),
            Token::Ident(s) => {
                if !name.is_empty() {
                    name.push(' ');
                }
                name.push_str(s);
            }
            Token::Comma => break,
            _ => {}
        }
    }
    (!name.is_empty()).then_some(name)
}

fn parse_font_size(token: &Token) -> Option<FontSize> {
    match token {
        Token::Dimension { value, unit, .. } => match unit.to_ascii_lowercase().as_str() {
            "em" | "rem" => Some(FontSize::Scale(*value)),
            "pt" => Some(FontSize::Points(*value)),
            "px" => Some(FontSize::Points(*value * 0.75)),
            _ => None,
        },
        Token::Percentage { unit_value, .. } => Some(FontSize::Scale(*unit_value)),
        Token::Ident(name) => match name.to_ascii_lowercase().as_str() {
            "xx-small" => Some(FontSize::Scale(0.6)),
            "x-small" => Some(FontSize::Scale(0.75)),
            "small" | "smaller" => Some(FontSize::Scale(0.89)),
            "medium" => Some(FontSize::Scale(1.0)),
            "large" | "larger" => Some(FontSize::Scale(1.2)),
            "x-large" => Some(FontSize::Scale(1.5)),
            "xx-large" => Some(FontSize::Scale(2.0)),
            _ => None,
        },
        _ => None,
    }
}

fn parse_font_weight(values: &[Token]) -> Option<bool> {
    values.iter().find_map(|t| match t {
        Token::Ident(name) => match name.to_ascii_lowercase().as_str() {
            "bold" | "bolder" => Some(true),
            "normal" | "lighter" => Some(false),
            _ => None,
        },
        Token::Number {
            int_value: Some(w), ..
        } => Some(*w >= 600),
        _ => None,
    })
}

/// A compound selector: optional tag, optional class, optional id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleSelector {
    pub tag: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
}

impl SimpleSelector {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty()
            || text
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '>' | '+' | '~' | ':' | '[' | '*'))
        {
            return None;
        }
        let mut selector = SimpleSelector::default();
        let (head, id) = match text.split_once('#') {
            Some((head, id)) => (head, Some(id)),
            None => (text, None),
        };
        if let Some(id) = id {
            if id.is_empty() || id.contains('.') {
                return None;
            }
            selector.id = Some(id.to_string());
        }
        let (tag, class) = match head.split_once('.') {
            Some((tag, class)) => (tag, Some(class)),
            None => (head, None),
        };
        if let Some(class) = class {
            if class.is_empty() || class.contains('.') {
                return None;
            }
            selector.class = Some(class.to_string());
        }
        if !tag.is_empty() {
            selector.tag = Some(tag.to_ascii_lowercase());
        }
        Some(selector)
    }

    pub fn matches(&self, tag: &str, classes: Option<&str>, id: Option<&str>) -> bool {
        if let Some(t) = &self.tag
            && !t.eq_ignore_ascii_case(tag)
        {
            return false;
        }
        if let Some(c) = &self.class
            && !classes.is_some_and(|cs| cs.split_ascii_whitespace().any(|x| x == c))
        {
            return false;
        }
        if let Some(i) = &self.id
            && id != Some(i.as_str())
        {
            return false;
        }
        true
    }

    fn specificity(&self) -> u32 {
        (self.id.is_some() as u32) * 100
            + (self.class.is_some() as u32) * 10
            + self.tag.is_some() as u32
    }
}

#[derive(Debug, Clone)]
struct StyleRule {
    selectors: Vec<SimpleSelector>,
    style: ElementStyle,
}

/// Rules collected from `<style>` elements and linked stylesheets of the
/// current sub-document.
#[derive(Debug, Clone, Default)]
pub struct StyleRules {
    rules: Vec<StyleRule>,
}

impl StyleRules {
    pub fn add_stylesheet(&mut self, css: &str) {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rule_parser = TopLevelRuleParser {
            rules: &mut self.rules,
        };
        for result in StyleSheetParser::new(&mut parser, &mut rule_parser) {
            let _ = result;
        }
    }

    pub fn reset(&mut self) {
        self.rules.clear();
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Matching declarations, least specific first.
    pub fn style_for(&self, tag: &str, classes: Option<&str>, id: Option<&str>) -> ElementStyle {
        let mut matched: Vec<(u32, &ElementStyle)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.selectors
                    .iter()
                    .filter(|s| s.matches(tag, classes, id))
                    .map(SimpleSelector::specificity)
                    .max()
                    .map(|spec| (spec, &rule.style))
            })
            .collect();
        matched.sort_by_key(|(spec, _)| *spec);

        let mut style = ElementStyle::default();
        for (_, s) in matched {
            style.merge(s);
        }
        style
    }
}

struct TopLevelRuleParser<'a> {
    rules: &'a mut Vec<StyleRule>,
}

impl<'i> AtRuleParser<'i> for TopLevelRuleParser<'_> {
    type Prelude = ();
    type AtRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        _name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_custom_error(()))
    }
}

impl<'i> QualifiedRuleParser<'i> for TopLevelRuleParser<'_> {
    type Prelude = Vec<SimpleSelector>;
    type QualifiedRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let start = input.position();
        while input.next_including_whitespace().is_ok() {}
        let text = input.slice_from(start);
        let selectors: Vec<_> = text.split(',').filter_map(SimpleSelector::parse).collect();
        if selectors.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(selectors)
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let mut decls = DeclarationCollector {
            style: ElementStyle::default(),
        };
        for result in RuleBodyParser::new(input, &mut decls) {
            let _ = result;
        }
        self.rules.push(StyleRule {
            selectors: prelude,
            style: decls.style,
        });
        Ok(())
    }
}

struct DeclarationCollector {
    style: ElementStyle,
}

impl<'i> DeclarationParser<'i> for DeclarationCollector {
    type Declaration = ();
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let mut values = Vec::new();
        while let Ok(token) = input.next() {
            values.push(token.clone());
        }
        self.style.apply(&name.to_ascii_lowercase(), &values);
        Ok(())
    }
}

impl<'i> AtRuleParser<'i> for DeclarationCollector {
    type Prelude = ();
    type AtRule = ();
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationCollector {
    type Prelude = ();
    type QualifiedRule = ();
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, (), ()> for DeclarationCollector {
    fn parse_declarations(&self) -> bool {
        true
    }

    fn parse_qualified(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_style() {
        let style = ElementStyle::parse_inline(
            "font-family: 'Times New Roman', serif; font-weight: 700; font-size: 150%; bogus",
        );
        assert_eq!(style.font_family.as_deref(), Some("Times New Roman"));
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.font_size, Some(FontSize::Scale(1.5)));
    }

    #[test]
    fn test_inline_page_break_and_display() {
        let style = ElementStyle::parse_inline("page-break-before: always; display: none");
        assert!(style.page_break_before);
        assert!(style.hidden);
    }

    #[test]
    fn test_stylesheet_specificity() {
        let mut rules = StyleRules::default();
        rules.add_stylesheet(
            "p.note { font-style: italic } p { font-style: normal; direction: rtl } \
             div > p { font-weight: bold } @media print { p { display: none } }",
        );
        assert_eq!(rules.len(), 2);
        let style = rules.style_for("P", Some("intro note"), None);
        assert_eq!(style.italic, Some(true));
        assert_eq!(style.rtl, Some(true));
        assert_eq!(style.bold, None);
        assert!(!style.hidden);

        let plain = rules.style_for("p", None, None);
        assert_eq!(plain.italic, Some(false));
        rules.reset();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_selector_parse() {
        let sel = SimpleSelector::parse("h1#top").unwrap();
        assert!(sel.matches("h1", None, Some("top")));
        assert!(!sel.matches("h2", None, Some("top")));
        assert!(SimpleSelector::parse("ul li").is_none());
        assert!(SimpleSelector::parse("a:hover").is_none());
    }
}
