//! Loading options and page geometry.

/// Layout units per inch.
pub const UNITS_PER_INCH: f32 = 96.0;

/// Page size and uniform border, in layout units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub border: f32,
}

impl PageGeometry {
    pub fn from_inches(width: f32, height: f32, border: f32) -> Self {
        Self {
            width: width * UNITS_PER_INCH,
            height: height * UNITS_PER_INCH,
            border: border * UNITS_PER_INCH,
        }
    }

    /// "B format" paperback, used for books.
    pub fn paperback() -> Self {
        Self::from_inches(5.12, 7.8, 0.4)
    }

    /// ISO 216 A4, used for help files and plain documents.
    pub fn a4() -> Self {
        Self::from_inches(8.27, 11.693, 0.4)
    }

    /// US letter, used for RFC text files.
    pub fn letter() -> Self {
        Self::from_inches(8.5, 11.0, 0.4)
    }

    /// Width available to the formatter.
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.border
    }

    pub fn content_height(&self) -> f32 {
        self.height - 2.0 * self.border
    }
}

/// Options passed to every engine load.
#[derive(Debug, Clone, PartialEq)]
pub struct EbookConfig {
    pub font_name: String,
    pub font_size: f32,
    /// Overrides the format's default page size when set.
    pub page: Option<PageGeometry>,
}

impl Default for EbookConfig {
    fn default() -> Self {
        Self {
            font_name: "Georgia".to_string(),
            font_size: 10.0,
            page: None,
        }
    }
}

impl EbookConfig {
    /// Use the given UI font. Pages are usually shown zoomed in, so the
    /// layout size is scaled down to 80%.
    pub fn with_font(name: impl Into<String>, size: f32) -> Self {
        Self {
            font_name: name.into(),
            font_size: size * 0.8,
            page: None,
        }
    }

    pub fn with_page(mut self, page: PageGeometry) -> Self {
        self.page = Some(page);
        self
    }
}
