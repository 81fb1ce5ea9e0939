//! Error types for ebook-flow operations.

use thiserror::Error;

/// Errors that can occur while opening, parsing or paginating a document.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad format: {0}")]
    BadFormat(String),

    #[error("Entry {path} too large ({size} bytes)")]
    TooLarge { path: String, size: u64 },

    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// Internal invariant broken while building the page/anchor model.
    #[error("Internal inconsistency: {0}")]
    Inconsistent(String),

    #[error("Document produced no pages")]
    EmptyDocument,

    #[error("Loading aborted")]
    Aborted,
}

impl Error {
    pub(crate) fn bad_format(msg: impl Into<String>) -> Self {
        Error::BadFormat(msg.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
