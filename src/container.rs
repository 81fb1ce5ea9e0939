//! Archive access shared by all container formats, plus format detection.

use std::borrow::Cow;
use std::path::Path;

use crate::error::{Error, Result};

/// Entries larger than this are refused before any allocation.
pub const MAX_ENTRY_SIZE: u64 = 128 * 1024 * 1024;

/// Bytes of one container entry.
///
/// The buffer always carries one trailing NUL after the data so it can be
/// handed to consumers expecting a terminated string; [`EntryData::len`]
/// reports the exact entry length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryData {
    buf: Vec<u8>,
}

impl EntryData {
    pub fn new(mut data: Vec<u8>) -> Self {
        data.push(0);
        Self { buf: data }
    }

    /// Exact entry length, excluding the terminator.
    pub fn len(&self) -> usize {
        self.buf.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    /// The data followed by a single NUL byte.
    pub fn with_nul(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.pop();
        self.buf
    }
}

/// Canonical form of an entry path: slash-rooted, with a leading `///`
/// collapsed to one slash.
pub fn normalize_entry_path(path: &str) -> Cow<'_, str> {
    if let Some(rest) = path.strip_prefix("///") {
        return Cow::Owned(format!("/{rest}"));
    }
    if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{path}"))
    }
}

/// Random access to named entries of an archive.
///
/// Implementors provide lookups on already-normalized paths; path
/// normalization, the backslash retry and the size guard live in the
/// provided methods.
pub trait Container: Send + Sync {
    /// Size of the entry at a normalized path, if present.
    fn entry_size(&self, path: &str) -> Option<u64>;

    /// Read the entry at a normalized path.
    fn read_entry(&self, path: &str) -> Result<Vec<u8>>;

    /// All regular file entries in archive order.
    fn enumerate_entries(&self) -> Vec<String>;

    fn has_entry(&self, path: &str) -> bool {
        self.resolve_entry(path).is_some()
    }

    /// Read an entry, returning its bytes plus a NUL terminator.
    fn get_entry(&self, path: &str) -> Result<EntryData> {
        let (path, size) = self
            .resolve_entry(path)
            .ok_or_else(|| Error::not_found(path))?;
        if size > MAX_ENTRY_SIZE {
            return Err(Error::TooLarge { path, size });
        }
        let data = self.read_entry(&path)?;
        if data.len() as u64 != size {
            log::warn!("entry {path}: expected {size} bytes, read {}", data.len());
        }
        Ok(EntryData::new(data))
    }

    /// Normalize `path` and find it, retrying with backslashes turned into
    /// forward slashes.
    fn resolve_entry(&self, path: &str) -> Option<(String, u64)> {
        let normalized = normalize_entry_path(path);
        if let Some(size) = self.entry_size(&normalized) {
            return Some((normalized.into_owned(), size));
        }
        if normalized.contains('\\') {
            let retry = normalized.replace('\\', "/");
            if let Some(size) = self.entry_size(&retry) {
                return Some((retry, size));
            }
        }
        None
    }
}

/// Document formats the engine can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Chm,
    Mobi,
    PalmDoc,
    Epub,
    Fb2,
    Html,
    Txt,
}

const CHM_EXTENSIONS: &[&str] = &[".chm"];
const MOBI_EXTENSIONS: &[&str] = &[".mobi", ".azw", ".azw1", ".azw3", ".prc"];
const PALMDOC_EXTENSIONS: &[&str] = &[".pdb"];
const EPUB_EXTENSIONS: &[&str] = &[".epub"];
const FB2_EXTENSIONS: &[&str] = &[".fb2", ".fb2z", ".zfb2", ".fb2.zip"];
const HTML_EXTENSIONS: &[&str] = &[".html", ".htm", ".xhtml"];
const TXT_EXTENSIONS: &[&str] = &[".txt", ".log", ".nfo", "file_id.diz", "read.me", ".tcr"];

/// Magic signatures that a PDB type/creator field can carry.
pub(crate) const PDB_MOBI: &[u8; 8] = b"BOOKMOBI";
pub(crate) const PDB_PALMDOC: &[u8; 8] = b"TEXtREAd";
pub(crate) const PDB_TEALDOC: &[u8; 8] = b"TEXtTlDc";
pub(crate) const TCR_MAGIC: &[u8] = b"!!8-Bit!!";

impl Format {
    pub const ALL: [Format; 7] = [
        Format::Chm,
        Format::Mobi,
        Format::PalmDoc,
        Format::Epub,
        Format::Fb2,
        Format::Html,
        Format::Txt,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Chm => CHM_EXTENSIONS,
            Format::Mobi => MOBI_EXTENSIONS,
            Format::PalmDoc => PALMDOC_EXTENSIONS,
            Format::Epub => EPUB_EXTENSIONS,
            Format::Fb2 => FB2_EXTENSIONS,
            Format::Html => HTML_EXTENSIONS,
            Format::Txt => TXT_EXTENSIONS,
        }
    }

    /// Default file extension, including the dot.
    pub fn default_extension(self) -> &'static str {
        self.extensions()[0]
    }

    /// Does the file name end with one of this format's extensions?
    pub fn matches_extension(self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        self.extensions().iter().any(|ext| name.ends_with(ext))
    }

    /// Does the file start with this format's signature?
    ///
    /// `head` should hold at least the first 128 bytes of the file.
    pub fn matches_content(self, head: &[u8]) -> bool {
        match self {
            Format::Chm => head.starts_with(b"ITSF"),
            Format::Mobi => head.get(60..68) == Some(PDB_MOBI.as_slice()),
            Format::PalmDoc => {
                let kind = head.get(60..68);
                kind == Some(PDB_PALMDOC.as_slice()) || kind == Some(PDB_TEALDOC.as_slice())
            }
            Format::Epub => {
                head.starts_with(b"PK\x03\x04")
                    && head.get(30..38) == Some(b"mimetype".as_slice())
                    && head
                        .get(38..)
                        .is_some_and(|rest| rest.starts_with(b"application/epub+zip"))
            }
            Format::Fb2 => {
                let prefix = &head[..head.len().min(1024)];
                memchr::memmem::find(prefix, b"<FictionBook").is_some()
            }
            Format::Html => {
                let trimmed = crate::util::strip_bom(head);
                let start = trimmed
                    .iter()
                    .position(|b| !b.is_ascii_whitespace())
                    .unwrap_or(trimmed.len());
                let lead = &trimmed[start..trimmed.len().min(start + 14)];
                lead.len() >= 5
                    && (lead[..5].eq_ignore_ascii_case(b"<html")
                        || (lead.len() >= 14 && lead.eq_ignore_ascii_case(b"<!doctype html")))
            }
            Format::Txt => head.starts_with(TCR_MAGIC),
        }
    }

    /// Is `path` a file of this format?
    ///
    /// With `sniff` the file's leading bytes must carry the format
    /// signature; otherwise the extension decides.
    pub fn is_supported(self, path: &Path, sniff: bool) -> bool {
        if !sniff {
            return self.matches_extension(path);
        }
        if path.is_dir() {
            return self == Format::Epub && path.join("mimetype").is_file();
        }
        match read_head(path) {
            Ok(head) => self.matches_content(&head),
            Err(_) => false,
        }
    }

    /// Identify a file, preferring signatures over extensions.
    pub fn detect(path: &Path) -> Option<Format> {
        if path.is_dir() {
            return Format::Epub.is_supported(path, true).then_some(Format::Epub);
        }
        if let Ok(head) = read_head(path)
            && let Some(format) = Format::ALL.into_iter().find(|f| f.matches_content(&head))
        {
            return Some(format);
        }
        Format::ALL.into_iter().find(|f| f.matches_extension(path))
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;

    let mut head = Vec::with_capacity(1024);
    std::fs::File::open(path)?
        .take(1024)
        .read_to_end(&mut head)?;
    Ok(head)
}
