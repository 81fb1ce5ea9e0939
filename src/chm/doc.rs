//! CHM metadata: `#WINDOWS`, `#STRINGS`, `#SYSTEM`, `#IVB` and the
//! codepage repair of stored paths.

use std::sync::Arc;

use super::archive::ChmArchive;
use super::directory::{read_u16, read_u32};
use super::sitemap;
use crate::codepage::{self, CP_UTF8, CP_WINDOWS_1252};
use crate::container::Container;
use crate::document::TocVisitor;
use crate::dom;
use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::util::normalize_whitespace;

/// Smallest `#WINDOWS` entry that holds all the fields read below.
const MIN_WINDOWS_ENTRY_SIZE: u32 = 188;

const WINDOWS_TITLE: usize = 0x14;
const WINDOWS_TOC: usize = 0x60;
const WINDOWS_INDEX: usize = 0x64;
const WINDOWS_HOME: usize = 0x68;

const SYSTEM_TOC: u16 = 0;
const SYSTEM_INDEX: u16 = 1;
const SYSTEM_HOME: u16 = 2;
const SYSTEM_TITLE: u16 = 3;
const SYSTEM_LCID: u16 = 4;
const SYSTEM_CREATOR: u16 = 9;

/// Probed in order when the declared home page is missing.
const HOME_FALLBACKS: [&str; 4] = ["/index.htm", "/index.html", "/default.htm", "/default.html"];

/// Metadata fields as raw bytes in the document codepage. Each field keeps
/// the first value seen.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawMetadata {
    pub title: Option<Vec<u8>>,
    pub creator: Option<Vec<u8>>,
    pub toc_path: Option<Vec<u8>>,
    pub index_path: Option<Vec<u8>>,
    pub home_path: Option<Vec<u8>>,
    pub codepage: Option<u32>,
}

fn set_once(field: &mut Option<Vec<u8>>, value: Option<Vec<u8>>) {
    if field.is_none() {
        *field = value;
    }
}

/// NUL-terminated string at `offset`; empty strings count as missing.
fn c_string_at(data: &[u8], offset: usize) -> Option<Vec<u8>> {
    let rest = data.get(offset..)?;
    let end = memchr::memchr(0, rest).unwrap_or(rest.len());
    (end > 0).then(|| rest[..end].to_vec())
}

/// Window definitions: fixed-size entries whose string fields are offsets
/// into `#STRINGS`.
pub fn parse_windows_data(windows: &[u8], strings: &[u8], meta: &mut RawMetadata) {
    if windows.len() <= 8 {
        return;
    }
    let entries = read_u32(windows, 0);
    let entry_size = read_u32(windows, 4);
    if entry_size < MIN_WINDOWS_ENTRY_SIZE {
        return;
    }

    let entry_size = entry_size as usize;
    for i in 0..entries as usize {
        let off = 8 + i * entry_size;
        if off + entry_size > windows.len() {
            break;
        }
        let string = |field: usize| c_string_at(strings, read_u32(windows, off + field) as usize);
        set_once(&mut meta.title, string(WINDOWS_TITLE));
        set_once(&mut meta.toc_path, string(WINDOWS_TOC));
        set_once(&mut meta.index_path, string(WINDOWS_INDEX));
        set_once(&mut meta.home_path, string(WINDOWS_HOME));
    }
}

/// `#SYSTEM` records: a version dword, then `(type: u16, len: u16, data)`.
pub fn parse_system_data(data: &[u8], meta: &mut RawMetadata) {
    let mut off = 4;
    while off + 4 < data.len() {
        let len = read_u16(data, off + 2) as usize;
        if len == 0 {
            off += 4;
            continue;
        }
        let value = off + 4;
        match read_u16(data, off) {
            SYSTEM_TOC => set_once(&mut meta.toc_path, c_string_at(data, value)),
            SYSTEM_INDEX => set_once(&mut meta.index_path, c_string_at(data, value)),
            SYSTEM_HOME => set_once(&mut meta.home_path, c_string_at(data, value)),
            SYSTEM_TITLE => set_once(&mut meta.title, c_string_at(data, value)),
            SYSTEM_LCID if len >= 4 && meta.codepage.is_none() => {
                meta.codepage = Some(codepage::lcid_to_codepage(read_u32(data, value)));
            }
            SYSTEM_CREATOR => set_once(&mut meta.creator, c_string_at(data, value)),
            _ => {}
        }
        off += len + 4;
    }
}

/// Map a topic id through the `#IVB` table to an offset into `#STRINGS`.
pub fn lookup_topic_id(ivb: &[u8], strings: &[u8], id: u32) -> Option<String> {
    if ivb.len() % 8 != 4 || (ivb.len() - 4) as u32 != read_u32(ivb, 0) {
        return None;
    }
    let offset = ivb[4..]
        .chunks_exact(8)
        .find(|pair| read_u32(pair, 0) == id)
        .map(|pair| read_u32(pair, 4))?;
    let path = c_string_at(strings, offset as usize)?;
    Some(String::from_utf8_lossy(&path).into_owned())
}

/// An opened CHM with its decoded metadata.
pub struct ChmFile {
    archive: ChmArchive,
    codepage: u32,
    title: Option<Vec<u8>>,
    creator: Option<Vec<u8>>,
    toc_path: Option<String>,
    index_path: Option<String>,
    home_path: String,
}

impl ChmFile {
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let archive = ChmArchive::open(source)?;

        let mut meta = RawMetadata::default();
        if let (Ok(windows), Ok(strings)) =
            (archive.get_entry("/#WINDOWS"), archive.get_entry("/#STRINGS"))
        {
            parse_windows_data(windows.as_bytes(), strings.as_bytes(), &mut meta);
        }
        let system = archive
            .get_entry("/#SYSTEM")
            .map_err(|_| Error::bad_format("missing #SYSTEM"))?;
        parse_system_data(system.as_bytes(), &mut meta);

        let mut file_codepage = codepage::lcid_to_codepage(archive.header().lcid);
        let mut codepage = meta.codepage.unwrap_or(file_codepage);

        // prefer the #SYSTEM codepage unless it produces paths that don't exist
        let home = fix_path_codepage(&archive, meta.home_path, &mut codepage, &mut file_codepage);
        let toc_path = fix_path_codepage(&archive, meta.toc_path, &mut codepage, &mut file_codepage);
        let index_path =
            fix_path_codepage(&archive, meta.index_path, &mut codepage, &mut file_codepage);

        let home_path = match home.filter(|h| archive.has_entry(h)) {
            Some(home) => home,
            None => {
                let fallback = HOME_FALLBACKS
                    .iter()
                    .find(|p| archive.has_entry(p))
                    .ok_or_else(|| Error::not_found("CHM home page"))?;
                log::debug!("CHM home page missing, falling back to {fallback}");
                fallback.to_string()
            }
        };

        Ok(Self {
            archive,
            codepage,
            title: meta.title,
            creator: meta.creator,
            toc_path,
            index_path,
            home_path,
        })
    }

    pub fn archive(&self) -> &ChmArchive {
        &self.archive
    }

    pub fn codepage(&self) -> u32 {
        self.codepage
    }

    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    pub fn toc_path(&self) -> Option<&str> {
        self.toc_path.as_deref()
    }

    pub fn index_path(&self) -> Option<&str> {
        self.index_path.as_deref()
    }

    pub fn has_toc(&self) -> bool {
        self.toc_path.is_some()
    }

    pub fn has_index(&self) -> bool {
        self.index_path.is_some()
    }

    /// Page bytes as UTF-8; a UTF-8 BOM wins over both codepages.
    pub fn to_utf8(&self, bytes: &[u8], override_codepage: u32) -> String {
        codepage::to_utf8(bytes, self.codepage, override_codepage)
    }

    pub fn title(&self) -> Option<String> {
        self.decode_property(self.title.as_deref())
    }

    pub fn creator(&self) -> Option<String> {
        self.decode_property(self.creator.as_deref())
    }

    fn decode_property(&self, raw: Option<&[u8]>) -> Option<String> {
        let text = codepage::decode(raw?, self.codepage);
        let text = normalize_whitespace(&text);
        (!text.is_empty()).then_some(text)
    }

    pub fn parse_toc(&self, visitor: &mut dyn TocVisitor) -> bool {
        self.parse_sitemap(self.toc_path.as_deref(), false, visitor)
    }

    pub fn parse_index(&self, visitor: &mut dyn TocVisitor) -> bool {
        self.parse_sitemap(self.index_path.as_deref(), true, visitor)
    }

    fn parse_sitemap(&self, path: Option<&str>, is_index: bool, visitor: &mut dyn TocVisitor) -> bool {
        let Some(path) = path else {
            return false;
        };
        let Ok(data) = self.archive.get_entry(path) else {
            log::debug!("sitemap {path} unreadable");
            return false;
        };

        let mut bytes = data.as_bytes();
        let mut codepage = self.codepage;
        if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
            bytes = rest;
            codepage = CP_UTF8;
        }
        // Parse everything as Windows-1252 so that raw text and character
        // references agree; param values are re-decoded per codepage.
        let text = codepage::decode(bytes, CP_WINDOWS_1252);
        let dom = dom::parse_html(&text);
        sitemap::walk(&dom, codepage, is_index, visitor)
    }

    /// Path of a numeric topic id, via `#IVB` and `#STRINGS`.
    pub fn resolve_topic_id(&self, id: u32) -> Option<String> {
        let ivb = self.archive.get_entry("/#IVB").ok()?;
        let strings = self.archive.get_entry("/#STRINGS").ok()?;
        lookup_topic_id(ivb.as_bytes(), strings.as_bytes(), id)
    }
}

/// Pick the decoding of a stored path that names an existing entry:
/// as-is, then through the document codepage, then through the file-header
/// codepage (which then becomes the document codepage).
fn fix_path_codepage(
    archive: &ChmArchive,
    raw: Option<Vec<u8>>,
    codepage: &mut u32,
    file_codepage: &mut u32,
) -> Option<String> {
    let raw = raw?;
    if let Ok(path) = std::str::from_utf8(&raw)
        && archive.has_entry(path)
    {
        return Some(path.to_string());
    }

    let converted = codepage::to_utf8(&raw, *codepage, 0);
    if archive.has_entry(&converted) {
        *file_codepage = *codepage;
        return Some(converted);
    }
    if *file_codepage != *codepage {
        let alternative = codepage::to_utf8(&raw, *file_codepage, 0);
        if archive.has_entry(&alternative) {
            log::debug!(
                "CHM paths decode with file codepage {} instead of {}",
                file_codepage,
                codepage
            );
            *codepage = *file_codepage;
            return Some(alternative);
        }
    }
    Some(converted)
}
