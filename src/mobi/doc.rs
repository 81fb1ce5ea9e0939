//! Mobipocket books.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use super::filepos::{self, ANCHOR_PREFIX};
use super::headers::{Compression, ExthHeader, MobiHeader};
use super::huffcdic::HuffCdicReader;
use super::palmdoc;
use super::pdb::{PdbKind, PdbReader, is_image_record, strip_trailing_data};
use crate::codepage;
use crate::container::Format;
use crate::document::{Document, DocumentProperty, ResourceProvider, TocVisitor};
use crate::dom::{self, ArenaDom, ArenaNodeId};
use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::util::normalize_whitespace;

/// Upper bound for the decompressed text of a book.
const MAX_TEXT_LEN: usize = 128 * 1024 * 1024;

/// Decompress and concatenate the text records described by `header`.
pub(super) fn load_text(pdb: &PdbReader, header: &MobiHeader) -> Result<Vec<u8>> {
    if header.encryption != 0 {
        return Err(Error::Unsupported("encrypted PDB text".into()));
    }

    let mut huff = match header.compression {
        Compression::Huffman => Some(load_huff(pdb, header)?),
        Compression::Unknown(n) => {
            return Err(Error::Unsupported(format!("PDB compression {n}")));
        }
        Compression::None | Compression::PalmDoc => None,
    };

    let count = (header.text_record_count as usize).min(pdb.record_count().saturating_sub(1));
    let mut text = Vec::with_capacity(header.text_length as usize);
    for index in 1..=count {
        let record = pdb.record(index)?;
        let record = strip_trailing_data(&record, header.extra_data_flags);
        match (&mut huff, header.compression) {
            (Some(huff), _) => text.extend_from_slice(&huff.decompress(record)?),
            (None, Compression::PalmDoc) => text.extend_from_slice(&palmdoc::decompress(record)),
            _ => text.extend_from_slice(record),
        }
        if text.len() > MAX_TEXT_LEN {
            return Err(Error::TooLarge {
                path: "text".into(),
                size: text.len() as u64,
            });
        }
    }
    if header.text_length > 0 && text.len() > header.text_length as usize {
        text.truncate(header.text_length as usize);
    }
    log::debug!("loaded {} text records, {} bytes", count, text.len());
    Ok(text)
}

fn load_huff(pdb: &PdbReader, header: &MobiHeader) -> Result<HuffCdicReader> {
    let first = header.huff_record_index as usize;
    let count = header.huff_record_count as usize;
    if count == 0 {
        return Err(Error::bad_format("missing HUFF records"));
    }
    let huff = pdb.record(first)?;
    let cdics = (first + 1..first + count)
        .map(|i| pdb.record(i))
        .collect::<Result<Vec<_>>>()?;
    let cdic_refs: Vec<&[u8]> = cdics.iter().map(Vec::as_slice).collect();
    HuffCdicReader::new(&huff, &cdic_refs)
}

/// Offset of the table of contents named by the guide:
/// `<reference type="toc" filepos=N />`.
fn find_toc_offset(text: &[u8]) -> Option<usize> {
    memchr::memmem::find_iter(text, b"<reference").find_map(|start| {
        let len = memchr::memchr(b'>', &text[start..])?;
        let tag = text[start..start + len].to_ascii_lowercase();
        let is_toc = memchr::memmem::find(&tag, b"type=\"toc\"").is_some()
            || memchr::memmem::find(&tag, b"type=toc").is_some();
        if !is_toc {
            return None;
        }
        let targets = filepos::collect_filepos_targets(&tag);
        targets.first().copied()
    })
}

fn collect_text(dom: &ArenaDom, id: ArenaNodeId) -> String {
    dom.descendants(id).filter_map(|node| dom.text(node)).collect()
}

/// A Mobipocket (`BOOKMOBI`) book.
pub struct MobiDoc {
    pdb: PdbReader,
    header: MobiHeader,
    exth: Option<ExthHeader>,
    /// Decompressed text before link rewriting; offsets index into it.
    text: Vec<u8>,
    html: String,
    targets: BTreeSet<usize>,
    toc_offset: Option<usize>,
    images: Mutex<HashMap<usize, Arc<[u8]>>>,
}

impl MobiDoc {
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let pdb = PdbReader::open(source)?;
        if pdb.kind() != PdbKind::Mobipocket {
            return Err(Error::Unsupported(format!("{:?} is not a Mobipocket book", pdb.kind())));
        }
        let record0 = pdb.record(0)?;
        let header = MobiHeader::parse(&record0)?;
        let exth = if header.has_exth() {
            record0
                .get(16 + header.header_length as usize..)
                .and_then(|data| match ExthHeader::parse(data, header.codepage) {
                    Ok(exth) => Some(exth),
                    Err(e) => {
                        log::warn!("ignoring EXTH block: {e}");
                        None
                    }
                })
        } else {
            None
        };

        let text = load_text(&pdb, &header)?;
        let targets = filepos::collect_filepos_targets(&text);
        let rewritten = filepos::rewrite_links(&text, &targets);
        let mut html = String::new();
        if let Some(cover) = exth.as_ref().and_then(|e| e.cover_offset) {
            // images are numbered from 1
            html.push_str(&format!(
                "<p><img src=\"{}{}\" /></p><mbp:pagebreak />",
                filepos::RECINDEX_PREFIX,
                cover + 1
            ));
        }
        html.push_str(&codepage::decode(&rewritten, header.codepage));
        let toc_offset = find_toc_offset(&text);

        log::debug!(
            "opened mobi {:?}: {} link targets, toc at {:?}",
            pdb.name(),
            targets.len(),
            toc_offset
        );
        Ok(Self {
            pdb,
            header,
            exth,
            text,
            html,
            targets,
            toc_offset,
            images: Mutex::new(HashMap::new()),
        })
    }

    /// Raw bytes of the `n`th image (1-based).
    pub fn image(&self, n: usize) -> Option<Arc<[u8]>> {
        let first = self.header.first_image()?;
        let index = (first + n).checked_sub(1)?;
        let mut cache = self.images.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = cache.get(&index) {
            return Some(data.clone());
        }
        let data = self.pdb.record(index).ok()?;
        if !is_image_record(&data) {
            log::debug!("record {index} is not an image");
            return None;
        }
        let data: Arc<[u8]> = Arc::from(data);
        cache.insert(index, data.clone());
        Some(data)
    }

    fn exth_value(&self, get: impl Fn(&ExthHeader) -> Option<&String>) -> Option<String> {
        self.exth
            .as_ref()
            .and_then(get)
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

impl ResourceProvider for MobiDoc {
    fn image_data(&self, src: &str, _page_path: Option<&str>) -> Option<Arc<[u8]>> {
        self.image(filepos::parse_recindex(src)?)
    }
}

impl Document for MobiDoc {
    fn format(&self) -> Format {
        Format::Mobi
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn property(&self, prop: DocumentProperty) -> Option<String> {
        match prop {
            DocumentProperty::Title => self
                .exth_value(|e| e.title.as_ref())
                .or_else(|| (!self.header.title.is_empty()).then(|| self.header.title.clone()))
                .or_else(|| (!self.pdb.name().is_empty()).then(|| self.pdb.name().to_string())),
            DocumentProperty::Author => {
                let authors = &self.exth.as_ref()?.authors;
                (!authors.is_empty()).then(|| authors.join(", "))
            }
            DocumentProperty::Copyright => self.exth_value(|e| e.rights.as_ref()),
            DocumentProperty::Subject => self.exth_value(|e| e.description.as_ref()),
            DocumentProperty::Publisher => self.exth_value(|e| e.publisher.as_ref()),
            DocumentProperty::CreationDate => self.exth_value(|e| e.pub_date.as_ref()),
            DocumentProperty::CreatorApp => self.exth_value(|e| e.creator_software.as_ref()),
            _ => None,
        }
    }

    fn has_toc(&self) -> bool {
        self.toc_offset.is_some()
    }

    /// Walks the links of the guide's TOC page up to the next page break;
    /// `<blockquote>` nesting gives the level.
    fn visit_toc(&self, visitor: &mut dyn TocVisitor) {
        let Some(start) = self.toc_offset.filter(|&o| o < self.text.len()) else {
            return;
        };
        let rest = &self.text[start..];
        let end = memchr::memmem::find(rest, b"<mbp:pagebreak").unwrap_or(rest.len());
        let markup = codepage::decode(&rest[..end], self.header.codepage);
        let dom = dom::parse_html(&markup);

        for id in dom.descendants(dom.document()) {
            if !dom.is_tag(id, "a") {
                continue;
            }
            let Some(pos) = dom.get_attr(id, "filepos").and_then(filepos::parse_filepos) else {
                continue;
            };
            let title = normalize_whitespace(&collect_text(&dom, id));
            if title.is_empty() {
                continue;
            }
            let mut level = 1;
            let mut parent = dom.parent(id);
            while let Some(p) = parent {
                if dom.is_tag(p, "blockquote") {
                    level += 1;
                }
                parent = dom.parent(p);
            }
            visitor.visit(&title, Some(&format!("{ANCHOR_PREFIX}{pos}")), level);
        }
    }

    /// File positions that are not link targets map to the closest
    /// preceding target.
    fn resolve_alias(&self, name: &str) -> Option<String> {
        let pos = filepos::parse_filepos(name)?;
        let target = self.targets.range(..=pos).next_back()?;
        Some(format!("{ANCHOR_PREFIX}{target}"))
    }
}
