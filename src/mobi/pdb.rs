//! Palm database container: a header and a table of record offsets.

use std::sync::Arc;

use crate::container::{PDB_MOBI, PDB_PALMDOC, PDB_TEALDOC};
use crate::error::{Error, Result};
use crate::io::ByteSource;

const PDB_HEADER_LEN: usize = 78;
const RECORD_ENTRY_LEN: usize = 8;

/// Kind of document stored in a PDB file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdbKind {
    Mobipocket,
    PalmDoc,
    TealDoc,
}

impl PdbKind {
    fn from_ident(ident: &[u8]) -> Option<Self> {
        if ident == PDB_MOBI {
            Some(PdbKind::Mobipocket)
        } else if ident.eq_ignore_ascii_case(PDB_PALMDOC) {
            Some(PdbKind::PalmDoc)
        } else if ident == PDB_TEALDOC {
            Some(PdbKind::TealDoc)
        } else {
            None
        }
    }
}

/// Random access to the records of a PDB file.
pub struct PdbReader {
    source: Arc<dyn ByteSource>,
    kind: PdbKind,
    name: String,
    /// Record start offsets, plus the file length as a final sentinel.
    offsets: Vec<u64>,
}

impl PdbReader {
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let head = source.read_prefix(0, PDB_HEADER_LEN)?;
        if head.len() < PDB_HEADER_LEN {
            return Err(Error::bad_format("PDB header too short"));
        }
        let kind = PdbKind::from_ident(&head[60..68]).ok_or_else(|| {
            Error::Unsupported(format!(
                "PDB type {:?}",
                String::from_utf8_lossy(&head[60..68])
            ))
        })?;

        let name_end = memchr::memchr(0, &head[..32]).unwrap_or(32);
        let name = String::from_utf8_lossy(&head[..name_end]).into_owned();

        let count = u16::from_be_bytes([head[76], head[77]]) as usize;
        let table = source
            .read_at(PDB_HEADER_LEN as u64, count * RECORD_ENTRY_LEN)
            .map_err(|_| Error::bad_format("PDB record table truncated"))?;

        let file_len = source.len();
        let mut offsets: Vec<u64> = table
            .chunks_exact(RECORD_ENTRY_LEN)
            .map(|entry| u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as u64)
            .collect();
        offsets.push(file_len);

        for pair in offsets.windows(2) {
            if pair[0] > pair[1] {
                return Err(Error::bad_format(format!(
                    "PDB record offsets out of order ({} > {})",
                    pair[0], pair[1]
                )));
            }
        }

        log::debug!("PDB {name:?}: {kind:?}, {count} records");
        Ok(Self {
            source,
            kind,
            name,
            offsets,
        })
    }

    pub fn kind(&self) -> PdbKind {
        self.kind
    }

    /// Database name from the header.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn record_size(&self, index: usize) -> Option<u64> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        Some(end - start)
    }

    pub fn record(&self, index: usize) -> Result<Vec<u8>> {
        let size = self
            .record_size(index)
            .ok_or_else(|| Error::not_found(format!("PDB record {index}")))?;
        Ok(self.source.read_at(self.offsets[index], size as usize)?)
    }
}

/// Strip the trailing entries the extra-data flags announce from a text
/// record. Bit 0 is the multibyte overlap; higher bits each add a
/// variable-width-sized trailer, read backwards from the end.
pub fn strip_trailing_data(record: &[u8], flags: u16) -> &[u8] {
    if flags == 0 || record.is_empty() {
        return record;
    }

    let mut end = record.len();
    let mut shifted = flags >> 1;
    while shifted != 0 {
        if shifted & 1 != 0 && end > 0 {
            let mut size = 0usize;
            let mut shift = 0;
            let mut pos = end;
            while pos > 0 {
                pos -= 1;
                let byte = record[pos];
                size |= ((byte & 0x7F) as usize) << shift;
                shift += 7;
                // the high bit marks the first byte of the backward varint
                if byte & 0x80 != 0 || shift >= 28 {
                    break;
                }
            }
            if size <= end {
                end -= size;
            }
        }
        shifted >>= 1;
    }

    if flags & 1 != 0 && end > 0 {
        let overlap = (record[end - 1] & 3) as usize + 1;
        if overlap <= end {
            end -= overlap;
        }
    }

    &record[..end]
}

/// Image records are the ones whose leading bytes carry an image signature.
pub fn is_image_record(data: &[u8]) -> bool {
    crate::util::image_dimensions(data).is_some()
        || data.starts_with(&[0xFF, 0xD8, 0xFF])
        || data.starts_with(b"\x89PNG")
        || data.starts_with(b"GIF8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;

    fn pdb(ident: &[u8; 8], records: &[&[u8]]) -> Vec<u8> {
        let mut data = vec![0u8; PDB_HEADER_LEN];
        data[..4].copy_from_slice(b"test");
        data[60..68].copy_from_slice(ident);
        data[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());
        let mut offset = PDB_HEADER_LEN + records.len() * RECORD_ENTRY_LEN + 2;
        for (i, record) in records.iter().enumerate() {
            data.extend_from_slice(&(offset as u32).to_be_bytes());
            data.extend_from_slice(&(i as u32).to_be_bytes());
            offset += record.len();
        }
        data.extend_from_slice(&[0, 0]);
        for record in records {
            data.extend_from_slice(record);
        }
        data
    }

    #[test]
    fn test_records() {
        let data = pdb(b"TEXtREAd", &[b"zero".as_slice(), b"".as_slice(), b"two!".as_slice()]);
        let reader = PdbReader::open(Arc::new(MemorySource::new(data))).unwrap();
        assert_eq!(reader.kind(), PdbKind::PalmDoc);
        assert_eq!(reader.name(), "test");
        assert_eq!(reader.record_count(), 3);
        assert_eq!(reader.record(0).unwrap(), b"zero");
        assert!(reader.record(1).unwrap().is_empty());
        assert_eq!(reader.record(2).unwrap(), b"two!");
        assert!(reader.record(3).is_err());
    }

    #[test]
    fn test_kinds() {
        let open = |ident: &[u8; 8]| {
            PdbReader::open(Arc::new(MemorySource::new(pdb(ident, &[b"x".as_slice()]))))
        };
        assert_eq!(open(b"BOOKMOBI").unwrap().kind(), PdbKind::Mobipocket);
        assert_eq!(open(b"TEXtTlDc").unwrap().kind(), PdbKind::TealDoc);
        assert!(matches!(open(b"DATAPLKR"), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_truncated_header() {
        let source = Arc::new(MemorySource::new(vec![0u8; 40]));
        assert!(matches!(PdbReader::open(source), Err(Error::BadFormat(_))));
    }

    #[test]
    fn test_strip_trailing_data() {
        // a 3-byte trailer (its size varint included), then a 2-byte overlap
        let record = b"text\xE2\x01\x00\x00\x83";
        assert_eq!(strip_trailing_data(record, 0b11), b"text");
        assert_eq!(strip_trailing_data(record, 0), record);
        // overlap only: low bits of the last byte + 1
        assert_eq!(strip_trailing_data(b"abc\x00", 0b1), b"abc");
    }
}
