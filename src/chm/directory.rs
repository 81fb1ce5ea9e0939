//! ITSF file header and ITSP/PMGL directory listing.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::io::ByteSource;

pub const ITSF_MAGIC: &[u8; 4] = b"ITSF";
const ITSP_MAGIC: &[u8; 4] = b"ITSP";
const PMGL_MAGIC: &[u8; 4] = b"PMGL";

/// Length of the ITSF header that precedes the locale id field and the
/// locale id itself.
pub const ITSF_PREFIX_LEN: usize = 24;
const ITSF_V3_LEN: usize = 0x60;
const ITSP_LEN: usize = 0x54;
const PMGL_HEADER_LEN: usize = 0x14;

/// The fixed-size file header.
#[derive(Debug, Clone)]
pub struct ItsfHeader {
    pub version: u32,
    /// Locale of the machine that compiled the file.
    pub lcid: u32,
    pub dir_offset: u64,
    pub dir_len: u64,
    /// Start of section 0 data.
    pub data_offset: u64,
}

impl ItsfHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 0x58 || &data[0..4] != ITSF_MAGIC {
            return Err(Error::bad_format("missing ITSF signature"));
        }
        let version = read_u32(data, 0x04);
        if version != 2 && version != 3 {
            return Err(Error::bad_format(format!("unsupported ITSF version {version}")));
        }
        let lcid = read_u32(data, 0x14);
        let dir_offset = read_u64(data, 0x48);
        let dir_len = read_u64(data, 0x50);
        let data_offset = if version == 3 && data.len() >= ITSF_V3_LEN {
            read_u64(data, 0x58)
        } else {
            dir_offset + dir_len
        };
        Ok(Self {
            version,
            lcid,
            dir_offset,
            dir_len,
            data_offset,
        })
    }

    pub fn read(source: &dyn ByteSource) -> Result<Self> {
        let head = source.read_prefix(0, ITSF_V3_LEN)?;
        Self::parse(&head)
    }
}

/// One object listed in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub section: u64,
    pub offset: u64,
    pub length: u64,
}

impl DirEntry {
    /// Regular content file: slash-rooted, not a directory, not a
    /// `#`/`$` system object.
    pub fn is_normal_file(&self) -> bool {
        let bytes = self.name.as_bytes();
        bytes.first() == Some(&b'/')
            && !self.name.ends_with('/')
            && !matches!(bytes.get(1), Some(b'#') | Some(b'$'))
    }
}

/// All directory entries with a case-insensitive name index.
#[derive(Debug, Default)]
pub struct Directory {
    entries: Vec<DirEntry>,
    by_name: HashMap<String, usize>,
}

impl Directory {
    /// Read every PMGL listing chunk of the directory.
    pub fn read(source: &dyn ByteSource, header: &ItsfHeader) -> Result<Self> {
        let itsp = source.read_at(header.dir_offset, ITSP_LEN)?;
        if &itsp[0..4] != ITSP_MAGIC {
            return Err(Error::bad_format("missing ITSP signature"));
        }
        let itsp_len = read_u32(&itsp, 0x08) as u64;
        let block_len = read_u32(&itsp, 0x10) as usize;
        let num_blocks = read_u32(&itsp, 0x28) as u64;
        if block_len < PMGL_HEADER_LEN {
            return Err(Error::bad_format("invalid directory block length"));
        }
        if itsp_len + num_blocks * block_len as u64 > header.dir_len.max(itsp_len) {
            return Err(Error::bad_format("directory chunks exceed directory length"));
        }

        let mut dir = Directory::default();
        let chunks_start = header.dir_offset + itsp_len;
        for i in 0..num_blocks {
            let chunk = source.read_at(chunks_start + i * block_len as u64, block_len)?;
            if &chunk[0..4] != PMGL_MAGIC {
                // PMGI index chunks only accelerate lookups.
                continue;
            }
            dir.parse_listing_chunk(&chunk)?;
        }
        log::debug!("CHM directory: {} entries", dir.entries.len());
        Ok(dir)
    }

    fn parse_listing_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let free_space = read_u32(chunk, 0x04) as usize;
        let end = chunk.len().saturating_sub(free_space);
        let mut pos = PMGL_HEADER_LEN;

        while pos < end {
            let Some(name_len) = read_encint(chunk, &mut pos) else {
                break;
            };
            let name_end = pos + name_len as usize;
            if name_end > end {
                return Err(Error::bad_format("directory entry name overruns chunk"));
            }
            let name = String::from_utf8_lossy(&chunk[pos..name_end]).into_owned();
            pos = name_end;

            let (Some(section), Some(offset), Some(length)) = (
                read_encint(chunk, &mut pos),
                read_encint(chunk, &mut pos),
                read_encint(chunk, &mut pos),
            ) else {
                return Err(Error::bad_format("truncated directory entry"));
            };
            self.insert(DirEntry {
                name,
                section,
                offset,
                length,
            });
        }
        Ok(())
    }

    fn insert(&mut self, entry: DirEntry) {
        let key = entry.name.to_lowercase();
        self.by_name.entry(key).or_insert(self.entries.len());
        self.entries.push(entry);
    }

    /// Case-insensitive lookup of an exact object name.
    pub fn lookup(&self, name: &str) -> Option<&DirEntry> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }
}

/// Read a variable-length big-endian integer (7 bits per byte, high bit
/// set on all but the last byte).
pub fn read_encint(data: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value: u64 = 0;
    for _ in 0..10 {
        let byte = *data.get(*pos)?;
        *pos += 1;
        value = (value << 7) | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

pub(crate) fn read_u32(data: &[u8], pos: usize) -> u32 {
    data.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0)
}

pub(crate) fn read_u16(data: &[u8], pos: usize) -> u16 {
    data.get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .unwrap_or(0)
}

pub(crate) fn read_u64(data: &[u8], pos: usize) -> u64 {
    data.get(pos..pos + 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_encint() {
        let data = [0x05, 0x81, 0x00, 0xFF, 0x7F];
        let mut pos = 0;
        assert_eq!(read_encint(&data, &mut pos), Some(5));
        assert_eq!(read_encint(&data, &mut pos), Some(128));
        assert_eq!(read_encint(&data, &mut pos), Some(0x3FFF));
        assert_eq!(pos, 5);
        assert_eq!(read_encint(&[0x80], &mut 0), None);
    }

    #[test]
    fn test_itsf_header_rejects_bad_magic() {
        let mut data = vec![0u8; 0x60];
        data[0..4].copy_from_slice(b"ITSX");
        assert!(matches!(ItsfHeader::parse(&data), Err(Error::BadFormat(_))));
    }

    #[test]
    fn test_itsf_v2_data_offset() {
        let mut data = vec![0u8; 0x58];
        data[0..4].copy_from_slice(ITSF_MAGIC);
        data[4..8].copy_from_slice(&2u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1049u32.to_le_bytes());
        data[0x48..0x50].copy_from_slice(&0x60u64.to_le_bytes());
        data[0x50..0x58].copy_from_slice(&0x100u64.to_le_bytes());
        let header = ItsfHeader::parse(&data).unwrap();
        assert_eq!(header.lcid, 1049);
        assert_eq!(header.data_offset, 0x160);
    }

    #[test]
    fn test_listing_chunk_and_lookup() {
        let mut chunk = vec![0u8; 0x200];
        chunk[0..4].copy_from_slice(PMGL_MAGIC);
        let mut pos = PMGL_HEADER_LEN;
        for (name, off, len) in [("/Index.HTM", 0u8, 10u8), ("/#SYSTEM", 10, 4)] {
            chunk[pos] = name.len() as u8;
            pos += 1;
            chunk[pos..pos + name.len()].copy_from_slice(name.as_bytes());
            pos += name.len();
            chunk[pos] = 0;
            chunk[pos + 1] = off;
            chunk[pos + 2] = len;
            pos += 3;
        }
        let free = (chunk.len() - pos) as u32;
        chunk[4..8].copy_from_slice(&free.to_le_bytes());

        let mut dir = Directory::default();
        dir.parse_listing_chunk(&chunk).unwrap();
        let entry = dir.lookup("/index.htm").unwrap();
        assert_eq!(entry.length, 10);
        assert!(entry.is_normal_file());
        assert!(!dir.lookup("/#system").unwrap().is_normal_file());
        assert!(dir.lookup("/missing.htm").is_none());
    }
}
