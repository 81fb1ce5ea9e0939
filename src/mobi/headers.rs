//! Mobipocket record-0 header and EXTH metadata.

use crate::codepage::{self, CP_UTF8, CP_WINDOWS_1252 as CP_1252};
use crate::error::{Error, Result};

pub const NULL_INDEX: u32 = 0xFFFFFFFF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    None,
    PalmDoc,
    Huffman,
    Unknown(u16),
}

impl Compression {
    fn from_u16(value: u16) -> Self {
        match value {
            1 => Compression::None,
            2 => Compression::PalmDoc,
            0x4448 => Compression::Huffman, // "DH"
            n => Compression::Unknown(n),
        }
    }
}

fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Record 0: the PalmDoc header, optionally followed by a MOBI header.
#[derive(Debug, Clone)]
pub struct MobiHeader {
    pub compression: Compression,
    pub text_length: u32,
    pub text_record_count: u16,
    pub text_record_size: u16,
    pub encryption: u16,
    /// Codepage of the text records: 1252 or 65001.
    pub codepage: u32,
    pub first_image_index: u32,
    pub title: String,
    pub exth_flags: u32,
    pub extra_data_flags: u16,
    pub huff_record_index: u32,
    pub huff_record_count: u32,
    /// Length of the MOBI header; 0 for plain PalmDoc records.
    pub header_length: u32,
}

impl MobiHeader {
    /// Parse record 0. Files without a `MOBI` block (PalmDoc, TealDoc)
    /// only carry the first 16 bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(Error::bad_format("record 0 too short"));
        }
        let field16 = |pos| be_u16(data, pos).unwrap_or(0);

        let mut header = Self {
            compression: Compression::from_u16(field16(0)),
            text_length: be_u32(data, 4).unwrap_or(0),
            text_record_count: field16(8),
            text_record_size: field16(10),
            encryption: field16(12),
            codepage: CP_1252,
            first_image_index: NULL_INDEX,
            title: String::new(),
            exth_flags: 0,
            extra_data_flags: 0,
            huff_record_index: NULL_INDEX,
            huff_record_count: 0,
            header_length: 0,
        };

        if data.get(16..20) != Some(b"MOBI".as_slice()) {
            return Ok(header);
        }

        let field32 = |pos, default| be_u32(data, pos).unwrap_or(default);
        header.header_length = field32(20, 0);
        header.codepage = match field32(28, CP_1252) {
            CP_UTF8 => CP_UTF8,
            CP_1252 => CP_1252,
            other => {
                log::warn!("unsupported mobi codepage {other}, assuming 1252");
                CP_1252
            }
        };

        let title_offset = field32(0x54, 0) as usize;
        let title_length = field32(0x58, 0) as usize;
        if let Some(raw) = data.get(title_offset..title_offset.saturating_add(title_length)) {
            header.title = codepage::decode(raw, header.codepage).trim().to_string();
        }

        header.first_image_index = field32(0x6C, NULL_INDEX);
        header.huff_record_index = field32(0x70, NULL_INDEX);
        header.huff_record_count = field32(0x74, 0);
        header.exth_flags = field32(0x80, 0);
        if header.header_length >= 0xE4 {
            header.extra_data_flags = be_u16(data, 0xF2).unwrap_or(0);
        }
        Ok(header)
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & 0x40 != 0
    }

    /// Index of the first image record, if the file has images.
    pub fn first_image(&self) -> Option<usize> {
        (self.first_image_index != NULL_INDEX && self.first_image_index != 0)
            .then_some(self.first_image_index as usize)
    }
}

/// Extended metadata records.
#[derive(Debug, Default)]
pub struct ExthHeader {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub rights: Option<String>,
    pub creator_software: Option<String>,
    /// Cover image, relative to the first image record.
    pub cover_offset: Option<u32>,
}

impl ExthHeader {
    pub fn parse(data: &[u8], codepage: u32) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::bad_format("EXTH header too short"));
        }
        if &data[0..4] != b"EXTH" {
            return Err(Error::bad_format("invalid EXTH signature"));
        }
        let record_count = be_u32(data, 8).unwrap_or(0);

        let mut exth = ExthHeader::default();
        let mut pos = 12;
        let decode = |bytes: &[u8]| codepage::decode(bytes, codepage).trim().to_string();

        for _ in 0..record_count {
            let (Some(record_type), Some(record_len)) = (be_u32(data, pos), be_u32(data, pos + 4))
            else {
                break;
            };
            let record_len = record_len as usize;
            if record_len < 8 || pos + record_len > data.len() {
                break;
            }
            let content = &data[pos + 8..pos + record_len];

            match record_type {
                100 => exth.authors.push(decode(content)),
                101 => exth.publisher = Some(decode(content)),
                103 => exth.description = Some(decode(content)),
                106 => exth.pub_date = Some(decode(content)),
                109 => exth.rights = Some(decode(content)),
                108 => exth.creator_software = Some(decode(content)),
                201 => {
                    exth.cover_offset = be_u32(content, 0).filter(|&v| v != NULL_INDEX);
                }
                503 => exth.title = Some(decode(content)),
                _ => {}
            }
            pos += record_len;
        }

        exth.authors.retain(|a| !a.is_empty());
        Ok(exth)
    }
}
