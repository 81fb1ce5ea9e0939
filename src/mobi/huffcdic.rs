//! HUFF/CDIC decompression for Mobipocket text records.
//!
//! The HUFF record holds the code tables, the CDIC records the phrase
//! dictionary. Dictionary entries may themselves be compressed and are
//! expanded on first use.

use crate::error::{Error, Result};

/// A CDIC phrase; compressed phrases are replaced by their expansion on
/// first use.
#[derive(Clone)]
enum Phrase {
    Literal(Vec<u8>),
    Packed(Vec<u8>),
    Expanded(Vec<u8>),
}

/// Decoder state shared by all text records of a file.
pub struct HuffCdicReader {
    /// (code length, terminal, max code) keyed by the top 8 bits of a code
    dict1: Vec<(u8, bool, u32)>,
    /// min/max codes per code length 0..=32
    mincode: Vec<u32>,
    maxcode: Vec<u32>,
    phrases: Vec<Phrase>,
}

fn field(data: &[u8], pos: usize) -> u32 {
    super::headers::be_u32(data, pos).unwrap_or(0)
}

impl HuffCdicReader {
    /// Build the decoder from the HUFF record and its CDIC records.
    pub fn new(huff: &[u8], cdics: &[&[u8]]) -> Result<Self> {
        let mut reader = Self {
            dict1: Vec::with_capacity(256),
            mincode: Vec::with_capacity(33),
            maxcode: Vec::with_capacity(33),
            phrases: Vec::new(),
        };
        reader.load_huff(huff)?;
        for cdic in cdics {
            reader.load_cdic(cdic)?;
        }
        Ok(reader)
    }

    fn load_huff(&mut self, huff: &[u8]) -> Result<()> {
        if huff.len() < 24 || &huff[0..8] != b"HUFF\x00\x00\x00\x18" {
            return Err(Error::bad_format("invalid HUFF header"));
        }
        let off1 = field(huff, 8) as usize;
        let off2 = field(huff, 12) as usize;
        if huff.len() < off1 + 256 * 4 || huff.len() < off2 + 32 * 8 {
            return Err(Error::bad_format("HUFF tables truncated"));
        }

        for i in 0..256 {
            let v = field(huff, off1 + i * 4);
            let codelen = (v & 0x1f) as u8;
            let term = v & 0x80 != 0;
            let maxcode = if codelen > 0 {
                ((v >> 8).wrapping_add(1) << (32 - u32::from(codelen))).wrapping_sub(1)
            } else {
                0
            };
            self.dict1.push((codelen, term, maxcode));
        }

        self.mincode.push(0);
        self.maxcode.push(0);
        for codelen in 1..=32u32 {
            let pos = off2 + (codelen as usize - 1) * 8;
            self.mincode.push(field(huff, pos) << (32 - codelen));
            self.maxcode
                .push((field(huff, pos + 4).wrapping_add(1) << (32 - codelen)).wrapping_sub(1));
        }
        Ok(())
    }

    fn load_cdic(&mut self, cdic: &[u8]) -> Result<()> {
        if cdic.len() < 16 || &cdic[0..8] != b"CDIC\x00\x00\x00\x10" {
            return Err(Error::bad_format("invalid CDIC header"));
        }
        let total = field(cdic, 8) as usize;
        let bits = field(cdic, 12).min(16);
        let count = (1usize << bits).min(total.saturating_sub(self.phrases.len()));
        if cdic.len() < 16 + count * 2 {
            return Err(Error::bad_format("CDIC offset table truncated"));
        }

        for i in 0..count {
            let off = 16 + u16::from_be_bytes([cdic[16 + i * 2], cdic[17 + i * 2]]) as usize;
            let Some(len_bytes) = cdic.get(off..off + 2) else {
                return Err(Error::bad_format("CDIC entry truncated"));
            };
            let blen = u16::from_be_bytes([len_bytes[0], len_bytes[1]]);
            let start = off + 2;
            let end = (start + (blen & 0x7fff) as usize).min(cdic.len());
            let bytes = cdic[start..end].to_vec();
            self.phrases.push(if blen & 0x8000 != 0 {
                Phrase::Literal(bytes)
            } else {
                Phrase::Packed(bytes)
            });
        }
        Ok(())
    }

    /// Decompress one text record.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        self.unpack_into(data, &mut result, 0)?;
        Ok(result)
    }

    fn unpack_into(&mut self, data: &[u8], output: &mut Vec<u8>, depth: usize) -> Result<()> {
        if depth > 32 {
            return Err(Error::bad_format("HUFF phrase nesting too deep"));
        }
        let mut bits_left = data.len() as i64 * 8;
        let mut padded = data.to_vec();
        padded.extend_from_slice(&[0u8; 8]);

        let mut pos = 0usize;
        let mut x = read_u64_be(&padded, pos);
        let mut n: i32 = 32;

        while bits_left > 0 {
            if n <= 0 {
                pos += 4;
                x = read_u64_be(&padded, pos);
                n += 32;
            }
            let code = ((x >> n) & 0xFFFFFFFF) as u32;

            let (mut codelen, term, mut maxcode) = self.dict1[(code >> 24) as usize];
            if !term {
                while codelen < 32 && code < self.mincode[codelen as usize] {
                    codelen += 1;
                }
                maxcode = self.maxcode[codelen as usize];
            }
            if codelen == 0 {
                return Err(Error::bad_format("zero-length HUFF code"));
            }

            n -= i32::from(codelen);
            bits_left -= i64::from(codelen);
            if bits_left < 0 {
                break;
            }

            let r = (maxcode.wrapping_sub(code) >> (32 - u32::from(codelen))) as usize;
            let Some(phrase) = self.phrases.get(r) else {
                return Err(Error::BadFormat(format!(
                    "phrase index {r} out of bounds (len {})",
                    self.phrases.len()
                )));
            };
            match phrase {
                Phrase::Literal(bytes) | Phrase::Expanded(bytes) => {
                    output.extend_from_slice(bytes);
                }
                Phrase::Packed(bytes) => {
                    let packed = bytes.clone();
                    let mut expanded = Vec::new();
                    self.unpack_into(&packed, &mut expanded, depth + 1)?;
                    output.extend_from_slice(&expanded);
                    self.phrases[r] = Phrase::Expanded(expanded);
                }
            }
        }
        Ok(())
    }
}

fn read_u64_be(data: &[u8], pos: usize) -> u64 {
    data.get(pos..pos + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_headers() {
        assert!(HuffCdicReader::new(b"HUFF", &[]).is_err());
        let cdic: &[u8] = b"CDIC";
        assert!(HuffCdicReader::new(&huff_record(), &[cdic]).is_err());
    }

    /// A table where every byte value is a terminal 8-bit code.
    fn huff_record() -> Vec<u8> {
        let mut huff = b"HUFF\x00\x00\x00\x18".to_vec();
        huff.extend_from_slice(&24u32.to_be_bytes());
        huff.extend_from_slice(&(24u32 + 1024).to_be_bytes());
        huff.extend_from_slice(&[0u8; 8]);
        for _ in 0..256u32 {
            // codelen 8, terminal, maxcode 255
            huff.extend_from_slice(&((255u32 << 8) | 0x80 | 8).to_be_bytes());
        }
        huff.extend_from_slice(&[0u8; 256]);
        huff
    }

    fn cdic_record(phrases: &[&[u8]]) -> Vec<u8> {
        let mut cdic = b"CDIC\x00\x00\x00\x10".to_vec();
        cdic.extend_from_slice(&(phrases.len() as u32).to_be_bytes());
        cdic.extend_from_slice(&8u32.to_be_bytes());
        let mut body = Vec::new();
        let table_len = phrases.len() * 2;
        for phrase in phrases {
            cdic.extend_from_slice(&((table_len + body.len()) as u16).to_be_bytes());
            body.extend_from_slice(&(0x8000u16 | phrase.len() as u16).to_be_bytes());
            body.extend_from_slice(phrase);
        }
        cdic.extend_from_slice(&body);
        cdic
    }

    #[test]
    fn test_decode_leaf_phrases() {
        // code byte b maps to dictionary entry 255 - b
        let mut phrases: Vec<&[u8]> = vec![b"?".as_slice(); 256];
        phrases[255] = b"Hello";
        phrases[254] = b", world";
        let cdic = cdic_record(&phrases);
        let mut reader = HuffCdicReader::new(&huff_record(), &[&cdic]).unwrap();
        assert_eq!(reader.decompress(&[0x00, 0x01]).unwrap(), b"Hello, world");
    }

    #[test]
    fn test_read_u64_be() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(read_u64_be(&data, 0), 1);

        let data2 = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(read_u64_be(&data2, 0), 0x0100000000000000);
    }
}
