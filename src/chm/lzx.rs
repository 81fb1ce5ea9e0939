//! LZX decoder for the `MSCompressed` content section.
//!
//! Each call to [`LzxDecoder::decompress`] consumes one reset-table block
//! and produces one frame of output. Window contents, repeated offsets and
//! tree lengths persist across calls until [`LzxDecoder::reset`].

use crate::error::{Error, Result};

const NUM_CHARS: usize = 256;
const MIN_MATCH: usize = 2;
const NUM_PRIMARY_LENGTHS: usize = 7;
const NUM_SECONDARY_LENGTHS: usize = 249;
const PRETREE_SYMBOLS: usize = 20;
const ALIGNED_SYMBOLS: usize = 8;
const MAINTREE_MAX_SYMBOLS: usize = NUM_CHARS + 50 * 8;
const LENTABLE_SAFETY: usize = 64;
const MAX_CODE_LEN: usize = 16;

const BLOCKTYPE_INVALID: u8 = 0;
const BLOCKTYPE_VERBATIM: u8 = 1;
const BLOCKTYPE_ALIGNED: u8 = 2;
const BLOCKTYPE_UNCOMPRESSED: u8 = 3;

const fn build_extra_bits() -> [u8; 52] {
    let mut table = [0u8; 52];
    let mut i = 0;
    let mut j = 0u8;
    while i <= 50 {
        table[i] = j;
        table[i + 1] = j;
        if i != 0 && j < 17 {
            j += 1;
        }
        i += 2;
    }
    table
}

const EXTRA_BITS: [u8; 52] = build_extra_bits();

const fn build_position_base() -> [u32; 51] {
    let mut table = [0u32; 51];
    let mut i = 0;
    let mut j = 0u32;
    while i <= 50 {
        table[i] = j;
        j += 1 << EXTRA_BITS[i];
        i += 1;
    }
    table
}

const POSITION_BASE: [u32; 51] = build_position_base();

fn position_slots(window_bits: u32) -> Option<usize> {
    Some(match window_bits {
        15 => 30,
        16 => 32,
        17 => 34,
        18 => 36,
        19 => 38,
        20 => 42,
        21 => 50,
        _ => return None,
    })
}

/// MSB-first reader over 16-bit little-endian words. Reads past the end
/// yield zero bits; callers check `pos` against the input length.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buf: u32,
    left: i32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buf: 0,
            left: 0,
        }
    }

    fn byte(&self, at: usize) -> u32 {
        self.data.get(at).copied().unwrap_or(0) as u32
    }

    fn ensure(&mut self, n: i32) {
        while self.left < n {
            let word = (self.byte(self.pos + 1) << 8) | self.byte(self.pos);
            self.buf |= word << (16 - self.left);
            self.left += 16;
            self.pos += 2;
        }
    }

    fn peek(&self, n: u32) -> u32 {
        if n == 0 { 0 } else { self.buf >> (32 - n) }
    }

    fn remove(&mut self, n: u32) {
        self.buf = if n >= 32 { 0 } else { self.buf << n };
        self.left -= n as i32;
    }

    fn read(&mut self, n: u32) -> u32 {
        self.ensure(n as i32);
        let v = self.peek(n);
        self.remove(n);
        v
    }

    fn reinit(&mut self) {
        self.buf = 0;
        self.left = 0;
    }

    fn read_u32_le(&mut self) -> u32 {
        let v = u32::from_le_bytes([
            self.byte(self.pos) as u8,
            self.byte(self.pos + 1) as u8,
            self.byte(self.pos + 2) as u8,
            self.byte(self.pos + 3) as u8,
        ]);
        self.pos += 4;
        v
    }
}

/// Canonical Huffman code decoded by length counts.
#[derive(Default)]
struct Huffman {
    counts: [u16; MAX_CODE_LEN + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    fn build(lens: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        for &len in lens {
            if len as usize > MAX_CODE_LEN {
                return Err(Error::bad_format("LZX code length out of range"));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(Error::bad_format("over-subscribed LZX Huffman table"));
            }
        }

        let mut offsets = [0u16; MAX_CODE_LEN + 2];
        for len in 1..=MAX_CODE_LEN {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; offsets[MAX_CODE_LEN + 1] as usize];
        for (sym, &len) in lens.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = sym as u16;
                offsets[len as usize] += 1;
            }
        }
        Ok(Self { counts, symbols })
    }

    fn decode(&self, br: &mut BitReader<'_>) -> Result<usize> {
        br.ensure(16);
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_CODE_LEN {
            code |= ((br.buf >> (32 - len)) & 1) as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                br.remove(len as u32);
                return Ok(self.symbols[(index + code - first) as usize] as usize);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(Error::bad_format("invalid LZX Huffman code"))
    }
}

pub struct LzxDecoder {
    window: Vec<u8>,
    window_size: u32,
    window_posn: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    main_elements: usize,
    header_read: bool,
    frames_read: u32,
    block_remaining: u32,
    block_length: u32,
    block_type: u8,
    intel_filesize: i32,
    intel_curpos: i32,
    intel_started: bool,
    main_lens: Vec<u8>,
    length_lens: Vec<u8>,
    aligned_lens: [u8; ALIGNED_SYMBOLS],
    main_tree: Huffman,
    length_tree: Huffman,
    aligned_tree: Huffman,
}

impl LzxDecoder {
    pub fn new(window_bits: u32) -> Result<Self> {
        let slots = position_slots(window_bits)
            .ok_or_else(|| Error::bad_format(format!("unsupported LZX window {window_bits}")))?;
        let window_size = 1u32 << window_bits;
        let mut decoder = Self {
            window: vec![0; window_size as usize],
            window_size,
            window_posn: 0,
            r0: 1,
            r1: 1,
            r2: 1,
            main_elements: NUM_CHARS + slots * 8,
            header_read: false,
            frames_read: 0,
            block_remaining: 0,
            block_length: 0,
            block_type: BLOCKTYPE_INVALID,
            intel_filesize: 0,
            intel_curpos: 0,
            intel_started: false,
            main_lens: vec![0; MAINTREE_MAX_SYMBOLS + LENTABLE_SAFETY],
            length_lens: vec![0; NUM_SECONDARY_LENGTHS + LENTABLE_SAFETY],
            aligned_lens: [0; ALIGNED_SYMBOLS],
            main_tree: Huffman::default(),
            length_tree: Huffman::default(),
            aligned_tree: Huffman::default(),
        };
        decoder.reset();
        Ok(decoder)
    }

    /// Forget all history; the next frame starts a fresh stream.
    pub fn reset(&mut self) {
        self.r0 = 1;
        self.r1 = 1;
        self.r2 = 1;
        self.header_read = false;
        self.frames_read = 0;
        self.block_remaining = 0;
        self.block_type = BLOCKTYPE_INVALID;
        self.intel_curpos = 0;
        self.intel_started = false;
        self.window_posn = 0;
        self.main_lens.fill(0);
        self.length_lens.fill(0);
    }

    fn read_lengths(
        br: &mut BitReader<'_>,
        lens: &mut [u8],
        first: usize,
        last: usize,
    ) -> Result<()> {
        let mut pre_lens = [0u8; PRETREE_SYMBOLS];
        for len in pre_lens.iter_mut() {
            *len = br.read(4) as u8;
        }
        let pretree = Huffman::build(&pre_lens)?;

        let mut x = first;
        let put = |lens: &mut [u8], x: &mut usize, v: u8| {
            if let Some(slot) = lens.get_mut(*x) {
                *slot = v;
            }
            *x += 1;
        };
        while x < last {
            let z = pretree.decode(br)?;
            match z {
                17 => {
                    let run = br.read(4) + 4;
                    for _ in 0..run {
                        put(lens, &mut x, 0);
                    }
                }
                18 => {
                    let run = br.read(5) + 20;
                    for _ in 0..run {
                        put(lens, &mut x, 0);
                    }
                }
                19 => {
                    let run = br.read(1) + 4;
                    let z = pretree.decode(br)? as i32;
                    let prev = lens.get(x).copied().unwrap_or(0) as i32;
                    let v = (prev - z).rem_euclid(17) as u8;
                    for _ in 0..run {
                        put(lens, &mut x, v);
                    }
                }
                _ => {
                    let prev = lens.get(x).copied().unwrap_or(0) as i32;
                    let v = (prev - z as i32).rem_euclid(17) as u8;
                    put(lens, &mut x, v);
                }
            }
        }
        Ok(())
    }

    fn read_block_header(&mut self, br: &mut BitReader<'_>) -> Result<()> {
        if self.block_type == BLOCKTYPE_UNCOMPRESSED {
            if self.block_length & 1 == 1 {
                br.pos += 1;
            }
            br.reinit();
        }

        self.block_type = br.read(3) as u8;
        let hi = br.read(16);
        let lo = br.read(8);
        self.block_length = (hi << 8) | lo;
        self.block_remaining = self.block_length;

        match self.block_type {
            BLOCKTYPE_ALIGNED | BLOCKTYPE_VERBATIM => {
                if self.block_type == BLOCKTYPE_ALIGNED {
                    for i in 0..ALIGNED_SYMBOLS {
                        self.aligned_lens[i] = br.read(3) as u8;
                    }
                    self.aligned_tree = Huffman::build(&self.aligned_lens)?;
                }
                Self::read_lengths(br, &mut self.main_lens, 0, NUM_CHARS)?;
                Self::read_lengths(br, &mut self.main_lens, NUM_CHARS, self.main_elements)?;
                self.main_tree = Huffman::build(&self.main_lens[..self.main_elements])?;
                if self.main_lens[0xE8] != 0 {
                    self.intel_started = true;
                }
                Self::read_lengths(br, &mut self.length_lens, 0, NUM_SECONDARY_LENGTHS)?;
                self.length_tree = Huffman::build(&self.length_lens[..NUM_SECONDARY_LENGTHS])?;
            }
            BLOCKTYPE_UNCOMPRESSED => {
                self.intel_started = true;
                br.ensure(16);
                if br.left > 16 {
                    br.pos -= 2;
                }
                self.r0 = br.read_u32_le();
                self.r1 = br.read_u32_le();
                self.r2 = br.read_u32_le();
            }
            other => {
                return Err(Error::bad_format(format!("invalid LZX block type {other}")));
            }
        }
        Ok(())
    }

    fn decode_match_offset(&mut self, br: &mut BitReader<'_>, slot: usize) -> Result<u32> {
        let offset = if slot > 2 {
            let offset = if self.block_type == BLOCKTYPE_ALIGNED {
                let mut extra = EXTRA_BITS[slot] as u32;
                let mut offset = POSITION_BASE[slot].wrapping_sub(2);
                if extra > 3 {
                    extra -= 3;
                    offset += br.read(extra) << 3;
                    offset += self.aligned_tree.decode(br)? as u32;
                } else if extra == 3 {
                    offset += self.aligned_tree.decode(br)? as u32;
                } else if extra > 0 {
                    offset += br.read(extra);
                } else {
                    offset = 1;
                }
                offset
            } else if slot != 3 {
                let extra = EXTRA_BITS[slot] as u32;
                POSITION_BASE[slot] - 2 + br.read(extra)
            } else {
                1
            };
            self.r2 = self.r1;
            self.r1 = self.r0;
            self.r0 = offset;
            offset
        } else if slot == 0 {
            self.r0
        } else if slot == 1 {
            let offset = self.r1;
            self.r1 = self.r0;
            self.r0 = offset;
            offset
        } else {
            let offset = self.r2;
            self.r2 = self.r0;
            self.r0 = offset;
            offset
        };
        Ok(offset)
    }

    fn decode_run(&mut self, br: &mut BitReader<'_>, mut run: i64) -> Result<()> {
        let mask = self.window_size - 1;
        while run > 0 {
            let main = self.main_tree.decode(br)?;
            if main < NUM_CHARS {
                self.window[self.window_posn as usize] = main as u8;
                self.window_posn += 1;
                run -= 1;
                continue;
            }

            let main = main - NUM_CHARS;
            let mut match_length = main & NUM_PRIMARY_LENGTHS;
            if match_length == NUM_PRIMARY_LENGTHS {
                match_length += self.length_tree.decode(br)?;
            }
            match_length += MIN_MATCH;
            let match_offset = self.decode_match_offset(br, main >> 3)?;
            if match_offset == 0 || match_offset > self.window_size {
                return Err(Error::bad_format("LZX match offset out of range"));
            }

            run -= match_length as i64;
            if self.window_posn as usize + match_length > self.window_size as usize {
                return Err(Error::bad_format("LZX match overruns window"));
            }
            for _ in 0..match_length {
                let src = self.window_posn.wrapping_sub(match_offset) & mask;
                self.window[self.window_posn as usize] = self.window[src as usize];
                self.window_posn += 1;
            }
        }
        Ok(())
    }

    /// Decode one frame of `out_len` bytes from `input`.
    pub fn decompress(&mut self, input: &[u8], out_len: usize) -> Result<Vec<u8>> {
        let mut br = BitReader::new(input);

        if !self.header_read {
            let mut filesize = 0u32;
            if br.read(1) == 1 {
                let hi = br.read(16);
                let lo = br.read(16);
                filesize = (hi << 16) | lo;
            }
            self.intel_filesize = filesize as i32;
            self.header_read = true;
        }

        let mut togo = out_len as i64;
        while togo > 0 {
            if self.block_remaining == 0 {
                self.read_block_header(&mut br)?;
            }

            if br.pos > input.len() && (br.pos > input.len() + 2 || br.left < 16) {
                return Err(Error::bad_format("LZX input exhausted"));
            }

            while self.block_remaining > 0 && togo > 0 {
                let this_run = (self.block_remaining as i64).min(togo);
                togo -= this_run;
                self.block_remaining -= this_run as u32;

                self.window_posn &= self.window_size - 1;
                if self.window_posn as i64 + this_run > self.window_size as i64 {
                    return Err(Error::bad_format("LZX run straddles window end"));
                }

                match self.block_type {
                    BLOCKTYPE_VERBATIM | BLOCKTYPE_ALIGNED => self.decode_run(&mut br, this_run)?,
                    BLOCKTYPE_UNCOMPRESSED => {
                        let n = this_run as usize;
                        let src = input
                            .get(br.pos..br.pos + n)
                            .ok_or_else(|| Error::bad_format("truncated uncompressed LZX block"))?;
                        let dst = self.window_posn as usize;
                        self.window[dst..dst + n].copy_from_slice(src);
                        br.pos += n;
                        self.window_posn += n as u32;
                    }
                    _ => return Err(Error::bad_format("LZX data without block header")),
                }
            }
        }
        if togo != 0 {
            return Err(Error::bad_format("LZX frame length mismatch"));
        }

        let end = if self.window_posn == 0 {
            self.window_size as usize
        } else {
            self.window_posn as usize
        };
        let start = end
            .checked_sub(out_len)
            .ok_or_else(|| Error::bad_format("LZX frame larger than window position"))?;
        let mut out = self.window[start..end].to_vec();

        self.translate_e8(&mut out);
        Ok(out)
    }

    /// Undo the x86 CALL target translation applied by the compressor.
    fn translate_e8(&mut self, out: &mut [u8]) {
        let frames_read = self.frames_read;
        self.frames_read += 1;
        if frames_read >= 32768 || self.intel_filesize == 0 {
            return;
        }
        let out_len = out.len() as i32;
        if out.len() <= 6 || !self.intel_started {
            self.intel_curpos += out_len;
            return;
        }

        let mut curpos = self.intel_curpos;
        let filesize = self.intel_filesize;
        self.intel_curpos = curpos + out_len;

        let end = out.len().saturating_sub(10);
        let mut i = 0;
        while i < end {
            let byte = out[i];
            i += 1;
            if byte != 0xE8 {
                curpos += 1;
                continue;
            }
            let abs = i32::from_le_bytes([out[i], out[i + 1], out[i + 2], out[i + 3]]);
            if abs >= -curpos && abs < filesize {
                let rel = if abs >= 0 { abs - curpos } else { abs + filesize };
                out[i..i + 4].copy_from_slice(&rel.to_le_bytes());
            }
            i += 4;
            curpos += 5;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// An LZX stream holding one uncompressed block.
    pub(crate) fn uncompressed_stream(payload: &[u8]) -> Vec<u8> {
        let size = payload.len() as u32;
        assert!(size < 1 << 24);
        // 1 bit E8 flag (off), 3 bits type, 24 bits size, 4 pad bits
        let bits: u32 = (BLOCKTYPE_UNCOMPRESSED as u32) << 28 | size << 4;
        let hi = (bits >> 16) as u16;
        let lo = bits as u16;
        let mut out = Vec::new();
        out.extend_from_slice(&hi.to_le_bytes());
        out.extend_from_slice(&lo.to_le_bytes());
        for _ in 0..3 {
            out.extend_from_slice(&1u32.to_le_bytes());
        }
        out.extend_from_slice(payload);
        if size & 1 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn test_tables() {
        assert_eq!(EXTRA_BITS[0..6], [0, 0, 0, 0, 1, 1]);
        assert_eq!(EXTRA_BITS[36], 17);
        assert_eq!(POSITION_BASE[0..6], [0, 1, 2, 3, 4, 6]);
    }

    #[test]
    fn test_uncompressed_block() {
        let payload = b"<html><body>Hello LZX</body></html>";
        let stream = uncompressed_stream(payload);
        let mut decoder = LzxDecoder::new(16).unwrap();
        let out = decoder.decompress(&stream, payload.len()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_uncompressed_block_split_across_frames() {
        let payload: Vec<u8> = (0..64u8).collect();
        let stream = uncompressed_stream(&payload);
        let mut decoder = LzxDecoder::new(15).unwrap();
        // header (4) + repeated offsets (12) + first 32 payload bytes
        let first = decoder.decompress(&stream[..48], 32).unwrap();
        let second = decoder.decompress(&stream[48..], 32).unwrap();
        assert_eq!(first, payload[..32]);
        assert_eq!(second, payload[32..]);
    }

    #[test]
    fn test_rejects_bad_window() {
        assert!(LzxDecoder::new(12).is_err());
    }

    #[test]
    fn test_huffman_decode() {
        // a=0, b=10, c=11
        let table = Huffman::build(&[1, 2, 2]).unwrap();
        let data = [0b0000_0000, 0b1011_0000];
        let mut br = BitReader::new(&data);
        assert_eq!(table.decode(&mut br).unwrap(), 1);
        assert_eq!(table.decode(&mut br).unwrap(), 2);
        assert_eq!(table.decode(&mut br).unwrap(), 0);
    }
}
