//! Content sections: stored section 0 and LZX-compressed section 1.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::directory::{DirEntry, Directory, read_u32, read_u64};
use super::lzx::LzxDecoder;
use crate::error::{Error, Result};
use crate::io::ByteSource;

const CONTENT_PATH: &str = "::DataSpace/Storage/MSCompressed/Content";
const CONTROL_DATA_PATH: &str = "::DataSpace/Storage/MSCompressed/ControlData";
const RESET_TABLE_PATH: &str = "::DataSpace/Storage/MSCompressed/Transform/\
    {7FC28940-9D31-11D0-9B27-00A0C91E9C7C}/InstanceData/ResetTable";

const LZXC_MAGIC: &[u8; 4] = b"LZXC";
const RESET_TABLE_HEADER_LEN: usize = 0x28;
/// Decompressed blocks kept around for nearby reads.
const BLOCK_CACHE_SIZE: usize = 5;
/// Compressed blocks may exceed the frame length by at most this much.
const MAX_BLOCK_OVERHEAD: u64 = 6144;

/// LZXC control data.
#[derive(Debug, Clone, Copy)]
struct ControlData {
    reset_interval: u64,
    window_size: u64,
    windows_per_reset: u64,
}

impl ControlData {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 0x18 || &data[4..8] != LZXC_MAGIC {
            return Err(Error::bad_format("missing LZXC control data"));
        }
        let version = read_u32(data, 0x08);
        let mut reset_interval = read_u32(data, 0x0C) as u64;
        let mut window_size = read_u32(data, 0x10) as u64;
        let windows_per_reset = read_u32(data, 0x14) as u64;
        if version == 2 {
            reset_interval *= 0x8000;
            window_size *= 0x8000;
        }
        if window_size < 2
            || reset_interval == 0
            || !window_size.is_power_of_two()
            || reset_interval % (window_size / 2) != 0
        {
            return Err(Error::bad_format("invalid LZXC window parameters"));
        }
        Ok(Self {
            reset_interval,
            window_size,
            windows_per_reset,
        })
    }
}

#[derive(Debug)]
struct ResetTable {
    uncompressed_len: u64,
    compressed_len: u64,
    block_len: u64,
    offsets: Vec<u64>,
}

impl ResetTable {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RESET_TABLE_HEADER_LEN {
            return Err(Error::bad_format("truncated LZX reset table"));
        }
        let block_count = read_u32(data, 0x04) as usize;
        let table_offset = read_u32(data, 0x0C) as usize;
        let uncompressed_len = read_u64(data, 0x10);
        let compressed_len = read_u64(data, 0x18);
        let block_len = read_u64(data, 0x20);
        if block_len == 0 {
            return Err(Error::bad_format("zero LZX block length"));
        }
        let table_end = block_count
            .checked_mul(8)
            .and_then(|n| n.checked_add(table_offset))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| Error::bad_format("LZX reset table overruns its entry"))?;
        let offsets = data[table_offset..table_end]
            .chunks_exact(8)
            .map(|c| read_u64(c, 0))
            .collect();
        Ok(Self {
            uncompressed_len,
            compressed_len,
            block_len,
            offsets,
        })
    }

    /// File-relative start and length of compressed block `block`.
    fn block_bounds(&self, block: u64) -> Option<(u64, u64)> {
        let start = *self.offsets.get(block as usize)?;
        let end = match self.offsets.get(block as usize + 1) {
            Some(&next) => next,
            None => self.compressed_len,
        };
        end.checked_sub(start).map(|len| (start, len))
    }
}

struct DecoderState {
    lzx: LzxDecoder,
    last_block: Option<u64>,
    cache: VecDeque<(u64, Vec<u8>)>,
}

/// The LZX-compressed section, shared by all readers behind one lock.
pub struct CompressedSection {
    content_offset: u64,
    reset_table: ResetTable,
    reset_block_count: u64,
    state: Mutex<DecoderState>,
}

impl CompressedSection {
    /// Open section 1 if the file has one. Files whose content is entirely
    /// stored in section 0 return `Ok(None)`.
    pub fn open(
        source: &dyn ByteSource,
        directory: &Directory,
        data_offset: u64,
    ) -> Result<Option<Self>> {
        let (Some(content), Some(control), Some(reset)) = (
            directory.lookup(CONTENT_PATH),
            directory.lookup(CONTROL_DATA_PATH),
            directory.lookup(RESET_TABLE_PATH),
        ) else {
            return Ok(None);
        };
        if content.section != 0 || control.section != 0 || reset.section != 0 {
            return Err(Error::bad_format("compressed section metadata not stored"));
        }

        let control = ControlData::parse(&read_stored(source, data_offset, control)?)?;
        let reset_table = ResetTable::parse(&read_stored(source, data_offset, reset)?)?;

        let window_bits = control.window_size.trailing_zeros();
        let reset_block_count =
            (control.reset_interval / (control.window_size / 2) * control.windows_per_reset).max(1);
        log::debug!(
            "CHM LZX section: window 2^{window_bits}, {} blocks of {} bytes, reset every {reset_block_count}",
            reset_table.offsets.len(),
            reset_table.block_len
        );

        Ok(Some(Self {
            content_offset: data_offset + content.offset,
            reset_table,
            reset_block_count,
            state: Mutex::new(DecoderState {
                lzx: LzxDecoder::new(window_bits)?,
                last_block: None,
                cache: VecDeque::with_capacity(BLOCK_CACHE_SIZE),
            }),
        }))
    }

    pub fn uncompressed_len(&self) -> u64 {
        self.reset_table.uncompressed_len
    }

    /// Read `len` bytes starting at `offset` in the uncompressed stream.
    pub fn read(&self, source: &dyn ByteSource, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.reset_table.uncompressed_len)
            .ok_or_else(|| Error::bad_format("entry extends past compressed section"))?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Inconsistent("LZX decoder lock poisoned".into()))?;

        let block_len = self.reset_table.block_len;
        let mut out = Vec::with_capacity(len as usize);
        let mut pos = offset;
        while pos < end {
            let block = pos / block_len;
            let in_block = (pos % block_len) as usize;
            let take = ((block_len - in_block as u64).min(end - pos)) as usize;
            let data = self.block(&mut state, source, block)?;
            let slice = data
                .get(in_block..in_block + take)
                .ok_or_else(|| Error::bad_format("short LZX block"))?;
            out.extend_from_slice(slice);
            pos += take as u64;
        }
        Ok(out)
    }

    fn block<'s>(
        &self,
        state: &'s mut DecoderState,
        source: &dyn ByteSource,
        block: u64,
    ) -> Result<&'s [u8]> {
        if let Some(i) = state.cache.iter().position(|(b, _)| *b == block) {
            return Ok(&state.cache[i].1);
        }

        // The decoder can only continue from the block right before; anything
        // else replays from the last reset point.
        let continues = block % self.reset_block_count != 0 && state.last_block == block.checked_sub(1);
        let start = if continues {
            block
        } else {
            block - block % self.reset_block_count
        };
        if !continues {
            state.lzx.reset();
        }

        let mut data = Vec::new();
        for b in start..=block {
            data = self.decompress_block(&mut state.lzx, source, b)?;
            state.last_block = Some(b);
        }

        if state.cache.len() == BLOCK_CACHE_SIZE {
            state.cache.pop_front();
        }
        state.cache.push_back((block, data));
        let last = state.cache.len() - 1;
        Ok(&state.cache[last].1)
    }

    fn decompress_block(
        &self,
        lzx: &mut LzxDecoder,
        source: &dyn ByteSource,
        block: u64,
    ) -> Result<Vec<u8>> {
        let table = &self.reset_table;
        let (start, len) = table
            .block_bounds(block)
            .ok_or_else(|| Error::bad_format(format!("no reset table entry for block {block}")))?;
        if len > table.block_len + MAX_BLOCK_OVERHEAD {
            return Err(Error::bad_format(format!("compressed block {block} too long")));
        }
        let input = source.read_at(self.content_offset + start, len as usize)?;
        let frame_len = table
            .block_len
            .min(table.uncompressed_len.saturating_sub(block * table.block_len));
        lzx.decompress(&input, frame_len as usize)
    }
}

/// Read an object stored uncompressed in section 0.
pub fn read_stored(source: &dyn ByteSource, data_offset: u64, entry: &DirEntry) -> Result<Vec<u8>> {
    Ok(source.read_at(data_offset + entry.offset, entry.length as usize)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_data_v2_scaling() {
        let mut data = vec![0u8; 0x1C];
        data[0..4].copy_from_slice(&6u32.to_le_bytes());
        data[4..8].copy_from_slice(LZXC_MAGIC);
        data[8..12].copy_from_slice(&2u32.to_le_bytes());
        data[12..16].copy_from_slice(&2u32.to_le_bytes());
        data[16..20].copy_from_slice(&2u32.to_le_bytes());
        data[20..24].copy_from_slice(&1u32.to_le_bytes());
        let control = ControlData::parse(&data).unwrap();
        assert_eq!(control.window_size, 0x10000);
        assert_eq!(control.reset_interval, 0x10000);
    }

    #[test]
    fn test_control_data_rejects_misaligned_reset() {
        let mut data = vec![0u8; 0x1C];
        data[4..8].copy_from_slice(LZXC_MAGIC);
        data[8..12].copy_from_slice(&1u32.to_le_bytes());
        data[12..16].copy_from_slice(&0x5000u32.to_le_bytes());
        data[16..20].copy_from_slice(&0x10000u32.to_le_bytes());
        assert!(ControlData::parse(&data).is_err());
    }

    #[test]
    fn test_reset_table_bounds() {
        let mut data = vec![0u8; RESET_TABLE_HEADER_LEN + 16];
        data[4..8].copy_from_slice(&2u32.to_le_bytes());
        data[12..16].copy_from_slice(&(RESET_TABLE_HEADER_LEN as u32).to_le_bytes());
        data[0x10..0x18].copy_from_slice(&0x9000u64.to_le_bytes());
        data[0x18..0x20].copy_from_slice(&0x500u64.to_le_bytes());
        data[0x20..0x28].copy_from_slice(&0x8000u64.to_le_bytes());
        data[0x28..0x30].copy_from_slice(&0u64.to_le_bytes());
        data[0x30..0x38].copy_from_slice(&0x400u64.to_le_bytes());
        let table = ResetTable::parse(&data).unwrap();
        assert_eq!(table.block_bounds(0), Some((0, 0x400)));
        assert_eq!(table.block_bounds(1), Some((0x400, 0x100)));
        assert_eq!(table.block_bounds(2), None);
    }
}
