use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use super::ByteSource;

/// `Read + Seek` view of a [`ByteSource`], for `zip::ZipArchive`.
pub struct SourceStream {
    source: Arc<dyn ByteSource>,
    pos: u64,
}

impl SourceStream {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self { source, pos: 0 }
    }
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.source.len().saturating_sub(self.pos);
        let n = left.min(buf.len() as u64) as usize;
        if n > 0 {
            self.source.read_exact_at(self.pos, &mut buf[..n])?;
            self.pos += n as u64;
        }
        Ok(n)
    }
}

impl Seek for SourceStream {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match target {
            SeekFrom::Start(pos) => {
                self.pos = pos;
                return Ok(pos);
            }
            SeekFrom::End(delta) => (self.source.len(), delta),
            SeekFrom::Current(delta) => (self.pos, delta),
        };
        self.pos = base.checked_add_signed(delta).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek outside the source")
        })?;
        Ok(self.pos)
    }
}
