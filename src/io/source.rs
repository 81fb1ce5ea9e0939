use std::fs::File;
use std::io;
use std::path::Path;

fn short_read() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of source")
}

/// Random-access bytes that several readers can share.
///
/// There is no cursor: every read names its own offset, so an
/// `Arc<dyn ByteSource>` can back a CHM section reader and a directory
/// walk at the same time.
pub trait ByteSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`, failing if the source ends first.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Up to `len` bytes from `offset`; shorter near the end of the source.
    fn read_prefix(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let remaining = self.len().saturating_sub(offset);
        if remaining == 0 {
            return Ok(Vec::new());
        }
        self.read_at(offset, remaining.min(len as u64) as usize)
    }
}

/// A file on disk.
pub struct FileSource {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: std::sync::Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        #[cfg(not(unix))]
        let file = std::sync::Mutex::new(file);
        Ok(Self { file, len })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

/// Bytes already in memory, e.g. an entry pulled out of another container.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| short_read())?;
        let chunk = start
            .checked_add(buf.len())
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(short_read)?;
        buf.copy_from_slice(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_reads_are_bounded() {
        let source = MemorySource::new(b"ITSF header".to_vec());
        assert_eq!(source.read_at(5, 6).unwrap(), b"header");
        assert!(source.read_at(9, 5).is_err());
        assert!(source.read_at(u64::MAX, 1).is_err());
        assert_eq!(source.read_prefix(0, 64).unwrap(), b"ITSF header");
        assert!(source.read_prefix(40, 4).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_past_the_end_is_empty() {
        let source = MemorySource::new(vec![0u8; 8]);
        assert!(source.read_prefix(8, 16).unwrap().is_empty());
        assert!(source.read_prefix(u64::MAX, 1).unwrap().is_empty());
        assert_eq!(source.read_prefix(6, 16).unwrap().len(), 2);
        assert!(MemorySource::new(Vec::new()).read_prefix(0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_file_source() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"BOOKMOBI").unwrap();
        let source = FileSource::open(tmp.path()).unwrap();
        assert_eq!(source.len(), 8);
        assert_eq!(source.read_at(4, 4).unwrap(), b"MOBI");
        assert!(source.read_at(6, 4).is_err());
    }
}
