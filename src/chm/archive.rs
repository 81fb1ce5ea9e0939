//! Entry access to an opened CHM file.

use std::sync::Arc;

use super::directory::{Directory, ItsfHeader};
use super::section::{CompressedSection, read_stored};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::io::ByteSource;

/// An opened ITSF archive: header, directory and content sections.
pub struct ChmArchive {
    source: Arc<dyn ByteSource>,
    header: ItsfHeader,
    directory: Directory,
    compressed: Option<CompressedSection>,
}

impl ChmArchive {
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let header = ItsfHeader::read(source.as_ref())?;
        let directory = Directory::read(source.as_ref(), &header)?;
        let compressed = CompressedSection::open(source.as_ref(), &directory, header.data_offset)?;
        log::debug!(
            "opened CHM v{}: {} entries, lcid {}, compressed section: {}",
            header.version,
            directory.entries().len(),
            header.lcid,
            compressed.is_some()
        );
        Ok(Self {
            source,
            header,
            directory,
            compressed,
        })
    }

    pub fn header(&self) -> &ItsfHeader {
        &self.header
    }
}

impl Container for ChmArchive {
    fn entry_size(&self, path: &str) -> Option<u64> {
        self.directory.lookup(path).map(|e| e.length)
    }

    fn read_entry(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self
            .directory
            .lookup(path)
            .ok_or_else(|| Error::not_found(path))?;
        match entry.section {
            0 => read_stored(self.source.as_ref(), self.header.data_offset, entry),
            1 => {
                let section = self
                    .compressed
                    .as_ref()
                    .ok_or_else(|| Error::bad_format("entry in missing compressed section"))?;
                section
                    .read(self.source.as_ref(), entry.offset, entry.length)
                    .inspect_err(|e| log::warn!("failed to decompress {path}: {e}"))
            }
            n => Err(Error::bad_format(format!("unknown content section {n}"))),
        }
    }

    fn enumerate_entries(&self) -> Vec<String> {
        self.directory
            .entries()
            .iter()
            .filter(|e| e.is_normal_file())
            .map(|e| e.name.clone())
            .collect()
    }
}
