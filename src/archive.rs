//! Zip archives and unpacked directories as [`Container`]s.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use zip::ZipArchive;

use crate::container::{Container, MAX_ENTRY_SIZE, normalize_entry_path};
use crate::error::{Error, Result};
use crate::io::{ByteSource, FileSource, SourceStream};

/// Entries of a zip file.
///
/// Lookups are exact first and fall back to ASCII case-insensitive
/// matching, since producers disagree with their own manifests.
pub struct ZipContainer {
    archive: Mutex<ZipArchive<SourceStream>>,
    /// normalized path -> (index in archive, uncompressed size)
    entries: HashMap<String, (usize, u64)>,
    lowercase: HashMap<String, String>,
    order: Vec<String>,
}

impl ZipContainer {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_source(Arc::new(FileSource::open(path)?))
    }

    pub fn from_source(source: Arc<dyn ByteSource>) -> Result<Self> {
        let mut archive = ZipArchive::new(SourceStream::new(source))?;
        let mut entries = HashMap::new();
        let mut lowercase = HashMap::new();
        let mut order = Vec::new();
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            if file.is_dir() {
                continue;
            }
            let path = normalize_entry_path(file.name()).into_owned();
            lowercase
                .entry(path.to_lowercase())
                .or_insert_with(|| path.clone());
            entries.insert(path.clone(), (index, file.size()));
            order.push(path);
        }
        log::debug!("opened zip with {} entries", order.len());
        Ok(Self {
            archive: Mutex::new(archive),
            entries,
            lowercase,
            order,
        })
    }

    fn lookup(&self, path: &str) -> Option<&(usize, u64)> {
        self.entries.get(path).or_else(|| {
            let exact = self.lowercase.get(&path.to_lowercase())?;
            self.entries.get(exact)
        })
    }
}

impl Container for ZipContainer {
    fn entry_size(&self, path: &str) -> Option<u64> {
        self.lookup(path).map(|&(_, size)| size)
    }

    fn read_entry(&self, path: &str) -> Result<Vec<u8>> {
        let &(index, size) = self.lookup(path).ok_or_else(|| Error::not_found(path))?;
        let mut archive = self.archive.lock().unwrap_or_else(|e| e.into_inner());
        let file = archive.by_index(index)?;
        let mut data = Vec::with_capacity(size.min(MAX_ENTRY_SIZE) as usize);
        // the declared size is not trusted
        file.take(MAX_ENTRY_SIZE + 1).read_to_end(&mut data)?;
        if data.len() as u64 > MAX_ENTRY_SIZE {
            return Err(Error::TooLarge {
                path: path.to_string(),
                size: data.len() as u64,
            });
        }
        Ok(data)
    }

    fn enumerate_entries(&self) -> Vec<String> {
        self.order.clone()
    }
}

/// Files below a directory, addressed like archive entries.
pub struct DirContainer {
    root: PathBuf,
}

impl DirContainer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map an entry path onto the file system, refusing to leave the root.
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) {
        let Ok(read_dir) = std::fs::read_dir(dir) else {
            return;
        };
        let mut children: Vec<_> = read_dir.flatten().map(|e| e.path()).collect();
        children.sort();
        for child in children {
            if child.is_dir() {
                self.walk(&child, out);
            } else if let Ok(rel) = child.strip_prefix(&self.root) {
                let rel = rel.to_string_lossy().replace('\\', "/");
                out.push(normalize_entry_path(&rel).into_owned());
            }
        }
    }
}

impl Container for DirContainer {
    fn entry_size(&self, path: &str) -> Option<u64> {
        let meta = std::fs::metadata(self.file_path(path)?).ok()?;
        meta.is_file().then(|| meta.len())
    }

    fn read_entry(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.file_path(path).ok_or_else(|| Error::not_found(path))?;
        Ok(std::fs::read(file)?)
    }

    fn enumerate_entries(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&self.root, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.add_directory("empty/", SimpleFileOptions::default()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_zip_lookup() {
        let data = zip_bytes(&[
            ("OEBPS/Text/ch1.xhtml", b"<p>one</p>".as_slice()),
            ("mimetype", b"x".as_slice()),
        ]);
        let zip = ZipContainer::from_source(Arc::new(MemorySource::new(data))).unwrap();
        assert_eq!(
            zip.enumerate_entries(),
            vec!["/OEBPS/Text/ch1.xhtml".to_string(), "/mimetype".to_string()]
        );
        assert_eq!(zip.get_entry("OEBPS/Text/ch1.xhtml").unwrap().as_bytes(), b"<p>one</p>");
        // case-insensitive fallback
        assert!(zip.has_entry("oebps/text/CH1.xhtml"));
        assert!(!zip.has_entry("OEBPS/missing.xhtml"));
    }

    #[test]
    fn test_dir_container() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"x").unwrap();

        let container = DirContainer::new(dir.path());
        assert_eq!(container.entry_size("/a/b/c.txt"), Some(5));
        assert_eq!(container.get_entry("a/b/c.txt").unwrap().as_bytes(), b"hello");
        assert_eq!(
            container.enumerate_entries(),
            vec!["/a/b/c.txt".to_string(), "/top.txt".to_string()]
        );
        assert!(!container.has_entry("/../etc/passwd"));
    }
}
