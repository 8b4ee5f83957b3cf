//! Directory backed file store

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use portaprog_core::store::{normalize_name, DirEntry, FileStore, OpenMode};
use portaprog_core::stream::{ByteSink, ByteSource};
use portaprog_core::Error;

use crate::error::{FsError, Result};

/// File store rooted at a host directory
#[derive(Debug)]
pub struct DirFs {
    root: PathBuf,
    listing: Vec<DirEntry>,
    cursor: usize,
}

impl DirFs {
    /// Use `root` as storage, creating it when missing
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            if !root.is_dir() {
                return Err(FsError::NotADirectory(root));
            }
        } else {
            fs::create_dir_all(&root).map_err(|source| FsError::CreateRoot {
                path: root.clone(),
                source,
            })?;
            log::info!("created storage root {}", root.display());
        }
        Ok(Self {
            root,
            listing: Vec::new(),
            cursor: 0,
        })
    }

    /// The storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a store name
    ///
    /// Names may contain `/` separated parts but never leave the root.
    pub fn path_of(&self, name: &str) -> portaprog_core::Result<PathBuf> {
        let name = normalize_name(name)?;
        let relative = Path::new(name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            log::warn!("rejecting file name {}", name);
            return Err(Error::InvalidName);
        }
        Ok(self.root.join(relative))
    }

    fn scan(&self) -> std::io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                is_dir: meta.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

impl FileStore for DirFs {
    type File = DirFile;

    fn open(&mut self, name: &str, mode: OpenMode) -> portaprog_core::Result<DirFile> {
        let path = self.path_of(name)?;
        if path.is_dir() {
            return Err(Error::OpenFailed);
        }
        match mode {
            OpenMode::Read => {
                let file = File::open(&path)?;
                let remaining = file.metadata()?.len();
                log::debug!("open {} for reading ({} bytes)", path.display(), remaining);
                Ok(DirFile {
                    inner: DirFileInner::Reader {
                        reader: BufReader::new(file),
                        remaining,
                    },
                })
            }
            OpenMode::Write => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = File::create(&path).map_err(|e| {
                    log::debug!("create {} failed: {}", path.display(), e);
                    Error::OpenFailed
                })?;
                log::debug!("open {} for writing", path.display());
                Ok(DirFile {
                    inner: DirFileInner::Writer(BufWriter::new(file)),
                })
            }
        }
    }

    fn close(&mut self, mut file: DirFile) {
        if let Err(e) = file.finish() {
            log::warn!("closing file failed: {}", e);
        }
    }

    fn exists(&mut self, name: &str) -> bool {
        self.path_of(name).map(|p| p.exists()).unwrap_or(false)
    }

    fn delete(&mut self, name: &str) -> portaprog_core::Result<()> {
        let path = self.path_of(name)?;
        if path.is_dir() {
            fs::remove_dir(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn list(&mut self, reset: bool, include_hidden: bool) -> Option<DirEntry> {
        if reset {
            self.cursor = 0;
            self.listing = match self.scan() {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("listing {} failed: {}", self.root.display(), e);
                    Vec::new()
                }
            };
        }
        while let Some(entry) = self.listing.get(self.cursor) {
            self.cursor += 1;
            if entry.is_hidden() && !include_hidden {
                continue;
            }
            return Some(entry.clone());
        }
        None
    }
}

/// Open file of a [`DirFs`]
#[derive(Debug)]
pub struct DirFile {
    inner: DirFileInner,
}

#[derive(Debug)]
enum DirFileInner {
    Reader {
        reader: BufReader<File>,
        remaining: u64,
    },
    Writer(BufWriter<File>),
}

impl DirFile {
    /// Mode the file was opened with
    pub fn mode(&self) -> OpenMode {
        match self.inner {
            DirFileInner::Reader { .. } => OpenMode::Read,
            DirFileInner::Writer(_) => OpenMode::Write,
        }
    }

    /// Flush pending writes to disk
    pub fn finish(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DirFileInner::Reader { .. } => Ok(()),
            DirFileInner::Writer(writer) => {
                writer.flush()?;
                writer.get_ref().sync_all()
            }
        }
    }
}

impl ByteSource for DirFile {
    fn available(&mut self) -> usize {
        match &self.inner {
            DirFileInner::Reader { remaining, .. } => {
                usize::try_from(*remaining).unwrap_or(usize::MAX)
            }
            DirFileInner::Writer(_) => 0,
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let DirFileInner::Reader { reader, remaining } = &mut self.inner else {
            return None;
        };
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(1) => {
                *remaining = remaining.saturating_sub(1);
                Some(byte[0])
            }
            Ok(_) => {
                // file shrank under us
                *remaining = 0;
                None
            }
            Err(e) => {
                log::warn!("read failed: {}", e);
                *remaining = 0;
                None
            }
        }
    }

    fn peek_byte(&mut self) -> Option<u8> {
        let DirFileInner::Reader { reader, .. } = &mut self.inner else {
            return None;
        };
        reader.fill_buf().ok()?.first().copied()
    }
}

impl ByteSink for DirFile {
    fn write(&mut self, data: &[u8]) -> usize {
        let DirFileInner::Writer(writer) = &mut self.inner else {
            return 0;
        };
        match writer.write_all(data) {
            Ok(()) => data.len(),
            Err(e) => {
                log::warn!("write failed: {}", e);
                0
            }
        }
    }

    fn flush(&mut self) {
        if let DirFileInner::Writer(writer) = &mut self.inner {
            if let Err(e) = writer.flush() {
                log::warn!("flush failed: {}", e);
            }
        }
    }
}
