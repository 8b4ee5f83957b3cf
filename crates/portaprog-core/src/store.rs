//! File store contract
//!
//! The device keeps its files in a small flat flash file system. The command
//! effects only need to open, probe, delete and list files by name, so that
//! is all this trait asks for. [`MemFs`] is an in-memory implementation used
//! by tests and by hosts without persistent storage.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::error::{Error, Result};
use crate::stream::{ByteSink, ByteSource, Stream};

/// Maximum file name length including the leading `/` and a terminator
pub const MAX_FILENAME_LEN: usize = 32;

/// Normalized file name (leading `/`, at most `MAX_FILENAME_LEN - 1` bytes)
pub type FileName = heapless::String<MAX_FILENAME_LEN>;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start; the file must exist
    Read,
    /// Create or truncate, then write
    Write,
}

/// Kind of file, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Anything else
    Unknown,
    /// Command batch file (`.cmd`)
    Cmd,
    /// Intel HEX image (`.hex`)
    Hex,
}

impl FileKind {
    /// Classify a file name
    pub fn from_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => return Self::Unknown,
        };
        if ext.eq_ignore_ascii_case("hex") {
            Self::Hex
        } else if ext.eq_ignore_ascii_case("cmd") {
            Self::Cmd
        } else {
            Self::Unknown
        }
    }
}

/// Bring a user supplied name into the store's canonical form
///
/// Adds the leading `/` and cuts the name to fit [`MAX_FILENAME_LEN`].
pub fn normalize_name(name: &str) -> Result<FileName> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidName);
    }
    let mut out = FileName::new();
    out.push('/').map_err(|_| Error::InvalidName)?;
    for c in trimmed.chars() {
        if out.len() + c.len_utf8() > MAX_FILENAME_LEN - 1 {
            log::warn!("file name {} truncated to {}", name, out);
            break;
        }
        out.push(c).map_err(|_| Error::InvalidName)?;
    }
    Ok(out)
}

/// Human readable byte count, fixed width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: u64 = 1024;
        let bytes = self.0;
        if bytes < KB {
            write!(f, "  {:4} Bs", bytes)
        } else if bytes < KB * KB {
            write!(f, "{:6.1} KB", bytes as f64 / 1024.0)
        } else if bytes < KB * KB * KB {
            write!(f, "{:6.1} MB", bytes as f64 / 1024.0 / 1024.0)
        } else {
            write!(f, "{:6.1} GB", bytes as f64 / 1024.0 / 1024.0 / 1024.0)
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name without the leading `/`
    pub name: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// True for directories
    pub is_dir: bool,
}

impl DirEntry {
    /// Dot-files are hidden unless explicitly requested
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "[{}]", self.name)
        } else {
            write!(f, "{}\t{}", self.name, ByteSize(self.size))
        }
    }
}

/// Named file storage
pub trait FileStore {
    /// Handle to an open file
    type File: Stream;

    /// Open a file by name
    fn open(&mut self, name: &str, mode: OpenMode) -> Result<Self::File>;

    /// Finish with a file, committing any pending writes
    fn close(&mut self, file: Self::File) {
        drop(file);
    }

    /// Whether a file with this name exists
    fn exists(&mut self, name: &str) -> bool;

    /// Remove a file
    fn delete(&mut self, name: &str) -> Result<()>;

    /// Walk the directory one entry per call
    ///
    /// `reset` restarts from the first entry. Returns `None` past the end.
    fn list(&mut self, reset: bool, include_hidden: bool) -> Option<DirEntry>;
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

type Nodes = Rc<RefCell<BTreeMap<FileName, Node>>>;

/// In-memory file store
#[derive(Debug, Default)]
pub struct MemFs {
    nodes: Nodes,
    cursor: usize,
}

impl MemFs {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file with the given content
    pub fn insert(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let name = normalize_name(name)?;
        self.nodes
            .borrow_mut()
            .insert(name, Node::File(data.to_vec()));
        Ok(())
    }

    /// Create a directory entry
    pub fn add_dir(&mut self, name: &str) -> Result<()> {
        let name = normalize_name(name)?;
        self.nodes.borrow_mut().insert(name, Node::Dir);
        Ok(())
    }

    /// Copy of a file's content
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let name = normalize_name(name).ok()?;
        match self.nodes.borrow().get(&name) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Number of entries, files and directories
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// True when the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }
}

impl FileStore for MemFs {
    type File = MemFile;

    fn open(&mut self, name: &str, mode: OpenMode) -> Result<MemFile> {
        let name = normalize_name(name)?;
        let mut nodes = self.nodes.borrow_mut();
        match mode {
            OpenMode::Read => match nodes.get(&name) {
                Some(Node::File(data)) => Ok(MemFile {
                    inner: MemFileInner::Reader {
                        data: data.clone(),
                        pos: 0,
                    },
                }),
                Some(Node::Dir) => Err(Error::OpenFailed),
                None => Err(Error::FileNotFound),
            },
            OpenMode::Write => {
                if let Some(Node::Dir) = nodes.get(&name) {
                    return Err(Error::OpenFailed);
                }
                nodes.insert(name.clone(), Node::File(Vec::new()));
                Ok(MemFile {
                    inner: MemFileInner::Writer {
                        nodes: Rc::clone(&self.nodes),
                        name,
                    },
                })
            }
        }
    }

    fn exists(&mut self, name: &str) -> bool {
        match normalize_name(name) {
            Ok(name) => self.nodes.borrow().contains_key(&name),
            Err(_) => false,
        }
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        let name = normalize_name(name)?;
        self.nodes
            .borrow_mut()
            .remove(&name)
            .map(|_| ())
            .ok_or(Error::FileNotFound)
    }

    fn list(&mut self, reset: bool, include_hidden: bool) -> Option<DirEntry> {
        if reset {
            self.cursor = 0;
        }
        let nodes = self.nodes.borrow();
        loop {
            let (name, node) = nodes.iter().nth(self.cursor)?;
            self.cursor += 1;
            let entry = match node {
                Node::File(data) => DirEntry {
                    name: String::from(name.trim_start_matches('/')),
                    size: data.len() as u64,
                    is_dir: false,
                },
                Node::Dir => DirEntry {
                    name: String::from(name.trim_start_matches('/')),
                    size: 0,
                    is_dir: true,
                },
            };
            if entry.is_hidden() && !include_hidden {
                continue;
            }
            return Some(entry);
        }
    }
}

/// Open file of a [`MemFs`]
///
/// Readers work on a snapshot taken at open time. Writers append straight
/// into the store.
#[derive(Debug)]
pub struct MemFile {
    inner: MemFileInner,
}

#[derive(Debug)]
enum MemFileInner {
    Reader { data: Vec<u8>, pos: usize },
    Writer { nodes: Nodes, name: FileName },
}

impl ByteSource for MemFile {
    fn available(&mut self) -> usize {
        match &self.inner {
            MemFileInner::Reader { data, pos } => data.len() - *pos,
            MemFileInner::Writer { .. } => 0,
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        match &mut self.inner {
            MemFileInner::Reader { data, pos } => {
                let byte = data.get(*pos).copied()?;
                *pos += 1;
                Some(byte)
            }
            MemFileInner::Writer { .. } => None,
        }
    }

    fn peek_byte(&mut self) -> Option<u8> {
        match &self.inner {
            MemFileInner::Reader { data, pos } => data.get(*pos).copied(),
            MemFileInner::Writer { .. } => None,
        }
    }
}

impl ByteSink for MemFile {
    fn write(&mut self, bytes: &[u8]) -> usize {
        match &mut self.inner {
            MemFileInner::Reader { .. } => 0,
            MemFileInner::Writer { nodes, name } => match nodes.borrow_mut().get_mut(name) {
                Some(Node::File(data)) => {
                    data.extend_from_slice(bytes);
                    bytes.len()
                }
                // deleted while open
                _ => 0,
            },
        }
    }
}
