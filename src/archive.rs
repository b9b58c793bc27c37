//! The top-level archive container: the 20-byte header, and the
//! [`Archive`] type that parses one and exposes lookup/decode/extraction
//! operations over its directory tree (`spec.md` §3, §4.6, §6).

use crate::cc;
use crate::error::{Error, Result};
use crate::io::Reader;
use crate::obfuscation;
use crate::payload;
use crate::tree::{self, Entry};
use bstr::BString;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path};

pub(crate) const MAGIC: u32 = cc::make_four(b"HAPI");
pub(crate) const VERSION: u32 = 0x0001_0000;
pub(crate) const HEADER_SIZE: usize = 0x14;

struct Header {
    archive_size: u32,
    key_byte: u8,
    root_offset: u32,
}

fn read_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < HEADER_SIZE {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(Error::InvalidMagic {
            expected: *b"HAPI",
            found: magic,
        });
    }

    let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    if version != VERSION {
        return Err(Error::InvalidVersion(version));
    }

    let archive_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let key_byte = bytes[12];
    let root_offset = u32::from_le_bytes(bytes[16..20].try_into().unwrap());

    Ok(Header {
        archive_size,
        key_byte,
        root_offset,
    })
}

pub(crate) fn write_header(out: &mut Vec<u8>, archive_size: u32, key_byte: u8, root_offset: u32) {
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&archive_size.to_le_bytes());
    out.push(key_byte);
    out.extend_from_slice(&[0u8; 3]); // reserved
    out.extend_from_slice(&root_offset.to_le_bytes());
}

/// One archive-internal path, joined with `/` regardless of platform.
pub type EntryPath = String;

/// Whether an [`Archive`] entry is a directory or a file, as reported by
/// [`Archive::entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// A parsed HPI archive. Owns its (unobfuscated) body buffer; every entry
/// is resolved lazily against it by [`decode`](Archive::decode) and
/// [`extract_all`](Archive::extract_all).
pub struct Archive {
    buffer: Vec<u8>,
    archive_size: u32,
    root: Vec<Entry>,
    index: HashMap<String, EntryRef>,
}

#[derive(Clone, Copy)]
enum EntryRef {
    Directory,
    File { chunk_table_offset: u32, uncompressed_size: u32 },
}

impl Archive {
    /// Parses an in-memory HPI archive image.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = read_header(bytes)?;
        let mut buffer = bytes[HEADER_SIZE..].to_vec();
        obfuscation::transform(&mut buffer, header.key_byte);

        let mut reader = Reader::new(&buffer);
        let mut visited = HashSet::new();
        let root = tree::read_entries(
            &mut reader,
            header.root_offset,
            header.archive_size,
            &mut visited,
        )?;

        let mut index = HashMap::new();
        build_index(&root, String::new(), &mut index);

        Ok(Self {
            buffer,
            archive_size: header.archive_size,
            root,
            index,
        })
    }

    /// Reads and parses an archive from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    /// The `file_size` field recorded in this archive's header.
    #[must_use]
    pub fn archive_size(&self) -> u32 {
        self.archive_size
    }

    /// Returns every archive-internal path paired with its kind, in the
    /// canonical write order (`spec.md` §4.5): each directory precedes its
    /// own children, and within a directory its subdirectories precede its
    /// files, both name-sorted.
    #[must_use]
    pub fn entries(&self) -> Vec<(EntryPath, EntryKind)> {
        let mut out = Vec::new();
        collect_paths(&self.root, &String::new(), &mut out);
        out
    }

    /// Looks up an archive-internal path, case-insensitively.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(&path.to_ascii_lowercase())
    }

    /// Decodes the file at `path` to its uncompressed bytes.
    pub fn decode(&self, path: &str) -> Result<Vec<u8>> {
        match self.index.get(&path.to_ascii_lowercase()) {
            Some(EntryRef::File {
                chunk_table_offset,
                uncompressed_size,
            }) => {
                let pos = obfuscation::offset_to_buffer_pos(*chunk_table_offset);
                let mut reader = Reader::new(&self.buffer);
                payload::decode_file(&mut reader, pos, *uncompressed_size as usize)
            }
            Some(EntryRef::Directory) => Err(Error::NotAFile(path.to_owned())),
            None => Err(Error::EntryNotFound(path.to_owned())),
        }
    }

    /// Extracts every file entry under `destination`, creating parent
    /// directories as needed.
    pub fn extract_all(&self, destination: &Path) -> Result<()> {
        for (path, kind) in self.entries() {
            if kind == EntryKind::File {
                self.extract_one(&path, destination)?;
            }
        }
        Ok(())
    }

    /// Extracts a single file entry to `destination/path`.
    pub fn extract_one(&self, path: &str, destination: &Path) -> Result<()> {
        let target = sanitized_join(destination, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = self.decode(path)?;
        fs::write(target, data)?;
        Ok(())
    }
}

fn build_index(entries: &[Entry], prefix: String, index: &mut HashMap<String, EntryRef>) {
    for entry in entries {
        match entry {
            Entry::Directory { name, children } => {
                let path = join_path(&prefix, name);
                index.insert(path.to_ascii_lowercase(), EntryRef::Directory);
                build_index(children, path, index);
            }
            Entry::File {
                name,
                chunk_table_offset,
                uncompressed_size,
            } => {
                let path = join_path(&prefix, name);
                index.insert(
                    path.to_ascii_lowercase(),
                    EntryRef::File {
                        chunk_table_offset: *chunk_table_offset,
                        uncompressed_size: *uncompressed_size,
                    },
                );
            }
        }
    }
}

fn collect_paths(entries: &[Entry], prefix: &str, out: &mut Vec<(EntryPath, EntryKind)>) {
    for entry in entries {
        match entry {
            Entry::Directory { name, children } => {
                let path = join_path(prefix, name);
                out.push((path.clone(), EntryKind::Directory));
                collect_paths(children, &path, out);
            }
            Entry::File { name, .. } => {
                out.push((join_path(prefix, name), EntryKind::File));
            }
        }
    }
}

fn join_path(prefix: &str, name: &BString) -> String {
    let name = name.to_string();
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Joins `path` (an archive-internal, `/`-separated path) onto
/// `destination`, rejecting components that would escape it
/// (`spec.md` §6).
fn sanitized_join(destination: &Path, path: &str) -> Result<std::path::PathBuf> {
    let mut out = destination.to_path_buf();
    for part in path.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(Error::PathEscapesRoot(path.to_owned()));
        }
        let component_path = Path::new(part);
        if component_path.components().count() != 1
            || !matches!(component_path.components().next(), Some(Component::Normal(_)))
        {
            return Err(Error::PathEscapesRoot(path.to_owned()));
        }
        out.push(part);
    }
    Ok(out)
}
