//! Directory-tree codec: the in-memory model used while assembling an
//! archive, the two-pass emission scheme, and the mirror-image parser
//! that walks a directory node back into that model (`spec.md` §4.5).

use crate::error::{Error, Result};
use crate::io::{Reader, Writer};
use crate::obfuscation::{buffer_pos_to_offset, offset_to_buffer_pos, OBFUSCATED_REGION_START};
use crate::payload;
use crate::sqsh::Selector;
use bstr::BString;
use std::collections::HashSet;

const FLAG_DIRECTORY: u8 = 0x01;
const FLAG_COMPRESSED: u8 = 0x02;
const ENTRY_RECORD_SIZE: usize = 9;
const DIRECTORY_HEADER_SIZE: usize = 8;

/// A node of the tree being assembled from a filesystem walk, before it
/// has been written to an archive buffer.
#[derive(Debug, Clone)]
pub(crate) enum BuildNode {
    Directory {
        name: BString,
        children: Vec<BuildNode>,
    },
    File {
        name: BString,
        data: Vec<u8>,
    },
}

impl BuildNode {
    fn name(&self) -> &BString {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    /// Sorts this node's children (and their children, recursively) into
    /// the canonical write order: subdirectories before files, name-sorted
    /// within each group (`spec.md` §4.5, §9).
    pub(crate) fn canonicalize(&mut self) {
        if let Self::Directory { children, .. } = self {
            for child in children.iter_mut() {
                child.canonicalize();
            }
            children.sort_by(|a, b| {
                let a_is_file = matches!(a, Self::File { .. });
                let b_is_file = matches!(b, Self::File { .. });
                a_is_file.cmp(&b_is_file).then_with(|| a.name().cmp(b.name()))
            });
        }
    }
}

/// A tree node after Pass 1 (payload emission) has recorded where its
/// file content landed in the output buffer.
enum PreparedNode<'a> {
    Directory {
        name: &'a BString,
        children: Vec<PreparedNode<'a>>,
    },
    File {
        name: &'a BString,
        chunk_table_pos: usize,
        uncompressed_size: usize,
    },
}

/// Pass 1: walk `node` depth-first, writing each file's chunk table and
/// chunks to `writer` and recording its position for Pass 2.
fn emit_payloads<'a>(
    node: &'a BuildNode,
    writer: &mut Writer,
    selector: Selector,
) -> Result<PreparedNode<'a>> {
    match node {
        BuildNode::File { name, data } => {
            let chunk_table_pos = writer.position();
            let encoded = payload::encode_file(data, selector)?;
            writer.write_bytes(&encoded);
            Ok(PreparedNode::File {
                name,
                chunk_table_pos,
                uncompressed_size: data.len(),
            })
        }
        BuildNode::Directory { name, children } => {
            let mut prepared = Vec::with_capacity(children.len());
            for child in children {
                prepared.push(emit_payloads(child, writer, selector)?);
            }
            Ok(PreparedNode::Directory {
                name,
                children: prepared,
            })
        }
    }
}

/// Pass 2: recursively emit a directory node's header, entry table, and
/// each child's name and information block; returns the buffer position
/// the node's header was written at.
fn emit_directory(node: &PreparedNode<'_>, writer: &mut Writer) -> Result<usize> {
    let PreparedNode::Directory { children, .. } = node else {
        unreachable!("emit_directory called on a file node");
    };

    let node_pos = writer.position();
    let count: u32 = children.len().try_into()?;
    writer.write_u32(count);
    writer.write_u32(0); // reserved data-section offset; spec.md §9 open question

    let entries_pos = writer.position();
    writer.reserve(children.len() * ENTRY_RECORD_SIZE);

    let mut records = Vec::with_capacity(children.len());
    for child in children {
        let name_pos = writer.position();
        let child_name = match child {
            PreparedNode::Directory { name, .. } | PreparedNode::File { name, .. } => *name,
        };
        writer.write_cstring(child_name)?;
        let name_offset = buffer_pos_to_offset(name_pos);

        let (info_offset, flags) = match child {
            PreparedNode::Directory { .. } => {
                let dir_pos = emit_directory(child, writer)?;
                (buffer_pos_to_offset(dir_pos), FLAG_DIRECTORY)
            }
            PreparedNode::File {
                chunk_table_pos,
                uncompressed_size,
                ..
            } => {
                let info_pos = writer.position();
                let chunk_table_offset = buffer_pos_to_offset(*chunk_table_pos);
                writer.write_u32(chunk_table_offset);
                let size: u32 = (*uncompressed_size).try_into()?;
                writer.write_u32(size);
                (buffer_pos_to_offset(info_pos), FLAG_COMPRESSED)
            }
        };

        records.push((name_offset, info_offset, flags));
    }

    for (i, (name_offset, info_offset, flags)) in records.into_iter().enumerate() {
        let pos = entries_pos + i * ENTRY_RECORD_SIZE;
        writer.patch_u32(pos, name_offset);
        writer.patch_u32(pos + 4, info_offset);
        writer.patch_u8(pos + 8, flags);
    }

    Ok(node_pos)
}

/// Emits `root` (payloads, then metadata) into a fresh buffer that begins
/// at absolute file offset [`OBFUSCATED_REGION_START`]. Returns the
/// buffer and the absolute offset of the root directory node.
pub(crate) fn write_root(root: &BuildNode, selector: Selector) -> Result<(Vec<u8>, u32)> {
    let mut writer = Writer::new();
    let prepared = emit_payloads(root, &mut writer, selector)?;
    let root_pos = emit_directory(&prepared, &mut writer)?;
    Ok((writer.into_inner(), buffer_pos_to_offset(root_pos)))
}

/// A parsed tree node: metadata only, no file content. [`crate::archive`]
/// decodes a file's bytes on demand from its `chunk_table_offset`.
#[derive(Debug, Clone)]
pub(crate) enum Entry {
    Directory {
        name: BString,
        children: Vec<Entry>,
    },
    File {
        name: BString,
        chunk_table_offset: u32,
        uncompressed_size: u32,
    },
}

fn checked_buffer_pos(offset: u32, archive_size: u32) -> Result<usize> {
    if offset < OBFUSCATED_REGION_START as u32 || offset >= archive_size {
        return Err(Error::OffsetOutOfRange { offset, archive_size });
    }
    Ok(offset_to_buffer_pos(offset))
}

/// Reads the directory node at absolute offset `dir_offset` and all of
/// its descendants, rejecting cycles by tracking visited offsets.
pub(crate) fn read_entries(
    reader: &mut Reader<'_>,
    dir_offset: u32,
    archive_size: u32,
    visited: &mut HashSet<u32>,
) -> Result<Vec<Entry>> {
    if !visited.insert(dir_offset) {
        return Err(Error::DirectoryCycle(dir_offset));
    }

    let pos = checked_buffer_pos(dir_offset, archive_size)?;
    reader.seek_absolute(pos)?;
    let count = reader.read_u32()?;
    let _reserved = reader.read_u32()?;

    if count as usize * ENTRY_RECORD_SIZE + pos + DIRECTORY_HEADER_SIZE > reader.len() {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_offset = reader.read_u32()?;
        let info_offset = reader.read_u32()?;
        let flags = reader.read_u8()?;
        records.push((name_offset, info_offset, flags));
    }

    let mut entries = Vec::with_capacity(records.len());
    for (name_offset, info_offset, flags) in records {
        let name_pos = checked_buffer_pos(name_offset, archive_size)?;
        let name = reader.at(name_pos, Reader::read_cstring)?;

        if flags & FLAG_DIRECTORY != 0 {
            let children = read_entries(reader, info_offset, archive_size, visited)?;
            entries.push(Entry::Directory { name, children });
        } else {
            let info_pos = checked_buffer_pos(info_offset, archive_size)?;
            let (chunk_table_offset, uncompressed_size) = reader.at(info_pos, |r| {
                let chunk_table_offset = r.read_u32()?;
                let uncompressed_size = r.read_u32()?;
                Ok((chunk_table_offset, uncompressed_size))
            })?;
            entries.push(Entry::File {
                name,
                chunk_table_offset,
                uncompressed_size,
            });
        }
    }

    Ok(entries)
}
