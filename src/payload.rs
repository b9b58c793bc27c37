//! File payload codec: splits a file body into fixed-size SQSH chunks,
//! emits a chunk-size table followed by the chunks, and reverses that
//! split on read (`spec.md` §4.4).

use crate::error::Result;
use crate::io::Reader;
use crate::sqsh::{self, Selector, MAX_CHUNK_SIZE};

/// Number of 64 KiB chunks needed to hold `size` uncompressed bytes.
#[must_use]
pub(crate) fn chunk_count(size: usize) -> usize {
    size.div_ceil(MAX_CHUNK_SIZE)
}

/// Encodes `data` as a chunk-size table immediately followed by the
/// encoded chunks. The returned buffer's start is the file's
/// `chunk_table_offset`.
pub(crate) fn encode_file(data: &[u8], selector: Selector) -> Result<Vec<u8>> {
    let mut chunks = Vec::with_capacity(chunk_count(data.len()));
    for slice in data.chunks(MAX_CHUNK_SIZE) {
        chunks.push(sqsh::encode_chunk(slice, selector)?);
    }

    let mut out = Vec::with_capacity(chunks.len() * 4 + chunks.iter().map(Vec::len).sum::<usize>());
    for chunk in &chunks {
        let size: u32 = chunk.len().try_into()?;
        out.extend_from_slice(&size.to_le_bytes());
    }
    for chunk in chunks {
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

/// Reads the chunk-size table at buffer position `chunk_table_pos` (a
/// buffer-local position, already translated from the stored absolute
/// offset by the caller) and decodes `uncompressed_size` bytes from the
/// chunks that follow it.
pub(crate) fn decode_file(
    reader: &mut Reader<'_>,
    chunk_table_pos: usize,
    uncompressed_size: usize,
) -> Result<Vec<u8>> {
    let count = chunk_count(uncompressed_size);

    reader.seek_absolute(chunk_table_pos)?;
    let mut sizes = Vec::with_capacity(count);
    for _ in 0..count {
        sizes.push(reader.read_u32()? as usize);
    }

    let mut out = Vec::with_capacity(uncompressed_size);
    for size in sizes {
        let chunk = reader.read_bytes(size)?;
        let decoded = sqsh::decode_chunk(chunk)?;
        out.extend_from_slice(&decoded);
    }

    out.truncate(uncompressed_size);
    Ok(out)
}
