//! The per-chunk `SQSH` wrapper: a compression selector, an optional
//! per-chunk obfuscation pass, and a trailing additive checksum
//! (`spec.md` §4.2).
//!
//! Order of operations on decode — unobfuscate, verify checksum, then
//! dispatch on the compression selector — is fixed by
//! `examples/original_source/hpi_parser.py::_decompress_sqsh_chunk`; the
//! spec itself only lists the steps, not their order.

use crate::cc;
use crate::error::{Error, Result};
use crate::lz77;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;

const MAGIC: u32 = cc::make_four(b"SQSH");
const HEADER_SIZE: usize = 19;
pub(crate) const MAX_CHUNK_SIZE: usize = 0x1_0000;

/// Compression selector stored at SQSH header byte 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selector {
    Stored,
    Lz77,
    Deflate,
}

impl Selector {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Stored),
            1 => Ok(Self::Lz77),
            2 => Ok(Self::Deflate),
            other => Err(Error::UnknownCompression(other)),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::Stored => 0,
            Self::Lz77 => 1,
            Self::Deflate => 2,
        }
    }
}

fn additive_checksum(payload: &[u8]) -> u32 {
    payload.iter().fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

/// Reverses the per-chunk obfuscation transform (distinct from the
/// whole-archive transform in [`crate::obfuscation`]): byte *i* of the
/// payload was produced as `((plain[i] + (i & 0xFF)) ^ (i & 0xFF)) & 0xFF`.
fn unobfuscate_payload(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        let key_byte = (i & 0xFF) as u8;
        *byte = byte.wrapping_sub(key_byte) ^ key_byte;
    }
}

fn obfuscate_payload(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        let key_byte = (i & 0xFF) as u8;
        *byte = (*byte ^ key_byte).wrapping_add(key_byte);
    }
}

/// Decodes one SQSH chunk (header and payload together) to exactly
/// `uncompressed_size` bytes.
pub(crate) fn decode_chunk(chunk: &[u8]) -> Result<Vec<u8>> {
    if chunk.len() < HEADER_SIZE {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    let magic = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(Error::InvalidMagic {
            expected: *b"SQSH",
            found: magic,
        });
    }

    let selector = Selector::from_byte(chunk[5])?;
    let obfuscated = chunk[6] != 0;
    let payload_size = u32::from_le_bytes(chunk[7..11].try_into().unwrap()) as usize;
    let uncompressed_size = u32::from_le_bytes(chunk[11..15].try_into().unwrap()) as usize;
    let expected_checksum = u32::from_le_bytes(chunk[15..19].try_into().unwrap());

    if uncompressed_size > MAX_CHUNK_SIZE {
        return Err(Error::SizeMismatch {
            expected: MAX_CHUNK_SIZE,
            actual: uncompressed_size,
        });
    }

    let raw = chunk
        .get(HEADER_SIZE..HEADER_SIZE + payload_size)
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
    let mut payload = raw.to_vec();

    if obfuscated {
        unobfuscate_payload(&mut payload);
    }

    let actual_checksum = additive_checksum(&payload);
    if actual_checksum != expected_checksum {
        return Err(Error::ChecksumMismatch {
            expected: expected_checksum,
            actual: actual_checksum,
        });
    }

    let decoded = match selector {
        Selector::Stored => payload,
        Selector::Lz77 => lz77::decompress(&payload, uncompressed_size)?,
        Selector::Deflate => {
            let mut out = Vec::with_capacity(uncompressed_size);
            ZlibDecoder::new(&payload[..]).read_to_end(&mut out)?;
            out
        }
    };

    if decoded.len() != uncompressed_size {
        return Err(Error::SizeMismatch {
            expected: uncompressed_size,
            actual: decoded.len(),
        });
    }

    Ok(decoded)
}

/// Encodes `data` (at most [`MAX_CHUNK_SIZE`] bytes) as a complete SQSH
/// chunk using `selector`. Per-chunk obfuscation is never applied by this
/// encoder (the flag is always observed zero in practice, `spec.md` §9);
/// [`decode_chunk`] still honors it on read.
pub(crate) fn encode_chunk(data: &[u8], selector: Selector) -> Result<Vec<u8>> {
    debug_assert!(data.len() <= MAX_CHUNK_SIZE);

    let payload = match selector {
        Selector::Stored => data.to_vec(),
        Selector::Lz77 => lz77::compress(data),
        Selector::Deflate => {
            let mut out = Vec::new();
            ZlibEncoder::new(data, Compression::default()).read_to_end(&mut out)?;
            out
        }
    };

    let checksum = additive_checksum(&payload);
    let payload_size: u32 = payload.len().try_into()?;
    let uncompressed_size: u32 = data.len().try_into()?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.push(0); // reserved
    out.push(selector.to_byte());
    out.push(0); // per-chunk obfuscation flag
    out.extend_from_slice(&payload_size.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&payload);

    Ok(out)
}
