use core::num::TryFromIntError;
use std::io;

/// Report produced when a rebuilt archive is checked against a reference
/// archive during assembly (`spec.md` §4.6, §6).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ValidationReport {
    /// Paths present in the reference archive but absent from the
    /// extracted tree on disk.
    pub missing: Vec<String>,
    /// Paths present in both but whose bytes differ.
    pub mismatched: Vec<String>,
    /// Paths present on disk but absent from the reference archive.
    /// Reported for visibility only; never a failure condition.
    pub extra: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("an operation on an integer would have truncated and corrupted data")]
    IntegralTruncation,

    #[error("invalid magic read from archive header: expected {expected:?}, found {found:#010x}")]
    InvalidMagic { expected: [u8; 4], found: u32 },

    #[error("unsupported version tag in archive header: {0:#010x}")]
    InvalidVersion(u32),

    #[error("unknown SQSH compression selector: {0}")]
    UnknownCompression(u8),

    #[error("stored offset {offset:#x} lies outside the valid range [0x14, {archive_size:#x})")]
    OffsetOutOfRange { offset: u32, archive_size: u32 },

    #[error("SQSH checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("decompressed size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("archive-internal name is not valid ASCII: {0:?}")]
    NameNotAscii(Vec<u8>),

    #[error("no such entry in archive: {0:?}")]
    EntryNotFound(String),

    #[error("not a file entry: {0:?}")]
    NotAFile(String),

    #[error("extraction path escapes the destination root: {0}")]
    PathEscapesRoot(String),

    #[error("path is not valid UTF-8: {0:?}")]
    InvalidUtf8Path(std::path::PathBuf),

    #[error("a directory cycle was detected while walking the archive at offset {0:#x}")]
    DirectoryCycle(u32),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("archive does not match reference: {0:?}")]
    Validation(ValidationReport),
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;
