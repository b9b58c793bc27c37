#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

mod archive;
mod assemble;
mod cc;
mod error;
mod io;
mod lz77;
mod obfuscation;
mod payload;
mod sqsh;
mod tree;

pub use archive::{Archive, EntryKind, EntryPath};
pub use assemble::Assembler;
pub use error::{Error, Result, ValidationReport};

pub use bstr::{BStr, BString};
