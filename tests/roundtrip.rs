//! End-to-end scenarios against the public API: assemble a filesystem
//! tree into an archive, then parse and extract it back
//! (`spec.md` §8 scenarios S1-S6 and boundary tests).

use anyhow::{Context, Result};
use hpi::{Archive, Assembler, EntryKind};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_tree(root: &Path, files: &[(&str, &[u8])]) -> Result<()> {
    for (path, data) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, data)?;
    }
    Ok(())
}

fn assemble_and_parse(files: &[(&str, &[u8])], mode: u8, key: u8) -> Result<(Vec<u8>, Archive)> {
    let dir = tempdir().context("creating source tree")?;
    write_tree(dir.path(), files)?;
    let (bytes, digest) = Assembler::new(mode, key).assemble_dir(dir.path())?;
    assert_eq!(digest.len(), 32);
    let archive = Archive::parse(&bytes)?;
    Ok((bytes, archive))
}

/// S1: single file, deflate, no obfuscation.
#[test]
fn s1_single_file_deflate_no_key() -> Result<()> {
    let (bytes, archive) = assemble_and_parse(&[("file1.txt", b"Hello World!")], 2, 0)?;
    assert_eq!(&bytes[0..4], b"HAPI");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 0x0001_0000);
    assert_eq!(archive.decode("file1.txt")?, b"Hello World!");
    Ok(())
}

/// S2: one chunk of the bytes 0..=255, checksum known in advance.
#[test]
fn s2_sequential_bytes_known_checksum() -> Result<()> {
    let data: Vec<u8> = (0..=255u8).collect();
    let (_, archive) = assemble_and_parse(&[("file2.bin", &data)], 2, 0)?;
    let decoded = archive.decode("file2.bin")?;
    assert_eq!(decoded.len(), 256);
    assert_eq!(decoded, data);
    let sum: u32 = data.iter().map(|&b| u32::from(b)).sum();
    assert_eq!(sum, 0x7F80);
    Ok(())
}

/// S3: 0x20000 bytes -> two chunks, both recovered intact.
#[test]
fn s3_two_chunk_file() -> Result<()> {
    let data = vec![0x58u8; 0x20000];
    let (_, archive) = assemble_and_parse(&[("large.dat", &data)], 2, 0)?;
    let decoded = archive.decode("large.dat")?;
    assert_eq!(decoded.len(), 131_072);
    assert!(decoded.iter().all(|&b| b == 0x58));
    Ok(())
}

/// S4: nested subdirectory, non-zero obfuscation key.
#[test]
fn s4_nested_subdir_with_key() -> Result<()> {
    let (bytes, archive) =
        assemble_and_parse(&[("subdir/nested.txt", b"Nested file content")], 2, 42)?;
    assert_eq!(bytes[12], 42);
    assert_eq!(archive.decode("subdir/nested.txt")?, b"Nested file content");
    assert!(archive.contains("SUBDIR/NESTED.TXT"));
    Ok(())
}

/// S5: stored (uncompressed) mode leaves the payload untouched.
#[test]
fn s5_stored_mode_payload_is_plaintext() -> Result<()> {
    let (_, archive) = assemble_and_parse(&[("simple.txt", b"Simple test")], 0, 0)?;
    assert_eq!(archive.decode("simple.txt")?, b"Simple test");
    Ok(())
}

/// S6: bespoke LZ77 mode over three chunks of pseudo-random data.
#[test]
fn s6_lz77_three_chunks_round_trip() -> Result<()> {
    let mut state: u32 = 0xC0FF_EE11;
    let mut data = Vec::with_capacity(200_000);
    for _ in 0..200_000 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.push((state & 0xFF) as u8);
    }
    let (_, archive) = assemble_and_parse(&[("a.bin", &data)], 1, 0)?;
    assert_eq!(archive.decode("a.bin")?, data);
    Ok(())
}

#[test]
fn zero_byte_file_round_trips() -> Result<()> {
    let (_, archive) = assemble_and_parse(&[("empty.txt", b"")], 2, 0)?;
    assert_eq!(archive.decode("empty.txt")?, b"");
    Ok(())
}

#[test]
fn empty_directory_round_trips() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir(dir.path().join("empty_dir"))?;
    let (bytes, _) = Assembler::new(2, 0).assemble_dir(dir.path())?;
    let archive = Archive::parse(&bytes)?;
    let entries = archive.entries();
    assert_eq!(entries, vec![("empty_dir".to_string(), EntryKind::Directory)]);
    Ok(())
}

#[test]
fn directory_with_only_subdirectories() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("a/b/c"))?;
    let (bytes, _) = Assembler::new(2, 0).assemble_dir(dir.path())?;
    let archive = Archive::parse(&bytes)?;
    assert!(archive.contains("a/b/c"));
    Ok(())
}

#[test]
fn key_zero_and_key_255_both_round_trip() -> Result<()> {
    for key in [0u8, 255u8] {
        let (_, archive) = assemble_and_parse(&[("k.txt", b"key boundary test")], 2, key)?;
        assert_eq!(archive.decode("k.txt")?, b"key boundary test");
    }
    Ok(())
}

/// Header `file_size` always matches the physical length of the bytes
/// produced (`spec.md` §8 property 4).
#[test]
fn header_file_size_matches_byte_length() -> Result<()> {
    let (bytes, _) = assemble_and_parse(&[("a.txt", b"abc"), ("b.txt", b"defgh")], 2, 9)?;
    let declared = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(declared as usize, bytes.len());
    Ok(())
}

/// Two assemblies of the same tree, same mode and key, are byte-identical
/// (`spec.md` §8 property 8).
#[test]
fn assembler_canonical_ordering_is_deterministic() -> Result<()> {
    let dir = tempdir()?;
    write_tree(
        dir.path(),
        &[
            ("zebra.txt", b"z"),
            ("apple.txt", b"a"),
            ("sub/inner.txt", b"i"),
        ],
    )?;
    let (first, _) = Assembler::new(2, 3).assemble_dir(dir.path())?;
    let (second, _) = Assembler::new(2, 3).assemble_dir(dir.path())?;
    assert_eq!(first, second);
    Ok(())
}

/// `extract_all` reproduces the original filesystem tree under a fresh
/// destination directory.
#[test]
fn extract_all_reproduces_original_tree() -> Result<()> {
    let files: &[(&str, &[u8])] = &[
        ("root.txt", b"top level"),
        ("sub/child.txt", b"nested"),
        ("sub/deeper/leaf.txt", b"deep"),
    ];
    let source = tempdir()?;
    write_tree(source.path(), files)?;
    let (bytes, _) = Assembler::new(2, 17).assemble_dir(source.path())?;
    let archive = Archive::parse(&bytes)?;

    let destination = tempdir()?;
    archive.extract_all(destination.path())?;

    for (path, data) in files {
        let extracted = fs::read(destination.path().join(path))
            .with_context(|| format!("reading extracted {path}"))?;
        assert_eq!(&extracted, data);
    }
    Ok(())
}

/// Path components that would escape the destination root are rejected
/// rather than written outside it (`spec.md` §6).
#[test]
fn extract_one_rejects_escaping_path() -> Result<()> {
    let (_, archive) = assemble_and_parse(&[("f.txt", b"x")], 2, 0)?;
    let destination = tempdir()?;
    let result = archive.extract_one("../escape.txt", destination.path());
    assert!(result.is_err());
    Ok(())
}

/// Validation against a reference archive reports the extracted tree as
/// matching when every file is byte-identical.
#[test]
fn validation_passes_for_faithful_extraction() -> Result<()> {
    let files: &[(&str, &[u8])] = &[("a.txt", b"alpha"), ("b/c.txt", b"beta")];
    let source = tempdir()?;
    write_tree(source.path(), files)?;
    let assembler = Assembler::new(2, 0);
    let (bytes, _) = assembler.assemble_dir(source.path())?;
    let reference = Archive::parse(&bytes)?;

    let extracted = tempdir()?;
    reference.extract_all(extracted.path())?;

    let report = assembler.validate_against_reference(extracted.path(), &reference)?;
    assert!(report.is_ok());
    Ok(())
}

/// An archive whose bytes have been corrupted after assembly fails to
/// parse rather than silently producing wrong data.
#[test]
fn corrupted_header_is_rejected() -> Result<()> {
    let (mut bytes, _) = assemble_and_parse(&[("a.txt", b"a")], 2, 0)?;
    bytes[0] = b'X';
    assert!(Archive::parse(&bytes).is_err());
    Ok(())
}
