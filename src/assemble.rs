//! Assembly/extraction driver: builds a directory model from a filesystem
//! walk, emits a conforming archive from it, and validates a rebuilt
//! archive against a reference archive when one is supplied
//! (`spec.md` §4.6, §6).

use crate::archive::{self, Archive, EntryKind};
use crate::error::{Error, Result, ValidationReport};
use crate::obfuscation;
use crate::sqsh::Selector;
use crate::tree::BuildNode;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Builds and emits HPI archives with a fixed compression mode and
/// obfuscation key.
pub struct Assembler {
    selector: Selector,
    key_byte: u8,
}

impl Assembler {
    #[must_use]
    pub fn new(compression_mode: u8, key_byte: u8) -> Self {
        let selector = match compression_mode {
            0 => Selector::Stored,
            2 => Selector::Deflate,
            _ => Selector::Lz77,
        };
        Self { selector, key_byte }
    }

    /// Walks `source` into the canonical directory model and emits the
    /// archive bytes for it. Returns the bytes and their SHA-256 digest.
    pub fn assemble_dir(&self, source: &Path) -> Result<(Vec<u8>, [u8; 32])> {
        let mut root = build_node_from_dir(source)?;
        root.canonicalize();
        let bytes = self.assemble_tree(&root)?;
        let digest = Sha256::digest(&bytes).into();
        Ok((bytes, digest))
    }

    /// Emits a complete archive image for an already-canonicalized tree.
    pub(crate) fn assemble_tree(&self, root: &BuildNode) -> Result<Vec<u8>> {
        let (mut buffer, root_offset) = crate::tree::write_root(root, self.selector)?;
        obfuscation::transform(&mut buffer, self.key_byte);

        let archive_size: u32 = (archive::HEADER_SIZE + buffer.len()).try_into()?;
        let mut out = Vec::with_capacity(archive_size as usize);
        archive::write_header(&mut out, archive_size, self.key_byte, root_offset);
        out.extend_from_slice(&buffer);
        Ok(out)
    }

    /// Assembles `source`, then checks the result against `reference`:
    /// every file present in `reference` must be present in `source` with
    /// byte-identical content. Extra files in `source` are reported but
    /// never fail validation.
    pub fn validate_against_reference(
        &self,
        source: &Path,
        reference: &Archive,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for (path, kind) in reference.entries() {
            if kind != EntryKind::File {
                continue;
            }
            let expected = reference.decode(&path)?;

            let disk_path = source.join(&path);
            match fs::read(&disk_path) {
                Ok(actual) if actual == expected => {}
                Ok(_) => report.mismatched.push(path),
                Err(_) => report.missing.push(path),
            }
        }

        let on_disk = list_relative_files(source)?;
        let reference_set: std::collections::HashSet<String> = reference
            .entries()
            .into_iter()
            .filter(|(_, kind)| *kind == EntryKind::File)
            .map(|(path, _)| path)
            .collect();
        for path in on_disk {
            if !reference_set.contains(&path) {
                report.extra.push(path);
            }
        }

        if report.is_ok() {
            Ok(report)
        } else {
            Err(Error::Validation(report))
        }
    }
}

fn build_node_from_dir(dir: &Path) -> Result<BuildNode> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_str().ok_or_else(|| Error::InvalidUtf8Path(dir.join(&file_name)))?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            let child = build_node_from_dir(&path)?;
            let BuildNode::Directory { children: grandchildren, .. } = child else {
                unreachable!()
            };
            children.push(BuildNode::Directory {
                name: name.into(),
                children: grandchildren,
            });
        } else {
            let data = fs::read(&path)?;
            children.push(BuildNode::File {
                name: name.into(),
                data,
            });
        }
    }

    Ok(BuildNode::Directory {
        name: String::new().into(),
        children,
    })
}

fn list_relative_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).into_iter() {
        let entry = entry.map_err(|e| {
            Error::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walkdir traversal failed")
            }))
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_str()
                .ok_or_else(|| Error::InvalidUtf8Path(entry.path().to_path_buf()))?
                .replace(std::path::MAIN_SEPARATOR, "/");
            out.push(relative);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::Assembler;
    use crate::archive::Archive;
    use tempfile::tempdir;

    #[test]
    fn assembles_directory_tree_into_parseable_archive() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("file1.txt"), b"Hello World!").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(
            dir.path().join("subdir").join("nested.txt"),
            b"Nested file content",
        )
        .unwrap();

        let assembler = Assembler::new(2, 0);
        let (bytes, digest) = assembler.assemble_dir(dir.path()).unwrap();
        assert_eq!(digest.len(), 32);

        let archive = Archive::parse(&bytes).unwrap();
        assert_eq!(archive.decode("file1.txt").unwrap(), b"Hello World!");
        assert_eq!(
            archive.decode("subdir/nested.txt").unwrap(),
            b"Nested file content"
        );
    }

    #[test]
    fn two_assemblies_of_the_same_tree_are_byte_identical() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"beta").unwrap();

        let assembler = Assembler::new(0, 7);
        let (first, _) = assembler.assemble_dir(dir.path()).unwrap();
        let (second, _) = assembler.assemble_dir(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn validation_reports_missing_and_mismatched_files() {
        let reference_dir = tempdir().unwrap();
        std::fs::write(reference_dir.path().join("keep.txt"), b"same").unwrap();
        std::fs::write(reference_dir.path().join("changed.txt"), b"original").unwrap();
        std::fs::write(reference_dir.path().join("gone.txt"), b"gone").unwrap();

        let assembler = Assembler::new(0, 0);
        let (reference_bytes, _) = assembler.assemble_dir(reference_dir.path()).unwrap();
        let reference = Archive::parse(&reference_bytes).unwrap();

        let extracted_dir = tempdir().unwrap();
        std::fs::write(extracted_dir.path().join("keep.txt"), b"same").unwrap();
        std::fs::write(extracted_dir.path().join("changed.txt"), b"edited").unwrap();
        std::fs::write(extracted_dir.path().join("extra.txt"), b"surprise").unwrap();

        let err = assembler
            .validate_against_reference(extracted_dir.path(), &reference)
            .unwrap_err();
        match err {
            crate::error::Error::Validation(report) => {
                assert_eq!(report.missing, vec!["gone.txt".to_string()]);
                assert_eq!(report.mismatched, vec!["changed.txt".to_string()]);
                assert_eq!(report.extra, vec!["extra.txt".to_string()]);
            }
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn validation_passes_when_everything_matches() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("only.txt"), b"content").unwrap();

        let assembler = Assembler::new(0, 0);
        let (bytes, _) = assembler.assemble_dir(dir.path()).unwrap();
        let reference = Archive::parse(&bytes).unwrap();

        let report = assembler
            .validate_against_reference(dir.path(), &reference)
            .unwrap();
        assert!(report.is_ok());
    }
}
