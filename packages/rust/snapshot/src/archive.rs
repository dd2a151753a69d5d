//! Gzip-compressed tar archives of snapshot trees.

use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, HeaderMode};

use repodoc_shared::{RepoDocError, Result};

use crate::manifest::walk_tracked;

fn archive_error(context: &str, e: impl std::fmt::Display) -> RepoDocError {
    RepoDocError::Materialization(format!("{context}: {e}"))
}

/// Pack every tracked file under `root` into a `.tar.gz` buffer.
///
/// Entries are written in the manifest walk order with deterministic
/// headers, so identical trees produce identical archives.
pub fn pack_tree(root: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.mode(HeaderMode::Deterministic);

    for file in walk_tracked(root)? {
        builder
            .append_path_with_name(&file.abs_path, &file.rel_path)
            .map_err(|e| archive_error(&format!("failed to archive {}", file.rel_path), e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| archive_error("failed to finish archive", e))?;
    encoder
        .finish()
        .map_err(|e| archive_error("failed to compress archive", e))
}

/// Extract a `.tar.gz` buffer into `dest`.
///
/// Any entry whose path would land outside `dest` fails the whole
/// extraction.
pub fn unpack_tree(bytes: &[u8], dest: &Path) -> Result<usize> {
    std::fs::create_dir_all(dest).map_err(|e| RepoDocError::io(dest, e))?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| archive_error("failed to read archive", e))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error("corrupt archive entry", e))?;
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<invalid path>".to_string());
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| archive_error(&format!("failed to extract {name}"), e))?;
        if !unpacked {
            return Err(RepoDocError::Materialization(format!(
                "archive entry escapes destination: {name}"
            )));
        }
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{manifest_signature, scan_tree};
    use std::path::PathBuf;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("repodoc-archive-{label}-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn pack_unpack_preserves_signature() {
        let src = temp_dir("src");
        std::fs::create_dir_all(src.join("src/nested")).unwrap();
        std::fs::write(src.join("README.md"), "hello\n").unwrap();
        std::fs::write(src.join("src/nested/mod.rs"), "mod x;\n").unwrap();
        std::fs::create_dir_all(src.join(".git")).unwrap();
        std::fs::write(src.join(".git/HEAD"), "ref\n").unwrap();

        let bytes = pack_tree(&src).unwrap();
        assert_eq!(pack_tree(&src).unwrap(), bytes);

        let dest = temp_dir("dest");
        assert_eq!(unpack_tree(&bytes, &dest).unwrap(), 2);
        assert!(!dest.join(".git").exists());
        assert_eq!(
            manifest_signature(&scan_tree(&src).unwrap()),
            manifest_signature(&scan_tree(&dest).unwrap())
        );

        std::fs::remove_dir_all(&src).ok();
        std::fs::remove_dir_all(&dest).ok();
    }

    #[test]
    fn escaping_entries_are_refused() {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let data = b"pwned";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        // set_path rejects "..", so write the raw name bytes.
        let name = b"../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let dest = temp_dir("escape");
        let err = unpack_tree(&bytes, &dest).unwrap_err();
        assert!(matches!(err, RepoDocError::Materialization(_)));
        assert!(!dest.parent().unwrap().join("escape.txt").exists());

        std::fs::remove_dir_all(&dest).ok();
    }

    #[test]
    fn garbage_is_an_error() {
        let dest = temp_dir("garbage");
        assert!(unpack_tree(b"definitely not gzip", &dest).is_err());
        std::fs::remove_dir_all(&dest).ok();
    }
}
