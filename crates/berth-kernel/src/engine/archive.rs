//! Host-side tar packing for engine copies.
//!
//! The Docker archive API moves tar streams. An upload is extracted into a
//! directory, so a copy to `/ctr/b` uploads an archive whose single top-level
//! entry is named `b` into `/ctr`. A download of `/ctr/b` comes back with `b`
//! as its top-level entry, which is rewritten to the requested host path.
//!
//! Blocking: call from `spawn_blocking`.

use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;

/// Pack `source` (file or directory) as a single top-level entry `entry_name`.
pub(crate) fn pack(source: &Path, entry_name: &str) -> Result<Vec<u8>, EngineError> {
    let meta = std::fs::metadata(source)?;
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    if meta.is_dir() {
        builder.append_dir_all(entry_name, source)?;
    } else {
        builder.append_path_with_name(source, entry_name)?;
    }

    Ok(builder.into_inner()?)
}

/// Unpack an archive so its top-level entry lands at `dest`.
///
/// Returns the number of entries written.
pub(crate) fn unpack(archive: &[u8], dest: &Path) -> Result<usize, EngineError> {
    let mut ar = tar::Archive::new(archive);
    let mut written = 0;

    for entry in ar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        // Top-level component is the source basename
        if components.next().is_none() {
            continue;
        }
        let rest: PathBuf = components.collect();
        if rest.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(EngineError::archive(format!(
                "entry {} escapes destination",
                path.display()
            )));
        }

        let target = if rest.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(&rest)
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        written += 1;
    }

    if written == 0 {
        return Err(EngineError::archive("archive contained no entries"));
    }
    Ok(written)
}

/// Split a container path into (parent directory, basename) for uploads.
pub(crate) fn split_container_path(path: &str) -> Result<(String, String), EngineError> {
    let trimmed = path.trim_end_matches('/');
    let p = Path::new(trimmed);
    let name = p
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::archive(format!("no file name in {path}")))?;
    let parent = match p.parent().and_then(|d| d.to_str()) {
        Some("") | None => ".".to_string(),
        Some(d) => d.to_string(),
    };
    Ok((parent, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_roundtrip_renames_to_dest() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("notes.txt");
        std::fs::write(&src, "hello").unwrap();

        let bytes = pack(&src, "renamed.txt").unwrap();
        let dest = dst_dir.path().join("out").join("copy.txt");
        let n = unpack(&bytes, &dest).unwrap();

        assert_eq!(n, 1);
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "hello");
    }

    #[test]
    fn test_directory_roundtrip() {
        let src_dir = tempfile::tempdir().unwrap();
        let tree = src_dir.path().join("tree");
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("a.txt"), "a").unwrap();
        std::fs::write(tree.join("nested").join("b.txt"), "b").unwrap();

        let bytes = pack(&tree, "tree").unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let dest = dst_dir.path().join("restored");
        unpack(&bytes, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(dest.join("nested").join("b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_pack_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = pack(&dir.path().join("absent"), "absent").unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_unpack_empty_archive() {
        let empty = tar::Builder::new(Vec::new()).into_inner().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(&empty, &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, EngineError::Archive(_)));
    }

    #[test]
    fn test_split_container_path() {
        assert_eq!(
            split_container_path("/ctr/b").unwrap(),
            ("/ctr".to_string(), "b".to_string())
        );
        assert_eq!(
            split_container_path("/workspace/out/").unwrap(),
            ("/workspace".to_string(), "out".to_string())
        );
        assert_eq!(split_container_path("file").unwrap(), (".".to_string(), "file".to_string()));
        assert!(split_container_path("/").is_err());
    }
}
