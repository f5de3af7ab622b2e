//! Artifact resolution and crash-safe file landing.
//!
//! Every durable write in the registry goes through [`copy_atomic`] or
//! [`write_atomic`]: contents land in a uniquely-named temp file inside the
//! destination directory, are fsynced, and are renamed onto the final name.
//! Readers therefore never observe a partially-written file, and an aborted
//! writer leaves at worst an orphaned temp file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ArtifactError {
    /// The resolved artifact path does not exist.
    Missing { path: PathBuf },
    Io {
        step: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactError::Missing { path } => {
                write!(f, "model artifact missing: {}", path.display())
            }
            ArtifactError::Io { step, path, source } => {
                write!(f, "{step} failed for {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtifactError::Missing { .. } => None,
            ArtifactError::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a declared artifact reference to an existing file under
/// `models_root`.
///
/// Only the file-name component of the reference is honored; any directory
/// portion is discarded so a malformed or hostile reference cannot escape the
/// models directory.
pub fn resolve(reference: &str, models_root: &Path) -> Result<PathBuf, ArtifactError> {
    let path = match Path::new(reference).file_name() {
        Some(file_name) => models_root.join(file_name),
        None => models_root.join(reference),
    };
    if !path.is_file() {
        return Err(ArtifactError::Missing { path });
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// Atomic landing
// ---------------------------------------------------------------------------

/// Byte-for-byte copy of `src` to `dest_dir/dest_name`, landed atomically.
/// Source permissions are applied to the copy. Returns the final path.
pub fn copy_atomic(
    src: &Path,
    dest_dir: &Path,
    dest_name: &str,
) -> Result<PathBuf, ArtifactError> {
    let mut src_file = File::open(src).map_err(|e| io_err("open_src", src, e))?;
    let src_meta = src_file
        .metadata()
        .map_err(|e| io_err("stat_src", src, e))?;

    land(dest_dir, dest_name, |tmp_file, tmp_path| {
        io::copy(&mut src_file, tmp_file).map_err(|e| io_err("copy_bytes", tmp_path, e))?;
        tmp_file
            .sync_all()
            .map_err(|e| io_err("fsync_temp", tmp_path, e))?;
        fs::set_permissions(tmp_path, src_meta.permissions())
            .map_err(|e| io_err("copy_permissions", tmp_path, e))
    })
}

/// Land `contents` at `dest_dir/dest_name` atomically.
pub fn write_atomic(
    contents: &[u8],
    dest_dir: &Path,
    dest_name: &str,
) -> Result<PathBuf, ArtifactError> {
    land(dest_dir, dest_name, |tmp_file, tmp_path| {
        tmp_file
            .write_all(contents)
            .map_err(|e| io_err("write_temp", tmp_path, e))?;
        tmp_file
            .sync_all()
            .map_err(|e| io_err("fsync_temp", tmp_path, e))
    })
}

/// Shared temp-write → rename → dir-fsync sequence. `fill` must leave the
/// temp file fully written and synced.
fn land(
    dest_dir: &Path,
    dest_name: &str,
    fill: impl FnOnce(&mut File, &Path) -> Result<(), ArtifactError>,
) -> Result<PathBuf, ArtifactError> {
    fs::create_dir_all(dest_dir).map_err(|e| io_err("create_dest_dir", dest_dir, e))?;

    let final_path = dest_dir.join(dest_name);
    let tmp_path = dest_dir.join(format!(".{dest_name}.tmp-{}", Uuid::new_v4()));

    let mut tmp_file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp_path)
        .map_err(|e| io_err("create_temp", &tmp_path, e))?;

    if let Err(e) = fill(&mut tmp_file, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, &final_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err("rename", &final_path, e));
    }

    sync_dir(dest_dir)?;
    Ok(final_path)
}

fn sync_dir(dir: &Path) -> Result<(), ArtifactError> {
    let handle = File::open(dir).map_err(|e| io_err("open_dir", dir, e))?;
    handle.sync_all().map_err(|e| io_err("fsync_dir", dir, e))
}

fn io_err(step: &'static str, path: &Path, source: io::Error) -> ArtifactError {
    ArtifactError::Io {
        step,
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_uses_only_the_file_name_component() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("model.bin"), b"weights").unwrap();

        let p = resolve("model.bin", tmp.path()).unwrap();
        assert_eq!(p, tmp.path().join("model.bin"));

        // Directory portions are discarded, so a traversal-shaped reference
        // resolves inside the models root or not at all.
        let p = resolve("../../outside/model.bin", tmp.path()).unwrap();
        assert_eq!(p, tmp.path().join("model.bin"));

        let err = resolve("nested/dir/absent.bin", tmp.path()).unwrap_err();
        match err {
            ArtifactError::Missing { path } => {
                assert_eq!(path, tmp.path().join("absent.bin"));
            }
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn resolve_missing_artifact_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve("ghost.bin", tmp.path()),
            Err(ArtifactError::Missing { .. })
        ));
    }

    #[test]
    fn copy_atomic_is_byte_identical_and_leaves_no_temp_residue() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.bin");
        fs::write(&src, b"model bytes").unwrap();
        let dest_dir = tmp.path().join("registry");

        let landed = copy_atomic(&src, &dest_dir, "copy.bin").unwrap();
        assert_eq!(fs::read(&landed).unwrap(), b"model bytes");

        let leftovers: Vec<_> = fs::read_dir(&dest_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn copy_atomic_overwrites_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("new.bin");
        fs::write(&src, b"new").unwrap();
        fs::write(tmp.path().join("alias.bin"), b"old").unwrap();

        copy_atomic(&src, tmp.path(), "alias.bin").unwrap();
        assert_eq!(fs::read(tmp.path().join("alias.bin")).unwrap(), b"new");
    }

    #[test]
    fn write_atomic_lands_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write_atomic(b"{\"models\": []}", tmp.path(), "state.json").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"{\"models\": []}");
    }
}
