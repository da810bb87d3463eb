//! Scoped staging directories for builds and reads.
//!
//! A build stages one PNG per frame and one compressed stream per channel
//! before bundling. The staging area is either a caller directory (must be
//! empty, kept afterwards for inspection) or a temporary directory owned by
//! the [`Staging`] handle and removed when it is dropped, on success and
//! failure alike.

use std::path::{Path, PathBuf};

use pclvid_shared::fs::is_empty_or_missing_dir;
use tempfile::TempDir;

use crate::error::{PclError, Result};

/// Handle to a staging directory.
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
    owned: Option<TempDir>,
}

impl Staging {
    /// Use a caller directory. It is created if missing and must be empty.
    pub fn caller(path: &Path) -> Result<Self> {
        if !is_empty_or_missing_dir(path)? {
            return Err(PclError::WorkspaceNotEmpty(path.to_path_buf()));
        }
        std::fs::create_dir_all(path)?;
        Ok(Self {
            root: path.to_path_buf(),
            owned: None,
        })
    }

    /// Create a temporary directory removed on drop.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pclvid-").tempdir()?;
        Ok(Self {
            root: dir.path().to_path_buf(),
            owned: Some(dir),
        })
    }

    /// Caller directory when given, temporary directory otherwise.
    pub fn acquire(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::caller(path),
            None => Self::temporary(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// True when the directory is removed on drop.
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Directory holding the staged frames of one (field, channel).
    pub fn frames_dir(&self, field: &str, channel: u8) -> PathBuf {
        self.root.join("frames").join(field).join(format!("ch{channel}"))
    }

    /// Directory holding encoded or extracted channel streams.
    pub fn streams_dir(&self) -> PathBuf {
        self.root.join("streams")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_staging_is_removed() {
        let staging = Staging::temporary().unwrap();
        let path = staging.path().to_path_buf();
        std::fs::write(path.join("frame.png"), b"x").unwrap();
        assert!(staging.is_owned());

        drop(staging);
        assert!(!path.exists());
    }

    #[test]
    fn test_caller_staging_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");

        let staging = Staging::caller(&root).unwrap();
        assert!(!staging.is_owned());
        std::fs::write(root.join("frame.png"), b"x").unwrap();

        drop(staging);
        assert!(root.join("frame.png").exists());
    }

    #[test]
    fn test_non_empty_caller_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale.mp4"), b"x").unwrap();

        let err = Staging::acquire(Some(dir.path())).unwrap_err();
        assert!(matches!(err, PclError::WorkspaceNotEmpty(_)));
    }

    #[test]
    fn test_layout() {
        let staging = Staging::temporary().unwrap();
        let frames = staging.frames_dir("range", 2);
        assert!(frames.ends_with("frames/range/ch2"));
        assert!(staging.streams_dir().ends_with("streams"));
    }
}
