//! Filesystem helpers shared across pclvid tools.

use std::path::Path;

use anyhow::{Context, Result};

/// Maximum allowed sensor metadata size for reading into memory.
pub const MAX_METADATA_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB
/// Maximum allowed config file size.
pub const MAX_CONFIG_BYTES: u64 = 1024 * 1024; // 1 MiB

/// Read a file into memory with a size cap.
pub fn read_file_with_limit(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;
    let len = metadata.len();
    if len > max_bytes {
        anyhow::bail!(
            "File too large: {} ({} bytes, max {} bytes)",
            path.display(),
            len,
            max_bytes
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// True when `path` does not exist yet or is a directory without entries.
///
/// A path that exists but is not a directory is never considered empty.
pub fn is_empty_or_missing_dir(path: &Path) -> std::io::Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(std::fs::read_dir(path)?.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dir_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_empty_or_missing_dir(dir.path()).unwrap());
        assert!(is_empty_or_missing_dir(&dir.path().join("missing")).unwrap());

        std::fs::write(dir.path().join("stale.png"), b"x").unwrap();
        assert!(!is_empty_or_missing_dir(dir.path()).unwrap());
        assert!(!is_empty_or_missing_dir(&dir.path().join("stale.png")).unwrap());
    }

    #[test]
    fn test_read_file_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, b"{\"a\":1}").unwrap();

        assert_eq!(read_file_with_limit(&path, 64).unwrap(), b"{\"a\":1}");
        let err = read_file_with_limit(&path, 2).unwrap_err();
        assert!(err.to_string().contains("File too large"));
    }
}
