//! Per-owner storage quota over the index directory.
//!
//! Usage is never cached: it is the recursive sum of file sizes under
//! the owner's index directory at call time, so WAL sidecars and any
//! stray files count against the ceiling too. The check runs before
//! ingestion touches the index, so an owner already at capacity cannot
//! start a rebuild that would transiently exceed it.

use anyhow::Result;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::Config;

#[derive(Debug, Error)]
#[error("owner {owner} is over the index quota: {usage} of {ceiling} bytes used")]
pub struct QuotaExceeded {
    pub owner: String,
    pub usage: u64,
    pub ceiling: u64,
}

/// Recursive byte size of a directory; 0 when it does not exist.
pub fn dir_size(dir: &Path) -> Result<u64> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut total = 0u64;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Bytes the owner's index currently occupies on disk.
pub fn usage(config: &Config, owner: &str) -> Result<u64> {
    dir_size(&config.owner_index_dir(owner))
}

/// Fail with [`QuotaExceeded`] when the owner's index is at or above
/// the configured ceiling.
pub fn check(config: &Config, owner: &str) -> Result<()> {
    let used = usage(config, owner)?;
    let ceiling = config.quota.max_index_bytes;

    if used >= ceiling {
        return Err(QuotaExceeded {
            owner: owner.to_string(),
            usage: used,
            ceiling,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(data_dir: &Path, ceiling: u64) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.quota.max_index_bytes = ceiling;
        config
    }

    #[test]
    fn missing_directory_uses_zero_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 1024);
        assert_eq!(usage(&config, "nobody").unwrap(), 0);
        assert!(check(&config, "nobody").is_ok());
    }

    #[test]
    fn usage_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 1024);

        let index_dir = config.owner_index_dir("alice");
        std::fs::create_dir_all(index_dir.join("sub")).unwrap();
        std::fs::write(index_dir.join("a.bin"), [0u8; 100]).unwrap();
        std::fs::write(index_dir.join("sub/b.bin"), [0u8; 50]).unwrap();

        assert_eq!(usage(&config, "alice").unwrap(), 150);
    }

    #[test]
    fn at_ceiling_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 100);

        let index_dir = config.owner_index_dir("bob");
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(index_dir.join("index.sqlite"), [0u8; 100]).unwrap();

        let err = check(&config, "bob").unwrap_err();
        let quota = err.downcast_ref::<QuotaExceeded>().unwrap();
        assert_eq!(quota.usage, 100);
        assert_eq!(quota.ceiling, 100);
    }

    #[test]
    fn below_ceiling_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 101);

        let index_dir = config.owner_index_dir("bob");
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(index_dir.join("index.sqlite"), [0u8; 100]).unwrap();

        assert!(check(&config, "bob").is_ok());
    }
}
