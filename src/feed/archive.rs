//! Feed file disposal.
//!
//! A processed (or permanently-skipped) file is moved into a `process/`
//! directory next to where it was found. The move is the durable idempotence
//! marker: a file either still sits in its original location (an error
//! occurred, retry next pass) or exists solely under the archive, never both.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub const PROCESSED_DIR: &str = "process";

/// Move `path` into the sibling `process/` directory, creating it if needed.
/// Returns the archived location.
pub fn move_to_processed(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("feed path has no file name: {}", path.display()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let processed = dir.join(PROCESSED_DIR);
    fs::create_dir_all(&processed)
        .with_context(|| format!("cannot create archive dir {}", processed.display()))?;
    let target = processed.join(file_name);
    fs::rename(path, &target)
        .with_context(|| format!("cannot archive {}", path.display()))?;
    info!(file = %target.display(), "archived feed file");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("smartcart-archive-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn moves_file_exactly_once() {
        let dir = scratch_dir();
        let feed = dir.join("PriceFull123-054-202501010200.xml");
        fs::write(&feed, b"<Root/>").unwrap();

        let archived = move_to_processed(&feed).unwrap();
        assert!(!feed.exists());
        assert!(archived.exists());
        assert_eq!(archived, dir.join(PROCESSED_DIR).join("PriceFull123-054-202501010200.xml"));

        // second disposal of the same original path must fail, not duplicate
        assert!(move_to_processed(&feed).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
