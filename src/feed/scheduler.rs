//! Feed file scheduler.
//!
//! The feed root holds one subdirectory per chain. Within a chain directory
//! every store feed is processed before any price feed: price rows must never
//! reference a branch the catalog has not seen. Chains are processed
//! sequentially; a chain whose file fails to parse is abandoned for this pass
//! (its unprocessed files stay in place for the next run) without affecting
//! the other chains.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::db::Db;
use crate::feed::archive;
use crate::feed::price_feed::{self, PriceFeedOutcome};
use crate::feed::store_feed;

/// Why a price filename yielded no branch id. Both are permanent skips; the
/// distinction keeps the skip taxonomy auditable in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchIdError {
    /// No hyphen-delimited numeric run anywhere in the name.
    Absent,
    /// Several distinct numeric runs and no positional match to pick one.
    Ambiguous,
}

impl fmt::Display for BranchIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchIdError::Absent => write!(f, "no branch code in filename"),
            BranchIdError::Ambiguous => write!(f, "multiple candidate branch codes in filename"),
        }
    }
}

pub fn is_store_feed(file_name: &str) -> bool {
    file_name.starts_with("Stores") && file_name.ends_with(".xml")
}

pub fn is_price_feed(file_name: &str) -> bool {
    (file_name.starts_with("Price") || file_name.starts_with("PriceFull"))
        && file_name.ends_with(".xml")
}

/// Extract the branch id from a price-feed filename.
///
/// Stage one is the positional convention: a 3-digit code between hyphens,
/// followed by the 8-digit date (`...-054-20250101...`). Stage two falls back
/// to hyphen-delimited numeric runs and accepts only an unambiguous one.
pub fn extract_branch_id(file_name: &str) -> Result<String, BranchIdError> {
    static POSITIONAL: OnceLock<Regex> = OnceLock::new();
    let positional =
        POSITIONAL.get_or_init(|| Regex::new(r"-(\d{3})-\d{8}").unwrap());
    if let Some(caps) = positional.captures(file_name) {
        return Ok(caps[1].to_string());
    }

    // hyphen-delimited numeric runs: interior '-'-separated segments only
    let parts: Vec<&str> = file_name.split('-').collect();
    let mut runs: Vec<&str> = Vec::new();
    for (i, &part) in parts.iter().enumerate() {
        if i == 0 || i + 1 == parts.len() {
            continue;
        }
        if !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()) && !runs.contains(&part) {
            runs.push(part);
        }
    }
    match runs.as_slice() {
        [] => Err(BranchIdError::Absent),
        [only] => Ok((*only).to_string()),
        _ => Err(BranchIdError::Ambiguous),
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    pub chains_scanned: usize,
    pub chains_failed: usize,
    pub store_files: usize,
    pub price_files: usize,
    pub bad_name_skips: usize,
    pub branch_unknown_skips: usize,
}

/// One pass over the feed root. Rerunning the scan is the retry mechanism:
/// anything left un-archived is picked up again.
pub async fn run_feed_scan(db: &Db, root: &Path) -> Result<ScanSummary> {
    let mut summary = ScanSummary::default();
    let mut chain_dirs: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("cannot read feed root {}", root.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "status" || name == archive::PROCESSED_DIR {
            continue;
        }
        chain_dirs.push(path);
    }
    chain_dirs.sort();
    info!(chains = chain_dirs.len(), root = %root.display(), "feed scan starting");

    for dir in &chain_dirs {
        summary.chains_scanned += 1;
        if let Err(e) = process_chain_dir(db, dir, &mut summary).await {
            summary.chains_failed += 1;
            error!(
                error = %e,
                dir = %dir.display(),
                "chain directory failed; remaining files left in place for retry"
            );
        }
    }

    info!(
        chains = summary.chains_scanned,
        failed = summary.chains_failed,
        store_files = summary.store_files,
        price_files = summary.price_files,
        bad_names = summary.bad_name_skips,
        unknown_branches = summary.branch_unknown_skips,
        "feed scan finished"
    );
    Ok(summary)
}

async fn process_chain_dir(db: &Db, dir: &Path, summary: &mut ScanSummary) -> Result<()> {
    let mut names: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    // store feeds first: the ordering gate for price ingestion
    for name in names.iter().filter(|n| is_store_feed(n)) {
        store_feed::process_store_feed(db, &dir.join(name)).await?;
        summary.store_files += 1;
    }

    for name in names.iter().filter(|n| is_price_feed(n)) {
        let path = dir.join(name);
        match extract_branch_id(name) {
            Err(reason) => {
                warn!(file = %name, %reason, "price feed skipped; naming format failure");
                archive::move_to_processed(&path)?;
                summary.bad_name_skips += 1;
            }
            Ok(branch_id) => match price_feed::process_price_feed(db, &path, &branch_id).await? {
                PriceFeedOutcome::BranchUnknown => summary.branch_unknown_skips += 1,
                PriceFeedOutcome::Processed { .. } => summary.price_files += 1,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_feed_files_by_prefix() {
        assert!(is_store_feed("Stores7290027600007-202501010200.xml"));
        assert!(!is_store_feed("Stores7290027600007-202501010200.gz"));
        assert!(is_price_feed("Price7290027600007-054-202501010200.xml"));
        assert!(is_price_feed("PriceFull7290027600007-054-202501010200.xml"));
        assert!(!is_price_feed("Promo7290027600007-054-202501010200.xml"));
        assert!(!is_store_feed("Price7290027600007-054-202501010200.xml"));
    }

    #[test]
    fn positional_branch_code_wins() {
        assert_eq!(
            extract_branch_id("PriceFull7290027600007-054-202501010200.xml"),
            Ok("054".to_string())
        );
    }

    #[test]
    fn falls_back_to_single_numeric_run() {
        assert_eq!(
            extract_branch_id("Price7290027600007-54-latest.xml"),
            Ok("54".to_string())
        );
    }

    #[test]
    fn absent_and_ambiguous_are_distinct_failures() {
        assert_eq!(
            extract_branch_id("PriceNoBranchCode.xml"),
            Err(BranchIdError::Absent)
        );
        assert_eq!(
            extract_branch_id("Price-12-34-latest.xml"),
            Err(BranchIdError::Ambiguous)
        );
    }

    #[test]
    fn repeated_identical_run_is_not_ambiguous() {
        assert_eq!(
            extract_branch_id("Price-54-54-latest.xml"),
            Ok("54".to_string())
        );
    }
}
