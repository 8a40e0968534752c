pub mod archive;
pub mod encoding;
pub mod price_feed;
pub mod scheduler;
pub mod store_feed;
pub mod xml;

pub use scheduler::{run_feed_scan, ScanSummary};
