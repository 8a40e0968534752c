//! Price feed processor.
//!
//! One price feed carries the current prices of a single branch. The branch
//! must already be in the catalog: store feeds are processed first, and a
//! price feed for an unknown branch would fail identically on every retry,
//! so it is archived unparsed as a permanent skip. Item records are upserted
//! one at a time, each write completing before the next element is pulled;
//! a malformed record never blocks the thousands of records behind it.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use tracing::{debug, info, warn};

use crate::catalog::db::Db;
use crate::catalog::upserts::{self, ItemRecord, UNKNOWN_MANUFACTURER};
use crate::feed::{archive, encoding, xml::Element, xml::ElementStream};

#[derive(Debug, PartialEq, Eq)]
pub enum PriceFeedOutcome {
    Processed { upserted: u64, skipped: u64 },
    /// Branch absent from the catalog; file archived without parsing.
    BranchUnknown,
}

pub async fn process_price_feed(
    db: &Db,
    path: &Path,
    branch_id: &str,
) -> Result<PriceFeedOutcome> {
    if !upserts::branch_exists(db, branch_id).await? {
        warn!(
            branch_id,
            file = %path.display(),
            "branch not in catalog; archiving price feed unprocessed"
        );
        archive::move_to_processed(path)?;
        return Ok(PriceFeedOutcome::BranchUnknown);
    }

    info!(branch_id, file = %path.display(), "parsing price feed");
    let reader = encoding::decoded_reader(path)?;
    let mut stream = ElementStream::new(reader, &["Item"]);
    let mut upserted = 0u64;
    let mut skipped = 0u64;

    while let Some(item) = stream
        .next_element()
        .with_context(|| format!("price feed parse failed: {}", path.display()))?
    {
        match item_record(&item) {
            Some(rec) => match upserts::upsert_item_price(db, branch_id, &rec).await {
                Ok(_) => upserted += 1,
                Err(e) => {
                    warn!(error = %e, item_code = %rec.item_code, branch_id, "item upsert failed");
                    skipped += 1;
                }
            },
            None => skipped += 1,
        }
    }

    info!(branch_id, upserted, skipped, "price feed complete");
    archive::move_to_processed(path)?;
    Ok(PriceFeedOutcome::Processed { upserted, skipped })
}

// Field extraction with the feed's defaulting rules. Returns None for
// records that cannot be ingested (missing identity or malformed price).
fn item_record(el: &Element) -> Option<ItemRecord> {
    let item_code = el.field("ItemCode");
    let name = el.field("ItemName");
    if item_code.is_empty() || name.is_empty() {
        debug!("item record without code or name; skipping");
        return None;
    }

    let price_raw = el.field("ItemPrice");
    let Ok(price) = BigDecimal::from_str(price_raw.trim()) else {
        warn!(item_code = %item_code, price = %price_raw, "malformed price; skipping record");
        return None;
    };

    let manufacturer = match el.field("ManufacturerName") {
        m if m.is_empty() => UNKNOWN_MANUFACTURER.to_string(),
        m => m,
    };
    let unit_qty = match el.field("UnitQty") {
        u if u.is_empty() => "1".to_string(),
        u => u,
    };
    let is_weighted = matches!(el.field("BIsWeighted").trim(), "1" | "true" | "TRUE");

    Some(ItemRecord {
        item_code,
        name,
        price,
        manufacturer,
        unit_qty,
        is_weighted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn parse_item(xml: &str) -> Option<ItemRecord> {
        let mut stream = ElementStream::new(xml.as_bytes(), &["Item"]);
        let el = stream.next_element().unwrap().unwrap();
        item_record(&el)
    }

    #[test]
    fn applies_defaults_for_manufacturer_and_unit_qty() {
        let rec = parse_item(
            "<Item><ItemCode>7290000000001</ItemCode><ItemName>חלב תנובה</ItemName>\
             <ItemPrice>6.90</ItemPrice></Item>",
        )
        .unwrap();
        assert_eq!(rec.manufacturer, UNKNOWN_MANUFACTURER);
        assert_eq!(rec.unit_qty, "1");
        assert!(!rec.is_weighted);
        assert_eq!(rec.price, BigDecimal::from_str("6.90").unwrap());
    }

    #[test]
    fn weighted_flag_comes_from_the_feed() {
        let rec = parse_item(
            "<Item><ItemCode>123</ItemCode><ItemName>עגבניות</ItemName>\
             <ItemPrice>4.50</ItemPrice><bIsWeighted>1</bIsWeighted>\
             <ManufacturerName>השדה</ManufacturerName><UnitQty>ק\"ג</UnitQty></Item>",
        )
        .unwrap();
        assert!(rec.is_weighted);
        assert_eq!(rec.manufacturer, "השדה");
        assert_eq!(rec.unit_qty, "ק\"ג");
    }

    #[test]
    fn malformed_price_drops_only_that_record() {
        assert!(parse_item(
            "<Item><ItemCode>1</ItemCode><ItemName>x</ItemName><ItemPrice>N/A</ItemPrice></Item>"
        )
        .is_none());
        assert!(parse_item(
            "<Item><ItemCode>1</ItemCode><ItemName>x</ItemName></Item>"
        )
        .is_none());
    }

    #[test]
    fn missing_identity_fields_drop_the_record() {
        assert!(parse_item("<Item><ItemName>x</ItemName><ItemPrice>1</ItemPrice></Item>").is_none());
        assert!(parse_item("<Item><ItemCode>1</ItemCode><ItemPrice>1</ItemPrice></Item>").is_none());
    }
}
