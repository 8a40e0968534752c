//! The five idempotent catalog write operations: chain, sub-chain, branch,
//! and the combined item+price upsert. All are keyed on external identity and
//! safe to re-apply with identical input.

use anyhow::Result;
use bigdecimal::BigDecimal;
use sqlx::Row;
use tracing::debug;

use crate::catalog::db::Db;

/// Manufacturer marker the feeds use when the field is blank.
pub const UNKNOWN_MANUFACTURER: &str = "לא ידוע";

pub async fn upsert_chain(db: &Db, id: &str, name: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO chains (id, name) VALUES ($1, $2)
         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
    )
    .persistent(false)
    .bind(id)
    .bind(name)
    .execute(&db.pool)
    .await?;
    debug!(chain_id = %id, chain_name = %name, "chain upserted");
    Ok(())
}

pub async fn upsert_sub_chain(db: &Db, id: &str, chain_id: &str, name: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO sub_chains (id, chain_id, name) VALUES ($1, $2, $3)
         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
    )
    .persistent(false)
    .bind(id)
    .bind(chain_id)
    .bind(name)
    .execute(&db.pool)
    .await?;
    debug!(sub_chain_id = %id, chain_id = %chain_id, "sub-chain upserted");
    Ok(())
}

pub struct BranchRecord {
    pub id: String,
    pub chain_id: String,
    pub sub_chain_id: Option<String>,
    pub name: String,
    pub address: String,
    pub city: String,
}

/// Branches are treated as immutable once known: conflict on id is a no-op.
pub async fn upsert_branch(db: &Db, branch: &BranchRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO branches (id, chain_id, sub_chain_id, branch_name, address, city)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO NOTHING",
    )
    .persistent(false)
    .bind(&branch.id)
    .bind(&branch.chain_id)
    .bind(branch.sub_chain_id.as_deref())
    .bind(&branch.name)
    .bind(&branch.address)
    .bind(&branch.city)
    .execute(&db.pool)
    .await?;
    debug!(branch_id = %branch.id, chain_id = %branch.chain_id, "branch upserted");
    Ok(())
}

pub async fn branch_exists(db: &Db, branch_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM branches WHERE id = $1)")
        .persistent(false)
        .bind(branch_id)
        .fetch_one(&db.pool)
        .await?;
    Ok(exists)
}

/// One item record from a price feed. Identity is
/// (item_code, manufacturer, is_weighted); barcode mirrors item_code in this
/// feed format.
pub struct ItemRecord {
    pub item_code: String,
    pub name: String,
    pub price: BigDecimal,
    pub manufacturer: String,
    pub unit_qty: String,
    pub is_weighted: bool,
}

/// Upserts the item and its branch price in ONE statement so a price is never
/// written against a half-created item. Conflict on the item identity updates
/// name/unit_qty; conflict on (item, branch) overwrites the price and
/// refreshes the timestamp. Returns the item id.
pub async fn upsert_item_price(db: &Db, branch_id: &str, rec: &ItemRecord) -> Result<i64> {
    let row = sqlx::query(
        "WITH ins_item AS (
             INSERT INTO items (barcode, item_code, name, manufacturer, unit_qty, is_weighted)
             VALUES ($1, $1, $2, $3, $4, $5)
             ON CONFLICT (item_code, manufacturer, is_weighted) DO UPDATE SET
                 name = EXCLUDED.name,
                 unit_qty = EXCLUDED.unit_qty
             RETURNING id
         )
         INSERT INTO prices (item_id, branch_id, price, price_update_time)
         SELECT id, $6, $7, NOW() FROM ins_item
         ON CONFLICT (item_id, branch_id) DO UPDATE SET
             price = EXCLUDED.price,
             price_update_time = NOW()
         RETURNING item_id",
    )
    .persistent(false)
    .bind(&rec.item_code)
    .bind(&rec.name)
    .bind(&rec.manufacturer)
    .bind(&rec.unit_qty)
    .bind(rec.is_weighted)
    .bind(branch_id)
    .bind(&rec.price)
    .fetch_one(&db.pool)
    .await?;
    Ok(row.get::<i64, _>("item_id"))
}
