use anyhow::Result;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::Serialize;
use sqlx::Row;

use crate::catalog::db::Db;

#[derive(Debug, Clone, Serialize)]
pub struct ProductHit {
    pub item_id: i64,
    pub item_name: String,
    pub barcode: String,
    pub item_code: String,
    pub price: Option<f64>,
    pub chain_id: Option<String>,
    pub chain_name: Option<String>,
    pub branch_name: Option<String>,
}

/// Case-insensitive substring search over item names. Each hit carries one
/// representative price row so the caller can show where the price came from.
pub async fn search_products(db: &Db, q: &str, limit: i64) -> Result<Vec<ProductHit>> {
    if q.trim().is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", q.trim());

    let rows = sqlx::query(
        r#"
        SELECT DISTINCT ON (i.id)
               i.id AS item_id,
               i.name AS item_name,
               i.barcode,
               i.item_code,
               p.price,
               c.id AS chain_id,
               c.name AS chain_name,
               b.branch_name
          FROM items i
          LEFT JOIN prices p ON p.item_id = i.id
          LEFT JOIN branches b ON b.id = p.branch_id
          LEFT JOIN chains c ON c.id = b.chain_id
         WHERE i.name ILIKE $1
         ORDER BY i.id, p.price DESC NULLS LAST
         LIMIT $2
        "#,
    )
    .persistent(false)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(&db.pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let price: Option<BigDecimal> = r.try_get("price").ok();
        out.push(ProductHit {
            item_id: r.get("item_id"),
            item_name: r.get("item_name"),
            barcode: r.get("barcode"),
            item_code: r.get("item_code"),
            price: price.and_then(|p| p.to_f64()),
            chain_id: r.try_get("chain_id").ok(),
            chain_name: r.try_get("chain_name").ok(),
            branch_name: r.try_get("branch_name").ok(),
        });
    }
    Ok(out)
}
