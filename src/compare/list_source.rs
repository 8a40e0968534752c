//! Seam to the external shopping-list service.
//!
//! List CRUD, membership and sharing live outside this crate; the comparison
//! engine only needs the items of one list as an input sequence. The trait is
//! that boundary; `PgListSource` is the production implementation reading the
//! list service's table.

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::Row;

use crate::catalog::db::Db;

/// One shopping-list entry. `product_id` is set when the user picked a
/// catalog item; otherwise the entry is free text. `user_price` is whatever
/// the user typed and is advisory only, never authoritative.
#[derive(Debug, Clone)]
pub struct ListItem {
    pub id: i64,
    pub name: String,
    pub quantity: f64,
    pub product_id: Option<i64>,
    pub user_price: Option<f64>,
}

#[async_trait]
pub trait ListItemSource: Send + Sync {
    async fn list_items(&self, list_id: i64) -> Result<Vec<ListItem>>;
}

pub struct PgListSource {
    db: Db,
}

impl PgListSource {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListItemSource for PgListSource {
    async fn list_items(&self, list_id: i64) -> Result<Vec<ListItem>> {
        let rows = sqlx::query(
            "SELECT li.id, li.itemname, li.quantity, li.product_id, li.price AS user_price
               FROM list_items li
              WHERE li.listid = $1",
        )
        .persistent(false)
        .bind(list_id)
        .fetch_all(&self.db.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for r in rows {
            let quantity: Option<BigDecimal> = r.try_get("quantity").ok();
            let user_price: Option<BigDecimal> = r.try_get("user_price").ok();
            items.push(ListItem {
                id: r.get("id"),
                name: r.get("itemname"),
                quantity: quantity.and_then(|q| q.to_f64()).unwrap_or(1.0),
                product_id: r.try_get("product_id").ok(),
                user_price: user_price.and_then(|p| p.to_f64()),
            });
        }
        Ok(items)
    }
}
