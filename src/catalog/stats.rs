use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::db::Db;

/// Catalog census, used by the import CLI `stats` subcommand.
#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub chains: i64,
    pub sub_chains: i64,
    pub branches: i64,
    pub items: i64,
    pub prices: i64,
    pub last_price_update: Option<DateTime<Utc>>,
}

pub async fn catalog_stats(db: &Db) -> Result<CatalogStats> {
    async fn count(db: &Db, table: &str) -> Result<i64> {
        // table names are a fixed internal set, never user input
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .persistent(false)
            .fetch_one(&db.pool)
            .await?;
        Ok(n)
    }

    let last_price_update: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT MAX(price_update_time) FROM prices")
            .persistent(false)
            .fetch_one(&db.pool)
            .await?;

    Ok(CatalogStats {
        chains: count(db, "chains").await?,
        sub_chains: count(db, "sub_chains").await?,
        branches: count(db, "branches").await?,
        items: count(db, "items").await?,
        prices: count(db, "prices").await?,
        last_price_update,
    })
}
