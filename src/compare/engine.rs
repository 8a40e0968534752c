//! Price comparison engine.
//!
//! Pure read side: given one list's items, produce per-chain totals, a
//! cross-chain best mix and the savings spread. Branch granularity is
//! collapsed up front — per (chain, item) only the cheapest branch price in
//! that chain participates. Free-text items are resolved by case-insensitive
//! substring match against catalog item names, first match wins.
//!
//! Any fetch error aborts the whole comparison; a partial result would
//! present a misleading "cheapest" chain computed from incomplete data.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use bigdecimal::{BigDecimal, ToPrimitive};
use itertools::Itertools;
use serde::Serialize;
use sqlx::Row;

use crate::catalog::db::Db;
use crate::compare::list_source::{ListItem, ListItemSource};

/// One (chain, product) price row, already collapsed to the minimum across
/// the chain's branches. `product_name` is carried only by fuzzy-match rows.
#[derive(Debug, Clone)]
pub struct ChainPrice {
    pub chain_id: String,
    pub chain_name: String,
    pub product_id: i64,
    pub price: f64,
    pub product_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PricedItem {
    pub item_name: String,
    pub price: f64,
    pub quantity: f64,
    pub subtotal: f64,
}

#[derive(Debug, Serialize)]
pub struct ChainComparison {
    pub chain_id: String,
    pub chain_name: String,
    pub total: f64,
    pub items: Vec<PricedItem>,
    pub missing: Vec<String>,
    #[serde(rename = "missingCount")]
    pub missing_count: usize,
    #[serde(rename = "itemCount")]
    pub item_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CheapestChain {
    pub chain_name: String,
    pub total: f64,
}

#[derive(Debug, Serialize)]
pub struct BestMixItem {
    pub item_name: String,
    pub price: f64,
    pub quantity: f64,
    pub subtotal: f64,
    pub store: String,
}

#[derive(Debug, Serialize)]
pub struct BestMix {
    pub total: f64,
    pub items: Vec<BestMixItem>,
    #[serde(rename = "storeCount")]
    pub store_count: usize,
    pub stores: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResult {
    pub chains: Vec<ChainComparison>,
    pub cheapest: Option<CheapestChain>,
    #[serde(rename = "bestMix")]
    pub best_mix: Option<BestMix>,
    #[serde(rename = "totalItems")]
    pub total_items: usize,
    #[serde(rename = "matchedItems")]
    pub matched_items: usize,
    #[serde(rename = "unmatchedItems")]
    pub unmatched_items: usize,
    pub savings: f64,
    #[serde(rename = "bestMixSavings")]
    pub best_mix_savings: f64,
}

impl ComparisonResult {
    fn empty() -> Self {
        Self {
            chains: Vec::new(),
            cheapest: None,
            best_mix: None,
            total_items: 0,
            matched_items: 0,
            unmatched_items: 0,
            savings: 0.0,
            best_mix_savings: 0.0,
        }
    }
}

/// Entry point: fetch the list through the external-list seam, fetch prices,
/// compute. Read-only; never mutates the catalog.
pub async fn compare_list(
    db: &Db,
    source: &dyn ListItemSource,
    list_id: i64,
) -> Result<ComparisonResult> {
    let items = source
        .list_items(list_id)
        .await
        .context("failed to fetch list items")?;
    if items.is_empty() {
        return Ok(ComparisonResult::empty());
    }

    let product_ids: Vec<i64> = items.iter().filter_map(|i| i.product_id).collect();
    let free_text: Vec<String> = items
        .iter()
        .filter(|i| i.product_id.is_none())
        .map(|i| i.name.clone())
        .collect();

    let linked_rows = fetch_linked_prices(db, &product_ids)
        .await
        .context("failed to fetch chain prices for linked items")?;
    let fuzzy_rows = fetch_fuzzy_prices(db, &free_text)
        .await
        .context("failed to fetch fuzzy-matched chain prices")?;

    Ok(compute_comparison(&items, &linked_rows, &fuzzy_rows))
}

// Cheapest branch price per (chain, item) for the linked product set.
async fn fetch_linked_prices(db: &Db, product_ids: &[i64]) -> Result<Vec<ChainPrice>> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT ON (c.id, p.item_id)
               c.id AS chain_id, c.name AS chain_name,
               p.item_id AS product_id, p.price
          FROM prices p
          JOIN branches b ON p.branch_id = b.id
          JOIN chains c ON b.chain_id = c.id
         WHERE p.item_id = ANY($1)
         ORDER BY c.id, p.item_id, p.price ASC
        "#,
    )
    .persistent(false)
    .bind(product_ids)
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter().map(|r| chain_price(r, false)).collect()
}

// Candidate rows for free-text items: any catalog item whose name contains
// one of the search terms, again collapsed to one price per (chain, item).
async fn fetch_fuzzy_prices(db: &Db, names: &[String]) -> Result<Vec<ChainPrice>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let patterns: Vec<String> = names.iter().map(|n| format!("%{}%", n)).collect();
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT ON (c.id, i.id)
               c.id AS chain_id, c.name AS chain_name,
               i.id AS product_id, i.name AS product_name, p.price
          FROM prices p
          JOIN items i ON p.item_id = i.id
          JOIN branches b ON p.branch_id = b.id
          JOIN chains c ON b.chain_id = c.id
         WHERE i.name ILIKE ANY($1)
         ORDER BY c.id, i.id, p.price ASC
        "#,
    )
    .persistent(false)
    .bind(&patterns)
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter().map(|r| chain_price(r, true)).collect()
}

fn chain_price(r: sqlx::postgres::PgRow, with_name: bool) -> Result<ChainPrice> {
    let price: BigDecimal = r.try_get("price")?;
    Ok(ChainPrice {
        chain_id: r.try_get("chain_id")?,
        chain_name: r.try_get("chain_name")?,
        product_id: r.try_get("product_id")?,
        price: price.to_f64().unwrap_or(f64::MAX),
        product_name: if with_name {
            Some(r.try_get("product_name")?)
        } else {
            None
        },
    })
}

// parseFloat(quantity) || 1 semantics from the list service
fn effective_qty(q: f64) -> f64 {
    if q.is_nan() || q == 0.0 {
        1.0
    } else {
        q
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// The pure computation over already-fetched rows.
pub fn compute_comparison(
    items: &[ListItem],
    linked_rows: &[ChainPrice],
    fuzzy_rows: &[ChainPrice],
) -> ComparisonResult {
    let unlinked: Vec<&ListItem> = items.iter().filter(|i| i.product_id.is_none()).collect();

    // Resolve free text: the first catalog row whose name contains the item's
    // text wins. Later, better-looking matches do not replace it.
    let mut implied: HashMap<i64, i64> = HashMap::new();
    for row in fuzzy_rows {
        let Some(product_name) = &row.product_name else {
            continue;
        };
        let product_name = product_name.to_lowercase();
        for item in &unlinked {
            if product_name.contains(&item.name.to_lowercase()) {
                implied.entry(item.id).or_insert(row.product_id);
            }
        }
    }

    let mut matchable: Vec<(&ListItem, i64)> = Vec::new();
    for item in items {
        if let Some(pid) = item.product_id {
            matchable.push((item, pid));
        } else if let Some(pid) = implied.get(&item.id) {
            matchable.push((item, *pid));
        }
    }
    let unmatched_items = unlinked.iter().filter(|i| !implied.contains_key(&i.id)).count();

    // minimum price per product within each chain
    struct ChainAgg {
        name: String,
        prices: HashMap<i64, f64>,
    }
    let mut by_chain: BTreeMap<String, ChainAgg> = BTreeMap::new();
    for row in linked_rows.iter().chain(fuzzy_rows.iter()) {
        let agg = by_chain
            .entry(row.chain_id.clone())
            .or_insert_with(|| ChainAgg {
                name: row.chain_name.clone(),
                prices: HashMap::new(),
            });
        let slot = agg.prices.entry(row.product_id).or_insert(f64::INFINITY);
        if row.price < *slot {
            *slot = row.price;
        }
    }

    let mut chains: Vec<ChainComparison> = Vec::new();
    for (chain_id, agg) in &by_chain {
        let mut total = 0.0;
        let mut priced: Vec<PricedItem> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for (item, pid) in &matchable {
            let qty = effective_qty(item.quantity);
            match agg.prices.get(pid) {
                Some(&price) => {
                    let subtotal = price * qty;
                    total += subtotal;
                    priced.push(PricedItem {
                        item_name: item.name.clone(),
                        price,
                        quantity: qty,
                        subtotal,
                    });
                }
                // an unpriced item never contributes zero cost
                None => missing.push(item.name.clone()),
            }
        }
        chains.push(ChainComparison {
            chain_id: chain_id.clone(),
            chain_name: agg.name.clone(),
            total,
            item_count: priced.len(),
            items: priced,
            missing_count: missing.len(),
            missing,
        });
    }
    chains.sort_by(|a, b| a.total.partial_cmp(&b.total).unwrap_or(Ordering::Equal));

    let cheapest = chains.first().map(|c| CheapestChain {
        chain_name: c.chain_name.clone(),
        total: c.total,
    });
    let most_expensive = if chains.len() > 1 {
        chains.last().map(|c| c.total)
    } else {
        None
    };

    // best mix: per item the cheapest chain, first seen wins ties
    let mut mix_items: Vec<BestMixItem> = Vec::new();
    let mut mix_total = 0.0;
    for (item, pid) in &matchable {
        let mut best: Option<(f64, &str)> = None;
        for agg in by_chain.values() {
            if let Some(&price) = agg.prices.get(pid) {
                if best.map_or(true, |(b, _)| price < b) {
                    best = Some((price, agg.name.as_str()));
                }
            }
        }
        let Some((price, store)) = best else {
            continue;
        };
        let qty = effective_qty(item.quantity);
        let subtotal = price * qty;
        mix_total += subtotal;
        mix_items.push(BestMixItem {
            item_name: item.name.clone(),
            price,
            quantity: qty,
            subtotal,
            store: store.to_string(),
        });
    }
    let best_mix = if mix_items.is_empty() {
        None
    } else {
        let stores: Vec<String> = mix_items.iter().map(|i| i.store.clone()).unique().collect();
        Some(BestMix {
            total: mix_total,
            store_count: stores.len(),
            stores,
            items: mix_items,
        })
    };

    let savings = match (&cheapest, most_expensive) {
        (Some(c), Some(hi)) => round2(hi - c.total),
        _ => 0.0,
    };
    let best_mix_savings = match (&best_mix, most_expensive) {
        (Some(m), Some(hi)) => round2(hi - m.total),
        _ => 0.0,
    };

    ComparisonResult {
        total_items: items.len(),
        matched_items: matchable.len(),
        unmatched_items,
        chains,
        cheapest,
        best_mix,
        savings,
        best_mix_savings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn li(id: i64, name: &str, qty: f64, product_id: Option<i64>) -> ListItem {
        ListItem {
            id,
            name: name.to_string(),
            quantity: qty,
            product_id,
            user_price: None,
        }
    }

    fn row(chain: &str, product_id: i64, price: f64) -> ChainPrice {
        ChainPrice {
            chain_id: chain.to_string(),
            chain_name: format!("chain {chain}"),
            product_id,
            price,
            product_name: None,
        }
    }

    fn fuzzy_row(chain: &str, product_id: i64, price: f64, product_name: &str) -> ChainPrice {
        ChainPrice {
            product_name: Some(product_name.to_string()),
            ..row(chain, product_id, price)
        }
    }

    #[test]
    fn ranks_chains_and_computes_best_mix() {
        let items = vec![
            li(1, "a", 1.0, Some(101)),
            li(2, "b", 1.0, Some(102)),
            li(3, "c", 1.0, Some(103)),
        ];
        let linked = vec![
            row("A", 101, 10.0),
            row("A", 102, 12.0),
            row("A", 103, 8.0),
            row("B", 101, 9.0),
            row("B", 102, 15.0),
            row("B", 103, 8.0),
        ];
        let result = compute_comparison(&items, &linked, &[]);

        assert_eq!(result.chains.len(), 2);
        assert_eq!(result.chains[0].chain_name, "chain A");
        assert_eq!(result.chains[0].total, 30.0);
        assert_eq!(result.chains[1].total, 32.0);
        assert_eq!(result.cheapest.as_ref().unwrap().total, 30.0);

        let mix = result.best_mix.unwrap();
        assert_eq!(mix.total, 29.0); // 9 + 12 + 8
        assert_eq!(result.best_mix_savings, 3.0); // 32 - 29
        assert_eq!(result.savings, 2.0); // 32 - 30
        assert_eq!(result.matched_items, 3);
        assert_eq!(result.unmatched_items, 0);
    }

    #[test]
    fn free_text_item_takes_first_substring_match() {
        let items = vec![li(1, "חלב", 1.0, None)];
        let fuzzy = vec![
            fuzzy_row("A", 55, 6.9, "חלב תנובה 3%"),
            fuzzy_row("A", 56, 5.9, "חלב טרה 1%"),
        ];
        let result = compute_comparison(&items, &[], &fuzzy);

        assert_eq!(result.matched_items, 1);
        assert_eq!(result.unmatched_items, 0);
        // first row wins even though the second is cheaper
        assert_eq!(result.chains[0].total, 6.9);
        assert_eq!(result.chains[0].items[0].price, 6.9);
    }

    #[test]
    fn unmatched_free_text_is_counted_and_excluded_everywhere() {
        let items = vec![li(1, "a", 1.0, Some(101)), li(2, "שוקולד", 1.0, None)];
        let linked = vec![row("A", 101, 10.0)];
        // fuzzy search returned rows, but none of them contain the item text
        let fuzzy = vec![fuzzy_row("A", 77, 3.0, "ביסקוויטים")];
        let result = compute_comparison(&items, &linked, &fuzzy);

        assert_eq!(result.total_items, 2);
        assert_eq!(result.matched_items, 1);
        assert_eq!(result.unmatched_items, 1);
        assert_eq!(result.chains[0].total, 10.0);
        // the unmatched item is not "missing" either; it is simply absent
        assert!(result.chains[0].missing.is_empty());
    }

    #[test]
    fn missing_item_is_excluded_from_total_and_counted() {
        let items = vec![li(1, "a", 1.0, Some(101)), li(2, "b", 1.0, Some(102))];
        let linked = vec![
            row("A", 101, 10.0),
            row("A", 102, 5.0),
            row("C", 101, 4.0), // chain C has no price for product 102
        ];
        let result = compute_comparison(&items, &linked, &[]);

        let c = result
            .chains
            .iter()
            .find(|ch| ch.chain_id == "C")
            .unwrap();
        assert_eq!(c.total, 4.0);
        assert_eq!(c.missing_count, 1);
        assert_eq!(c.missing, vec!["b".to_string()]);
        assert_eq!(c.item_count, 1);
    }

    #[test]
    fn best_mix_tie_goes_to_first_chain_seen() {
        let items = vec![li(1, "a", 1.0, Some(101))];
        let linked = vec![row("A", 101, 8.0), row("B", 101, 8.0)];
        let result = compute_comparison(&items, &linked, &[]);

        let mix = result.best_mix.unwrap();
        assert_eq!(mix.items[0].store, "chain A");
        assert_eq!(mix.store_count, 1);
    }

    #[test]
    fn quantity_multiplies_and_zero_quantity_means_one() {
        let items = vec![li(1, "a", 3.0, Some(101)), li(2, "b", 0.0, Some(102))];
        let linked = vec![row("A", 101, 2.0), row("A", 102, 5.0)];
        let result = compute_comparison(&items, &linked, &[]);

        assert_eq!(result.chains[0].total, 11.0); // 2*3 + 5*1
    }

    #[test]
    fn empty_list_short_circuits() {
        let result = compute_comparison(&[], &[], &[]);
        assert!(result.chains.is_empty());
        assert!(result.cheapest.is_none());
        assert!(result.best_mix.is_none());
        assert_eq!(result.total_items, 0);
    }

    #[test]
    fn single_chain_has_no_savings_spread() {
        let items = vec![li(1, "a", 1.0, Some(101))];
        let linked = vec![row("A", 101, 10.0)];
        let result = compute_comparison(&items, &linked, &[]);

        assert_eq!(result.savings, 0.0);
        assert_eq!(result.best_mix_savings, 0.0);
    }
}
