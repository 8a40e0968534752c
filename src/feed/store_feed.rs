//! Store feed processor.
//!
//! A store feed describes one chain's branches. The document is consumed as a
//! stream of closed elements and folded through a per-document state machine;
//! each upsert completes before the next element is pulled. A single bad
//! record is logged and skipped, a parse error fails the file (left in place
//! for retry), and only a fully-consumed document is archived.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::catalog::db::Db;
use crate::catalog::upserts::{self, BranchRecord};
use crate::feed::{archive, encoding, xml::Element, xml::ElementStream};

const WATCHED: &[&str] = &["ChainId", "ChainName", "SubChainId", "SubChainName", "Store"];

/// Parse state for one store-feed document. Chain and sub-chain codes arrive
/// before the records they scope, so they are carried forward here.
#[derive(Default)]
struct StoreFeedState {
    chain_id: Option<String>,
    chain_name: Option<String>,
    sub_chain_id: Option<String>,
    chain_upserted: bool,
}

pub async fn process_store_feed(db: &Db, path: &Path) -> Result<()> {
    info!(file = %path.display(), "parsing store feed");
    let reader = encoding::decoded_reader(path)?;
    let mut stream = ElementStream::new(reader, WATCHED);
    let mut state = StoreFeedState::default();

    while let Some(el) = stream
        .next_element()
        .with_context(|| format!("store feed parse failed: {}", path.display()))?
    {
        handle_element(db, &mut state, &el).await;
    }

    archive::move_to_processed(path)?;
    Ok(())
}

async fn handle_element(db: &Db, state: &mut StoreFeedState, el: &Element) {
    if el.is_named("ChainId") {
        let val = el.text();
        if !val.is_empty() && state.chain_id.is_none() {
            state.chain_id = Some(val.to_string());
            try_upsert_chain(db, state).await;
        }
    } else if el.is_named("ChainName") {
        let val = el.text();
        if !val.is_empty() && state.chain_name.is_none() {
            state.chain_name = Some(val.to_string());
            try_upsert_chain(db, state).await;
        }
    } else if el.is_named("SubChainId") {
        let val = el.text();
        if !val.is_empty() {
            state.sub_chain_id = Some(val.to_string());
        }
    } else if el.is_named("SubChainName") {
        let (Some(sub_id), Some(chain_id)) = (state.sub_chain_id.clone(), state.chain_id.clone())
        else {
            return;
        };
        if let Err(e) = upserts::upsert_sub_chain(db, &sub_id, &chain_id, el.text()).await {
            error!(error = %e, sub_chain_id = %sub_id, "sub-chain upsert failed");
        }
    } else if el.is_named("Store") {
        handle_store(db, state, el).await;
    }
}

// Upsert the chain once both code and name are known. The flag is set before
// the write, matching the once-per-document contract even if the write fails.
async fn try_upsert_chain(db: &Db, state: &mut StoreFeedState) {
    if state.chain_upserted {
        return;
    }
    let (Some(id), Some(name)) = (state.chain_id.clone(), state.chain_name.clone()) else {
        return;
    };
    state.chain_upserted = true;
    if let Err(e) = upserts::upsert_chain(db, &id, &name).await {
        error!(error = %e, chain_id = %id, "chain upsert failed");
    }
}

async fn handle_store(db: &Db, state: &mut StoreFeedState, el: &Element) {
    let store_id = el.field("StoreId");
    let store_name = el.field("StoreName");
    let address = el.field("Address");
    let city = el.field("City");
    let sub_chain_id = match el.field("SubChainId") {
        s if s.is_empty() => state.sub_chain_id.clone(),
        s => Some(s),
    };

    // Shufersal-format feeds carry ChainName inside each store record.
    let store_chain_name = el.field("ChainName");
    if !store_chain_name.is_empty() && state.chain_name.is_none() {
        state.chain_name = Some(store_chain_name);
        try_upsert_chain(db, state).await;
    }

    if store_id.is_empty() {
        warn!("store record without StoreId; skipping");
        return;
    }
    let Some(chain_id) = state.chain_id.clone() else {
        warn!(store_id = %store_id, "store record before any ChainId; skipping");
        return;
    };

    let branch = BranchRecord {
        id: store_id,
        chain_id,
        sub_chain_id,
        name: store_name,
        address,
        city,
    };
    if let Err(e) = upserts::upsert_branch(db, &branch).await {
        error!(error = %e, branch_id = %branch.id, "branch upsert failed");
    }
}
