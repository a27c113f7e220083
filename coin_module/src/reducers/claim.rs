use coin_common::error::OBJECT_NOT_FOUND;
use spacetimedb::{ReducerContext, Table};

use crate::tables::claim_signal::{ClaimSignalEvent, ClaimSignalKind, claim_signal};
use crate::tables::collectible::collectible;

/// Optimistic projection written by a claimant; never consulted by `claim_collectible`
#[spacetimedb::reducer]
pub fn set_collectible_hidden(ctx: &ReducerContext, collectible_id: u64, hidden: bool) -> Result<(), String> {
    let Some(mut row) = ctx.db.collectible().collectible_id().find(collectible_id) else {
        // Already claimed by someone else, nothing left to hide
        log::debug!("Ignoring hidden={} for missing collectible {}", hidden, collectible_id);
        return Ok(());
    };
    if row.hidden != hidden {
        row.hidden = hidden;
        ctx.db.collectible().collectible_id().update(row);
    }
    Ok(())
}

/// Publish a claim signal to every observer subscribed to `claim_signal`
#[spacetimedb::reducer]
pub fn broadcast_claim_signal(
    ctx: &ReducerContext,
    collectible_id: u64,
    from_instance: String,
    kind: ClaimSignalKind,
) -> Result<(), String> {
    if from_instance.is_empty() {
        return Err("Claim signals need a sender instance".to_string());
    }
    ctx.db.claim_signal().insert(ClaimSignalEvent {
        signal_id: 0,
        collectible_id,
        from_instance,
        kind,
        sender: ctx.sender,
        sent_at: ctx.timestamp,
    });
    Ok(())
}

/**
 * Authoritative claim of a collectible.
 *
 * Reducers are serialized transactions, so exactly one caller finds the row
 * and deletes it; everyone after that gets `OBJECT_NOT_FOUND`.
 */
#[spacetimedb::reducer]
pub fn claim_collectible(ctx: &ReducerContext, collectible_id: u64, from_instance: String) -> Result<(), String> {
    let row = ctx.db.collectible().collectible_id().find(collectible_id).ok_or_else(|| {
        log::info!("{} lost the race for collectible {}", from_instance, collectible_id);
        OBJECT_NOT_FOUND.to_string()
    })?;

    ctx.db.collectible().collectible_id().delete(collectible_id);
    log::info!("{} ({}) claimed {} worth {}", ctx.sender, from_instance, row.name, row.score_value);
    Ok(())
}
