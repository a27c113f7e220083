use coin_common::spatial::chunk_span;
use coin_common::{Position, SpawnError, SpawnerId};
use spacetimedb::{ReducerContext, Table};

use crate::constants::SIGNAL_RETENTION_MICROS;
use crate::tables::claim_signal::claim_signal;
use crate::tables::coin_spawner::{CoinSpawner, coin_spawner};
use crate::tables::collectible::{CollectibleRow, collectible};
use crate::tables::scheduling::spawner_tick_schedule;

/// Lookup helpers shared by the reducers
pub struct QueryUtils;

impl QueryUtils {
    pub fn find_spawner(ctx: &ReducerContext, spawner_id: u64) -> Result<CoinSpawner, SpawnError> {
        ctx.db
            .coin_spawner()
            .spawner_id()
            .find(spawner_id)
            .ok_or(SpawnError::SpawnerNotFound(SpawnerId(spawner_id)))
    }

    /// The spawner, provided the caller owns it
    pub fn owned_spawner(ctx: &ReducerContext, spawner_id: u64) -> Result<CoinSpawner, SpawnError> {
        let spawner = Self::find_spawner(ctx, spawner_id)?;
        if !spawner.is_owned_by(ctx.sender) {
            log::warn!("{} tried to administer spawner {} it does not own", ctx.sender, spawner_id);
            return Err(SpawnError::Unauthorized);
        }
        Ok(spawner)
    }

    /// All collectibles within `radius` of `center` on the ground plane.
    /// Only the chunks overlapping the search square are read.
    pub fn collectibles_near_position(ctx: &ReducerContext, center: Position, radius: f32) -> Vec<CollectibleRow> {
        let (xs, ys) = chunk_span(center, radius);
        let mut found = Vec::new();
        for cx in xs {
            found.extend(
                ctx.db
                    .collectible()
                    .idx_chunk()
                    .filter((cx, ys.clone()))
                    .filter(|c| c.position().within(&center, radius)),
            );
        }
        found
    }

    pub fn collectibles_of_spawner(ctx: &ReducerContext, spawner_id: u64) -> Vec<CollectibleRow> {
        ctx.db.collectible().spawner_id().filter(spawner_id).collect()
    }

    /// Delete claim signals older than the claim timeout. Returns how many went.
    pub fn prune_claim_signals(ctx: &ReducerContext) -> usize {
        let cutoff = ctx.timestamp.to_micros_since_unix_epoch() - SIGNAL_RETENTION_MICROS;
        let stale: Vec<u64> = ctx
            .db
            .claim_signal()
            .iter()
            .filter(|s| s.sent_at.to_micros_since_unix_epoch() < cutoff)
            .map(|s| s.signal_id)
            .collect();
        for signal_id in &stale {
            ctx.db.claim_signal().signal_id().delete(*signal_id);
        }
        stale.len()
    }

    /// Drop every pending tick of a spawner
    pub fn cancel_spawner_ticks(ctx: &ReducerContext, spawner_id: u64) {
        let scheduled: Vec<u64> =
            ctx.db.spawner_tick_schedule().spawner_id().filter(spawner_id).map(|s| s.scheduled_id).collect();
        for scheduled_id in scheduled {
            ctx.db.spawner_tick_schedule().scheduled_id().delete(scheduled_id);
        }
    }
}
