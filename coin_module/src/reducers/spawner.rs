use coin_common::CollectibleStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use spacetimedb::{ReducerContext, Table};

use crate::query_utils::QueryUtils;
use crate::reducers::lifecycle::schedule_spawner_tick;
use crate::store::ModuleStore;
use crate::tables::coin_spawner::{CoinSpawner, SpawnerSettings, coin_spawner};
use crate::tables::collectible::timestamp_millis;
use crate::tables::scheduling::SpawnerTickSchedule;

/// Reducers run deterministically, so randomness is seeded from the transaction
fn tick_rng(ctx: &ReducerContext, spawner_id: u64) -> StdRng {
    let micros = ctx.timestamp.to_micros_since_unix_epoch() as u64;
    StdRng::seed_from_u64(micros ^ spawner_id.rotate_left(32))
}

/**
 * Scheduled reducer running one spawn cycle of a spawner.
 *
 * Failures inside the cycle are logged and never stop the schedule; the
 * tick reschedules itself for as long as the spawner exists.
 */
#[spacetimedb::reducer]
pub fn spawner_tick(ctx: &ReducerContext, schedule: SpawnerTickSchedule) -> Result<(), String> {
    // Only allow scheduler to call
    if ctx.sender != ctx.identity() {
        return Err("Unauthorized".into());
    }

    let pruned = QueryUtils::prune_claim_signals(ctx);
    if pruned > 0 {
        log::debug!("Pruned {} stale claim signals", pruned);
    }

    let Ok(spawner) = QueryUtils::find_spawner(ctx, schedule.spawner_id) else {
        log::info!("Spawner {} is gone, not rescheduling its tick", schedule.spawner_id);
        return Ok(());
    };

    let controller = spawner.controller();
    let mut store = ModuleStore::new(ctx);
    let mut rng = tick_rng(ctx, spawner.spawner_id);
    match controller.tick(&mut store, timestamp_millis(ctx.timestamp), &mut rng) {
        Ok(report) => {
            if let Some(reason) = report.skipped {
                log::debug!("Spawner {} skipped its tick: {:?}", spawner.spawner_id, reason);
            } else {
                log::info!(
                    "Spawner {} spawned {} coins ({} missed rolls, {} failures)",
                    spawner.spawner_id,
                    report.spawned.len(),
                    report.missed_rolls,
                    report.failures.len()
                );
            }
        }
        Err(e) => log::error!("Spawner {} tick failed: {}", spawner.spawner_id, e),
    }

    schedule_spawner_tick(ctx, spawner.spawner_id, Some(&schedule.scheduled_at))
}

/// Place a new spawner owned by the caller and start its tick
#[spacetimedb::reducer]
pub fn create_spawner(
    ctx: &ReducerContext,
    name: String,
    anchor_x: f32,
    anchor_y: f32,
    height: f32,
    settings: SpawnerSettings,
) -> Result<(), String> {
    let spawner = ctx.db.coin_spawner().insert(CoinSpawner {
        spawner_id: 0,
        owner_id: ctx.sender,
        name,
        anchor_x,
        anchor_y,
        height,
        settings,
        created_at: ctx.timestamp,
    });
    log::info!("{} created spawner {} at ({}, {})", ctx.sender, spawner.spawner_id, anchor_x, anchor_y);
    schedule_spawner_tick(ctx, spawner.spawner_id, None)
}

#[spacetimedb::reducer]
pub fn configure_spawner(ctx: &ReducerContext, spawner_id: u64, settings: SpawnerSettings) -> Result<(), String> {
    let mut spawner = QueryUtils::owned_spawner(ctx, spawner_id).map_err(|e| e.to_string())?;
    spawner.settings = settings;
    ctx.db.coin_spawner().spawner_id().update(spawner);
    log::info!("Spawner {} reconfigured", spawner_id);
    Ok(())
}

/// Delete a spawner, its pending ticks and optionally every coin it spawned
#[spacetimedb::reducer]
pub fn delete_spawner(ctx: &ReducerContext, spawner_id: u64, remove_coins: bool) -> Result<(), String> {
    let spawner = QueryUtils::owned_spawner(ctx, spawner_id).map_err(|e| e.to_string())?;
    if remove_coins {
        remove_owned(ctx, &spawner)?;
    }
    QueryUtils::cancel_spawner_ticks(ctx, spawner_id);
    ctx.db.coin_spawner().spawner_id().delete(spawner_id);
    log::info!("Spawner {} deleted", spawner_id);
    Ok(())
}

/// Admin action: spawn one coin right away, ignoring population and rate limits
#[spacetimedb::reducer]
pub fn spawn_now(ctx: &ReducerContext, spawner_id: u64) -> Result<(), String> {
    let spawner = QueryUtils::owned_spawner(ctx, spawner_id).map_err(|e| e.to_string())?;
    let mut store = ModuleStore::new(ctx);
    let id = spawner
        .controller()
        .spawn_now(&mut store, &mut tick_rng(ctx, spawner_id))
        .map_err(|e| e.to_string())?;
    log::info!("Spawner {} manually spawned {}", spawner_id, id);
    Ok(())
}

/// Admin action: remove every coin this spawner owns
#[spacetimedb::reducer]
pub fn remove_all_coins(ctx: &ReducerContext, spawner_id: u64) -> Result<(), String> {
    let spawner = QueryUtils::owned_spawner(ctx, spawner_id).map_err(|e| e.to_string())?;
    remove_owned(ctx, &spawner)
}

fn remove_owned(ctx: &ReducerContext, spawner: &CoinSpawner) -> Result<(), String> {
    let mut store = ModuleStore::new(ctx);
    let removed = spawner.controller().remove_all(&mut store).map_err(|e| e.to_string())?;

    // Corners of a 500 unit spawn square lie outside the search radius
    let stragglers = QueryUtils::collectibles_of_spawner(ctx, spawner.spawner_id);
    for row in &stragglers {
        store.remove(row.id()).map_err(|e| e.to_string())?;
    }
    log::info!("Removed {} coins of spawner {}", removed + stragglers.len(), spawner.spawner_id);
    Ok(())
}
