use spacetimedb::{ReducerContext, ScheduleAt, Table, Timestamp};

use crate::constants::SPAWNER_TICK_MICROS;
use crate::tables::coin_spawner::coin_spawner;
use crate::tables::scheduling::{SpawnerTickSchedule, spawner_tick_schedule};

/**
 * Initialization reducer called when the module is first published.
 *
 * Re-arms the tick of every spawner that has none pending, so spawners
 * survive a republish with a cleared schedule.
 */
#[spacetimedb::reducer(init)]
pub fn module_init(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Coin module initialized");

    let spawner_ids: Vec<u64> = ctx.db.coin_spawner().iter().map(|s| s.spawner_id).collect();
    for spawner_id in spawner_ids {
        if ctx.db.spawner_tick_schedule().spawner_id().filter(spawner_id).next().is_none() {
            schedule_spawner_tick(ctx, spawner_id, None)?;
        }
    }
    Ok(())
}

/**
 * Helper function to schedule the next tick of a spawner
 *
 * The next tick lands one interval after `previous` when the previous tick
 * had a fixed time, otherwise one interval from now.
 */
pub fn schedule_spawner_tick(
    ctx: &ReducerContext,
    spawner_id: u64,
    previous: Option<&ScheduleAt>,
) -> Result<(), String> {
    let base_time = match previous {
        Some(ScheduleAt::Time(timestamp)) => *timestamp,
        _ => ctx.timestamp,
    };

    // Never schedule into the past after a long stall
    let next_micros = (base_time.to_micros_since_unix_epoch() + SPAWNER_TICK_MICROS)
        .max(ctx.timestamp.to_micros_since_unix_epoch());
    let next_time = Timestamp::from_micros_since_unix_epoch(next_micros);

    ctx.db.spawner_tick_schedule().insert(SpawnerTickSchedule {
        scheduled_id: 0,
        scheduled_at: ScheduleAt::Time(next_time),
        spawner_id,
    });
    log::debug!("Spawner {} ticks next at {} us", spawner_id, next_micros);
    Ok(())
}

#[spacetimedb::reducer(client_connected)]
pub fn on_client_connected(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Client connected: {:?}", ctx.sender);
    Ok(())
}

#[spacetimedb::reducer(client_disconnected)]
pub fn on_client_disconnected(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Client disconnected: {:?}", ctx.sender);
    Ok(())
}
