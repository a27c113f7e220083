use spacetimedb::{table, ScheduleAt};
use crate::reducers::spawner::spawner_tick;

#[table(name = spawner_tick_schedule, scheduled(spawner_tick))]
#[derive(Clone)]
pub struct SpawnerTickSchedule {
    #[primary_key]
    #[auto_inc]
    pub scheduled_id: u64,
    pub scheduled_at: ScheduleAt,
    #[index(btree)]
    pub spawner_id: u64,
}
