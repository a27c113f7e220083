use coin_common::config::SPAWNER_TICK_INTERVAL;

/// Interval between two ticks of the same spawner
pub const SPAWNER_TICK_MICROS: i64 = SPAWNER_TICK_INTERVAL.as_micros() as i64;

/// Claim signals are kept as long as an observer may still be waiting on them
pub const SIGNAL_RETENTION_MICROS: i64 = 15_000_000;
