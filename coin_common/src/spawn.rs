use std::collections::BTreeMap;

use rand::Rng;

use crate::config::SpawnerConfig;
use crate::error::{SkipReason, SpawnError};
use crate::spatial::{Position, SPAWNER_SEARCH_RADIUS};
use crate::types::{Appearance, CollectibleId, NewCollectible, SpawnerId, StoredObject};

pub const DEFAULT_MODEL_URL: &str = "gold-pirate-coin.glb";
pub const DEFAULT_PICKUP_SOUND: &str = "collect.wav";
/// Extension key set on collectibles whose model animates itself
pub const DO_NOT_CLONE_KEY: &str = "do_not_clone";

/// Persistence service as seen by a spawner
pub trait CollectibleStore {
    fn fetch_in_radius(&self, center: Position, radius: f32) -> Result<Vec<StoredObject>, SpawnError>;
    fn create(&mut self, collectible: NewCollectible) -> Result<CollectibleId, SpawnError>;
    fn remove(&mut self, id: CollectibleId) -> Result<(), SpawnError>;
}

/// Outcome of one spawner tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    pub spawned: Vec<CollectibleId>,
    pub skipped: Option<SkipReason>,
    /// Spawn attempts that lost the chance roll
    pub missed_rolls: u32,
    /// Spawn attempts the store refused; the tick carried on without them
    pub failures: Vec<SpawnError>,
}

/**
 * Admission control for one spawner.
 *
 * A tick is gated, in order, by the enabled flag, the population cap and the
 * spawn rate; each admitted attempt then rolls against the spawn chance and
 * places the new collectible uniformly in a square around the anchor.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnAdmissionController {
    spawner_id: SpawnerId,
    anchor: Position,
    config: SpawnerConfig,
}

impl SpawnAdmissionController {
    pub fn new(spawner_id: SpawnerId, anchor: Position, config: SpawnerConfig) -> Self {
        Self { spawner_id, anchor, config }
    }

    pub fn spawner_id(&self) -> SpawnerId {
        self.spawner_id
    }

    pub fn anchor(&self) -> Position {
        self.anchor
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SpawnerConfig) {
        self.config = config;
    }

    /// Collectibles in the search radius that this spawner created
    pub fn owned<St: CollectibleStore + ?Sized>(&self, store: &St) -> Result<Vec<StoredObject>, SpawnError> {
        let nearby = store.fetch_in_radius(self.anchor, SPAWNER_SEARCH_RADIUS)?;
        Ok(nearby.into_iter().filter(|o| o.spawner_id == Some(self.spawner_id)).collect())
    }

    /// Gates of a tick. On admission returns how many spawn attempts to make.
    pub fn admit(&self, owned: &[StoredObject], now_ms: u64) -> Result<u32, SkipReason> {
        if !self.config.enabled {
            return Err(SkipReason::Disabled);
        }

        let max = self.config.max_population();
        if owned.len() >= max {
            return Err(SkipReason::PopulationCap { owned: owned.len(), max });
        }

        let last_spawn_ms = owned.iter().map(|o| o.last_modified_ms).max().unwrap_or(0);
        let next_spawn_ms = last_spawn_ms.saturating_add(self.config.rate().as_millis() as u64);
        if now_ms < next_spawn_ms {
            return Err(SkipReason::RateLimited { next_spawn_ms });
        }

        Ok(self.config.amount())
    }

    pub fn roll_chance<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        let picked = rng.random::<f64>();
        let chance = self.config.chance();
        let hit = picked < chance;
        if !hit {
            log::debug!("{}: spawn chance didn't succeed, chance={} picked={}", self.spawner_id, chance, picked);
        }
        hit
    }

    pub fn sample_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let radius = self.config.radius();
        self.anchor.offset(rng.random_range(-radius..=radius), rng.random_range(-radius..=radius))
    }

    /// Properties of a collectible spawned at `position`
    pub fn new_collectible(&self, position: Position) -> NewCollectible {
        let config = &self.config;
        let mut extensions = BTreeMap::new();
        if config.model_own_animation {
            extensions.insert(DO_NOT_CLONE_KEY.to_string(), "true".to_string());
        }
        NewCollectible {
            name: format!("[Coin] {}", config.name.as_deref().unwrap_or("Untitled")),
            position,
            spawner_id: self.spawner_id,
            score_value: config.score_value(),
            appearance: Appearance {
                model_url: Some(config.model_url.clone().unwrap_or_else(|| DEFAULT_MODEL_URL.to_string())),
                rotation_speed: config.rotation_speed(),
                pickup_sound: Some(config.pickup_sound.clone().unwrap_or_else(|| DEFAULT_PICKUP_SOUND.to_string())),
            },
            reward_item: config.reward_item.clone(),
            extensions,
        }
    }

    /// One scheduled cycle. Only the population query can fail the whole tick.
    pub fn tick<St, R>(&self, store: &mut St, now_ms: u64, rng: &mut R) -> Result<TickReport, SpawnError>
    where
        St: CollectibleStore + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = TickReport::default();
        if !self.config.enabled {
            report.skipped = Some(SkipReason::Disabled);
            return Ok(report);
        }

        let owned = self.owned(store)?;
        log::debug!("{}: found {} owned collectibles", self.spawner_id, owned.len());

        let attempts = match self.admit(&owned, now_ms) {
            Ok(attempts) => attempts,
            Err(reason) => {
                log::debug!("{}: skipping tick, {:?}", self.spawner_id, reason);
                report.skipped = Some(reason);
                return Ok(report);
            }
        };

        for _ in 0..attempts {
            if !self.roll_chance(rng) {
                report.missed_rolls += 1;
                continue;
            }
            match self.spawn_one(store, rng) {
                Ok(id) => report.spawned.push(id),
                Err(e) => {
                    log::error!("{}: failed to spawn: {}", self.spawner_id, e);
                    report.failures.push(e);
                }
            }
        }
        Ok(report)
    }

    /// Admin action: spawn one collectible right away, ignoring every gate
    pub fn spawn_now<St, R>(&self, store: &mut St, rng: &mut R) -> Result<CollectibleId, SpawnError>
    where
        St: CollectibleStore + ?Sized,
        R: Rng + ?Sized,
    {
        self.spawn_one(store, rng)
    }

    /// Admin action: remove every collectible this spawner owns. Returns how many went.
    pub fn remove_all<St: CollectibleStore + ?Sized>(&self, store: &mut St) -> Result<usize, SpawnError> {
        let owned = self.owned(store)?;
        for object in &owned {
            store.remove(object.id)?;
        }
        log::info!("{}: removed {} collectibles", self.spawner_id, owned.len());
        Ok(owned.len())
    }

    fn spawn_one<St, R>(&self, store: &mut St, rng: &mut R) -> Result<CollectibleId, SpawnError>
    where
        St: CollectibleStore + ?Sized,
        R: Rng + ?Sized,
    {
        let position = self.sample_position(rng);
        let id = store.create(self.new_collectible(position))?;
        log::info!("{}: spawned {} at {}, {}", self.spawner_id, id, position.x, position.y);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[derive(Default)]
    struct VecStore {
        objects: Vec<(StoredObject, Option<NewCollectible>)>,
        next_id: u64,
        now_ms: u64,
        fail_creates: bool,
    }

    impl VecStore {
        fn with_owned(spawner: SpawnerId, count: usize, last_modified_ms: u64) -> Self {
            let mut store = Self::default();
            for _ in 0..count {
                store.next_id += 1;
                let object = StoredObject {
                    id: CollectibleId(store.next_id),
                    position: Position::default(),
                    spawner_id: Some(spawner),
                    last_modified_ms,
                };
                store.objects.push((object, None));
            }
            store
        }
    }

    impl CollectibleStore for VecStore {
        fn fetch_in_radius(&self, center: Position, radius: f32) -> Result<Vec<StoredObject>, SpawnError> {
            Ok(self.objects.iter().map(|(o, _)| o.clone()).filter(|o| o.position.within(&center, radius)).collect())
        }

        fn create(&mut self, collectible: NewCollectible) -> Result<CollectibleId, SpawnError> {
            if self.fail_creates {
                return Err(SpawnError::Persistence("disk full".into()));
            }
            self.next_id += 1;
            let object = StoredObject {
                id: CollectibleId(self.next_id),
                position: collectible.position,
                spawner_id: Some(collectible.spawner_id),
                last_modified_ms: self.now_ms,
            };
            self.objects.push((object, Some(collectible)));
            Ok(CollectibleId(self.next_id))
        }

        fn remove(&mut self, id: CollectibleId) -> Result<(), SpawnError> {
            self.objects.retain(|(o, _)| o.id != id);
            Ok(())
        }
    }

    const SPAWNER: SpawnerId = SpawnerId(7);
    const NOW_MS: u64 = 1_000_000;

    fn controller(config: SpawnerConfig) -> SpawnAdmissionController {
        SpawnAdmissionController::new(SPAWNER, Position::new(100.0, -20.0, 3.0), config)
    }

    #[test]
    fn disabled_spawner_never_queries_or_spawns() {
        let ctrl = controller(SpawnerConfig::default());
        let mut store = VecStore::default();
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.skipped, Some(SkipReason::Disabled));
        assert!(store.objects.is_empty());
    }

    #[test]
    fn population_cap_blocks_the_tick() {
        let mut config = SpawnerConfig::enabled();
        config.max_population = Some(3);
        let ctrl = controller(config);
        let mut store = VecStore::with_owned(SPAWNER, 3, 0);
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.skipped, Some(SkipReason::PopulationCap { owned: 3, max: 3 }));
        assert_eq!(store.objects.len(), 3);
    }

    #[test]
    fn others_collectibles_do_not_count_towards_the_cap() {
        let mut config = SpawnerConfig::enabled();
        config.max_population = Some(1);
        let ctrl = controller(config);
        let mut store = VecStore::with_owned(SpawnerId(99), 5, 0);
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.spawned.len(), 1);
    }

    #[test]
    fn rate_limit_counts_from_the_newest_owned_collectible() {
        let ctrl = controller(SpawnerConfig::enabled());
        let mut store = VecStore::with_owned(SPAWNER, 1, NOW_MS - 10_000);
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.skipped, Some(SkipReason::RateLimited { next_spawn_ms: NOW_MS + 5_000 }));

        let report = ctrl.tick(&mut store, NOW_MS + 5_000, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.spawned.len(), 1);
    }

    #[test]
    fn amount_bounds_spawns_per_tick() {
        let mut config = SpawnerConfig::enabled();
        config.spawn_amount = Some(4);
        let ctrl = controller(config);
        let mut store = VecStore::default();
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(report.spawned.len(), 4);
        assert_eq!(store.objects.len(), 4);
    }

    #[test]
    fn zero_chance_never_spawns() {
        let mut config = SpawnerConfig::enabled();
        config.spawn_chance_percent = Some(0.0);
        config.spawn_amount = Some(5);
        let ctrl = controller(config);
        let mut store = VecStore::default();
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(3)).unwrap();
        assert!(report.spawned.is_empty());
        assert_eq!(report.missed_rolls, 5);
    }

    #[test]
    fn spawned_collectibles_stay_within_the_radius_square() {
        let mut config = SpawnerConfig::enabled();
        config.spawn_radius = Some(25.0);
        let ctrl = controller(config);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let p = ctrl.sample_position(&mut rng);
            assert!((p.x - 100.0).abs() <= 25.0);
            assert!((p.y + 20.0).abs() <= 25.0);
            assert_eq!(p.height, 3.0);
        }
    }

    #[test]
    fn store_failures_are_reported_without_failing_the_tick() {
        let mut config = SpawnerConfig::enabled();
        config.spawn_amount = Some(2);
        let ctrl = controller(config);
        let mut store = VecStore { fail_creates: true, ..Default::default() };
        let report = ctrl.tick(&mut store, NOW_MS, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(report.spawned.is_empty());
    }

    #[test]
    fn spawn_now_ignores_the_gates() {
        let mut config = SpawnerConfig::default();
        config.max_population = Some(1);
        let ctrl = controller(config);
        let mut store = VecStore::with_owned(SPAWNER, 1, NOW_MS);
        assert!(ctrl.spawn_now(&mut store, &mut StdRng::seed_from_u64(1)).is_ok());
        assert_eq!(store.objects.len(), 2);
    }

    #[test]
    fn remove_all_only_touches_owned_collectibles() {
        let ctrl = controller(SpawnerConfig::enabled());
        let mut store = VecStore::with_owned(SPAWNER, 2, 0);
        let foreign = StoredObject {
            id: CollectibleId(50),
            position: Position::default(),
            spawner_id: Some(SpawnerId(1)),
            last_modified_ms: 0,
        };
        store.objects.push((foreign, None));
        assert_eq!(ctrl.remove_all(&mut store), Ok(2));
        assert_eq!(store.objects.len(), 1);
    }

    #[test]
    fn new_collectible_carries_config_and_defaults() {
        let mut config = SpawnerConfig::enabled();
        config.name = Some("Plaza".into());
        config.score_value = Some(5.0);
        config.model_own_animation = true;
        config.reward_item = Some("hat".into());
        let coin = controller(config).new_collectible(Position::default());
        assert_eq!(coin.name, "[Coin] Plaza");
        assert_eq!(coin.score_value, 5.0);
        assert_eq!(coin.spawner_id, SPAWNER);
        assert_eq!(coin.appearance.rotation_speed, 0.0);
        assert_eq!(coin.appearance.model_url.as_deref(), Some(DEFAULT_MODEL_URL));
        assert_eq!(coin.extensions.get(DO_NOT_CLONE_KEY).map(String::as_str), Some("true"));
        assert_eq!(coin.reward_item.as_deref(), Some("hat"));
    }
}
