use coin_common::{Position, SpawnAdmissionController, SpawnerConfig, SpawnerId};
use spacetimedb::{Identity, SpacetimeType, Timestamp};

/**
 * Editable spawner settings as sent by the owner.
 *
 * Unset fields fall back to the defaults applied by `SpawnerConfig`.
 */
#[derive(SpacetimeType, Clone, Debug, PartialEq, Default)]
pub struct SpawnerSettings {
    pub enabled: bool,
    pub spawn_radius: Option<f32>,
    pub spawn_rate_secs: Option<f64>,
    pub spawn_chance_percent: Option<f64>,
    pub spawn_amount: Option<u32>,
    pub max_population: Option<u32>,
    pub score_value: Option<f64>,
    pub model_url: Option<String>,
    pub model_own_animation: bool,
    pub pickup_sound: Option<String>,
    pub reward_item: Option<String>,
}

/**
 * A coin spawner anchored in the world.
 *
 * Only the owner may configure it, spawn from it or clear it. Each spawner
 * has its own self-rescheduling `spawner_tick`.
 */
#[spacetimedb::table(name = coin_spawner, public)]
#[derive(Clone, Debug)]
pub struct CoinSpawner {
    #[primary_key]
    #[auto_inc]
    pub spawner_id: u64,
    #[index(btree)]
    pub owner_id: Identity,
    pub name: String,
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub height: f32,
    pub settings: SpawnerSettings,
    pub created_at: Timestamp,
}

impl CoinSpawner {
    pub fn id(&self) -> SpawnerId {
        SpawnerId(self.spawner_id)
    }

    pub fn anchor(&self) -> Position {
        Position::new(self.anchor_x, self.anchor_y, self.height)
    }

    pub fn config(&self) -> SpawnerConfig {
        let s = self.settings.clone();
        SpawnerConfig {
            enabled: s.enabled,
            name: (!self.name.trim().is_empty()).then(|| self.name.clone()),
            spawn_radius: s.spawn_radius,
            spawn_rate_secs: s.spawn_rate_secs,
            spawn_chance_percent: s.spawn_chance_percent,
            spawn_amount: s.spawn_amount,
            max_population: s.max_population,
            score_value: s.score_value,
            model_url: s.model_url,
            model_own_animation: s.model_own_animation,
            pickup_sound: s.pickup_sound,
            reward_item: s.reward_item,
        }
    }

    pub fn controller(&self) -> SpawnAdmissionController {
        SpawnAdmissionController::new(self.id(), self.anchor(), self.config())
    }

    pub fn is_owned_by(&self, identity: Identity) -> bool {
        self.owner_id == identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawner(name: &str, settings: SpawnerSettings) -> CoinSpawner {
        CoinSpawner {
            spawner_id: 3,
            owner_id: Identity::default(),
            name: name.to_string(),
            anchor_x: 1.0,
            anchor_y: 2.0,
            height: 0.5,
            settings,
            created_at: Timestamp::from_micros_since_unix_epoch(0),
        }
    }

    #[test]
    fn settings_flow_into_the_controller_config() {
        let settings = SpawnerSettings {
            enabled: true,
            spawn_radius: Some(40.0),
            max_population: Some(2),
            reward_item: Some("hat".into()),
            ..Default::default()
        };
        let ctrl = spawner("Plaza", settings).controller();
        assert_eq!(ctrl.spawner_id(), SpawnerId(3));
        assert_eq!(ctrl.anchor(), Position::new(1.0, 2.0, 0.5));
        assert!(ctrl.config().enabled);
        assert_eq!(ctrl.config().radius(), 40.0);
        assert_eq!(ctrl.config().max_population(), 2);
        assert_eq!(ctrl.config().name.as_deref(), Some("Plaza"));
    }

    #[test]
    fn blank_name_is_left_unset() {
        assert_eq!(spawner("  ", SpawnerSettings::default()).config().name, None);
    }
}
