use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::spatial::Position;

/// Identity of a spawned collectible, owned by the persistence service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectibleId(pub u64);

impl fmt::Display for CollectibleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coin#{}", self.0)
    }
}

/// Identity of the spawner that created a collectible
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpawnerId(pub u64);

impl fmt::Display for SpawnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spawner#{}", self.0)
    }
}

/// Random per-process token telling "my claim" apart from claims broadcast by others
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    const LEN: usize = 12;

    pub fn random() -> Self {
        Self::generate(&mut rand::rng())
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        InstanceId((0..Self::LEN).map(|_| char::from(rng.sample(Alphanumeric))).collect())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        InstanceId(s.to_string())
    }
}

/// How a collectible is rendered and heard
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Appearance {
    pub model_url: Option<String>,
    /// Radians per second; 0 when the model carries its own animation
    pub rotation_speed: f32,
    pub pickup_sound: Option<String>,
}

/**
 * One spawned item instance as seen by a claim machine.
 *
 * The attribute set is fixed; anything a host wants to attach beyond it goes
 * into `extensions`, which the core carries around but never interprets.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    pub id: CollectibleId,
    pub spawner_id: Option<SpawnerId>,
    pub name: String,
    pub position: Position,
    /// Positive values reward the claimant, negative values penalize
    pub score_value: f64,
    pub appearance: Appearance,
    /// External item template granted on pickup, if any
    pub reward_item: Option<String>,
    pub extensions: BTreeMap<String, String>,
}

impl Collectible {
    pub fn new(id: CollectibleId, position: Position, score_value: f64) -> Self {
        Self {
            id,
            spawner_id: None,
            name: String::new(),
            position,
            score_value,
            appearance: Appearance::default(),
            reward_item: None,
            extensions: BTreeMap::new(),
        }
    }
}

/// Signals exchanged between observers of the same collectible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClaimSignal {
    Claiming { from_instance: InstanceId },
    ClaimFailed { from_instance: InstanceId },
}

impl ClaimSignal {
    pub fn sender(&self) -> &InstanceId {
        match self {
            ClaimSignal::Claiming { from_instance } | ClaimSignal::ClaimFailed { from_instance } => from_instance,
        }
    }
}

/// Minimal projection of a persisted object, as returned by a radius query
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub id: CollectibleId,
    pub position: Position,
    pub spawner_id: Option<SpawnerId>,
    /// Unix epoch milliseconds of the last write
    pub last_modified_ms: u64,
}

/// Properties handed to the persistence service when a spawner creates a collectible
#[derive(Debug, Clone, PartialEq)]
pub struct NewCollectible {
    pub name: String,
    pub position: Position,
    pub spawner_id: SpawnerId,
    pub score_value: f64,
    pub appearance: Appearance,
    pub reward_item: Option<String>,
    pub extensions: BTreeMap<String, String>,
}

impl NewCollectible {
    /// The collectible this will become once the persistence service assigns `id`
    pub fn into_collectible(self, id: CollectibleId) -> Collectible {
        Collectible {
            id,
            spawner_id: Some(self.spawner_id),
            name: self.name,
            position: self.position,
            score_value: self.score_value,
            appearance: self.appearance,
            reward_item: self.reward_item,
            extensions: self.extensions,
        }
    }
}
