use std::collections::BTreeMap;

use coin_common::spatial::calculate_chunk;
use coin_common::{Appearance, Collectible, CollectibleId, NewCollectible, Position, SpawnerId, StoredObject};
use spacetimedb::{SpacetimeType, Timestamp};

/// One opaque key/value pair carried on a collectible
#[derive(SpacetimeType, Clone, Debug, PartialEq)]
pub struct ExtensionField {
    pub key: String,
    pub value: String,
}

/**
 * A spawned collectible in the world.
 *
 * Rows are created by spawners and deleted exactly once, by the first
 * successful `claim_collectible`. `hidden` is only the optimistic projection
 * written by claimants; it never blocks a claim.
 */
#[spacetimedb::table(name = collectible, public, index(name = idx_chunk, btree(columns = [chunk_x, chunk_y])))]
#[derive(Clone, Debug)]
pub struct CollectibleRow {
    #[primary_key]
    #[auto_inc]
    pub collectible_id: u64,
    #[index(btree)]
    pub spawner_id: u64,
    pub name: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub height: f32,
    // Chunk coordinates for spatial partitioning
    pub chunk_x: i32,
    pub chunk_y: i32,
    pub score_value: f64,
    pub hidden: bool,
    pub model_url: Option<String>,
    pub rotation_speed: f32,
    pub pickup_sound: Option<String>,
    pub reward_item: Option<String>,
    pub extensions: Vec<ExtensionField>,
    pub last_modified: Timestamp,
}

impl CollectibleRow {
    /// Row for a freshly spawned collectible; the id is assigned on insert
    pub fn from_new(new: NewCollectible, now: Timestamp) -> Self {
        let NewCollectible { name, position, spawner_id, score_value, appearance, reward_item, extensions } = new;
        Self {
            collectible_id: 0,
            spawner_id: spawner_id.0,
            name,
            pos_x: position.x,
            pos_y: position.y,
            height: position.height,
            chunk_x: calculate_chunk(position.x),
            chunk_y: calculate_chunk(position.y),
            score_value,
            hidden: false,
            model_url: appearance.model_url,
            rotation_speed: appearance.rotation_speed,
            pickup_sound: appearance.pickup_sound,
            reward_item,
            extensions: extensions.into_iter().map(|(key, value)| ExtensionField { key, value }).collect(),
            last_modified: now,
        }
    }

    pub fn id(&self) -> CollectibleId {
        CollectibleId(self.collectible_id)
    }

    pub fn position(&self) -> Position {
        Position::new(self.pos_x, self.pos_y, self.height)
    }

    pub fn to_collectible(&self) -> Collectible {
        Collectible {
            id: self.id(),
            spawner_id: Some(SpawnerId(self.spawner_id)),
            name: self.name.clone(),
            position: self.position(),
            score_value: self.score_value,
            appearance: Appearance {
                model_url: self.model_url.clone(),
                rotation_speed: self.rotation_speed,
                pickup_sound: self.pickup_sound.clone(),
            },
            reward_item: self.reward_item.clone(),
            extensions: self.extensions.iter().map(|f| (f.key.clone(), f.value.clone())).collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn to_stored(&self) -> StoredObject {
        StoredObject {
            id: self.id(),
            position: self.position(),
            spawner_id: Some(SpawnerId(self.spawner_id)),
            last_modified_ms: timestamp_millis(self.last_modified),
        }
    }
}

/// Unix epoch milliseconds, clamped at zero
pub fn timestamp_millis(ts: Timestamp) -> u64 {
    (ts.to_micros_since_unix_epoch() / 1_000).max(0) as u64
}
