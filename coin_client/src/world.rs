//! In-process world shared by every local player session.
//!
//! Stands in for the persistence service, the broadcast bus and the external
//! score services. Removal is exclusive (the first claimant wins); broadcasts
//! go to every other observer's inbox and may be dropped at `loss_rate`.
use std::collections::{BTreeMap, VecDeque};

use coin_common::error::OBJECT_NOT_FOUND;
use coin_common::{
    ClaimError, ClaimSignal, Collectible, CollectibleId, CollectibleStore, InstanceId, NewCollectible, Position,
    ScoreRecord, SpawnError, StoredObject,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Unix epoch milliseconds from the wall clock
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, Clone)]
pub struct WorldObject {
    pub collectible: Collectible,
    pub hidden: bool,
    pub last_modified_ms: u64,
}

#[derive(Debug, Default)]
struct ScoreBook {
    records: BTreeMap<(String, String), ScoreRecord>,
    campaigns: BTreeMap<(String, String), f64>,
    next_record: u64,
}

pub struct LocalWorld {
    objects: BTreeMap<CollectibleId, WorldObject>,
    next_id: u64,
    inboxes: BTreeMap<InstanceId, VecDeque<(CollectibleId, ClaimSignal)>>,
    loss_rate: f64,
    rng: StdRng,
    scores: ScoreBook,
    inventories: BTreeMap<String, Vec<String>>,
}

impl LocalWorld {
    pub fn new(seed: u64) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            inboxes: BTreeMap::new(),
            loss_rate: 0.0,
            rng: StdRng::seed_from_u64(seed),
            scores: ScoreBook::default(),
            inventories: BTreeMap::new(),
        }
    }

    /// Fraction of broadcasts silently dropped, per recipient
    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.values()
    }

    pub fn object(&self, id: CollectibleId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    // ----- broadcast bus -----

    pub fn join(&mut self, instance: InstanceId) {
        self.inboxes.entry(instance).or_default();
    }

    pub fn leave(&mut self, instance: &InstanceId) {
        self.inboxes.remove(instance);
    }

    pub fn broadcast(&mut self, from: &InstanceId, collectible: CollectibleId, signal: ClaimSignal) {
        for (instance, inbox) in self.inboxes.iter_mut() {
            if instance == from {
                continue;
            }
            if self.loss_rate > 0.0 && self.rng.random::<f64>() < self.loss_rate {
                log::debug!("Dropped {:?} on its way to {}", signal, instance);
                continue;
            }
            inbox.push_back((collectible, signal.clone()));
        }
    }

    pub fn take_inbox(&mut self, instance: &InstanceId) -> Vec<(CollectibleId, ClaimSignal)> {
        self.inboxes.get_mut(instance).map(|inbox| inbox.drain(..).collect()).unwrap_or_default()
    }

    // ----- claims -----

    pub fn set_hidden(&mut self, id: CollectibleId, hidden: bool) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.hidden = hidden;
        }
    }

    /// Exclusive removal: only the first caller for an id succeeds
    pub fn claim(&mut self, id: CollectibleId) -> Result<(), ClaimError> {
        match self.objects.remove(&id) {
            Some(object) => {
                log::info!("{} claimed", object.collectible.name);
                Ok(())
            }
            None => Err(ClaimError::NotFound(OBJECT_NOT_FOUND.to_string())),
        }
    }

    // ----- external services -----

    /// Give `owner` an empty score record of `template` if it has none
    pub fn ensure_score_record(&mut self, owner: &str, template: &str) {
        let book = &mut self.scores;
        let key = (owner.to_string(), template.to_string());
        if !book.records.contains_key(&key) {
            book.next_record += 1;
            let record = ScoreRecord { id: format!("record-{}", book.next_record), total: 0.0 };
            book.records.insert(key, record);
        }
    }

    pub fn find_score_record(&self, owner: &str, template: &str) -> Option<ScoreRecord> {
        self.scores.records.get(&(owner.to_string(), template.to_string())).cloned()
    }

    pub fn add_record_points(&mut self, record_id: &str, points: f64) -> Result<(), String> {
        let record = self
            .scores
            .records
            .values_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| format!("record {record_id} does not exist"))?;
        record.total += points;
        Ok(())
    }

    pub fn campaign_points(&self, owner: &str, campaign_id: &str) -> f64 {
        self.scores.campaigns.get(&(owner.to_string(), campaign_id.to_string())).copied().unwrap_or(0.0)
    }

    pub fn add_campaign_points(&mut self, owner: &str, campaign_id: &str, points: f64) -> f64 {
        let total = self.scores.campaigns.entry((owner.to_string(), campaign_id.to_string())).or_insert(0.0);
        *total += points;
        *total
    }

    pub fn grant_item(&mut self, owner: &str, item: &str) -> String {
        let items = self.inventories.entry(owner.to_string()).or_default();
        items.push(item.to_string());
        format!("{item}#{}", items.len())
    }

    pub fn inventory(&self, owner: &str) -> &[String] {
        self.inventories.get(owner).map(Vec::as_slice).unwrap_or_default()
    }
}

impl CollectibleStore for LocalWorld {
    fn fetch_in_radius(&self, center: Position, radius: f32) -> Result<Vec<StoredObject>, SpawnError> {
        Ok(self
            .objects
            .values()
            .filter(|o| o.collectible.position.within(&center, radius))
            .map(|o| StoredObject {
                id: o.collectible.id,
                position: o.collectible.position,
                spawner_id: o.collectible.spawner_id,
                last_modified_ms: o.last_modified_ms,
            })
            .collect())
    }

    fn create(&mut self, collectible: NewCollectible) -> Result<CollectibleId, SpawnError> {
        self.next_id += 1;
        let id = CollectibleId(self.next_id);
        let object = WorldObject {
            collectible: collectible.into_collectible(id),
            hidden: false,
            last_modified_ms: now_millis(),
        };
        self.objects.insert(id, object);
        Ok(id)
    }

    fn remove(&mut self, id: CollectibleId) -> Result<(), SpawnError> {
        self.objects
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SpawnError::Persistence(format!("{id} was not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coin_common::{SpawnAdmissionController, SpawnerConfig, SpawnerId};

    fn spawn(world: &mut LocalWorld) -> CollectibleId {
        let spawner = SpawnAdmissionController::new(SpawnerId(1), Position::default(), SpawnerConfig::enabled());
        spawner.spawn_now(world, &mut StdRng::seed_from_u64(5)).unwrap()
    }

    #[test]
    fn removal_is_exclusive() {
        let mut world = LocalWorld::new(1);
        let id = spawn(&mut world);
        assert_eq!(world.claim(id), Ok(()));
        assert!(matches!(world.claim(id), Err(ClaimError::NotFound(_))));
    }

    #[test]
    fn broadcasts_skip_the_sender() {
        let mut world = LocalWorld::new(1);
        let (a, b) = (InstanceId::from("a"), InstanceId::from("b"));
        world.join(a.clone());
        world.join(b.clone());
        world.broadcast(&a, CollectibleId(1), ClaimSignal::Claiming { from_instance: a.clone() });
        assert!(world.take_inbox(&a).is_empty());
        assert_eq!(world.take_inbox(&b).len(), 1);
        assert!(world.take_inbox(&b).is_empty());
    }

    #[test]
    fn total_loss_drops_every_broadcast() {
        let mut world = LocalWorld::new(1).with_loss_rate(1.0);
        let (a, b) = (InstanceId::from("a"), InstanceId::from("b"));
        world.join(a.clone());
        world.join(b.clone());
        world.broadcast(&a, CollectibleId(1), ClaimSignal::Claiming { from_instance: a.clone() });
        assert!(world.take_inbox(&b).is_empty());
    }

    #[test]
    fn scores_and_items_are_kept_per_owner() {
        let mut world = LocalWorld::new(1);
        world.ensure_score_record("alice", "coins");
        let record = world.find_score_record("alice", "coins").unwrap();
        world.add_record_points(&record.id, 3.0).unwrap();
        assert_eq!(world.find_score_record("alice", "coins").unwrap().total, 3.0);
        assert!(world.find_score_record("bob", "coins").is_none());

        assert_eq!(world.add_campaign_points("bob", "spring", 2.0), 2.0);
        assert_eq!(world.campaign_points("bob", "spring"), 2.0);
        assert_eq!(world.campaign_points("alice", "spring"), 0.0);

        assert_eq!(world.grant_item("alice", "hat"), "hat#1");
        assert_eq!(world.inventory("alice"), ["hat".to_string()]);
    }
}
