//! Local connectivity for a player session
//!
//! Adapters that plug a session into the shared `LocalWorld`:
//! 1. `WorldLink`: the claim channel (hidden flag, broadcasts, exclusive removal)
//! 2. `LocalHooks`: pickup hooks backed by the world's inventories
//! 3. `LocalScoreService`: score records and campaigns kept by the world
use std::cell::RefCell;
use std::rc::Rc;

use coin_common::{
    ClaimChannel, ClaimError, ClaimSignal, Collectible, CollectibleId, HookVeto, InstanceId, PickupHooks,
    RewardReceipt, ScoreRecord, ScoreService,
};

use crate::world::LocalWorld;

pub type SharedWorld = Rc<RefCell<LocalWorld>>;

/// Claim channel of one instance
pub struct WorldLink {
    world: SharedWorld,
    instance: InstanceId,
}

impl WorldLink {
    pub fn new(world: SharedWorld, instance: InstanceId) -> Self {
        world.borrow_mut().join(instance.clone());
        Self { world, instance }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }
}

impl Drop for WorldLink {
    fn drop(&mut self) {
        if let Ok(mut world) = self.world.try_borrow_mut() {
            world.leave(&self.instance);
        }
    }
}

impl ClaimChannel for WorldLink {
    fn set_hidden(&self, collectible: CollectibleId, hidden: bool) {
        self.world.borrow_mut().set_hidden(collectible, hidden);
    }

    fn broadcast(&self, collectible: CollectibleId, signal: ClaimSignal) {
        self.world.borrow_mut().broadcast(&self.instance, collectible, signal);
    }

    async fn commit_removal(&self, collectible: CollectibleId) -> Result<(), ClaimError> {
        self.world.borrow_mut().claim(collectible)
    }
}

/// Pickup hooks of one player. Rewards land in the player's inventory.
pub struct LocalHooks {
    world: SharedWorld,
    owner: String,
    veto: Option<String>,
}

impl LocalHooks {
    pub fn new(world: SharedWorld, owner: impl Into<String>) -> Self {
        Self { world, owner: owner.into(), veto: None }
    }

    /// Refuse every pickup with `message`
    pub fn vetoing(mut self, message: impl Into<String>) -> Self {
        self.veto = Some(message.into());
        self
    }
}

impl PickupHooks for LocalHooks {
    async fn before_commit(&self, collectible: &Collectible) -> Option<HookVeto> {
        let message = self.veto.as_ref()?;
        log::debug!("{} vetoed pickup of {}", self.owner, collectible.id);
        Some(HookVeto { error: Some(message.clone()) })
    }

    async fn acquire_reward(&self, item_id: &str, action_name: &str) -> Option<RewardReceipt> {
        let granted = self.world.borrow_mut().grant_item(&self.owner, item_id);
        log::info!("{} granted {} to {}", action_name, granted, self.owner);
        Some(RewardReceipt { item_id: granted })
    }
}

/// Score services of one player
pub struct LocalScoreService {
    world: SharedWorld,
    owner: String,
}

impl LocalScoreService {
    pub fn new(world: SharedWorld, owner: impl Into<String>) -> Self {
        Self { world, owner: owner.into() }
    }
}

impl ScoreService for LocalScoreService {
    async fn find_record(&self, template: &str) -> Option<ScoreRecord> {
        self.world.borrow().find_score_record(&self.owner, template)
    }

    async fn add_record_points(&self, record_id: &str, points: f64, source: &str) -> Option<Result<(), String>> {
        log::debug!("{} adds {} points from {}", self.owner, points, source);
        Some(self.world.borrow_mut().add_record_points(record_id, points))
    }

    async fn campaign_points(&self, campaign_id: &str) -> Option<f64> {
        Some(self.world.borrow().campaign_points(&self.owner, campaign_id))
    }

    async fn add_campaign_points(&self, campaign_id: &str, channel: &str, points: f64) -> Option<f64> {
        log::debug!("{} adds {} campaign points on {}", self.owner, points, channel);
        Some(self.world.borrow_mut().add_campaign_points(&self.owner, campaign_id, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coin_common::{CollectibleStore, NewCollectible, Position, SpawnAdmissionController, SpawnerConfig, SpawnerId};
    use futures::executor::block_on;

    fn shared() -> SharedWorld {
        Rc::new(RefCell::new(LocalWorld::new(3)))
    }

    fn coin(world: &SharedWorld) -> CollectibleId {
        let spawner = SpawnAdmissionController::new(SpawnerId(1), Position::default(), SpawnerConfig::enabled());
        let new: NewCollectible = spawner.new_collectible(Position::new(1.0, 1.0, 0.0));
        world.borrow_mut().create(new).unwrap()
    }

    #[test]
    fn link_leaves_the_bus_when_dropped() {
        let world = shared();
        let a = WorldLink::new(Rc::clone(&world), InstanceId::from("a"));
        let b = WorldLink::new(Rc::clone(&world), InstanceId::from("b"));
        drop(b);
        a.broadcast(CollectibleId(1), ClaimSignal::Claiming { from_instance: a.instance().clone() });
        assert!(world.borrow_mut().take_inbox(&InstanceId::from("b")).is_empty());
    }

    #[test]
    fn second_removal_fails() {
        let world = shared();
        let id = coin(&world);
        let a = WorldLink::new(Rc::clone(&world), InstanceId::from("a"));
        let b = WorldLink::new(Rc::clone(&world), InstanceId::from("b"));
        a.set_hidden(id, true);
        assert!(world.borrow().object(id).unwrap().hidden);
        assert_eq!(block_on(a.commit_removal(id)), Ok(()));
        assert!(block_on(b.commit_removal(id)).is_err());
    }

    #[test]
    fn hooks_grant_rewards_and_veto() {
        let world = shared();
        let hooks = LocalHooks::new(Rc::clone(&world), "alice");
        let receipt = block_on(hooks.acquire_reward("hat", coin_common::channel::REWARD_ACTION)).unwrap();
        assert_eq!(receipt.item_id, "hat#1");
        assert_eq!(world.borrow().inventory("alice"), ["hat".to_string()]);

        let collectible = Collectible::new(CollectibleId(9), Position::default(), 1.0);
        assert_eq!(block_on(hooks.before_commit(&collectible)), None);
        let strict = LocalHooks::new(world, "bob").vetoing("Not today");
        assert_eq!(
            block_on(strict.before_commit(&collectible)),
            Some(HookVeto { error: Some("Not today".into()) })
        );
    }

    #[test]
    fn score_service_reads_the_owners_books() {
        let world = shared();
        world.borrow_mut().ensure_score_record("alice", "coins");
        let service = LocalScoreService::new(Rc::clone(&world), "alice");
        let record = block_on(service.find_record("coins")).unwrap();
        assert_eq!(block_on(service.add_record_points(&record.id, 2.0, "test")), Some(Ok(())));
        assert_eq!(block_on(service.find_record("coins")).unwrap().total, 2.0);
        assert_eq!(block_on(service.add_campaign_points("spring", "game", 4.0)), Some(4.0));
        assert_eq!(block_on(service.campaign_points("spring")), Some(4.0));
    }
}
