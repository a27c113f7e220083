//! Player sessions
//!
//! A session is one client instance: a position, a claim registry tracking
//! the collectibles it can see, and the adapters wiring that registry to the
//! shared world. `poll` is the per-frame step; it runs the proximity sample,
//! settles finished commits and keeps the registry in sync with the world.
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;

use coin_common::{
    ClaimRegistry, ClaimResolution, Collectible, CollectibleId, CommitPipeline, InstanceId, Position, ScoreBackend,
    ScoreMethod, UserNotifier,
};
use rand::Rng;

use crate::client::{LocalHooks, LocalScoreService, SharedWorld, WorldLink};
use crate::config::ClientConfig;

pub type LocalRegistry = ClaimRegistry<WorldLink, LocalHooks, LocalScoreService>;

/// One visible collectible as listed by `nearby`
#[derive(Debug, Clone)]
pub struct NearbyCollectible {
    pub collectible: Collectible,
    pub hidden: bool,
    pub distance: f32,
}

pub struct PlayerSession {
    name: String,
    position: Position,
    registry: LocalRegistry,
    world: SharedWorld,
}

impl PlayerSession {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        world: SharedWorld,
        config: &ClientConfig,
        notifier: Rc<dyn UserNotifier>,
        rng: &mut R,
    ) -> Self {
        Self::with_hooks(name, Rc::clone(&world), config, notifier, rng, LocalHooks::new(world, name))
    }

    pub fn with_hooks<R: Rng + ?Sized>(
        name: &str,
        world: SharedWorld,
        config: &ClientConfig,
        notifier: Rc<dyn UserNotifier>,
        rng: &mut R,
        hooks: LocalHooks,
    ) -> Self {
        let instance = InstanceId::generate(rng);
        if let ScoreMethod::Object { template } = &config.score_method {
            world.borrow_mut().ensure_score_record(name, template);
        }

        let pipeline = CommitPipeline::new(
            WorldLink::new(Rc::clone(&world), instance.clone()),
            hooks,
            ScoreBackend::from_method(&config.score_method, LocalScoreService::new(Rc::clone(&world), name)),
            config.limiter.clone(),
        );
        let registry = ClaimRegistry::new(instance, pipeline, notifier, config.claim);
        log::info!("{} joined as {}", name, registry.instance_id());

        let mut session = Self { name: name.to_string(), position: Position::default(), registry, world };
        session.sync_world();
        session
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.registry.instance_id()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn score(&self) -> f64 {
        self.registry.score()
    }

    pub fn registry(&self) -> &LocalRegistry {
        &self.registry
    }

    /// Track collectibles that appeared in the world and forget the ones that left it
    pub fn sync_world(&mut self) {
        let world = self.world.borrow();
        let present: BTreeSet<CollectibleId> = world.objects().map(|o| o.collectible.id).collect();

        let gone: Vec<CollectibleId> = self
            .registry
            .machines()
            .filter(|m| !present.contains(&m.id()) && !m.is_claiming())
            .map(|m| m.id())
            .collect();

        let fresh: Vec<Collectible> = world
            .objects()
            .filter(|o| !self.registry.contains(o.collectible.id))
            .map(|o| o.collectible.clone())
            .collect();
        drop(world);

        for id in gone {
            self.registry.remove(id);
        }
        for collectible in fresh {
            self.registry.insert(collectible);
        }
    }

    /// Deliver broadcasts addressed to this instance
    pub fn pump_signals(&mut self, now: Instant) -> usize {
        let inbox = self.world.borrow_mut().take_inbox(self.registry.instance_id());
        for (id, signal) in &inbox {
            self.registry.on_signal(*id, signal, now);
        }
        inbox.len()
    }

    /// One frame: signals, proximity sample, settled commits
    pub fn poll(&mut self, now: Instant) -> Vec<(CollectibleId, ClaimResolution)> {
        self.sync_world();
        self.pump_signals(now);
        self.registry.on_position(self.position, now);
        let resolved = self.registry.drain_resolved();
        self.sync_world();
        resolved
    }

    pub fn move_to(&mut self, position: Position, now: Instant) -> Vec<(CollectibleId, ClaimResolution)> {
        self.position = position;
        self.poll(now)
    }

    /// Reload the score from the configured backend
    pub async fn refresh_score(&mut self) -> f64 {
        self.registry.refresh_score().await
    }

    /// Collectibles within `radius`, nearest first
    pub fn nearby(&self, radius: f32) -> Vec<NearbyCollectible> {
        let world = self.world.borrow();
        let mut found: Vec<NearbyCollectible> = world
            .objects()
            .filter(|o| o.collectible.position.within(&self.position, radius))
            .map(|o| NearbyCollectible {
                collectible: o.collectible.clone(),
                hidden: o.hidden,
                distance: o.collectible.position.planar_distance(&self.position),
            })
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        found
    }
}
