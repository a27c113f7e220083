//! Server-backed player session
//!
//! The coin module owns the collectibles and serializes claims in its
//! `claim_collectible` reducer. This side only knows the reducers through
//! `CoinReducers` and learns about the world from `ServerEvent`s forwarded by
//! the subscription callbacks, so it runs the same against a live connection
//! and against a fake in tests.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::rc::Rc;
use std::time::Instant;

use coin_common::error::{OBJECT_NOT_FOUND, SPAWN_FAILED_TITLE};
use coin_common::spatial::{CHUNK_SIZE, chunk_span};
use coin_common::{
    ClaimChannel, ClaimError, ClaimRegistry, ClaimResolution, ClaimSignal, Collectible, CollectibleId, CommitPipeline,
    InstanceId, NoHooks, NoScoreService, Position, ScoreBackend, ScoreMethod, Severity, UserAlert, UserNotifier,
};
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt};
use rand::Rng;

use crate::config::ClientConfig;
use crate::session::NearbyCollectible;

const CONNECTION_LOST: &str = "Lost the connection before the claim was settled";

/// Reducers of the coin module, as called by a client
pub trait CoinReducers {
    fn set_collectible_hidden(&self, collectible_id: u64, hidden: bool) -> Result<(), String>;
    fn broadcast_claim_signal(&self, collectible_id: u64, signal: &ClaimSignal) -> Result<(), String>;
    fn claim_collectible(&self, collectible_id: u64, from_instance: &str) -> Result<(), String>;
    fn spawn_now(&self, spawner_id: u64) -> Result<(), String>;
    fn remove_all_coins(&self, spawner_id: u64) -> Result<(), String>;
}

/// What the subscription callbacks report
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    CollectibleUpserted { collectible: Collectible, hidden: bool },
    CollectibleDeleted(CollectibleId),
    Signal(CollectibleId, ClaimSignal),
    ClaimSettled { collectible: CollectibleId, from_instance: InstanceId, outcome: Result<(), String> },
    AdminFailed { action: String, error: String },
}

type Settlement = oneshot::Sender<Result<(), ClaimError>>;

/// Claim channel over the module's reducers.
/// A removal stays pending until its reducer outcome is settled.
pub struct ServerLink<R> {
    reducers: Rc<R>,
    instance: InstanceId,
    pending: RefCell<BTreeMap<CollectibleId, Settlement>>,
}

impl<R: CoinReducers> ServerLink<R> {
    pub fn new(reducers: Rc<R>, instance: InstanceId) -> Self {
        Self { reducers, instance, pending: RefCell::new(BTreeMap::new()) }
    }

    pub fn reducers(&self) -> &R {
        &self.reducers
    }

    pub fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Complete a pending removal. Outcomes of other instances' calls are ignored.
    pub fn settle(&self, collectible: CollectibleId, from_instance: &InstanceId, outcome: Result<(), String>) -> bool {
        if *from_instance != self.instance {
            return false;
        }
        let Some(settlement) = self.pending.borrow_mut().remove(&collectible) else {
            log::debug!("No pending claim on {} to settle", collectible);
            return false;
        };
        if settlement.send(outcome.map_err(claim_error)).is_err() {
            log::debug!("Claim on {} was abandoned before it settled", collectible);
        }
        true
    }
}

fn claim_error(message: String) -> ClaimError {
    if message == OBJECT_NOT_FOUND { ClaimError::NotFound(message) } else { ClaimError::BackendError(message) }
}

impl<R: CoinReducers> ClaimChannel for ServerLink<R> {
    fn set_hidden(&self, collectible: CollectibleId, hidden: bool) {
        if let Err(e) = self.reducers.set_collectible_hidden(collectible.0, hidden) {
            log::warn!("Failed to set hidden={} on {}: {}", hidden, collectible, e);
        }
    }

    fn broadcast(&self, collectible: CollectibleId, signal: ClaimSignal) {
        if let Err(e) = self.reducers.broadcast_claim_signal(collectible.0, &signal) {
            log::warn!("Failed to broadcast {:?} for {}: {}", signal, collectible, e);
        }
    }

    async fn commit_removal(&self, collectible: CollectibleId) -> Result<(), ClaimError> {
        let (settlement, outcome) = oneshot::channel();
        self.pending.borrow_mut().insert(collectible, settlement);
        if let Err(e) = self.reducers.claim_collectible(collectible.0, &self.instance.0) {
            self.pending.borrow_mut().remove(&collectible);
            return Err(ClaimError::BackendUnavailable(e));
        }
        outcome.await.unwrap_or_else(|_| Err(ClaimError::BackendUnavailable(CONNECTION_LOST.to_string())))
    }
}

#[derive(Debug, Clone)]
pub struct MirroredCollectible {
    pub collectible: Collectible,
    pub hidden: bool,
}

/// Local copy of the subscribed collectible rows
#[derive(Debug, Default)]
pub struct ServerMirror {
    objects: BTreeMap<CollectibleId, MirroredCollectible>,
}

impl ServerMirror {
    pub fn upsert(&mut self, collectible: Collectible, hidden: bool) {
        self.objects.insert(collectible.id, MirroredCollectible { collectible, hidden });
    }

    pub fn remove(&mut self, id: CollectibleId) -> Option<MirroredCollectible> {
        self.objects.remove(&id)
    }

    pub fn contains(&self, id: CollectibleId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn nearby(&self, center: Position, radius: f32) -> Vec<NearbyCollectible> {
        let mut found: Vec<NearbyCollectible> = self
            .objects
            .values()
            .filter(|o| o.collectible.position.within(&center, radius))
            .map(|o| NearbyCollectible {
                collectible: o.collectible.clone(),
                hidden: o.hidden,
                distance: o.collectible.position.planar_distance(&center),
            })
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        found
    }
}

/// Subscription query for the collectibles in a block of chunks
pub fn chunk_query(xs: &RangeInclusive<i32>, ys: &RangeInclusive<i32>) -> String {
    format!(
        "SELECT * FROM collectible WHERE chunk_x >= {} AND chunk_x <= {} AND chunk_y >= {} AND chunk_y <= {}",
        xs.start(),
        xs.end(),
        ys.start(),
        ys.end()
    )
}

/// Every claim signal; the module prunes them after the claim timeout
pub const CLAIM_SIGNAL_QUERY: &str = "SELECT * FROM claim_signal";

pub type RemoteRegistry<R> = ClaimRegistry<ServerLink<R>, NoHooks, NoScoreService>;

pub struct RemoteSession<R> {
    name: String,
    position: Position,
    registry: RemoteRegistry<R>,
    mirror: ServerMirror,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    notifier: Rc<dyn UserNotifier>,
    subscribed: Option<(RangeInclusive<i32>, RangeInclusive<i32>)>,
}

impl<R: CoinReducers + 'static> RemoteSession<R> {
    pub fn new<G: Rng + ?Sized>(
        name: &str,
        reducers: Rc<R>,
        events: mpsc::UnboundedReceiver<ServerEvent>,
        config: &ClientConfig,
        notifier: Rc<dyn UserNotifier>,
        rng: &mut G,
    ) -> Self {
        if config.score_method != ScoreMethod::InMemory {
            let method = &config.score_method;
            log::warn!("Score method {:?} has no server-side service, keeping the score in memory", method);
        }
        let instance = InstanceId::generate(rng);
        let pipeline = CommitPipeline::new(
            ServerLink::new(reducers, instance.clone()),
            NoHooks,
            ScoreBackend::in_memory(),
            config.limiter.clone(),
        );
        let registry = ClaimRegistry::new(instance, pipeline, Rc::clone(&notifier), config.claim);
        log::info!("{} joined the server as {}", name, registry.instance_id());

        Self {
            name: name.to_string(),
            position: Position::default(),
            registry,
            mirror: ServerMirror::default(),
            events,
            notifier,
            subscribed: None,
        }
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

    pub fn registry(&self) -> &RemoteRegistry<R> {
        &self.registry
    }

    fn link(&self) -> &ServerLink<R> {
        self.registry.pipeline().channel()
    }

    /// Apply every event that arrived since the last call
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        while let Some(Some(event)) = self.events.next().now_or_never() {
            self.apply(event, now);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: ServerEvent, now: Instant) {
        match event {
            ServerEvent::CollectibleUpserted { collectible, hidden } => {
                if !self.registry.contains(collectible.id) && !self.mirror.contains(collectible.id) {
                    self.registry.insert(collectible.clone());
                }
                self.mirror.upsert(collectible, hidden);
            }
            ServerEvent::CollectibleDeleted(id) => {
                self.mirror.remove(id);
            }
            ServerEvent::Signal(id, signal) => self.registry.on_signal(id, &signal, now),
            ServerEvent::ClaimSettled { collectible, from_instance, outcome } => {
                self.link().settle(collectible, &from_instance, outcome);
            }
            ServerEvent::AdminFailed { action, error } => {
                log::warn!("{} failed on the server: {}", action, error);
                self.notifier.alert(&admin_alert(&action, &error));
            }
        }
    }

    /// Forget machines whose collectible left the subscription, unless a claim is in flight
    fn sweep(&mut self) {
        let gone: Vec<CollectibleId> = self
            .registry
            .machines()
            .filter(|m| !self.mirror.contains(m.id()) && !m.is_claiming())
            .map(|m| m.id())
            .collect();
        for id in gone {
            self.registry.remove(id);
        }
    }

    /// One frame: server events, proximity sample, settled commits
    pub fn poll(&mut self, now: Instant) -> Vec<(CollectibleId, ClaimResolution)> {
        self.pump(now);
        self.sweep();
        self.registry.on_position(self.position, now);
        let resolved = self.registry.drain_resolved();
        self.sweep();
        resolved
    }

    pub fn move_to(&mut self, position: Position, now: Instant) -> Vec<(CollectibleId, ClaimResolution)> {
        self.position = position;
        self.poll(now)
    }

    /// The chunk query to subscribe to, when the player entered a new block of chunks
    pub fn subscription_update(&mut self) -> Option<String> {
        let span = chunk_span(self.position, CHUNK_SIZE);
        if self.subscribed.as_ref() == Some(&span) {
            return None;
        }
        let query = chunk_query(&span.0, &span.1);
        log::info!("Subscribing to chunks x={:?} y={:?}", span.0, span.1);
        self.subscribed = Some(span);
        Some(query)
    }

    pub fn nearby(&self, radius: f32) -> Vec<NearbyCollectible> {
        self.mirror.nearby(self.position, radius)
    }

    pub fn spawn_now(&self, spawner_id: u64) -> bool {
        self.admin("spawn_now", |reducers| reducers.spawn_now(spawner_id))
    }

    pub fn remove_all_coins(&self, spawner_id: u64) -> bool {
        self.admin("remove_all_coins", |reducers| reducers.remove_all_coins(spawner_id))
    }

    fn admin(&self, action: &str, call: impl FnOnce(&R) -> Result<(), String>) -> bool {
        match call(self.link().reducers()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not send {}: {}", action, e);
                self.notifier.alert(&admin_alert(action, &e));
                false
            }
        }
    }
}

fn admin_alert(action: &str, error: &str) -> UserAlert {
    UserAlert {
        detail: Some(format!("{action}: {error}")),
        title: SPAWN_FAILED_TITLE.to_string(),
        severity: Severity::Error,
    }
}
