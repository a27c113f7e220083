//! Explicit owner of every live claim machine of one observer.
//!
//! The registry fans proximity samples and signals out to its machines,
//! keeps the in-flight commits as local futures and applies their outcomes
//! when the host drains them. Everything runs on the host's single thread.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};

use crate::channel::{ClaimChannel, PickupHooks};
use crate::claim::{ClaimAttempt, ClaimResolution, CollectibleClaimMachine, CommitReceipt};
use crate::config::ClaimSettings;
use crate::error::ClaimError;
use crate::ledger::{ScoreLedger, ScoreService};
use crate::notify::{PanelMessage, UserNotifier};
use crate::pipeline::CommitPipeline;
use crate::spatial::Position;
use crate::types::{ClaimSignal, Collectible, CollectibleId, InstanceId};

struct CommitReport {
    attempt: ClaimAttempt,
    outcome: Result<CommitReceipt, ClaimError>,
}

pub struct ClaimRegistry<C, H, S> {
    instance_id: InstanceId,
    settings: ClaimSettings,
    machines: BTreeMap<CollectibleId, CollectibleClaimMachine>,
    pending: FuturesUnordered<LocalBoxFuture<'static, CommitReport>>,
    ledger: ScoreLedger,
    pipeline: Rc<CommitPipeline<C, H, S>>,
    notifier: Rc<dyn UserNotifier>,
}

impl<C, H, S> ClaimRegistry<C, H, S>
where
    C: ClaimChannel + 'static,
    H: PickupHooks + 'static,
    S: ScoreService + 'static,
{
    pub fn new(
        instance_id: InstanceId,
        pipeline: CommitPipeline<C, H, S>,
        notifier: Rc<dyn UserNotifier>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            instance_id,
            settings,
            machines: BTreeMap::new(),
            pending: FuturesUnordered::new(),
            ledger: ScoreLedger::default(),
            pipeline: Rc::new(pipeline),
            notifier,
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn settings(&self) -> &ClaimSettings {
        &self.settings
    }

    pub fn score(&self) -> f64 {
        self.ledger.current()
    }

    pub fn pipeline(&self) -> &CommitPipeline<C, H, S> {
        &self.pipeline
    }

    /// Start tracking a collectible. Returns `false` if it is already tracked.
    pub fn insert(&mut self, collectible: Collectible) -> bool {
        if self.machines.contains_key(&collectible.id) {
            return false;
        }
        let machine = CollectibleClaimMachine::new(collectible, self.instance_id.clone(), self.settings);
        self.machines.insert(machine.id(), machine);
        true
    }

    /// Tear a machine down, dropping any observer timer it had armed
    pub fn remove(&mut self, id: CollectibleId) -> Option<CollectibleClaimMachine> {
        self.machines.remove(&id)
    }

    pub fn contains(&self, id: CollectibleId) -> bool {
        self.machines.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn machine(&self, id: CollectibleId) -> Option<&CollectibleClaimMachine> {
        self.machines.get(&id)
    }

    pub fn machines(&self) -> impl Iterator<Item = &CollectibleClaimMachine> {
        self.machines.values()
    }

    pub fn pending_commits(&self) -> usize {
        self.pending.len()
    }

    /// Feed one proximity sample to every machine. Returns how many claims it started.
    pub fn on_position(&mut self, user: Position, now: Instant) -> usize {
        self.poll_timers(now);

        let mut started = 0;
        for machine in self.machines.values_mut() {
            let Some(attempt) = machine.sample(user, now, &mut self.ledger, self.pipeline.channel()) else {
                continue;
            };
            let pipeline = Rc::clone(&self.pipeline);
            let collectible = machine.collectible().clone();
            self.pending.push(
                async move {
                    let outcome = pipeline.run(&attempt, &collectible).await;
                    CommitReport { attempt, outcome }
                }
                .boxed_local(),
            );
            started += 1;
        }

        if started > 0 {
            self.post_score();
        }
        started
    }

    pub fn on_signal(&mut self, id: CollectibleId, signal: &ClaimSignal, now: Instant) {
        match self.machines.get_mut(&id) {
            Some(machine) => machine.receive(signal, now, self.pipeline.channel()),
            None => log::debug!("Dropping {:?} for untracked {}", signal, id),
        }
    }

    /// Expire observer fallback timers. Returns how many fired.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        let channel = self.pipeline.channel();
        self.machines
            .values_mut()
            .map(|m| m.expire_observed_claim(now, channel))
            .filter(|fired| *fired)
            .count()
    }

    /// Apply every commit that has already finished, without waiting
    pub fn drain_resolved(&mut self) -> Vec<(CollectibleId, ClaimResolution)> {
        let mut resolved = Vec::new();
        while let Some(Some(report)) = self.pending.next().now_or_never() {
            resolved.extend(self.apply(report));
        }
        resolved
    }

    /// Wait for the next commit to finish and apply it. `None` when nothing is in flight.
    pub async fn next_resolved(&mut self) -> Option<(CollectibleId, ClaimResolution)> {
        loop {
            let report = self.pending.next().await?;
            if let Some(resolved) = self.apply(report) {
                return Some(resolved);
            }
        }
    }

    /// Replace the cached score with the backend's value, if it has one
    pub async fn refresh_score(&mut self) -> f64 {
        if self.ledger.refresh(self.pipeline.backend()).await.is_some() {
            self.post_score();
        }
        self.ledger.current()
    }

    fn apply(&mut self, report: CommitReport) -> Option<(CollectibleId, ClaimResolution)> {
        let CommitReport { attempt, outcome } = report;
        let id = attempt.collectible;

        let resolution = match self.machines.get_mut(&id) {
            Some(machine) => machine.resolve(&attempt, outcome, &mut self.ledger, self.pipeline.channel())?,
            // Torn down while the commit was in flight, only the score is left to settle
            None => match outcome {
                Ok(receipt) => {
                    self.ledger.commit(id, receipt.authoritative_score);
                    ClaimResolution::Committed
                }
                Err(err) => {
                    log::warn!("Commit for removed {} failed: {}", id, err);
                    self.ledger.revert(id);
                    ClaimResolution::RolledBack(err)
                }
            },
        };

        match &resolution {
            ClaimResolution::Committed => {
                self.machines.remove(&id);
            }
            ClaimResolution::RolledBack(err) => self.notifier.alert(&err.user_alert()),
        }
        self.post_score();
        Some((id, resolution))
    }

    fn post_score(&self) {
        self.notifier.post_message(&PanelMessage::SetScore { score: self.ledger.current() });
    }
}
