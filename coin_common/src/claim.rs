use std::time::Instant;

use crate::channel::ClaimChannel;
use crate::config::ClaimSettings;
use crate::error::ClaimError;
use crate::ledger::ScoreLedger;
use crate::spatial::Position;
use crate::types::{ClaimSignal, Collectible, CollectibleId, InstanceId};

/// Claim state of one collectible as seen by one observer
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimState {
    Idle,
    /// Held by `claimant`. For someone else's claim, `deadline` is when the
    /// observer gives up waiting and shows the item again.
    Claiming { claimant: InstanceId, deadline: Instant },
    Committed,
}

/// One local claim cycle, from the proximity trigger to its resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimAttempt {
    pub collectible: CollectibleId,
    pub instance_id: InstanceId,
    pub score_value: f64,
    /// Cached score before the speculative delta was applied
    pub score_before: f64,
    pub started_at: Instant,
    pub timeout_at: Instant,
}

/// What the authoritative commit reported back
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommitReceipt {
    /// Total reported by the score backend, replaces the cached score
    pub authoritative_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResolution {
    Committed,
    /// The machine is back to `Idle` with the cooldown set
    RolledBack(ClaimError),
}

/**
 * Per-collectible claim state machine.
 *
 * The machine never suspends: proximity samples, signals and commit outcomes
 * are fed in by the owner, and every side effect on the shared channel is
 * issued synchronously from inside those calls. The async commit itself is
 * run by the owner (see `CommitPipeline`) between `sample` and `resolve`.
 */
#[derive(Debug)]
pub struct CollectibleClaimMachine {
    collectible: Collectible,
    instance_id: InstanceId,
    state: ClaimState,
    /// Set on rollback, cleared only by leaving the pickup radius
    pickup_failed: bool,
    settings: ClaimSettings,
}

impl CollectibleClaimMachine {
    pub fn new(collectible: Collectible, instance_id: InstanceId, settings: ClaimSettings) -> Self {
        Self { collectible, instance_id, state: ClaimState::Idle, pickup_failed: false, settings }
    }

    pub fn id(&self) -> CollectibleId {
        self.collectible.id
    }

    pub fn collectible(&self) -> &Collectible {
        &self.collectible
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn state(&self) -> &ClaimState {
        &self.state
    }

    /// Rendering projection: hidden while anyone holds a claim and after commit
    pub fn visible(&self) -> bool {
        matches!(self.state, ClaimState::Idle)
    }

    pub fn is_cooling_down(&self) -> bool {
        self.pickup_failed
    }

    /// Whether this observer's own claim is in flight
    pub fn is_claiming(&self) -> bool {
        matches!(&self.state, ClaimState::Claiming { claimant, .. } if *claimant == self.instance_id)
    }

    /// Feed one proximity sample. Returns the attempt to commit when the sample triggers a claim.
    pub fn sample<C: ClaimChannel>(
        &mut self,
        user: Position,
        now: Instant,
        ledger: &mut ScoreLedger,
        channel: &C,
    ) -> Option<ClaimAttempt> {
        if self.state == ClaimState::Committed {
            return None;
        }

        if !user.within(&self.collectible.position, self.settings.pickup_radius) {
            self.pickup_failed = false;
            return None;
        }

        // A failed pickup waits until the user walks away and comes back
        if self.pickup_failed {
            return None;
        }

        if let ClaimState::Claiming { claimant, .. } = &self.state {
            log::debug!("{} is already claimed by {}, not claiming", self.collectible.id, claimant);
            return None;
        }

        let timeout_at = now + self.settings.claim_timeout;
        self.state = ClaimState::Claiming { claimant: self.instance_id.clone(), deadline: timeout_at };

        let id = self.collectible.id;
        log::info!("Picking up {} as {}", id, self.instance_id);
        channel.set_hidden(id, true);
        channel.broadcast(id, ClaimSignal::Claiming { from_instance: self.instance_id.clone() });

        let score_before = ledger.current();
        ledger.apply_speculative(id, self.collectible.score_value);

        Some(ClaimAttempt {
            collectible: id,
            instance_id: self.instance_id.clone(),
            score_value: self.collectible.score_value,
            score_before,
            started_at: now,
            timeout_at,
        })
    }

    /// Handle a signal broadcast by another observer of this collectible
    pub fn receive<C: ClaimChannel>(&mut self, signal: &ClaimSignal, now: Instant, channel: &C) {
        let sender = signal.sender();
        if *sender == self.instance_id || self.state == ClaimState::Committed || self.is_claiming() {
            return;
        }

        match signal {
            ClaimSignal::Claiming { from_instance } => {
                log::debug!("{} observed claim on {}", from_instance, self.collectible.id);
                // A repeated signal re-arms the fallback timer
                self.state = ClaimState::Claiming {
                    claimant: from_instance.clone(),
                    deadline: now + self.settings.claim_timeout,
                };
                channel.set_hidden(self.collectible.id, true);
            }
            ClaimSignal::ClaimFailed { from_instance } => {
                let observed = matches!(
                    &self.state,
                    ClaimState::Claiming { claimant, .. } if claimant == from_instance
                );
                if observed {
                    log::debug!("Claim on {} by {} failed, showing it again", self.collectible.id, from_instance);
                    self.release(channel);
                }
            }
        }
    }

    /// Give up on someone else's claim once its fallback deadline has passed. Returns whether it fired.
    pub fn expire_observed_claim<C: ClaimChannel>(&mut self, now: Instant, channel: &C) -> bool {
        if self.is_claiming() {
            return false;
        }
        match &self.state {
            ClaimState::Claiming { claimant, deadline } if now >= *deadline => {
                log::debug!("Claim on {} by {} timed out, showing it again", self.collectible.id, claimant);
                self.release(channel);
                true
            }
            _ => false,
        }
    }

    /// Apply the outcome of this machine's authoritative commit. `None` if `attempt` is not the live one.
    pub fn resolve<C: ClaimChannel>(
        &mut self,
        attempt: &ClaimAttempt,
        outcome: Result<CommitReceipt, ClaimError>,
        ledger: &mut ScoreLedger,
        channel: &C,
    ) -> Option<ClaimResolution> {
        let live = attempt.collectible == self.collectible.id && attempt.instance_id == self.instance_id;
        if !live || !self.is_claiming() {
            log::warn!("Ignoring stale commit result for {}", attempt.collectible);
            return None;
        }

        match outcome {
            Ok(receipt) => {
                log::info!("Picked up {} worth {}", self.collectible.id, attempt.score_value);
                self.state = ClaimState::Committed;
                ledger.commit(self.collectible.id, receipt.authoritative_score);
                Some(ClaimResolution::Committed)
            }
            Err(err) => {
                log::warn!("Unable to pick up {}: {}", self.collectible.id, err);
                ledger.revert(self.collectible.id);
                channel.set_hidden(self.collectible.id, false);
                channel.broadcast(
                    self.collectible.id,
                    ClaimSignal::ClaimFailed { from_instance: self.instance_id.clone() },
                );
                self.pickup_failed = true;
                self.state = ClaimState::Idle;
                Some(ClaimResolution::RolledBack(err))
            }
        }
    }

    fn release<C: ClaimChannel>(&mut self, channel: &C) {
        self.state = ClaimState::Idle;
        channel.set_hidden(self.collectible.id, false);
    }
}
