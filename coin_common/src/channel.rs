//! Seams between the claim core and the outside world.
//!
//! `ClaimChannel` carries the optimistic side of a claim (hidden flag and
//! broadcast signals, both fire-and-forget) and the authoritative removal.
//! `PickupHooks` are the host's extension points consulted during a commit.
//! All of them are called from a single cooperative thread, so `&self`
//! implementations may use `Cell`/`RefCell` as long as no borrow is held
//! across an `.await`.

use crate::error::ClaimError;
use crate::types::{ClaimSignal, Collectible, CollectibleId};

/// Action name used when asking the reward service to grant a copy of an item
pub const REWARD_ACTION: &str = "AcquirePubVariation";

#[allow(async_fn_in_trait)]
pub trait ClaimChannel {
    /// Push the hidden projection to the persistence service optimistically
    fn set_hidden(&self, collectible: CollectibleId, hidden: bool);

    /// Send a signal to every observer of `collectible`. Delivery is not guaranteed.
    fn broadcast(&self, collectible: CollectibleId, signal: ClaimSignal);

    /// Remove the collectible for good. Must fail for all but one caller per item.
    async fn commit_removal(&self, collectible: CollectibleId) -> Result<(), ClaimError>;
}

/// Returned by the pre-commit hook to abort a pickup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HookVeto {
    pub error: Option<String>,
}

/// Proof that the reward service granted an item
#[derive(Debug, Clone, PartialEq)]
pub struct RewardReceipt {
    pub item_id: String,
}

#[allow(async_fn_in_trait)]
pub trait PickupHooks {
    /// `None` lets the pickup proceed
    async fn before_commit(&self, collectible: &Collectible) -> Option<HookVeto>;

    /// `None` means the reward service is not available
    async fn acquire_reward(&self, item_id: &str, action_name: &str) -> Option<RewardReceipt>;
}

/// Hooks for hosts without any extension installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl PickupHooks for NoHooks {
    async fn before_commit(&self, _collectible: &Collectible) -> Option<HookVeto> {
        None
    }

    async fn acquire_reward(&self, _item_id: &str, _action_name: &str) -> Option<RewardReceipt> {
        None
    }
}
