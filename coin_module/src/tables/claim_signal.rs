use coin_common::{ClaimSignal, CollectibleId, InstanceId};
use spacetimedb::{Identity, SpacetimeType, Timestamp};

#[derive(SpacetimeType, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClaimSignalKind {
    Claiming,
    ClaimFailed,
}

/**
 * Broadcast channel between observers of the same collectible.
 *
 * Rows are fire-and-forget events: subscribers react to inserts and the
 * spawner tick prunes anything older than the claim timeout.
 */
#[spacetimedb::table(name = claim_signal, public)]
#[derive(Clone, Debug)]
pub struct ClaimSignalEvent {
    #[primary_key]
    #[auto_inc]
    pub signal_id: u64,
    #[index(btree)]
    pub collectible_id: u64,
    pub from_instance: String,
    pub kind: ClaimSignalKind,
    pub sender: Identity,
    pub sent_at: Timestamp,
}

impl ClaimSignalEvent {
    pub fn collectible(&self) -> CollectibleId {
        CollectibleId(self.collectible_id)
    }

    pub fn to_signal(&self) -> ClaimSignal {
        let from_instance = InstanceId(self.from_instance.clone());
        match self.kind {
            ClaimSignalKind::Claiming => ClaimSignal::Claiming { from_instance },
            ClaimSignalKind::ClaimFailed => ClaimSignal::ClaimFailed { from_instance },
        }
    }
}

impl From<&ClaimSignal> for ClaimSignalKind {
    fn from(signal: &ClaimSignal) -> Self {
        match signal {
            ClaimSignal::Claiming { .. } => ClaimSignalKind::Claiming,
            ClaimSignal::ClaimFailed { .. } => ClaimSignalKind::ClaimFailed,
        }
    }
}
