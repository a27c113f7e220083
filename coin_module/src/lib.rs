//! Coin Game Server Module
//!
//! SpacetimeDB module hosting the authoritative side of the coin game:
//! spawners and their collectibles live in tables, each spawner runs a
//! self-rescheduling tick driven by `coin_common`'s admission control, and
//! claims are settled by the exclusive `claim_collectible` reducer. The claim
//! signal table is the broadcast channel clients use for the optimistic lock.

pub mod constants;
pub mod query_utils;
pub mod store;

pub mod tables {
    pub mod claim_signal;
    pub mod coin_spawner;
    pub mod collectible;
    pub mod scheduling;
}
pub mod reducers {
    pub mod claim;
    pub mod lifecycle;
    pub mod spawner;
}

// Re-export important types
pub use spacetimedb::{Identity, ReducerContext, SpacetimeType, Table, Timestamp};

// Re-export table types
pub use tables::claim_signal::{ClaimSignalEvent, ClaimSignalKind};
pub use tables::coin_spawner::{CoinSpawner, SpawnerSettings};
pub use tables::collectible::{CollectibleRow, ExtensionField};
// Re-export reducer functions
pub use reducers::claim::{broadcast_claim_signal, claim_collectible, set_collectible_hidden};
pub use reducers::lifecycle::{module_init, on_client_connected, on_client_disconnected};
pub use reducers::spawner::{
    configure_spawner, create_spawner, delete_spawner, remove_all_coins, spawn_now, spawner_tick,
};

pub mod rls;
