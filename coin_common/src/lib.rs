//! Coin Game Core
//!
//! Host-independent logic shared by the server module and the native client:
//! the per-collectible claim state machine with its optimistic broadcast lock
//! and compensating rollback, the ordered commit pipeline, score limits and
//! score backends, and the spawner's admission control. Hosts plug in through
//! the `ClaimChannel`, `PickupHooks`, `ScoreService`, `CollectibleStore` and
//! `UserNotifier` traits.
pub mod channel;
pub mod claim;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod score_limit;
pub mod spatial;
pub mod spawn;
pub mod types;


pub use channel::{ClaimChannel, HookVeto, NoHooks, PickupHooks, RewardReceipt};
pub use claim::{ClaimAttempt, ClaimResolution, ClaimState, CollectibleClaimMachine, CommitReceipt};
pub use config::{ClaimSettings, ScoreMethod, SpawnerConfig};
pub use error::{ClaimError, SkipReason, SpawnError};
pub use ledger::{NoScoreService, ScoreBackend, ScoreLedger, ScoreRecord, ScoreService};
pub use notify::{LogNotifier, PanelMessage, Severity, UserAlert, UserNotifier};
pub use pipeline::CommitPipeline;
pub use registry::ClaimRegistry;
pub use score_limit::{LimitRejection, ScoreLimiter};
pub use spatial::Position;
pub use spawn::{CollectibleStore, SpawnAdmissionController, TickReport};
pub use types::{
    Appearance, ClaimSignal, Collectible, CollectibleId, InstanceId, NewCollectible, SpawnerId, StoredObject,
};
