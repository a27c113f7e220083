//
//  Row-Level Security (RLS) filters restrict which rows a client can see.
//
//  These filters are evaluated on the server when a client makes a subscription.
//  Collectibles and claim signals stay public: every observer of a coin needs
//  them. Spawners are admin objects and only show up for their owner.
//
//  NOTE: The "unstable" feature must be enabled in Cargo.toml to use RLS:
//      spacetimedb = { version = "...", features = ["unstable"] }
//

#[cfg(feature = "unstable")]
use spacetimedb::{Filter, client_visibility_filter};

#[cfg(feature = "unstable")]
#[client_visibility_filter]
const COIN_SPAWNER_VISIBILITY: Filter = Filter::Sql("
    SELECT * FROM coin_spawner WHERE owner_id = :sender
");
