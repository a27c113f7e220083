//! SpacetimeDB connectivity
//!
//! Connects to the published coin module, implements `CoinReducers` on the
//! generated `DbConnection` and forwards table and reducer callbacks to the
//! session as `ServerEvent`s. Callbacks run on the connection's thread, so
//! they only send; the session applies them on the frame loop.
//!
//! `module_bindings` is generated with
//! `spacetime generate --lang rust --out-dir coin_client/src/module_bindings --project-path coin_module`.
mod module_bindings;

use std::rc::Rc;
use std::time::Instant;

use coin_common::{
    Appearance, ClaimResolution, ClaimSignal, Collectible, CollectibleId, InstanceId, Position, SpawnerId,
};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::{FutureExt, StreamExt};
use phf::phf_map;
use spacetimedb_sdk::{DbContext, Status, Table, TableWithPrimaryKey};
use thiserror::Error;

use crate::config::{ClientConfig, ServerConfig};
use crate::notifier::TerminalNotifier;
use crate::remote::{CLAIM_SIGNAL_QUERY, CoinReducers, RemoteSession, ServerEvent};
use crate::{NEARBY_RADIUS, prompt, spawn_line_reader};
use module_bindings::broadcast_claim_signal_reducer::broadcast_claim_signal;
use module_bindings::claim_collectible_reducer::claim_collectible;
use module_bindings::claim_signal_table::ClaimSignalTableAccess;
use module_bindings::collectible_table::CollectibleTableAccess;
use module_bindings::remove_all_coins_reducer::remove_all_coins;
use module_bindings::set_collectible_hidden_reducer::set_collectible_hidden;
use module_bindings::spawn_now_reducer::spawn_now;
use module_bindings::{ClaimSignalEvent, ClaimSignalKind, CollectibleRow, DbConnection, SubscriptionHandle};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not connect to {uri}: {message}")]
    Connect { uri: String, message: String },
}

/// Build and connect to the SpacetimeDB instance hosting the coin module
pub fn create_connection(server: &ServerConfig) -> Result<DbConnection, ServerError> {
    DbConnection::builder()
        .with_uri(server.uri.as_str())
        .with_module_name(server.module_name.as_str())
        .with_token(server.token.clone())
        .build()
        .map_err(|e| ServerError::Connect { uri: server.uri.clone(), message: e.to_string() })
}

impl CoinReducers for DbConnection {
    fn set_collectible_hidden(&self, collectible_id: u64, hidden: bool) -> Result<(), String> {
        self.reducers.set_collectible_hidden(collectible_id, hidden).map_err(|e| e.to_string())
    }

    fn broadcast_claim_signal(&self, collectible_id: u64, signal: &ClaimSignal) -> Result<(), String> {
        let kind = match signal {
            ClaimSignal::Claiming { .. } => ClaimSignalKind::Claiming,
            ClaimSignal::ClaimFailed { .. } => ClaimSignalKind::ClaimFailed,
        };
        self.reducers.broadcast_claim_signal(collectible_id, signal.sender().0.clone(), kind).map_err(|e| e.to_string())
    }

    fn claim_collectible(&self, collectible_id: u64, from_instance: &str) -> Result<(), String> {
        self.reducers.claim_collectible(collectible_id, from_instance.to_string()).map_err(|e| e.to_string())
    }

    fn spawn_now(&self, spawner_id: u64) -> Result<(), String> {
        self.reducers.spawn_now(spawner_id).map_err(|e| e.to_string())
    }

    fn remove_all_coins(&self, spawner_id: u64) -> Result<(), String> {
        self.reducers.remove_all_coins(spawner_id).map_err(|e| e.to_string())
    }
}

fn to_collectible(row: &CollectibleRow) -> Collectible {
    Collectible {
        id: CollectibleId(row.collectible_id),
        spawner_id: Some(SpawnerId(row.spawner_id)),
        name: row.name.clone(),
        position: Position::new(row.pos_x, row.pos_y, row.height),
        score_value: row.score_value,
        appearance: Appearance {
            model_url: row.model_url.clone(),
            rotation_speed: row.rotation_speed,
            pickup_sound: row.pickup_sound.clone(),
        },
        reward_item: row.reward_item.clone(),
        extensions: row.extensions.iter().map(|f| (f.key.clone(), f.value.clone())).collect(),
    }
}

fn to_signal(row: &ClaimSignalEvent) -> ClaimSignal {
    let from_instance = InstanceId(row.from_instance.clone());
    match row.kind {
        ClaimSignalKind::Claiming => ClaimSignal::Claiming { from_instance },
        ClaimSignalKind::ClaimFailed => ClaimSignal::ClaimFailed { from_instance },
    }
}

fn outcome(status: &Status) -> Result<(), String> {
    match status {
        Status::Committed => Ok(()),
        Status::Failed(message) => Err(message.to_string()),
        Status::OutOfEnergy => Err("The module ran out of energy".to_string()),
    }
}

fn forward(events: &UnboundedSender<ServerEvent>, event: ServerEvent) {
    if events.unbounded_send(event).is_err() {
        log::debug!("Session is gone, dropping server event");
    }
}

/// Route table changes and reducer outcomes into `events`
pub fn register_callbacks(conn: &DbConnection, events: UnboundedSender<ServerEvent>) {
    let tx = events.clone();
    conn.db.collectible().on_insert(move |_ctx, row| {
        forward(&tx, ServerEvent::CollectibleUpserted { collectible: to_collectible(row), hidden: row.hidden });
    });
    let tx = events.clone();
    conn.db.collectible().on_update(move |_ctx, _old, new| {
        forward(&tx, ServerEvent::CollectibleUpserted { collectible: to_collectible(new), hidden: new.hidden });
    });
    let tx = events.clone();
    conn.db.collectible().on_delete(move |_ctx, row| {
        forward(&tx, ServerEvent::CollectibleDeleted(CollectibleId(row.collectible_id)));
    });
    let tx = events.clone();
    conn.db.claim_signal().on_insert(move |_ctx, row| {
        forward(&tx, ServerEvent::Signal(CollectibleId(row.collectible_id), to_signal(row)));
    });

    let tx = events.clone();
    conn.reducers.on_claim_collectible(move |ctx, collectible_id, from_instance| {
        forward(
            &tx,
            ServerEvent::ClaimSettled {
                collectible: CollectibleId(*collectible_id),
                from_instance: InstanceId(from_instance.clone()),
                outcome: outcome(&ctx.event.status),
            },
        );
    });
    let tx = events.clone();
    conn.reducers.on_spawn_now(move |ctx, spawner_id| {
        if let Err(error) = outcome(&ctx.event.status) {
            forward(&tx, ServerEvent::AdminFailed { action: format!("spawn_now({spawner_id})"), error });
        }
    });
    let tx = events;
    conn.reducers.on_remove_all_coins(move |ctx, spawner_id| {
        if let Err(error) = outcome(&ctx.event.status) {
            forward(&tx, ServerEvent::AdminFailed { action: format!("remove_all_coins({spawner_id})"), error });
        }
    });
}

/// Command state of the server-backed REPL
struct RemoteApp {
    conn: Rc<DbConnection>,
    session: RemoteSession<DbConnection>,
    chunk_subscription: Option<SubscriptionHandle>,
}

impl RemoteApp {
    fn frame(&mut self, now: Instant) {
        let resolved = self.session.poll(now);
        self.report(resolved);
        self.follow_player();
    }

    fn report(&self, resolved: Vec<(CollectibleId, ClaimResolution)>) {
        for (id, resolution) in resolved {
            match resolution {
                ClaimResolution::Committed => {
                    println!("{} picked up {} (score {})", self.session.name(), id, self.session.score())
                }
                ClaimResolution::RolledBack(e) => log::info!("{} lost {}: {}", self.session.name(), id, e),
            }
        }
    }

    /// Swap the chunk subscription when the player crossed into new chunks
    fn follow_player(&mut self) {
        let Some(query) = self.session.subscription_update() else {
            return;
        };
        if let Some(handle) = self.chunk_subscription.take() {
            if let Err(e) = handle.unsubscribe_then(Box::new(|_| {})) {
                log::warn!("Failed to unsubscribe from previous chunk subscription: {}", e);
            }
        }
        let handle = self
            .conn
            .subscription_builder()
            .on_error(|_ctx, err| log::warn!("Chunk subscription error: {}", err))
            .subscribe(vec![query]);
        self.chunk_subscription = Some(handle);
    }
}

fn coordinates(parts: &[&str]) -> Option<(f32, f32)> {
    match parts {
        [x, y, ..] => Some((x.parse().ok()?, y.parse().ok()?)),
        _ => None,
    }
}

fn spawner_id(parts: &[&str]) -> Option<u64> {
    parts.first().and_then(|s| s.parse().ok())
}

static REMOTE_COMMANDS: phf::Map<&'static str, fn(&mut RemoteApp, &[&str])> = phf_map! {
    "m"     => cmd_move,
    "n"     => cmd_nearby,
    "s"     => cmd_score,
    "spawn" => cmd_spawn,
    "clear" => cmd_clear,
    "help"  => cmd_help,
};

fn cmd_move(app: &mut RemoteApp, parts: &[&str]) {
    let Some((x, y)) = coordinates(parts) else {
        println!("Usage: m <x> <y>");
        return;
    };
    let resolved = app.session.move_to(Position::new(x, y, 0.0), Instant::now());
    println!("{} moved to ({}, {})", app.session.name(), x, y);
    app.report(resolved);
    app.follow_player();
}

fn cmd_nearby(app: &mut RemoteApp, _parts: &[&str]) {
    let nearby = app.session.nearby(NEARBY_RADIUS);
    if nearby.is_empty() {
        println!("No coins nearby.");
    }
    for n in nearby {
        let c = &n.collectible;
        let state = if n.hidden { " (being claimed)" } else { "" };
        println!("  [{}] {} worth {} - {:.1} units away{}", c.id, c.name, c.score_value, n.distance, state);
    }
}

fn cmd_score(app: &mut RemoteApp, _parts: &[&str]) {
    println!("{}: {}", app.session.name(), app.session.score());
}

fn cmd_spawn(app: &mut RemoteApp, parts: &[&str]) {
    let Some(id) = spawner_id(parts) else {
        println!("Usage: spawn <spawner_id>");
        return;
    };
    if app.session.spawn_now(id) {
        println!("Asked spawner {} for a coin", id);
    }
}

fn cmd_clear(app: &mut RemoteApp, parts: &[&str]) {
    let Some(id) = spawner_id(parts) else {
        println!("Usage: clear <spawner_id>");
        return;
    };
    if app.session.remove_all_coins(id) {
        println!("Asked spawner {} to remove its coins", id);
    }
}

fn cmd_help(_app: &mut RemoteApp, _parts: &[&str]) {
    println!("m <x> <y>       move the player");
    println!("n               list nearby coins");
    println!("s               show the score");
    println!("spawn <id>      spawn one coin from a spawner you own");
    println!("clear <id>      remove every coin of a spawner you own");
    println!("q               quit");
}

/// Play against the server until stdin closes or the user quits
pub fn run(config: ClientConfig, server: ServerConfig) -> Result<(), ServerError> {
    let conn = Rc::new(create_connection(&server)?);
    println!("Connected to {} on {}", server.module_name, server.uri);

    let (events, rx) = mpsc::unbounded();
    register_callbacks(&conn, events);
    let _conn_handle = conn.run_threaded();
    let _signal_subscription = conn
        .subscription_builder()
        .on_error(|_ctx, err| log::warn!("Claim signal subscription error: {}", err))
        .subscribe(vec![CLAIM_SIGNAL_QUERY.to_string()]);

    let notifier = Rc::new(TerminalNotifier::new(config.player_name.clone()));
    let session =
        RemoteSession::new(&config.player_name, Rc::clone(&conn), rx, &config, notifier, &mut rand::rng());
    println!("{} is instance {}", session.name(), session.instance_id());
    let mut app = RemoteApp { conn, session, chunk_subscription: None };
    app.follow_player();

    let mut lines = spawn_line_reader();
    println!("Type 'help' for commands.");
    prompt();
    loop {
        match lines.next().now_or_never() {
            Some(Some(line)) => {
                let parts: Vec<&str> = line.split_whitespace().collect();
                match parts.first() {
                    Some(&"q") => break,
                    Some(cmd) => match REMOTE_COMMANDS.get(*cmd) {
                        Some(handler) => handler(&mut app, &parts[1..]),
                        None => println!("Unknown command"),
                    },
                    None => {}
                }
                prompt();
            }
            Some(None) => break,
            None => {}
        }
        app.frame(Instant::now());
        std::thread::sleep(config.claim.poll_interval);
    }

    println!("Exiting...");
    if let Err(e) = app.conn.disconnect() {
        log::warn!("Disconnect failed: {}", e);
    }
    Ok(())
}
