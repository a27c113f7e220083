//! Coin Game Client - Main Entry Point
//!
//! Runs a player and a rival session against one in-process world so claims
//! can be contested from the terminal. Commands are read on a separate thread
//! and handed to the frame loop over a channel; the loop samples proximity
//! every poll interval and ticks the spawner on its own schedule.
//!
//! Builds with the `server` feature play against a SpacetimeDB server
//! instead when `COIN_SERVER_URI` is set.
mod admin;
mod client;
mod config;
mod notifier;
#[cfg_attr(not(feature = "server"), allow(dead_code))]
mod remote;
#[cfg(feature = "server")]
mod server;
mod session;
mod world;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

use coin_common::config::SPAWNER_TICK_INTERVAL;
use coin_common::{ClaimResolution, CollectibleId, Position, SpawnAdmissionController, SpawnerConfig, SpawnerId};
use futures::channel::mpsc;
use futures::executor::block_on;
use futures::{FutureExt, StreamExt};
use phf::phf_map;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::client::SharedWorld;
use crate::config::ClientConfig;
#[cfg(not(feature = "server"))]
use crate::config::SERVER_URI_VAR;
use crate::notifier::TerminalNotifier;
use crate::session::PlayerSession;
use crate::world::{LocalWorld, now_millis};

const NEARBY_RADIUS: f32 = 30.0;
const RIVAL_NAME: &str = "rival";

// Macro to parse typed arguments or print usage and return
macro_rules! parse_args {
    ($parts:expr, $usage:expr, $($name:ident : $ty:ty),+) => {
        let mut iter = $parts.iter();
        $( let $name = match iter.next().and_then(|s| s.parse::<$ty>().ok()) {
            Some(v) => v,
            None => { println!("Usage: {}", $usage); return; }
        }; )+
    };
}

// Perfect-hash map for command dispatch
static COMMAND_MAP: phf::Map<&'static str, fn(&mut App, &[&str])> = phf_map! {
    "m"     => cmd_move,
    "rival" => cmd_rival,
    "n"     => cmd_nearby,
    "s"     => cmd_score,
    "spawn" => cmd_spawn,
    "clear" => cmd_clear,
    "tick"  => cmd_tick,
    "cfg"   => cmd_config,
    "help"  => cmd_help,
};

/// Everything the command handlers and the frame loop share
struct App {
    config: ClientConfig,
    world: SharedWorld,
    spawner: SpawnAdmissionController,
    player: PlayerSession,
    rival: PlayerSession,
    /// The player is also the spawner's operator
    operator: Rc<TerminalNotifier>,
    rng: StdRng,
}

impl App {
    fn frame(&mut self, now: Instant) {
        let resolved = self.player.poll(now);
        report(&self.player, resolved);
        let resolved = self.rival.poll(now);
        report(&self.rival, resolved);
    }

    fn tick_spawner(&mut self) {
        let report = admin::scheduled_tick(&self.spawner, &mut *self.world.borrow_mut(), now_millis(), &mut self.rng);
        if !report.spawned.is_empty() {
            println!("Spawner placed {} coin(s)", report.spawned.len());
        }
        log::debug!("Spawner tick: {:?}", report);
    }
}

fn report(session: &PlayerSession, resolved: Vec<(CollectibleId, ClaimResolution)>) {
    for (id, resolution) in resolved {
        match resolution {
            ClaimResolution::Committed => println!("{} picked up {} (score {})", session.name(), id, session.score()),
            ClaimResolution::RolledBack(e) => log::info!("{} lost {}: {}", session.name(), id, e),
        }
    }
}

// Handler implementations
fn cmd_move(app: &mut App, parts: &[&str]) {
    parse_args!(parts, "m <x> <y>", x: f32, y: f32);
    let resolved = app.player.move_to(Position::new(x, y, 0.0), Instant::now());
    println!("{} moved to ({}, {})", app.player.name(), x, y);
    report(&app.player, resolved);
}

fn cmd_rival(app: &mut App, parts: &[&str]) {
    parse_args!(parts, "rival <x> <y>", x: f32, y: f32);
    let resolved = app.rival.move_to(Position::new(x, y, 0.0), Instant::now());
    println!("{} moved to ({}, {})", app.rival.name(), x, y);
    report(&app.rival, resolved);
}

fn cmd_nearby(app: &mut App, _parts: &[&str]) {
    let nearby = app.player.nearby(NEARBY_RADIUS);
    let at = app.player.position();
    println!("\nNearby coins (within {} units of ({}, {})):", NEARBY_RADIUS, at.x, at.y);
    println!("-----------------------------");
    if nearby.is_empty() {
        println!("No coins nearby.");
    }
    for n in nearby {
        let c = &n.collectible;
        let state = if n.hidden { " (being claimed)" } else { "" };
        println!(
            "  [{}] {} worth {} at ({:.1}, {:.1}) - {:.1} units away{}",
            c.id, c.name, c.score_value, c.position.x, c.position.y, n.distance, state
        );
    }
    println!();
}

fn cmd_score(app: &mut App, _parts: &[&str]) {
    let player = block_on(app.player.refresh_score());
    let rival = block_on(app.rival.refresh_score());
    println!("{}: {}  {}: {}", app.player.name(), player, app.rival.name(), rival);
    let world = app.world.borrow();
    let items = world.inventory(app.player.name());
    if !items.is_empty() {
        println!("{} carries {}", app.player.name(), items.join(", "));
    }
}

fn cmd_spawn(app: &mut App, _parts: &[&str]) {
    let spawned = admin::spawn_now(&app.spawner, &mut *app.world.borrow_mut(), &mut app.rng, &*app.operator);
    if let Some(id) = spawned {
        println!("Spawned {}", id);
    }
}

fn cmd_clear(app: &mut App, _parts: &[&str]) {
    if let Some(removed) = admin::remove_all(&app.spawner, &mut *app.world.borrow_mut(), &*app.operator) {
        println!("Removed {} coin(s)", removed);
    }
}

fn cmd_tick(app: &mut App, _parts: &[&str]) {
    let mut world = app.world.borrow_mut();
    if let Some(report) = admin::tick_now(&app.spawner, &mut *world, now_millis(), &mut app.rng, &*app.operator) {
        println!("Spawner placed {} coin(s)", report.spawned.len());
    }
}

fn cmd_config(app: &mut App, _parts: &[&str]) {
    println!("{:#?}", app.config);
    println!("{:#?}", app.spawner.config());
}

fn cmd_help(_app: &mut App, _parts: &[&str]) {
    println!("m <x> <y>      move the player");
    println!("rival <x> <y>  move the rival");
    println!("n              list nearby coins");
    println!("s              refresh and show scores");
    println!("spawn          spawn one coin now");
    println!("clear          remove every spawned coin");
    println!("tick           run a spawner tick now");
    println!("cfg            show the configuration");
    println!("q              quit");
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Stdin blocks, so lines arrive from a reader thread
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, lines) = mpsc::unbounded::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.unbounded_send(line).is_err() {
                break;
            }
        }
    });
    lines
}

/// Hand over to the server-backed REPL when a server is configured. Returns whether it ran.
#[cfg(feature = "server")]
fn run_remote(config: &ClientConfig) -> bool {
    let Some(server) = config.server.clone() else {
        return false;
    };
    if let Err(e) = server::run(config.clone(), server) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    true
}

#[cfg(not(feature = "server"))]
fn run_remote(config: &ClientConfig) -> bool {
    if config.server.is_some() {
        log::warn!("{} is set but this build has no server support, using the local world", SERVER_URI_VAR);
    }
    false
}

fn main() {
    env_logger::init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if run_remote(&config) {
        return;
    }

    let mut rng = StdRng::seed_from_u64(rand::rng().random());
    let world: SharedWorld = Rc::new(RefCell::new(LocalWorld::new(rng.random())));
    let spawner = SpawnAdmissionController::new(SpawnerId(1), Position::default(), SpawnerConfig::enabled());

    let operator = Rc::new(TerminalNotifier::new(config.player_name.clone()));
    let player = PlayerSession::new(&config.player_name, Rc::clone(&world), &config, operator.clone(), &mut rng);
    let rival_notifier = Rc::new(TerminalNotifier::new(RIVAL_NAME));
    let rival = PlayerSession::new(RIVAL_NAME, Rc::clone(&world), &config, rival_notifier, &mut rng);

    println!("{} is instance {}", player.name(), player.instance_id());
    let mut app = App { config, world, spawner, player, rival, operator, rng };
    app.tick_spawner();

    let mut lines = spawn_line_reader();

    println!("Type 'help' for commands.");
    prompt();
    let mut last_tick = Instant::now();
    loop {
        match lines.next().now_or_never() {
            Some(Some(line)) => {
                let parts: Vec<&str> = line.split_whitespace().collect();
                match parts.first() {
                    Some(&"q") => {
                        println!("Exiting...");
                        break;
                    }
                    Some(cmd) => match COMMAND_MAP.get(*cmd) {
                        Some(handler) => handler(&mut app, &parts[1..]),
                        None => println!("Unknown command"),
                    },
                    None => {}
                }
                prompt();
            }
            // stdin closed
            Some(None) => break,
            None => {}
        }

        let now = Instant::now();
        app.frame(now);
        if now.duration_since(last_tick) >= SPAWNER_TICK_INTERVAL {
            app.tick_spawner();
            last_tick = now;
        }
        std::thread::sleep(app.config.claim.poll_interval);
    }
}
