//! Configuration snapshots read by the core.
//!
//! Raw fields are kept optional, the way an editor stores them; accessors
//! apply defaults and clamps so callers never see an out-of-range value.
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spatial::PICKUP_RADIUS;

pub const DEFAULT_SPAWN_RADIUS: f32 = 10.0;
pub const MIN_SPAWN_RADIUS: f32 = 5.0;
pub const MAX_SPAWN_RADIUS: f32 = 500.0;
pub const MIN_SPAWN_RATE: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_POPULATION: usize = 10;
pub const DEFAULT_SCORE_VALUE: f64 = 1.0;
/// Rotation applied to models that do not animate themselves
pub const DEFAULT_ROTATION_SPEED: f32 = 2.0;

/// How often a spawner tick runs on the server
pub const SPAWNER_TICK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnerConfig {
    pub enabled: bool,
    pub name: Option<String>,
    pub spawn_radius: Option<f32>,
    pub spawn_rate_secs: Option<f64>,
    pub spawn_chance_percent: Option<f64>,
    pub spawn_amount: Option<u32>,
    pub max_population: Option<u32>,
    pub score_value: Option<f64>,
    pub model_url: Option<String>,
    pub model_own_animation: bool,
    pub pickup_sound: Option<String>,
    /// External item template granted to whoever picks the collectible up
    pub reward_item: Option<String>,
}

impl SpawnerConfig {
    pub fn enabled() -> Self {
        Self { enabled: true, ..Self::default() }
    }

    /// Spawn radius around the anchor, clamped to [5, 500]
    pub fn radius(&self) -> f32 {
        let radius = positive(self.spawn_radius.filter(|r| r.is_finite())).unwrap_or(DEFAULT_SPAWN_RADIUS);
        radius.clamp(MIN_SPAWN_RADIUS, MAX_SPAWN_RADIUS)
    }

    /// Minimum time between two spawn cycles
    pub fn rate(&self) -> Duration {
        let configured = self
            .spawn_rate_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default();
        configured.max(MIN_SPAWN_RATE)
    }

    /// Per-spawn probability in [0, 1]. Unset means always.
    pub fn chance(&self) -> f64 {
        match self.spawn_chance_percent.filter(|p| !p.is_nan()) {
            Some(percent) => percent.clamp(0.0, 100.0) / 100.0,
            None => 1.0,
        }
    }

    /// Spawn attempts per cycle, at least one
    pub fn amount(&self) -> u32 {
        self.spawn_amount.unwrap_or(1).max(1)
    }

    pub fn max_population(&self) -> usize {
        match self.max_population {
            Some(max) if max > 0 => max as usize,
            _ => DEFAULT_MAX_POPULATION,
        }
    }

    /// Score carried by spawned collectibles; unset or zero means 1
    pub fn score_value(&self) -> f64 {
        match self.score_value {
            Some(v) if v.is_finite() && v != 0.0 => v,
            _ => DEFAULT_SCORE_VALUE,
        }
    }

    pub fn rotation_speed(&self) -> f32 {
        if self.model_own_animation { 0.0 } else { DEFAULT_ROTATION_SPEED }
    }
}

fn positive(value: Option<f32>) -> Option<f32> {
    value.filter(|v| *v > 0.0)
}

/// Where the player's score is kept
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreMethod {
    #[default]
    InMemory,
    /// A durable record found in the user's inventory by template
    Object { template: String },
    /// A points campaign on an external service
    Campaign { campaign_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown score method '{0}' (expected memory, object or campaign)")]
pub struct UnknownScoreMethod(pub String);

impl ScoreMethod {
    /// Combine a method name with the field the chosen method needs
    pub fn parse(method: &str, template: &str, campaign_id: &str) -> Result<Self, UnknownScoreMethod> {
        let kind: ScoreMethodKind = method.parse()?;
        Ok(match kind {
            ScoreMethodKind::InMemory => ScoreMethod::InMemory,
            ScoreMethodKind::Object => ScoreMethod::Object { template: template.trim().to_string() },
            ScoreMethodKind::Campaign => {
                let id = campaign_id.trim();
                ScoreMethod::Campaign { campaign_id: (!id.is_empty()).then(|| id.to_string()) }
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScoreMethodKind {
    InMemory,
    Object,
    Campaign,
}

impl FromStr for ScoreMethodKind {
    type Err = UnknownScoreMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "memory" | "in memory" | "in-memory" => Ok(ScoreMethodKind::InMemory),
            "object" | "record" => Ok(ScoreMethodKind::Object),
            "campaign" => Ok(ScoreMethodKind::Campaign),
            other => Err(UnknownScoreMethod(other.to_string())),
        }
    }
}

/// Tunables of the claim loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimSettings {
    pub pickup_radius: f32,
    /// Cadence of proximity samples
    pub poll_interval: Duration,
    /// How long an observer keeps an item hidden for someone else's claim
    pub claim_timeout: Duration,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            pickup_radius: PICKUP_RADIUS,
            poll_interval: Duration::from_millis(200),
            claim_timeout: Duration::from_secs(15),
        }
    }
}
