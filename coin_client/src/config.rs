//! Coin Client Configuration
//!
//! Every setting comes from a `COIN_*` environment variable; blank or
//! missing values fall back to the defaults of the core types. Setting
//! `COIN_SERVER_URI` points the client at a SpacetimeDB server instead of
//! the in-process world.
use std::fmt;
use std::time::Duration;

use coin_common::config::UnknownScoreMethod;
use coin_common::{ClaimSettings, ScoreLimiter, ScoreMethod};
use thiserror::Error;

pub const SCORE_METHOD_VAR: &str = "COIN_SCORE_METHOD";
pub const SCORE_TEMPLATE_VAR: &str = "COIN_SCORE_TEMPLATE";
pub const CAMPAIGN_ID_VAR: &str = "COIN_CAMPAIGN_ID";
pub const MIN_SCORE_VAR: &str = "COIN_MIN_SCORE";
pub const MIN_SCORE_MSG_VAR: &str = "COIN_MIN_SCORE_MSG";
pub const MAX_SCORE_VAR: &str = "COIN_MAX_SCORE";
pub const MAX_SCORE_MSG_VAR: &str = "COIN_MAX_SCORE_MSG";
pub const POLL_MS_VAR: &str = "COIN_POLL_MS";
pub const PLAYER_NAME_VAR: &str = "COIN_PLAYER_NAME";
pub const SERVER_URI_VAR: &str = "COIN_SERVER_URI";
pub const MODULE_NAME_VAR: &str = "COIN_MODULE_NAME";
/// Authentication token for the server connection
pub const TOKEN_VAR: &str = "SPACETIME_TOKEN";

pub const DEFAULT_PLAYER_NAME: &str = "player";
/// Template used by the object score method when none is configured
pub const DEFAULT_SCORE_TEMPLATE: &str = "coin-score";
/// Name of the published coin module
pub const DEFAULT_MODULE_NAME: &str = "coins";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    ScoreMethod(#[from] UnknownScoreMethod),
    #[error("{var} must be a positive number of milliseconds, got '{value}'")]
    PollInterval { var: &'static str, value: String },
}

/// Where the coin module is hosted
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    pub uri: String,
    pub module_name: String,
    pub token: Option<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("uri", &self.uri)
            .field("module_name", &self.module_name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub player_name: String,
    pub score_method: ScoreMethod,
    pub limiter: ScoreLimiter,
    pub claim: ClaimSettings,
    /// `None` runs against the in-process world
    pub server: Option<ServerConfig>,
}

impl ClientConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).unwrap_or_default();

        let template = match get(SCORE_TEMPLATE_VAR).trim() {
            "" => DEFAULT_SCORE_TEMPLATE.to_string(),
            t => t.to_string(),
        };
        let score_method = ScoreMethod::parse(&get(SCORE_METHOD_VAR), &template, &get(CAMPAIGN_ID_VAR))?;

        let limiter = ScoreLimiter::from_fields(
            &get(MIN_SCORE_VAR),
            &get(MIN_SCORE_MSG_VAR),
            &get(MAX_SCORE_VAR),
            &get(MAX_SCORE_MSG_VAR),
        );

        let mut claim = ClaimSettings::default();
        let poll = get(POLL_MS_VAR);
        if !poll.trim().is_empty() {
            let millis = poll
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::PollInterval { var: POLL_MS_VAR, value: poll.clone() })?;
            claim.poll_interval = Duration::from_millis(millis);
        }

        let player_name = match get(PLAYER_NAME_VAR).trim() {
            "" => DEFAULT_PLAYER_NAME.to_string(),
            name => name.to_string(),
        };

        let server = match get(SERVER_URI_VAR).trim() {
            "" => None,
            uri => Some(ServerConfig {
                uri: uri.to_string(),
                module_name: match get(MODULE_NAME_VAR).trim() {
                    "" => DEFAULT_MODULE_NAME.to_string(),
                    name => name.to_string(),
                },
                token: lookup(TOKEN_VAR).filter(|t| !t.trim().is_empty()),
            }),
        };

        Ok(Self { player_name, score_method, limiter, claim, server })
    }
}
