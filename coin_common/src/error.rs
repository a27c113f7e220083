use thiserror::Error;

use crate::notify::{Severity, UserAlert};
use crate::score_limit::LimitRejection;
use crate::types::SpawnerId;

/// Title shown when a claim fails for any reason other than a score limit
pub const CLAIM_FAILED_TITLE: &str = "Could not update your score";
/// Reply of the exclusive removal to every claimant after the first one
pub const OBJECT_NOT_FOUND: &str = "Object not found";
/// Title shown when a spawner admin action fails
pub const SPAWN_FAILED_TITLE: &str = "Spawner action failed";

/// Why a claim's authoritative commit failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClaimError {
    /// Score limit hit; carries the configured user-facing message
    #[error(transparent)]
    AdmissionRejected(#[from] LimitRejection),
    /// An external hook or service returned nothing
    #[error("{0}")]
    BackendUnavailable(String),
    /// An external call returned an explicit error payload
    #[error("{0}")]
    BackendError(String),
    /// A referenced durable record is missing (after one refetch)
    #[error("{0}")]
    NotFound(String),
}

impl ClaimError {
    pub fn is_limit(&self) -> bool {
        matches!(self, ClaimError::AdmissionRejected(_))
    }

    /// How the failure is shown to the claimant
    pub fn user_alert(&self) -> UserAlert {
        match self {
            ClaimError::AdmissionRejected(rejection) => UserAlert {
                detail: None,
                title: rejection.message().to_string(),
                severity: Severity::Info,
            },
            other => UserAlert {
                detail: Some(other.to_string()),
                title: CLAIM_FAILED_TITLE.to_string(),
                severity: Severity::Warning,
            },
        }
    }
}

/// Failures of spawner operations (ticks and admin actions)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpawnError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("{0} does not exist")]
    SpawnerNotFound(SpawnerId),
    #[error("only the spawner's owner may do that")]
    Unauthorized,
}

impl SpawnError {
    /// How a failed admin action is shown to the admin
    pub fn user_alert(&self) -> UserAlert {
        UserAlert { detail: Some(self.to_string()), title: SPAWN_FAILED_TITLE.to_string(), severity: Severity::Error }
    }
}

/// Why a spawner tick declined to spawn. Logged, never surfaced to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    PopulationCap { owned: usize, max: usize },
    RateLimited { next_spawn_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_rejections_alert_with_the_message_as_title() {
        let err = ClaimError::from(LimitRejection::AtMaximum("Full!".into()));
        let alert = err.user_alert();
        assert_eq!(alert.title, "Full!");
        assert_eq!(alert.detail, None);
        assert!(err.is_limit());
    }

    #[test]
    fn other_failures_alert_as_warnings() {
        let err = ClaimError::BackendUnavailable("reward service missing".into());
        let alert = err.user_alert();
        assert_eq!(alert.title, CLAIM_FAILED_TITLE);
        assert_eq!(alert.detail.as_deref(), Some("reward service missing"));
        assert_eq!(alert.severity, Severity::Warning);
    }

    #[test]
    fn spawn_failures_alert_as_errors() {
        let alert = SpawnError::SpawnerNotFound(SpawnerId(4)).user_alert();
        assert_eq!(alert.title, SPAWN_FAILED_TITLE);
        assert_eq!(alert.detail.as_deref(), Some("spawner#4 does not exist"));
        assert_eq!(alert.severity, Severity::Error);
    }
}
