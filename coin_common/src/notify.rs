use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message box for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAlert {
    pub detail: Option<String>,
    pub title: String,
    pub severity: Severity,
}

/// Updates pushed to the score panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PanelMessage {
    SetScore { score: f64 },
}

/// User-facing messaging channel
pub trait UserNotifier {
    fn alert(&self, alert: &UserAlert);
    fn post_message(&self, message: &PanelMessage);
}

/// Notifier that only logs, for headless hosts
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl UserNotifier for LogNotifier {
    fn alert(&self, alert: &UserAlert) {
        log::info!("alert [{:?}] {}: {}", alert.severity, alert.title, alert.detail.as_deref().unwrap_or(""));
    }

    fn post_message(&self, message: &PanelMessage) {
        log::debug!("panel message {:?}", message);
    }
}
