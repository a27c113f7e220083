use chrono::{DateTime, Local};
use coin_common::{PanelMessage, Severity, UserAlert, UserNotifier};

/// Prints alerts and score updates of one player to the terminal
pub struct TerminalNotifier {
    player: String,
}

impl TerminalNotifier {
    pub fn new(player: impl Into<String>) -> Self {
        Self { player: player.into() }
    }
}

pub fn format_alert(player: &str, alert: &UserAlert, at: DateTime<Local>) -> String {
    let tag = match alert.severity {
        Severity::Info => "info",
        Severity::Warning => "warn",
        Severity::Error => "error",
    };
    match &alert.detail {
        Some(detail) => format!("[{}] {} {}: {} ({})", at.format("%H:%M:%S"), player, tag, alert.title, detail),
        None => format!("[{}] {} {}: {}", at.format("%H:%M:%S"), player, tag, alert.title),
    }
}

impl UserNotifier for TerminalNotifier {
    fn alert(&self, alert: &UserAlert) {
        println!("{}", format_alert(&self.player, alert, Local::now()));
    }

    fn post_message(&self, message: &PanelMessage) {
        match message {
            PanelMessage::SetScore { score } => log::info!("{} score: {}", self.player, score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn alerts_carry_time_player_and_detail() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        let limit = UserAlert { detail: None, title: "You are full!".into(), severity: Severity::Info };
        assert_eq!(format_alert("alice", &limit, at), "[09:30:05] alice info: You are full!");

        let failure =
            UserAlert { detail: Some("Object not found".into()), title: "Oops".into(), severity: Severity::Warning };
        assert_eq!(format_alert("bob", &failure, at), "[09:30:05] bob warn: Oops (Object not found)");
    }
}
