//! User confirmation decisions

use serde::{Deserialize, Serialize};

/// Answer of the host application to a pending confirmation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserConfirmation {
    /// Discard the pending reports
    DontSend,
    /// Send the pending reports
    Send,
    /// Send the pending reports and stop asking
    AlwaysSend,
}

impl UserConfirmation {
    /// Returns true when the decision approves delivery
    pub fn approves(&self) -> bool {
        !matches!(self, UserConfirmation::DontSend)
    }
}

impl std::fmt::Display for UserConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserConfirmation::DontSend => "dont_send",
            UserConfirmation::Send => "send",
            UserConfirmation::AlwaysSend => "always_send",
        };
        write!(f, "{}", s)
    }
}
