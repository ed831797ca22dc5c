//! Report lifecycle state machine
//!
//! Every report moves through these states exactly once, in order:
//!
//! ```text
//! Captured ──→ AwaitingProcessDecision ──┬──→ Approved ──→ Enqueued ──┬──→ Sent
//!                                        │        ↑                   └──→ Failed
//!                                        ├──→ AwaitingUserConfirmation
//!                                        │        │
//!                                        └────────┴──→ Discarded
//! ```
//!
//! `Sent`, `Failed` and `Discarded` are terminal. Any non-terminal state may
//! also move to `Discarded`, which is how internal errors and pipeline
//! shutdown retire a report.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Lifecycle state of one report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    /// Persisted, not yet looked at in this process
    Captured,
    /// Waiting for the listener's `should_process` answer
    AwaitingProcessDecision,
    /// Suspended until the host application confirms
    AwaitingUserConfirmation,
    /// Cleared for delivery
    Approved,
    /// Handed to the delivery channel, waiting for its outcome
    Enqueued,
    /// Delivered; local files removed
    Sent,
    /// Permanently failed; local files removed
    Failed,
    /// Dropped by the listener, the user, shutdown or an internal error
    Discarded,
}

impl ReportState {
    /// Returns the state name for display and errors
    pub fn name(&self) -> &'static str {
        match self {
            ReportState::Captured => "captured",
            ReportState::AwaitingProcessDecision => "awaiting_process_decision",
            ReportState::AwaitingUserConfirmation => "awaiting_user_confirmation",
            ReportState::Approved => "approved",
            ReportState::Enqueued => "enqueued",
            ReportState::Sent => "sent",
            ReportState::Failed => "failed",
            ReportState::Discarded => "discarded",
        }
    }

    /// Returns true for states no transition leaves
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportState::Sent | ReportState::Failed | ReportState::Discarded
        )
    }

    /// Returns true while the report waits on the host application
    pub fn is_pending_confirmation(&self) -> bool {
        matches!(self, ReportState::AwaitingUserConfirmation)
    }

    /// Checks whether moving to `target` is allowed
    pub fn can_transition_to(&self, target: ReportState) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self, target) {
            (_, ReportState::Discarded) => true,

            (ReportState::Captured, ReportState::AwaitingProcessDecision) => true,

            (ReportState::AwaitingProcessDecision, ReportState::AwaitingUserConfirmation) => true,
            (ReportState::AwaitingProcessDecision, ReportState::Approved) => true,

            (ReportState::AwaitingUserConfirmation, ReportState::Approved) => true,

            (ReportState::Approved, ReportState::Enqueued) => true,

            (ReportState::Enqueued, ReportState::Sent) => true,
            (ReportState::Enqueued, ReportState::Failed) => true,

            _ => false,
        }
    }

    /// Moves to `target`, or fails without changing state
    pub fn transition_to(&mut self, target: ReportState) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl Default for ReportState {
    fn default() -> Self {
        ReportState::Captured
    }
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
