//! Per-report lifecycle tracking
//!
//! Shared between the confirmation gate, the delivery coordinator and the
//! pipeline facade. Each report's state is its own map entry; an entry is
//! only locked for the duration of a single transition, never across a
//! listener call.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crashgate_core::domain::{ReportId, ReportState};
use crashgate_storage::ErrorStorage;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ReportTracker {
    states: Arc<DashMap<ReportId, ReportState>>,
    storage: Arc<ErrorStorage>,
}

impl ReportTracker {
    pub fn new(storage: Arc<ErrorStorage>) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            storage,
        }
    }

    /// Current state of a report seen by this process
    pub fn state(&self, id: &ReportId) -> Option<ReportState> {
        self.states.get(id).map(|entry| *entry)
    }

    pub fn contains(&self, id: &ReportId) -> bool {
        self.states.contains_key(id)
    }

    /// Starts tracking a report as `Captured`; no-op when already tracked.
    pub fn track(&self, id: ReportId) {
        self.states.entry(id).or_default();
    }

    /// Moves a tracked report to `target`.
    pub fn advance(&self, id: &ReportId, target: ReportState) -> Result<()> {
        match self.states.get_mut(id) {
            Some(mut state) => {
                state.transition_to(target)?;
                debug!(report_id = %id, state = %target, "Report state changed");
                Ok(())
            }
            None => Err(crashgate_core::domain::DomainError::ValidationFailed(format!(
                "report {id} is not tracked"
            ))
            .into()),
        }
    }

    /// Stops tracking a report so a later start may pick it up again.
    pub fn forget(&self, id: &ReportId) {
        self.states.remove(id);
    }

    /// Retires a report and deletes its files.
    pub fn discard(&self, id: &ReportId) {
        if let Some(mut state) = self.states.get_mut(id) {
            if let Err(e) = state.transition_to(ReportState::Discarded) {
                warn!(report_id = %id, error = %e, "Discarding report from unexpected state");
                *state = ReportState::Discarded;
            }
        }
        self.storage.delete_report(id);
    }

    /// Ids of every report currently in `state`
    pub fn in_state(&self, state: ReportState) -> Vec<ReportId> {
        self.states
            .iter()
            .filter(|entry| *entry.value() == state)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Marks every non-terminal report discarded without touching files.
    pub fn discard_all_live(&self) -> usize {
        let mut count = 0;
        for mut entry in self.states.iter_mut() {
            if !entry.is_terminal() {
                *entry = ReportState::Discarded;
                count += 1;
            }
        }
        count
    }
}
