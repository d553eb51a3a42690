use std::fmt;

use contracts::{SessionConfig, SessionStatus, TrialAction, TrialState};

use crate::contradiction::{PolarityComparer, StatementComparer};

mod process;

/// Result of offering one event to the engine.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// False when the event failed validity and only the warning counter moved.
    pub accepted: bool,
    pub actions: Vec<TrialAction>,
    pub changes: Vec<String>,
}

/// Concatenated outcome of a batch fold.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub processed: u64,
    pub rejected: u64,
    pub actions: Vec<TrialAction>,
    pub changes: Vec<String>,
}

/// Owns the trial state and advances it exactly once per offered event.
/// All fields are private: the rendering and CLI layers read snapshots,
/// they never mutate.
pub struct TrialEngine {
    state: TrialState,
    config: SessionConfig,
    comparer: Box<dyn StatementComparer>,
}

impl TrialEngine {
    pub fn new(config: SessionConfig) -> Self {
        let state = TrialState::fresh(&config);
        Self {
            state,
            config,
            comparer: Box::new(PolarityComparer),
        }
    }

    /// Continue a session from previously persisted state.
    pub fn resume(config: SessionConfig, state: TrialState) -> Self {
        Self {
            state,
            config,
            comparer: Box::new(PolarityComparer),
        }
    }

    pub fn with_comparer(mut self, comparer: Box<dyn StatementComparer>) -> Self {
        self.comparer = comparer;
        self
    }

    pub fn state(&self) -> &TrialState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn events_processed(&self) -> u64 {
        self.state.events_processed
    }

    /// The stream is re-read in full each pass; the invalid-line count is
    /// therefore absolute, not incremental.
    pub fn set_stream_warning_count(&mut self, count: u64) {
        self.state.warning_count = count;
    }

    /// The only external mutation of a recorded contradiction: flip its
    /// `exploited` flag. Returns false when the id is unknown. Identity
    /// fields are never touched.
    pub fn mark_contradiction_exploited(&mut self, contradiction_id: &str) -> bool {
        match self
            .state
            .contradictions
            .iter_mut()
            .find(|contradiction| contradiction.contradiction_id == contradiction_id)
        {
            Some(contradiction) => {
                contradiction.exploited = true;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for TrialEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialEngine")
            .field("session_id", &self.state.session_id)
            .field("events_processed", &self.state.events_processed)
            .field("momentum_score", &self.state.momentum_score)
            .finish_non_exhaustive()
    }
}
