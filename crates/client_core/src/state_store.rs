use shared::{
    domain::{Participant, SessionState, SessionStatus},
    protocol::SessionDelta,
};
use tracing::{debug, warn};

/// Status before and after an update, so callers can react to transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub previous_status: SessionStatus,
    pub status: SessionStatus,
}

impl StateChange {
    /// A session that returns to `waiting` from anywhere else has been reset.
    pub fn is_reset(&self) -> bool {
        self.status == SessionStatus::Waiting && self.previous_status != SessionStatus::Waiting
    }
}

/// Single-writer mirror of the controller's session state.
#[derive(Debug, Default)]
pub struct StateStore {
    state: SessionState,
    stale: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_snapshot(&mut self, snapshot: SessionState) -> StateChange {
        let previous_status = self.state.status;
        self.state = snapshot;
        self.stale = false;
        debug!(
            status = ?self.state.status,
            day = self.state.current_day,
            participants = self.state.participants.len(),
            "state: applied snapshot"
        );
        StateChange {
            previous_status,
            status: self.state.status,
        }
    }

    pub fn apply_delta(&mut self, delta: SessionDelta) -> StateChange {
        let previous_status = self.state.status;
        if !delta.ignored.is_empty() {
            warn!(fields = ?delta.ignored, "state: ignoring malformed delta fields");
        }

        let SessionDelta {
            status,
            phase,
            current_day,
            participants,
            log,
            ..
        } = delta;
        if let Some(status) = status {
            self.state.status = status;
        }
        if let Some(phase) = phase {
            self.state.phase = phase;
        }
        if let Some(current_day) = current_day {
            self.state.current_day = current_day;
        }
        if let Some(participants) = participants {
            self.state.participants = participants;
        }
        if let Some(log) = log {
            self.state.log = log;
        }

        StateChange {
            previous_status,
            status: self.state.status,
        }
    }

    /// Seeds the roster from the controller's roster listing when nothing
    /// better is known yet. Returns whether the roster was taken.
    pub fn apply_roster_if_empty(&mut self, participants: Vec<Participant>) -> bool {
        if !self.state.participants.is_empty() || participants.is_empty() {
            return false;
        }
        self.state.participants = participants;
        true
    }

    pub fn current_state(&self) -> SessionState {
        self.state.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Marks the mirror as awaiting a fresh snapshot after a lost connection.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}
