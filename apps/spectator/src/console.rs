//! Terminal rendering of the spectated session.

use std::sync::Mutex;

use client_core::{Notice, PresentationAdapter, VoiceStatus};
use shared::domain::{LogEntry, Phase, Role, SessionState, SessionStatus};
use tracing::{info, warn};

#[derive(Default)]
pub struct ConsolePresenter {
    last: Mutex<Option<SessionState>>,
}

impl PresentationAdapter for ConsolePresenter {
    fn on_state_changed(&self, state: &SessionState) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        let previous = last.take();

        for line in render_changes(previous.as_ref(), state) {
            println!("{line}");
        }
        *last = Some(state.clone());
    }

    fn on_voice_status(&self, status: &VoiceStatus) {
        match &status.current_speaker {
            Some(speaker) => info!(
                speaker = %speaker,
                queued = status.queue_length,
                "voice: speaking"
            ),
            None if status.queue_length == 0 => info!("voice: idle"),
            None => info!(queued = status.queue_length, "voice: waiting"),
        }
    }

    fn on_notice(&self, notice: &Notice) {
        match notice {
            Notice::Connected => info!("connected to controller"),
            Notice::Disconnected { reason } => warn!(%reason, "disconnected from controller"),
            Notice::Message(message) => println!(">> {message}"),
            Notice::Fault(message) => warn!(%message, "controller error"),
            Notice::Call(call) => info!(
                participant = %call.participant,
                call_id = %call.call_id,
                kind = call.kind.as_deref().unwrap_or("-"),
                "ai call recorded"
            ),
        }
    }
}

fn render_changes(previous: Option<&SessionState>, state: &SessionState) -> Vec<String> {
    let mut lines = Vec::new();

    let status_changed = previous.map_or(true, |p| p.status != state.status);
    let phase_changed = previous.map_or(true, |p| p.phase != state.phase);
    let day_changed = previous.map_or(true, |p| p.current_day != state.current_day);
    if status_changed || phase_changed || day_changed {
        let phase = state
            .active_phase()
            .map(phase_label)
            .unwrap_or("-");
        lines.push(format!(
            "[{}] day {} | {}",
            status_label(state.status),
            state.current_day,
            phase
        ));
    }

    let roster_changed = previous.map_or(true, |p| p.participants != state.participants);
    if roster_changed && !state.participants.is_empty() {
        let roster = state
            .participants
            .iter()
            .map(|p| {
                let role = p.role.map(role_label).unwrap_or("unassigned");
                let mark = if p.alive { "" } else { " (dead)" };
                format!("{} [{role}]{mark}", p.name)
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("players: {roster}"));
    }

    // The log is replaced wholesale; only print entries past the common prefix.
    let seen = previous.map_or(0, |p| common_prefix(&p.log, &state.log));
    lines.extend(state.log[seen..].iter().map(render_log_entry));
    lines
}

fn common_prefix(a: &[LogEntry], b: &[LogEntry]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn render_log_entry(entry: &LogEntry) -> String {
    let source = if entry.is_system() {
        "system"
    } else {
        entry.source.as_str()
    };
    format!(
        "[{}] [day {} - {}] {source}: {}",
        entry.timestamp,
        entry.day,
        phase_label(entry.phase),
        entry.message
    )
}

pub fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Waiting => "waiting to start",
        SessionStatus::Running => "in progress",
        SessionStatus::Paused => "paused",
        SessionStatus::Finished => "finished",
    }
}

pub fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Setup => "setup",
        Phase::Night => "night",
        Phase::Werewolf => "werewolves act",
        Phase::Seer => "seer acts",
        Phase::Witch => "witch acts",
        Phase::Guard => "guard acts",
        Phase::Dawn => "dawn",
        Phase::Discussion => "discussion",
        Phase::Vote => "vote",
        Phase::End => "game over",
    }
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::Werewolf => "werewolf",
        Role::Seer => "seer",
        Role::Witch => "witch",
        Role::Guard => "guard",
        Role::Hunter => "hunter",
        Role::Villager => "villager",
    }
}
