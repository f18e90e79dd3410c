use std::sync::Arc;

use shared::protocol::ServerEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    channel::ChannelEvent,
    control::ControlClient,
    presentation::{Notice, PresentationAdapter},
    state_store::{StateChange, StateStore},
    voice::VoicePipeline,
};

/// The event-processing task: sole writer of the session state and the only
/// producer of narration work.
pub struct SpectatorSession {
    store: StateStore,
    voice: VoicePipeline,
    presentation: Arc<dyn PresentationAdapter>,
}

impl SpectatorSession {
    pub fn new(voice: VoicePipeline, presentation: Arc<dyn PresentationAdapter>) -> Self {
        Self {
            store: StateStore::new(),
            voice,
            presentation,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn voice(&self) -> &VoicePipeline {
        &self.voice
    }

    /// Seeds the mirror from the control plane before the event channel
    /// delivers its own snapshot. Failures only cost the head start.
    pub async fn bootstrap(&mut self, control: &ControlClient) {
        match control.fetch_state().await {
            Ok(state) => {
                let change = self.store.apply_snapshot(state);
                self.state_applied(change).await;
            }
            Err(err) => warn!(error = %err, "session: initial state fetch failed"),
        }

        match control.fetch_roster().await {
            Ok(roster) => {
                if self.store.apply_roster_if_empty(roster) {
                    self.presentation.on_state_changed(self.store.state());
                }
            }
            Err(err) => debug!(error = %err, "session: roster fetch failed"),
        }
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("session: event channel closed");
        self
    }

    pub async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.presentation.on_notice(&Notice::Connected);
            }
            ChannelEvent::Disconnected { reason } => {
                self.store.mark_stale();
                self.presentation
                    .on_notice(&Notice::Disconnected { reason });
            }
            ChannelEvent::Server(event) => self.handle_server_event(event).await,
        }
    }

    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionSnapshot(state) => {
                let change = self.store.apply_snapshot(state);
                self.state_applied(change).await;
            }
            ServerEvent::SessionDelta(mut delta) => {
                let message = delta.message.take();
                let change = self.store.apply_delta(delta);
                self.state_applied(change).await;
                if let Some(message) = message.filter(|m| !m.is_empty()) {
                    self.presentation.on_notice(&Notice::Message(message));
                }
            }
            ServerEvent::VoiceRequest { speaker, text } => {
                self.voice.enqueue(speaker, text);
            }
            ServerEvent::CallNotice(notice) => {
                debug!(
                    participant = %notice.participant,
                    call_id = %notice.call_id,
                    "session: call notice"
                );
                self.presentation.on_notice(&Notice::Call(notice));
            }
            ServerEvent::Fault { message } => {
                warn!(%message, "session: controller fault");
                self.presentation.on_notice(&Notice::Fault(message));
            }
        }
    }

    async fn state_applied(&mut self, change: StateChange) {
        if change.is_reset() {
            info!(previous = ?change.previous_status, "session: reset, clearing narration");
            self.voice.clear().await;
        }
        self.presentation.on_state_changed(self.store.state());
    }

    pub async fn shutdown(self) {
        self.voice.shutdown().await;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
