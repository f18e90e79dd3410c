use shared::{domain::SessionState, protocol::CallNotice};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceStatus {
    pub queue_length: usize,
    pub is_playing: bool,
    pub current_speaker: Option<String>,
}

/// Things worth telling the spectator that are not part of the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connected,
    Disconnected { reason: String },
    Message(String),
    Fault(String),
    Call(CallNotice),
}

/// Read-only observer of the spectator core.
pub trait PresentationAdapter: Send + Sync {
    fn on_state_changed(&self, state: &SessionState);
    fn on_voice_status(&self, status: &VoiceStatus);
    fn on_notice(&self, _notice: &Notice) {}
}

pub struct NullPresentation;

impl PresentationAdapter for NullPresentation {
    fn on_state_changed(&self, _state: &SessionState) {}

    fn on_voice_status(&self, _status: &VoiceStatus) {}
}
