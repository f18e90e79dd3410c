use thiserror::Error;

/// Failures on the controller event channel. All of them are recoverable:
/// the channel reports a disconnect and reconnects.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("server_url must start with http://, https://, ws:// or wss://: {0}")]
    InvalidUrl(String),
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("websocket receive failed: {0}")]
    Receive(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("websocket send failed: {0}")]
    Send(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed by controller")]
    Closed,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("speech synthesis failed for {speaker}: {reason}")]
    Synthesis { speaker: String, reason: String },
    #[error("audio playback failed for {speaker}: {reason}")]
    Playback { speaker: String, reason: String },
}

impl VoiceError {
    pub fn synthesis(speaker: &str, reason: impl ToString) -> Self {
        Self::Synthesis {
            speaker: speaker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn playback(speaker: &str, reason: impl ToString) -> Self {
        Self::Playback {
            speaker: speaker.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Rejected(#[from] shared::error::ControllerRejection),
    #[error("controller response for {0} carried no data")]
    MissingData(&'static str),
}
