//! Spectator client core: mirrors a remote game session and narrates it.
//!
//! [`channel::EventChannel`] receives controller events, [`session::SpectatorSession`]
//! merges them into a [`state_store::StateStore`] and feeds narration into the
//! [`voice::VoicePipeline`], whose completions go back out over the channel.

pub mod channel;
pub mod control;
pub mod error;
pub mod presentation;
pub mod session;
pub mod state_store;
pub mod voice;

pub use channel::{ChannelConfig, ChannelEvent, EventChannel, OutboundSender};
pub use control::{ControlAction, ControlClient};
pub use presentation::{Notice, NullPresentation, PresentationAdapter, VoiceStatus};
pub use session::SpectatorSession;
pub use state_store::{StateChange, StateStore};
pub use voice::{
    AudioClip, AudioPlayer, CommandAudioPlayer, CompletionSink, HttpSpeechSynthesizer,
    NullSynthesizer, PlaybackOutcome, SilentAudioPlayer, SpeechSynthesizer, VoicePipeline,
    VoiceRequest, VoiceTable,
};
