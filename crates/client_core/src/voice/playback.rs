use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{AudioClip, VoiceRequest};
use crate::error::VoiceError;

/// Plays one clip to the end. Implementations must release everything they
/// hold when the returned future is dropped early.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, request: &VoiceRequest, clip: AudioClip) -> Result<(), VoiceError>;
}

/// Hands each clip to an external player program through a temporary file.
pub struct CommandAudioPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandAudioPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parses `"ffplay -nodisp -autoexit -loglevel quiet"` style command lines.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl AudioPlayer for CommandAudioPlayer {
    async fn play(&self, request: &VoiceRequest, clip: AudioClip) -> Result<(), VoiceError> {
        let speaker = request.speaker.as_str();
        if clip.is_empty() {
            return Err(VoiceError::playback(speaker, "no audio to play"));
        }
        let file = tempfile::Builder::new()
            .prefix("spectator-voice-")
            .suffix(&format!(".{}", clip.extension()))
            .tempfile()
            .map_err(|err| VoiceError::playback(speaker, err))?;

        tokio::fs::write(file.path(), &clip.bytes)
            .await
            .map_err(|err| VoiceError::playback(speaker, err))?;
        drop(clip);

        debug!(program = %self.program, path = %file.path().display(), "voice: launching player");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|err| VoiceError::playback(speaker, err))?;

        if !status.success() {
            return Err(VoiceError::playback(
                speaker,
                format!("{} exited with {status}", self.program),
            ));
        }
        Ok(())
    }
}

/// Stands in for a speaker when there is no audio device: waits roughly as
/// long as the narration would take to read aloud.
pub struct SilentAudioPlayer {
    per_char: Duration,
}

impl SilentAudioPlayer {
    pub fn new(per_char: Duration) -> Self {
        Self { per_char }
    }

    pub fn duration_for(&self, text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        self.per_char.saturating_mul(chars)
    }
}

impl Default for SilentAudioPlayer {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl AudioPlayer for SilentAudioPlayer {
    async fn play(&self, request: &VoiceRequest, _clip: AudioClip) -> Result<(), VoiceError> {
        tokio::time::sleep(self.duration_for(&request.text)).await;
        Ok(())
    }
}
