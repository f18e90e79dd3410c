//! Sequential narration playback.
//!
//! Voice requests are played strictly one at a time in arrival order. Each
//! attempt synthesizes the text, plays the audio and, only when playback ran
//! to completion, acknowledges it to the controller. Failed attempts are
//! logged and skipped; nothing is retried.

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use futures::{future::BoxFuture, FutureExt};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::presentation::{PresentationAdapter, VoiceStatus};

mod playback;
mod synthesis;

pub use playback::{AudioPlayer, CommandAudioPlayer, SilentAudioPlayer};
pub use synthesis::{
    controller_synthesis_url, truncate_for_synthesis, AudioClip, HttpSpeechSynthesizer,
    NullSynthesizer, SpeechSynthesizer, VoiceTable, MAX_SYNTHESIS_CHARS, SYNTHESIS_PATH,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRequest {
    pub speaker: String,
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
}

impl VoiceRequest {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed,
}

/// Receives the acknowledgment for every narration that played to the end.
pub trait CompletionSink: Send + Sync {
    fn voice_completed(&self, request: &VoiceRequest, completed_at: DateTime<Utc>);
}

enum PipelineCommand {
    Enqueue(VoiceRequest),
    Clear(oneshot::Sender<()>),
}

/// Handle to the playback task. The task owns the queue and the single
/// in-flight attempt; this handle only sends it commands.
pub struct VoicePipeline {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    status: watch::Receiver<VoiceStatus>,
    task: JoinHandle<()>,
}

impl VoicePipeline {
    pub fn spawn(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        completions: Arc<dyn CompletionSink>,
        presentation: Arc<dyn PresentationAdapter>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(VoiceStatus::default());
        let worker = PipelineWorker {
            synthesizer,
            player,
            completions,
            presentation,
            status: status_tx,
            queue: VecDeque::new(),
            in_flight: None,
        };
        let task = tokio::spawn(worker.run(commands_rx));
        Self {
            commands,
            status,
            task,
        }
    }

    pub fn enqueue(&self, speaker: impl Into<String>, text: impl Into<String>) {
        let request = VoiceRequest::new(speaker, text);
        debug!(speaker = %request.speaker, "voice: enqueue");
        if self
            .commands
            .send(PipelineCommand::Enqueue(request))
            .is_err()
        {
            warn!("voice: pipeline stopped, dropping narration");
        }
    }

    /// Drops every pending request and any attempt in progress. Returns once
    /// the pipeline is idle again.
    pub async fn clear(&self) {
        let (done, done_rx) = oneshot::channel();
        if self.commands.send(PipelineCommand::Clear(done)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    pub fn status(&self) -> VoiceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<VoiceStatus> {
        self.status.clone()
    }

    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

struct InFlight {
    request: VoiceRequest,
    attempt: BoxFuture<'static, PlaybackOutcome>,
}

struct PipelineWorker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    completions: Arc<dyn CompletionSink>,
    presentation: Arc<dyn PresentationAdapter>,
    status: watch::Sender<VoiceStatus>,
    queue: VecDeque<VoiceRequest>,
    in_flight: Option<InFlight>,
}

impl PipelineWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PipelineCommand>) {
        loop {
            if self.in_flight.is_none() {
                self.start_next();
            }

            let busy = self.in_flight.is_some();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PipelineCommand::Enqueue(request)) => {
                        self.queue.push_back(request);
                        self.publish();
                    }
                    Some(PipelineCommand::Clear(done)) => {
                        self.clear();
                        let _ = done.send(());
                    }
                    None => break,
                },
                outcome = wait_in_flight(&mut self.in_flight), if busy => {
                    if let Some(finished) = self.in_flight.take() {
                        self.finish(finished.request, outcome);
                    }
                }
            }
        }
        self.clear();
        debug!("voice: pipeline stopped");
    }

    fn start_next(&mut self) {
        let Some(request) = self.queue.pop_front() else {
            return;
        };
        info!(
            speaker = %request.speaker,
            waited_ms = (Utc::now() - request.enqueued_at).num_milliseconds(),
            "voice: starting narration"
        );
        let attempt = run_attempt(
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.player),
            request.clone(),
        )
        .boxed();
        self.in_flight = Some(InFlight { request, attempt });
        self.publish();
    }

    fn finish(&mut self, request: VoiceRequest, outcome: PlaybackOutcome) {
        match outcome {
            PlaybackOutcome::Completed => {
                info!(speaker = %request.speaker, "voice: narration completed");
                self.completions.voice_completed(&request, Utc::now());
            }
            PlaybackOutcome::Failed => {
                warn!(speaker = %request.speaker, "voice: narration skipped");
            }
        }
        self.publish();
    }

    fn clear(&mut self) {
        let pending = self.queue.len();
        let interrupted = self.in_flight.take();
        self.queue.clear();
        if pending > 0 || interrupted.is_some() {
            info!(
                pending,
                interrupted = interrupted.as_ref().map(|f| f.request.speaker.as_str()),
                "voice: queue cleared"
            );
        }
        // Dropping the attempt releases its audio and stops the player.
        drop(interrupted);
        self.publish();
    }

    fn publish(&self) {
        let status = VoiceStatus {
            queue_length: self.queue.len(),
            is_playing: self.in_flight.is_some(),
            current_speaker: self.in_flight.as_ref().map(|f| f.request.speaker.clone()),
        };
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        if changed {
            self.presentation.on_voice_status(&status);
        }
    }
}

async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> PlaybackOutcome {
    match in_flight.as_mut() {
        Some(current) => (&mut current.attempt).await,
        None => std::future::pending().await,
    }
}

async fn run_attempt(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    request: VoiceRequest,
) -> PlaybackOutcome {
    let clip = match synthesizer
        .synthesize(&request.speaker, &request.text)
        .await
    {
        Ok(clip) => clip,
        Err(err) => {
            error!(speaker = %request.speaker, error = %err, "voice: synthesis failed");
            return PlaybackOutcome::Failed;
        }
    };

    debug!(speaker = %request.speaker, bytes = clip.len(), "voice: playing");
    match player.play(&request, clip).await {
        Ok(()) => PlaybackOutcome::Completed,
        Err(err) => {
            error!(speaker = %request.speaker, error = %err, "voice: playback failed");
            PlaybackOutcome::Failed
        }
    }
}

#[cfg(test)]
#[path = "../tests/voice_pipeline_tests.rs"]
mod tests;
