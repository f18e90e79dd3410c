use super::*;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{http::header, routing::post, Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::{error::VoiceError, presentation::NullPresentation};

/// Increments a counter when dropped; stands in for the audio resource an
/// attempt holds.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeSynthesizer {
    fail_for: HashSet<String>,
    hang_for: HashSet<String>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, speaker: &str, text: &str) -> Result<AudioClip, VoiceError> {
        let _guard = ReleaseGuard(Arc::clone(&self.released));
        if self.hang_for.contains(speaker) {
            std::future::pending::<()>().await;
        }
        if self.fail_for.contains(speaker) {
            return Err(VoiceError::synthesis(speaker, "service unavailable"));
        }
        Ok(AudioClip::new(text.as_bytes().to_vec(), Some("audio/wav".into())))
    }
}

#[derive(Default)]
struct FakePlayer {
    delay: Duration,
    fail_for: HashSet<String>,
    hang_for: HashSet<String>,
    played: StdMutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    released: Arc<AtomicUsize>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, request: &VoiceRequest, clip: AudioClip) -> Result<(), VoiceError> {
        let _release = ReleaseGuard(Arc::clone(&self.released));
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        assert_eq!(clip.bytes, request.text.as_bytes());

        if self.hang_for.contains(&request.speaker) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        if self.fail_for.contains(&request.speaker) {
            return Err(VoiceError::playback(&request.speaker, "device busy"));
        }
        self.played
            .lock()
            .expect("played lock")
            .push(request.speaker.clone());
        Ok(())
    }
}

struct ChannelSink(mpsc::UnboundedSender<(VoiceRequest, DateTime<Utc>)>);

impl CompletionSink for ChannelSink {
    fn voice_completed(&self, request: &VoiceRequest, completed_at: DateTime<Utc>) {
        let _ = self.0.send((request.clone(), completed_at));
    }
}

#[derive(Default)]
struct StatusLog(StdMutex<Vec<VoiceStatus>>);

impl PresentationAdapter for StatusLog {
    fn on_state_changed(&self, _state: &shared::domain::SessionState) {}

    fn on_voice_status(&self, status: &VoiceStatus) {
        self.0.lock().expect("status lock").push(status.clone());
    }
}

type Acks = mpsc::UnboundedReceiver<(VoiceRequest, DateTime<Utc>)>;

fn spawn_pipeline(
    synthesizer: Arc<FakeSynthesizer>,
    player: Arc<FakePlayer>,
    presentation: Arc<dyn PresentationAdapter>,
) -> (VoicePipeline, Acks) {
    let (acks_tx, acks) = mpsc::unbounded_channel();
    let pipeline = VoicePipeline::spawn(
        synthesizer,
        player,
        Arc::new(ChannelSink(acks_tx)),
        presentation,
    );
    (pipeline, acks)
}

async fn next_ack(acks: &mut Acks) -> (VoiceRequest, DateTime<Utc>) {
    tokio::time::timeout(Duration::from_secs(5), acks.recv())
        .await
        .expect("timed out waiting for completion")
        .expect("completion stream ended")
}

async fn wait_for_status(pipeline: &VoicePipeline, predicate: impl FnMut(&VoiceStatus) -> bool) {
    let mut status = pipeline.subscribe_status();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(predicate))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

fn speakers(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn plays_in_enqueue_order_and_acknowledges_each() {
    let player = Arc::new(FakePlayer {
        delay: Duration::from_millis(10),
        ..FakePlayer::default()
    });
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer::default()),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    pipeline.enqueue("alice", "hi");
    pipeline.enqueue("bob", "hello");

    let (first, t1) = next_ack(&mut acks).await;
    let (second, t2) = next_ack(&mut acks).await;
    assert_eq!((first.speaker.as_str(), first.text.as_str()), ("alice", "hi"));
    assert_eq!((second.speaker.as_str(), second.text.as_str()), ("bob", "hello"));
    assert!(t2 >= t1);
    assert_eq!(*player.played.lock().expect("played"), vec!["alice", "bob"]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn order_ignores_speaker_identity() {
    let player = Arc::new(FakePlayer::default());
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer::default()),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    let script = [("bob", "1"), ("alice", "2"), ("bob", "3"), ("carol", "4")];
    for (speaker, text) in script {
        pipeline.enqueue(speaker, text);
    }
    let mut texts = Vec::new();
    for _ in 0..script.len() {
        texts.push(next_ack(&mut acks).await.0.text);
    }
    assert_eq!(texts, vec!["1", "2", "3", "4"]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn synthesis_failure_skips_without_acknowledgment() {
    let player = Arc::new(FakePlayer::default());
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer {
            fail_for: speakers(&["carol"]),
            ..FakeSynthesizer::default()
        }),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    pipeline.enqueue("carol", "x");
    pipeline.enqueue("dave", "y");

    let (ack, _) = next_ack(&mut acks).await;
    assert_eq!(ack.speaker, "dave");
    wait_for_status(&pipeline, |s| !s.is_playing && s.queue_length == 0).await;
    assert!(acks.try_recv().is_err());
    assert_eq!(*player.played.lock().expect("played"), vec!["dave"]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn playback_failure_advances_queue() {
    let player = Arc::new(FakePlayer {
        fail_for: speakers(&["erin"]),
        ..FakePlayer::default()
    });
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer::default()),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    pipeline.enqueue("erin", "one");
    pipeline.enqueue("frank", "two");

    let (ack, _) = next_ack(&mut acks).await;
    assert_eq!(ack.speaker, "frank");
    wait_for_status(&pipeline, |s| !s.is_playing).await;
    assert!(acks.try_recv().is_err());
    assert_eq!(player.released.load(Ordering::SeqCst), 2);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn never_more_than_one_playback_at_once() {
    let player = Arc::new(FakePlayer {
        delay: Duration::from_millis(15),
        ..FakePlayer::default()
    });
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer::default()),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    for i in 0..5 {
        pipeline.enqueue(format!("speaker-{i}"), format!("line {i}"));
    }
    for _ in 0..5 {
        next_ack(&mut acks).await;
    }
    assert_eq!(player.max_active.load(Ordering::SeqCst), 1);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn clear_mid_playback_releases_and_restarts_from_idle() {
    let player = Arc::new(FakePlayer {
        hang_for: speakers(&["alice"]),
        ..FakePlayer::default()
    });
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer::default()),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    pipeline.enqueue("alice", "a very long speech");
    pipeline.enqueue("bob", "queued behind alice");
    wait_for_status(&pipeline, |s| {
        s.current_speaker.as_deref() == Some("alice") && s.queue_length == 1
    })
    .await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while player.active.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("playback started");

    pipeline.clear().await;

    assert_eq!(pipeline.status(), VoiceStatus::default());
    assert_eq!(player.released.load(Ordering::SeqCst), 1);
    assert_eq!(player.active.load(Ordering::SeqCst), 0);

    pipeline.enqueue("carol", "fresh start");
    let (ack, _) = next_ack(&mut acks).await;
    assert_eq!(ack.speaker, "carol");
    assert!(acks.try_recv().is_err());
    assert_eq!(*player.played.lock().expect("played"), vec!["carol"]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn clear_while_synthesizing_drops_request() {
    let synthesizer = Arc::new(FakeSynthesizer {
        hang_for: speakers(&["slow"]),
        ..FakeSynthesizer::default()
    });
    let player = Arc::new(FakePlayer::default());
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::clone(&synthesizer),
        Arc::clone(&player),
        Arc::new(NullPresentation),
    );

    pipeline.enqueue("slow", "never arrives");
    wait_for_status(&pipeline, |s| s.current_speaker.as_deref() == Some("slow")).await;
    pipeline.clear().await;
    pipeline.clear().await;

    assert!(!pipeline.status().is_playing);
    pipeline.enqueue("quick", "ok");
    let (ack, _) = next_ack(&mut acks).await;
    assert_eq!(ack.speaker, "quick");
    assert_eq!(*player.played.lock().expect("played"), vec!["quick"]);
    assert_eq!(synthesizer.released.load(Ordering::SeqCst), 2);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn status_updates_reach_presentation() {
    let log = Arc::new(StatusLog::default());
    let (pipeline, mut acks) = spawn_pipeline(
        Arc::new(FakeSynthesizer::default()),
        Arc::new(FakePlayer::default()),
        log.clone(),
    );

    pipeline.enqueue("alice", "hi");
    next_ack(&mut acks).await;
    wait_for_status(&pipeline, |s| !s.is_playing).await;

    let statuses = log.0.lock().expect("status lock").clone();
    assert!(statuses.iter().any(|s| s.is_playing
        && s.current_speaker.as_deref() == Some("alice")));
    assert_eq!(statuses.last(), Some(&VoiceStatus::default()));
    pipeline.shutdown().await;
}

async fn spawn_synthesis_server(fail: bool) -> (String, Arc<StdMutex<Vec<Value>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let seen_by_handler = Arc::clone(&seen);
    let app = Router::new().route(
        SYNTHESIS_PATH,
        post(move |Json(body): Json<Value>| {
            let seen = Arc::clone(&seen_by_handler);
            async move {
                seen.lock().expect("seen lock").push(body);
                if fail {
                    (
                        axum::http::StatusCode::BAD_GATEWAY,
                        [(header::CONTENT_TYPE, "text/plain")],
                        b"upstream down".to_vec(),
                    )
                } else {
                    (
                        axum::http::StatusCode::OK,
                        [(header::CONTENT_TYPE, "audio/mpeg")],
                        b"ID3fake".to_vec(),
                    )
                }
            }
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), seen)
}

#[tokio::test]
async fn http_synthesizer_posts_character_to_controller_endpoint() {
    let (server_url, seen) = spawn_synthesis_server(false).await;
    let synthesizer = HttpSpeechSynthesizer::for_controller(&server_url, VoiceTable::default());

    let clip = synthesizer
        .synthesize("张明盛", "大家好")
        .await
        .expect("clip");
    assert_eq!(clip.bytes, b"ID3fake");
    assert_eq!(clip.extension(), "mp3");

    let body = seen.lock().expect("seen lock")[0].clone();
    assert_eq!(body["character"], "张明盛");
    assert_eq!(body["text"], "大家好");
    assert!(body.get("speaker").is_none());
    assert!(body.get("voice").is_none());
}

#[tokio::test]
async fn http_synthesizer_sends_configured_voice_override() {
    let (server_url, seen) = spawn_synthesis_server(false).await;
    let synthesizer = HttpSpeechSynthesizer::for_controller(
        &server_url,
        VoiceTable::new(
            HashMap::from([("alice".to_string(), "longfei_v2".to_string())]),
            None,
        ),
    );

    synthesizer.synthesize("alice", "hello").await.expect("clip");
    let body = seen.lock().expect("seen lock")[0].clone();
    assert_eq!(body["character"], "alice");
    assert_eq!(body["voice"], "longfei_v2");
}

#[tokio::test]
async fn http_synthesizer_maps_error_status_to_synthesis_fault() {
    let (server_url, _seen) = spawn_synthesis_server(true).await;
    let synthesizer = HttpSpeechSynthesizer::for_controller(&server_url, VoiceTable::default());
    let err = synthesizer
        .synthesize("bob", "hello")
        .await
        .expect_err("must fail");
    assert!(matches!(err, VoiceError::Synthesis { .. }));
}
