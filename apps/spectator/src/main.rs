use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AudioPlayer, ChannelConfig, CommandAudioPlayer, ControlAction, ControlClient, EventChannel,
    HttpSpeechSynthesizer, NullSynthesizer, SilentAudioPlayer, SpectatorSession,
    SpeechSynthesizer, VoicePipeline, VoiceTable,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::{load_settings, Settings};
use console::ConsolePresenter;

#[derive(Parser, Debug)]
#[command(about = "Watch and narrate a live game session")]
struct Cli {
    /// TOML settings file; `spectator.toml` is read when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    /// Synthesis endpoint; defaults to the controller's `/api/voice/synthesize`.
    #[arg(long)]
    synthesis_url: Option<String>,
    /// Narrate without synthesis or audio output.
    #[arg(long)]
    silent: bool,
    /// Command line used to play each clip; the clip path is appended.
    #[arg(long)]
    player: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Follow the session and narrate it (default).
    Watch,
    Start,
    Pause,
    Resume,
    Reset,
    /// Print the controller's current session state as JSON.
    State,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.server_url {
        settings.server_url = url;
    }
    if let Some(url) = cli.synthesis_url {
        settings.synthesis_url = Some(url);
    }
    if let Some(player) = cli.player {
        settings.player_command = Some(player);
    }
    if cli.silent {
        settings.silent = true;
    }

    let control = ControlClient::new(settings.server_url.clone());
    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(settings, control).await,
        Command::Start => run_action(&control, ControlAction::Start).await,
        Command::Pause => run_action(&control, ControlAction::Pause).await,
        Command::Resume => run_action(&control, ControlAction::Resume).await,
        Command::Reset => run_action(&control, ControlAction::Reset).await,
        Command::State => {
            let state = control
                .fetch_state()
                .await
                .context("failed to fetch session state")?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
    }
}

async fn run_action(control: &ControlClient, action: ControlAction) -> Result<()> {
    let response = control
        .send(action)
        .await
        .with_context(|| format!("{} request failed", action.as_str()))?;
    let message = response.message.unwrap_or_else(|| "ok".into());
    println!("{}: {message}", action.as_str());
    Ok(())
}

async fn watch(settings: Settings, control: ControlClient) -> Result<()> {
    let mut channel_config = ChannelConfig::new(settings.server_url.clone());
    channel_config.reconnect_delay = settings.reconnect_delay();
    let (channel, events) =
        EventChannel::open(channel_config).context("invalid controller address")?;

    let presenter = Arc::new(ConsolePresenter::default());
    let voice = VoicePipeline::spawn(
        synthesizer(&settings),
        player(&settings),
        Arc::new(channel.sender()),
        presenter.clone(),
    );

    let mut session = SpectatorSession::new(voice, presenter);
    session.bootstrap(&control).await;
    info!(server = %settings.server_url, "spectating");

    let session = tokio::select! {
        session = session.run(events) => Some(session),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            None
        }
    };
    if let Some(session) = session {
        session.shutdown().await;
    }
    channel.close();
    Ok(())
}

fn synthesizer(settings: &Settings) -> Arc<dyn SpeechSynthesizer> {
    match settings.synthesis_endpoint() {
        Some(endpoint) => {
            info!(%endpoint, "synthesizing narration");
            let voices = VoiceTable::new(settings.voices.clone(), settings.default_voice.clone());
            Arc::new(HttpSpeechSynthesizer::new(endpoint, voices))
        }
        None => {
            info!("silent mode, narration will not be synthesized");
            Arc::new(NullSynthesizer)
        }
    }
}

fn player(settings: &Settings) -> Arc<dyn AudioPlayer> {
    let silent = || -> Arc<dyn AudioPlayer> {
        Arc::new(SilentAudioPlayer::new(settings.silent_per_char()))
    };
    // Without synthesis there is no audio to hand to an external player.
    let Some(command_line) = settings
        .player_command
        .as_deref()
        .filter(|_| !settings.silent)
    else {
        return silent();
    };
    match CommandAudioPlayer::from_command_line(command_line) {
        Some(player) => Arc::new(player),
        None => {
            warn!(command = command_line, "unusable player command, falling back to silence");
            silent()
        }
    }
}
