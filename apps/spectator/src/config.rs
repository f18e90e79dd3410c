use std::{collections::HashMap, fs, io, path::Path, time::Duration};

use anyhow::Context;
use client_core::voice::controller_synthesis_url;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "spectator.toml";
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    /// Overrides the controller's own `/api/voice/synthesize`.
    pub synthesis_url: Option<String>,
    /// Skip synthesis entirely and time narration silently.
    pub silent: bool,
    pub player_command: Option<String>,
    pub reconnect_delay_ms: u64,
    pub default_voice: Option<String>,
    pub voices: HashMap<String, String>,
    pub silent_ms_per_char: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5003".into(),
            synthesis_url: None,
            silent: false,
            player_command: None,
            reconnect_delay_ms: 2000,
            default_voice: None,
            voices: HashMap::new(),
            silent_ms_per_char: 100,
        }
    }
}

impl Settings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms).max(MIN_RECONNECT_DELAY)
    }

    pub fn synthesis_endpoint(&self) -> Option<String> {
        if self.silent {
            return None;
        }
        Some(
            self.synthesis_url
                .clone()
                .unwrap_or_else(|| controller_synthesis_url(&self.server_url)),
        )
    }

    pub fn silent_per_char(&self) -> Duration {
        Duration::from_millis(self.silent_ms_per_char)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    server_url: Option<String>,
    synthesis_url: Option<String>,
    silent: Option<bool>,
    player_command: Option<String>,
    reconnect_delay_ms: Option<u64>,
    default_voice: Option<String>,
    silent_ms_per_char: Option<u64>,
    #[serde(default)]
    voices: HashMap<String, String>,
}

/// Defaults, then the TOML file, then environment variables.
///
/// An explicitly named file must exist; the default `spectator.toml` is
/// optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            apply_file(&mut settings, file_cfg);
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.synthesis_url {
        settings.synthesis_url = Some(v);
    }
    if let Some(v) = file_cfg.silent {
        settings.silent = v;
    }
    if let Some(v) = file_cfg.player_command {
        settings.player_command = Some(v);
    }
    if let Some(v) = file_cfg.reconnect_delay_ms {
        settings.reconnect_delay_ms = v;
    }
    if let Some(v) = file_cfg.default_voice {
        settings.default_voice = Some(v);
    }
    if let Some(v) = file_cfg.silent_ms_per_char {
        settings.silent_ms_per_char = v;
    }
    settings.voices.extend(file_cfg.voices);
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SPECTATOR_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("APP__SYNTHESIS_URL") {
        settings.synthesis_url = non_empty(v);
    }
    if let Some(v) = var("APP__SILENT") {
        if let Ok(parsed) = v.trim().parse::<bool>() {
            settings.silent = parsed;
        }
    }
    if let Some(v) = var("APP__PLAYER_COMMAND") {
        settings.player_command = non_empty(v);
    }
    if let Some(v) = var("APP__DEFAULT_VOICE") {
        settings.default_voice = non_empty(v);
    }

    if let Some(v) = var("APP__RECONNECT_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reconnect_delay_ms = parsed;
        }
    }
    if let Some(v) = var("APP__SILENT_MS_PER_CHAR") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.silent_ms_per_char = parsed;
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
