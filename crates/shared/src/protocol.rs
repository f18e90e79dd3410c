use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{LogEntry, Participant, Phase, SessionState, SessionStatus};

/// Messages pushed by the session controller over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionSnapshot(SessionState),
    SessionDelta(SessionDelta),
    VoiceRequest { speaker: String, text: String },
    CallNotice(CallNotice),
    Fault { message: String },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionSnapshot(_) => "session_snapshot",
            ServerEvent::SessionDelta(_) => "session_delta",
            ServerEvent::VoiceRequest { .. } => "voice_request",
            ServerEvent::CallNotice(_) => "call_notice",
            ServerEvent::Fault { .. } => "fault",
        }
    }
}

/// Messages sent by the spectator back to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    VoiceCompleted {
        speaker: String,
        text: String,
        completed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallNotice {
    pub participant: String,
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Partial session update. Every present field replaces the matching
/// `SessionState` field wholesale; absent fields are left alone.
///
/// Decoding never fails on a bad field: keys that are unknown or whose value
/// does not decode are collected in `ignored` and the rest of the delta is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<LogEntry>>,
    /// Human-readable controller message; shown to the spectator, never stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub ignored: Vec<String>,
}

impl<'de> Deserialize<'de> for SessionDelta {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        let mut delta = SessionDelta::default();
        for (key, value) in fields {
            if value.is_null() {
                continue;
            }
            let accepted = match key.as_str() {
                "status" => decode_field(value, &mut delta.status),
                "phase" => decode_field(value, &mut delta.phase),
                "current_day" => decode_field(value, &mut delta.current_day),
                "participants" | "characters" => decode_field(value, &mut delta.participants),
                "log" | "logs" => decode_field(value, &mut delta.log),
                "message" => decode_field(value, &mut delta.message),
                _ => false,
            };
            if !accepted {
                delta.ignored.push(key);
            }
        }
        Ok(delta)
    }
}

fn decode_field<T: DeserializeOwned>(value: Value, slot: &mut Option<T>) -> bool {
    match serde_json::from_value(value) {
        Ok(decoded) => {
            *slot = Some(decoded);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
