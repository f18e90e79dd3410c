use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Waiting,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Setup,
    Night,
    Werewolf,
    Seer,
    Witch,
    Guard,
    Dawn,
    Discussion,
    Vote,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Werewolf,
    Seer,
    Witch,
    Guard,
    Hunter,
    Villager,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    /// The controller sends an empty string for an unassigned role.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: String,
    #[serde(default = "default_alive")]
    pub alive: bool,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub model: Option<String>,
}

fn default_alive() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub day: u32,
    pub phase: Phase,
    pub source: String,
    pub message: String,
    #[serde(default, alias = "ai_call_ids", skip_serializing_if = "Vec::is_empty")]
    pub call_ids: Vec<String>,
}

impl LogEntry {
    pub fn is_system(&self) -> bool {
        self.source == SYSTEM_SOURCE || self.source == "系统"
    }
}

pub const SYSTEM_SOURCE: &str = "system";

/// Local mirror of the controller's session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub phase: Phase,
    pub current_day: u32,
    #[serde(alias = "characters")]
    pub participants: Vec<Participant>,
    #[serde(alias = "logs")]
    pub log: Vec<LogEntry>,
}

impl SessionState {
    /// The phase only carries meaning while the session is running.
    pub fn active_phase(&self) -> Option<Phase> {
        (self.status == SessionStatus::Running).then_some(self.phase)
    }
}

/// Keys the controller fills from a missing dict entry arrive as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.is_empty() => Ok(None),
        Some(other) => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
