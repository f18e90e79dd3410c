use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Body returned by the controller's control-plane endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse<T = serde_json::Value> {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ControlResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn into_result(self) -> Result<ControlResponse<T>, ControllerRejection> {
        match self.status {
            ResponseStatus::Success => Ok(self),
            ResponseStatus::Error => Err(ControllerRejection::new(
                self.message
                    .unwrap_or_else(|| "controller reported an error".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("controller rejected request: {message}")]
pub struct ControllerRejection {
    pub message: String,
}

impl ControllerRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
