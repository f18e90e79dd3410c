use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{Participant, SessionState},
    error::ControlResponse,
};
use tracing::info;

use crate::error::ControlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Reset,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Reset => "reset",
        }
    }
}

/// Client for the controller's REST control plane.
#[derive(Clone)]
pub struct ControlClient {
    http: Client,
    server_url: String,
}

impl ControlClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn start(&self) -> Result<ControlResponse, ControlError> {
        self.send(ControlAction::Start).await
    }

    pub async fn pause(&self) -> Result<ControlResponse, ControlError> {
        self.send(ControlAction::Pause).await
    }

    pub async fn resume(&self) -> Result<ControlResponse, ControlError> {
        self.send(ControlAction::Resume).await
    }

    pub async fn reset(&self) -> Result<ControlResponse, ControlError> {
        self.send(ControlAction::Reset).await
    }

    pub async fn send(&self, action: ControlAction) -> Result<ControlResponse, ControlError> {
        let res = self
            .http
            .post(format!("{}/api/game/{}", self.server_url, action.as_str()))
            .send()
            .await?
            .error_for_status()?;
        let body: ControlResponse = res.json().await?;
        let body = body.into_result()?;
        info!(
            action = action.as_str(),
            message = body.message.as_deref().unwrap_or(""),
            "control: request accepted"
        );
        Ok(body)
    }

    pub async fn fetch_state(&self) -> Result<SessionState, ControlError> {
        self.fetch_data("/api/game/state", "session state").await
    }

    pub async fn fetch_roster(&self) -> Result<Vec<Participant>, ControlError> {
        self.fetch_data("/api/characters", "roster").await
    }

    async fn fetch_data<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &'static str,
    ) -> Result<T, ControlError> {
        let res = self
            .http
            .get(format!("{}{path}", self.server_url))
            .send()
            .await?
            .error_for_status()?;
        let body: ControlResponse<T> = res.json().await?;
        body.into_result()?
            .data
            .ok_or(ControlError::MissingData(what))
    }
}

#[cfg(test)]
#[path = "tests/control_tests.rs"]
mod tests;
