use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientRequest, ServerEvent};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    error::ChannelError,
    voice::{CompletionSink, VoiceRequest},
};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub server_url: String,
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Everything the channel reports, in the order the controller sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
    Server(ServerEvent),
}

/// Cloneable write half of the channel. Requests emitted while disconnected
/// are held and flushed after the next successful connect.
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<ClientRequest>,
}

impl OutboundSender {
    pub fn emit(&self, request: ClientRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

impl CompletionSink for OutboundSender {
    fn voice_completed(&self, request: &VoiceRequest, completed_at: DateTime<Utc>) {
        let sent = self.emit(ClientRequest::VoiceCompleted {
            speaker: request.speaker.clone(),
            text: request.text.clone(),
            completed_at,
        });
        if !sent {
            warn!(speaker = %request.speaker, "channel: closed, completion not delivered");
        }
    }
}

/// Long-lived, self-reconnecting link to the session controller.
pub struct EventChannel {
    outbound: OutboundSender,
    task: JoinHandle<()>,
}

impl EventChannel {
    pub fn open(
        config: ChannelConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>), ChannelError> {
        let ws_url = websocket_url(&config.server_url)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection_loop(
            ws_url.to_string(),
            config.reconnect_delay,
            events_tx,
            outbound_rx,
        ));
        Ok((
            Self {
                outbound: OutboundSender { tx: outbound_tx },
                task,
            },
            events_rx,
        ))
    }

    pub fn sender(&self) -> OutboundSender {
        self.outbound.clone()
    }

    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Maps the controller's http(s) base URL onto its websocket endpoint.
pub fn websocket_url(server_url: &str) -> Result<Url, ChannelError> {
    let invalid = || ChannelError::InvalidUrl(server_url.to_string());
    let mut url = Url::parse(server_url.trim()).map_err(|_| invalid())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|()| invalid())?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/ws");
    }
    Ok(url)
}

enum SessionEnd {
    Lost(String),
    ConsumerGone,
}

async fn run_connection_loop(
    ws_url: String,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<ClientRequest>,
) {
    let mut unsent: Option<ClientRequest> = None;
    let mut failed_attempts: u32 = 0;
    loop {
        match connect_async(ws_url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %ws_url, "channel: connected");
                failed_attempts = 0;
                if events.send(ChannelEvent::Connected).is_err() {
                    return;
                }
                match pump(stream, &events, &mut outbound, &mut unsent).await {
                    SessionEnd::ConsumerGone => return,
                    SessionEnd::Lost(reason) => {
                        warn!(url = %ws_url, %reason, "channel: connection lost");
                        if events
                            .send(ChannelEvent::Disconnected { reason })
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                let first_failure = record_failure(&mut failed_attempts);
                let err = ChannelError::Connect {
                    url: ws_url.clone(),
                    source: err,
                };
                if first_failure {
                    warn!(error = %err, "channel: connect failed, retrying");
                } else {
                    debug!(error = %err, failed_attempts, "channel: connect retry failed");
                }
                if events.is_closed() {
                    return;
                }
            }
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Counts a failed connect; true only for the first of a streak.
fn record_failure(failed_attempts: &mut u32) -> bool {
    *failed_attempts = failed_attempts.saturating_add(1);
    *failed_attempts == 1
}

async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    outbound: &mut mpsc::UnboundedReceiver<ClientRequest>,
    unsent: &mut Option<ClientRequest>,
) -> SessionEnd {
    let (mut writer, mut reader) = stream.split();

    if let Some(request) = unsent.take() {
        if let Err(err) = send_request(&mut writer, &request).await {
            *unsent = Some(request);
            return SessionEnd::Lost(err.to_string());
        }
    }

    let mut outbound_open = true;
    loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        debug!(kind = event.kind(), "channel: event");
                        if events.send(ChannelEvent::Server(event)).is_err() {
                            return SessionEnd::ConsumerGone;
                        }
                    }
                    Err(err) => warn!(error = %err, "channel: dropping undecodable frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Lost(ChannelError::Closed.to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return SessionEnd::Lost(ChannelError::Receive(err).to_string()),
            },
            request = outbound.recv(), if outbound_open => match request {
                Some(request) => {
                    if let Err(err) = send_request(&mut writer, &request).await {
                        *unsent = Some(request);
                        return SessionEnd::Lost(err.to_string());
                    }
                }
                None => outbound_open = false,
            },
        }
    }
}

async fn send_request<S>(writer: &mut S, request: &ClientRequest) -> Result<(), ChannelError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = match serde_json::to_string(request) {
        Ok(text) => text,
        Err(err) => {
            error!(error = %err, "channel: failed to encode outbound request");
            return Ok(());
        }
    };
    writer.send(Message::Text(text)).await.map_err(ChannelError::Send)
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
