//! Realtime socket client.
//!
//! A background task owns the socket. It forwards server events to a channel,
//! sends queued commands, pings on an interval and reconnects with backoff when
//! the connection drops. Stories joined before a drop are joined again on the
//! next connection.

use std::collections::BTreeSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use heartout_types::events::{ClientCommand, ServerEvent};

use crate::{Backoff, ClientError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct RealtimeConfig {
    pub backoff: Backoff,
    pub ping_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::reconnect(),
            ping_interval: Duration::from_secs(30),
        }
    }
}

enum Command {
    Send(ClientCommand),
    Close,
}

/// Handle to the background socket task. Dropping it closes the socket.
pub struct RealtimeClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

enum SessionEnd {
    /// Closed on our side, or nobody is listening for events anymore.
    Finished,
    /// The connection dropped; try again.
    Lost,
}

impl RealtimeClient {
    /// `base_url` is the server root (`ws://host:port`). Returns the handle and the event stream,
    /// which ends once the client is closed or gives up reconnecting.
    pub fn connect(base_url: &str, token: &str) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        Self::connect_with(base_url, token, RealtimeConfig::default())
    }

    pub fn connect_with(
        base_url: &str,
        token: &str,
        config: RealtimeConfig,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        let base = base_url.trim_end_matches('/');
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(ClientError::Url(base_url.to_string()));
        }
        let url = format!("{}/ws?token={}", base, token);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run(url, config, cmd_rx, event_tx));

        Ok((Self { cmd_tx }, event_rx))
    }

    pub fn join_story(&self, story_id: i64) {
        let _ = self.cmd_tx.send(Command::Send(ClientCommand::JoinStory { story_id }));
    }

    pub fn leave_story(&self, story_id: i64) {
        let _ = self.cmd_tx.send(Command::Send(ClientCommand::LeaveStory { story_id }));
    }

    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

async fn run(
    url: String,
    config: RealtimeConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<ServerEvent>,
) {
    let mut joined = BTreeSet::new();
    let mut attempt = 0;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("Realtime connection established");
                attempt = 0;
                match session(socket, &config, &mut cmd_rx, &event_tx, &mut joined).await {
                    SessionEnd::Finished => return,
                    SessionEnd::Lost => warn!("Realtime connection lost"),
                }
            }
            Err(e) => warn!("Realtime connect failed: {}", e),
        }

        if attempt >= config.backoff.max_attempts {
            warn!("Giving up on realtime after {} reconnect attempts", attempt);
            return;
        }
        let delay = config.backoff.delay_for(attempt);
        attempt += 1;
        debug!("Reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }
}

async fn send_command(socket: &mut Socket, cmd: &ClientCommand) -> bool {
    match serde_json::to_string(cmd) {
        Ok(text) => socket.send(Message::text(text)).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode {:?}: {}", cmd, e);
            true
        }
    }
}

async fn session(
    mut socket: Socket,
    config: &RealtimeConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    event_tx: &mpsc::Sender<ServerEvent>,
    joined: &mut BTreeSet<i64>,
) -> SessionEnd {
    for &story_id in joined.iter() {
        if !send_command(&mut socket, &ClientCommand::JoinStory { story_id }).await {
            return SessionEnd::Lost;
        }
    }

    let mut ping = tokio::time::interval(config.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            msg = socket.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            let _ = socket.close(None).await;
                            return SessionEnd::Finished;
                        }
                    }
                    Err(e) => debug!("Ignoring unparseable server message: {}", e),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return SessionEnd::Lost,
                Some(Ok(_)) => {}
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(cmd)) => {
                    match &cmd {
                        ClientCommand::JoinStory { story_id } => {
                            joined.insert(*story_id);
                        }
                        ClientCommand::LeaveStory { story_id } => {
                            joined.remove(story_id);
                        }
                        ClientCommand::Ping => {}
                    }
                    if !send_command(&mut socket, &cmd).await {
                        return SessionEnd::Lost;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = socket.close(None).await;
                    return SessionEnd::Finished;
                }
            },

            _ = ping.tick() => {
                if !send_command(&mut socket, &ClientCommand::Ping).await {
                    return SessionEnd::Lost;
                }
            }
        }
    }
}
