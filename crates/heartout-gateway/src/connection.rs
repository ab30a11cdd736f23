use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use heartout_types::events::{ClientCommand, ServerEvent};

use crate::dispatcher::Dispatcher;

/// Handle a pre-authenticated WebSocket connection.
/// The token was validated at the HTTP upgrade, so we go straight to Ready + event loop.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: i64, username: String) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = ServerEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let conn_id = dispatcher.connect().await;
    run_connection_loop(sender, receiver, &dispatcher, conn_id, &username).await;

    for (story_id, count) in dispatcher.disconnect(conn_id).await {
        dispatcher.broadcast(ServerEvent::ReaderCount { story_id, count });
    }
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    username: &str,
) {
    // Subscribe before reading any command so our own reader_count echo is not missed.
    let mut broadcast_rx = dispatcher.subscribe();
    // Replies meant for this socket only (pong).
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                result = broadcast_rx.recv() => match result {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Broadcast receiver lagged by {} messages", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                direct = direct_rx.recv() => match direct {
                    Some(event) => event,
                    None => break,
                },
            };

            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    let recv_dispatcher = dispatcher.clone();
    let recv_username = username.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_dispatcher, conn_id, &recv_username, cmd, &direct_tx).await,
                    Err(e) => {
                        debug!(
                            "{} sent an unparseable message: {} -- raw: {}",
                            recv_username,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    username: &str,
    cmd: ClientCommand,
    direct_tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    match cmd {
        ClientCommand::JoinStory { story_id } => {
            let count = dispatcher.join_story(conn_id, story_id).await;
            debug!("{} joined story {} ({} readers)", username, story_id, count);
            dispatcher.broadcast(ServerEvent::ReaderCount { story_id, count });
        }

        ClientCommand::LeaveStory { story_id } => {
            if let Some(count) = dispatcher.leave_story(conn_id, story_id).await {
                debug!("{} left story {} ({} readers)", username, story_id, count);
                dispatcher.broadcast(ServerEvent::ReaderCount { story_id, count });
            }
        }

        ClientCommand::Ping => {
            let _ = direct_tx.send(ServerEvent::Pong);
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode {:?}: {}", event, e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
