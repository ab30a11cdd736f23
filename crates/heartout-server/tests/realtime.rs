use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use heartout_api::{AppStateInner, JwtSettings};
use heartout_db::MemStorage;
use heartout_gateway::Dispatcher;
use heartout_types::events::ServerEvent;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> SocketAddr {
    let state = Arc::new(AppStateInner::new(
        Arc::new(MemStorage::new()),
        Dispatcher::new(),
        JwtSettings::new("realtime-test-secret"),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, heartout_server::app(state)).await.unwrap() });
    addr
}

/// Registers a user over REST, returning (access token, user id).
async fn register(http: &reqwest::Client, addr: SocketAddr, username: &str) -> (String, i64) {
    let body: Value = http
        .post(format!("http://{}/api/auth/register", addr))
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "Sunrise#2024",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

async fn next_event(ws: &mut Socket) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Waits for the first event matching `pred`, skipping the rest.
async fn wait_for(ws: &mut Socket, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        let event = next_event(ws).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn send(ws: &mut Socket, command: Value) {
    ws.send(Message::text(command.to_string())).await.unwrap();
}

/// Opens a socket and waits until it is subscribed to broadcasts (a pong proves it).
async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut ws).await, ServerEvent::Ready { .. }));
    send(&mut ws, json!({ "type": "ping" })).await;
    wait_for(&mut ws, |e| *e == ServerEvent::Pong).await;
    ws
}

#[tokio::test]
async fn upgrade_without_valid_token_is_refused() {
    let addr = spawn_server().await;

    for url in [format!("ws://{}/ws", addr), format!("ws://{}/ws?token=garbage", addr)] {
        match tokio_tungstenite::connect_async(url).await {
            Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
            other => panic!("expected 401, got {:?}", other.map(|(_, resp)| resp.status())),
        }
    }
}

#[tokio::test]
async fn ready_greets_with_identity() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();
    let (token, user_id) = register(&http, addr, "maya").await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut ws).await,
        ServerEvent::Ready {
            user_id,
            username: "maya".into()
        }
    );
}

#[tokio::test]
async fn reader_count_follows_joins_and_leaves() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();
    let (maya, _) = register(&http, addr, "maya").await;
    let (leo, _) = register(&http, addr, "leo").await;

    let mut a = connect(addr, &maya).await;
    let mut b = connect(addr, &leo).await;

    send(&mut a, json!({ "type": "join_story", "story_id": 42 })).await;
    wait_for(&mut a, |e| *e == ServerEvent::ReaderCount { story_id: 42, count: 1 }).await;

    // Joining twice from one socket does not double count.
    send(&mut a, json!({ "type": "join_story", "story_id": 42 })).await;
    send(&mut b, json!({ "type": "join_story", "story_id": 42 })).await;
    let event = wait_for(&mut a, |e| matches!(e, ServerEvent::ReaderCount { story_id: 42, count } if *count >= 2)).await;
    assert_eq!(event, ServerEvent::ReaderCount { story_id: 42, count: 2 });

    send(&mut b, json!({ "type": "leave_story", "story_id": 42 })).await;
    wait_for(&mut a, |e| *e == ServerEvent::ReaderCount { story_id: 42, count: 1 }).await;

    send(&mut b, json!({ "type": "join_story", "story_id": 42 })).await;
    wait_for(&mut a, |e| *e == ServerEvent::ReaderCount { story_id: 42, count: 2 }).await;
    drop(b);
    wait_for(&mut a, |e| *e == ServerEvent::ReaderCount { story_id: 42, count: 1 }).await;
}

#[tokio::test]
async fn garbage_commands_are_ignored() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();
    let (token, _) = register(&http, addr, "maya").await;
    let mut ws = connect(addr, &token).await;

    ws.send(Message::text("{not json".to_string())).await.unwrap();
    send(&mut ws, json!({ "type": "dance" })).await;
    send(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(wait_for(&mut ws, |e| *e == ServerEvent::Pong).await, ServerEvent::Pong);
}

#[tokio::test]
async fn reactions_and_comments_reach_the_author() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();
    let (maya, maya_id) = register(&http, addr, "maya").await;
    let (leo, _) = register(&http, addr, "leo").await;

    let story: Value = http
        .post(format!("http://{}/api/stories", addr))
        .bearer_auth(&maya)
        .json(&json!({
            "title": "The lighthouse keeper's last winter",
            "content": "Every night for forty years he climbed the stairs, and every night he counted them aloud.",
            "story_type": "life_story",
            "is_anonymous": false,
            "status": "published",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let story_id = story["story"]["id"].as_i64().unwrap();

    let mut ws = connect(addr, &maya).await;

    let resp = http
        .post(format!("http://{}/api/stories/{}/toggle-react", addr, story_id))
        .bearer_auth(&leo)
        .json(&json!({ "reaction_type": "hug" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    match wait_for(&mut ws, |e| matches!(e, ServerEvent::Reaction { .. })).await {
        ServerEvent::Reaction {
            story_id: sid,
            story_author_id,
            story_title,
            from_user,
            ..
        } => {
            assert_eq!(sid, story_id);
            assert_eq!(story_author_id, maya_id);
            assert_eq!(from_user, "leo");
            assert_eq!(story_title, "The lighthouse keeper's last winter");
        }
        other => panic!("unexpected {:?}", other),
    }

    let long_comment = "a".repeat(150);
    let resp = http
        .post(format!("http://{}/api/stories/{}/comments", addr, story_id))
        .bearer_auth(&leo)
        .json(&json!({ "content": long_comment, "is_anonymous": false }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    match wait_for(&mut ws, |e| matches!(e, ServerEvent::Comment { .. })).await {
        ServerEvent::Comment {
            story_author_id,
            comment_preview,
            ..
        } => {
            assert_eq!(story_author_id, maya_id);
            assert_eq!(comment_preview, format!("{}...", "a".repeat(100)));
        }
        other => panic!("unexpected {:?}", other),
    }
}
