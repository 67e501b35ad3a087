//! Integration tests for the Parley gateway: real sockets, JSON frames,
//! and a room driven end to end.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley::prelude::*;
use parley_protocol::ParticipantStatus;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =========================================================================
// Helpers
// =========================================================================

/// Starts a server on a random port and returns its address and a handle
/// on its coordinator.
async fn start_server() -> (SocketAddr, RoomCoordinator) {
    let server = ParleyServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should bind");
    let addr = server.local_addr().unwrap();
    let coordinator = server.coordinator().clone();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    (addr, coordinator)
}

async fn connect(addr: SocketAddr) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Reads the next JSON frame, failing the test after two seconds.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
            _ => continue,
        }
    }
}

/// Sends a request and waits for its reply, skipping broadcasts.
async fn request(ws: &mut ClientWs, seq: u64, command: Value) -> Value {
    send(ws, json!({"type": "request", "seq": seq, "command": command})).await;
    loop {
        let frame = recv(ws).await;
        if frame["type"] == "reply" && frame["seq"] == seq {
            return frame;
        }
    }
}

/// Waits for the next broadcast on `topic`, skipping everything else.
async fn next_message(ws: &mut ClientWs, topic: &str) -> Value {
    loop {
        let frame = recv(ws).await;
        if frame["type"] == "message" && frame["topic"] == topic {
            return frame["payload"].clone();
        }
    }
}

/// Sends a frame that gets no reply and waits until the server has
/// handled it.
async fn apply(ws: &mut ClientWs, frame: Value) {
    send(ws, frame).await;
    // Frames on one socket are handled in order, so a reply to a later
    // request means this one has been applied.
    request(ws, u64::MAX, json!({"op": "listRooms"})).await;
}

fn debate_room() -> Value {
    json!({
        "op": "createRoom",
        "title": "Cats or dogs",
        "maxParticipants": 6,
        "chatMode": "DEBATE",
        "debateSettings": {
            "positiveEntry": 1,
            "negativeQuestioning": 1,
            "negativeEntry": 1,
            "positiveQuestioning": 1,
            "positiveRebuttal": 1,
            "negativeRebuttal": 1,
        },
    })
}

/// Creates a debate and joins its owner as `alice` on the support side.
/// Returns `(room_id, owner_id, join reply)`.
async fn open_debate(ws: &mut ClientWs) -> (String, String, Value) {
    let created = request(ws, 1, debate_room()).await;
    let room_id = created["ok"]["roomId"].as_str().unwrap().to_owned();
    let owner_id = created["ok"]["ownerId"].as_str().unwrap().to_owned();

    let joined = request(
        ws,
        2,
        json!({
            "op": "join",
            "roomId": room_id,
            "nickname": "alice",
            "role": "support",
            "ownerId": owner_id,
        }),
    )
    .await;
    (room_id, owner_id, joined["ok"].clone())
}

// =========================================================================
// Requests and replies
// =========================================================================

#[tokio::test]
async fn test_create_room_replies_with_ids() {
    let (addr, coordinator) = start_server().await;
    let mut ws = connect(addr).await;

    let reply = request(&mut ws, 1, debate_room()).await;

    assert_eq!(reply["type"], "reply");
    let room_id = reply["ok"]["roomId"].as_str().expect("roomId in reply");
    assert!(reply["ok"]["ownerId"].is_string());
    let room = coordinator.room_info(&RoomId::from(room_id)).unwrap();
    assert_eq!(room.title, "Cats or dogs");
    assert_eq!(room.duration, 6.5);
}

#[tokio::test]
async fn test_unknown_room_replies_not_found() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;

    let reply = request(&mut ws, 9, json!({"op": "roomInfo", "roomId": "missing"})).await;

    assert_eq!(reply["seq"], 9);
    assert_eq!(reply["error"]["kind"], "NotFound");
    assert!(reply.get("ok").is_none());
}

#[tokio::test]
async fn test_join_replies_with_channels_and_nickname() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;

    let (room_id, _, joined) = open_debate(&mut ws).await;

    assert_eq!(joined["roomId"], room_id.as_str());
    assert_eq!(joined["nickname"], "alice");
    assert!(joined["channelId"].is_string());
    assert_ne!(joined["channelId"], joined["subChannelId"]);
}

#[tokio::test]
async fn test_vote_without_progress_subscription_is_not_subscribed() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;
    let (room_id, _, _) = open_debate(&mut ws).await;

    let reply = request(
        &mut ws,
        3,
        json!({"op": "vote", "roomId": room_id, "type": "VOTE", "team": "SUPPORT", "mvp": "alice"}),
    )
    .await;

    assert_eq!(reply["error"]["kind"], "NotSubscribed");
}

#[tokio::test]
async fn test_send_message_needs_chat_subscription() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;
    let (room_id, _, joined) = open_debate(&mut ws).await;
    let channel = joined["channelId"].as_str().unwrap().to_owned();
    let chat = json!({
        "op": "sendMessage",
        "channelId": channel,
        "id": room_id,
        "type": "CHAT",
        "sender": "alice",
        "message": "hello",
    });

    let refused = request(&mut ws, 3, chat.clone()).await;
    assert_eq!(refused["error"]["kind"], "NotSubscribed");

    let topic = format!("chat.{channel}");
    apply(
        &mut ws,
        json!({"type": "subscribe", "topic": topic, "nickname": "alice", "roomId": room_id}),
    )
    .await;
    send(&mut ws, json!({"type": "request", "seq": 4, "command": chat})).await;

    // The broadcast is queued before the reply.
    let broadcast = recv(&mut ws).await;
    assert_eq!(broadcast["type"], "message");
    assert_eq!(broadcast["topic"], topic.as_str());
    assert_eq!(broadcast["payload"]["event"], "chat");
    assert_eq!(broadcast["payload"]["sender"], "alice");

    let sent = recv(&mut ws).await;
    assert_eq!(sent["seq"], 4);
    assert_eq!(sent["ok"]["message"], "hello");
}

// =========================================================================
// Broadcast delivery
// =========================================================================

#[tokio::test]
async fn test_roster_subscriber_sees_new_member() {
    let (addr, _) = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    let (room_id, _, _) = open_debate(&mut alice).await;
    let roster = format!("{room_id}.participants.list");
    apply(&mut alice, json!({"type": "subscribe", "topic": roster})).await;

    let joined = request(
        &mut bob,
        1,
        json!({"op": "join", "roomId": room_id, "nickname": "bob", "role": "opposite"}),
    )
    .await;
    assert!(joined["ok"]["memberId"].is_string());

    let payload = next_message(&mut alice, &roster).await;
    assert_eq!(payload["event"], "roster");
    let nicknames: Vec<&str> = payload["participants"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["nickname"].as_str())
        .collect();
    assert!(nicknames.contains(&"alice"));
    assert!(nicknames.contains(&"bob"));
}

#[tokio::test]
async fn test_unsubscribed_session_gets_no_broadcast() {
    let (addr, _) = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    let (room_id, _, _) = open_debate(&mut alice).await;
    let roster = format!("{room_id}.participants.list");
    apply(&mut alice, json!({"type": "subscribe", "topic": roster})).await;
    apply(&mut alice, json!({"type": "unsubscribe", "topic": roster})).await;

    request(
        &mut bob,
        1,
        json!({"op": "join", "roomId": room_id, "nickname": "bob", "role": "opposite"}),
    )
    .await;

    // The next frame alice sees is the reply to this request, not a roster.
    let frame = {
        send(
            &mut alice,
            json!({"type": "request", "seq": 5, "command": {"op": "participantCounts", "roomId": room_id}}),
        )
        .await;
        recv(&mut alice).await
    };
    assert_eq!(frame["type"], "reply");
    assert_eq!(frame["ok"]["currentParticipants"], 2);
}

#[tokio::test]
async fn test_failed_subscription_is_published_to_error_topic() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;
    apply(&mut ws, json!({"type": "subscribe", "topic": "error"})).await;

    send(
        &mut ws,
        json!({"type": "subscribe", "topic": "progress.missing"}),
    )
    .await;

    let payload = next_message(&mut ws, "error").await;
    assert_eq!(payload["event"], "error");
    assert_eq!(payload["title"], "Subscription failed");
}

#[tokio::test]
async fn test_malformed_frame_gets_error_message() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::text("not json")).await.unwrap();

    let payload = next_message(&mut ws, "error").await;
    assert_eq!(payload["title"], "Invalid frame");
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_closing_socket_marks_participant_disconnected() {
    let (addr, coordinator) = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    let (room_id, _, joined) = open_debate(&mut alice).await;
    let channel = joined["channelId"].as_str().unwrap().to_owned();

    request(
        &mut bob,
        1,
        json!({"op": "join", "roomId": room_id, "nickname": "bob", "role": "opposite"}),
    )
    .await;
    apply(
        &mut bob,
        json!({"type": "subscribe", "topic": format!("chat.{channel}"), "nickname": "bob", "roomId": room_id}),
    )
    .await;

    bob.close(None).await.unwrap();

    let room_id = RoomId::from(room_id.as_str());
    let mut status = None;
    for _ in 0..100 {
        let room = coordinator.room_info(&room_id).unwrap();
        status = room.participant_by_nickname("bob").map(|p| p.status);
        if status == Some(ParticipantStatus::Disconnected) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, Some(ParticipantStatus::Disconnected));
    assert_eq!(
        coordinator.room_info(&room_id).unwrap().participant_by_nickname("alice").map(|p| p.status),
        Some(ParticipantStatus::Owner)
    );
}
