//! Per-connection handler: subscriptions and request routing.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. WebSocket handshake → assign a `SessionId`, open its outbox
//!   2. Spawn the writer task that drains the outbox onto the socket
//!   3. Loop: decode client frames → subscribe, unsubscribe or dispatch
//!   4. Socket close → the session guard reports the drop to the rooms

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures_util::{SinkExt, StreamExt};
use parley_protocol::{Broadcast, Codec, Command, ProtocolError, SessionId, Topic};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

use crate::ParleyError;
use crate::frames::{ClientFrame, ServerFrame};
use crate::server::ServerState;

/// Drop guard that tears the session down when the handler exits.
///
/// Runs even if the handler panics. `Drop` is synchronous, so the room
/// side of the cleanup goes to a spawned task.
struct SessionGuard {
    session: SessionId,
    state: Arc<ServerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let session = self.session;
        self.state.relay.close(session);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.coordinator.on_session_closed(session).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), ParleyError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let session = SessionId(state.next_session.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%session, %addr, "accepted WebSocket connection");

    let (mut sink, mut source) = ws.split();
    let mut outbox = state.relay.open(session);
    let _guard = SessionGuard {
        session,
        state: Arc::clone(&state),
    };

    let codec = state.codec;
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            let bytes = match codec.encode(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(%session, error = %e, "failed to encode frame");
                    continue;
                }
            };
            let message = match String::from_utf8(bytes) {
                Ok(text) => Message::text(text),
                Err(e) => Message::Binary(e.into_bytes().into()),
            };
            if let Err(e) = sink.send(message).await {
                tracing::debug!(%session, error = %e, "send failed");
                break;
            }
        }
    });

    loop {
        let data = match source.next().await {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(data))) => data.to_vec(),
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!(%session, "connection closed cleanly");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(%session, error = %e, "recv error");
                break;
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%session, error = %e, "failed to decode frame");
                state.relay.send(
                    session,
                    ServerFrame::Message {
                        topic: Topic::Error,
                        payload: Broadcast::error("Invalid frame", e.to_string()),
                    },
                );
                continue;
            }
        };
        handle_frame(&state, session, frame).await;
    }

    writer.abort();
    // _guard drops here → session cleanup fires.
    Ok(())
}

async fn handle_frame(state: &ServerState, session: SessionId, frame: ClientFrame) {
    match frame {
        ClientFrame::Subscribe {
            topic,
            nickname,
            room_id,
        } => {
            // A rejected subscription is already published on the error topic.
            if let Err(e) = state
                .coordinator
                .on_subscribe(session, topic, nickname.as_deref(), room_id.as_ref())
                .await
            {
                tracing::debug!(%session, error = %e, "subscription rejected");
            }
        }
        ClientFrame::Unsubscribe { topic } => {
            state.coordinator.on_unsubscribe(session, &topic);
        }
        ClientFrame::Request { seq, command } => {
            let op = command.name();
            let result = dispatch(state, session, command).await;
            if let Err(e) = &result {
                tracing::debug!(%session, op, kind = e.kind(), error = %e, "request rejected");
            }
            state.relay.send(session, ServerFrame::reply(seq, result));
        }
    }
}

/// Routes one command to the coordinator.
///
/// Commands that act on a live channel need the session subscribed to
/// that channel first: `sendMessage` to the chat channel, `ready` to the
/// roster and `vote` to the progress topic.
async fn dispatch(
    state: &ServerState,
    session: SessionId,
    command: Command,
) -> Result<Value, ParleyError> {
    let coordinator = &state.coordinator;
    let registry = coordinator.registry();

    match command {
        Command::CreateRoom(request) => to_reply(coordinator.create_room(request).await?),
        Command::Join { room_id, request } => {
            to_reply(coordinator.join(&room_id, request).await?)
        }
        Command::TeamChange {
            room_id,
            member_id,
            request,
        } => to_reply(coordinator.change_team(&room_id, &member_id, request).await?),
        Command::Ready { room_id, request } => {
            registry.require_bound(session, &Topic::Roster(room_id.clone()))?;
            to_reply(coordinator.ready(&room_id, request).await?)
        }
        Command::Vote { room_id, request } => {
            registry.require_bound(session, &Topic::Progress(room_id.clone()))?;
            coordinator.vote(&room_id, request).await?;
            Ok(Value::Null)
        }
        Command::SendMessage {
            channel_id,
            request,
        } => {
            registry.require_bound(session, &Topic::Chat(channel_id.clone()))?;
            to_reply(coordinator.send_message(&channel_id, request).await?)
        }
        Command::Start { room_id, request } => {
            coordinator.start(&room_id, session, request).await?;
            Ok(Value::Null)
        }
        Command::SubscriptionFailed { room_id, request } => {
            coordinator.subscription_failed(&room_id, request).await?;
            Ok(Value::Null)
        }
        Command::ModifyDescription { room_id, request } => {
            coordinator.modify_description(&room_id, request).await?;
            Ok(Value::Null)
        }
        Command::ChangeSettings { room_id, request } => {
            coordinator.change_settings(&room_id, request).await?;
            Ok(Value::Null)
        }
        Command::RoomInfo { room_id } => to_reply(coordinator.room_info(&room_id)?),
        Command::ParticipantCounts { room_id } => {
            to_reply(coordinator.participant_counts(&room_id)?)
        }
        Command::RoomHome { room_id } => to_reply(coordinator.room_home(&room_id)?),
        Command::ListRooms(filter) => to_reply(coordinator.list_rooms(&filter)?),
        Command::PreviousMessages { channel_id } => {
            to_reply(coordinator.previous_messages(&channel_id)?)
        }
    }
}

fn to_reply<T: Serialize>(value: T) -> Result<Value, ParleyError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Encode(e).into())
}
