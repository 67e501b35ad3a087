//! Frames exchanged over a gateway socket.
//!
//! Both directions are JSON objects tagged by `type`:
//!
//! ```text
//! client → server   subscribe { topic, nickname?, roomId? }
//!                   unsubscribe { topic }
//!                   request { seq, command }
//! server → client   message { topic, payload }
//!                   reply { seq, ok } | reply { seq, error: { kind, message } }
//! ```

use parley_protocol::{Broadcast, Command, RoomId, Topic};
use serde::{Deserialize, Serialize};

use crate::ParleyError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Subscribe {
        topic: Topic,
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    Unsubscribe {
        topic: Topic,
    },
    Request {
        seq: u64,
        command: Command,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// A broadcast delivered because the session is bound to `topic`.
    Message { topic: Topic, payload: Broadcast },

    /// The answer to one `request` frame, matched by `seq`.
    Reply {
        seq: u64,
        #[serde(flatten)]
        outcome: Outcome,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Ok(serde_json::Value),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl ServerFrame {
    pub fn reply(seq: u64, result: Result<serde_json::Value, ParleyError>) -> Self {
        let outcome = match result {
            Ok(value) => Outcome::Ok(value),
            Err(err) => Outcome::Error(ErrorBody {
                kind: err.kind().to_owned(),
                message: err.to_string(),
            }),
        };
        ServerFrame::Reply { seq, outcome }
    }
}
