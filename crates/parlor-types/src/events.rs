use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaKind, MessageId, RoomId};

/// Events pushed to clients over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A system notice was posted to a room (a member joined or left)
    RoomNotice {
        room_id: RoomId,
        body: String,
        timestamp: DateTime<Utc>,
    },

    /// A member posted a text message
    Message {
        room_id: RoomId,
        body: String,
        sender: String,
        timestamp: DateTime<Utc>,
    },

    /// A member posted a media attachment, fetchable by message id
    MediaMessage {
        room_id: RoomId,
        id_message: MessageId,
        kind: MediaKind,
        sender: String,
        timestamp: DateTime<Utc>,
    },

    /// The room was deleted by its creator
    RoomDeleted { room_id: RoomId },

    /// The client should re-sync its room list
    Refresh { reason: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Post a text message to a room the sender belongs to
    SendMessage { room_id: RoomId, body: String },
}
