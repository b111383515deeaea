use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaKind, MessageId, RoomId, UserId};

// -- JWT Claims --

/// JWT claims shared across parlor-api (REST middleware) and the gateway
/// upgrade handler. Canonical definition lives here in parlor-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub username: String,
    pub token: String,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    /// Blank names fall back to a default on the server side.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomRequest {
    pub code: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: MessageId,
}

/// One entry of a room's history. System notices carry no sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: Option<String>,
    pub body: String,
    pub is_system: bool,
    pub media_kind: Option<MediaKind>,
    pub sent_at: DateTime<Utc>,
}

// -- Media --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message_id: MessageId,
    pub kind: MediaKind,
}
