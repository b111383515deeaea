use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use parlor_db::Database;
use parlor_db::models::{MessageRow, RoomRow};
use parlor_db::queries::{MembershipInsert, RoomInsert};
use parlor_types::api::MessageRecord;
use parlor_types::events::GatewayEvent;
use parlor_types::models::{MediaKind, MessageId, Room, RoomId, UserId};

use crate::codes;
use crate::dispatcher::{Channel, Dispatcher};
use crate::error::ChatError;

/// Default history window, matching what clients render on room open.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Hard cap on a single history request.
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Media uploads are capped at 20 MiB.
pub const MAX_MEDIA_BYTES: usize = 20 * 1024 * 1024;

const DEFAULT_ROOM_NAME: &str = "Untitled room";

/// Caller identity for coordinator operations, built after token
/// verification. `Anonymous` callers fail every operation.
#[derive(Debug, Clone)]
pub enum AuthContext {
    User { user_id: UserId, username: String },
    Anonymous,
}

impl AuthContext {
    pub fn user(user_id: UserId, username: impl Into<String>) -> Self {
        Self::User {
            user_id,
            username: username.into(),
        }
    }

    fn require(&self) -> Result<(UserId, &str), ChatError> {
        match self {
            Self::User { user_id, username } => Ok((*user_id, username)),
            Self::Anonymous => Err(ChatError::Unauthenticated),
        }
    }
}

/// A media blob ready to serve, with its MIME type resolved from the stored
/// kind and filename.
#[derive(Debug)]
pub struct MediaDownload {
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Orchestrates every room operation: validates, writes through the
/// database, then fans events out. Events go out only after the row is
/// committed, and a per-room lock keeps fan-out order identical to commit
/// order.
pub struct Coordinator {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    room_locks: Mutex<HashMap<RoomId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self {
            db,
            dispatcher,
            room_locks: Mutex::new(HashMap::new()),
        }
    }

    // -- Rooms --

    pub async fn create_room(&self, ctx: &AuthContext, name: &str) -> Result<Room, ChatError> {
        let (user_id, username) = ctx.require()?;

        let name = name.trim();
        let name = if name.is_empty() { DEFAULT_ROOM_NAME } else { name }.to_string();
        let username = username.to_string();

        let now = Utc::now();
        let notice = format!("{username} joined the room.");

        // Redraw on the off chance the generated code is already taken.
        loop {
            let code = codes::generate();
            let outcome = self
                .run_db({
                    let (code, name, notice) = (code.clone(), name.clone(), notice.clone());
                    let now = now.to_rfc3339();
                    move |db| db.create_room(&code, &name, user_id, &notice, &now)
                })
                .await?;

            match outcome {
                RoomInsert::Created(room_id) => {
                    self.dispatcher.subscribe_user(user_id, Channel::Room(room_id));
                    self.dispatcher.broadcast(
                        Channel::Room(room_id),
                        &GatewayEvent::RoomNotice {
                            room_id,
                            body: notice,
                            timestamp: now,
                        },
                    );
                    debug!("{} created room {} with code {}", username, room_id, code);
                    return Ok(Room {
                        id: room_id,
                        code,
                        name,
                        creator_id: user_id,
                        created_at: now,
                    });
                }
                RoomInsert::CodeTaken => {
                    debug!("room code {} already taken, redrawing", code);
                }
            }
        }
    }

    pub async fn join_room(&self, ctx: &AuthContext, code: &str) -> Result<Room, ChatError> {
        let (user_id, username) = ctx.require()?;

        let code = code.trim().to_string();
        if !codes::is_valid(&code) {
            return Err(ChatError::Validation("join code must be exactly six digits".into()));
        }

        let row = self
            .run_db({
                let code = code.clone();
                move |db| db.get_room_by_code(&code)
            })
            .await?
            .ok_or(ChatError::NotFound("room"))?;
        let room = room_from_row(row);

        let now = Utc::now();
        let notice = format!("{username} joined the room.");

        let _guard = self.lock_room(room.id).await;

        let outcome = self
            .run_db({
                let notice = notice.clone();
                let now = now.to_rfc3339();
                let room_id = room.id;
                move |db| db.join_room(room_id, user_id, &notice, &now)
            })
            .await?;
        if let MembershipInsert::AlreadyMember = outcome {
            return Err(ChatError::Conflict("already a member of this room"));
        }

        // Subscribe before broadcasting so the joiner sees the notice too.
        self.dispatcher.subscribe_user(user_id, Channel::Room(room.id));
        self.dispatcher.broadcast(
            Channel::Room(room.id),
            &GatewayEvent::RoomNotice {
                room_id: room.id,
                body: notice,
                timestamp: now,
            },
        );
        self.dispatcher.broadcast(
            Channel::User(user_id),
            &GatewayEvent::Refresh {
                reason: "joined_room".into(),
            },
        );

        debug!("{} joined room {}", username, room.id);
        Ok(room)
    }

    pub async fn leave_room(&self, ctx: &AuthContext, room_id: RoomId) -> Result<(), ChatError> {
        let (user_id, username) = ctx.require()?;

        let now = Utc::now();
        let notice = format!("{username} left the room.");

        let _guard = self.lock_room(room_id).await;

        let left = self
            .run_db({
                let notice = notice.clone();
                let now = now.to_rfc3339();
                move |db| db.leave_room(room_id, user_id, &notice, &now)
            })
            .await?;
        if !left {
            return Err(ChatError::Forbidden("not a member of this room"));
        }

        // Unsubscribe first so the notice only reaches remaining members.
        self.dispatcher.unsubscribe_user(user_id, Channel::Room(room_id));
        self.dispatcher.broadcast(
            Channel::Room(room_id),
            &GatewayEvent::RoomNotice {
                room_id,
                body: notice,
                timestamp: now,
            },
        );

        debug!("{} left room {}", username, room_id);
        Ok(())
    }

    pub async fn delete_room(&self, ctx: &AuthContext, room_id: RoomId) -> Result<(), ChatError> {
        let (user_id, username) = ctx.require()?;

        let row = self
            .run_db(move |db| db.get_room_by_id(room_id))
            .await?
            .ok_or(ChatError::NotFound("room"))?;
        if row.creator_id != user_id {
            return Err(ChatError::Forbidden("only the creator can delete a room"));
        }

        let _guard = self.lock_room(room_id).await;

        let deleted = self.run_db(move |db| db.delete_room(room_id)).await?;
        if !deleted {
            return Err(ChatError::NotFound("room"));
        }

        // Notify whoever is still subscribed, then retire the channel.
        self.dispatcher
            .broadcast(Channel::Room(room_id), &GatewayEvent::RoomDeleted { room_id });
        self.dispatcher.drop_channel(Channel::Room(room_id));

        self.room_locks
            .lock()
            .expect("room lock table poisoned")
            .remove(&room_id);

        debug!("{} deleted room {}", username, room_id);
        Ok(())
    }

    pub async fn list_rooms(&self, ctx: &AuthContext) -> Result<Vec<Room>, ChatError> {
        let (user_id, _) = ctx.require()?;
        let rows = self.run_db(move |db| db.rooms_for_user(user_id)).await?;
        Ok(rows.into_iter().map(room_from_row).collect())
    }

    /// Room channels a fresh gateway connection subscribes to, read from the
    /// membership table at connect time.
    pub async fn connect_subscriptions(&self, user_id: UserId) -> Result<Vec<RoomId>, ChatError> {
        self.run_db(move |db| db.room_ids_for_user(user_id)).await
    }

    // -- Messages --

    pub async fn send_message(
        &self,
        ctx: &AuthContext,
        room_id: RoomId,
        body: &str,
    ) -> Result<MessageId, ChatError> {
        let (user_id, username) = ctx.require()?;

        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(ChatError::Validation("message body must not be empty".into()));
        }

        let now = Utc::now();
        let _guard = self.lock_room(room_id).await;

        if !self.run_db(move |db| db.is_member(room_id, user_id)).await? {
            return Err(ChatError::Forbidden("not a member of this room"));
        }

        let message_id = self
            .run_db({
                let body = body.clone();
                let now = now.to_rfc3339();
                move |db| db.insert_text_message(room_id, user_id, &body, &now)
            })
            .await?;

        self.dispatcher.broadcast(
            Channel::Room(room_id),
            &GatewayEvent::Message {
                room_id,
                body,
                sender: username.to_string(),
                timestamp: now,
            },
        );

        Ok(message_id)
    }

    pub async fn fetch_history(
        &self,
        ctx: &AuthContext,
        room_id: RoomId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let (user_id, _) = ctx.require()?;

        if self.run_db(move |db| db.get_room_by_id(room_id)).await?.is_none() {
            return Err(ChatError::NotFound("room"));
        }
        if !self.run_db(move |db| db.is_member(room_id, user_id)).await? {
            return Err(ChatError::Forbidden("not a member of this room"));
        }

        let limit = limit.min(MAX_HISTORY_LIMIT);
        let mut rows = self.run_db(move |db| db.recent_messages(room_id, limit)).await?;
        // Stored newest first; history reads oldest first.
        rows.reverse();

        Ok(rows.into_iter().map(record_from_row).collect())
    }

    // -- Media --

    pub async fn upload_media(
        &self,
        ctx: &AuthContext,
        room_id: RoomId,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<(MessageId, MediaKind), ChatError> {
        let (user_id, username) = ctx.require()?;

        if data.is_empty() {
            return Err(ChatError::Validation("empty upload".into()));
        }
        if data.len() > MAX_MEDIA_BYTES {
            return Err(ChatError::Validation("file exceeds the 20 MiB limit".into()));
        }
        let kind = MediaKind::for_filename(filename)
            .ok_or_else(|| ChatError::Validation("unsupported file type".into()))?;

        let now = Utc::now();
        let _guard = self.lock_room(room_id).await;

        if !self.run_db(move |db| db.is_member(room_id, user_id)).await? {
            return Err(ChatError::Forbidden("not a member of this room"));
        }

        let message_id = self
            .run_db({
                let filename = filename.to_string();
                let now = now.to_rfc3339();
                move |db| {
                    db.insert_media_message(room_id, user_id, &filename, kind.as_str(), &data, &now)
                }
            })
            .await?;

        self.dispatcher.broadcast(
            Channel::Room(room_id),
            &GatewayEvent::MediaMessage {
                room_id,
                id_message: message_id,
                kind,
                sender: username.to_string(),
                timestamp: now,
            },
        );

        Ok((message_id, kind))
    }

    pub async fn fetch_media(
        &self,
        ctx: &AuthContext,
        message_id: MessageId,
    ) -> Result<MediaDownload, ChatError> {
        let (user_id, _) = ctx.require()?;

        let media = self
            .run_db(move |db| db.get_media(message_id))
            .await?
            .ok_or(ChatError::NotFound("media"))?;

        let room_id = media.room_id;
        if !self.run_db(move |db| db.is_member(room_id, user_id)).await? {
            return Err(ChatError::Forbidden("not a member of this room"));
        }

        let kind = media.media_kind.as_deref().and_then(MediaKind::from_tag);
        let content_type = content_type_for(kind, &media.filename);

        Ok(MediaDownload {
            filename: media.filename,
            content_type,
            data: media.data,
        })
    }

    // -- Internals --

    /// Run blocking DB work off the async runtime.
    async fn run_db<T, F>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ChatError::Storage(anyhow::anyhow!("blocking task join: {}", e)))?
            .map_err(ChatError::Storage)
    }

    /// Per-room write lock, created lazily on first use.
    async fn lock_room(&self, room_id: RoomId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .room_locks
            .lock()
            .expect("room lock table poisoned")
            .entry(room_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

fn room_from_row(row: RoomRow) -> Room {
    Room {
        id: row.id,
        code: row.code,
        name: row.name,
        creator_id: row.creator_id,
        created_at: parse_ts(&row.created_at),
    }
}

fn record_from_row(row: MessageRow) -> MessageRecord {
    let sent_at = parse_ts(&row.sent_at);
    MessageRecord {
        id: row.id,
        room_id: row.room_id,
        sender: row.sender,
        body: row.body,
        is_system: row.is_system,
        media_kind: row.media_kind.as_deref().and_then(MediaKind::from_tag),
        sent_at,
    }
}

/// Rows written by this server carry RFC 3339; SQLite's datetime('now')
/// default writes "YYYY-MM-DD HH:MM:SS". Accept both.
fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

fn content_type_for(kind: Option<MediaKind>, filename: &str) -> &'static str {
    match kind {
        Some(MediaKind::Audio) => "audio/mpeg",
        Some(MediaKind::Video) => "video/mp4",
        Some(MediaKind::Image) => {
            let lower = filename.to_ascii_lowercase();
            if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
                "image/jpeg"
            } else {
                "image/png"
            }
        }
        None => "application/octet-stream",
    }
}
