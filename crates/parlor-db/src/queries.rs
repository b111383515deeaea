use crate::Database;
use crate::models::{MediaRow, MessageRow, RoomRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, params};

use parlor_types::models::{MessageId, RoomId, UserId};

/// Outcome of a user insert. `UsernameTaken` surfaces the UNIQUE violation
/// so the caller can answer with a conflict instead of a storage error.
pub enum UserInsert {
    Created(UserId),
    UsernameTaken,
}

/// Outcome of a room insert. `CodeTaken` means the generated join code
/// collided with an existing room and the caller should redraw.
pub enum RoomInsert {
    Created(RoomId),
    CodeTaken,
}

/// Outcome of a membership insert.
pub enum MembershipInsert {
    Joined,
    AlreadyMember,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserInsert> {
        self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)",
                (username, password_hash),
            ) {
                Ok(_) => Ok(UserInsert::Created(conn.last_insert_rowid())),
                Err(e) if is_unique_violation(&e) => Ok(UserInsert::UsernameTaken),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Rooms --

    /// Insert a room together with the creator's membership and the opening
    /// system notice, in one transaction.
    pub fn create_room(
        &self,
        code: &str,
        name: &str,
        creator_id: UserId,
        notice: &str,
        now: &str,
    ) -> Result<RoomInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            match tx.execute(
                "INSERT INTO rooms (code, name, creator_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![code, name, creator_id, now],
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(RoomInsert::CodeTaken),
                Err(e) => return Err(e.into()),
            }
            let room_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO memberships (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![room_id, creator_id, now],
            )?;
            tx.execute(
                "INSERT INTO messages (room_id, sender_id, body, is_system, sent_at) VALUES (?1, NULL, ?2, 1, ?3)",
                params![room_id, notice, now],
            )?;

            tx.commit()?;
            Ok(RoomInsert::Created(room_id))
        })
    }

    pub fn get_room_by_code(&self, code: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            query_room(conn, "SELECT id, code, name, creator_id, created_at FROM rooms WHERE code = ?1", params![code])
        })
    }

    pub fn get_room_by_id(&self, id: RoomId) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            query_room(conn, "SELECT id, code, name, creator_id, created_at FROM rooms WHERE id = ?1", params![id])
        })
    }

    /// Rooms the user belongs to, ordered for display.
    pub fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.code, r.name, r.creator_id, r.created_at
                 FROM rooms r
                 JOIN memberships ms ON ms.room_id = r.id
                 WHERE ms.user_id = ?1
                 ORDER BY r.name, r.code",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(RoomRow {
                        id: row.get(0)?,
                        code: row.get(1)?,
                        name: row.get(2)?,
                        creator_id: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Room ids only, for computing a fresh connection's subscriptions.
    pub fn room_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoomId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT room_id FROM memberships WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Cascades over memberships, messages and media blobs.
    pub fn delete_room(&self, room_id: RoomId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM rooms WHERE id = ?1", [room_id])?;
            Ok(deleted > 0)
        })
    }

    // -- Memberships --

    pub fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT 1 FROM memberships WHERE room_id = ?1 AND user_id = ?2")?;
            Ok(stmt.exists(params![room_id, user_id])?)
        })
    }

    /// Insert the membership and the join notice in one transaction.
    pub fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        notice: &str,
        now: &str,
    ) -> Result<MembershipInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            match tx.execute(
                "INSERT INTO memberships (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![room_id, user_id, now],
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(MembershipInsert::AlreadyMember),
                Err(e) => return Err(e.into()),
            }
            tx.execute(
                "INSERT INTO messages (room_id, sender_id, body, is_system, sent_at) VALUES (?1, NULL, ?2, 1, ?3)",
                params![room_id, notice, now],
            )?;

            tx.commit()?;
            Ok(MembershipInsert::Joined)
        })
    }

    /// Delete the membership and insert the leave notice. Returns false
    /// without writing anything when the user was not a member.
    pub fn leave_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        notice: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM memberships WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
            )?;
            if removed == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO messages (room_id, sender_id, body, is_system, sent_at) VALUES (?1, NULL, ?2, 1, ?3)",
                params![room_id, notice, now],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    // -- Messages --

    pub fn insert_text_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        body: &str,
        now: &str,
    ) -> Result<MessageId> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (room_id, sender_id, body, is_system, sent_at) VALUES (?1, ?2, ?3, 0, ?4)",
                params![room_id, sender_id, body, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest first. Callers wanting chronological order reverse the result.
    pub fn recent_messages(&self, room_id: RoomId, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_recent_messages(conn, room_id, limit))
    }

    // -- Media --

    /// Insert the media message row and its blob in one transaction.
    pub fn insert_media_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        filename: &str,
        kind: &str,
        data: &[u8],
        now: &str,
    ) -> Result<MessageId> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (room_id, sender_id, body, is_system, media_kind, sent_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)",
                params![room_id, sender_id, filename, kind, now],
            )?;
            let message_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO media_blobs (message_id, data) VALUES (?1, ?2)",
                params![message_id, data],
            )?;

            tx.commit()?;
            Ok(message_id)
        })
    }

    pub fn get_media(&self, message_id: MessageId) -> Result<Option<MediaRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.room_id, m.body, m.media_kind, b.data
                 FROM media_blobs b
                 JOIN messages m ON m.id = b.message_id
                 WHERE b.message_id = ?1",
            )?;

            let row = stmt
                .query_row([message_id], |row| {
                    Ok(MediaRow {
                        room_id: row.get(0)?,
                        filename: row.get(1)?,
                        media_kind: row.get(2)?,
                        data: row.get(3)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_room(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<RoomRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row(params, |row| {
            Ok(RoomRow {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
                creator_id: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_recent_messages(conn: &Connection, room_id: RoomId, limit: u32) -> Result<Vec<MessageRow>> {
    // JOIN users to resolve sender names in a single query (eliminates N+1)
    let mut stmt = conn.prepare(
        "SELECT m.id, m.room_id, u.username, m.body, m.is_system, m.media_kind, m.sent_at
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.room_id = ?1
         ORDER BY m.id DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![room_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                room_id: row.get(1)?,
                sender: row.get(2)?,
                body: row.get(3)?,
                is_system: row.get(4)?,
                media_kind: row.get(5)?,
                sent_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// UNIQUE or PRIMARY KEY violation, as opposed to other constraint failures.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
