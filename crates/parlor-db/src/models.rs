/// Database row types, mapping directly to SQLite rows.
/// Distinct from parlor-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct RoomRow {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub creator_id: i64,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub sender: Option<String>,
    pub body: String,
    pub is_system: bool,
    pub media_kind: Option<String>,
    pub sent_at: String,
}

pub struct MediaRow {
    pub room_id: i64,
    pub filename: String,
    pub media_kind: Option<String>,
    pub data: Vec<u8>,
}
