use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row ids assigned by the storage layer. SQLite rowids grow monotonically
/// per table, which lets message ids double as the room ordering key.
pub type UserId = i64;
pub type RoomId = i64;
pub type MessageId = i64;

// -- Rooms --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub name: String,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
}

// -- Media --

/// Attachment classification derived from the uploaded filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl MediaKind {
    /// Classify a filename by its extension. Returns `None` for anything
    /// outside the accepted set.
    pub fn for_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Audio),
            "mp4" => Some(Self::Video),
            "jpg" | "png" => Some(Self::Image),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
        }
    }

    /// Inverse of [`as_str`], for reading the stored tag back out of a row.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(MediaKind::for_filename("song.mp3"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::for_filename("clip.MP4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::for_filename("photo.jpg"), Some(MediaKind::Image));
        assert_eq!(MediaKind::for_filename("shot.PNG"), Some(MediaKind::Image));
    }

    #[test]
    fn rejects_unknown_or_missing_extensions() {
        assert_eq!(MediaKind::for_filename("archive.zip"), None);
        assert_eq!(MediaKind::for_filename("noextension"), None);
        assert_eq!(MediaKind::for_filename("script.mp3.exe"), None);
    }

    #[test]
    fn tag_roundtrip() {
        for kind in [MediaKind::Audio, MediaKind::Video, MediaKind::Image] {
            assert_eq!(MediaKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(MediaKind::from_tag("document"), None);
    }
}
