use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shared text blob addressed by a caller-chosen identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of a create-or-get call. `created` is true only for the call
/// that inserted the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomResolution {
    pub room: Room,
    pub created: bool,
}

/// Room ids are opaque and case-sensitive; the only rule is that they are
/// not empty.
pub fn room_id_is_valid(id: &str) -> bool {
    !id.is_empty()
}

/// RFC 3339, or the zone-less `YYYY-MM-DD HH:MM:SS` that older clients and
/// SQLite's `datetime('now')` produce, read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .ok()
}
