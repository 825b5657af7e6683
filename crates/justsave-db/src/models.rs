//! Database row types. These map directly to SQLite rows and are
//! distinct from justsave-types models to keep the DB layer independent.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use justsave_types::models::{Room, parse_timestamp};

pub struct RoomRow {
    pub room_id: String,
    pub content: String,
    pub last_modified: String,
}

impl RoomRow {
    pub fn into_room(self) -> Result<Room> {
        let last_modified = parse_timestamp(&self.last_modified)
            .ok_or_else(|| anyhow!("Corrupt last_modified '{}' on room '{}'", self.last_modified, self.room_id))?;

        Ok(Room {
            id: self.room_id,
            content: self.content,
            last_modified,
        })
    }
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
