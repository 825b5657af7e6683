use anyhow::{Result, ensure};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};

use justsave_types::models::{RoomResolution, room_id_is_valid};

use crate::Database;
use crate::models::{RoomRow, format_timestamp};

impl Database {
    /// Insert the room with empty content unless it already exists, then
    /// return the stored record. Both steps run under the connection lock,
    /// so concurrent callers for one id see exactly one insert.
    pub fn create_or_get_room(&self, room_id: &str, now: DateTime<Utc>) -> Result<RoomResolution> {
        ensure!(room_id_is_valid(room_id), "room id must not be empty");

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO rooms (room_id, content, last_modified) VALUES (?1, '', ?2)",
                (room_id, format_timestamp(now)),
            )?;

            let row = query_room(conn, room_id)?
                .ok_or_else(|| anyhow::anyhow!("Room vanished after insert: {}", room_id))?;

            debug!("create_or_get {} (created: {})", room_id, inserted == 1);
            Ok(RoomResolution {
                room: row.into_room()?,
                created: inserted == 1,
            })
        })
    }

    pub fn get_room(&self, room_id: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, room_id))
    }

    /// Overwrite content and timestamp of an existing room. A missing room
    /// is left missing; the return value tells whether a row was touched.
    pub fn update_room(&self, room_id: &str, content: &str, last_modified: DateTime<Utc>) -> Result<bool> {
        ensure!(room_id_is_valid(room_id), "room id must not be empty");

        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE rooms SET content = ?2, last_modified = ?3 WHERE room_id = ?1",
                (room_id, content, format_timestamp(last_modified)),
            )?;

            if changed == 0 {
                warn!("Update for unknown room {} ignored", room_id);
            }
            Ok(changed > 0)
        })
    }
}

fn query_room(conn: &Connection, room_id: &str) -> Result<Option<RoomRow>> {
    let mut stmt =
        conn.prepare("SELECT room_id, content, last_modified FROM rooms WHERE room_id = ?1")?;

    let row = stmt
        .query_row([room_id], |row| {
            Ok(RoomRow {
                room_id: row.get(0)?,
                content: row.get(1)?,
                last_modified: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
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
