use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::parse_timestamp;

// -- Create or get --

/// Body of `POST /api/createroom`. The id is optional at the serde level so
/// a missing id is answered with the same 400 as an empty one.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateStatus {
    /// The room did not exist and was inserted by this call
    Success,
    /// The room existed; its stored state is returned untouched
    Already,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomData {
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub status: CreateStatus,
    pub data: RoomData,
}

// -- Update --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateRoomRequest {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoomResponse {
    pub status: UpdateStatus,
    /// False when no room with that id exists. Updates never create rooms.
    pub room_found: bool,
}

/// Accepts anything [`parse_timestamp`] does.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid last_modified '{}'", raw))),
    }
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
