use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use justsave_types::api::{
    CreateRoomRequest, CreateRoomResponse, CreateStatus, ErrorResponse, UpdateRoomRequest,
    UpdateRoomResponse,
};
use justsave_types::models::{Room, RoomResolution, room_id_is_valid};

use crate::error::SyncError;

/// Durable room storage as seen from the client.
pub trait RoomStore: Send + Sync + 'static {
    /// Create the room if needed and return its stored state.
    fn create_or_get(&self, room_id: &str) -> impl Future<Output = Result<RoomResolution, SyncError>> + Send;

    /// Overwrite the room's content and timestamp.
    fn update(
        &self,
        room_id: &str,
        content: &str,
        last_modified: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Talks to the server's `/api/createroom` and `/api/updateroom`.
#[derive(Debug, Clone)]
pub struct HttpRoomStore {
    client: Client,
    base_url: String,
}

impl HttpRoomStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Turn a non-2xx response into an error, preferring the server's message.
    async fn failure(resp: reqwest::Response) -> SyncError {
        let status = resp.status();
        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => status.to_string(),
        };
        if status == StatusCode::BAD_REQUEST {
            SyncError::Validation(message)
        } else {
            SyncError::Gateway(format!("{} ({})", message, status))
        }
    }
}

impl RoomStore for HttpRoomStore {
    async fn create_or_get(&self, room_id: &str) -> Result<RoomResolution, SyncError> {
        if !room_id_is_valid(room_id) {
            return Err(SyncError::Validation("Missing room_id".into()));
        }

        let resp = self
            .client
            .post(format!("{}/api/createroom", self.base_url))
            .json(&CreateRoomRequest {
                room_id: Some(room_id.to_string()),
            })
            .send()
            .await
            .map_err(|e| SyncError::Gateway(format!("create request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Self::failure(resp).await);
        }

        let body: CreateRoomResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Gateway(format!("bad create response: {}", e)))?;

        debug!("Room {} resolved as {:?}", room_id, body.status);
        Ok(RoomResolution {
            room: Room {
                id: room_id.to_string(),
                content: body.data.content,
                last_modified: body.data.last_modified,
            },
            created: body.status == CreateStatus::Success,
        })
    }

    async fn update(&self, room_id: &str, content: &str, last_modified: DateTime<Utc>) -> Result<(), SyncError> {
        if !room_id_is_valid(room_id) {
            return Err(SyncError::Validation("Missing fields".into()));
        }

        let resp = self
            .client
            .post(format!("{}/api/updateroom", self.base_url))
            .json(&UpdateRoomRequest {
                room_id: Some(room_id.to_string()),
                content: Some(content.to_string()),
                last_modified: Some(last_modified),
            })
            .send()
            .await
            .map_err(|e| SyncError::Gateway(format!("update request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Self::failure(resp).await);
        }

        let body: UpdateRoomResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Gateway(format!("bad update response: {}", e)))?;

        if !body.room_found {
            warn!("Update for room {} matched no stored room", room_id);
        }
        Ok(())
    }
}
