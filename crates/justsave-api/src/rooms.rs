use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{debug, info};

use justsave_types::api::{
    CreateRoomRequest, CreateRoomResponse, CreateStatus, RoomData, UpdateRoomRequest,
    UpdateRoomResponse, UpdateStatus,
};
use justsave_types::models::room_id_is_valid;

use crate::AppState;
use crate::error::ApiError;

/// Create the room if it does not exist, otherwise return it untouched.
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let room_id = req
        .room_id
        .filter(|id| room_id_is_valid(id))
        .ok_or(ApiError::Validation("Missing room_id"))?;

    // Run blocking DB work off the async runtime
    let db = state.clone();
    let resolution = tokio::task::spawn_blocking(move || db.db.create_or_get_room(&room_id, Utc::now()))
        .await
        .map_err(anyhow::Error::from)??;

    let status = if resolution.created {
        info!("Created room {}", resolution.room.id);
        CreateStatus::Success
    } else {
        debug!("Fetched room {}", resolution.room.id);
        CreateStatus::Already
    };

    Ok(Json(CreateRoomResponse {
        status,
        data: RoomData {
            content: resolution.room.content,
            last_modified: resolution.room.last_modified,
        },
    }))
}

/// Overwrite a room's content with whatever the writer sent. Last writer wins.
pub async fn update_room(
    State(state): State<AppState>,
    Json(req): Json<UpdateRoomRequest>,
) -> Result<Json<UpdateRoomResponse>, ApiError> {
    let (Some(room_id), Some(content), Some(last_modified)) =
        (req.room_id, req.content, req.last_modified)
    else {
        return Err(ApiError::Validation("Missing fields"));
    };
    if !room_id_is_valid(&room_id) {
        return Err(ApiError::Validation("Missing fields"));
    }

    let db = state.clone();
    let room_found = tokio::task::spawn_blocking(move || db.db.update_room(&room_id, &content, last_modified))
        .await
        .map_err(anyhow::Error::from)??;

    Ok(Json(UpdateRoomResponse {
        status: UpdateStatus::Updated,
        room_found,
    }))
}
