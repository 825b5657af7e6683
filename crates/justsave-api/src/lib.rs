pub mod error;
pub mod rooms;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use justsave_db::Database;
use justsave_gateway::{Hub, connection};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub hub: Hub,
}

/// All routes: the two room endpoints and the hub's WebSocket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/createroom", post(rooms::create_room))
        .route("/api/updateroom", post(rooms::update_room))
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub))
}
