//! Full stack: real server on a loopback port, HTTP store, WebSocket hub.

mod common;

use std::sync::Arc;
use std::time::Duration;

use justsave_api::{AppStateInner, router};
use justsave_client::memory::NoMemory;
use justsave_client::store::{HttpRoomStore, RoomStore};
use justsave_client::transport::WsTransport;
use justsave_client::{Phase, SaveIndicator, SyncConfig, SyncError, spawn};
use justsave_db::Database;
use justsave_gateway::Hub;

use common::wait_view;

async fn start_server() -> String {
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        hub: Hub::new(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config() -> SyncConfig {
    SyncConfig {
        resolve_debounce: Duration::from_millis(50),
        save_debounce: Duration::from_millis(50),
        reconnect_delay: Duration::from_millis(200),
    }
}

#[tokio::test]
async fn http_store_creates_once_and_overwrites() {
    let base = start_server().await;
    let store = HttpRoomStore::new(&base);

    let first = store.create_or_get("abc").await.unwrap();
    assert!(first.created);
    assert_eq!(first.room.content, "");

    store.update("abc", "hello", first.room.last_modified).await.unwrap();

    let second = store.create_or_get("abc").await.unwrap();
    assert!(!second.created);
    assert_eq!(second.room.content, "hello");

    // Unknown rooms are not an error, and are not created either
    store.update("ghost", "boo", first.room.last_modified).await.unwrap();
    assert!(store.create_or_get("ghost").await.unwrap().created);

    assert!(matches!(store.create_or_get("").await, Err(SyncError::Validation(_))));
}

#[tokio::test]
async fn two_clients_edit_the_same_room() {
    let base = start_server().await;
    let ws = justsave_client::config::gateway_url(&base);

    let a = spawn(config(), HttpRoomStore::new(&base), WsTransport::new(&ws), NoMemory);
    let b = spawn(config(), HttpRoomStore::new(&base), WsTransport::new(&ws), NoMemory);
    let mut a_views = a.subscribe();
    let mut b_views = b.subscribe();

    a.set_room_id("shared");
    b.set_room_id("shared");
    wait_view(&mut a_views, |v| v.phase == Phase::Ready && v.connected).await;
    wait_view(&mut b_views, |v| v.phase == Phase::Ready && v.connected).await;

    a.edit("hello from a");
    let view = wait_view(&mut b_views, |v| v.content == "hello from a").await;
    assert_eq!(view.indicator, SaveIndicator::UpdatedRemotely);
    wait_view(&mut a_views, |v| v.indicator == SaveIndicator::Saved && v.content == "hello from a").await;

    let stored = HttpRoomStore::new(&base).create_or_get("shared").await.unwrap();
    assert_eq!(stored.room.content, "hello from a");

    // A third client arriving later starts from the stored content
    let c = spawn(config(), HttpRoomStore::new(&base), WsTransport::new(&ws), NoMemory);
    let mut c_views = c.subscribe();
    c.set_room_id("shared");
    let view = wait_view(&mut c_views, |v| v.phase == Phase::Ready).await;
    assert_eq!(view.content, "hello from a");

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}
