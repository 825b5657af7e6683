#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};

use justsave_client::error::SyncError;
use justsave_client::memory::RoomMemory;
use justsave_client::store::RoomStore;
use justsave_client::transport::{HubLink, HubTransport};
use justsave_client::{SyncConfig, ViewState};
use justsave_db::Database;
use justsave_gateway::Hub;
use justsave_types::events::{GatewayCommand, GatewayEvent};
use justsave_types::models::RoomResolution;

pub fn fast_config() -> SyncConfig {
    SyncConfig {
        resolve_debounce: Duration::from_millis(100),
        save_debounce: Duration::from_millis(100),
        reconnect_delay: Duration::from_millis(200),
    }
}

/// Room store backed by an in-memory database, recording every update.
#[derive(Clone)]
pub struct DbStore {
    pub db: Arc<Database>,
    updates: Arc<Mutex<Vec<(String, String)>>>,
    fail_resolves: Arc<AtomicBool>,
    fail_updates: Arc<AtomicBool>,
}

impl DbStore {
    pub fn new() -> Self {
        Self {
            db: Arc::new(Database::open_in_memory().unwrap()),
            updates: Arc::default(),
            fail_resolves: Arc::default(),
            fail_updates: Arc::default(),
        }
    }

    pub fn put(&self, room_id: &str, content: &str) {
        self.db.create_or_get_room(room_id, Utc::now()).unwrap();
        self.db.update_room(room_id, content, Utc::now()).unwrap();
    }

    pub fn content(&self, room_id: &str) -> Option<String> {
        self.db
            .get_room(room_id)
            .unwrap()
            .map(|row| row.into_room().unwrap().content)
    }

    /// (room_id, content) of every successful update, in order.
    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn fail_resolves(&self, fail: bool) {
        self.fail_resolves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl RoomStore for DbStore {
    async fn create_or_get(&self, room_id: &str) -> Result<RoomResolution, SyncError> {
        if self.fail_resolves.load(Ordering::SeqCst) {
            return Err(SyncError::Gateway("store offline".into()));
        }
        self.db
            .create_or_get_room(room_id, Utc::now())
            .map_err(|e| SyncError::Gateway(e.to_string()))
    }

    async fn update(&self, room_id: &str, content: &str, last_modified: DateTime<Utc>) -> Result<(), SyncError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SyncError::Gateway("store offline".into()));
        }
        self.db
            .update_room(room_id, content, last_modified)
            .map_err(|e| SyncError::Gateway(e.to_string()))?;
        self.updates
            .lock()
            .unwrap()
            .push((room_id.to_string(), content.to_string()));
        Ok(())
    }
}

/// Hub transport that talks to an in-process [`Hub`] without a socket.
#[derive(Clone)]
pub struct LocalHub {
    pub hub: Hub,
    sever: Arc<Notify>,
}

impl LocalHub {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            sever: Arc::new(Notify::new()),
        }
    }

    /// Drop every open link, as if the network went away.
    pub fn sever_all(&self) {
        self.sever.notify_waiters();
    }
}

impl HubTransport for LocalHub {
    async fn connect(&self, room_id: &str) -> Result<HubLink, SyncError> {
        let hub = self.hub.clone();
        let (conn_id, mut hub_rx) = hub.register().await;
        if let Err(e) = hub.join(conn_id, room_id).await {
            hub.unregister(conn_id).await;
            return Err(SyncError::Transport(e.to_string()));
        }

        let (link, mut end) = HubLink::pair();
        let _ = end.events.send(GatewayEvent::RoomJoined {
            room_id: room_id.to_string(),
        });

        let sever = self.sever.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = end.commands.recv() => match command {
                        Some(GatewayCommand::ContentUpdate { room_id, content }) => {
                            let _ = hub.publish(conn_id, &room_id, content).await;
                        }
                        Some(GatewayCommand::JoinRoom { room_id }) => {
                            let _ = hub.join(conn_id, &room_id).await;
                        }
                        Some(GatewayCommand::LeaveRoom) => {
                            hub.leave(conn_id).await;
                        }
                        None => break,
                    },
                    event = hub_rx.recv() => match event {
                        Some(event) => {
                            if end.events.send(event).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = sever.notified() => break,
                }
            }
            hub.unregister(conn_id).await;
        });

        Ok(link)
    }
}

/// Remembers the room in memory, shareable with the test body.
#[derive(Clone, Default)]
pub struct SharedMemory(pub Arc<Mutex<Option<String>>>);

impl RoomMemory for SharedMemory {
    fn recall(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }

    fn remember(&self, room_id: &str) -> anyhow::Result<()> {
        *self.0.lock().unwrap() = Some(room_id.to_string());
        Ok(())
    }
}

/// Wait until the view satisfies `pred`, failing after 10s of (virtual) time.
pub async fn wait_view(views: &mut watch::Receiver<ViewState>, pred: impl FnMut(&ViewState) -> bool) -> ViewState {
    let view = tokio::time::timeout(Duration::from_secs(10), views.wait_for(pred))
        .await
        .expect("timed out waiting for view")
        .expect("session stopped");
    view.clone()
}
