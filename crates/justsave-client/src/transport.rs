use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use justsave_types::events::{GatewayCommand, GatewayEvent};

use crate::error::SyncError;

/// One joined hub connection. Dropping the link (or its command sender)
/// closes the connection, which leaves the room.
#[derive(Debug)]
pub struct HubLink {
    commands: mpsc::UnboundedSender<GatewayCommand>,
    events: mpsc::UnboundedReceiver<GatewayEvent>,
}

/// The transport-side halves of a [`HubLink`].
#[derive(Debug)]
pub struct LinkEnd {
    pub commands: mpsc::UnboundedReceiver<GatewayCommand>,
    pub events: mpsc::UnboundedSender<GatewayEvent>,
}

impl HubLink {
    pub fn pair() -> (HubLink, LinkEnd) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            HubLink {
                commands: cmd_tx,
                events: event_rx,
            },
            LinkEnd {
                commands: cmd_rx,
                events: event_tx,
            },
        )
    }

    /// Queue a command. Returns false once the connection is gone.
    pub fn send(&self, command: GatewayCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Next event from the hub; `None` when the connection has closed.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        self.events.recv().await
    }
}

/// Opens hub connections already joined to a room.
pub trait HubTransport: Send + Sync + 'static {
    fn connect(&self, room_id: &str) -> impl Future<Output = Result<HubLink, SyncError>> + Send;
}

/// WebSocket connection to the server's `/gateway`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl HubTransport for WsTransport {
    async fn connect(&self, room_id: &str) -> Result<HubLink, SyncError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::Transport(format!("WS connect failed: {}", e)))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let join = GatewayCommand::JoinRoom {
            room_id: room_id.to_string(),
        };
        let text = serde_json::to_string(&join).map_err(|e| SyncError::Transport(e.to_string()))?;
        ws_tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SyncError::Transport(format!("WS send error: {}", e)))?;

        let (link, mut end) = HubLink::pair();
        let room = room_id.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = end.commands.recv() => {
                        let Some(command) = command else {
                            // Link dropped: say goodbye and stop
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        };
                        let text = match serde_json::to_string(&command) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode gateway command: {}", e);
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    frame = ws_rx.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                                    Ok(event) => {
                                        trace!("Gateway event for {}: {:?}", room, event);
                                        if end.events.send(event).is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!("Bad gateway event: {}", e),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("Gateway read error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            debug!("Gateway link for {} closed", room);
        });

        Ok(link)
    }
}
