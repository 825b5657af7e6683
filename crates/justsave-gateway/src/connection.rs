use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, trace, warn};

use justsave_types::events::{GatewayCommand, GatewayEvent};

use crate::hub::{ConnectionId, Hub};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one WebSocket client until it disconnects. Dropping out of this
/// function for any reason removes the connection from the hub.
pub async fn handle_connection(socket: WebSocket, hub: Hub) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut conn_rx) = hub.register().await;
    info!("{} connected to gateway", conn_id);

    let ready = GatewayEvent::Ready { connection_id: conn_id };
    let sent = match encode(&ready) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };
    if !sent {
        hub.unregister(conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward hub events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = conn_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(msg) = encode(&event) else { continue };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let hub_recv = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => handle_command(&hub_recv, conn_id, cmd).await,
                    Err(e) => {
                        let raw: String = text.as_str().chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", conn_id, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(conn_id).await;
    info!("{} disconnected from gateway", conn_id);
}

async fn handle_command(hub: &Hub, conn_id: ConnectionId, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::JoinRoom { room_id } => match hub.join(conn_id, &room_id).await {
            Ok(()) => hub.send_to(conn_id, GatewayEvent::RoomJoined { room_id }).await,
            Err(e) => {
                warn!("{} join refused: {}", conn_id, e);
                hub.send_to(conn_id, GatewayEvent::Error { message: e.to_string() }).await;
            }
        },

        GatewayCommand::ContentUpdate { room_id, content } => {
            trace!("{} content update for {} ({} bytes)", conn_id, room_id, content.len());
            if let Err(e) = hub.publish(conn_id, &room_id, content).await {
                warn!("{} relay refused: {}", conn_id, e);
                hub.send_to(conn_id, GatewayEvent::Error { message: e.to_string() }).await;
            }
        }

        GatewayCommand::LeaveRoom => {
            hub.leave(conn_id).await;
        }
    }
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            None
        }
    }
}
