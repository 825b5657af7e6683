use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server accepted the socket and assigned it a connection id
    Ready { connection_id: Uuid },

    /// The connection is now a member of `room_id`
    RoomJoined { room_id: String },

    /// Another member of the room pushed new content
    ReceiveUpdate { room_id: String, content: String },

    /// A command was refused
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Join a room, leaving the current one first
    JoinRoom { room_id: String },

    /// Relay the full room content to the other members.
    /// Never a diff; receivers replace their content wholesale.
    ContentUpdate { room_id: String, content: String },

    /// Leave the current room
    LeaveRoom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_tagged_wire_format() {
        let cmd = GatewayCommand::ContentUpdate {
            room_id: "abc".into(),
            content: "hello".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "ContentUpdate", "data": {"room_id": "abc", "content": "hello"}})
        );

        let leave: GatewayCommand = serde_json::from_str(r#"{"type":"LeaveRoom"}"#).unwrap();
        assert_eq!(leave, GatewayCommand::LeaveRoom);
    }

    #[test]
    fn relayed_updates_decode_from_the_wire() {
        let event: GatewayEvent =
            serde_json::from_str(r#"{"type":"ReceiveUpdate","data":{"room_id":"abc","content":""}}"#).unwrap();
        assert_eq!(
            event,
            GatewayEvent::ReceiveUpdate {
                room_id: "abc".into(),
                content: String::new(),
            }
        );
    }
}
