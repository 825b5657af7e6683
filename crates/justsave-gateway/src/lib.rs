//! Room broadcast hub and its WebSocket front end.

pub mod connection;
pub mod hub;

pub use hub::{ConnectionId, Hub, HubError};
