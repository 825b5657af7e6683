//! Room synchronization client: a pure state machine plus the session
//! driver that runs it against the HTTP store and the hub.

pub mod config;
pub mod error;
pub mod machine;
pub mod memory;
pub mod session;
pub mod store;
pub mod timer;
pub mod transport;

pub use config::{ClientConfig, SyncConfig};
pub use error::SyncError;
pub use machine::{Phase, SaveIndicator, SyncMachine, ViewState};
pub use session::{SessionHandle, spawn};
