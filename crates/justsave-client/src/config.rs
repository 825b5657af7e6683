use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Quiet periods used by the synchronization machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How long the room id field must be still before it is resolved
    pub resolve_debounce: Duration,
    /// How long the content must be still before it is saved and relayed
    pub save_debounce: Duration,
    /// Wait after losing the hub before re-resolving the room
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resolve_debounce: Duration::from_millis(1000),
            save_debounce: Duration::from_millis(1000),
            reconnect_delay: Duration::from_millis(2000),
        }
    }
}

/// Everything the terminal client reads from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub state_file: PathBuf,
    pub sync: SyncConfig,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = SyncConfig::default();

        Ok(Self {
            server_url: std::env::var("JUSTSAVE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".into()),
            state_file: std::env::var("JUSTSAVE_STATE_FILE")
                .unwrap_or_else(|_| ".justsave-room".into())
                .into(),
            sync: SyncConfig {
                resolve_debounce: duration_var("JUSTSAVE_RESOLVE_DEBOUNCE_MS", defaults.resolve_debounce)?,
                save_debounce: duration_var("JUSTSAVE_SAVE_DEBOUNCE_MS", defaults.save_debounce)?,
                reconnect_delay: duration_var("JUSTSAVE_RECONNECT_MS", defaults.reconnect_delay)?,
            },
        })
    }
}

/// `http://host:port` -> `ws://host:port/gateway`
pub fn gateway_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/gateway", ws_base)
}

fn duration_var(name: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => {
            let ms: u64 = raw
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds, got '{}'", name, raw))?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(default),
    }
}
