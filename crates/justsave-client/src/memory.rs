use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;

/// Where the last resolved room id is kept between runs.
pub trait RoomMemory: Send + Sync + 'static {
    fn recall(&self) -> Option<String>;
    fn remember(&self, room_id: &str) -> anyhow::Result<()>;
}

/// Keeps the room id in a small text file.
#[derive(Debug, Clone)]
pub struct FileMemory {
    path: PathBuf,
}

impl FileMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RoomMemory for FileMemory {
    fn recall(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let id = raw.trim();
        if id.is_empty() {
            return None;
        }
        debug!("Recalled room {} from {}", id, self.path.display());
        Some(id.to_string())
    }

    fn remember(&self, room_id: &str) -> anyhow::Result<()> {
        std::fs::write(&self.path, room_id)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

/// Remembers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl RoomMemory for NoMemory {
    fn recall(&self) -> Option<String> {
        None
    }

    fn remember(&self, _room_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
