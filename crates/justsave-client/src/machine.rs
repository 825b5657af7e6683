//! Client-side room synchronization state machine.
//!
//! The machine is a plain value: every input is handled synchronously and
//! answered with a list of [`Effect`]s for the session driver to carry out
//! (start a timer, call the store, talk to the hub). Nothing here sleeps or
//! does I/O, so one attachment can never run two transitions at once.
//!
//! Each room switch bumps the attachment id. Timer and network completions
//! carry the id they were started under and are ignored once it is stale.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use justsave_types::models::RoomResolution;

use crate::config::SyncConfig;
use crate::error::SyncError;

pub type AttachmentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No room selected, or a typed id is still settling
    Idle,
    /// A create-or-get call is in flight
    Resolving,
    /// Room resolved, joined, nothing waiting to be saved
    Ready,
    /// Local content differs from what was saved; the save timer is running
    Editing,
    /// Resolving failed; editing stays disabled until retry or a new id
    Error,
}

impl Phase {
    /// Local edits are accepted only once the room is resolved.
    pub fn is_editable(self) -> bool {
        matches!(self, Phase::Ready | Phase::Editing)
    }
}

/// The save status shown next to the character count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveIndicator {
    Blank,
    Saved,
    Saving,
    Cleared,
    UpdatedRemotely,
    Failed,
}

impl fmt::Display for SaveIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Blank => "",
            Self::Saved => "saved.",
            Self::Saving => "saving...",
            Self::Cleared => "cleared.",
            Self::UpdatedRemotely => "updated remotely",
            Self::Failed => "not saved",
        };
        f.write_str(text)
    }
}

/// Content together with the time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Input {
    /// The room id field changed (raw text, untrimmed)
    RoomIdChanged(String),
    /// Reopen a remembered room without waiting for the id to settle
    Restore(String),
    ResolveTimerElapsed(AttachmentId),
    Resolved {
        attachment: AttachmentId,
        result: Result<RoomResolution, SyncError>,
    },
    /// Try the failed resolve again
    Retry,
    /// The content field changed
    LocalEdit(String),
    /// The clear button
    Clear,
    SaveTimerElapsed {
        attachment: AttachmentId,
        now: DateTime<Utc>,
    },
    Saved {
        attachment: AttachmentId,
        sent: Snapshot,
        result: Result<(), SyncError>,
    },
    RemoteUpdate {
        attachment: AttachmentId,
        content: String,
        received_at: DateTime<Utc>,
    },
    TransportLost(AttachmentId),
    ReconnectTimerElapsed(AttachmentId),
    /// Leave the room and drop all state
    Detach,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// (Re)start the room id timer
    ScheduleResolve { attachment: AttachmentId, after: Duration },
    Resolve { attachment: AttachmentId, room_id: String },
    Remember { room_id: String },
    Join { attachment: AttachmentId, room_id: String },
    Leave { attachment: AttachmentId },
    /// (Re)start the save timer
    ScheduleSave { attachment: AttachmentId, after: Duration },
    CancelSave,
    Persist {
        attachment: AttachmentId,
        room_id: String,
        snapshot: Snapshot,
    },
    Publish {
        attachment: AttachmentId,
        room_id: String,
        content: String,
    },
    ScheduleReconnect { attachment: AttachmentId, after: Duration },
    /// Abort every pending timer without firing it
    CancelTimers,
}

/// What a front end needs to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub phase: Phase,
    pub room_id: Option<String>,
    pub content: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub indicator: SaveIndicator,
    pub error: Option<String>,
    pub connected: bool,
}

impl ViewState {
    /// "5 character saved." / "No character saving..." / "Please Enter room id"
    pub fn status_line(&self) -> String {
        if self.room_id.is_none() {
            return "Please Enter room id".to_string();
        }
        match self.content.chars().count() {
            0 => format!("No character {}", self.indicator),
            n => format!("{} character {}", n, self.indicator),
        }
    }
}

/// Armed when remote content is applied. The next local edit consumes it;
/// if that edit carries exactly the applied content it is the field echoing
/// the update back and is dropped.
#[derive(Debug)]
struct EchoToken {
    content: String,
}

#[derive(Debug)]
pub struct SyncMachine {
    config: SyncConfig,
    phase: Phase,
    room_id: Option<String>,
    attachment: AttachmentId,
    joined: bool,
    content: String,
    /// Last content known to be durable, with its write time
    baseline: Option<Snapshot>,
    last_modified: Option<DateTime<Utc>>,
    indicator: SaveIndicator,
    echo: Option<EchoToken>,
    saves_in_flight: usize,
    error: Option<String>,
}

impl SyncMachine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            room_id: None,
            attachment: 0,
            joined: false,
            content: String::new(),
            baseline: None,
            last_modified: None,
            indicator: SaveIndicator::Blank,
            echo: None,
            saves_in_flight: 0,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn attachment(&self) -> AttachmentId {
        self.attachment
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn indicator(&self) -> SaveIndicator {
        self.indicator
    }

    /// True between a successful resolve and the next room switch or
    /// transport loss.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn view(&self, connected: bool) -> ViewState {
        ViewState {
            phase: self.phase,
            room_id: self.room_id.clone(),
            content: self.content.clone(),
            last_modified: self.last_modified,
            indicator: self.indicator,
            error: self.error.clone(),
            connected,
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::RoomIdChanged(raw) => self.room_id_changed(&raw),
            Input::Restore(raw) => self.restore(&raw),
            Input::ResolveTimerElapsed(attachment) => self.resolve_timer_elapsed(attachment),
            Input::Resolved { attachment, result } => self.resolved(attachment, result),
            Input::Retry => self.retry(),
            Input::LocalEdit(content) => self.local_edit(content, SaveIndicator::Saving),
            Input::Clear => self.local_edit(String::new(), SaveIndicator::Cleared),
            Input::SaveTimerElapsed { attachment, now } => self.save_timer_elapsed(attachment, now),
            Input::Saved {
                attachment,
                sent,
                result,
            } => self.saved(attachment, sent, result),
            Input::RemoteUpdate {
                attachment,
                content,
                received_at,
            } => self.remote_update(attachment, content, received_at),
            Input::TransportLost(attachment) => self.transport_lost(attachment),
            Input::ReconnectTimerElapsed(attachment) => self.reconnect_timer_elapsed(attachment),
            Input::Detach => self.detach(),
        }
    }

    fn room_id_changed(&mut self, raw: &str) -> Vec<Effect> {
        let id = raw.trim();
        if self.room_id.as_deref() == Some(id) || (id.is_empty() && self.room_id.is_none()) {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.reset_attachment(&mut effects);
        self.phase = Phase::Idle;

        if id.is_empty() {
            self.room_id = None;
        } else {
            self.room_id = Some(id.to_string());
            effects.push(Effect::ScheduleResolve {
                attachment: self.attachment,
                after: self.config.resolve_debounce,
            });
        }
        effects
    }

    fn restore(&mut self, raw: &str) -> Vec<Effect> {
        let id = raw.trim();
        if id.is_empty() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.reset_attachment(&mut effects);
        self.room_id = Some(id.to_string());
        self.begin_resolve(&mut effects);
        effects
    }

    fn resolve_timer_elapsed(&mut self, attachment: AttachmentId) -> Vec<Effect> {
        if attachment != self.attachment || self.phase != Phase::Idle || self.room_id.is_none() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.begin_resolve(&mut effects);
        effects
    }

    fn resolved(&mut self, attachment: AttachmentId, result: Result<RoomResolution, SyncError>) -> Vec<Effect> {
        if attachment != self.attachment || self.phase != Phase::Resolving {
            trace!("Ignoring stale resolve for attachment {}", attachment);
            return Vec::new();
        }
        let Some(room_id) = self.room_id.clone() else {
            return Vec::new();
        };

        match result {
            Ok(resolution) => {
                debug!("Room {} resolved (created: {})", room_id, resolution.created);
                let room = resolution.room;
                self.content = room.content.clone();
                self.last_modified = Some(room.last_modified);
                self.baseline = Some(Snapshot {
                    content: room.content,
                    last_modified: room.last_modified,
                });
                self.indicator = SaveIndicator::Saved;
                self.phase = Phase::Ready;
                self.joined = true;

                vec![
                    Effect::Remember {
                        room_id: room_id.clone(),
                    },
                    Effect::Join {
                        attachment: self.attachment,
                        room_id,
                    },
                ]
            }
            Err(e) => {
                warn!("Resolving room {} failed: {}", room_id, e);
                self.phase = Phase::Error;
                self.error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    fn retry(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Error || self.room_id.is_none() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.reset_attachment(&mut effects);
        self.begin_resolve(&mut effects);
        effects
    }

    fn local_edit(&mut self, content: String, indicator: SaveIndicator) -> Vec<Effect> {
        if !self.phase.is_editable() {
            debug!("Edit ignored while {:?}", self.phase);
            return Vec::new();
        }

        if let Some(token) = self.echo.take() {
            if token.content == content {
                trace!("Swallowed echo of remote update");
                return Vec::new();
            }
        }

        if content == self.content {
            return Vec::new();
        }
        self.content = content;

        // Back to what is already durable and nothing in flight: nothing to save
        let clean = self.saves_in_flight == 0
            && self
                .baseline
                .as_ref()
                .is_some_and(|baseline| baseline.content == self.content);
        if clean {
            self.phase = Phase::Ready;
            self.indicator = SaveIndicator::Saved;
            return vec![Effect::CancelSave];
        }

        self.phase = Phase::Editing;
        self.indicator = indicator;
        vec![Effect::ScheduleSave {
            attachment: self.attachment,
            after: self.config.save_debounce,
        }]
    }

    fn save_timer_elapsed(&mut self, attachment: AttachmentId, now: DateTime<Utc>) -> Vec<Effect> {
        if attachment != self.attachment || self.phase != Phase::Editing {
            return Vec::new();
        }
        let Some(room_id) = self.room_id.clone() else {
            return Vec::new();
        };

        self.phase = Phase::Ready;
        self.saves_in_flight += 1;

        vec![
            Effect::Persist {
                attachment: self.attachment,
                room_id: room_id.clone(),
                snapshot: Snapshot {
                    content: self.content.clone(),
                    last_modified: now,
                },
            },
            Effect::Publish {
                attachment: self.attachment,
                room_id,
                content: self.content.clone(),
            },
        ]
    }

    fn saved(&mut self, attachment: AttachmentId, sent: Snapshot, result: Result<(), SyncError>) -> Vec<Effect> {
        if attachment != self.attachment {
            return Vec::new();
        }
        self.saves_in_flight = self.saves_in_flight.saturating_sub(1);

        match result {
            Ok(()) => {
                // The baseline moves to what this save carried when it was
                // sent, unless a remote update has replaced it since.
                let newer_baseline = self
                    .baseline
                    .as_ref()
                    .is_some_and(|baseline| baseline.last_modified > sent.last_modified);
                if !newer_baseline {
                    self.baseline = Some(sent.clone());
                }

                if sent.content == self.content {
                    self.last_modified = Some(sent.last_modified);
                    if self.phase == Phase::Ready && self.saves_in_flight == 0 {
                        self.indicator = SaveIndicator::Saved;
                    }
                }
            }
            Err(e) => {
                warn!("Saving room {:?} failed: {}", self.room_id, e);
                if self.phase == Phase::Ready {
                    self.indicator = SaveIndicator::Failed;
                }
            }
        }
        Vec::new()
    }

    fn remote_update(&mut self, attachment: AttachmentId, content: String, received_at: DateTime<Utc>) -> Vec<Effect> {
        if attachment != self.attachment || !self.phase.is_editable() {
            return Vec::new();
        }
        if content == self.content {
            return Vec::new();
        }

        debug!("Applying remote update ({} bytes)", content.len());
        self.echo = Some(EchoToken {
            content: content.clone(),
        });
        self.content = content.clone();
        self.last_modified = Some(received_at);
        self.baseline = Some(Snapshot {
            content,
            last_modified: received_at,
        });
        self.indicator = SaveIndicator::UpdatedRemotely;

        // A pending local save would now persist the remote content: drop it
        if self.phase == Phase::Editing {
            self.phase = Phase::Ready;
            return vec![Effect::CancelSave];
        }
        Vec::new()
    }

    fn transport_lost(&mut self, attachment: AttachmentId) -> Vec<Effect> {
        if attachment != self.attachment || !self.joined {
            return Vec::new();
        }

        debug!("Hub connection lost for attachment {}", attachment);
        self.joined = false;
        vec![Effect::ScheduleReconnect {
            attachment,
            after: self.config.reconnect_delay,
        }]
    }

    fn reconnect_timer_elapsed(&mut self, attachment: AttachmentId) -> Vec<Effect> {
        if attachment != self.attachment || self.joined || !self.phase.is_editable() {
            return Vec::new();
        }

        // Let local work reach the store first, so the re-resolve brings it back
        if self.phase == Phase::Editing || self.saves_in_flight > 0 {
            return vec![Effect::ScheduleReconnect {
                attachment,
                after: self.config.reconnect_delay,
            }];
        }

        let mut effects = Vec::new();
        self.reset_attachment(&mut effects);
        self.begin_resolve(&mut effects);
        effects
    }

    fn detach(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.reset_attachment(&mut effects);
        self.room_id = None;
        self.phase = Phase::Idle;
        effects
    }

    fn begin_resolve(&mut self, effects: &mut Vec<Effect>) {
        if let Some(room_id) = self.room_id.clone() {
            self.phase = Phase::Resolving;
            effects.push(Effect::Resolve {
                attachment: self.attachment,
                room_id,
            });
        }
    }

    /// Abandon the current attachment: cancel timers, leave the hub, start
    /// a fresh attachment id and forget everything about the old room.
    fn reset_attachment(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::CancelTimers);
        if self.joined {
            effects.push(Effect::Leave {
                attachment: self.attachment,
            });
            self.joined = false;
        }

        self.attachment += 1;
        self.content.clear();
        self.baseline = None;
        self.last_modified = None;
        self.indicator = SaveIndicator::Blank;
        self.echo = None;
        self.saves_in_flight = 0;
        self.error = None;
    }
}
