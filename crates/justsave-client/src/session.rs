//! Runs a [`SyncMachine`] against real timers, a room store and the hub.
//!
//! The driver task owns the machine and is the only place inputs are
//! handled. Timers and network calls run as separate tasks and report back
//! through the driver's channel, tagged with the attachment they belong to.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use justsave_types::events::{GatewayCommand, GatewayEvent};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::machine::{AttachmentId, Effect, Input, SyncMachine, ViewState};
use crate::memory::RoomMemory;
use crate::store::RoomStore;
use crate::timer::Debounce;
use crate::transport::{HubLink, HubTransport};

enum Event {
    Input(Input),
    Attached { attachment: AttachmentId, link: HubLink },
    AttachFailed { attachment: AttachmentId, error: SyncError },
    Shutdown,
}

/// Front-end side of a running session.
pub struct SessionHandle {
    events: mpsc::UnboundedSender<Event>,
    view: watch::Receiver<ViewState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// The room id field changed.
    pub fn set_room_id(&self, room_id: impl Into<String>) {
        self.input(Input::RoomIdChanged(room_id.into()));
    }

    /// The content field changed.
    pub fn edit(&self, content: impl Into<String>) {
        self.input(Input::LocalEdit(content.into()));
    }

    pub fn clear(&self) {
        self.input(Input::Clear);
    }

    pub fn retry(&self) {
        self.input(Input::Retry);
    }

    pub fn detach(&self) {
        self.input(Input::Detach);
    }

    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }

    /// Stop the driver. Pending timers are dropped without firing.
    pub async fn shutdown(mut self) {
        let _ = self.events.send(Event::Shutdown);
        if let Err(e) = (&mut self.task).await {
            warn!("Session task ended abnormally: {}", e);
        }
    }

    fn input(&self, input: Input) {
        if self.events.send(Event::Input(input)).is_err() {
            debug!("Session already stopped");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
    }
}

/// Start a session. A room remembered by `memory` is reopened right away.
pub fn spawn<S, T, M>(config: SyncConfig, store: S, transport: T, memory: M) -> SessionHandle
where
    S: RoomStore,
    T: HubTransport,
    M: RoomMemory,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let machine = SyncMachine::new(config);
    let (view_tx, view_rx) = watch::channel(machine.view(false));

    let driver = Driver {
        machine,
        store: Arc::new(store),
        transport: Arc::new(transport),
        memory,
        events: events_tx.clone(),
        view: view_tx,
        resolve_timer: Debounce::new(),
        save_timer: Debounce::new(),
        reconnect_timer: Debounce::new(),
        link: None,
        connected: false,
    };
    let task = tokio::spawn(driver.run(events_rx));

    SessionHandle {
        events: events_tx,
        view: view_rx,
        task,
    }
}

struct Driver<S, T, M> {
    machine: SyncMachine,
    store: Arc<S>,
    transport: Arc<T>,
    memory: M,
    events: mpsc::UnboundedSender<Event>,
    view: watch::Sender<ViewState>,
    resolve_timer: Debounce,
    save_timer: Debounce,
    reconnect_timer: Debounce,
    /// Hub connection of the current attachment, once attached
    link: Option<(AttachmentId, HubLink)>,
    /// The hub confirmed the join
    connected: bool,
}

impl<S, T, M> Driver<S, T, M>
where
    S: RoomStore,
    T: HubTransport,
    M: RoomMemory,
{
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        if let Some(room_id) = self.memory.recall() {
            info!("Reopening room {}", room_id);
            self.apply(Input::Restore(room_id));
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(Event::Shutdown) | None => break,
                        Some(event) => self.on_event(event),
                    }
                }
                (attachment, event) = next_remote(&mut self.link) => {
                    self.on_hub_event(attachment, event);
                }
            }
            self.publish_view();
        }

        self.leave_hub();
        debug!("Session stopped");
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Input(input) => self.apply(input),

            Event::Attached { attachment, link } => {
                if attachment == self.machine.attachment() && self.machine.is_joined() {
                    debug!("Hub link attached for attachment {}", attachment);
                    self.link = Some((attachment, link));
                } else {
                    trace!("Dropping hub link of stale attachment {}", attachment);
                }
            }

            Event::AttachFailed { attachment, error } => {
                warn!("Joining hub failed: {}", error);
                self.apply(Input::TransportLost(attachment));
            }

            Event::Shutdown => {}
        }
    }

    fn on_hub_event(&mut self, attachment: AttachmentId, event: Option<GatewayEvent>) {
        let Some(event) = event else {
            self.link = None;
            self.connected = false;
            self.apply(Input::TransportLost(attachment));
            return;
        };

        match event {
            GatewayEvent::RoomJoined { room_id } => {
                debug!("Joined room {} on the hub", room_id);
                self.connected = true;
            }
            GatewayEvent::ReceiveUpdate { room_id, content } => {
                if self.machine.room_id() != Some(room_id.as_str()) {
                    trace!("Ignoring update for other room {}", room_id);
                    return;
                }
                self.apply(Input::RemoteUpdate {
                    attachment,
                    content,
                    received_at: Utc::now(),
                });
            }
            GatewayEvent::Error { message } => warn!("Hub error: {}", message),
            GatewayEvent::Ready { .. } => {}
        }
    }

    fn apply(&mut self, input: Input) {
        for effect in self.machine.handle(input) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::ScheduleResolve { attachment, after } => {
                let tx = self.events.clone();
                self.resolve_timer
                    .schedule(after, move || send(tx, Input::ResolveTimerElapsed(attachment)));
            }

            Effect::Resolve { attachment, room_id } => {
                let store = self.store.clone();
                let tx = self.events.clone();
                tokio::spawn(async move {
                    let result = store.create_or_get(&room_id).await;
                    let _ = tx.send(Event::Input(Input::Resolved { attachment, result }));
                });
            }

            Effect::Remember { room_id } => {
                if let Err(e) = self.memory.remember(&room_id) {
                    warn!("Could not remember room {}: {:#}", room_id, e);
                }
            }

            Effect::Join { attachment, room_id } => {
                let transport = self.transport.clone();
                let tx = self.events.clone();
                tokio::spawn(async move {
                    let event = match transport.connect(&room_id).await {
                        Ok(link) => Event::Attached { attachment, link },
                        Err(error) => Event::AttachFailed { attachment, error },
                    };
                    let _ = tx.send(event);
                });
            }

            Effect::Leave { attachment } => {
                if self.link.as_ref().is_some_and(|(att, _)| *att == attachment) {
                    self.leave_hub();
                }
            }

            Effect::ScheduleSave { attachment, after } => {
                let tx = self.events.clone();
                self.save_timer.schedule(after, move || {
                    send(
                        tx,
                        Input::SaveTimerElapsed {
                            attachment,
                            now: Utc::now(),
                        },
                    )
                });
            }

            Effect::CancelSave => self.save_timer.cancel(),

            Effect::Persist {
                attachment,
                room_id,
                snapshot,
            } => {
                let store = self.store.clone();
                let tx = self.events.clone();
                tokio::spawn(async move {
                    let result = store
                        .update(&room_id, &snapshot.content, snapshot.last_modified)
                        .await;
                    let _ = tx.send(Event::Input(Input::Saved {
                        attachment,
                        sent: snapshot,
                        result,
                    }));
                });
            }

            Effect::Publish {
                attachment,
                room_id,
                content,
            } => match &self.link {
                Some((att, link)) if *att == attachment => {
                    if !link.send(GatewayCommand::ContentUpdate { room_id, content }) {
                        debug!("Hub link closed before publish");
                    }
                }
                _ => debug!("Not attached to the hub, update for {} stays local", room_id),
            },

            Effect::ScheduleReconnect { attachment, after } => {
                let tx = self.events.clone();
                self.reconnect_timer
                    .schedule(after, move || send(tx, Input::ReconnectTimerElapsed(attachment)));
            }

            Effect::CancelTimers => {
                self.resolve_timer.cancel();
                self.save_timer.cancel();
                self.reconnect_timer.cancel();
            }
        }
    }

    fn leave_hub(&mut self) {
        if let Some((_, link)) = self.link.take() {
            link.send(GatewayCommand::LeaveRoom);
        }
        self.connected = false;
    }

    fn publish_view(&self) {
        let next = self.machine.view(self.connected);
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn send(tx: mpsc::UnboundedSender<Event>, input: Input) {
    let _ = tx.send(Event::Input(input));
}

/// Waits on the attached link; never resolves while detached.
async fn next_remote(link: &mut Option<(AttachmentId, HubLink)>) -> (AttachmentId, Option<GatewayEvent>) {
    match link {
        Some((attachment, link)) => (*attachment, link.recv().await),
        None => std::future::pending().await,
    }
}

