//! NotifierActor - Keeps one chat status message up to date
//!
//! ## Message Flow
//!
//! ```text
//! Scheduler (transitions) ─TransitionBatch─▶ render ─▶ edit existing message
//!                                                        │ NotFound
//!                                                        ▼
//!                                            send new message ─▶ persist reference
//!
//! Latency timer ─RefreshLatency─▶ patch latency numbers ─▶ edit (errors swallowed)
//!                      │ full render pending
//!                      ▼
//!                render and deliver like a transition
//!
//! Transitions ─▶ one alert per event ─▶ send to each alert channel (best effort)
//! ```
//!
//! Delivery failures are logged and dropped. A failed full render is
//! remembered, and the next refresh delivers a full render from its fresh
//! snapshot instead of patching the stale message.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{NotifierCommand, NotifierStats, StatusTransitionEvent};
use crate::discord::{ChatTransport, EditOutcome, Message, MessageRef};
use crate::registry::ServiceRecord;
use crate::status_board::StatusBoard;
use crate::storage::{NotificationState, RecordStore};

const COMMAND_BUFFER: usize = 64;

pub struct NotifierActor {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn RecordStore>,
    board: StatusBoard,
    command_rx: mpsc::Receiver<NotifierCommand>,

    /// Channels that get an alert per transition
    alert_channels: Vec<String>,

    /// Message being edited in place, `None` until the first send
    state: Option<NotificationState>,

    /// Last content delivered, base for latency-only refreshes
    last_rendered: Option<Message>,

    /// The last full render was not delivered
    render_pending: bool,

    stats: NotifierStats,
}

impl NotifierActor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn RecordStore>,
        board: StatusBoard,
        command_rx: mpsc::Receiver<NotifierCommand>,
    ) -> Self {
        Self {
            transport,
            store,
            board,
            command_rx,
            alert_channels: Vec::new(),
            state: None,
            last_rendered: None,
            render_pending: false,
            stats: NotifierStats::default(),
        }
    }

    #[instrument(skip(self), fields(channel = %self.transport.channel_id()))]
    pub async fn run(mut self) {
        debug!("starting notifier actor");

        match self.store.load_notification_state().await {
            Ok(Some(state)) => {
                debug!("resuming status message {}", state.message_id);
                self.state = Some(state);
            }
            Ok(None) => trace!("no status message posted yet"),
            Err(e) => warn!("failed to load notification state, a new message will be posted: {e}"),
        }

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                NotifierCommand::TransitionBatch { events, snapshot } => {
                    self.on_transition_batch(&events, &snapshot).await;
                }

                NotifierCommand::RefreshLatency { snapshot } => {
                    self.refresh_latency_only(&snapshot).await;
                }

                NotifierCommand::GetState { respond_to } => {
                    let _ = respond_to.send(self.state.clone());
                }

                NotifierCommand::GetStats { respond_to } => {
                    let _ = respond_to.send(self.stats.clone());
                }

                NotifierCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("notifier actor stopped");
    }

    async fn on_transition_batch(
        &mut self,
        events: &[StatusTransitionEvent],
        snapshot: &[ServiceRecord],
    ) {
        for event in events {
            debug!(
                "{} went {}",
                event.name,
                if event.new_status { "online" } else { "offline" }
            );
        }

        self.render_full(snapshot).await;
        self.send_alerts(events, snapshot).await;
    }

    /// Post one alert per event to every alert channel; failures are dropped
    async fn send_alerts(&mut self, events: &[StatusTransitionEvent], snapshot: &[ServiceRecord]) {
        if self.alert_channels.is_empty() {
            return;
        }

        for event in events {
            let Some(record) = snapshot.iter().find(|r| r.name == event.name) else {
                trace!("{} is no longer registered, no alert", event.name);
                continue;
            };
            let alert = self.board.alert(event, record);

            for channel_id in &self.alert_channels {
                match self.transport.send_to(channel_id, &alert).await {
                    Ok(_) => self.stats.alerts += 1,
                    Err(e) => {
                        warn!("failed to send alert for {} to channel {channel_id}: {e}", event.name);
                        self.stats.failures += 1;
                    }
                }
            }
        }
    }

    /// Full re-render, editing the existing message or posting a new one
    async fn render_full(&mut self, snapshot: &[ServiceRecord]) {
        let message = self.board.render(snapshot, Utc::now());

        if let Some(target) = self.current_target() {
            match self.transport.edit(&target, &message).await {
                Ok(EditOutcome::Edited) => {
                    self.stats.renders += 1;
                    self.last_rendered = Some(message);
                    self.render_pending = false;
                    return;
                }
                Ok(EditOutcome::NotFound) => {
                    info!(
                        "status message {} is gone, posting a new one",
                        target.message_id
                    );
                }
                Err(e) => {
                    error!("failed to update status message: {e}");
                    self.stats.failures += 1;
                    self.render_pending = true;
                    return;
                }
            }
        }

        self.post_new(message).await;
    }

    async fn post_new(&mut self, message: Message) {
        let posted = match self.transport.send(&message).await {
            Ok(posted) => posted,
            Err(e) => {
                error!("failed to post status message: {e}");
                self.stats.failures += 1;
                self.render_pending = true;
                return;
            }
        };

        let state = NotificationState {
            channel_id: posted.channel_id,
            message_id: posted.message_id,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.store.save_notification_state(&state).await {
            warn!("failed to persist status message reference: {e}");
        }

        self.state = Some(state);
        self.last_rendered = Some(message);
        self.render_pending = false;
        self.stats.created += 1;
        self.stats.renders += 1;
    }

    /// Patch latency numbers into the existing message
    ///
    /// Never posts a message unless a full render is pending; failures are
    /// swallowed.
    async fn refresh_latency_only(&mut self, snapshot: &[ServiceRecord]) {
        if self.render_pending {
            debug!("retrying undelivered status render");
            self.render_full(snapshot).await;
            return;
        }

        let Some(target) = self.current_target() else {
            trace!("no status message to refresh");
            return;
        };

        let now = Utc::now();
        let message = match &self.last_rendered {
            Some(previous) => self.board.refresh_latency(previous, snapshot, now),
            None => self.board.render(snapshot, now),
        };

        match self.transport.edit(&target, &message).await {
            Ok(EditOutcome::Edited) => {
                self.stats.refreshes += 1;
                self.last_rendered = Some(message);
            }
            Ok(EditOutcome::NotFound) => {
                debug!("status message is gone, next transition posts a new one");
                self.state = None;
                self.last_rendered = None;
            }
            Err(e) => trace!("latency refresh skipped: {e}"),
        }
    }

    /// The stored message, if it lives in the configured channel
    fn current_target(&self) -> Option<MessageRef> {
        let state = self.state.as_ref()?;
        if state.channel_id != self.transport.channel_id() {
            debug!(
                "status message {} is in another channel, ignoring it",
                state.message_id
            );
            return None;
        }

        Some(MessageRef {
            channel_id: state.channel_id.clone(),
            message_id: state.message_id.clone(),
        })
    }
}

/// Handle for the NotifierActor
#[derive(Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<NotifierCommand>,
}

impl NotifierHandle {
    pub fn spawn(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn RecordStore>,
        board: StatusBoard,
    ) -> Self {
        Self::spawn_with_alerts(transport, store, board, Vec::new())
    }

    /// Like [`spawn`](Self::spawn), also posting an alert per transition to
    /// each of `alert_channels`
    pub fn spawn_with_alerts(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn RecordStore>,
        board: StatusBoard,
        alert_channels: Vec<String>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

        let mut actor = NotifierActor::new(transport, store, board, cmd_rx);
        actor.alert_channels = alert_channels;
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Hand a tick's transitions to the notifier without waiting for delivery
    pub fn notify_transitions(&self, events: Vec<StatusTransitionEvent>, snapshot: Vec<ServiceRecord>) {
        let cmd = NotifierCommand::TransitionBatch { events, snapshot };
        match self.sender.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                // Transitions must not be lost, queue them off the tick
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(cmd).await;
                });
            }
            Err(TrySendError::Closed(_)) => warn!("notifier stopped, transition batch dropped"),
        }
    }

    /// Ask for a latency-only refresh, skipped when the notifier is busy
    pub fn refresh_latency(&self, snapshot: Vec<ServiceRecord>) {
        if let Err(e) = self.sender.try_send(NotifierCommand::RefreshLatency { snapshot }) {
            trace!("latency refresh dropped: {e}");
        }
    }

    pub async fn state(&self) -> anyhow::Result<Option<NotificationState>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(NotifierCommand::GetState { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    pub async fn get_stats(&self) -> Option<NotifierStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(NotifierCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(NotifierCommand::Shutdown).await;
    }
}
