//! Reader Session
//!
//! Explicit context for one terminal connection. The caller owns it and
//! passes it to each workflow step; nothing about the reader, the active
//! intent or the last attempt lives in globals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use terminal_core::{CreatedIntent, Reader, Result, TerminalError};

use crate::race::CollectionAttempt;
use crate::sdk::{EventSender, ReaderEvent};

/// Connection lifecycle of a reader session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    TokenPending,
    Discovering,
    Connecting,
    Connected,
    Collecting,
}

/// Live connection to a physical terminal
pub struct ReaderSession {
    id: Uuid,
    state: ConnectionState,
    reader: Option<Reader>,
    location_id: Option<String>,
    connected_at: Option<DateTime<Utc>>,
    active_intent: Option<CreatedIntent>,
    last_attempt: Option<CollectionAttempt>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<ReaderEvent>,
}

impl Default for ReaderSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderSession {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Disconnected,
            reader: None,
            location_id: None,
            connected_at: None,
            active_intent: None,
            last_attempt: None,
            events_tx,
            events_rx,
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connected reader, if any
    pub const fn reader(&self) -> Option<&Reader> {
        self.reader.as_ref()
    }

    /// Last location discovery ran against
    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    pub const fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub const fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Collecting
        )
    }

    /// Intent the current payment is collecting for
    pub const fn active_intent(&self) -> Option<&CreatedIntent> {
        self.active_intent.as_ref()
    }

    pub const fn last_attempt(&self) -> Option<&CollectionAttempt> {
        self.last_attempt.as_ref()
    }

    /// Sender handed to the SDK for unsolicited events
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        tracing::debug!(
            session_id = %self.id,
            from = ?self.state,
            to = ?state,
            "Reader session transition"
        );
        self.state = state;
    }

    pub(crate) fn mark_connected(&mut self, reader: Reader, location_id: String) {
        self.set_state(ConnectionState::Connected);
        self.reader = Some(reader);
        self.location_id = Some(location_id);
        self.connected_at = Some(Utc::now());
    }

    /// Tear the session down; it must be re-established explicitly
    pub(crate) fn mark_disconnected(&mut self) {
        self.set_state(ConnectionState::Disconnected);
        self.reader = None;
        self.connected_at = None;
    }

    /// Enter `Collecting`, enforcing one collection per session
    pub(crate) fn begin_collecting(&mut self) -> Result<Reader> {
        match (self.state, &self.reader) {
            (ConnectionState::Connected, Some(reader)) => {
                let reader = reader.clone();
                self.set_state(ConnectionState::Collecting);
                Ok(reader)
            }
            (ConnectionState::Collecting, Some(reader)) => {
                Err(TerminalError::CollectionInFlight(reader.id.clone()))
            }
            _ => Err(TerminalError::ReaderDisconnected),
        }
    }

    /// Back to idle, unless a disconnect already tore the session down
    pub(crate) fn end_collecting(&mut self) {
        if self.state == ConnectionState::Collecting {
            self.set_state(ConnectionState::Connected);
        }
    }

    pub(crate) fn set_active_intent(&mut self, intent: CreatedIntent) {
        self.active_intent = Some(intent);
    }

    pub(crate) fn clear_active_intent(&mut self) -> Option<CreatedIntent> {
        self.active_intent.take()
    }

    pub(crate) fn record_attempt(&mut self, attempt: CollectionAttempt) {
        self.last_attempt = Some(attempt);
    }

    /// Wait for the next SDK event
    pub(crate) async fn next_event(&mut self) -> Option<ReaderEvent> {
        self.events_rx.recv().await
    }

    /// Take an already-queued SDK event without waiting
    pub(crate) fn try_next_event(&mut self) -> Option<ReaderEvent> {
        self.events_rx.try_recv().ok()
    }
}
