//! Reader Session Controller
//!
//! Drives a [`ReaderSession`] from `Disconnected` to `Connected`:
//!
//! ```text
//! Disconnected ──▶ TokenPending ──▶ Discovering ──▶ Connecting ──▶ Connected
//!      ▲                                  │               │            │
//!      └──────────── error ───────────────┴───────────────┘            │
//!      └────────────────────── unexpected disconnect ──────────────────┘
//! ```

use std::sync::Arc;

use terminal_core::{Reader, Result, TerminalError};

use crate::alerts::{Alert, OperatorAlerts};
use crate::backend::Backend;
use crate::sdk::{ReaderEvent, ReaderSdk, TokenSource};
use crate::session::{ConnectionState, ReaderSession};

/// Establishes and tears down reader connections
pub struct ReaderController {
    sdk: Arc<dyn ReaderSdk>,
    backend: Arc<dyn Backend>,
    alerts: Arc<dyn OperatorAlerts>,
}

impl ReaderController {
    pub fn new(
        sdk: Arc<dyn ReaderSdk>,
        backend: Arc<dyn Backend>,
        alerts: Arc<dyn OperatorAlerts>,
    ) -> Self {
        Self {
            sdk,
            backend,
            alerts,
        }
    }

    /// Connect the session to the first reader at the configured location
    ///
    /// Already-connected sessions return their reader without touching the SDK.
    /// Any failure leaves the session `Disconnected`.
    pub async fn connect(&self, session: &mut ReaderSession) -> Result<Reader> {
        self.poll_events(session);
        if let (true, Some(reader)) = (session.is_connected(), session.reader()) {
            return Ok(reader.clone());
        }

        match self.establish(session).await {
            Ok(reader) => Ok(reader),
            Err(err) => {
                session.mark_disconnected();
                Err(err)
            }
        }
    }

    async fn establish(&self, session: &mut ReaderSession) -> Result<Reader> {
        session.set_state(ConnectionState::TokenPending);
        self.sdk.initialize(
            TokenSource::new(Arc::clone(&self.backend)),
            session.event_sender(),
        );

        session.set_state(ConnectionState::Discovering);
        let location_id = self.backend.location_id().await?;
        let readers = self
            .sdk
            .discover_readers(&location_id)
            .await
            .map_err(|e| TerminalError::Discovery(e.message))?;

        let Some(first) = readers.into_iter().next() else {
            tracing::warn!(location_id = %location_id, "No readers found");
            return Err(TerminalError::NoReadersFound {
                location: location_id,
            });
        };

        session.set_state(ConnectionState::Connecting);
        let reader = self
            .sdk
            .connect_reader(&first)
            .await
            .map_err(|e| TerminalError::ReaderConnect(e.message))?;

        tracing::info!(
            reader_id = %reader.id,
            serial_number = reader.serial_number.as_deref().unwrap_or("unknown"),
            location_id = %location_id,
            sdk = self.sdk.name(),
            "Connected to reader"
        );
        session.mark_connected(reader.clone(), location_id);
        Ok(reader)
    }

    /// Apply queued SDK events; an unexpected disconnect alerts the operator
    pub fn poll_events(&self, session: &mut ReaderSession) {
        while let Some(event) = session.try_next_event() {
            match event {
                ReaderEvent::UnexpectedDisconnect { reader_id } => {
                    if session.state() == ConnectionState::Disconnected {
                        continue;
                    }
                    tracing::warn!(reader_id = %reader_id, "Reader disconnected unexpectedly");
                    session.mark_disconnected();
                    self.alerts
                        .alert(Alert::from_error(&TerminalError::ReaderDisconnected));
                }
            }
        }
    }

    /// Release the reader
    pub async fn disconnect(&self, session: &mut ReaderSession) -> Result<()> {
        if session.state() == ConnectionState::Disconnected {
            return Ok(());
        }
        let result = self.sdk.disconnect_reader().await;
        session.mark_disconnected();
        result.map_err(|e| TerminalError::ReaderConnect(e.message))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alerts::MemoryAlerts;
    use crate::simulated::SimulatedReader;
    use terminal_core::{IntentGateway, MemoryProcessor};

    fn controller(sdk: &Arc<SimulatedReader>, alerts: &Arc<MemoryAlerts>) -> ReaderController {
        let gateway = IntentGateway::new(Arc::new(MemoryProcessor::new()), "tml_counter");
        ReaderController::new(sdk.clone(), Arc::new(gateway), alerts.clone())
    }

    #[tokio::test]
    async fn test_connect_first_reader() {
        let sdk = Arc::new(SimulatedReader::new().with_readers(["tmr_a", "tmr_b"]));
        let alerts = Arc::new(MemoryAlerts::new());
        let controller = controller(&sdk, &alerts);
        let mut session = ReaderSession::new();

        let reader = controller.connect(&mut session).await.unwrap();

        assert_eq!(reader.id, "tmr_a");
        assert_eq!(reader.serial_number.as_deref(), Some("WSC513000001"));
        assert_eq!(sdk.connected_reader(), Some(reader));
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.location_id(), Some("tml_counter"));
        assert_eq!(sdk.discovered_locations(), vec!["tml_counter"]);
        assert_eq!(sdk.token_fetches(), 1);
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let sdk = Arc::new(SimulatedReader::new());
        let alerts = Arc::new(MemoryAlerts::new());
        let controller = controller(&sdk, &alerts);
        let mut session = ReaderSession::new();

        controller.connect(&mut session).await.unwrap();
        controller.connect(&mut session).await.unwrap();

        assert_eq!(sdk.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_discovery() {
        let sdk = Arc::new(SimulatedReader::new().with_readers(Vec::<&str>::new()));
        let alerts = Arc::new(MemoryAlerts::new());
        let controller = controller(&sdk, &alerts);
        let mut session = ReaderSession::new();

        let err = controller.connect(&mut session).await.unwrap_err();

        assert_eq!(
            err,
            TerminalError::NoReadersFound {
                location: "tml_counter".into()
            }
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(sdk.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_discovery_and_connect_failures() {
        let alerts = Arc::new(MemoryAlerts::new());

        let sdk = Arc::new(SimulatedReader::new().failing_discovery("bluetooth off"));
        let err = controller(&sdk, &alerts)
            .connect(&mut ReaderSession::new())
            .await
            .unwrap_err();
        assert_eq!(err, TerminalError::Discovery("bluetooth off".into()));

        let sdk = Arc::new(SimulatedReader::new().failing_connect("reader busy"));
        let mut session = ReaderSession::new();
        let err = controller(&sdk, &alerts)
            .connect(&mut session)
            .await
            .unwrap_err();
        assert_eq!(err, TerminalError::ReaderConnect("reader busy".into()));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unexpected_disconnect_while_idle() {
        let sdk = Arc::new(SimulatedReader::new());
        let alerts = Arc::new(MemoryAlerts::new());
        let controller = controller(&sdk, &alerts);
        let mut session = ReaderSession::new();
        controller.connect(&mut session).await.unwrap();

        sdk.simulate_disconnect();
        controller.poll_events(&mut session);

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(alerts.alerts().len(), 1);
        assert_eq!(
            alerts.alerts()[0].code,
            Some(TerminalError::ReaderDisconnected.code())
        );

        // Reconnect is explicit
        controller.connect(&mut session).await.unwrap();
        assert_eq!(sdk.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let sdk = Arc::new(SimulatedReader::new());
        let alerts = Arc::new(MemoryAlerts::new());
        let controller = controller(&sdk, &alerts);
        let mut session = ReaderSession::new();
        controller.connect(&mut session).await.unwrap();

        controller.disconnect(&mut session).await.unwrap();

        assert!(session.reader().is_none());
        assert_eq!(sdk.disconnect_calls(), 1);
    }
}
