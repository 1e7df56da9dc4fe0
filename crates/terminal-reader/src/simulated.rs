//! Simulated Reader
//!
//! Deterministic [`ReaderSdk`] for tests and the kiosk demo. Behaviour is
//! fixed at construction; every call is counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use terminal_core::{ChargeIntent, IntentStatus, Reader};

use crate::sdk::{
    CollectedPayment, EventSender, ReaderEvent, ReaderSdk, SdkError, SdkResult, TokenSource,
};

/// What the customer does when asked to tap
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapBehavior {
    Immediate,
    After(Duration),
    Never,
    /// SDK error with this message
    Decline(String),
    /// Collect resolves without a payment intent
    NoIntent,
}

/// What processing a collected intent yields
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessBehavior {
    Succeed,
    Fail(String),
    Status(IntentStatus),
}

#[derive(Default)]
struct Counters {
    token_fetches: AtomicUsize,
    connect: AtomicUsize,
    collect: AtomicUsize,
    cancel_collect: AtomicUsize,
    process: AtomicUsize,
    disconnect: AtomicUsize,
}

/// In-process stand-in for the hardware SDK
pub struct SimulatedReader {
    readers: Vec<String>,
    discovery_error: Option<String>,
    connect_error: Option<String>,
    tap: TapBehavior,
    process: ProcessBehavior,
    wiring: Mutex<Option<(TokenSource, EventSender)>>,
    connected: Mutex<Option<Reader>>,
    discovered_locations: Mutex<Vec<String>>,
    counters: Counters,
}

impl Default for SimulatedReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedReader {
    /// One reader that accepts the card as soon as collection starts
    pub fn new() -> Self {
        Self {
            readers: vec!["tmr_simulated_wisepos_e".to_string()],
            discovery_error: None,
            connect_error: None,
            tap: TapBehavior::Immediate,
            process: ProcessBehavior::Succeed,
            wiring: Mutex::new(None),
            connected: Mutex::new(None),
            discovered_locations: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn with_readers<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readers = ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_tap(mut self, tap: TapBehavior) -> Self {
        self.tap = tap;
        self
    }

    #[must_use]
    pub fn with_process(mut self, process: ProcessBehavior) -> Self {
        self.process = process;
        self
    }

    #[must_use]
    pub fn failing_discovery(mut self, message: impl Into<String>) -> Self {
        self.discovery_error = Some(message.into());
        self
    }

    #[must_use]
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Drop the connection as if the reader lost power
    ///
    /// Returns `false` when nothing was connected.
    pub fn simulate_disconnect(&self) -> bool {
        let Some(reader) = self.connected.lock().ok().and_then(|mut c| c.take()) else {
            return false;
        };
        let events = self
            .wiring
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(|(_, events)| events.clone()));
        events.is_some_and(|events| {
            events
                .send(ReaderEvent::UnexpectedDisconnect {
                    reader_id: reader.id,
                })
                .is_ok()
        })
    }

    pub fn connected_reader(&self) -> Option<Reader> {
        self.connected.lock().ok().and_then(|c| c.clone())
    }

    pub fn discovered_locations(&self) -> Vec<String> {
        self.discovered_locations
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn token_fetches(&self) -> usize {
        self.counters.token_fetches.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.counters.connect.load(Ordering::SeqCst)
    }

    pub fn collect_calls(&self) -> usize {
        self.counters.collect.load(Ordering::SeqCst)
    }

    pub fn cancel_collect_calls(&self) -> usize {
        self.counters.cancel_collect.load(Ordering::SeqCst)
    }

    pub fn process_calls(&self) -> usize {
        self.counters.process.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.counters.disconnect.load(Ordering::SeqCst)
    }

    fn token_source(&self) -> Option<TokenSource> {
        self.wiring
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(|(tokens, _)| tokens.clone()))
    }
}

/// Intent id embedded in a `{id}_secret_{...}` client secret
fn intent_id_from_secret(client_secret: &str) -> &str {
    client_secret
        .split_once("_secret_")
        .map_or(client_secret, |(id, _)| id)
}

#[async_trait]
impl ReaderSdk for SimulatedReader {
    fn initialize(&self, tokens: TokenSource, events: EventSender) {
        if let Ok(mut wiring) = self.wiring.lock() {
            *wiring = Some((tokens, events));
        }
    }

    async fn discover_readers(&self, location_id: &str) -> SdkResult<Vec<Reader>> {
        if let Ok(mut locations) = self.discovered_locations.lock() {
            locations.push(location_id.to_string());
        }
        if let Some(message) = &self.discovery_error {
            return Err(SdkError::with_code("discovery_failed", message.clone()));
        }
        Ok(self
            .readers
            .iter()
            .enumerate()
            .map(|(index, id)| {
                Reader::new(id.clone())
                    .at_location(location_id)
                    .with_label("Simulated WisePOS E")
                    .with_serial_number(format!("WSC513{:06}", index + 1))
            })
            .collect())
    }

    async fn connect_reader(&self, reader: &Reader) -> SdkResult<Reader> {
        self.counters.connect.fetch_add(1, Ordering::SeqCst);

        let tokens = self
            .token_source()
            .ok_or_else(|| SdkError::with_code("not_initialized", "SDK not initialized"))?;
        tokens
            .fetch()
            .await
            .map_err(|e| SdkError::with_code("connection_token_failed", e.to_string()))?;
        self.counters.token_fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.connect_error {
            return Err(SdkError::with_code("connect_failed", message.clone()));
        }
        if let Ok(mut connected) = self.connected.lock() {
            *connected = Some(reader.clone());
        }
        Ok(reader.clone())
    }

    async fn collect_payment_method(&self, client_secret: &str) -> SdkResult<CollectedPayment> {
        self.counters.collect.fetch_add(1, Ordering::SeqCst);

        let collected = ChargeIntent {
            id: intent_id_from_secret(client_secret).to_string(),
            amount: 0,
            currency: String::new(),
            status: IntentStatus::RequiresConfirmation,
            client_secret: Some(client_secret.to_string()),
            created: 0,
        };

        match &self.tap {
            TapBehavior::Immediate => {}
            TapBehavior::After(delay) => tokio::time::sleep(*delay).await,
            TapBehavior::Never => std::future::pending::<()>().await,
            TapBehavior::Decline(message) => {
                return Err(SdkError::with_code("card_declined", message.clone()));
            }
            TapBehavior::NoIntent => {
                return Ok(CollectedPayment {
                    payment_intent: None,
                })
            }
        }

        Ok(CollectedPayment {
            payment_intent: Some(collected),
        })
    }

    async fn cancel_collect_payment_method(&self) -> SdkResult<()> {
        self.counters.cancel_collect.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process_payment(&self, intent: &ChargeIntent) -> SdkResult<ChargeIntent> {
        self.counters.process.fetch_add(1, Ordering::SeqCst);

        let status = match &self.process {
            ProcessBehavior::Succeed => IntentStatus::Succeeded,
            ProcessBehavior::Status(status) => *status,
            ProcessBehavior::Fail(message) => {
                return Err(SdkError::with_code("payment_failed", message.clone()));
            }
        };
        Ok(ChargeIntent {
            status,
            ..intent.clone()
        })
    }

    async fn disconnect_reader(&self) -> SdkResult<()> {
        self.counters.disconnect.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut connected) = self.connected.lock() {
            *connected = None;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Simulated"
    }
}
