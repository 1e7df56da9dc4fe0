//! Reader SDK Abstraction
//!
//! Capability interface over the processor's closed-source hardware SDK.
//! Production binds it to the vendor runtime; tests and the kiosk demo use
//! [`crate::SimulatedReader`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use terminal_core::{ChargeIntent, Reader, Result};

use crate::backend::Backend;

/// Failure reported by the hardware SDK
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SdkError {
    /// SDK error code, when the SDK provides one
    pub code: Option<String>,
    pub message: String,
}

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Result type alias for SDK calls
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Unsolicited notifications from the SDK
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderEvent {
    UnexpectedDisconnect { reader_id: String },
}

/// Sink the SDK pushes [`ReaderEvent`]s into
pub type EventSender = mpsc::UnboundedSender<ReaderEvent>;

/// Output of a collect call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedPayment {
    /// Intent with the payment method attached. `None` means the SDK resolved
    /// without anything usable.
    pub payment_intent: Option<ChargeIntent>,
}

/// Connection-token callback handed to the SDK
///
/// Each call mints a new token through the backend.
#[derive(Clone)]
pub struct TokenSource {
    backend: Arc<dyn Backend>,
}

impl TokenSource {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn fetch(&self) -> Result<String> {
        let token = self.backend.connection_token().await?;
        tracing::debug!("Fetched connection token");
        Ok(token.secret)
    }
}

/// Hardware SDK capability interface
#[async_trait]
pub trait ReaderSdk: Send + Sync {
    /// Install the token callback and event sink before discovery
    fn initialize(&self, tokens: TokenSource, events: EventSender);

    /// Readers registered at a location
    async fn discover_readers(&self, location_id: &str) -> SdkResult<Vec<Reader>>;

    /// Pair with a discovered reader
    async fn connect_reader(&self, reader: &Reader) -> SdkResult<Reader>;

    /// Wait for the customer to present a card
    async fn collect_payment_method(&self, client_secret: &str) -> SdkResult<CollectedPayment>;

    /// Abort a pending collect from the client side
    async fn cancel_collect_payment_method(&self) -> SdkResult<()>;

    /// Confirm a collected intent with the processor
    async fn process_payment(&self, intent: &ChargeIntent) -> SdkResult<ChargeIntent>;

    /// Release the connected reader
    async fn disconnect_reader(&self) -> SdkResult<()>;

    /// SDK name
    fn name(&self) -> &str;
}
