//! Payment Processor Integration
//!
//! Abstraction over the processor's server-side API. The gateway only ever
//! talks to the processor through this trait.

mod memory;

pub use memory::{MemoryProcessor, ProcessorCall};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ChargeIntent, ConnectionToken, Location, ReaderState};

/// Processor client trait (Strategy pattern)
///
/// Implementations map their own failures to `TerminalError::Processor`
/// carrying the upstream message. `cancel_reader_action` failures map to
/// `TerminalError::ReaderAction` instead.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a card-present intent with automatic capture
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<ChargeIntent>;

    /// List the most recent intents, newest first
    async fn list_intents(&self, limit: u64) -> Result<Vec<ChargeIntent>>;

    /// Fetch the current state of one intent
    async fn retrieve_intent(&self, id: &str) -> Result<ChargeIntent>;

    /// Ask the processor to cancel an intent
    async fn cancel_intent(&self, id: &str) -> Result<ChargeIntent>;

    /// Mint a fresh reader connection token
    async fn create_connection_token(&self) -> Result<ConnectionToken>;

    /// Cancel whatever the reader is currently doing
    async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState>;

    /// List configured terminal locations
    async fn list_locations(&self) -> Result<Vec<Location>>;

    /// Processor name
    fn name(&self) -> &str;
}
