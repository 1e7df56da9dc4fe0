//! In-memory Payment Processor
//!
//! For testing and local demos. Mimics the processor's cancel rules and
//! records every call so tests can assert what reached the "network".

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::PaymentProcessor;
use crate::error::{Result, TerminalError};
use crate::model::{ChargeIntent, ConnectionToken, IntentStatus, Location, ReaderState};

/// A call that reached the processor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorCall {
    CreateIntent { amount: i64, currency: String },
    ListIntents { limit: u64 },
    RetrieveIntent(String),
    CancelIntent(String),
    CreateConnectionToken,
    CancelReaderAction(String),
    ListLocations,
}

/// In-memory processor with failure injection
pub struct MemoryProcessor {
    /// Oldest first
    intents: RwLock<Vec<ChargeIntent>>,
    locations: RwLock<Vec<Location>>,
    readers: RwLock<HashSet<String>>,
    failing_cancels: RwLock<HashSet<String>>,
    outage: RwLock<Option<String>>,
    calls: RwLock<Vec<ProcessorCall>>,
}

impl Default for MemoryProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> TerminalError {
    TerminalError::Processor("memory processor state poisoned".into())
}

impl MemoryProcessor {
    pub fn new() -> Self {
        Self {
            intents: RwLock::new(Vec::new()),
            locations: RwLock::new(Vec::new()),
            readers: RwLock::new(HashSet::new()),
            failing_cancels: RwLock::new(HashSet::new()),
            outage: RwLock::new(None),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Register a terminal location
    #[must_use]
    pub fn with_location(self, id: &str, display_name: &str) -> Self {
        if let Ok(mut locations) = self.locations.write() {
            locations.push(Location {
                id: id.to_string(),
                display_name: Some(display_name.to_string()),
            });
        }
        self
    }

    /// Register a reader that accepts server-side actions
    #[must_use]
    pub fn with_reader(self, reader_id: &str) -> Self {
        if let Ok(mut readers) = self.readers.write() {
            readers.insert(reader_id.to_string());
        }
        self
    }

    /// Seed an intent as the newest one
    pub fn insert_intent(&self, intent: ChargeIntent) -> Result<()> {
        self.intents.write().map_err(|_| poisoned())?.push(intent);
        Ok(())
    }

    /// Force an intent into a status, as the processor would after capture
    pub fn set_status(&self, id: &str, status: IntentStatus) -> Result<()> {
        let mut intents = self.intents.write().map_err(|_| poisoned())?;
        let intent = intents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| TerminalError::Processor(format!("No such payment_intent: '{id}'")))?;
        intent.status = status;
        Ok(())
    }

    /// Make every cancel of this intent fail
    pub fn fail_cancel_for(&self, id: &str) -> Result<()> {
        self.failing_cancels
            .write()
            .map_err(|_| poisoned())?
            .insert(id.to_string());
        Ok(())
    }

    /// Fail all calls with `message`, or recover with `None`
    pub fn set_outage(&self, message: Option<&str>) -> Result<()> {
        *self.outage.write().map_err(|_| poisoned())? = message.map(str::to_string);
        Ok(())
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls that match
    pub fn count_calls(&self, predicate: impl Fn(&ProcessorCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    /// Current snapshot of an intent
    pub fn intent(&self, id: &str) -> Option<ChargeIntent> {
        self.intents
            .read()
            .ok()
            .and_then(|intents| intents.iter().find(|i| i.id == id).cloned())
    }

    fn record(&self, call: ProcessorCall) -> Result<()> {
        self.calls.write().map_err(|_| poisoned())?.push(call);
        match self.outage.read().map_err(|_| poisoned())?.as_deref() {
            Some(message) => Err(TerminalError::Processor(message.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MemoryProcessor {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<ChargeIntent> {
        self.record(ProcessorCall::CreateIntent {
            amount,
            currency: currency.to_string(),
        })?;

        let id = format!("pi_{}", &Uuid::new_v4().simple().to_string()[..24]);
        let intent = ChargeIntent {
            client_secret: Some(format!("{id}_secret_{}", Uuid::new_v4().simple())),
            id,
            amount,
            currency: currency.to_lowercase(),
            status: IntentStatus::RequiresPaymentMethod,
            created: Utc::now().timestamp(),
        };
        self.insert_intent(intent.clone())?;
        Ok(intent)
    }

    async fn list_intents(&self, limit: u64) -> Result<Vec<ChargeIntent>> {
        self.record(ProcessorCall::ListIntents { limit })?;
        let intents = self.intents.read().map_err(|_| poisoned())?;
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(intents.iter().rev().take(take).cloned().collect())
    }

    async fn retrieve_intent(&self, id: &str) -> Result<ChargeIntent> {
        self.record(ProcessorCall::RetrieveIntent(id.to_string()))?;
        self.intent(id)
            .ok_or_else(|| TerminalError::Processor(format!("No such payment_intent: '{id}'")))
    }

    async fn cancel_intent(&self, id: &str) -> Result<ChargeIntent> {
        self.record(ProcessorCall::CancelIntent(id.to_string()))?;

        if self.failing_cancels.read().map_err(|_| poisoned())?.contains(id) {
            return Err(TerminalError::Processor(format!(
                "Cancel of payment_intent '{id}' failed"
            )));
        }

        let mut intents = self.intents.write().map_err(|_| poisoned())?;
        let intent = intents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| TerminalError::Processor(format!("No such payment_intent: '{id}'")))?;

        if intent.status.is_terminal() {
            return Err(TerminalError::Processor(format!(
                "You cannot cancel this PaymentIntent because it has a status of {}.",
                intent.status
            )));
        }

        intent.status = IntentStatus::Canceled;
        Ok(intent.clone())
    }

    async fn create_connection_token(&self) -> Result<ConnectionToken> {
        self.record(ProcessorCall::CreateConnectionToken)?;
        Ok(ConnectionToken {
            secret: format!("pst_test_{}", Uuid::new_v4().simple()),
        })
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState> {
        if let Err(err) = self.record(ProcessorCall::CancelReaderAction(reader_id.to_string())) {
            let message = match err {
                TerminalError::Processor(message) => message,
                other => other.to_string(),
            };
            return Err(TerminalError::ReaderAction {
                reader_id: reader_id.to_string(),
                message,
            });
        }

        let known = self
            .readers
            .read()
            .map_err(|_| poisoned())?
            .contains(reader_id);
        if !known {
            return Err(TerminalError::ReaderAction {
                reader_id: reader_id.to_string(),
                message: format!("No such terminal.reader: '{reader_id}'"),
            });
        }

        Ok(ReaderState {
            id: reader_id.to_string(),
            label: None,
            status: Some("online".into()),
            action: None,
        })
    }

    async fn list_locations(&self) -> Result<Vec<Location>> {
        self.record(ProcessorCall::ListLocations)?;
        Ok(self.locations.read().map_err(|_| poisoned())?.clone())
    }

    fn name(&self) -> &str {
        "MemoryProcessor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_intent_has_secret() {
        let processor = MemoryProcessor::new();
        let intent = processor.create_intent(1500, "EUR").await.unwrap();

        assert!(intent.id.starts_with("pi_"));
        assert_eq!(intent.currency, "eur");
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert!(intent.client_secret.unwrap().starts_with(&intent.id));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let processor = MemoryProcessor::new();
        let first = processor.create_intent(100, "eur").await.unwrap();
        let second = processor.create_intent(200, "eur").await.unwrap();

        let listed = processor.list_intents(10).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(processor.list_intents(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_rejected_after_success() {
        let processor = MemoryProcessor::new();
        let intent = processor.create_intent(1500, "eur").await.unwrap();
        processor.set_status(&intent.id, IntentStatus::Succeeded).unwrap();

        assert!(processor.cancel_intent(&intent.id).await.is_err());
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let processor = MemoryProcessor::new();
        processor.set_outage(Some("api down")).unwrap();

        let err = processor.create_connection_token().await.unwrap_err();
        assert_eq!(err, TerminalError::Processor("api down".into()));
        assert_eq!(processor.calls(), vec![ProcessorCall::CreateConnectionToken]);
    }

    #[tokio::test]
    async fn test_unknown_reader_action_fails() {
        let processor = MemoryProcessor::new().with_reader("tmr_known");

        assert!(processor.cancel_reader_action("tmr_known").await.is_ok());
        let err = processor.cancel_reader_action("tmr_other").await.unwrap_err();
        assert!(matches!(err, TerminalError::ReaderAction { .. }));
    }
}
