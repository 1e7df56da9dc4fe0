//! Intent Gateway
//!
//! Thin mapping from backend operations onto the payment processor. The
//! gateway validates input before any external call and never caches intent
//! state: the processor is the only source of truth.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerminalError};
use crate::model::{
    ChargeIntent, ConnectionToken, CreatedIntent, DEFAULT_CURRENCY, IntentStatus, Location,
    ReaderState, validate_amount,
};
use crate::processor::PaymentProcessor;

/// How many intents list and bulk-cancel operations look at
pub const RECENT_INTENTS_LIMIT: u64 = 10;

/// Outcome of a best-effort bulk cancel
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllReport {
    /// Intents the processor confirmed as canceled
    pub canceled: Vec<ChargeIntent>,

    /// Intents whose cancel was rejected or errored
    pub failed: Vec<CancelFailure>,
}

impl CancelAllReport {
    pub fn attempted(&self) -> usize {
        self.canceled.len() + self.failed.len()
    }
}

/// One intent that could not be canceled
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelFailure {
    pub id: String,
    pub error: String,

    /// Status from the re-fetch, when it succeeded
    pub current_status: Option<IntentStatus>,
}

/// Gateway over a payment processor
pub struct IntentGateway<P: PaymentProcessor + ?Sized = dyn PaymentProcessor> {
    processor: Arc<P>,
    location_id: String,
    default_currency: String,
}

impl<P: PaymentProcessor + ?Sized> IntentGateway<P> {
    /// Create a gateway for the given processor and configured location
    pub fn new(processor: Arc<P>, location_id: impl Into<String>) -> Self {
        Self {
            processor,
            location_id: location_id.into(),
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Override the currency used when callers omit one
    #[must_use]
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into().to_lowercase();
        self
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Create a charge intent and hand back its client secret
    ///
    /// Amounts at or below the minimum are rejected before the processor is
    /// contacted. Failures are not retried: creation carries no idempotency
    /// key, so a blind retry could double-charge.
    pub async fn create_intent(&self, amount: i64, currency: &str) -> Result<CreatedIntent> {
        if let Err(err) = validate_amount(amount) {
            tracing::warn!(amount, "Rejected payment intent below minimum amount");
            return Err(err);
        }

        let intent = self.processor.create_intent(amount, currency).await?;
        let created = CreatedIntent::from_intent(&intent)?;

        tracing::info!(
            intent_id = %created.id,
            amount,
            currency = %intent.currency,
            "Created payment intent"
        );
        Ok(created)
    }

    /// Create a charge intent in the default currency
    pub async fn create_intent_default(&self, amount: i64) -> Result<CreatedIntent> {
        self.create_intent(amount, &self.default_currency).await
    }

    /// Mint a fresh connection token. Tokens are never cached.
    pub async fn mint_connection_token(&self) -> Result<ConnectionToken> {
        let token = self.processor.create_connection_token().await?;
        tracing::debug!("Minted connection token");
        Ok(token)
    }

    /// Configured terminal location
    pub fn location_id(&self) -> Result<&str> {
        let id = self.location_id.trim();
        if id.is_empty() {
            return Err(TerminalError::Config("terminal location id not set".into()));
        }
        Ok(id)
    }

    /// Confirm the configured location exists on the processor
    pub async fn verify_location(&self) -> Result<Location> {
        let location_id = self.location_id()?;
        let locations = self.processor.list_locations().await?;

        locations
            .into_iter()
            .find(|loc| loc.id == location_id)
            .ok_or_else(|| TerminalError::LocationNotFound(location_id.to_string()))
    }

    /// Most recent intents, newest first
    pub async fn list_recent_intents(&self, limit: u64) -> Result<Vec<ChargeIntent>> {
        self.processor.list_intents(limit).await
    }

    /// Cancel an intent, degrading a rejection into its current status
    ///
    /// When the processor refuses the cancel, the intent is re-fetched and
    /// `NotCancelable` reports the fresh status. If the re-fetch fails too,
    /// the processor error is returned.
    pub async fn cancel_intent(&self, id: &str) -> Result<ChargeIntent> {
        match self.processor.cancel_intent(id).await {
            Ok(intent) => {
                tracing::info!(intent_id = %intent.id, "Payment intent canceled");
                Ok(intent)
            }
            Err(cancel_err) => {
                tracing::warn!(
                    intent_id = %id,
                    error = %cancel_err,
                    "Cancel rejected, re-fetching intent"
                );
                let current = self.processor.retrieve_intent(id).await?;
                Err(TerminalError::NotCancelable {
                    id: current.id,
                    current_status: current.status,
                })
            }
        }
    }

    /// Attempt to cancel each of the most recent intents independently
    pub async fn cancel_all_recent_intents(&self, limit: u64) -> Result<CancelAllReport> {
        let intents = self.processor.list_intents(limit).await?;
        if intents.is_empty() {
            return Err(TerminalError::NoIntents);
        }

        let mut report = CancelAllReport::default();
        for intent in intents {
            match self.cancel_intent(&intent.id).await {
                Ok(canceled) => report.canceled.push(canceled),
                Err(err) => {
                    tracing::error!(
                        intent_id = %intent.id,
                        error = %err,
                        "Error canceling payment intent"
                    );
                    let current_status = match &err {
                        TerminalError::NotCancelable { current_status, .. } => {
                            Some(*current_status)
                        }
                        _ => None,
                    };
                    report.failed.push(CancelFailure {
                        id: intent.id,
                        error: err.to_string(),
                        current_status,
                    });
                }
            }
        }

        tracing::info!(
            canceled = report.canceled.len(),
            failed = report.failed.len(),
            "Bulk cancel finished"
        );
        Ok(report)
    }

    /// Server-side cancel of the reader's in-flight action
    pub async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState> {
        if reader_id.trim().is_empty() {
            return Err(TerminalError::ReaderAction {
                reader_id: String::new(),
                message: "reader_id is required".into(),
            });
        }

        match self.processor.cancel_reader_action(reader_id).await {
            Ok(state) => {
                tracing::info!(reader_id = %reader_id, "Reader action canceled");
                Ok(state)
            }
            Err(TerminalError::Processor(message)) => Err(TerminalError::ReaderAction {
                reader_id: reader_id.to_string(),
                message,
            }),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{MemoryProcessor, ProcessorCall};

    fn gateway() -> IntentGateway<MemoryProcessor> {
        let processor = MemoryProcessor::new()
            .with_location("tml_main", "Front counter")
            .with_reader("tmr_counter");
        IntentGateway::new(Arc::new(processor), "tml_main")
    }

    #[tokio::test]
    async fn test_small_amounts_never_reach_processor() {
        let gateway = gateway();
        for amount in [-1, 0, 1, 49, 50] {
            let err = gateway.create_intent(amount, "eur").await.unwrap_err();
            assert!(matches!(err, TerminalError::InvalidAmount { .. }));
        }
        assert!(gateway.processor().calls().is_empty());
    }

    #[tokio::test]
    async fn test_valid_amount_returns_opaque_secret() {
        let gateway = gateway();
        for amount in [51, 1500, 999_999] {
            let created = gateway.create_intent(amount, "eur").await.unwrap();
            assert!(!created.client_secret.is_empty());
            assert_ne!(created.client_secret, created.id);
        }
    }

    #[tokio::test]
    async fn test_default_currency_applies() {
        let gateway = gateway().with_default_currency("USD");
        gateway.create_intent_default(1500).await.unwrap();
        assert_eq!(
            gateway.processor().calls(),
            vec![ProcessorCall::CreateIntent {
                amount: 1500,
                currency: "usd".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_processor_failure_is_not_retried() {
        let gateway = gateway();
        gateway.processor().set_outage(Some("boom")).unwrap();

        let err = gateway.create_intent(1500, "eur").await.unwrap_err();
        assert_eq!(err, TerminalError::Processor("boom".into()));
        assert_eq!(
            gateway
                .processor()
                .count_calls(|c| matches!(c, ProcessorCall::CreateIntent { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_each_token_is_fresh() {
        let gateway = gateway();
        let first = gateway.mint_connection_token().await.unwrap();
        let second = gateway.mint_connection_token().await.unwrap();
        assert_ne!(first.secret, second.secret);
        assert_eq!(
            gateway
                .processor()
                .count_calls(|c| matches!(c, ProcessorCall::CreateConnectionToken)),
            2
        );
    }

    #[test]
    fn test_blank_location_is_config_error() {
        let gateway = IntentGateway::new(Arc::new(MemoryProcessor::new()), "  ");
        assert!(matches!(gateway.location_id(), Err(TerminalError::Config(_))));
    }

    #[tokio::test]
    async fn test_verify_location() {
        let gateway = gateway();
        let location = gateway.verify_location().await.unwrap();
        assert_eq!(location.display_name.as_deref(), Some("Front counter"));

        let missing = IntentGateway::new(Arc::new(MemoryProcessor::new()), "tml_gone");
        assert_eq!(
            missing.verify_location().await.unwrap_err(),
            TerminalError::LocationNotFound("tml_gone".into())
        );
    }

    #[tokio::test]
    async fn test_cancel_succeeded_intent_reports_current_status() {
        let gateway = gateway();
        let created = gateway.create_intent(1500, "eur").await.unwrap();
        gateway
            .processor()
            .set_status(&created.id, IntentStatus::Succeeded)
            .unwrap();

        let err = gateway.cancel_intent(&created.id).await.unwrap_err();
        assert_eq!(
            err,
            TerminalError::NotCancelable {
                id: created.id.clone(),
                current_status: IntentStatus::Succeeded,
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_pending_intent() {
        let gateway = gateway();
        let created = gateway.create_intent(1500, "eur").await.unwrap();

        let canceled = gateway.cancel_intent(&created.id).await.unwrap();
        assert_eq!(canceled.status, IntentStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_all_isolates_failures() {
        let gateway = gateway();
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(gateway.create_intent(100 + i, "eur").await.unwrap().id);
        }
        gateway.processor().fail_cancel_for(&ids[3]).unwrap();

        let report = gateway
            .cancel_all_recent_intents(RECENT_INTENTS_LIMIT)
            .await
            .unwrap();

        assert_eq!(report.attempted(), 10);
        assert_eq!(report.canceled.len(), 9);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, ids[3]);
        assert_eq!(
            report.failed[0].current_status,
            Some(IntentStatus::RequiresPaymentMethod)
        );
        assert_eq!(
            gateway
                .processor()
                .count_calls(|c| matches!(c, ProcessorCall::CancelIntent(_))),
            10
        );
    }

    #[tokio::test]
    async fn test_cancel_all_with_no_intents() {
        let gateway = gateway();
        assert_eq!(
            gateway.cancel_all_recent_intents(10).await.unwrap_err(),
            TerminalError::NoIntents
        );
    }

    #[tokio::test]
    async fn test_reader_action_error_passes_message_through() {
        let gateway = gateway();
        gateway.cancel_reader_action("tmr_counter").await.unwrap();

        let err = gateway.cancel_reader_action("tmr_unknown").await.unwrap_err();
        assert_eq!(
            err,
            TerminalError::ReaderAction {
                reader_id: "tmr_unknown".into(),
                message: "No such terminal.reader: 'tmr_unknown'".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_blank_reader_id_rejected_locally() {
        let gateway = gateway();
        assert!(gateway.cancel_reader_action("").await.is_err());
        assert!(gateway.processor().calls().is_empty());
    }
}
