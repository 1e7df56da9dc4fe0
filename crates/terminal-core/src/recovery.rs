//! Administrative Recovery Operations
//!
//! Operator-triggered cleanup for terminals left in a bad state after a crash
//! or an abandoned session. Nothing here is scheduled; every operation runs on
//! demand and re-reads the processor.

use crate::error::{Result, TerminalError};
use crate::gateway::{CancelAllReport, IntentGateway, RECENT_INTENTS_LIMIT};
use crate::model::ChargeIntent;
use crate::processor::PaymentProcessor;

/// Recovery operations borrowed from a gateway
pub struct RecoveryOps<'a, P: PaymentProcessor + ?Sized> {
    gateway: &'a IntentGateway<P>,
}

impl<'a, P: PaymentProcessor + ?Sized> RecoveryOps<'a, P> {
    pub const fn new(gateway: &'a IntentGateway<P>) -> Self {
        Self { gateway }
    }

    /// The most recent payments, for reconciliation
    pub async fn recent_payments(&self) -> Result<Vec<ChargeIntent>> {
        self.gateway.list_recent_intents(RECENT_INTENTS_LIMIT).await
    }

    /// Cancel the newest intent, or report why it could not be
    pub async fn cancel_latest(&self) -> Result<ChargeIntent> {
        let latest = self
            .gateway
            .list_recent_intents(1)
            .await?
            .into_iter()
            .next()
            .ok_or(TerminalError::NoIntents)?;

        tracing::info!(
            intent_id = %latest.id,
            status = %latest.status,
            "Canceling latest payment intent"
        );
        self.gateway.cancel_intent(&latest.id).await
    }

    /// Best-effort cancel of the recent batch
    pub async fn cancel_all(&self) -> Result<CancelAllReport> {
        self.gateway
            .cancel_all_recent_intents(RECENT_INTENTS_LIMIT)
            .await
    }
}
