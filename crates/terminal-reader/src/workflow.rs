//! Payment Workflow
//!
//! One card-present charge, end to end:
//!
//! ```text
//! validate ─▶ create intent ─▶ connect ─▶ collect race ─▶ process ─▶ receipt
//! ```
//!
//! Every run ends with exactly one operator alert. A failure after intent
//! creation leaves the intent in place; recovery operations clean it up.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use terminal_core::{ChargeIntent, DEFAULT_CURRENCY, Result, TerminalError, validate_amount};

use crate::alerts::{Alert, OperatorAlerts};
use crate::backend::Backend;
use crate::controller::ReaderController;
use crate::race::{CancelListener, CollectionAttempt, CollectionRace, DEFAULT_COLLECT_TIMEOUT};
use crate::sdk::ReaderSdk;
use crate::session::ReaderSession;

/// Workflow settings
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub collect_timeout: Duration,
    pub currency: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// A completed charge
#[derive(Clone, Debug)]
pub struct PaymentReceipt {
    pub intent: ChargeIntent,
    pub reader_id: String,
    pub attempt: CollectionAttempt,
}

/// Clears the session's active intent however the charge ends, including
/// when the charge future is dropped mid-flight
struct PaymentScope<'s> {
    session: &'s mut ReaderSession,
}

impl Deref for PaymentScope<'_> {
    type Target = ReaderSession;

    fn deref(&self) -> &ReaderSession {
        self.session
    }
}

impl DerefMut for PaymentScope<'_> {
    fn deref_mut(&mut self) -> &mut ReaderSession {
        self.session
    }
}

impl Drop for PaymentScope<'_> {
    fn drop(&mut self) {
        self.session.clear_active_intent();
    }
}

/// Runs charges on a reader session
pub struct PaymentWorkflow {
    backend: Arc<dyn Backend>,
    controller: ReaderController,
    race: CollectionRace,
    alerts: Arc<dyn OperatorAlerts>,
    config: WorkflowConfig,
}

impl PaymentWorkflow {
    pub fn new(
        sdk: Arc<dyn ReaderSdk>,
        backend: Arc<dyn Backend>,
        alerts: Arc<dyn OperatorAlerts>,
        config: WorkflowConfig,
    ) -> Self {
        let controller =
            ReaderController::new(Arc::clone(&sdk), Arc::clone(&backend), Arc::clone(&alerts));
        let race =
            CollectionRace::new(sdk, Arc::clone(&backend)).with_timeout(config.collect_timeout);
        Self {
            backend,
            controller,
            race,
            alerts,
            config,
        }
    }

    pub const fn controller(&self) -> &ReaderController {
        &self.controller
    }

    pub const fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Charge `amount` minor units on the session's reader
    pub async fn charge(
        &self,
        session: &mut ReaderSession,
        amount: i64,
        cancel: &mut CancelListener,
    ) -> Result<PaymentReceipt> {
        let mut scope = PaymentScope { session };
        let result = self.run(&mut scope, amount, cancel).await;
        drop(scope);

        match &result {
            Ok(receipt) => {
                tracing::info!(
                    intent_id = %receipt.intent.id,
                    reader_id = %receipt.reader_id,
                    amount,
                    outcome = "succeeded",
                    "Payment successful"
                );
                self.alerts.alert(Alert::info("Payment successful!"));
            }
            Err(err @ TerminalError::MissingIntent(detail)) => {
                tracing::error!(
                    amount,
                    code = err.code(),
                    detail = %detail,
                    "Collection returned no usable payment intent"
                );
                self.alerts.alert(Alert::from_error(err));
            }
            Err(err) => {
                tracing::warn!(
                    amount,
                    code = err.code(),
                    error = %err,
                    "Payment did not complete"
                );
                self.alerts.alert(Alert::from_error(err));
            }
        }
        result
    }

    async fn run(
        &self,
        session: &mut ReaderSession,
        amount: i64,
        cancel: &mut CancelListener,
    ) -> Result<PaymentReceipt> {
        validate_amount(amount)?;

        let created = self
            .backend
            .create_payment_intent(amount, &self.config.currency)
            .await?;
        tracing::info!(
            intent_id = %created.id,
            amount,
            currency = %self.config.currency,
            "Created payment intent"
        );

        self.controller.connect(session).await?;

        let attempt = self.race.run(session, &created, cancel).await?;
        let collected = attempt
            .outcome()
            .cloned()
            .ok_or_else(|| TerminalError::Collection("collection attempt never settled".into()))?
            .into_result()?;

        let intent = self.race.process(&collected).await?;
        Ok(PaymentReceipt {
            intent,
            reader_id: attempt.reader_id.clone(),
            attempt,
        })
    }
}
