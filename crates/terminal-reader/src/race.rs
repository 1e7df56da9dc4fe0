//! Collection/Cancellation Race
//!
//! One collection attempt races four sources; the first to settle wins and
//! the rest are dropped:
//!
//! ```text
//!                ┌── card presented ──────▶ Collected
//!                ├── timer expires ───────▶ cancel_collect ─▶ CanceledByTimeout
//!  collect(...) ─┼── operator presses ────▶ cancel_reader_action ─▶ CanceledByOperator
//!                └── reader disconnects ──▶ Errored(ReaderDisconnected)
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use terminal_core::{ChargeIntent, CreatedIntent, IntentStatus, Result, TerminalError};

use crate::backend::Backend;
use crate::sdk::{CollectedPayment, ReaderEvent, ReaderSdk, SdkResult};
use crate::session::ReaderSession;

/// Default time a customer has to present a card
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a collection attempt settled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionOutcome {
    Collected(ChargeIntent),
    CanceledByTimeout,
    CanceledByOperator,
    Errored(TerminalError),
}

impl CollectionOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Collected(_) => "collected",
            Self::CanceledByTimeout => "canceled_by_timeout",
            Self::CanceledByOperator => "canceled_by_operator",
            Self::Errored(_) => "errored",
        }
    }

    /// Collected intent, or the error the operator should see
    pub fn into_result(self) -> Result<ChargeIntent> {
        match self {
            Self::Collected(intent) => Ok(intent),
            Self::CanceledByTimeout => Err(TerminalError::CollectionTimedOut),
            Self::CanceledByOperator => Err(TerminalError::CollectionCanceledByOperator),
            Self::Errored(err) => Err(err),
        }
    }
}

/// Record of one collect call
#[derive(Clone, Debug)]
pub struct CollectionAttempt {
    pub id: Uuid,
    pub intent_id: String,
    pub reader_id: String,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    outcome: Option<CollectionOutcome>,
}

impl CollectionAttempt {
    fn new(intent_id: &str, reader_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent_id: intent_id.to_string(),
            reader_id: reader_id.to_string(),
            started_at: Utc::now(),
            resolved_at: None,
            outcome: None,
        }
    }

    /// Settle the attempt. Only the first outcome is kept.
    fn resolve(&mut self, outcome: CollectionOutcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        self.resolved_at = Some(Utc::now());
        true
    }

    pub const fn outcome(&self) -> Option<&CollectionOutcome> {
        self.outcome.as_ref()
    }

    pub const fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Operator cancel button
///
/// Cheap to clone. Presses only count while an attempt is running; any
/// number of presses during one attempt yields a single cancel.
#[derive(Clone)]
pub struct OperatorCancel {
    tx: Arc<watch::Sender<u64>>,
}

impl OperatorCancel {
    pub fn press(&self) {
        self.tx.send_modify(|presses| *presses = presses.wrapping_add(1));
    }
}

/// Receiving side of [`OperatorCancel`], owned by the workflow
pub struct CancelListener {
    rx: watch::Receiver<u64>,
}

impl CancelListener {
    /// Forget presses made while idle
    fn arm(&mut self) {
        self.rx.borrow_and_update();
    }

    /// Resolves on the next press; `false` once every button is gone
    async fn pressed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Create a linked cancel button and listener
pub fn operator_cancel() -> (OperatorCancel, CancelListener) {
    let (tx, rx) = watch::channel(0);
    (OperatorCancel { tx: Arc::new(tx) }, CancelListener { rx })
}

enum Settled {
    Hardware(SdkResult<CollectedPayment>),
    Timer,
    Operator,
    Event(ReaderEvent),
}

/// Holds a session in `Collecting` for the length of one attempt
///
/// Dropped unsettled (the caller abandoned the race), it resolves the attempt
/// as errored, asks the SDK to cancel the pending collect and returns the
/// session to idle.
struct CollectingGuard<'s> {
    session: &'s mut ReaderSession,
    attempt: CollectionAttempt,
    sdk: Arc<dyn ReaderSdk>,
}

impl CollectingGuard<'_> {
    fn settle(&mut self, outcome: CollectionOutcome) -> CollectionAttempt {
        self.attempt.resolve(outcome);
        self.session.end_collecting();
        self.session.record_attempt(self.attempt.clone());
        self.attempt.clone()
    }
}

impl Deref for CollectingGuard<'_> {
    type Target = ReaderSession;

    fn deref(&self) -> &ReaderSession {
        self.session
    }
}

impl DerefMut for CollectingGuard<'_> {
    fn deref_mut(&mut self) -> &mut ReaderSession {
        self.session
    }
}

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        if self.attempt.is_resolved() {
            return;
        }
        tracing::warn!(
            intent_id = %self.attempt.intent_id,
            reader_id = %self.attempt.reader_id,
            "Collection abandoned before it settled"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let sdk = Arc::clone(&self.sdk);
            handle.spawn(async move {
                if let Err(err) = sdk.cancel_collect_payment_method().await {
                    tracing::warn!(error = %err, "Failed to cancel abandoned collection");
                }
            });
        }
        self.settle(CollectionOutcome::Errored(TerminalError::Collection(
            "collection abandoned before it settled".into(),
        )));
        self.session.clear_active_intent();
    }
}

/// Runs collection attempts against a reader
pub struct CollectionRace {
    sdk: Arc<dyn ReaderSdk>,
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl CollectionRace {
    pub fn new(sdk: Arc<dyn ReaderSdk>, backend: Arc<dyn Backend>) -> Self {
        Self {
            sdk,
            backend,
            timeout: DEFAULT_COLLECT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Collect a payment method for `intent` on the session's reader
    ///
    /// Fails up front when the secret is blank or the session cannot start
    /// a collection; otherwise returns the resolved attempt, which is also
    /// recorded on the session.
    pub async fn run(
        &self,
        session: &mut ReaderSession,
        intent: &CreatedIntent,
        cancel: &mut CancelListener,
    ) -> Result<CollectionAttempt> {
        if intent.client_secret.trim().is_empty() {
            return Err(TerminalError::MissingIntent(format!(
                "payment intent {} has no client secret",
                intent.id
            )));
        }

        let reader = session.begin_collecting()?;
        session.set_active_intent(intent.clone());
        cancel.arm();

        let mut guard = CollectingGuard {
            session,
            attempt: CollectionAttempt::new(&intent.id, &reader.id),
            sdk: Arc::clone(&self.sdk),
        };
        tracing::info!(
            intent_id = %intent.id,
            reader_id = %reader.id,
            timeout_secs = self.timeout.as_secs(),
            "Collecting payment method"
        );

        let mut collect = self.sdk.collect_payment_method(&intent.client_secret);
        let mut timer = Box::pin(tokio::time::sleep(self.timeout));
        let settled = loop {
            tokio::select! {
                result = &mut collect => break Settled::Hardware(result),
                () = &mut timer => break Settled::Timer,
                true = cancel.pressed() => break Settled::Operator,
                Some(event) = guard.next_event() => match event {
                    ReaderEvent::UnexpectedDisconnect { reader_id } if reader_id != reader.id => {
                        tracing::debug!(
                            reader_id = %reader_id,
                            collecting_on = %reader.id,
                            "Ignoring disconnect for another reader"
                        );
                    }
                    event => break Settled::Event(event),
                },
            }
        };
        drop(collect);
        drop(timer);

        let outcome = match settled {
            Settled::Hardware(Ok(collected)) => match collected.payment_intent {
                Some(collected) if collected.id == intent.id => {
                    CollectionOutcome::Collected(collected)
                }
                Some(other) => CollectionOutcome::Errored(TerminalError::MissingIntent(format!(
                    "collected payment intent {} does not match {}",
                    other.id, intent.id
                ))),
                None => CollectionOutcome::Errored(TerminalError::MissingIntent(
                    "collection returned no payment intent".into(),
                )),
            },
            Settled::Hardware(Err(err)) => {
                tracing::warn!(
                    intent_id = %intent.id,
                    code = ?err.code,
                    error = %err,
                    "Collection failed"
                );
                CollectionOutcome::Errored(TerminalError::Collection(err.message))
            }
            Settled::Timer => {
                if let Err(err) = self.sdk.cancel_collect_payment_method().await {
                    tracing::warn!(
                        intent_id = %intent.id,
                        error = %err,
                        "Failed to cancel collection after timeout"
                    );
                }
                CollectionOutcome::CanceledByTimeout
            }
            Settled::Operator => {
                if let Err(err) = self.backend.cancel_reader_action(&reader.id).await {
                    tracing::warn!(
                        reader_id = %reader.id,
                        error = %err,
                        "Server-side reader cancel failed"
                    );
                }
                CollectionOutcome::CanceledByOperator
            }
            Settled::Event(ReaderEvent::UnexpectedDisconnect { reader_id }) => {
                tracing::warn!(
                    reader_id = %reader_id,
                    intent_id = %intent.id,
                    "Reader disconnected during collection"
                );
                guard.mark_disconnected();
                CollectionOutcome::Errored(TerminalError::ReaderDisconnected)
            }
        };

        tracing::info!(
            intent_id = %intent.id,
            reader_id = %reader.id,
            outcome = outcome.label(),
            "Collection settled"
        );
        Ok(guard.settle(outcome))
    }

    /// Confirm a collected intent; anything but `succeeded` is a failure
    pub async fn process(&self, intent: &ChargeIntent) -> Result<ChargeIntent> {
        match self.sdk.process_payment(intent).await {
            Ok(processed) if processed.status == IntentStatus::Succeeded => Ok(processed),
            Ok(processed) => Err(TerminalError::PaymentFailed(format!(
                "payment intent {} ended as {}",
                processed.id, processed.status
            ))),
            Err(err) => Err(TerminalError::PaymentFailed(err.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::MemoryAlerts;
    use crate::controller::ReaderController;
    use crate::session::ConnectionState;
    use crate::simulated::{ProcessBehavior, SimulatedReader, TapBehavior};
    use terminal_core::{IntentGateway, MemoryProcessor, ProcessorCall};

    struct Rig {
        processor: Arc<MemoryProcessor>,
        gateway: Arc<IntentGateway<MemoryProcessor>>,
        sdk: Arc<SimulatedReader>,
        session: ReaderSession,
    }

    async fn rig(tap: TapBehavior) -> Rig {
        let processor = Arc::new(
            MemoryProcessor::new()
                .with_location("tml_counter", "Counter")
                .with_reader("tmr_1"),
        );
        let gateway = Arc::new(IntentGateway::new(processor.clone(), "tml_counter"));
        let sdk = Arc::new(SimulatedReader::new().with_readers(["tmr_1"]).with_tap(tap));
        let mut session = ReaderSession::new();
        ReaderController::new(sdk.clone(), gateway.clone(), Arc::new(MemoryAlerts::new()))
            .connect(&mut session)
            .await
            .unwrap();
        Rig {
            processor,
            gateway,
            sdk,
            session,
        }
    }

    impl Rig {
        fn race(&self) -> CollectionRace {
            CollectionRace::new(self.sdk.clone(), self.gateway.clone())
        }

        async fn intent(&self) -> CreatedIntent {
            self.gateway.create_intent(1500, "eur").await.unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hardware_first_disarms_timer() {
        let mut rig = rig(TapBehavior::After(Duration::from_secs(2))).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(matches!(
            attempt.outcome(),
            Some(CollectionOutcome::Collected(i)) if i.id == intent.id
        ));
        assert_eq!(rig.sdk.cancel_collect_calls(), 0);
        assert!(
            rig.session
                .last_attempt()
                .is_some_and(CollectionAttempt::is_resolved)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_first_cancels_collect_once() {
        let mut rig = rig(TapBehavior::Never).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        assert_eq!(attempt.outcome(), Some(&CollectionOutcome::CanceledByTimeout));
        assert_eq!(rig.sdk.cancel_collect_calls(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rig.sdk.cancel_collect_calls(), 1);
        assert!(rig.session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_cancel_pressed_twice() {
        let mut rig = rig(TapBehavior::Never).await;
        let intent = rig.intent().await;
        let (button, mut listener) = operator_cancel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            button.press();
            button.press();
        });

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        assert_eq!(
            attempt.outcome(),
            Some(&CollectionOutcome::CanceledByOperator)
        );
        assert_eq!(
            rig.processor
                .count_calls(|c| *c == ProcessorCall::CancelReaderAction("tmr_1".into())),
            1
        );
        assert_eq!(rig.sdk.cancel_collect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_presses_are_ignored() {
        let mut rig = rig(TapBehavior::Immediate).await;
        let intent = rig.intent().await;
        let (button, mut listener) = operator_cancel();
        button.press();

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        assert!(matches!(attempt.outcome(), Some(CollectionOutcome::Collected(_))));
        assert_eq!(
            rig.processor
                .count_calls(|c| matches!(c, ProcessorCall::CancelReaderAction(_))),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_collection() {
        let mut rig = rig(TapBehavior::Never).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();

        let sdk = rig.sdk.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            sdk.simulate_disconnect();
        });

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        assert_eq!(
            attempt.outcome(),
            Some(&CollectionOutcome::Errored(TerminalError::ReaderDisconnected))
        );
        assert!(!rig.session.is_connected());
        assert_eq!(rig.sdk.cancel_collect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_of_other_reader_is_ignored() {
        let mut rig = rig(TapBehavior::After(Duration::from_secs(2))).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();

        let events = rig.session.event_sender();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = events.send(ReaderEvent::UnexpectedDisconnect {
                reader_id: "tmr_previous".into(),
            });
        });

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        assert!(matches!(attempt.outcome(), Some(CollectionOutcome::Collected(_))));
        assert!(rig.session.is_connected());
        assert_eq!(
            rig.sdk.connected_reader().map(|r| r.id),
            Some("tmr_1".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_attempt_settles_and_cancels() {
        let mut rig = rig(TapBehavior::Never).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();
        let race = rig.race();

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            race.run(&mut rig.session, &intent, &mut listener),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(rig.session.state(), ConnectionState::Connected);
        assert!(rig.session.active_intent().is_none());
        assert!(matches!(
            rig.session.last_attempt().and_then(CollectionAttempt::outcome),
            Some(CollectionOutcome::Errored(TerminalError::Collection(_)))
        ));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(rig.sdk.cancel_collect_calls(), 1);

        let retry = rig.intent().await;
        let attempt = race
            .with_timeout(Duration::from_secs(3))
            .run(&mut rig.session, &retry, &mut listener)
            .await
            .unwrap();
        assert_eq!(attempt.outcome(), Some(&CollectionOutcome::CanceledByTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_intent() {
        let mut rig = rig(TapBehavior::NoIntent).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();
        assert!(matches!(
            attempt.outcome(),
            Some(CollectionOutcome::Errored(TerminalError::MissingIntent(_)))
        ));

        let blank = CreatedIntent {
            id: intent.id.clone(),
            client_secret: "  ".into(),
        };
        let err = rig
            .race()
            .run(&mut rig.session, &blank, &mut listener)
            .await
            .unwrap_err();
        assert!(matches!(err, TerminalError::MissingIntent(_)));
        assert_eq!(rig.sdk.collect_calls(), 1);
    }

    #[tokio::test]
    async fn test_declined_card() {
        let mut rig = rig(TapBehavior::Decline("Your card was declined.".into())).await;
        let intent = rig.intent().await;
        let (_button, mut listener) = operator_cancel();

        let attempt = rig
            .race()
            .run(&mut rig.session, &intent, &mut listener)
            .await
            .unwrap();

        assert_eq!(
            attempt.outcome().cloned().map(CollectionOutcome::into_result),
            Some(Err(TerminalError::Collection("Your card was declined.".into())))
        );
    }

    #[tokio::test]
    async fn test_process_requires_succeeded() {
        let rig = rig(TapBehavior::Immediate).await;
        let collected = ChargeIntent {
            id: "pi_1".into(),
            amount: 1500,
            currency: "eur".into(),
            status: IntentStatus::RequiresConfirmation,
            client_secret: None,
            created: 0,
        };

        let processed = rig.race().process(&collected).await.unwrap();
        assert_eq!(processed.status, IntentStatus::Succeeded);

        let sdk = Arc::new(SimulatedReader::new().with_process(ProcessBehavior::Status(
            IntentStatus::RequiresPaymentMethod,
        )));
        let race = CollectionRace::new(sdk, rig.gateway.clone());
        assert!(matches!(
            race.process(&collected).await,
            Err(TerminalError::PaymentFailed(_))
        ));

        let sdk = Arc::new(
            SimulatedReader::new().with_process(ProcessBehavior::Fail("Card read error".into())),
        );
        let race = CollectionRace::new(sdk.clone(), rig.gateway.clone());
        assert_eq!(
            race.process(&collected).await,
            Err(TerminalError::PaymentFailed("Card read error".into()))
        );
        assert_eq!(sdk.process_calls(), 1);
        assert_eq!(rig.sdk.process_calls(), 1);
    }

    #[test]
    fn test_attempt_first_resolution_wins() {
        let mut attempt = CollectionAttempt::new("pi_1", "tmr_1");
        assert!(attempt.resolve(CollectionOutcome::CanceledByTimeout));
        assert!(!attempt.resolve(CollectionOutcome::CanceledByOperator));
        assert_eq!(attempt.outcome(), Some(&CollectionOutcome::CanceledByTimeout));
    }
}
