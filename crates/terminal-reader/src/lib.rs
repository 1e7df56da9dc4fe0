//! # terminal-reader
//!
//! Client side of a card-present terminal: reader session lifecycle, the
//! collection/cancellation race and the payment workflow tying them together.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────┐  create intent  ┌────────────┐
//! │  Workflow  │────────────────▶│  Backend   │ (HTTP or in-process gateway)
//! └─────┬──────┘                 └────────────┘
//!       │ connect                      ▲ token / location / cancel action
//!       ▼                              │
//! ┌────────────┐   SDK calls    ┌──────┴─────┐
//! │ Controller │───────────────▶│ ReaderSdk  │ (vendor binding or simulated)
//! └─────┬──────┘                └────────────┘
//!       │ collect
//!       ▼
//! ┌────────────────────────────────────────────┐
//! │ CollectionRace: card │ timer │ operator │ disconnect │
//! └────────────────────────────────────────────┘
//! ```
//!
//! A [`ReaderSession`] is owned by the caller and passed to each step.

pub mod alerts;
pub mod backend;
pub mod controller;
pub mod race;
pub mod sdk;
pub mod session;
pub mod simulated;
pub mod workflow;

pub use alerts::{Alert, AlertLevel, LogAlerts, MemoryAlerts, OperatorAlerts};
pub use backend::{Backend, HttpBackend};
pub use controller::ReaderController;
pub use race::{
    CancelListener, CollectionAttempt, CollectionOutcome, CollectionRace, DEFAULT_COLLECT_TIMEOUT,
    OperatorCancel, operator_cancel,
};
pub use sdk::{
    CollectedPayment, EventSender, ReaderEvent, ReaderSdk, SdkError, SdkResult, TokenSource,
};
pub use session::{ConnectionState, ReaderSession};
pub use simulated::{ProcessBehavior, SimulatedReader, TapBehavior};
pub use workflow::{PaymentReceipt, PaymentWorkflow, WorkflowConfig};
