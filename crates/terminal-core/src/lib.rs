//! # terminal-core
//!
//! Charge intent model, payment processor abstraction and the intent gateway
//! that backs a card-present terminal deployment.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       IntentGateway                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │   Amount     │  │   Recovery   │  │  PaymentProcessor  │  │
//! │  │  Validation  │──│     Ops      │──│     (Strategy)     │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `PaymentProcessor` trait lets the gateway run against Stripe in
//! production and against [`MemoryProcessor`] in tests, without any change to
//! validation or cancellation logic. The gateway holds no intent state of its
//! own: every status decision is made on a fresh fetch from the processor.

pub mod error;
pub mod gateway;
pub mod model;
pub mod processor;
pub mod recovery;

pub use error::{Result, TerminalError};
pub use gateway::{CancelAllReport, CancelFailure, IntentGateway, RECENT_INTENTS_LIMIT};
pub use model::{
    ChargeIntent, ConnectionToken, CreatedIntent, DEFAULT_CURRENCY, IntentStatus, Location,
    MINIMUM_AMOUNT, Reader, ReaderState, validate_amount,
};
pub use processor::{MemoryProcessor, PaymentProcessor, ProcessorCall};
pub use recovery::RecoveryOps;
