//! # terminal-payments
//!
//! Stripe Terminal implementation of [`terminal_core::PaymentProcessor`].
//!
//! ## Card-present flow
//!
//! ```text
//! ┌─────────────┐  intent   ┌─────────────┐  secret   ┌──────────────┐
//! │   Backend   │──────────▶│   Stripe    │──────────▶│    Reader    │
//! │  (gateway)  │◀──────────│     API     │◀──────────│   (SDK/tap)  │
//! └─────────────┘  status   └─────────────┘  process  └──────────────┘
//! ```
//!
//! Intents are created `card_present` with automatic capture, so a
//! successful `process_payment` on the reader leaves them `succeeded`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use terminal_core::IntentGateway;
//! use terminal_payments::StripeProcessor;
//!
//! let processor = Arc::new(StripeProcessor::new("sk_test_xxx"));
//! let gateway = IntentGateway::new(processor, "tml_xxx");
//!
//! let created = gateway.create_intent(1500, "eur").await?;
//! // Hand created.client_secret to the reader session
//! ```

mod stripe_processor;

pub use stripe_processor::{StripeProcessor, mask_secret};
