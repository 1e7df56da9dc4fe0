//! Error Types

use thiserror::Error;

use crate::model::IntentStatus;

/// Result type alias for terminal operations
pub type Result<T> = std::result::Result<T, TerminalError>;

/// Errors raised across the gateway, reader session and collection workflow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminalError {
    /// Amount at or below the collectible minimum
    #[error("Invalid amount {amount}: must be greater than {minimum} minor units")]
    InvalidAmount { amount: i64, minimum: i64 },

    /// Missing or blank configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream processor failure, message passed through
    #[error("Processor error: {0}")]
    Processor(String),

    /// No intents exist to act on
    #[error("No payment intents found")]
    NoIntents,

    /// Intent is already in a state the processor refuses to cancel
    #[error("Payment intent {id} is not cancelable (current status: {current_status})")]
    NotCancelable {
        id: String,
        current_status: IntentStatus,
    },

    /// Configured location is not known to the processor
    #[error("No location found with ID {0}")]
    LocationNotFound(String),

    /// Server-side reader cancel rejected
    #[error("Failed to cancel action for reader `{reader_id}`: {message}")]
    ReaderAction { reader_id: String, message: String },

    /// Reader discovery failed in the SDK
    #[error("Reader discovery failed: {0}")]
    Discovery(String),

    /// Discovery succeeded but returned nothing
    #[error("No readers found at location {location}")]
    NoReadersFound { location: String },

    /// Connecting to the discovered reader failed
    #[error("Reader connection failed: {0}")]
    ReaderConnect(String),

    /// Reader dropped while a session depended on it
    #[error("Reader disconnected unexpectedly")]
    ReaderDisconnected,

    /// A collection is already running on this session
    #[error("A collection is already in flight on reader {0}")]
    CollectionInFlight(String),

    /// No usable payment intent for collection
    #[error("Missing payment intent: {0}")]
    MissingIntent(String),

    /// Hardware reported a collection failure
    #[error("Collection failed: {0}")]
    Collection(String),

    /// Collection timer expired before the card was presented
    #[error("Collection timed out")]
    CollectionTimedOut,

    /// Operator pressed cancel during collection
    #[error("Collection canceled by operator")]
    CollectionCanceledByOperator,

    /// Processing finished without a succeeded intent
    #[error("Payment failed: {0}")]
    PaymentFailed(String),
}

impl TerminalError {
    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Processor(_) => "PROCESSOR_ERROR",
            Self::NoIntents => "NO_INTENTS",
            Self::NotCancelable { .. } => "NOT_CANCELABLE",
            Self::LocationNotFound(_) => "LOCATION_NOT_FOUND",
            Self::ReaderAction { .. } => "READER_ACTION_FAILED",
            Self::Discovery(_) => "DISCOVERY_FAILED",
            Self::NoReadersFound { .. } => "NO_READERS_FOUND",
            Self::ReaderConnect(_) => "READER_CONNECT_FAILED",
            Self::ReaderDisconnected => "READER_DISCONNECTED",
            Self::CollectionInFlight(_) => "COLLECTION_IN_FLIGHT",
            Self::MissingIntent(_) => "MISSING_INTENT",
            Self::Collection(_) => "COLLECTION_FAILED",
            Self::CollectionTimedOut => "COLLECTION_TIMED_OUT",
            Self::CollectionCanceledByOperator => "COLLECTION_CANCELED",
            Self::PaymentFailed(_) => "PAYMENT_FAILED",
        }
    }

    /// Operator-facing alert text
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidAmount { minimum, .. } => format!(
                "Please enter a valid amount above {}.{:02}",
                minimum / 100,
                minimum % 100
            ),
            Self::Config(_) => "Service configuration error.".into(),
            Self::Processor(_) => "Payment processing failed. Please try again.".into(),
            Self::NoIntents => "No payment intents found.".into(),
            Self::NotCancelable { current_status, .. } => format!(
                "Payment intent is not in a cancelable state (current status: {current_status})."
            ),
            Self::LocationNotFound(id) => format!("No terminal location found with ID {id}."),
            Self::ReaderAction { .. } => {
                "Failed to cancel action. Check console for details.".into()
            }
            Self::Discovery(_) => {
                "Error discovering reader. Please check the connection and try again.".into()
            }
            Self::NoReadersFound { .. } => {
                "No readers found. Please make sure the reader is available and try again.".into()
            }
            Self::ReaderConnect(_) => "Error connecting to reader. Please try again.".into(),
            Self::ReaderDisconnected => {
                "The reader was disconnected unexpectedly. Please reconnect.".into()
            }
            Self::CollectionInFlight(_) => "The reader is already collecting a payment.".into(),
            Self::MissingIntent(_) | Self::Collection(_) => {
                "Error collecting payment. Please try again.".into()
            }
            Self::CollectionTimedOut => "No card presented in time. Payment canceled.".into(),
            Self::CollectionCanceledByOperator => "Payment canceled.".into(),
            Self::PaymentFailed(_) => "Payment failed. Please try again.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_amount_message_formats_minimum() {
        let err = TerminalError::InvalidAmount {
            amount: 10,
            minimum: 50,
        };
        assert_eq!(err.user_message(), "Please enter a valid amount above 0.50");
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }

    #[test]
    fn test_missing_intent_alerts_like_collection_error() {
        let missing = TerminalError::MissingIntent("no intent returned".into());
        let collection = TerminalError::Collection("card declined".into());
        assert_eq!(missing.user_message(), collection.user_message());
        assert_ne!(missing.code(), collection.code());
    }
}
