//! Domain model for charge intents, readers and connection tokens

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerminalError};

/// Amounts at or below this many minor units are rejected before reaching the processor
pub const MINIMUM_AMOUNT: i64 = 50;

/// Currency used when a request does not name one
pub const DEFAULT_CURRENCY: &str = "eur";

/// Reject amounts the processor would refuse to collect
pub fn validate_amount(amount: i64) -> Result<i64> {
    if amount <= MINIMUM_AMOUNT {
        return Err(TerminalError::InvalidAmount {
            amount,
            minimum: MINIMUM_AMOUNT,
        });
    }
    Ok(amount)
}

/// Processor-side lifecycle of a charge intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
    Failed,
}

impl IntentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// Map a processor status string. Unknown values are treated as failed.
    pub fn from_processor(status: &str) -> Self {
        match status {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            _ => Self::Failed,
        }
    }

    /// Terminal statuses can no longer be canceled
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled | Self::Failed)
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processor charge intent, as last fetched
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeIntent {
    /// Processor-assigned identifier
    pub id: String,

    /// Amount in minor currency units
    pub amount: i64,

    /// Lowercase ISO currency code
    pub currency: String,

    pub status: IntentStatus,

    /// Single-use credential handed to the reader session. Never serialized.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,

    /// Creation time, unix seconds
    #[serde(default)]
    pub created: i64,
}

/// Result of a successful intent creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

impl CreatedIntent {
    /// Extract id and secret, failing when the processor omitted the secret
    pub fn from_intent(intent: &ChargeIntent) -> Result<Self> {
        match intent.client_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(Self {
                id: intent.id.clone(),
                client_secret: secret.to_string(),
            }),
            _ => Err(TerminalError::Processor(format!(
                "payment intent {} returned without a client secret",
                intent.id
            ))),
        }
    }
}

/// Short-lived credential authorizing a reader session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionToken {
    pub secret: String,
}

/// Reader object returned by the processor after a server-side action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReaderState {
    pub id: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    /// In-flight action, passed through untouched
    #[serde(default)]
    pub action: Option<serde_json::Value>,
}

/// A physical terminal as reported by discovery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reader {
    pub id: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub location: Option<String>,
}

impl Reader {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            serial_number: None,
            location: None,
        }
    }

    #[must_use]
    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }
}

/// Processor terminal location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,

    #[serde(default)]
    pub display_name: Option<String>,
}
