//! Stripe Terminal Integration
//!
//! Maps processor operations onto the Stripe API. Stripe failures become
//! `TerminalError::Processor` with Stripe's own message; reader actions
//! become `TerminalError::ReaderAction`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stripe::{
    CancelPaymentIntent, Client, CreatePaymentIntent, CreateTerminalConnectionToken, Currency,
    ListPaymentIntents, PaymentIntent, PaymentIntentCaptureMethod, PaymentIntentId, StripeError,
    TerminalConnectionToken,
};

use terminal_core::{
    ChargeIntent, ConnectionToken, IntentStatus, Location, PaymentProcessor, ReaderState, Result,
    TerminalError,
};

/// Stripe client wrapper
pub struct StripeProcessor {
    client: Client,
}

/// Stripe's cancel_action takes no parameters
#[derive(Serialize, Default)]
struct EmptyForm {}

#[derive(Serialize)]
struct ListLocationsQuery {
    limit: u64,
}

#[derive(Deserialize)]
struct LocationPage {
    data: Vec<Location>,
}

impl StripeProcessor {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| TerminalError::Config("STRIPE_SECRET_KEY not set".into()))?;
        Ok(Self::new(&secret_key))
    }

    /// Get the underlying Stripe client
    pub const fn inner(&self) -> &Client {
        &self.client
    }
}

fn processor_error(err: &StripeError) -> TerminalError {
    TerminalError::Processor(stripe_message(err))
}

/// Stripe's own message when it sent one, otherwise the transport error
fn stripe_message(err: &StripeError) -> String {
    match err {
        StripeError::Stripe(request, ..) => request
            .message
            .clone()
            .unwrap_or_else(|| err.to_string()),
        other => other.to_string(),
    }
}

fn parse_intent_id(id: &str) -> Result<PaymentIntentId> {
    id.parse::<PaymentIntentId>()
        .map_err(|e| TerminalError::Processor(format!("Invalid payment intent id `{id}`: {e}")))
}

fn to_charge_intent(intent: PaymentIntent) -> ChargeIntent {
    ChargeIntent {
        id: intent.id.to_string(),
        amount: intent.amount,
        currency: intent.currency.to_string(),
        status: IntentStatus::from_processor(intent.status.as_str()),
        client_secret: intent.client_secret,
        created: intent.created,
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<ChargeIntent> {
        let currency = currency
            .to_lowercase()
            .parse::<Currency>()
            .map_err(|_| TerminalError::Processor(format!("Invalid currency `{currency}`")))?;

        let mut params = CreatePaymentIntent::new(amount, currency);
        params.payment_method_types = Some(vec!["card_present".to_string()]);
        params.capture_method = Some(PaymentIntentCaptureMethod::Automatic);

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| processor_error(&e))?;
        Ok(to_charge_intent(intent))
    }

    async fn list_intents(&self, limit: u64) -> Result<Vec<ChargeIntent>> {
        let mut params = ListPaymentIntents::new();
        params.limit = Some(limit);

        let page = PaymentIntent::list(&self.client, &params)
            .await
            .map_err(|e| processor_error(&e))?;
        Ok(page.data.into_iter().map(to_charge_intent).collect())
    }

    async fn retrieve_intent(&self, id: &str) -> Result<ChargeIntent> {
        let id = parse_intent_id(id)?;
        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| processor_error(&e))?;
        Ok(to_charge_intent(intent))
    }

    async fn cancel_intent(&self, id: &str) -> Result<ChargeIntent> {
        let id = parse_intent_id(id)?;
        let intent = PaymentIntent::cancel(&self.client, &id, CancelPaymentIntent::default())
            .await
            .map_err(|e| processor_error(&e))?;
        Ok(to_charge_intent(intent))
    }

    async fn create_connection_token(&self) -> Result<ConnectionToken> {
        let token =
            TerminalConnectionToken::create(&self.client, CreateTerminalConnectionToken::default())
                .await
                .map_err(|e| processor_error(&e))?;
        Ok(ConnectionToken {
            secret: token.secret,
        })
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState> {
        let path = format!("/terminal/readers/{reader_id}/cancel_action");
        self.client
            .post_form::<ReaderState, _>(&path, EmptyForm::default())
            .await
            .map_err(|e| {
                tracing::debug!(
                    reader_id = %reader_id,
                    error = %e,
                    "Stripe cancel_action rejected"
                );
                TerminalError::ReaderAction {
                    reader_id: reader_id.to_string(),
                    message: stripe_message(&e),
                }
            })
    }

    async fn list_locations(&self) -> Result<Vec<Location>> {
        let page = self
            .client
            .get_query::<LocationPage, _>("/terminal/locations", ListLocationsQuery { limit: 100 })
            .await
            .map_err(|e| processor_error(&e))?;
        Ok(page.data)
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

/// Show only the prefix and last four characters of a secret key
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 11 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
