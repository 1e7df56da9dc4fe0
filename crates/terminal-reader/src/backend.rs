//! Backend Client
//!
//! What the reader workflow needs from the payments backend. `HttpBackend`
//! talks to `terminal-server`; an `IntentGateway` can also be used directly
//! when both halves run in one process.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use terminal_core::{
    ConnectionToken, CreatedIntent, IntentGateway, MINIMUM_AMOUNT, PaymentProcessor, ReaderState,
    Result, TerminalError,
};

/// Backend operations used by the reader session and race manager
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create an intent and return its client secret
    async fn create_payment_intent(&self, amount: i64, currency: &str) -> Result<CreatedIntent>;

    /// Mint a fresh connection token
    async fn connection_token(&self) -> Result<ConnectionToken>;

    /// Location readers are discovered at
    async fn location_id(&self) -> Result<String>;

    /// Server-side cancel of the reader's current action
    async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState>;
}

#[async_trait]
impl<P: PaymentProcessor + ?Sized> Backend for IntentGateway<P> {
    async fn create_payment_intent(&self, amount: i64, currency: &str) -> Result<CreatedIntent> {
        self.create_intent(amount, currency).await
    }

    async fn connection_token(&self) -> Result<ConnectionToken> {
        self.mint_connection_token().await
    }

    async fn location_id(&self) -> Result<String> {
        IntentGateway::location_id(self).map(str::to_string)
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState> {
        IntentGateway::cancel_reader_action(self, reader_id).await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIntentBody {
    id: String,
    client_secret: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationBody {
    location_id: String,
}

#[derive(Deserialize)]
struct CancelActionBody {
    reader_state: ReaderState,
}

/// Error envelope written by `terminal-server`
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// A request the backend did not answer with a usable body
#[derive(Debug)]
struct BackendFailure {
    status: StatusCode,
    message: String,
    code: Option<String>,
}

impl BackendFailure {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            code: None,
        }
    }

    fn is_invalid_amount(&self) -> bool {
        self.status == StatusCode::BAD_REQUEST && self.code.as_deref() == Some("INVALID_AMOUNT")
    }
}

/// HTTP client for the payments backend
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Read `BACKEND_URL`, defaulting to a local server
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:4242".into()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<T, BackendFailure> {
        let response = request.send().await.map_err(|e| {
            BackendFailure::new(StatusCode::BAD_GATEWAY, format!("Backend unreachable: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                BackendFailure::new(status, format!("Malformed backend response: {e}"))
            });
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        tracing::debug!(%status, code = ?body.code, error = %body.error, "Backend request failed");
        let message = if body.error.is_empty() {
            format!("Backend returned {status}")
        } else {
            body.error
        };
        Err(BackendFailure {
            status,
            message,
            code: body.code,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_payment_intent(&self, amount: i64, currency: &str) -> Result<CreatedIntent> {
        let request = self
            .client
            .post(self.url("/create-payment-intent"))
            .json(&serde_json::json!({ "amount": amount, "currency": currency }));

        match self.send::<CreateIntentBody>(request).await {
            Ok(body) => Ok(CreatedIntent {
                id: body.id,
                client_secret: body.client_secret,
            }),
            Err(failure) if failure.is_invalid_amount() => Err(TerminalError::InvalidAmount {
                amount,
                minimum: MINIMUM_AMOUNT,
            }),
            Err(failure) => Err(TerminalError::Processor(failure.message)),
        }
    }

    async fn connection_token(&self) -> Result<ConnectionToken> {
        let request = self
            .client
            .post(self.url("/connection-token"))
            .json(&serde_json::json!({}));

        self.send::<ConnectionToken>(request)
            .await
            .map_err(|failure| TerminalError::Processor(failure.message))
    }

    async fn location_id(&self) -> Result<String> {
        let request = self.client.get(self.url("/get-location-id"));

        self.send::<LocationBody>(request)
            .await
            .map(|body| body.location_id)
            .map_err(|failure| TerminalError::Config(failure.message))
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> Result<ReaderState> {
        let request = self
            .client
            .post(self.url("/readers/cancel-action"))
            .json(&serde_json::json!({ "reader_id": reader_id }));

        self.send::<CancelActionBody>(request)
            .await
            .map(|body| body.reader_state)
            .map_err(|failure| TerminalError::ReaderAction {
                reader_id: reader_id.to_string(),
                message: failure.message,
            })
    }
}
