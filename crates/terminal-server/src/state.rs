//! Application State

use std::sync::Arc;

use terminal_core::IntentGateway;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Gateway over the configured processor
    pub gateway: Arc<IntentGateway>,

    /// Secret key with all but prefix and suffix hidden, for `/health`
    pub masked_key: Arc<str>,
}
