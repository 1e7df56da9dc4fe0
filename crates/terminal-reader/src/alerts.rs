//! Operator Alerts
//!
//! Blocking notices shown to the person running the terminal. The workflow
//! raises exactly one alert per payment outcome.

use std::sync::Mutex;

use serde::Serialize;

use terminal_core::TerminalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// A notice for the operator
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    /// Machine-readable code of the error behind the alert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl Alert {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            message: message.into(),
            code: None,
        }
    }

    /// Alert for a failed step, using the error's operator text
    pub fn from_error(err: &TerminalError) -> Self {
        let level = match err {
            TerminalError::CollectionTimedOut | TerminalError::CollectionCanceledByOperator => {
                AlertLevel::Warning
            }
            _ => AlertLevel::Error,
        };
        Self {
            level,
            message: err.user_message(),
            code: Some(err.code()),
        }
    }
}

/// Surface for operator notices
pub trait OperatorAlerts: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Writes alerts to the log
#[derive(Default)]
pub struct LogAlerts;

impl OperatorAlerts for LogAlerts {
    fn alert(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => tracing::info!(code = ?alert.code, "ALERT: {}", alert.message),
            AlertLevel::Warning => tracing::warn!(code = ?alert.code, "ALERT: {}", alert.message),
            AlertLevel::Error => tracing::error!(code = ?alert.code, "ALERT: {}", alert.message),
        }
    }
}

/// Records alerts for assertions
#[derive(Default)]
pub struct MemoryAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.message).collect()
    }
}

impl OperatorAlerts for MemoryAlerts {
    fn alert(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_from_error() {
        let alert = Alert::from_error(&TerminalError::CollectionTimedOut);
        assert_eq!(alert.level, AlertLevel::Warning);
        assert_eq!(alert.code, Some("COLLECTION_TIMED_OUT"));

        let alert = Alert::from_error(&TerminalError::ReaderDisconnected);
        assert_eq!(alert.level, AlertLevel::Error);
    }

    #[test]
    fn test_memory_alerts_record_in_order() {
        let alerts = MemoryAlerts::new();
        alerts.alert(Alert::info("first"));
        alerts.alert(Alert::info("second"));
        assert_eq!(alerts.messages(), vec!["first", "second"]);
    }
}
