//! Server Configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).

use terminal_core::{DEFAULT_CURRENCY, Result, TerminalError};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:4242";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub secret_key: String,
    pub location_id: String,
    pub default_currency: String,
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret_key = non_blank("STRIPE_SECRET_KEY")
            .ok_or_else(|| TerminalError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let location_id = non_blank("STRIPE_TERMINAL_LOCATION_ID")
            .or_else(|| non_blank("LOCATION_ID"))
            .ok_or_else(|| TerminalError::Config("STRIPE_TERMINAL_LOCATION_ID not set".into()))?;

        Ok(Self {
            secret_key,
            location_id,
            default_currency: non_blank("DEFAULT_CURRENCY")
                .map_or_else(|| DEFAULT_CURRENCY.to_string(), |c| c.to_lowercase()),
            bind_addr: non_blank("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("STRIPE_SECRET_KEY", "sk_test_abc"),
            ("STRIPE_TERMINAL_LOCATION_ID", "tml_1"),
        ])
        .unwrap();
        assert_eq!(config.default_currency, "eur");
        assert_eq!(config.bind_addr, "127.0.0.1:4242");
    }

    #[test]
    fn test_location_alias() {
        let config =
            load(&[("STRIPE_SECRET_KEY", "sk_test_abc"), ("LOCATION_ID", "tml_2")]).unwrap();
        assert_eq!(config.location_id, "tml_2");
    }

    #[test]
    fn test_missing_required() {
        assert!(matches!(
            load(&[("STRIPE_TERMINAL_LOCATION_ID", "tml_1")]),
            Err(TerminalError::Config(_))
        ));
        assert!(matches!(
            load(&[("STRIPE_SECRET_KEY", "sk_test_abc"), ("LOCATION_ID", "  ")]),
            Err(TerminalError::Config(_))
        ));
    }
}
