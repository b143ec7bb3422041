use crate::domain::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Base position-sizing fraction: one unit is 5% of total account value.
pub const UNIT_BASE_PERCENT: &str = "5";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub broker_api_url: String,
    pub broker_app_key: String,
    pub broker_app_secret: String,
    pub account_no: String,
    pub account_product_code: String,
    pub watchlist_path: String,
    pub settings_path: Option<String>,
    pub trigger_file_path: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Monitoring loop tick, milliseconds.
    pub tick_interval_ms: u64,
    /// Background quote poller interval, milliseconds.
    pub price_poll_interval_ms: u64,
    /// Minimum spacing between broker API calls, milliseconds.
    pub broker_min_interval_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |key: &str| -> Result<String, ConfigError> {
            env_map
                .get(key)
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
        };

        let parse_ms = |key: &str, default: &str| -> Result<u64, ConfigError> {
            env_map
                .get(key)
                .map(|s| s.as_str())
                .unwrap_or(default)
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
                })
        };

        let database_path = required("DATABASE_PATH")?;
        let broker_api_url = required("BROKER_API_URL")?;
        let broker_app_key = required("BROKER_APP_KEY")?;
        let broker_app_secret = required("BROKER_APP_SECRET")?;
        let account_no = required("ACCOUNT_NO")?;
        let account_product_code = env_map
            .get("ACCOUNT_PRODUCT_CODE")
            .cloned()
            .unwrap_or_else(|| "01".to_string());

        let watchlist_path = env_map
            .get("WATCHLIST_PATH")
            .cloned()
            .unwrap_or_else(|| "watchlist.csv".to_string());
        let settings_path = env_map.get("SETTINGS_PATH").cloned();
        let trigger_file_path = env_map
            .get("TRIGGER_FILE_PATH")
            .cloned()
            .unwrap_or_else(|| "triggers.json".to_string());

        let telegram_bot_token = env_map.get("TELEGRAM_BOT_TOKEN").cloned();
        let telegram_chat_id = env_map.get("TELEGRAM_CHAT_ID").cloned();

        let tick_interval_ms = parse_ms("TICK_INTERVAL_MS", "1000")?;
        let price_poll_interval_ms = parse_ms("PRICE_POLL_INTERVAL_MS", "2000")?;
        let broker_min_interval_ms = parse_ms("BROKER_MIN_INTERVAL_MS", "500")?;

        Ok(Config {
            database_path,
            broker_api_url,
            broker_app_key,
            broker_app_secret,
            account_no,
            account_product_code,
            watchlist_path,
            settings_path,
            trigger_file_path,
            telegram_bot_token,
            telegram_chat_id,
            tick_interval_ms,
            price_poll_interval_ms,
            broker_min_interval_ms,
        })
    }
}

/// Tunable strategy parameters, adjustable at runtime from the settings file.
///
/// Updates go through `apply` over a fixed key set; unknown keys and
/// unparsable values are reported back to the caller, never panicked on.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingSettings {
    /// Target position size in units; buys execute in half-unit steps.
    pub unit_count: u32,
    /// Default stop-loss threshold, percent below entry.
    pub stop_loss_pct: Decimal,
    /// Execution price buffer, percent (+buy / -sell).
    pub price_buffer_pct: Decimal,
}

impl Default for TradingSettings {
    fn default() -> Self {
        TradingSettings {
            unit_count: 1,
            stop_loss_pct: Decimal::from_str_canonical("3").unwrap_or_else(|_| Decimal::zero()),
            price_buffer_pct: Decimal::from_str_canonical("0.5").unwrap_or_else(|_| Decimal::zero()),
        }
    }
}

impl TradingSettings {
    /// Apply one `key = value` pair from the settings file.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid =
            |key: &str, msg: &str| ConfigError::InvalidValue(key.to_string(), msg.to_string());
        match key {
            "UNIT" => {
                self.unit_count = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| invalid(key, "must be a positive integer"))?;
            }
            "STOP_LOSS_PCT" => {
                self.stop_loss_pct = Decimal::from_str_canonical(value.trim())
                    .map_err(|_| invalid(key, "must be a decimal percentage"))?;
            }
            "PRICE_BUFFER_PCT" => {
                self.price_buffer_pct = Decimal::from_str_canonical(value.trim())
                    .map_err(|_| invalid(key, "must be a decimal percentage"))?;
            }
            other => {
                return Err(ConfigError::InvalidValue(
                    other.to_string(),
                    "unknown settings key".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Sizing percentage for the full configured position.
    pub fn unit_percent(&self) -> Decimal {
        let base = Decimal::from_str_canonical(UNIT_BASE_PERCENT).unwrap_or_else(|_| Decimal::zero());
        base * Decimal::from_i64(self.unit_count as i64)
    }

    /// Sizing percentage for one buy action (half a configured position).
    pub fn half_unit_percent(&self) -> Decimal {
        self.unit_percent() / Decimal::from_i64(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "BROKER_API_URL".to_string(),
            "https://api.broker.example".to_string(),
        );
        map.insert("BROKER_APP_KEY".to_string(), "key".to_string());
        map.insert("BROKER_APP_SECRET".to_string(), "secret".to_string());
        map.insert("ACCOUNT_NO".to_string(), "12345678".to_string());
        map
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.price_poll_interval_ms, 2000);
        assert_eq!(config.broker_min_interval_ms, 500);
        assert_eq!(config.watchlist_path, "watchlist.csv");
        assert!(config.telegram_bot_token.is_none());
    }

    #[test]
    fn test_missing_account_no() {
        let mut env_map = setup_required_env();
        env_map.remove("ACCOUNT_NO");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "ACCOUNT_NO"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_tick_interval() {
        let mut env_map = setup_required_env();
        env_map.insert("TICK_INTERVAL_MS".to_string(), "soon".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TICK_INTERVAL_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_settings_apply_known_keys() {
        let mut settings = TradingSettings::default();
        settings.apply("UNIT", "2").unwrap();
        settings.apply("STOP_LOSS_PCT", "5").unwrap();
        settings.apply("PRICE_BUFFER_PCT", "0.3").unwrap();
        assert_eq!(settings.unit_count, 2);
        assert_eq!(
            settings.stop_loss_pct,
            Decimal::from_str_canonical("5").unwrap()
        );
    }

    #[test]
    fn test_settings_rejects_unknown_key() {
        let mut settings = TradingSettings::default();
        assert!(settings.apply("LEVERAGE", "10").is_err());
    }

    #[test]
    fn test_half_unit_percent() {
        let mut settings = TradingSettings::default();
        settings.apply("UNIT", "2").unwrap();
        // 2 units * 5% = 10%, half = 5%
        assert_eq!(
            settings.half_unit_percent(),
            Decimal::from_str_canonical("5").unwrap()
        );
    }
}
