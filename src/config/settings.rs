use serde::Deserialize;

/// Top-level configuration settings for the broker.
///
/// Includes settings for both logging and message delivery.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub log: LogSettings,
    pub broker: BrokerSettings,
}

/// Configuration settings for logging.
#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Configuration settings for the broker core.
///
/// Controls the per-subscription mailbox size and the optional per-subscriber
/// delivery timeout. The default leaves delivery unbounded in time, which is
/// part of the broker's contract; set `delivery_timeout_ms` only when a
/// stalled handler must not stall its publishers forever.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub mailbox_capacity: usize,
    pub delivery_timeout_ms: Option<u64>,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub log: Option<PartialLogSettings>,
    pub broker: Option<PartialBrokerSettings>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Partial broker settings.
///
/// Used for broker configuration from external sources with optional values.
#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub mailbox_capacity: Option<usize>,
    pub delivery_timeout_ms: Option<u64>,
}

/// Provides default values for `Settings`.
///
/// Ensures the broker has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            broker: BrokerSettings::default(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1,
            delivery_timeout_ms: None,
        }
    }
}
