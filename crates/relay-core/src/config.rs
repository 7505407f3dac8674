use crate::error::Result;
use crate::types::ActionType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// DeliveryTimeouts
// ---------------------------------------------------------------------------

/// Per-action-type client-visible wait for a worker callback, in seconds.
/// These bound the hub subscription TTL, not the action itself: a worker
/// that calls back after expiry still resolves the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTimeouts {
    #[serde(default = "default_send_message_secs")]
    pub send_message_secs: u64,
    #[serde(default = "default_generate_quote_secs")]
    pub generate_quote_secs: u64,
    #[serde(default = "default_convert_entity_secs")]
    pub convert_entity_secs: u64,
    #[serde(default = "default_request_analysis_secs")]
    pub request_analysis_secs: u64,
}

fn default_send_message_secs() -> u64 {
    ActionType::SendMessage.default_delivery_timeout_secs()
}

fn default_generate_quote_secs() -> u64 {
    ActionType::GenerateQuote.default_delivery_timeout_secs()
}

fn default_convert_entity_secs() -> u64 {
    ActionType::ConvertEntity.default_delivery_timeout_secs()
}

fn default_request_analysis_secs() -> u64 {
    ActionType::RequestAnalysis.default_delivery_timeout_secs()
}

impl Default for DeliveryTimeouts {
    fn default() -> Self {
        Self {
            send_message_secs: default_send_message_secs(),
            generate_quote_secs: default_generate_quote_secs(),
            convert_entity_secs: default_convert_entity_secs(),
            request_analysis_secs: default_request_analysis_secs(),
        }
    }
}

impl DeliveryTimeouts {
    pub fn for_action(&self, action_type: ActionType) -> Duration {
        let secs = match action_type {
            ActionType::SendMessage => self.send_message_secs,
            ActionType::GenerateQuote => self.generate_quote_secs,
            ActionType::ConvertEntity => self.convert_entity_secs,
            ActionType::RequestAnalysis => self.request_analysis_secs,
        };
        Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Service configuration, loaded from a YAML file with env-var overrides
/// for the two deployment-specific URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the sqlite action record store. `:memory:` is accepted.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// External worker job-intake endpoint.
    #[serde(default = "default_worker_url")]
    pub worker_url: String,

    /// Public URL of this service's callback endpoint, embedded in every
    /// dispatched job so the worker knows where to report.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,

    /// Network-level timeout for the fire-and-forget dispatch call. It
    /// only bounds the worker accepting the job, not completing it.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    #[serde(default)]
    pub delivery_timeouts: DeliveryTimeouts,
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> String {
    "relay.db".to_string()
}

fn default_worker_url() -> String {
    "http://localhost:9090/jobs".to_string()
}

fn default_callback_url() -> String {
    "http://localhost:3141/api/callbacks".to_string()
}

fn default_dispatch_timeout_secs() -> u64 {
    5
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
            worker_url: default_worker_url(),
            callback_url: default_callback_url(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            delivery_timeouts: DeliveryTimeouts::default(),
        }
    }
}

impl RelayConfig {
    /// Load config from a YAML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RelayConfig = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus env overrides, for deployments with no config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RELAY_WORKER_URL") {
            self.worker_url = url;
        }
        if let Ok(url) = std::env::var("RELAY_CALLBACK_URL") {
            self.callback_url = url;
        }
        if let Ok(path) = std::env::var("RELAY_DB_PATH") {
            self.db_path = path;
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
