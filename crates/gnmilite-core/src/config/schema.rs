//! Config structs grouped by concern, loaded from the environment.

use super::env_keys::{observability as obv_keys, server};
use super::loader::{env_flag, env_list, env_parse, env_value};

/// Default listen address for the TCP transport.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:9339";

/// Default cap on one request line (10 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Server surface configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    /// Module definition files to load at startup.
    pub models: Vec<String>,
    pub max_request_bytes: usize,
}

impl ServerConfig {
    /// Load from env (reads `.env` first). Unset values use defaults.
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let listen = env_value(server::GNMILITE_LISTEN).unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let models = env_list(server::GNMILITE_MODELS);
        let max_request_bytes = env_parse::<usize>(server::GNMILITE_MAX_REQUEST_BYTES)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
        Self {
            listen,
            models,
            max_request_bytes,
        }
    }

    /// Apply CLI overrides: a listen address replaces the env value, model
    /// files given on the command line replace the env list.
    pub fn with_cli_overrides(mut self, listen: Option<String>, models: Vec<String>) -> Self {
        if let Some(listen) = listen {
            self.listen = listen;
        }
        if !models.is_empty() {
            self.models = models;
        }
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            models: Vec::new(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

/// Observability: quiet, log_level, log_json.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            let quiet = env_flag(obv_keys::GNMILITE_QUIET, false);
            let log_level =
                env_value(obv_keys::GNMILITE_LOG_LEVEL).unwrap_or_else(|| "gnmilite=info".to_string());
            let log_json = env_flag(obv_keys::GNMILITE_LOG_JSON, false);
            Self {
                quiet,
                log_level,
                log_json,
            }
        })
    }
}
