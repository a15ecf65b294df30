//! Unified config layer.
//!
//! Every environment read goes through here; the rest of the workspace reads
//! structured config instead of calling `std::env::var` directly.
//!
//! - `loader`: `env_value`, `env_parse`, `env_flag`, `env_list`, `.env` loading
//! - `schema`: `ServerConfig`, `ObservabilityConfig`
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_flag, env_list, env_parse, env_value, load_dotenv};
pub use schema::{ObservabilityConfig, ServerConfig, DEFAULT_LISTEN, DEFAULT_MAX_REQUEST_BYTES};
